//! SQLite storage implementation.
//!
//! A file-based cache store. Good for:
//! - Local development
//! - Single-server deployments
//! - Testing resumability with persistent data
//!
//! Each deployment namespace maps to its own database file, so independent
//! processes targeting the same deployment share one cache.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::CacheStore;
use crate::types::config::Namespace;
use crate::types::fingerprint::Fingerprint;
use crate::types::job::{BatchJob, CacheEntry, JobStatus, ResultOrigin};
use crate::types::item::ExtractionResult;

/// SQLite-based cache store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite:./cache.db?mode=rwc` - File-based, created if missing
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(unavailable)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open the database file for a deployment namespace inside `dir`.
    pub async fn for_namespace(dir: impl AsRef<Path>, namespace: &Namespace) -> StoreResult<Self> {
        let path = dir.as_ref().join(format!("{}.db", namespace.as_str()));
        let url = format!("sqlite:{}?mode=rwc", path.display());
        Self::new(&url).await
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> StoreResult<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                fingerprint TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                origin_kind TEXT NOT NULL,
                origin_job TEXT,
                completed_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS manifests (
                job_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                submitted_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS manifest_members (
                job_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                fingerprint TEXT NOT NULL,
                PRIMARY KEY (job_id, position)
            );

            CREATE INDEX IF NOT EXISTS idx_members_fingerprint
                ON manifest_members(fingerprint);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_members(&self, job_id: &str) -> StoreResult<Vec<Fingerprint>> {
        let rows: Vec<MemberRow> = sqlx::query_as(
            "SELECT job_id, position, fingerprint FROM manifest_members \
             WHERE job_id = ? ORDER BY position",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(rows
            .into_iter()
            .map(|row| Fingerprint::from_hex(row.fingerprint))
            .collect())
    }
}

// Row types for sqlx queries
#[derive(Debug, FromRow)]
struct EntryRow {
    fingerprint: String,
    payload: String,
    origin_kind: String,
    origin_job: Option<String>,
    completed_at: String,
}

impl EntryRow {
    fn into_entry(self) -> StoreResult<CacheEntry> {
        let origin = match self.origin_kind.as_str() {
            "realtime" => ResultOrigin::Realtime,
            "job" => ResultOrigin::Job(self.origin_job.unwrap_or_default()),
            other => {
                return Err(StoreError::Corrupt {
                    key: self.fingerprint,
                    reason: format!("unknown origin kind: {other}"),
                })
            }
        };

        let payload: serde_json::Value = serde_json::from_str(&self.payload)?;
        let completed_at = parse_timestamp(&self.fingerprint, &self.completed_at)?;

        Ok(CacheEntry {
            fingerprint: Fingerprint::from_hex(self.fingerprint),
            result: ExtractionResult::new(payload),
            origin,
            completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ManifestRow {
    job_id: String,
    status: String,
    submitted_at: String,
}

#[derive(Debug, FromRow)]
#[allow(dead_code)]
struct MemberRow {
    job_id: String,
    position: i64,
    fingerprint: String,
}

fn parse_timestamp(key: &str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("invalid timestamp: {e}"),
        })
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(Box::new(e))
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn lookup(&self, fingerprint: &Fingerprint) -> StoreResult<Option<CacheEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(
            "SELECT fingerprint, payload, origin_kind, origin_job, completed_at \
             FROM entries WHERE fingerprint = ?",
        )
        .bind(fingerprint.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.map(EntryRow::into_entry).transpose()
    }

    async fn put(&self, entry: CacheEntry) -> StoreResult<()> {
        let (origin_kind, origin_job) = match &entry.origin {
            ResultOrigin::Realtime => ("realtime", None),
            ResultOrigin::Job(id) => ("job", Some(id.as_str())),
        };

        // First writer wins.
        sqlx::query(
            "INSERT OR IGNORE INTO entries \
             (fingerprint, payload, origin_kind, origin_job, completed_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.fingerprint.as_str())
        .bind(serde_json::to_string(&entry.result.payload)?)
        .bind(origin_kind)
        .bind(origin_job)
        .bind(entry.completed_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(())
    }

    async fn record_manifest(&self, job: &BatchJob) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        sqlx::query(
            "INSERT OR REPLACE INTO manifests (job_id, status, submitted_at) VALUES (?, ?, ?)",
        )
        .bind(&job.id)
        .bind(job.status.as_str())
        .bind(job.submitted_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        sqlx::query("DELETE FROM manifest_members WHERE job_id = ?")
            .bind(&job.id)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        for (position, fingerprint) in job.members.iter().enumerate() {
            sqlx::query(
                "INSERT INTO manifest_members (job_id, position, fingerprint) VALUES (?, ?, ?)",
            )
            .bind(&job.id)
            .bind(position as i64)
            .bind(fingerprint.as_str())
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        }

        tx.commit().await.map_err(unavailable)
    }

    async fn find_manifest(
        &self,
        fingerprints: &[Fingerprint],
    ) -> StoreResult<Option<BatchJob>> {
        let rows: Vec<ManifestRow> = sqlx::query_as(
            "SELECT job_id, status, submitted_at FROM manifests \
             WHERE status IN ('PENDING', 'RUNNING', 'TIMEDOUT') \
             ORDER BY submitted_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        for row in rows {
            let members = self.load_members(&row.job_id).await?;
            let member_set: indexmap::IndexSet<_> = members.into_iter().collect();
            if fingerprints.iter().all(|fp| member_set.contains(fp)) {
                let status =
                    JobStatus::parse(&row.status).ok_or_else(|| StoreError::Corrupt {
                        key: row.job_id.clone(),
                        reason: format!("unknown job status: {}", row.status),
                    })?;
                let submitted_at = parse_timestamp(&row.job_id, &row.submitted_at)?;
                return Ok(Some(BatchJob {
                    id: row.job_id,
                    status,
                    members: member_set,
                    submitted_at,
                }));
            }
        }

        Ok(None)
    }

    async fn update_manifest_status(&self, job_id: &str, status: JobStatus) -> StoreResult<()> {
        sqlx::query("UPDATE manifests SET status = ? WHERE job_id = ?")
            .bind(status.as_str())
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
