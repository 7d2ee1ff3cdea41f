//! Download job storage and persistence.
//!
//! Provides SQLite-backed storage for download job records. All writes go
//! through one connection behind a mutex, which serializes concurrent
//! per-record mutations (a progress update racing a status transition can
//! never produce a torn row).

use super::models::{DownloadFormat, DownloadJob, JobStatus};
use super::schema::DOWNLOAD_JOBS_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Trait for download job storage operations.
///
/// The pipeline and the job service only ever talk to this interface, so a
/// different backend can be substituted without touching either.
pub trait JobStore: Send + Sync {
    /// Insert a freshly created job record.
    fn create(&self, job: DownloadJob) -> Result<()>;

    /// Get a job by ID.
    fn get(&self, id: &str) -> Result<Option<DownloadJob>>;

    /// List all jobs, most-recently-created first.
    fn list_recent_first(&self) -> Result<Vec<DownloadJob>>;

    /// Begin a strategy attempt: (re-)enter `downloading`, reset progress to
    /// zero and bump the attempt counter. Returns false if the job is already
    /// terminal (or unknown), in which case no row was touched.
    fn begin_attempt(&self, id: &str) -> Result<bool>;

    /// Write a progress value for an in-flight attempt. Values below the
    /// current one are ignored so progress is monotonic within an attempt,
    /// and values cap at 99: only [`JobStore::mark_completed`] writes 100.
    /// Writes against non-downloading records are no-ops.
    fn update_progress(&self, id: &str, progress: u8) -> Result<()>;

    /// Retain the reason of the most recent failed attempt.
    fn record_attempt_error(&self, id: &str, reason: &str) -> Result<()>;

    /// Terminal success: status `completed`, progress 100, output location
    /// recorded. Returns false if the record was already terminal.
    fn mark_completed(&self, id: &str, output_location: &str) -> Result<bool>;

    /// Terminal failure: status `failed`, progress reset to 0. Returns false
    /// if the record was already terminal.
    fn mark_failed(&self, id: &str, reason: Option<&str>) -> Result<bool>;

    /// Fail every non-terminal record, used at startup to clean up jobs a
    /// previous process run left behind. Returns the number of records swept.
    fn fail_interrupted(&self, reason: &str) -> Result<usize>;
}

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Open an existing database or create a new one with the current schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                &db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(&db_path)?;
            DOWNLOAD_JOBS_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created new jobs database at {:?}", db_path.as_ref());
            conn
        };

        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!(
                "Jobs database version {} is too old, does not contain base db version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        let version = db_version as usize;

        let schema_count = DOWNLOAD_JOBS_VERSIONED_SCHEMAS.len();
        if version >= schema_count {
            bail!(
                "Jobs database version {} is too new (max supported: {})",
                version,
                schema_count - 1
            );
        }

        DOWNLOAD_JOBS_VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;

        Self::migrate_if_needed(&conn, version)?;

        Ok(SqliteJobStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        DOWNLOAD_JOBS_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;

        Ok(SqliteJobStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run any pending migrations.
    fn migrate_if_needed(conn: &Connection, current_version: usize) -> Result<()> {
        let target_version = DOWNLOAD_JOBS_VERSIONED_SCHEMAS.len() - 1;

        if current_version >= target_version {
            return Ok(());
        }

        info!(
            "Migrating jobs database from version {} to {}",
            current_version, target_version
        );

        for schema in DOWNLOAD_JOBS_VERSIONED_SCHEMAS
            .iter()
            .skip(current_version + 1)
        {
            if let Some(migration_fn) = schema.migration {
                info!("Running jobs migration to version {}", schema.version);
                migration_fn(conn)?;
            }
        }

        conn.execute(
            &format!(
                "PRAGMA user_version = {}",
                BASE_DB_VERSION + target_version
            ),
            [],
        )?;

        Ok(())
    }

    /// Helper to convert a database row to a DownloadJob.
    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<DownloadJob> {
        Ok(DownloadJob {
            id: row.get("id")?,
            source_url: row.get("source_url")?,
            title: row.get("title")?,
            requested_format: DownloadFormat::from_str(
                &row.get::<_, String>("requested_format")?,
            )
            .unwrap_or(DownloadFormat::Mp4Best),
            status: JobStatus::from_str(&row.get::<_, String>("status")?)
                .unwrap_or(JobStatus::Failed),
            progress: row.get("progress")?,
            output_location: row.get("output_location")?,
            last_error: row.get("last_error")?,
            attempts: row.get("attempts")?,
            created_at: row.get("created_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    /// Get current timestamp in seconds.
    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, job: DownloadJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO download_jobs (
                id, source_url, title, requested_format, status, progress,
                output_location, last_error, attempts, created_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            rusqlite::params![
                job.id,
                job.source_url,
                job.title,
                job.requested_format.as_str(),
                job.status.as_str(),
                job.progress,
                job.output_location,
                job.last_error,
                job.attempts,
                job.created_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<DownloadJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM download_jobs WHERE id = ?1")?;
        let job = stmt.query_row([id], Self::row_to_job).optional()?;
        Ok(job)
    }

    fn list_recent_first(&self) -> Result<Vec<DownloadJob>> {
        let conn = self.conn.lock().unwrap();
        // rowid breaks ties between jobs created within the same second
        let mut stmt = conn
            .prepare("SELECT * FROM download_jobs ORDER BY created_at DESC, rowid DESC")?;
        let jobs = stmt
            .query_map([], Self::row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn begin_attempt(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE download_jobs
               SET status = 'downloading', progress = 0, attempts = attempts + 1
               WHERE id = ?1 AND status IN ('pending', 'downloading')"#,
            [id],
        )?;
        Ok(updated > 0)
    }

    fn update_progress(&self, id: &str, progress: u8) -> Result<()> {
        // 100 would make a still-downloading record look finished.
        let progress = progress.min(99);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE download_jobs
               SET progress = MAX(progress, ?2)
               WHERE id = ?1 AND status = 'downloading'"#,
            rusqlite::params![id, progress],
        )?;
        Ok(())
    }

    fn record_attempt_error(&self, id: &str, reason: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE download_jobs
               SET last_error = ?2
               WHERE id = ?1 AND status IN ('pending', 'downloading')"#,
            rusqlite::params![id, reason],
        )?;
        Ok(())
    }

    fn mark_completed(&self, id: &str, output_location: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE download_jobs
               SET status = 'completed', progress = 100, output_location = ?2,
                   last_error = NULL, completed_at = ?3
               WHERE id = ?1 AND status IN ('pending', 'downloading')"#,
            rusqlite::params![id, output_location, Self::now()],
        )?;
        Ok(updated > 0)
    }

    fn mark_failed(&self, id: &str, reason: Option<&str>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE download_jobs
               SET status = 'failed', progress = 0,
                   last_error = COALESCE(?2, last_error), completed_at = ?3
               WHERE id = ?1 AND status IN ('pending', 'downloading')"#,
            rusqlite::params![id, reason, Self::now()],
        )?;
        Ok(updated > 0)
    }

    fn fail_interrupted(&self, reason: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE download_jobs
               SET status = 'failed', progress = 0, last_error = ?1, completed_at = ?2
               WHERE status IN ('pending', 'downloading')"#,
            rusqlite::params![reason, Self::now()],
        )?;
        Ok(updated)
    }
}
