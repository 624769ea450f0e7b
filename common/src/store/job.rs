// Job store - SQLite-backed table of generation jobs
//
// Sole writer of job rows together with the submission service's explicit
// cancellation. The table is indexed by status, owner, and creation time to
// serve the worker poll and the caller-facing listing.

use crate::errors::StoreError;
use crate::models::{ArtifactKind, Job, JobParams, JobStatus, JobUpdate};
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, SqlitePool};
use std::str::FromStr;
use tracing::{info, instrument};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        owner_key TEXT NOT NULL,
        status TEXT NOT NULL,
        progress INTEGER NOT NULL DEFAULT 0,
        message TEXT NOT NULL DEFAULT '',
        content TEXT NOT NULL,
        voice TEXT NOT NULL,
        speed REAL NOT NULL,
        kind TEXT NOT NULL,
        publish_at TEXT NOT NULL,
        artifacts_generated INTEGER NOT NULL DEFAULT 0,
        artifacts_published INTEGER NOT NULL DEFAULT 0,
        error TEXT,
        created_at TEXT NOT NULL,
        completed_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_owner_key ON jobs(owner_key)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at)",
];

/// Repository for job persistence
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    /// Open (or create) the job database and ensure the schema exists.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(StoreError::from)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a new job row: status queued, progress 0.
    ///
    /// The id is globally unique; a caller-supplied id that collides is an
    /// explicit error rather than an overwrite.
    #[instrument(skip(self, params), fields(owner_key = %owner_key))]
    pub async fn create(
        &self,
        owner_key: &str,
        params: &JobParams,
        custom_id: Option<String>,
    ) -> Result<String, StoreError> {
        let id = custom_id.unwrap_or_else(generate_job_id);
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, owner_key, status, progress, message,
                content, voice, speed, kind, publish_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(owner_key)
        .bind(JobStatus::Queued.as_str())
        .bind(0_i64)
        .bind("Job queued for processing")
        .bind(&params.content)
        .bind(&params.voice)
        .bind(params.speed)
        .bind(params.kind.as_str())
        .bind(params.publish_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(job_id = %id, "Job created");
        Ok(id)
    }

    /// Fetch a job by id; unknown ids are an explicit error.
    pub async fn get(&self, id: &str) -> Result<Job, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_job(&row),
            None => Err(StoreError::JobNotFound(id.to_string())),
        }
    }

    /// Merge only the supplied fields into a job row.
    ///
    /// A job in a terminal status admits no further updates; entering a
    /// terminal status auto-stamps the completion time unless one is given.
    #[instrument(skip(self, update), fields(job_id = %id))]
    pub async fn update(&self, id: &str, update: JobUpdate) -> Result<(), StoreError> {
        let current = self.get(id).await?;
        if current.status.is_terminal() {
            return Err(StoreError::TerminalStatus {
                id: id.to_string(),
                status: current.status.to_string(),
            });
        }

        let mut update = update;
        if let Some(status) = update.status {
            if status.is_terminal() && update.completed_at.is_none() {
                update.completed_at = Some(Utc::now());
            }
        }

        let mut builder = QueryBuilder::new("UPDATE jobs SET ");
        let mut fields = builder.separated(", ");
        let mut any = false;

        if let Some(status) = update.status {
            fields.push("status = ");
            fields.push_bind_unseparated(status.as_str());
            any = true;
        }
        if let Some(progress) = update.progress {
            fields.push("progress = ");
            fields.push_bind_unseparated(progress as i64);
            any = true;
        }
        if let Some(message) = update.message {
            fields.push("message = ");
            fields.push_bind_unseparated(message);
            any = true;
        }
        if let Some(error) = update.error {
            fields.push("error = ");
            fields.push_bind_unseparated(error);
            any = true;
        }
        if let Some(generated) = update.artifacts_generated {
            fields.push("artifacts_generated = ");
            fields.push_bind_unseparated(generated as i64);
            any = true;
        }
        if let Some(published) = update.artifacts_published {
            fields.push("artifacts_published = ");
            fields.push_bind_unseparated(published as i64);
            any = true;
        }
        if let Some(completed_at) = update.completed_at {
            fields.push("completed_at = ");
            fields.push_bind_unseparated(completed_at);
            any = true;
        }

        if !any {
            return Ok(());
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::JobNotFound(id.to_string()));
        }

        Ok(())
    }

    /// Caller-facing listing, newest first.
    pub async fn list(
        &self,
        status: Option<JobStatus>,
        owner: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError> {
        let mut builder = QueryBuilder::new("SELECT * FROM jobs WHERE 1 = 1");
        if let Some(status) = status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(owner) = owner {
            builder.push(" AND owner_key = ");
            builder.push_bind(owner);
        }
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_job).collect()
    }

    /// Queued jobs in submission order, for the worker poll.
    pub async fn fetch_queued(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE status = ? ORDER BY created_at ASC")
            .bind(JobStatus::Queued.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    /// Count queued/processing jobs for one owner, for the admission cap.
    pub async fn count_active(&self, owner: &str) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM jobs
             WHERE owner_key = ? AND status IN ('queued', 'processing')",
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("n")?)
    }

    /// Delete terminal jobs completed before the cutoff. Returns the number
    /// of rows removed.
    #[instrument(skip(self))]
    pub async fn purge(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM jobs
             WHERE status IN ('completed', 'failed', 'cancelled')
               AND completed_at IS NOT NULL
               AND completed_at < ?",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!(purged, "Purged old terminal jobs");
        }
        Ok(purged)
    }
}

fn row_to_job(row: &SqliteRow) -> Result<Job, StoreError> {
    let status: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status).map_err(|reason| StoreError::CorruptRow {
        field: "status".to_string(),
        reason,
    })?;

    let kind: String = row.try_get("kind")?;
    let kind = ArtifactKind::from_str(&kind).map_err(|reason| StoreError::CorruptRow {
        field: "kind".to_string(),
        reason,
    })?;

    Ok(Job {
        id: row.try_get("id")?,
        owner_key: row.try_get("owner_key")?,
        status,
        progress: row.try_get::<i64, _>("progress")? as u8,
        message: row.try_get("message")?,
        params: JobParams {
            content: row.try_get("content")?,
            voice: row.try_get("voice")?,
            speed: row.try_get("speed")?,
            kind,
            publish_at: row.try_get("publish_at")?,
        },
        artifacts_generated: row.try_get::<i64, _>("artifacts_generated")? as u32,
        artifacts_published: row.try_get::<i64, _>("artifacts_published")? as u32,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Opaque job id: unix timestamp plus a random lowercase suffix.
fn generate_job_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("job_{}_{}", Utc::now().timestamp(), suffix)
}
