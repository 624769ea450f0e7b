// Submission service - the boundary consumed by the external HTTP front end
//
// Everything here is rejected or admitted before a job row exists; boundary
// errors never enter the pipeline. The worker owns every mutation after
// creation except explicit cancellation, which is a caller-facing operation.

use crate::auth::AccessGate;
use crate::errors::{RequestError, StoreError, ValidationError};
use crate::models::{
    ArtifactKind, JobParams, JobStatus, JobStatusView, JobUpdate, NewJobRequest, VOICES,
};
use crate::store::JobStore;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};

const MAX_CUSTOM_ID_CHARS: usize = 64;

/// Receipt returned to the caller on a successful submission
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub job_id: String,
    pub estimated_artifacts: u32,
}

/// Caller-facing job operations: submit, query, list, cancel
pub struct JobService {
    store: JobStore,
    gate: Arc<AccessGate>,
    max_content_chars: usize,
    default_voice: String,
    default_speed: f64,
}

impl JobService {
    pub fn new(
        store: JobStore,
        gate: Arc<AccessGate>,
        max_content_chars: usize,
        default_voice: String,
        default_speed: f64,
    ) -> Self {
        Self {
            store,
            gate,
            max_content_chars,
            default_voice,
            default_speed,
        }
    }

    /// Validate and admit a submission; on success a queued job row exists.
    #[instrument(skip(self, request), fields(owner_key = %request.owner_key))]
    pub async fn submit(&self, request: NewJobRequest) -> Result<SubmissionReceipt, RequestError> {
        self.gate.recognize(&request.owner_key)?;
        let active = self.store.count_active(&request.owner_key).await?;
        self.gate.check_concurrent(active)?;
        self.gate.check_rate(&request.owner_key)?;

        let params = self.validate(&request)?;
        let estimated_artifacts = params.estimated_artifacts();

        let job_id = self
            .store
            .create(&request.owner_key, &params, request.custom_id)
            .await?;

        info!(job_id = %job_id, estimated_artifacts, "Job submitted");
        Ok(SubmissionReceipt {
            job_id,
            estimated_artifacts,
        })
    }

    /// Status view of one job, gated on ownership.
    pub async fn status(&self, job_id: &str, owner_key: &str) -> Result<JobStatusView, RequestError> {
        let job = self.fetch_owned(job_id, owner_key).await?;
        Ok(JobStatusView::from(&job))
    }

    /// Jobs belonging to one owner, newest first.
    pub async fn list(
        &self,
        owner_key: &str,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<JobStatusView>, RequestError> {
        self.gate.recognize(owner_key)?;
        let jobs = self.store.list(status, Some(owner_key), limit).await?;
        Ok(jobs.iter().map(JobStatusView::from).collect())
    }

    /// Cancel a queued or processing job. Terminal jobs cannot be cancelled;
    /// the worker checks for cancellation between stages, so an in-flight
    /// external call still runs to completion.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn cancel(&self, job_id: &str, owner_key: &str) -> Result<(), RequestError> {
        let job = self.fetch_owned(job_id, owner_key).await?;

        if job.status.is_terminal() {
            return Err(RequestError::CannotCancel(job.status.to_string()));
        }

        self.store
            .update(
                job_id,
                JobUpdate {
                    status: Some(JobStatus::Cancelled),
                    message: Some("Job cancelled by user".to_string()),
                    ..Default::default()
                },
            )
            .await?;

        info!(job_id = %job_id, "Job cancelled");
        Ok(())
    }

    async fn fetch_owned(
        &self,
        job_id: &str,
        owner_key: &str,
    ) -> Result<crate::models::Job, RequestError> {
        let job = match self.store.get(job_id).await {
            Ok(job) => job,
            Err(StoreError::JobNotFound(_)) => {
                return Err(RequestError::NotFound(job_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        if job.owner_key != owner_key {
            return Err(crate::errors::AuthError::OwnerMismatch.into());
        }
        Ok(job)
    }

    fn validate(&self, request: &NewJobRequest) -> Result<JobParams, ValidationError> {
        let content = request.content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        if content.chars().count() > self.max_content_chars {
            return Err(ValidationError::ContentTooLong {
                max: self.max_content_chars,
            });
        }

        let voice = request
            .voice
            .clone()
            .unwrap_or_else(|| self.default_voice.clone());
        if !VOICES.contains(&voice.as_str()) {
            return Err(ValidationError::UnknownVoice(voice));
        }

        let speed = request.speed.unwrap_or(self.default_speed);
        if !(0.25..=4.0).contains(&speed) {
            return Err(ValidationError::InvalidFieldValue {
                field: "speed".to_string(),
                reason: "must be between 0.25 and 4.0".to_string(),
            });
        }

        let kind = ArtifactKind::from_str(&request.kind)
            .map_err(|_| ValidationError::UnknownArtifactKind(request.kind.clone()))?;

        let publish_at = parse_publish_time(&request.publish_at)?;
        if publish_at <= Utc::now() {
            return Err(ValidationError::PublishTimeNotFuture);
        }

        if let Some(custom_id) = &request.custom_id {
            if custom_id.is_empty() || custom_id.chars().count() > MAX_CUSTOM_ID_CHARS {
                return Err(ValidationError::InvalidFieldValue {
                    field: "custom_id".to_string(),
                    reason: format!("must be 1 to {} characters", MAX_CUSTOM_ID_CHARS),
                });
            }
        }

        Ok(JobParams {
            content: content.to_string(),
            voice,
            speed,
            kind,
            publish_at,
        })
    }
}

/// Parse an ISO-8601 publish time. A timestamp without an offset is taken
/// as UTC.
fn parse_publish_time(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(value) {
        return Ok(with_offset.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| ValidationError::InvalidFieldValue {
            field: "publish_at".to_string(),
            reason: "expected ISO-8601, e.g. 2025-12-20T10:30:00".to_string(),
        })
}
