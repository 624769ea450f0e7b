use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Marker separating segments in submitted content; each segment becomes one
/// artifact for `short` generation.
pub const SEGMENT_MARKER: &str = "— pause —";

/// Voices accepted by the content generation service.
pub const VOICES: &[&str] = &["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

// ============================================================================
// Job Models
// ============================================================================

/// Lifecycle status of a generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Output format requested for a job's artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Vertical segments, one per segment marker
    Short,
    /// Single long-form artifact
    Long,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Short => "short",
            ArtifactKind::Long => "long",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(ArtifactKind::Short),
            "long" => Ok(ArtifactKind::Long),
            other => Err(format!("unknown artifact kind: {}", other)),
        }
    }
}

/// Validated input parameters of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParams {
    pub content: String,
    pub voice: String,
    pub speed: f64,
    pub kind: ArtifactKind,
    /// Requested publish time. Validation metadata: slots come from the
    /// rolling queue timeline, not from this value.
    pub publish_at: DateTime<Utc>,
}

impl JobParams {
    /// Number of artifacts one generation call is expected to produce.
    pub fn estimated_artifacts(&self) -> u32 {
        match self.kind {
            ArtifactKind::Short => self.content.matches(SEGMENT_MARKER).count() as u32 + 1,
            ArtifactKind::Long => 1,
        }
    }
}

/// Job represents one content→publish pipeline instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub owner_key: String,
    pub status: JobStatus,
    /// 0–100, monotonically non-decreasing while processing
    pub progress: u8,
    pub message: String,
    pub params: JobParams,
    pub artifacts_generated: u32,
    pub artifacts_published: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Partial update applied to a job; only supplied fields are merged
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub artifacts_generated: Option<u32>,
    pub artifacts_published: Option<u32>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Raw submission payload as received from the front end, validated into
/// [`JobParams`] at the boundary
#[derive(Debug, Clone, Deserialize)]
pub struct NewJobRequest {
    pub owner_key: String,
    pub content: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub speed: Option<f64>,
    pub kind: String,
    /// ISO-8601 target publish time
    pub publish_at: String,
    #[serde(default)]
    pub custom_id: Option<String>,
}

/// Caller-visible view of a job; no internal diagnostics beyond the last
/// error string
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub artifacts_generated: u32,
    pub artifacts_published: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            artifacts_generated: job.artifacts_generated,
            artifacts_published: job.artifacts_published,
            error: job.error.clone(),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

// ============================================================================
// Upload Queue Models
// ============================================================================

/// Lifecycle status of one publish-queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    /// Awaiting upload (initial state, also re-entered on retry)
    Pending,
    /// Uploaded to the publish target, not yet scheduled
    UploadedPrivate,
    /// Remote release scheduled
    Scheduled,
    /// Uploaded but remote scheduling failed; left for the publish sweep
    ScheduleFailed,
    /// Made public
    Published,
    /// Upload failed; retryable until attempts exhaust the policy
    Failed,
}

impl QueueItemStatus {
    /// Terminal states eligible for housekeeping removal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueItemStatus::Published | QueueItemStatus::Failed)
    }
}

/// One artifact destined for the publish target, tracked independently of
/// its parent job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// Where the rendered artifact lives (download URL or local path)
    pub locator: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub status: QueueItemStatus,
    /// Set once the publish target accepts the upload
    #[serde(default)]
    pub remote_id: Option<String>,
    pub scheduled_publish_time: DateTime<Utc>,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub upload_attempts: u32,
    #[serde(default)]
    pub last_attempt_time: Option<DateTime<Utc>>,
    pub kind: ArtifactKind,
    /// First ~200 chars of the originating content
    pub content_snippet: String,
}

impl QueueItem {
    /// Derive the display title from an artifact locator: file stem with
    /// underscores replaced by spaces.
    pub fn title_from_locator(locator: &str) -> String {
        let file_name = locator
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(locator);
        let stem = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.contains(char::is_whitespace) => stem,
            _ => file_name,
        };
        stem.replace('_', " ")
    }
}

/// Ephemeral grouping of queue items produced by one generation call,
/// sharing one scheduling anchor. Never persisted; the id exists for log
/// correlation only.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: Uuid,
    pub anchor: DateTime<Utc>,
    pub items: Vec<QueueItem>,
}

impl Batch {
    pub fn new(anchor: DateTime<Utc>, items: Vec<QueueItem>) -> Self {
        Self {
            id: Uuid::new_v4(),
            anchor,
            items,
        }
    }
}
