// Job pipeline - generate → dedup → enqueue → upload → schedule → notify
//
// Stage errors are recorded on the job and never escape to the loop.
// Cancellation is honored between stages: every checkpoint write fails
// cleanly once the job has reached a terminal status, and the pipeline
// abandons the job instead of overwriting it. In-flight external calls are
// allowed to finish.

use crate::clients::{ContentGenerator, GenerationRequest, PublishTarget, UploadRequest, Visibility};
use crate::config::Settings;
use crate::dedup;
use crate::errors::{QueueError, StoreError};
use crate::models::{Batch, Job, JobStatus, JobUpdate, QueueItem, QueueItemStatus};
use crate::notify::NotificationClient;
use crate::retry::RetryPolicy;
use crate::schedule::{self, interval_from_hours};
use crate::store::{JobStore, UploadQueueStore};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Stored with each queue item as the originating content reference.
const SNIPPET_CHARS: usize = 200;

/// Pipeline tuning shared across jobs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Spacing between successive publish slots
    pub slot_interval: chrono::Duration,
    /// Scheduled items within this window of their slot are promoted
    pub publish_tolerance: chrono::Duration,
    pub default_description: String,
    pub default_tags: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            slot_interval: chrono::Duration::minutes(150),
            publish_tolerance: chrono::Duration::minutes(1),
            default_description: "Automated daily briefing".to_string(),
            default_tags: vec!["news".to_string(), "daily".to_string()],
        }
    }
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            slot_interval: interval_from_hours(settings.scheduling.interval_hours),
            publish_tolerance: chrono::Duration::seconds(
                settings.scheduling.publish_tolerance_seconds as i64,
            ),
            default_description: settings.publisher.default_description.clone(),
            default_tags: settings.publisher.default_tags.clone(),
        }
    }
}

/// Per-pass accounting for the upload stage
#[derive(Debug, Default, Clone, Copy)]
pub struct UploadStats {
    /// Pending items processed in this pass
    pub processed: u32,
    /// Items that reached the scheduled state
    pub scheduled: u32,
    /// Of those, items belonging to the current batch
    pub batch_processed: u32,
    pub batch_scheduled: u32,
}

/// Current batch context threaded through the upload pass so fresh items get
/// the full originating content in their notification; older retried items
/// fall back to their stored snippet.
pub struct BatchContext {
    job_id: String,
    content: String,
    locators: HashSet<String>,
    total: u32,
}

enum StageOutcome {
    Completed { generated: u32, scheduled: u32 },
    /// The job reached a terminal status (cancellation) between stages.
    Abandoned,
}

/// Drives one job through the pipeline and runs the timed sweeps
pub struct JobPipeline {
    jobs: JobStore,
    queue: UploadQueueStore,
    retry: RetryPolicy,
    generator: Arc<dyn ContentGenerator>,
    publisher: Arc<dyn PublishTarget>,
    notifier: Arc<NotificationClient>,
    config: PipelineConfig,
}

impl JobPipeline {
    pub fn new(
        jobs: JobStore,
        queue: UploadQueueStore,
        retry: RetryPolicy,
        generator: Arc<dyn ContentGenerator>,
        publisher: Arc<dyn PublishTarget>,
        notifier: Arc<NotificationClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            jobs,
            queue,
            retry,
            generator,
            publisher,
            notifier,
            config,
        }
    }

    pub fn queue_store(&self) -> &UploadQueueStore {
        &self.queue
    }

    /// Process a single queued job. Failures are recorded on the job row;
    /// this never returns an error to the loop.
    #[instrument(skip(self, job), fields(job_id = %job.id, kind = %job.params.kind))]
    pub async fn process_job(&self, job: &Job) {
        info!("Processing job");

        match self.run_stages(job).await {
            Ok(StageOutcome::Completed {
                generated,
                scheduled,
            }) => {
                info!(generated, scheduled, "Job completed");
            }
            Ok(StageOutcome::Abandoned) => {
                info!("Job reached a terminal status mid-pipeline, abandoned");
            }
            Err(e) => {
                error!(error = %e, "Job failed");
                let update = JobUpdate {
                    status: Some(JobStatus::Failed),
                    message: Some(format!("Error: {}", e)),
                    error: Some(e.to_string()),
                    ..Default::default()
                };
                match self.jobs.update(&job.id, update).await {
                    Ok(()) => {}
                    Err(StoreError::TerminalStatus { .. }) => {
                        debug!("Job already terminal, failure not recorded")
                    }
                    Err(update_err) => {
                        error!(error = %update_err, "Failed to record job failure")
                    }
                }
            }
        }
    }

    async fn run_stages(&self, job: &Job) -> anyhow::Result<StageOutcome> {
        // Generation stage
        if !self
            .checkpoint(
                &job.id,
                JobUpdate {
                    status: Some(JobStatus::Processing),
                    progress: Some(10),
                    message: Some("Starting artifact generation".to_string()),
                    ..Default::default()
                },
            )
            .await?
        {
            return Ok(StageOutcome::Abandoned);
        }

        if !self
            .checkpoint(
                &job.id,
                JobUpdate {
                    progress: Some(25),
                    message: Some("Submitting generation request".to_string()),
                    ..Default::default()
                },
            )
            .await?
        {
            return Ok(StageOutcome::Abandoned);
        }

        let request = GenerationRequest {
            content: job.params.content.clone(),
            voice: job.params.voice.clone(),
            speed: job.params.speed,
            kind: job.params.kind,
        };
        let artifacts = self.generator.generate(&request).await?;
        if artifacts.is_empty() {
            anyhow::bail!("No artifacts generated");
        }
        let generated = artifacts.len() as u32;

        if !self
            .checkpoint(
                &job.id,
                JobUpdate {
                    progress: Some(50),
                    message: Some(format!("Generated {} artifact(s)", generated)),
                    artifacts_generated: Some(generated),
                    ..Default::default()
                },
            )
            .await?
        {
            return Ok(StageOutcome::Abandoned);
        }

        // Dedup + slot allocation + enqueue stage
        let now = Utc::now();
        let mut snapshot = self.queue.load().await;
        let mut accepted: Vec<String> = Vec::new();
        let mut skipped = 0u32;

        for artifact in &artifacts {
            let title = QueueItem::title_from_locator(&artifact.locator);
            let within_batch = accepted.iter().any(|existing| {
                dedup::normalize(&QueueItem::title_from_locator(existing))
                    == dedup::normalize(&title)
            });
            if within_batch || dedup::is_duplicate(&title, &snapshot) {
                skipped += 1;
                warn!(title = %title, "Skipping duplicate artifact");
                continue;
            }
            accepted.push(artifact.locator.clone());
        }

        if accepted.is_empty() {
            let message = format!(
                "All {} artifact(s) matched existing queue history; nothing enqueued",
                generated
            );
            if !self
                .checkpoint(
                    &job.id,
                    JobUpdate {
                        status: Some(JobStatus::Completed),
                        progress: Some(100),
                        message: Some(message),
                        artifacts_published: Some(0),
                        ..Default::default()
                    },
                )
                .await?
            {
                return Ok(StageOutcome::Abandoned);
            }
            return Ok(StageOutcome::Completed {
                generated,
                scheduled: 0,
            });
        }

        let slots = schedule::allocate(&snapshot, accepted.len(), self.config.slot_interval, None, now);
        let items: Vec<QueueItem> = accepted
            .iter()
            .zip(slots.iter())
            .map(|(locator, slot)| self.build_item(job, locator, *slot, now))
            .collect();
        let batch = Batch::new(slots[0], items);

        for item in &batch.items {
            info!(
                batch_id = %batch.id,
                title = %item.title,
                slot = %item.scheduled_publish_time,
                "Artifact enqueued"
            );
        }
        snapshot.extend(batch.items.iter().cloned());
        self.queue.save(&snapshot).await?;

        let enqueued = batch.items.len() as u32;
        if !self
            .checkpoint(
                &job.id,
                JobUpdate {
                    progress: Some(60),
                    message: Some(format!(
                        "Enqueued {} artifact(s) ({} duplicate(s) skipped), uploading",
                        enqueued, skipped
                    )),
                    ..Default::default()
                },
            )
            .await?
        {
            return Ok(StageOutcome::Abandoned);
        }

        // Upload + schedule stage
        let context = BatchContext {
            job_id: job.id.clone(),
            content: job.params.content.clone(),
            locators: batch.items.iter().map(|i| i.locator.clone()).collect(),
            total: enqueued,
        };
        let stats = self.upload_pass(Some(&context)).await?;

        let message = format!(
            "Successfully generated {} artifact(s), scheduled {}",
            generated, stats.batch_scheduled
        );
        if !self
            .checkpoint(
                &job.id,
                JobUpdate {
                    status: Some(JobStatus::Completed),
                    progress: Some(100),
                    message: Some(message),
                    artifacts_published: Some(stats.batch_scheduled),
                    ..Default::default()
                },
            )
            .await?
        {
            return Ok(StageOutcome::Abandoned);
        }

        Ok(StageOutcome::Completed {
            generated,
            scheduled: stats.batch_scheduled,
        })
    }

    /// Upload every pending item, in insertion order. Each mutation is
    /// persisted before the next item starts, and one notification fires per
    /// item regardless of outcome (empty public locator on failure).
    pub async fn upload_pass(&self, batch: Option<&BatchContext>) -> Result<UploadStats, QueueError> {
        let mut items = self.queue.load().await;
        let pending: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.status == QueueItemStatus::Pending)
            .map(|(i, _)| i)
            .collect();

        let mut stats = UploadStats::default();
        if pending.is_empty() {
            return Ok(stats);
        }

        self.notifier.reset_sequence();

        for idx in pending {
            let now = Utc::now();
            let in_batch = batch
                .map(|b| b.locators.contains(&items[idx].locator))
                .unwrap_or(false);

            let request = UploadRequest {
                locator: items[idx].locator.clone(),
                title: items[idx].title.clone(),
                description: items[idx].description.clone(),
                tags: items[idx].tags.clone(),
                visibility: Visibility::Private,
            };

            let mut public_locator = String::new();
            match self.publisher.upload(&request).await {
                Ok(remote_id) => {
                    items[idx].status = QueueItemStatus::UploadedPrivate;
                    items[idx].remote_id = Some(remote_id.clone());
                    items[idx].uploaded_at = Some(now);
                    // Persist before the schedule call so a crash here leaves
                    // a recoverable uploaded_private item, not a lost upload.
                    self.queue.save(&items).await?;

                    match self
                        .publisher
                        .schedule(&remote_id, items[idx].scheduled_publish_time)
                        .await
                    {
                        Ok(()) => {
                            items[idx].status = QueueItemStatus::Scheduled;
                            public_locator = self.publisher.public_locator(&remote_id);
                            stats.scheduled += 1;
                            if in_batch {
                                stats.batch_scheduled += 1;
                            }
                        }
                        Err(e) => {
                            warn!(
                                title = %items[idx].title,
                                remote_id = %remote_id,
                                error = %e,
                                "Remote scheduling failed, item left for the publish sweep"
                            );
                            items[idx].status = QueueItemStatus::ScheduleFailed;
                        }
                    }
                }
                Err(e) => {
                    error!(title = %items[idx].title, error = %e, "Upload failed");
                    self.retry.record_failure(&mut items[idx], now);
                    if self.retry.is_permanently_failed(&items[idx]) {
                        error!(
                            title = %items[idx].title,
                            attempts = items[idx].upload_attempts,
                            "Upload attempts exhausted, manual intervention required"
                        );
                    }
                }
            }

            self.queue.save(&items).await?;

            let content = match (in_batch, batch) {
                (true, Some(b)) => b.content.as_str(),
                _ => items[idx].content_snippet.as_str(),
            };
            if let Err(e) = self
                .notifier
                .send(content, &public_locator, items[idx].scheduled_publish_time)
                .await
            {
                warn!(title = %items[idx].title, error = %e, "Notification delivery failed");
            }

            stats.processed += 1;
            if in_batch {
                stats.batch_processed += 1;
                if let Some(b) = batch {
                    let progress = 60 + (40 * stats.batch_processed / b.total.max(1)) as u8;
                    self.report_progress(&b.job_id, progress, stats, b.total).await;
                }
            }
        }

        Ok(stats)
    }

    /// Promote due items to published. Items whose remote scheduling failed
    /// or never ran (an upload persisted right before a crash) are promoted
    /// the same way once their slot arrives. A failed promotion stays put
    /// for the next sweep.
    pub async fn publish_due(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut items = self.queue.load().await;
        let mut published = 0;
        let mut changed = false;

        for item in items.iter_mut() {
            if !matches!(
                item.status,
                QueueItemStatus::Scheduled
                    | QueueItemStatus::ScheduleFailed
                    | QueueItemStatus::UploadedPrivate
            ) {
                continue;
            }
            if now < item.scheduled_publish_time - self.config.publish_tolerance {
                continue;
            }

            let Some(remote_id) = item.remote_id.clone() else {
                warn!(title = %item.title, "Scheduled item has no remote id, skipping");
                continue;
            };

            match self.publisher.make_public(&remote_id).await {
                Ok(()) => {
                    item.status = QueueItemStatus::Published;
                    item.published_at = Some(now);
                    published += 1;
                    changed = true;
                    info!(title = %item.title, remote_id = %remote_id, "Item published");
                }
                Err(e) => {
                    error!(
                        title = %item.title,
                        remote_id = %remote_id,
                        error = %e,
                        "Failed to publish item, will retry on next sweep"
                    );
                }
            }
        }

        if changed {
            self.queue.save(&items).await?;
        }
        Ok(published)
    }

    /// Move retry-eligible failed items back to pending.
    pub async fn retry_sweep(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut items = self.queue.load().await;
        let reset = self.retry.reset_eligible(&mut items, now);
        if reset > 0 {
            self.queue.save(&items).await?;
        }
        Ok(reset)
    }

    fn build_item(
        &self,
        job: &Job,
        locator: &str,
        slot: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> QueueItem {
        QueueItem {
            locator: locator.to_string(),
            title: QueueItem::title_from_locator(locator),
            description: format!(
                "{}\n\nGenerated: {}",
                self.config.default_description,
                now.format("%Y-%m-%d %H:%M:%S")
            ),
            tags: self.config.default_tags.clone(),
            status: QueueItemStatus::Pending,
            remote_id: None,
            scheduled_publish_time: slot,
            added_at: now,
            uploaded_at: None,
            published_at: None,
            upload_attempts: 0,
            last_attempt_time: None,
            kind: job.params.kind,
            content_snippet: snippet(&job.params.content),
        }
    }

    /// Checkpoint a job update between stages. Returns false when the job
    /// reached a terminal status concurrently (cancellation), which tells
    /// the pipeline to abandon it without overwriting anything.
    async fn checkpoint(&self, job_id: &str, update: JobUpdate) -> Result<bool, StoreError> {
        match self.jobs.update(job_id, update).await {
            Ok(()) => Ok(true),
            Err(StoreError::TerminalStatus { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Best-effort progress report during the upload pass; a terminal status
    /// here only means the remaining items keep uploading without a reader.
    async fn report_progress(&self, job_id: &str, progress: u8, stats: UploadStats, total: u32) {
        let update = JobUpdate {
            progress: Some(progress.min(99)),
            message: Some(format!(
                "Uploaded {}/{} artifact(s)",
                stats.batch_processed, total
            )),
            artifacts_published: Some(stats.batch_scheduled),
            ..Default::default()
        };
        match self.jobs.update(job_id, update).await {
            Ok(()) => {}
            Err(StoreError::TerminalStatus { .. }) => {
                debug!(job_id = %job_id, "Progress not recorded, job already terminal")
            }
            Err(e) => warn!(job_id = %job_id, error = %e, "Failed to record progress"),
        }
    }
}

/// First ~200 characters of the originating content.
fn snippet(content: &str) -> String {
    if content.chars().count() <= SNIPPET_CHARS {
        return content.to_string();
    }
    let prefix: String = content.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{Artifact, MockContentGenerator, MockPublishTarget};
    use crate::config::NotifierConfig;
    use crate::errors::ExternalError;
    use crate::models::{ArtifactKind, JobParams};
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        pipeline: JobPipeline,
        jobs: JobStore,
        queue: UploadQueueStore,
        server: MockServer,
        _dir: TempDir,
    }

    async fn harness(generator: MockContentGenerator, publisher: MockPublishTarget) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("jobs.db").display());
        let jobs = JobStore::open(&url).await.unwrap();
        let queue = UploadQueueStore::new(dir.path().join("upload_queue.json"));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let notifier = Arc::new(
            NotificationClient::new(&NotifierConfig {
                webhook_url: format!("{}/hook", server.uri()),
                api_key: "hook-key".to_string(),
                timeout_seconds: 5,
                target_timezone: "Asia/Kolkata".to_string(),
                offset_minutes: 15,
            })
            .unwrap(),
        );

        let pipeline = JobPipeline::new(
            jobs.clone(),
            queue.clone(),
            RetryPolicy::default(),
            Arc::new(generator),
            Arc::new(publisher),
            notifier,
            PipelineConfig::default(),
        );

        Harness {
            pipeline,
            jobs,
            queue,
            server,
            _dir: dir,
        }
    }

    fn short_params(content: &str) -> JobParams {
        JobParams {
            content: content.to_string(),
            voice: "onyx".to_string(),
            speed: 1.2,
            kind: ArtifactKind::Short,
            publish_at: Utc::now() + chrono::Duration::hours(4),
        }
    }

    fn counting_publisher() -> MockPublishTarget {
        let mut publisher = MockPublishTarget::new();
        let counter = Arc::new(AtomicU32::new(0));
        publisher.expect_upload().returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("vid_{}", n))
        });
        publisher.expect_schedule().returning(|_, _| Ok(()));
        publisher
            .expect_public_locator()
            .returning(|id| format!("https://videos.example.com/watch/{}", id));
        publisher
    }

    #[tokio::test]
    async fn test_process_job_end_to_end() {
        let mut generator = MockContentGenerator::new();
        generator.expect_generate().returning(|_| {
            Ok(vec![
                Artifact {
                    locator: "http://cdn/brief_part_1.mp4".to_string(),
                },
                Artifact {
                    locator: "http://cdn/brief_part_2.mp4".to_string(),
                },
            ])
        });

        let h = harness(generator, counting_publisher()).await;
        let params = short_params("Market update — pause — Tech news");
        let id = h.jobs.create("owner-a", &params, None).await.unwrap();
        let job = h.jobs.get(&id).await.unwrap();

        h.pipeline.process_job(&job).await;

        let done = h.jobs.get(&id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.artifacts_generated, 2);
        assert_eq!(done.artifacts_published, 2);
        assert!(done.completed_at.is_some());
        assert!(done.error.is_none());

        let items = h.queue.load().await;
        assert_eq!(items.len(), 2);
        for item in &items {
            assert_eq!(item.status, QueueItemStatus::Scheduled);
            assert!(item.remote_id.is_some());
            assert!(item.uploaded_at.is_some());
        }
        // Slots are one interval apart, starting one interval beyond now.
        let spacing = items[1].scheduled_publish_time - items[0].scheduled_publish_time;
        assert_eq!(spacing, chrono::Duration::minutes(150));
        assert!(items[0].scheduled_publish_time > done.created_at);

        // One notification per item, per-batch sequence, full content.
        let requests = h.server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        let first: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(first["sequence_id"], "01");
        assert_eq!(first["full_content"], "Market update — pause — Tech news");
        assert_eq!(
            first["public_url"],
            "https://videos.example.com/watch/vid_1"
        );
        let second: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(second["sequence_id"], "02");
    }

    #[tokio::test]
    async fn test_generation_failure_fails_job() {
        let mut generator = MockContentGenerator::new();
        generator.expect_generate().returning(|_| {
            Err(ExternalError::ServiceReported(
                "render engine out of capacity".to_string(),
            ))
        });

        let h = harness(generator, MockPublishTarget::new()).await;
        let id = h
            .jobs
            .create("owner-a", &short_params("Market update"), None)
            .await
            .unwrap();
        let job = h.jobs.get(&id).await.unwrap();

        h.pipeline.process_job(&job).await;

        let done = h.jobs.get(&id).await.unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.as_deref().unwrap().contains("out of capacity"));
        assert!(done.completed_at.is_some());
        assert!(h.queue.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_job_never_reaches_generation() {
        let mut generator = MockContentGenerator::new();
        generator.expect_generate().times(0);

        let h = harness(generator, MockPublishTarget::new()).await;
        let id = h
            .jobs
            .create("owner-a", &short_params("Market update"), None)
            .await
            .unwrap();
        let job = h.jobs.get(&id).await.unwrap();

        h.jobs
            .update(
                &id,
                JobUpdate {
                    status: Some(JobStatus::Cancelled),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        h.pipeline.process_job(&job).await;

        let after = h.jobs.get(&id).await.unwrap();
        assert_eq!(after.status, JobStatus::Cancelled);
        assert_eq!(after.progress, 0);
    }

    #[tokio::test]
    async fn test_duplicate_titles_are_skipped() {
        let mut generator = MockContentGenerator::new();
        generator.expect_generate().returning(|_| {
            Ok(vec![
                Artifact {
                    locator: "http://cdn/brief_part_1.mp4".to_string(),
                },
                Artifact {
                    locator: "http://cdn/brief_part_2.mp4".to_string(),
                },
            ])
        });

        let h = harness(generator, counting_publisher()).await;

        // Pre-existing scheduled item whose normalized title collides.
        let existing = QueueItem {
            locator: "downloads/brief_part_1.mp4".to_string(),
            title: "Brief, Part 1!".to_string(),
            description: String::new(),
            tags: Vec::new(),
            status: QueueItemStatus::Scheduled,
            remote_id: Some("vid_existing".to_string()),
            scheduled_publish_time: Utc::now() + chrono::Duration::hours(1),
            added_at: Utc::now(),
            uploaded_at: Some(Utc::now()),
            published_at: None,
            upload_attempts: 0,
            last_attempt_time: None,
            kind: ArtifactKind::Short,
            content_snippet: String::new(),
        };
        h.queue.save(&[existing]).await.unwrap();

        let id = h
            .jobs
            .create("owner-a", &short_params("Market update — pause — Tech news"), None)
            .await
            .unwrap();
        let job = h.jobs.get(&id).await.unwrap();
        h.pipeline.process_job(&job).await;

        let done = h.jobs.get(&id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.artifacts_generated, 2);
        assert_eq!(done.artifacts_published, 1);

        let items = h.queue.load().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].title, "brief part 2");
    }

    #[tokio::test]
    async fn test_upload_failure_enters_retry_bookkeeping() {
        let mut generator = MockContentGenerator::new();
        generator.expect_generate().returning(|_| {
            Ok(vec![Artifact {
                locator: "http://cdn/brief_part_1.mp4".to_string(),
            }])
        });

        let mut publisher = MockPublishTarget::new();
        publisher
            .expect_upload()
            .returning(|_| Err(ExternalError::RequestFailed("connection reset".to_string())));

        let h = harness(generator, publisher).await;
        let id = h
            .jobs
            .create("owner-a", &short_params("Market update"), None)
            .await
            .unwrap();
        let job = h.jobs.get(&id).await.unwrap();
        h.pipeline.process_job(&job).await;

        // The job itself completes; the failure is tracked on the item.
        let done = h.jobs.get(&id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.artifacts_published, 0);

        let items = h.queue.load().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, QueueItemStatus::Failed);
        assert_eq!(items[0].upload_attempts, 1);
        assert!(items[0].last_attempt_time.is_some());

        // The notification still fired, with an empty public locator.
        let requests = h.server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["public_url"], "");
    }

    #[tokio::test]
    async fn test_publish_due_promotes_scheduled_and_schedule_failed() {
        let mut publisher = MockPublishTarget::new();
        publisher
            .expect_make_public()
            .with(eq("vid_due"))
            .times(1)
            .returning(|_| Ok(()));
        publisher
            .expect_make_public()
            .with(eq("vid_stuck"))
            .times(1)
            .returning(|_| Ok(()));

        let h = harness(MockContentGenerator::new(), publisher).await;
        let now = Utc::now();
        let due = |title: &str, status, remote: &str, slot| QueueItem {
            locator: format!("http://cdn/{}.mp4", title),
            title: title.to_string(),
            description: String::new(),
            tags: Vec::new(),
            status,
            remote_id: Some(remote.to_string()),
            scheduled_publish_time: slot,
            added_at: now - chrono::Duration::hours(3),
            uploaded_at: Some(now - chrono::Duration::hours(3)),
            published_at: None,
            upload_attempts: 0,
            last_attempt_time: None,
            kind: ArtifactKind::Short,
            content_snippet: String::new(),
        };
        h.queue
            .save(&[
                due(
                    "due",
                    QueueItemStatus::Scheduled,
                    "vid_due",
                    now - chrono::Duration::seconds(30),
                ),
                due(
                    "stuck",
                    QueueItemStatus::ScheduleFailed,
                    "vid_stuck",
                    now - chrono::Duration::minutes(5),
                ),
                due(
                    "later",
                    QueueItemStatus::Scheduled,
                    "vid_later",
                    now + chrono::Duration::hours(2),
                ),
            ])
            .await
            .unwrap();

        let published = h.pipeline.publish_due(now).await.unwrap();
        assert_eq!(published, 2);

        let items = h.queue.load().await;
        assert_eq!(items[0].status, QueueItemStatus::Published);
        assert!(items[0].published_at.is_some());
        assert_eq!(items[1].status, QueueItemStatus::Published);
        assert_eq!(items[2].status, QueueItemStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_failed_promotion_stays_for_next_sweep() {
        let mut publisher = MockPublishTarget::new();
        publisher.expect_make_public().returning(|_| {
            Err(ExternalError::UnexpectedStatus {
                status: 503,
                body: "maintenance".to_string(),
            })
        });

        let h = harness(MockContentGenerator::new(), publisher).await;
        let now = Utc::now();
        h.queue
            .save(&[QueueItem {
                locator: "http://cdn/due.mp4".to_string(),
                title: "due".to_string(),
                description: String::new(),
                tags: Vec::new(),
                status: QueueItemStatus::Scheduled,
                remote_id: Some("vid_due".to_string()),
                scheduled_publish_time: now - chrono::Duration::seconds(10),
                added_at: now - chrono::Duration::hours(3),
                uploaded_at: Some(now - chrono::Duration::hours(3)),
                published_at: None,
                upload_attempts: 0,
                last_attempt_time: None,
                kind: ArtifactKind::Short,
                content_snippet: String::new(),
            }])
            .await
            .unwrap();

        let published = h.pipeline.publish_due(now).await.unwrap();
        assert_eq!(published, 0);
        assert_eq!(h.queue.load().await[0].status, QueueItemStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_sweep_upload_pass_picks_up_retried_items() {
        let h = {
            let mut publisher = MockPublishTarget::new();
            publisher
                .expect_upload()
                .returning(|_| Ok("vid_retry".to_string()));
            publisher.expect_schedule().returning(|_, _| Ok(()));
            publisher
                .expect_public_locator()
                .returning(|id| format!("https://videos.example.com/watch/{}", id));
            harness(MockContentGenerator::new(), publisher).await
        };

        let now = Utc::now();
        h.queue
            .save(&[QueueItem {
                locator: "http://cdn/retry_me.mp4".to_string(),
                title: "retry me".to_string(),
                description: String::new(),
                tags: Vec::new(),
                status: QueueItemStatus::Failed,
                remote_id: None,
                scheduled_publish_time: now + chrono::Duration::hours(2),
                added_at: now - chrono::Duration::hours(1),
                uploaded_at: None,
                published_at: None,
                upload_attempts: 1,
                last_attempt_time: Some(now - chrono::Duration::minutes(20)),
                kind: ArtifactKind::Short,
                content_snippet: "Earlier content".to_string(),
            }])
            .await
            .unwrap();

        let reset = h.pipeline.retry_sweep(now).await.unwrap();
        assert_eq!(reset, 1);

        let stats = h.pipeline.upload_pass(None).await.unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.scheduled, 1);

        let items = h.queue.load().await;
        assert_eq!(items[0].status, QueueItemStatus::Scheduled);
        assert_eq!(items[0].remote_id.as_deref(), Some("vid_retry"));

        // Retried items notify from their stored snippet.
        let requests = h.server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["full_content"], "Earlier content");
    }
}

