// Background worker engine
//
// One long-lived task per process: a job poll loop that drives queued jobs
// through the pipeline, and a sweep loop that retries, uploads leftovers,
// promotes due items to published, and runs retention housekeeping. One
// job's failure never halts either loop.

pub mod pipeline;

use crate::config::Settings;
use crate::store::JobStore;
use chrono::Utc;
use pipeline::JobPipeline;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, instrument};

/// Configuration for the worker engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often to poll for queued jobs
    pub poll_interval: Duration,
    /// How often to run the retry/publish/housekeeping sweep
    pub sweep_interval: Duration,
    /// How long terminal jobs are retained
    pub job_retention: chrono::Duration,
    /// How long terminal queue items are retained (the dedup horizon)
    pub queue_retention: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
            job_retention: chrono::Duration::days(7),
            queue_retention: chrono::Duration::days(14),
        }
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            poll_interval: Duration::from_secs(settings.worker.poll_interval_seconds),
            sweep_interval: Duration::from_secs(settings.worker.sweep_interval_seconds),
            job_retention: chrono::Duration::days(settings.scheduling.job_retention_days),
            queue_retention: chrono::Duration::days(settings.scheduling.queue_retention_days),
        }
    }
}

/// Main worker engine: owns the loops, delegates per-job work to the pipeline
pub struct WorkerEngine {
    config: EngineConfig,
    jobs: JobStore,
    pipeline: Arc<JobPipeline>,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl WorkerEngine {
    pub fn new(config: EngineConfig, jobs: JobStore, pipeline: JobPipeline) -> Self {
        let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel(1);
        Self {
            config,
            jobs,
            pipeline: Arc::new(pipeline),
            shutdown_tx,
        }
    }

    /// Get a shutdown signal receiver
    pub fn shutdown_receiver(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Stop the engine; the in-flight pass completes before the loop exits.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the engine until a shutdown signal arrives.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        info!(
            poll_interval_seconds = self.config.poll_interval.as_secs(),
            sweep_interval_seconds = self.config.sweep_interval.as_secs(),
            "Starting worker engine"
        );

        let mut poll_tick = interval(self.config.poll_interval);
        let mut sweep_tick = interval(self.config.sweep_interval);
        let mut shutdown_rx = self.shutdown_receiver();

        loop {
            tokio::select! {
                _ = poll_tick.tick() => {
                    let processed = self.process_queued_jobs().await;
                    if processed > 0 {
                        info!(jobs_processed = processed, "Processed queued jobs");
                    } else {
                        debug!("No queued jobs");
                    }
                }
                _ = sweep_tick.tick() => {
                    self.run_sweeps().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping worker engine");
                    break;
                }
            }
        }

        info!("Worker engine stopped");
    }

    /// Drain the queued-job backlog, serially and in submission order.
    pub async fn process_queued_jobs(&self) -> usize {
        let queued = match self.jobs.fetch_queued().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Failed to fetch queued jobs");
                return 0;
            }
        };

        let mut shutdown_rx = self.shutdown_receiver();
        let mut processed = 0;

        for job in queued {
            if shutdown_rx.try_recv().is_ok() {
                info!("Shutdown requested, leaving remaining jobs queued");
                break;
            }
            self.pipeline.process_job(&job).await;
            processed += 1;
        }

        processed
    }

    /// One sweep round: retry eligibility, leftover uploads, due publishes,
    /// then retention housekeeping. Each step is independent; a failure in
    /// one is logged and the rest still run.
    pub async fn run_sweeps(&self) {
        let now = Utc::now();

        match self.pipeline.retry_sweep(now).await {
            Ok(reset) if reset > 0 => info!(reset, "Retry sweep reset items to pending"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Retry sweep failed"),
        }

        if let Err(e) = self.pipeline.upload_pass(None).await {
            error!(error = %e, "Leftover upload pass failed");
        }

        match self.pipeline.publish_due(now).await {
            Ok(published) if published > 0 => {
                info!(published, "Publish sweep promoted due items")
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Publish sweep failed"),
        }

        match self.jobs.purge(now - self.config.job_retention).await {
            Ok(_) => {}
            Err(e) => error!(error = %e, "Job retention purge failed"),
        }

        if let Err(e) = self
            .pipeline
            .queue_store()
            .prune(now - self.config.queue_retention)
            .await
        {
            error!(error = %e, "Queue prune failed");
        }
    }
}
