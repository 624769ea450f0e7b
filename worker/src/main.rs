// Worker binary entry point

use anyhow::Result;
use common::clients::{ContentGenerator, HttpContentGenerator, HttpPublishTarget, PublishTarget};
use common::config::Settings;
use common::notify::NotificationClient;
use common::retry::RetryPolicy;
use common::store::{JobStore, UploadQueueStore};
use common::telemetry;
use common::worker::pipeline::{JobPipeline, PipelineConfig};
use common::worker::{EngineConfig, WorkerEngine};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load().map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    // Initialize structured logging
    telemetry::init_logging(&settings.observability.log_level)?;

    info!("Starting Publica worker");

    // Initialize stores
    let jobs = JobStore::open(&settings.storage.job_db_url).await.map_err(|e| {
        error!(error = %e, "Failed to open job store");
        anyhow::anyhow!("Job store initialization error: {}", e)
    })?;
    let queue = UploadQueueStore::new(&settings.storage.queue_path);

    info!("Stores initialized");

    // Initialize external service clients
    let generator: Arc<dyn ContentGenerator> =
        Arc::new(HttpContentGenerator::new(&settings.generator).map_err(|e| {
            anyhow::anyhow!("Generation client initialization error: {}", e)
        })?);
    let publisher: Arc<dyn PublishTarget> =
        Arc::new(HttpPublishTarget::new(&settings.publisher).map_err(|e| {
            anyhow::anyhow!("Publish target initialization error: {}", e)
        })?);
    let notifier = Arc::new(NotificationClient::new(&settings.notifier).map_err(|e| {
        anyhow::anyhow!("Notification client initialization error: {}", e)
    })?);

    info!("External service clients initialized");

    // Wire the pipeline and engine
    let pipeline = JobPipeline::new(
        jobs.clone(),
        queue,
        RetryPolicy::default(),
        generator,
        publisher,
        notifier,
        PipelineConfig::from_settings(&settings),
    );
    let engine = Arc::new(WorkerEngine::new(
        EngineConfig::from_settings(&settings),
        jobs,
        pipeline,
    ));

    let engine_handle = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine.start().await;
        })
    };

    info!("Worker is running. Press Ctrl+C to shutdown gracefully");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, initiating graceful shutdown");
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    }

    engine.stop();

    info!("Waiting for the in-flight pass to complete");
    let _ = engine_handle.await;

    info!("Worker shutdown complete");
    Ok(())
}
