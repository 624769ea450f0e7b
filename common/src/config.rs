// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub limits: LimitsConfig,
    pub scheduling: SchedulingConfig,
    pub generator: GeneratorConfig,
    pub publisher: PublisherConfig,
    pub notifier: NotifierConfig,
    pub worker: WorkerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite connection string for the job store,
    /// e.g. "sqlite://publica.db?mode=rwc"
    pub job_db_url: String,
    /// Path of the serialized upload queue file
    pub queue_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Recognized owner keys; submissions from anyone else are rejected
    pub owner_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_requests_per_minute: u32,
    pub max_concurrent_jobs: u32,
    pub max_content_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Spacing between successive publish slots
    pub interval_hours: f64,
    /// Scheduled items within this window of their slot are promoted
    pub publish_tolerance_seconds: u64,
    /// Terminal jobs older than this are purged
    pub job_retention_days: i64,
    /// Terminal queue items older than this are pruned; bounds the dedup
    /// history horizon
    pub queue_retention_days: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            interval_hours: 2.5,
            publish_tolerance_seconds: 60,
            job_retention_days: 7,
            queue_retention_days: 14,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub base_url: String,
    /// Timeout for the generation submit call
    pub submit_timeout_seconds: u64,
    /// Timeout for each status poll
    pub poll_timeout_seconds: u64,
    /// Delay between status polls
    pub poll_interval_seconds: u64,
    /// Upper bound on status polls before the generation counts as failed
    pub max_polls: u32,
    pub default_voice: String,
    pub default_speed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    pub base_url: String,
    /// Static bearer credential for the publish target
    pub token: String,
    pub timeout_seconds: u64,
    /// Base of the public watch URL, joined with the remote id
    pub public_url_base: String,
    pub default_description: String,
    #[serde(default)]
    pub default_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub webhook_url: String,
    /// Static credential sent in the x-webhook-key header
    pub api_key: String,
    pub timeout_seconds: u64,
    /// Fixed timezone the target time is rendered in, e.g. "Asia/Kolkata"
    pub target_timezone: String,
    /// Fixed offset added to the publish slot for the downstream event
    pub offset_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How often to poll for queued jobs
    pub poll_interval_seconds: u64,
    /// How often to run the publish/retry/housekeeping sweep
    pub sweep_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 30,
            sweep_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment-specific configuration
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.storage.job_db_url.is_empty() {
            return Err("Job database URL cannot be empty".to_string());
        }
        if self.storage.queue_path.is_empty() {
            return Err("Queue path cannot be empty".to_string());
        }

        if self.auth.owner_keys.is_empty() {
            return Err("At least one owner key must be configured".to_string());
        }

        if self.limits.max_requests_per_minute == 0 {
            return Err("max_requests_per_minute must be greater than 0".to_string());
        }
        if self.limits.max_concurrent_jobs == 0 {
            return Err("max_concurrent_jobs must be greater than 0".to_string());
        }
        if self.limits.max_content_chars == 0 {
            return Err("max_content_chars must be greater than 0".to_string());
        }

        if self.scheduling.interval_hours <= 0.0 {
            return Err("Scheduling interval_hours must be positive".to_string());
        }
        if self.scheduling.job_retention_days <= 0 || self.scheduling.queue_retention_days <= 0 {
            return Err("Retention windows must be positive".to_string());
        }

        if self.generator.base_url.is_empty() {
            return Err("Generator base URL cannot be empty".to_string());
        }
        if self.generator.max_polls == 0 {
            return Err("Generator max_polls must be greater than 0".to_string());
        }
        if self.generator.poll_interval_seconds == 0 {
            return Err("Generator poll_interval_seconds must be greater than 0".to_string());
        }

        if self.publisher.base_url.is_empty() {
            return Err("Publisher base URL cannot be empty".to_string());
        }

        if self.notifier.webhook_url.is_empty() {
            return Err("Notifier webhook URL cannot be empty".to_string());
        }
        if self.notifier.target_timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(format!(
                "Invalid notifier target timezone: {}",
                self.notifier.target_timezone
            ));
        }

        if self.worker.poll_interval_seconds == 0 || self.worker.sweep_interval_seconds == 0 {
            return Err("Worker intervals must be greater than 0".to_string());
        }

        Ok(())
    }
}
