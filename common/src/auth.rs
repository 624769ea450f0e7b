// Owner-key admission gate: recognition, request rate, concurrent-job cap
//
// Contract: owner key in, allow/deny plus reason out. The request window is
// an in-memory mirror guarded by a single mutex held only for map access;
// the concurrent-job count comes from the job store and is passed in by the
// caller so no lock is ever held across I/O.

use crate::errors::AuthError;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// Sliding-window admission gate for job submissions
pub struct AccessGate {
    owner_keys: HashSet<String>,
    max_per_minute: u32,
    max_concurrent: u32,
    window: Duration,
    requests: Mutex<HashMap<String, Vec<Instant>>>,
}

impl AccessGate {
    pub fn new(owner_keys: &[String], max_per_minute: u32, max_concurrent: u32) -> Self {
        Self::with_window(
            owner_keys,
            max_per_minute,
            max_concurrent,
            Duration::from_secs(60),
        )
    }

    /// Gate with a custom rate window.
    pub fn with_window(
        owner_keys: &[String],
        max_per_minute: u32,
        max_concurrent: u32,
        window: Duration,
    ) -> Self {
        Self {
            owner_keys: owner_keys.iter().cloned().collect(),
            max_per_minute,
            max_concurrent,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Reject owner keys that were never configured.
    pub fn recognize(&self, owner_key: &str) -> Result<(), AuthError> {
        if self.owner_keys.contains(owner_key) {
            Ok(())
        } else {
            warn!("Submission with unrecognized owner key rejected");
            Err(AuthError::UnknownOwner)
        }
    }

    /// Sliding-window rate check. Only admitted requests consume a slot, so
    /// a denied burst does not extend its own penalty.
    pub fn check_rate(&self, owner_key: &str) -> Result<(), AuthError> {
        let now = Instant::now();
        let mut requests = self.requests.lock().expect("rate window mutex poisoned");
        let window = requests.entry(owner_key.to_string()).or_default();
        window.retain(|t| now.duration_since(*t) < self.window);

        if window.len() as u32 >= self.max_per_minute {
            warn!(
                count = window.len(),
                max = self.max_per_minute,
                "Rate limit exceeded"
            );
            return Err(AuthError::RateLimitExceeded {
                max_per_minute: self.max_per_minute,
            });
        }

        window.push(now);
        Ok(())
    }

    /// Cap on queued/processing jobs per owner. The caller supplies the
    /// current count from the job store.
    pub fn check_concurrent(&self, active_jobs: i64) -> Result<(), AuthError> {
        if active_jobs >= self.max_concurrent as i64 {
            return Err(AuthError::ConcurrentJobsExceeded {
                max: self.max_concurrent,
            });
        }
        Ok(())
    }

    /// Full admission check for a submission.
    pub fn admit(&self, owner_key: &str, active_jobs: i64) -> Result<(), AuthError> {
        self.recognize(owner_key)?;
        self.check_concurrent(active_jobs)?;
        self.check_rate(owner_key)?;
        Ok(())
    }
}
