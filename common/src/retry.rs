// Bounded progressive retry for upload-queue items
//
// A fixed escalating delay table, not unbounded exponential growth: failures
// past the end of the table keep the final delay until attempts exhaust the
// policy, after which the item needs manual intervention.

use crate::models::{QueueItem, QueueItemStatus};
use chrono::{DateTime, Duration, Utc};
use tracing::info;

/// Escalating delays between retry attempts, in minutes.
pub const DEFAULT_DELAYS_MINUTES: [i64; 5] = [5, 15, 30, 60, 120];

/// Maximum number of upload attempts before an item is permanently failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Retry policy with a capped delay lookup table
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&DEFAULT_DELAYS_MINUTES, DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Create a policy from a delay table (minutes) and an attempt cap.
    pub fn new(delays_minutes: &[i64], max_attempts: u32) -> Self {
        assert!(!delays_minutes.is_empty(), "delay table cannot be empty");
        Self {
            delays: delays_minutes
                .iter()
                .map(|m| Duration::minutes(*m))
                .collect(),
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the next attempt, given the number of failures so far.
    /// Indexes past the end of the table are capped at the final entry.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let index = (attempts as usize).min(self.delays.len() - 1);
        self.delays[index]
    }

    /// Record an upload failure on an item: bump the attempt counter, stamp
    /// the attempt time, and move the item to failed. Whether the failure is
    /// permanent is decided by the attempt cap at scan time.
    pub fn record_failure(&self, item: &mut QueueItem, now: DateTime<Utc>) {
        item.upload_attempts += 1;
        item.last_attempt_time = Some(now);
        item.status = QueueItemStatus::Failed;
    }

    /// An item whose attempts have exhausted the policy stays failed and is
    /// excluded from eligibility scans.
    pub fn is_permanently_failed(&self, item: &QueueItem) -> bool {
        item.status == QueueItemStatus::Failed && item.upload_attempts >= self.max_attempts
    }

    /// A failed item becomes retry-eligible once its escalating delay has
    /// elapsed since the last attempt.
    pub fn is_eligible(&self, item: &QueueItem, now: DateTime<Utc>) -> bool {
        if item.status != QueueItemStatus::Failed {
            return false;
        }
        if item.upload_attempts >= self.max_attempts {
            return false;
        }
        let last = item.last_attempt_time.unwrap_or(item.added_at);
        now - last >= self.delay_for(item.upload_attempts)
    }

    /// Reset every retry-eligible item to pending so it re-enters the normal
    /// pipeline on the next pass. Returns how many items were reset.
    pub fn reset_eligible(&self, items: &mut [QueueItem], now: DateTime<Utc>) -> usize {
        let mut reset = 0;
        for item in items.iter_mut() {
            if self.is_eligible(item, now) {
                item.status = QueueItemStatus::Pending;
                item.last_attempt_time = Some(now);
                reset += 1;
                info!(
                    title = %item.title,
                    attempts = item.upload_attempts,
                    "Queue item re-entered pending pool for retry"
                );
            }
        }
        reset
    }
}
