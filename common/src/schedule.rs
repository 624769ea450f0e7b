// Publish-slot allocation over the rolling queue timeline
//
// Slots are spaced a fixed interval apart. Without an explicit anchor the
// next slot lands strictly beyond the latest live commitment, so sequential
// allocations never double-book as long as the snapshot is read immediately
// before allocating (single-writer queue, see the worker).

use crate::models::{QueueItem, QueueItemStatus};
use chrono::{DateTime, Duration, Utc};

/// Convert the configured fractional hour interval into a concrete duration.
pub fn interval_from_hours(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0) as i64)
}

/// Compute `count` publish timestamps.
///
/// With an explicit anchor the first slot is the anchor itself. Without one,
/// the anchor is the latest future commitment among pending/scheduled items
/// (or `now` for an empty timeline) and every slot is at least one interval
/// beyond it.
pub fn allocate(
    snapshot: &[QueueItem],
    count: usize,
    interval: Duration,
    explicit_anchor: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    match explicit_anchor {
        Some(anchor) => (0..count).map(|i| anchor + interval * i as i32).collect(),
        None => {
            let base = last_committed_slot(snapshot, now).unwrap_or(now);
            (1..=count).map(|i| base + interval * i as i32).collect()
        }
    }
}

/// Latest scheduled publish time among live (pending or scheduled) queue
/// items that is still in the future.
fn last_committed_slot(snapshot: &[QueueItem], now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    snapshot
        .iter()
        .filter(|item| {
            matches!(
                item.status,
                QueueItemStatus::Pending | QueueItemStatus::Scheduled
            )
        })
        .map(|item| item.scheduled_publish_time)
        .filter(|t| *t > now)
        .max()
}
