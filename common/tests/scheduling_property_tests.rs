// Property-based tests for publish-slot allocation

use chrono::{Duration, TimeZone, Utc};
use common::models::{ArtifactKind, QueueItem, QueueItemStatus};
use common::schedule::{allocate, interval_from_hours};
use proptest::prelude::*;

fn item(status: QueueItemStatus, slot: chrono::DateTime<Utc>) -> QueueItem {
    QueueItem {
        locator: "downloads/clip.mp4".to_string(),
        title: "clip".to_string(),
        description: String::new(),
        tags: Vec::new(),
        status,
        remote_id: None,
        scheduled_publish_time: slot,
        added_at: slot - Duration::hours(3),
        uploaded_at: None,
        published_at: None,
        upload_attempts: 0,
        last_attempt_time: None,
        kind: ArtifactKind::Short,
        content_snippet: String::new(),
    }
}

proptest! {
    /// All slots are exactly one interval apart and strictly in the future.
    #[test]
    fn property_slots_are_evenly_spaced(
        count in 1usize..10,
        interval_minutes in 1i64..720,
        now_offset in 0i64..1_000_000,
    ) {
        let now = Utc.timestamp_opt(1_750_000_000 + now_offset, 0).unwrap();
        let interval = Duration::minutes(interval_minutes);

        let slots = allocate(&[], count, interval, None, now);
        prop_assert_eq!(slots.len(), count);
        prop_assert!(slots[0] > now);
        for pair in slots.windows(2) {
            prop_assert_eq!(pair[1] - pair[0], interval);
        }
    }

    /// Sequential no-anchor allocations never produce overlapping slots,
    /// as long as each allocation's items land in the snapshot before the
    /// next call.
    #[test]
    fn property_sequential_allocations_never_collide(
        batch_sizes in proptest::collection::vec(1usize..5, 1..5),
        interval_minutes in 1i64..720,
    ) {
        let now = Utc.timestamp_opt(1_750_000_000, 0).unwrap();
        let interval = Duration::minutes(interval_minutes);

        let mut queue: Vec<QueueItem> = Vec::new();
        let mut all_slots = Vec::new();

        for size in batch_sizes {
            let slots = allocate(&queue, size, interval, None, now);
            for slot in &slots {
                queue.push(item(QueueItemStatus::Pending, *slot));
            }
            all_slots.extend(slots);
        }

        let mut sorted = all_slots.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), all_slots.len(), "a slot was double-booked");

        // Adjacent committed slots keep at least one interval of spacing.
        for pair in sorted.windows(2) {
            prop_assert!(pair[1] - pair[0] >= interval);
        }
    }

    /// With an explicit anchor the first slot is the anchor itself.
    #[test]
    fn property_explicit_anchor_is_first_slot(
        count in 1usize..10,
        interval_minutes in 1i64..720,
        anchor_offset in 1i64..1_000_000,
    ) {
        let now = Utc.timestamp_opt(1_750_000_000, 0).unwrap();
        let anchor = now + Duration::seconds(anchor_offset);
        let interval = Duration::minutes(interval_minutes);

        let slots = allocate(&[], count, interval, Some(anchor), now);
        prop_assert_eq!(slots[0], anchor);
        for (i, slot) in slots.iter().enumerate() {
            prop_assert_eq!(*slot, anchor + interval * i as i32);
        }
    }

    /// Terminal or past items never push the timeline forward.
    #[test]
    fn property_only_live_future_items_hold_slots(
        future_minutes in 1i64..10_000,
    ) {
        let now = Utc.timestamp_opt(1_750_000_000, 0).unwrap();
        let interval = interval_from_hours(2.5);
        let future = now + Duration::minutes(future_minutes);

        let queue = vec![
            item(QueueItemStatus::Published, future),
            item(QueueItemStatus::Failed, future),
            item(QueueItemStatus::Scheduled, now - Duration::minutes(5)),
        ];

        let slots = allocate(&queue, 1, interval, None, now);
        prop_assert_eq!(slots[0], now + interval);
    }
}

/// The documented allocation sequence: an empty queue yields T+2.5h and
/// T+5h, and a follow-up single allocation lands at T+7.5h.
#[test]
fn allocation_rolls_the_documented_timeline() {
    let now = Utc.timestamp_opt(1_750_000_000, 0).unwrap();
    let interval = interval_from_hours(2.5);

    let first = allocate(&[], 2, interval, None, now);
    assert_eq!(
        first,
        vec![now + Duration::minutes(150), now + Duration::minutes(300)]
    );

    let queue: Vec<QueueItem> = first
        .iter()
        .map(|slot| item(QueueItemStatus::Pending, *slot))
        .collect();
    let second = allocate(&queue, 1, interval, None, now);
    assert_eq!(second, vec![now + Duration::minutes(450)]);
}
