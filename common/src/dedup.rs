// Title deduplication against upload-queue history
//
// Artifact titles are derived deterministically from source content, so
// re-running generation for unchanged content produces the same titles.
// Comparing normalized titles at enqueue time keeps duplicate submissions
// from double-booking publish slots.

use crate::models::{QueueItem, QueueItemStatus};

/// Canonical form of a title for duplicate comparison: Unicode-lowercased,
/// punctuation stripped, whitespace runs collapsed to a single space.
/// Idempotent: `normalize(normalize(t)) == normalize(t)`.
pub fn normalize(text: &str) -> String {
    // Lowercase before stripping: special lowercase mappings can expand into
    // combining marks, which the punctuation filter then removes. The other
    // order would leave the first pass un-idempotent.
    let folded: String = text
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True iff the candidate title matches any live item in the snapshot.
/// Permanently failed items are excluded: their slot was never honored, so a
/// resubmission is a legitimate new attempt.
pub fn is_duplicate(candidate_title: &str, existing: &[QueueItem]) -> bool {
    let candidate = normalize(candidate_title);
    existing
        .iter()
        .filter(|item| item.status != QueueItemStatus::Failed)
        .any(|item| normalize(&item.title) == candidate)
}
