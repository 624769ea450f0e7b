// Property-based tests for title normalization and deduplication

use common::dedup::normalize;
use proptest::prelude::*;

proptest! {
    /// Normalization is idempotent for arbitrary input.
    #[test]
    fn property_normalize_idempotent(input in ".{0,200}") {
        let once = normalize(&input);
        prop_assert_eq!(normalize(&once), once);
    }

    /// Case differences never produce distinct normal forms.
    #[test]
    fn property_normalize_case_insensitive(input in "[a-zA-Z0-9 ,.!?]{0,100}") {
        prop_assert_eq!(
            normalize(&input.to_uppercase()),
            normalize(&input.to_lowercase())
        );
    }

    /// Inserting punctuation never changes the normal form.
    #[test]
    fn property_normalize_punctuation_insensitive(
        words in proptest::collection::vec("[a-z0-9]{1,8}", 1..6),
        punct in "[,.!?;:'\"()-]{1,4}",
    ) {
        let plain = words.join(" ");
        let punctuated = words.join(&format!("{} ", punct));
        prop_assert_eq!(normalize(&plain), normalize(&punctuated));
    }

    /// The normal form carries only alphanumerics separated by single
    /// spaces, with no surrounding whitespace.
    #[test]
    fn property_normal_form_is_canonical(input in ".{0,200}") {
        let normal = normalize(&input);
        prop_assert!(normal.chars().all(|c| c.is_alphanumeric() || c == ' '));
        prop_assert!(!normal.starts_with(' '));
        prop_assert!(!normal.ends_with(' '));
        prop_assert!(!normal.contains("  "));
    }
}

#[test]
fn normalize_matches_known_equivalences() {
    assert_eq!(normalize("ABC, Inc."), normalize("abc inc"));
    assert_eq!(normalize("ABC, Inc."), "abc inc");
}
