//! # Conflict Detector
//!
//! Classifies each outbound operation as clean or conflicting by comparing
//! the version the operation was based on against the remote store's
//! current version.
//!
//! ## Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   base_version vs current remote version                │
//! │                                                                         │
//! │  note absent remotely, op is CREATE      → Clean                       │
//! │  note absent remotely, op is not CREATE  → RemoteMissing (permanent)   │
//! │  base == current                         → Clean                       │
//! │  base <  current                         → Conflict                    │
//! │  base >  current                         → Diverged (invariant         │
//! │                                            violation: local state      │
//! │                                            references a version the    │
//! │                                            remote never issued)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Diverged is a fatal detector outcome: the coordinator logs it and
//! quarantines the note. It is never auto-healed.

use quill_core::OperationKind;

// =============================================================================
// Classification
// =============================================================================

/// Outcome of comparing an operation's base version with the remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The operation can be applied as-is.
    Clean,
    /// The operation is stale; route to the resolution pipeline.
    Conflict,
    /// Local base version is ahead of the remote: corrupted local state.
    Diverged,
    /// The remote note no longer exists but the operation expected it to.
    RemoteMissing,
}

/// Classifies an outbound operation against the remote store's current
/// version for the note (`None` when the note does not exist remotely).
pub fn classify(
    kind: OperationKind,
    base_version: i64,
    remote_version: Option<i64>,
) -> Classification {
    let current = match remote_version {
        None => {
            return if kind == OperationKind::Create {
                Classification::Clean
            } else {
                Classification::RemoteMissing
            };
        }
        Some(version) => version,
    };

    match base_version.cmp(&current) {
        std::cmp::Ordering::Equal => Classification::Clean,
        std::cmp::Ordering::Less => Classification::Conflict,
        std::cmp::Ordering::Greater => Classification::Diverged,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_against_missing_note_is_clean() {
        assert_eq!(
            classify(OperationKind::Create, 0, None),
            Classification::Clean
        );
    }

    #[test]
    fn test_update_against_missing_note() {
        assert_eq!(
            classify(OperationKind::Update, 3, None),
            Classification::RemoteMissing
        );
        assert_eq!(
            classify(OperationKind::Delete, 3, None),
            Classification::RemoteMissing
        );
    }

    #[test]
    fn test_matching_versions_are_clean() {
        assert_eq!(
            classify(OperationKind::Update, 4, Some(4)),
            Classification::Clean
        );
    }

    #[test]
    fn test_stale_base_conflicts() {
        assert_eq!(
            classify(OperationKind::Update, 2, Some(5)),
            Classification::Conflict
        );
    }

    #[test]
    fn test_base_ahead_of_remote_diverged() {
        assert_eq!(
            classify(OperationKind::Update, 9, Some(5)),
            Classification::Diverged
        );
    }

    // Property-based coverage over randomized version pairs.
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_stale_base_always_conflicts(
                base in 0i64..1000,
                ahead in 1i64..1000,
            ) {
                let current = base + ahead;
                prop_assert_eq!(
                    classify(OperationKind::Update, base, Some(current)),
                    Classification::Conflict
                );
            }

            #[test]
            fn prop_matching_base_always_clean(version in 0i64..1_000_000) {
                prop_assert_eq!(
                    classify(OperationKind::Update, version, Some(version)),
                    Classification::Clean
                );
                prop_assert_eq!(
                    classify(OperationKind::Delete, version, Some(version)),
                    Classification::Clean
                );
            }

            #[test]
            fn prop_base_ahead_always_diverged(
                current in 0i64..1000,
                ahead in 1i64..1000,
            ) {
                prop_assert_eq!(
                    classify(OperationKind::Update, current + ahead, Some(current)),
                    Classification::Diverged
                );
            }

            #[test]
            fn prop_mismatch_never_clean(
                base in 0i64..100,
                current in 0i64..100,
            ) {
                prop_assume!(base != current);
                let classification = classify(OperationKind::Update, base, Some(current));
                prop_assert_ne!(classification, Classification::Clean);
            }
        }
    }
}
