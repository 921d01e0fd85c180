//! # Merge Heuristic
//!
//! Deterministic, conservative auto-merge for conflicting note snapshots.
//!
//! ## Merge Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Auto-Merge Decision Table                          │
//! │                                                                         │
//! │  FIELD      RULE                                                       │
//! │  ─────      ────────────────────────────────────────────────────        │
//! │  title      keep whichever side is longer (tie → local)                │
//! │  tags       union of both sets                                         │
//! │  content    identical           → keep either                          │
//! │             one side is an unmodified prefix or suffix of the          │
//! │             other               → keep the longer                      │
//! │             anything else      → MANUAL (no merge suggested)           │
//! │                                                                         │
//! │  A single MANUAL field makes the whole merge manual: both snapshots    │
//! │  are surfaced for human choice instead. Prose is never stitched        │
//! │  together from disjoint edits.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This is intentionally NOT a general text merge. The prefix/suffix check
//! only recognizes pure append or pure prepend; any overlapping edit falls
//! through to manual resolution.

use crate::types::NoteSnapshot;

// =============================================================================
// Merge Outcome
// =============================================================================

/// Result of running the auto-merge heuristic over a conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// The heuristic produced a complete merged snapshot.
    Merged(NoteSnapshot),
    /// The content sides diverged; a human must choose.
    Manual,
}

impl MergeOutcome {
    /// Returns the merged snapshot, if any.
    pub fn merged(self) -> Option<NoteSnapshot> {
        match self {
            MergeOutcome::Merged(snapshot) => Some(snapshot),
            MergeOutcome::Manual => None,
        }
    }
}

// =============================================================================
// Heuristic
// =============================================================================

/// Produces a merge suggestion for two conflicting snapshots, or `Manual`
/// when the content cannot be merged without losing an edit.
pub fn suggest_merge(local: &NoteSnapshot, remote: &NoteSnapshot) -> MergeOutcome {
    let content = match merge_content(&local.content, &remote.content) {
        Some(content) => content,
        None => return MergeOutcome::Manual,
    };

    let title = if remote.title.chars().count() > local.title.chars().count() {
        remote.title.clone()
    } else {
        local.title.clone()
    };

    let tags = local.tags.union(&remote.tags).cloned().collect();

    // The later write carries the editor identity and timestamp forward.
    let (last_editor, updated_at) = if remote.updated_at > local.updated_at {
        (remote.last_editor.clone(), remote.updated_at)
    } else {
        (local.last_editor.clone(), local.updated_at)
    };

    MergeOutcome::Merged(NoteSnapshot {
        title,
        content,
        tags,
        last_editor,
        updated_at,
    })
}

/// Merges content iff one side is an unmodified prefix or suffix of the
/// other. Returns None when both sides were edited independently.
fn merge_content(local: &str, remote: &str) -> Option<String> {
    if local == remote {
        return Some(local.to_string());
    }

    let (shorter, longer) = if local.len() <= remote.len() {
        (local, remote)
    } else {
        (remote, local)
    };

    if longer.starts_with(shorter) || longer.ends_with(shorter) {
        return Some(longer.to_string());
    }

    None
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    fn snapshot(title: &str, content: &str, tags: &[&str], editor: &str) -> NoteSnapshot {
        NoteSnapshot {
            title: title.to_string(),
            content: content.to_string(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            last_editor: editor.to_string(),
            updated_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_tag_union_is_exact() {
        let local = snapshot("n", "same", &["a", "b"], "alice");
        let remote = snapshot("n", "same", &["b", "c"], "bob");

        let merged = suggest_merge(&local, &remote).merged().unwrap();
        let expected: BTreeSet<String> =
            ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(merged.tags, expected);
    }

    #[test]
    fn test_longer_title_wins() {
        let local = snapshot("Meeting", "same", &[], "alice");
        let remote = snapshot("Meeting notes", "same", &[], "bob");

        let merged = suggest_merge(&local, &remote).merged().unwrap();
        assert_eq!(merged.title, "Meeting notes");
    }

    #[test]
    fn test_title_tie_keeps_local() {
        let local = snapshot("Alpha", "same", &[], "alice");
        let remote = snapshot("Bravo", "same", &[], "bob");

        let merged = suggest_merge(&local, &remote).merged().unwrap();
        assert_eq!(merged.title, "Alpha");
    }

    #[test]
    fn test_appended_content_keeps_longer() {
        let local = snapshot("n", "shopping list", &[], "alice");
        let remote = snapshot("n", "shopping list\n- milk", &[], "bob");

        let merged = suggest_merge(&local, &remote).merged().unwrap();
        assert_eq!(merged.content, "shopping list\n- milk");
    }

    #[test]
    fn test_prepended_content_keeps_longer() {
        let local = snapshot("n", "DRAFT\nbody text", &[], "alice");
        let remote = snapshot("n", "body text", &[], "bob");

        let merged = suggest_merge(&local, &remote).merged().unwrap();
        assert_eq!(merged.content, "DRAFT\nbody text");
    }

    #[test]
    fn test_identical_content_merges() {
        let local = snapshot("n", "same body", &["x"], "alice");
        let remote = snapshot("n", "same body", &["y"], "bob");

        assert!(matches!(
            suggest_merge(&local, &remote),
            MergeOutcome::Merged(_)
        ));
    }

    #[test]
    fn test_disjoint_edits_are_manual() {
        let local = snapshot("n", "the cat sat", &[], "alice");
        let remote = snapshot("n", "the dog sat", &[], "bob");

        assert_eq!(suggest_merge(&local, &remote), MergeOutcome::Manual);
    }

    #[test]
    fn test_overlapping_middle_edit_is_manual() {
        // Remote inserted in the middle, local appended. Neither side is a
        // pure prefix/suffix of the other.
        let local = snapshot("n", "one two three four", &[], "alice");
        let remote = snapshot("n", "one two 2.5 three", &[], "bob");

        assert_eq!(suggest_merge(&local, &remote), MergeOutcome::Manual);
    }

    #[test]
    fn test_manual_outcome_has_no_snapshot() {
        let local = snapshot("n", "aaa", &[], "alice");
        let remote = snapshot("n", "bbb", &[], "bob");

        assert_eq!(suggest_merge(&local, &remote).merged(), None);
    }

    #[test]
    fn test_later_editor_carries_forward() {
        let mut local = snapshot("n", "body", &[], "alice");
        let mut remote = snapshot("n", "body plus more", &[], "bob");
        local.updated_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        remote.updated_at = Utc.with_ymd_and_hms(2024, 6, 1, 13, 0, 0).unwrap();

        let merged = suggest_merge(&local, &remote).merged().unwrap();
        assert_eq!(merged.last_editor, "bob");
        assert_eq!(merged.updated_at, remote.updated_at);
    }
}
