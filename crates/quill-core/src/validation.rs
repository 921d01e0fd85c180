//! # Validation Module
//!
//! Input validation for notes before they enter the local store or the
//! outbound sync queue.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (app/UI)                                              │
//! │  ├── Basic format checks (empty, length)                               │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Domain rule validation before persist/enqueue                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  └── NOT NULL / CHECK / UNIQUE constraints                             │
//! │                                                                         │
//! │  Defense in depth: multiple layers catch different errors              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::NoteSnapshot;
use crate::{MAX_CONTENT_LEN, MAX_TAGS, MAX_TAG_LEN, MAX_TITLE_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a note title.
///
/// ## Rules
/// - Must not be empty after trimming
/// - Must be at most [`MAX_TITLE_LEN`] characters
pub fn validate_title(title: &str) -> ValidationResult<()> {
    let title = title.trim();

    if title.is_empty() {
        return Err(ValidationError::Required {
            field: "title".to_string(),
        });
    }

    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::TooLong {
            field: "title".to_string(),
            max: MAX_TITLE_LEN,
        });
    }

    Ok(())
}

/// Validates note content. Empty content is allowed (a title-only note).
pub fn validate_content(content: &str) -> ValidationResult<()> {
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(ValidationError::TooLong {
            field: "content".to_string(),
            max: MAX_CONTENT_LEN,
        });
    }

    Ok(())
}

/// Validates a single tag.
///
/// ## Rules
/// - Must not be empty after trimming
/// - Must be at most [`MAX_TAG_LEN`] characters
/// - Must not contain whitespace or commas (tags are atomic tokens)
pub fn validate_tag(tag: &str) -> ValidationResult<()> {
    let tag = tag.trim();

    if tag.is_empty() {
        return Err(ValidationError::Required {
            field: "tag".to_string(),
        });
    }

    if tag.chars().count() > MAX_TAG_LEN {
        return Err(ValidationError::TooLong {
            field: "tag".to_string(),
            max: MAX_TAG_LEN,
        });
    }

    if tag.chars().any(|c| c.is_whitespace() || c == ',') {
        return Err(ValidationError::InvalidFormat {
            field: "tag".to_string(),
            reason: "must not contain whitespace or commas".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Composite Validator
// =============================================================================

/// Validates a full snapshot before it is persisted or queued for sync.
pub fn validate_snapshot(snapshot: &NoteSnapshot) -> ValidationResult<()> {
    validate_title(&snapshot.title)?;
    validate_content(&snapshot.content)?;

    if snapshot.tags.len() > MAX_TAGS {
        return Err(ValidationError::TooMany {
            field: "tags".to_string(),
            max: MAX_TAGS,
        });
    }

    for tag in &snapshot.tags {
        validate_tag(tag)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
