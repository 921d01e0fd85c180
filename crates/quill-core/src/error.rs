//! # Error Types
//!
//! Domain-specific error types for quill-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  quill-core errors (this file)                                         │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  quill-db errors (separate crate)                                      │
//! │  └── DbError          - Local store operation failures                 │
//! │                                                                         │
//! │  quill-sync errors (separate crate)                                    │
//! │  ├── SyncError        - Engine failures                                │
//! │  └── RemoteError      - Remote store outcomes (incl. Conflict)         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError/SyncError → caller        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (note id, field name, etc.)
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
///
/// These errors represent domain rule violations. They should be caught and
/// translated to user-friendly messages by whatever surface exposes them.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Note cannot be found.
    #[error("Note not found: {0}")]
    NoteNotFound(String),

    /// A payload could not be serialized or deserialized.
    ///
    /// ## When This Occurs
    /// - A `sync_operations.payload` column holds malformed JSON
    /// - A snapshot fails to round-trip through serde_json
    #[error("Invalid payload for note {note_id}: {reason}")]
    InvalidPayload { note_id: String, reason: String },

    /// A string value does not map to a known enum variant.
    ///
    /// ## When This Occurs
    /// - Parsing `sync_status`, `kind` or `attention` columns from SQLite
    /// - Parsing a resolution strategy supplied by an operator
    #[error("Unknown {field}: '{value}'")]
    UnknownValue { field: String, value: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an UnknownValue error.
    pub fn unknown(field: impl Into<String>, value: impl Into<String>) -> Self {
        CoreError::UnknownValue {
            field: field.into(),
            value: value.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when note input doesn't meet requirements.
/// Used for early validation before anything is persisted or synced.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Too many values in a collection field.
    #[error("{field} must have at most {max} entries")]
    TooMany { field: String, max: usize },

    /// Invalid format (e.g., invalid UUID, embedded control characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::unknown("sync_status", "bogus");
        assert_eq!(err.to_string(), "Unknown sync_status: 'bogus'");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "title".to_string(),
        };
        assert_eq!(err.to_string(), "title is required");

        let err = ValidationError::TooLong {
            field: "title".to_string(),
            max: 200,
        };
        assert_eq!(err.to_string(), "title must be at most 200 characters");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "content".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
