//! # quill-core: Pure Domain Logic for Quill
//!
//! This crate is the **heart** of the Quill sync engine's domain model. It
//! contains the note types, the outbound operation model and the conflict
//! merge heuristic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Quill Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Application Surface                          │   │
//! │  │    editors, live-update delivery, operator tooling             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    quill-sync (Engine)                          │   │
//! │  │    scheduler, coordinator, detector, resolver, monitor          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ quill-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   merge   │  │ validation│  │   error   │  │   │
//! │  │   │   Note    │  │ heuristic │  │   rules   │  │   typed   │  │   │
//! │  │   │ operations│  │ suggestion│  │  checks   │  │  errors   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    quill-db (Local Store)                       │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Note, SyncOperation, ConflictRecord, etc.)
//! - [`merge`] - The conservative auto-merge heuristic
//! - [`error`] - Domain error types
//! - [`validation`] - Note input validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: the merge heuristic is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Remote-owned versions**: local code records versions, never invents them
//! 4. **Explicit Errors**: all errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod merge;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use quill_core::Note` instead of
// `use quill_core::types::Note`

pub use error::{CoreError, CoreResult, ValidationError};
pub use merge::{suggest_merge, MergeOutcome};
pub use types::{
    coalesce_kinds, AttentionReason, CoalesceOutcome, ConflictRecord, Note, NoteSnapshot,
    OperationKind, ResolutionStrategy, SyncOperation, SyncStatus,
};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum note title length in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum note content length in characters.
///
/// Long-form notes are expected; this bound exists to keep operation
/// payloads and conflict snapshots at a size the sync pipeline can move
/// around freely.
pub const MAX_CONTENT_LEN: usize = 1_000_000;

/// Maximum number of tags on a single note.
pub const MAX_TAGS: usize = 64;

/// Maximum length of a single tag in characters.
pub const MAX_TAG_LEN: usize = 64;
