//! # quill-db: Local Store for Quill
//!
//! This crate provides local persistence for the Quill sync engine.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Quill Data Flow                                 │
//! │                                                                         │
//! │  Application edit (stage_edit / stage_delete)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     quill-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  (note.rs,    │    │  (embedded)  │  │   │
//! │  │   │               │    │  operation.rs)│    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ NoteRepo      │    │ 001_init.sql │  │   │
//! │  │   │ Staging tx    │    │ OperationRepo │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (WAL) — the offline-capable local note cache          │
//! │       ▲                                                                 │
//! │       │ status transitions, committed versions                         │
//! │  quill-sync engine                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation, staging transactions
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (note, operation)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quill_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/quill.db")).await?;
//!
//! // Stage a local edit; the engine will push it on the next cycle
//! db.stage_edit(&note).await?;
//!
//! // Status-indexed queries
//! let pending = db.notes().find_pending().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::note::NoteRepository;
pub use repository::operation::OperationRepository;
