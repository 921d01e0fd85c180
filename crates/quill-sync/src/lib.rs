//! # quill-sync: Synchronization Engine for Quill
//!
//! This crate reconciles a note's state across an offline-capable local
//! cache and an authoritative remote store, and across multiple concurrent
//! editors racing against the same record. Both reduce to the same
//! optimistic-versioning contract, so one engine handles both: detect a
//! stale base version, then resolve it.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Engine Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   SyncEngine (owned facade)                      │  │
//! │  │                                                                  │  │
//! │  │  One instance per process, explicit start()/shutdown()          │  │
//! │  │  Exposes a cloneable SyncEngineHandle operator surface          │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼──────────────────────┐                 │
//! │         ▼                     ▼                      ▼                  │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ NetworkMonitor │  │ SyncScheduler  │  │   SyncCoordinator      │    │
//! │  │                │─►│                │─►│                        │    │
//! │  │ Probes ≥2      │  │ periodic tick, │  │ One cycle: pending     │    │
//! │  │ endpoints,     │  │ priority pass, │  │ ops → remote CAS       │    │
//! │  │ publishes      │  │ manual force;  │  │ writes, per-note       │    │
//! │  │ transitions    │  │ single flight  │  │ single-flight guards   │    │
//! │  └────────────────┘  └────────────────┘  └───────────┬────────────┘    │
//! │                                                      │                  │
//! │                               ┌──────────────────────┤                  │
//! │                               ▼                      ▼                  │
//! │                      ┌────────────────┐  ┌────────────────────────┐    │
//! │                      │ConflictDetector│  │   ConflictResolver     │    │
//! │                      │                │─►│                        │    │
//! │                      │ base vs remote │  │ conservative auto-     │    │
//! │                      │ version        │  │ merge, manual force-   │    │
//! │                      │ classification │  │ write resolution       │    │
//! │                      └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  Components talk over channels, not direct calls: network events and  │
//! │  sync triggers are messages consumed by single loops, which keeps the │
//! │  single-flight guarantee simple and each piece testable in isolation. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - `SyncEngine` facade and operator handle
//! - [`config`] - TOML configuration (device, engine, network sections)
//! - [`error`] - Engine error types
//! - [`monitor`] - Connectivity probing and transition events
//! - [`scheduler`] - Cycle triggers: periodic, reconnect, manual
//! - [`coordinator`] - Drives one sync cycle end to end
//! - [`detector`] - Clean / conflict / diverged classification
//! - [`resolver`] - Auto-merge commits and manual force-write resolution
//! - [`remote`] - The `RemoteStore` compare-and-swap contract
//! - [`memory`] - In-process `RemoteStore` with test instrumentation
//! - [`notify`] - Note change broadcast channel
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quill_sync::{SyncConfig, SyncEngine};
//! use quill_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("quill.db")).await?;
//! let config = SyncConfig::load_or_default(None);
//!
//! let mut engine = SyncEngine::new(config, db.clone(), remote)?;
//! engine.start()?;
//! let handle = engine.handle()?;
//!
//! // Edits staged through the db are pushed on the next cycle
//! db.stage_edit(&note).await?;
//! handle.force_sync_now().await?;
//!
//! // Live updates for connected clients
//! let mut changes = handle.subscribe_changes();
//! while let Ok(event) = changes.recv().await {
//!     println!("{} is now {}", event.note_id, event.sync_status);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod coordinator;
pub mod detector;
pub mod engine;
pub mod error;
pub mod memory;
pub mod monitor;
pub mod notify;
pub mod remote;
pub mod resolver;
pub mod scheduler;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DeviceConfig, EngineSettings, NetworkSettings, SyncConfig};
pub use coordinator::{CycleReport, SyncCoordinator};
pub use detector::{classify, Classification};
pub use engine::{EngineStatus, SyncEngine, SyncEngineHandle};
pub use error::{SyncError, SyncResult};
pub use memory::InMemoryRemoteStore;
pub use monitor::{
    ConnectivityProbe, MonitorConfig, NetworkEvent, NetworkMonitor, NetworkMonitorHandle, TcpProbe,
};
pub use notify::{ChangeNotifier, NoteChanged};
pub use remote::{RemoteCommit, RemoteError, RemoteNote, RemoteStore};
pub use resolver::{AutoOutcome, ConflictResolver};
pub use scheduler::{CycleSummary, SyncScheduler, SyncSchedulerHandle, SyncTrigger};
