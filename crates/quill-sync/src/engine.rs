//! # Sync Engine
//!
//! The owned facade over the whole engine: one instance per process, with
//! an explicit start/stop lifecycle instead of an ambient singleton.
//!
//! ## Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncEngine Lifecycle                             │
//! │                                                                         │
//! │  SyncEngine::new(config, db, remote)                                   │
//! │       │  builds notifier, resolver, coordinator (nothing spawned yet)  │
//! │       ▼                                                                 │
//! │  engine.start()                                                        │
//! │       │  spawns NetworkMonitor ──events──► SyncScheduler               │
//! │       │                                        │                        │
//! │       │                                        ▼                        │
//! │       │                                 SyncCoordinator cycles          │
//! │       ▼                                                                 │
//! │  engine.handle()  ──► SyncEngineHandle (cloneable operator surface)    │
//! │       │                 force_sync_now / status / resolve_manual /     │
//! │       │                 conflict / clear_attention / subscribe_changes │
//! │       ▼                                                                 │
//! │  engine.shutdown()                                                     │
//! │       │  scheduler finishes its in-flight cycle, monitor stops;        │
//! │       ▼  queued-but-unstarted work stays PENDING for the next start    │
//! │  done                                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::info;

use quill_core::{ConflictRecord, ResolutionStrategy, SyncStatus};
use quill_db::Database;

use crate::config::SyncConfig;
use crate::coordinator::SyncCoordinator;
use crate::error::{SyncError, SyncResult};
use crate::monitor::{ConnectivityProbe, NetworkMonitor, NetworkMonitorHandle, TcpProbe};
use crate::notify::{ChangeNotifier, NoteChanged};
use crate::remote::RemoteStore;
use crate::resolver::ConflictResolver;
use crate::scheduler::{SyncScheduler, SyncSchedulerHandle};

// =============================================================================
// Engine Status
// =============================================================================

/// Snapshot of the engine for operator queries.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    /// Notes with outbound work queued.
    pub pending_count: i64,

    /// Notes awaiting manual conflict resolution.
    pub conflicted_count: i64,

    /// Notes excluded from automatic cycles (quarantined, retries
    /// exhausted, or remotely rejected).
    pub attention_count: i64,

    /// When the most recent sync cycle finished, if any has run.
    pub last_cycle_at: Option<DateTime<Utc>>,

    /// Last classified connectivity state.
    pub is_online: bool,
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Owns the engine's components and their lifecycle.
pub struct SyncEngine {
    config: Arc<SyncConfig>,
    db: Database,
    probe: Arc<dyn ConnectivityProbe>,
    notifier: ChangeNotifier,
    resolver: Arc<ConflictResolver>,
    coordinator: SyncCoordinator,

    /// Set once started.
    monitor: Option<NetworkMonitorHandle>,
    scheduler: Option<SyncSchedulerHandle>,
}

impl SyncEngine {
    /// Creates an engine probing connectivity over real TCP.
    pub fn new(
        config: SyncConfig,
        db: Database,
        remote: Arc<dyn RemoteStore>,
    ) -> SyncResult<Self> {
        Self::with_probe(config, db, remote, Arc::new(TcpProbe))
    }

    /// Creates an engine with a custom connectivity probe (tests script
    /// connectivity through this seam).
    pub fn with_probe(
        config: SyncConfig,
        db: Database,
        remote: Arc<dyn RemoteStore>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> SyncResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let notifier = ChangeNotifier::default();
        let resolver = Arc::new(ConflictResolver::new(
            db.clone(),
            remote.clone(),
            notifier.clone(),
            config.clone(),
        ));
        let coordinator = SyncCoordinator::new(
            db.clone(),
            remote,
            resolver.clone(),
            notifier.clone(),
            config.clone(),
        );

        Ok(SyncEngine {
            config,
            db,
            probe,
            notifier,
            resolver,
            coordinator,
            monitor: None,
            scheduler: None,
        })
    }

    /// Spawns the background tasks: network monitor and scheduler loop,
    /// wired by the transition event channel.
    pub fn start(&mut self) -> SyncResult<()> {
        if self.scheduler.is_some() {
            return Err(SyncError::Internal("sync engine already started".into()));
        }

        info!(
            device = %self.config.device.name,
            interval = ?self.config.sync_interval(),
            "Starting sync engine"
        );

        let (monitor, network_rx) =
            NetworkMonitor::spawn(self.config.monitor_config(), self.probe.clone());

        let scheduler = SyncScheduler::spawn(
            self.coordinator.clone(),
            self.config.clone(),
            network_rx,
        );

        self.monitor = Some(monitor);
        self.scheduler = Some(scheduler);

        info!("Sync engine started");
        Ok(())
    }

    /// Returns the cloneable operator surface. Fails before `start()`.
    pub fn handle(&self) -> SyncResult<SyncEngineHandle> {
        let monitor = self
            .monitor
            .clone()
            .ok_or_else(|| SyncError::Internal("sync engine not started".into()))?;
        let scheduler = self
            .scheduler
            .clone()
            .ok_or_else(|| SyncError::Internal("sync engine not started".into()))?;

        Ok(SyncEngineHandle {
            db: self.db.clone(),
            resolver: self.resolver.clone(),
            notifier: self.notifier.clone(),
            monitor,
            scheduler,
        })
    }

    /// Stops the background tasks gracefully. The scheduler finishes any
    /// in-flight cycle before observing the signal; work that never started
    /// stays pending for the next process start.
    pub async fn shutdown(&mut self) {
        info!("Sync engine shutting down");

        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown().await;
        }

        if let Some(monitor) = self.monitor.take() {
            monitor.shutdown().await;
        }

        info!("Sync engine stopped");
    }
}

// =============================================================================
// Engine Handle (operator surface)
// =============================================================================

/// Cloneable handle for controlling and querying a running engine.
#[derive(Clone)]
pub struct SyncEngineHandle {
    db: Database,
    resolver: Arc<ConflictResolver>,
    notifier: ChangeNotifier,
    monitor: NetworkMonitorHandle,
    scheduler: SyncSchedulerHandle,
}

impl SyncEngineHandle {
    /// Requests an immediate sync cycle.
    pub async fn force_sync_now(&self) -> SyncResult<()> {
        self.scheduler.force_sync_now().await
    }

    /// Current engine status.
    pub async fn status(&self) -> SyncResult<EngineStatus> {
        let notes = self.db.notes();

        Ok(EngineStatus {
            pending_count: notes.count_pending().await?,
            conflicted_count: notes.count_by_status(SyncStatus::Conflicted).await?,
            attention_count: notes.count_needing_attention().await?,
            last_cycle_at: self.scheduler.last_cycle_at().await,
            is_online: self.monitor.is_online().await,
        })
    }

    /// Resolves a conflict by explicit choice; see
    /// [`ConflictResolver::resolve_manual`]. Returns the committed version.
    pub async fn resolve_manual(
        &self,
        note_id: &str,
        strategy: ResolutionStrategy,
        final_content: Option<String>,
    ) -> SyncResult<i64> {
        self.resolver
            .resolve_manual(note_id, strategy, final_content)
            .await
    }

    /// The unresolved conflict record for a note, if any.
    pub async fn conflict(&self, note_id: &str) -> Option<ConflictRecord> {
        self.resolver.conflict(note_id).await
    }

    /// Releases a quarantined or retry-exhausted note back into automatic
    /// cycles, with a fresh retry budget.
    pub async fn clear_attention(&self, note_id: &str) -> SyncResult<()> {
        self.db.notes().set_attention(note_id, None).await?;
        self.db.operations().reset_attempts(note_id).await?;

        info!(note_id = %note_id, "Attention cleared, note re-enters automatic cycles");
        Ok(())
    }

    /// Subscribes to note change events.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<NoteChanged> {
        self.notifier.subscribe()
    }

    /// Signals the background tasks to shut down gracefully, without
    /// needing access to the owning [`SyncEngine`].
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.monitor.shutdown().await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quill_db::DbConfig;

    use crate::memory::InMemoryRemoteStore;
    use crate::monitor::ConnectivityProbe;
    use async_trait::async_trait;

    struct OfflineProbe;

    #[async_trait]
    impl ConnectivityProbe for OfflineProbe {
        async fn check(&self, _endpoint: &str, _timeout: std::time::Duration) -> bool {
            false
        }
    }

    async fn test_engine() -> SyncEngine {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let remote = Arc::new(InMemoryRemoteStore::new());
        SyncEngine::with_probe(SyncConfig::default(), db, remote, Arc::new(OfflineProbe)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_shutdown() {
        let mut engine = test_engine().await;

        assert!(engine.handle().is_err());

        engine.start().unwrap();
        let handle = engine.handle().unwrap();

        let status = handle.status().await.unwrap();
        assert_eq!(status.pending_count, 0);
        assert_eq!(status.conflicted_count, 0);
        assert!(status.last_cycle_at.is_none());
        assert!(!status.is_online);

        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_rejected() {
        let mut engine = test_engine().await;

        engine.start().unwrap();
        assert!(engine.start().is_err());

        engine.shutdown().await;
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SyncConfig::default();
        config.network.probe_endpoints = vec!["1.1.1.1:443".to_string()];

        // Constructing the engine runs validation up front.
        let result = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(async {
                let db = Database::new(DbConfig::in_memory()).await.unwrap();
                let remote = Arc::new(InMemoryRemoteStore::new());
                SyncEngine::new(config, db, remote as Arc<dyn RemoteStore>).err()
            });

        assert!(matches!(result, Some(SyncError::InvalidConfig(_))));
    }
}
