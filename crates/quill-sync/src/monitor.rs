//! # Network Monitor
//!
//! Periodically probes connectivity and notifies subscribers of transitions
//! only (not steady state).
//!
//! ## Probe Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Connectivity Classification                        │
//! │                                                                         │
//! │  Every probe_interval (default 30s):                                   │
//! │                                                                         │
//! │    for endpoint in endpoints:          (≥2 independent endpoints)      │
//! │        TCP connect, bounded timeout    (default 5s per check)          │
//! │        success? ──► classified UP, stop probing                        │
//! │                                                                         │
//! │    all checks failed ──► classified DOWN                               │
//! │                                                                         │
//! │  State change?                                                         │
//! │    down → up:   publish NetworkEvent::Online   (exactly one event)     │
//! │    up → down:   publish NetworkEvent::Offline  (exactly one event)     │
//! │    no change:   publish nothing                                        │
//! │                                                                         │
//! │  A probe failure is NOT an error condition: it only feeds the up/down  │
//! │  classification. The monitor itself never fails - if every network     │
//! │  primitive is unavailable it classifies DOWN and keeps probing.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The up-transition event is the sole external trigger for a priority sync
//! pass; the scheduler consumes the event channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

// =============================================================================
// Connectivity Probe Trait
// =============================================================================

/// A single reachability check. Behind a trait so tests can script
/// connectivity without touching real sockets.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Returns true if the endpoint is reachable within the timeout.
    async fn check(&self, endpoint: &str, timeout: Duration) -> bool;
}

/// Production probe: a plain TCP connect attempt.
pub struct TcpProbe;

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn check(&self, endpoint: &str, limit: Duration) -> bool {
        matches!(timeout(limit, TcpStream::connect(endpoint)).await, Ok(Ok(_)))
    }
}

// =============================================================================
// Events & Configuration
// =============================================================================

/// Connectivity transition published by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Transitioned down → up.
    Online,
    /// Transitioned up → down.
    Offline,
}

/// Configuration for the network monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Endpoints probed each interval (`host:port`). Connectivity is UP if
    /// any one of them answers.
    pub endpoints: Vec<String>,

    /// Interval between probe rounds.
    pub probe_interval: Duration,

    /// Per-check timeout.
    pub probe_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            endpoints: vec!["1.1.1.1:443".to_string(), "8.8.8.8:53".to_string()],
            probe_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Monitor Handle
// =============================================================================

/// Handle for querying and stopping a running monitor.
#[derive(Clone)]
pub struct NetworkMonitorHandle {
    /// Last classified connectivity state.
    online: Arc<RwLock<bool>>,

    /// Shutdown sender.
    shutdown_tx: mpsc::Sender<()>,
}

impl NetworkMonitorHandle {
    /// Returns the last classified connectivity state.
    pub async fn is_online(&self) -> bool {
        *self.online.read().await
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Network Monitor
// =============================================================================

/// Periodic connectivity monitor.
///
/// ## Usage
/// ```rust,ignore
/// let (handle, mut events) = NetworkMonitor::spawn(config, Arc::new(TcpProbe));
///
/// while let Some(event) = events.recv().await {
///     match event {
///         NetworkEvent::Online => { /* priority sync pass */ }
///         NetworkEvent::Offline => { /* pause pushing */ }
///     }
/// }
/// ```
pub struct NetworkMonitor {
    config: MonitorConfig,
    probe: Arc<dyn ConnectivityProbe>,
    online: Arc<RwLock<bool>>,
    event_tx: mpsc::Sender<NetworkEvent>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl NetworkMonitor {
    /// Creates a new monitor and spawns its background task.
    ///
    /// Returns a handle and the transition event receiver. The monitor
    /// starts classified DOWN; the first successful probe round publishes
    /// an `Online` event, which doubles as the startup sync trigger.
    pub fn spawn(
        config: MonitorConfig,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> (NetworkMonitorHandle, mpsc::Receiver<NetworkEvent>) {
        let (event_tx, event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let online = Arc::new(RwLock::new(false));

        let monitor = NetworkMonitor {
            config,
            probe,
            online: online.clone(),
            event_tx,
            shutdown_rx,
        };

        tokio::spawn(monitor.run());

        let handle = NetworkMonitorHandle {
            online,
            shutdown_tx,
        };

        (handle, event_rx)
    }

    /// Main monitor loop.
    async fn run(mut self) {
        info!(
            endpoints = ?self.config.endpoints,
            interval = ?self.config.probe_interval,
            "Network monitor starting"
        );

        let mut interval = tokio::time::interval(self.config.probe_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut last_up = false;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let up = self.probe_round().await;

                    if up != last_up {
                        let event = if up { NetworkEvent::Online } else { NetworkEvent::Offline };
                        info!(?event, "Connectivity transition");

                        *self.online.write().await = up;
                        last_up = up;

                        if self.event_tx.send(event).await.is_err() {
                            warn!("Network event receiver dropped, monitor stopping");
                            break;
                        }
                    } else {
                        debug!(up, "Connectivity unchanged");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Network monitor received shutdown");
                    break;
                }
            }
        }

        info!("Network monitor stopped");
    }

    /// Runs one probe round: UP if any endpoint answers.
    async fn probe_round(&self) -> bool {
        for endpoint in &self.config.endpoints {
            if self
                .probe
                .check(endpoint, self.config.probe_timeout)
                .await
            {
                debug!(endpoint = %endpoint, "Probe succeeded");
                return true;
            }
            debug!(endpoint = %endpoint, "Probe failed");
        }

        false
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Probe whose result is flipped by the test.
    struct ScriptedProbe {
        up: AtomicBool,
    }

    impl ScriptedProbe {
        fn new(up: bool) -> Arc<Self> {
            Arc::new(ScriptedProbe {
                up: AtomicBool::new(up),
            })
        }

        fn set(&self, up: bool) {
            self.up.store(up, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ConnectivityProbe for ScriptedProbe {
        async fn check(&self, _endpoint: &str, _timeout: Duration) -> bool {
            self.up.load(Ordering::SeqCst)
        }
    }

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            endpoints: vec!["a:1".into(), "b:2".into()],
            probe_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_up_transition_publishes_once() {
        let probe = ScriptedProbe::new(true);
        let (handle, mut events) = NetworkMonitor::spawn(test_config(), probe.clone());

        // First round classifies up and publishes exactly one Online event.
        assert_eq!(events.recv().await, Some(NetworkEvent::Online));
        assert!(handle.is_online().await);

        // Steady state: further rounds publish nothing; flipping down does.
        probe.set(false);
        assert_eq!(events.recv().await, Some(NetworkEvent::Offline));
        assert!(!handle.is_online().await);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_down_without_event() {
        let probe = ScriptedProbe::new(false);
        let (handle, mut events) = NetworkMonitor::spawn(test_config(), probe.clone());

        // Down at start matches the initial classification: no event until
        // connectivity actually appears.
        probe.set(true);
        assert_eq!(events.recv().await, Some(NetworkEvent::Online));

        handle.shutdown().await;
    }
}
