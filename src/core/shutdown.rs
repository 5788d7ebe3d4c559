//! Shutdown coordination
//!
//! A connector never resumes after it stops: the owning supervisor is told
//! why it stopped and decides whether the process exits. The coordinator
//! records the first reason it is given and broadcasts it; every later
//! trigger is a no-op, so repeated CLOSE or DELETE deliveries reach the
//! supervisor exactly once.

use crate::session::SessionId;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;

/// Why a connector stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// CONNECTOR_CLOSE addressed to this connector
    ConnectorClosed,
    /// The active definition was deleted
    DefinitionDeleted,
    /// A session hit a fatal transport failure
    FatalTransport { session: SessionId, error: String },
    /// The control bus stopped delivering messages
    BusClosed,
    /// The process received a termination signal
    Signal,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::ConnectorClosed => write!(f, "connector closed"),
            ShutdownReason::DefinitionDeleted => write!(f, "definition deleted"),
            ShutdownReason::FatalTransport { session, error } => {
                write!(f, "fatal transport failure in session {}: {}", session, error)
            }
            ShutdownReason::BusClosed => write!(f, "control bus closed"),
            ShutdownReason::Signal => write!(f, "termination signal"),
        }
    }
}

/// The recorded shutdown, as handed to the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownNotice {
    pub reason: ShutdownReason,
    pub requested_at: DateTime<Utc>,
}

/// Exactly-once shutdown signal shared between the connector and its supervisor
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    shutdown_requested: Arc<AtomicBool>,
    notice: Arc<OnceLock<ShutdownNotice>>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(8);
        Self {
            shutdown_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            notice: Arc::new(OnceLock::new()),
        }
    }

    /// Subscribe to the shutdown broadcast
    ///
    /// Subscribers created after the trigger miss the broadcast; check
    /// [`notice`](Self::notice) first.
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.shutdown_tx.subscribe()
    }

    /// Request shutdown; returns `false` if shutdown was already requested
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        if self
            .shutdown_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Shutdown already requested, ignoring '{}'", reason);
            return false;
        }

        let _ = self.notice.set(ShutdownNotice {
            reason: reason.clone(),
            requested_at: Utc::now(),
        });
        log::info!("Shutdown requested: {}", reason);
        let _ = self.shutdown_tx.send(reason);
        true
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    pub fn notice(&self) -> Option<&ShutdownNotice> {
        self.notice.get()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.notice().map(|notice| notice.reason.clone())
    }

    /// Wait until shutdown has been requested and return the reason
    pub async fn requested(&self) -> ShutdownReason {
        let mut shutdown_rx = self.subscribe();
        loop {
            if let Some(reason) = self.reason() {
                return reason;
            }
            match shutdown_rx.recv().await {
                Ok(reason) => return reason,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                // The sender lives as long as self, so this only happens mid-drop
                Err(broadcast::error::RecvError::Closed) => {
                    return self.reason().unwrap_or(ShutdownReason::Signal)
                }
            }
        }
    }

    /// Trigger `ShutdownReason::Signal` on SIGINT, SIGTERM, SIGHUP or SIGQUIT
    ///
    /// Must be called from within a tokio runtime.
    pub fn install_signal_handlers(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let signals = [
                SignalKind::interrupt(),
                SignalKind::terminate(),
                SignalKind::hangup(),
                SignalKind::quit(),
            ];

            for kind in signals {
                let coordinator = self.clone();
                tokio::spawn(async move {
                    match signal(kind) {
                        Ok(mut sig) => {
                            if sig.recv().await.is_some() {
                                coordinator.trigger(ShutdownReason::Signal);
                            }
                        }
                        Err(e) => log::warn!("Could not install handler for {:?}: {}", kind, e),
                    }
                });
            }
        }

        #[cfg(not(unix))]
        {
            let coordinator = self.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    coordinator.trigger(ShutdownReason::Signal);
                }
            });
        }
    }
}
