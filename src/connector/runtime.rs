//! Connector runtime
//!
//! Pulls control messages, watches for fatal session failures and signals,
//! and hands the reason the connector stopped back to its caller. Exiting
//! the process is the caller's decision.

use super::bus::ControlBus;
use super::dispatcher::Disposition;
use super::error::{ConnectorError, ConnectorResult};
use super::manager::Connector;
use super::messages::ControlMessage;
use crate::core::config::ConnectorConfig;
use crate::core::error_handling::log_error_with_context;
use crate::core::retry::ReconnectPolicy;
use crate::core::shutdown::ShutdownReason;
use crate::definition::{DefinitionId, DefinitionStore};
use crate::session::{SessionFailure, Transport};
use std::sync::Arc;
use tokio::sync::mpsc;

enum Event {
    Message(Option<String>),
    Failure(Option<SessionFailure>),
    Shutdown(ShutdownReason),
}

pub struct ConnectorRuntime {
    connector: Arc<Connector>,
    failures: mpsc::UnboundedReceiver<SessionFailure>,
}

impl ConnectorRuntime {
    /// Load the configured definition and build the connector
    ///
    /// A missing definition is fatal; the connector never starts without one.
    pub fn start(
        config: &ConnectorConfig,
        store: Arc<dyn DefinitionStore>,
        transport: Arc<dyn Transport>,
    ) -> ConnectorResult<Self> {
        let definition_id = DefinitionId(config.definition_id);
        let (connector, failures) = Connector::load(
            config.cluster_id,
            definition_id,
            store,
            transport,
            ReconnectPolicy::from(&config.reconnect),
        )
        .inspect_err(|error| {
            if let ConnectorError::Store(store_error) = error {
                log_error_with_context(store_error, "Loading connection definition");
            }
        })?;

        Ok(Self {
            connector: Arc::new(connector),
            failures,
        })
    }

    pub fn connector(&self) -> &Arc<Connector> {
        &self.connector
    }

    /// Shut down with [`ShutdownReason::Signal`] on SIGINT, SIGTERM, SIGHUP or SIGQUIT
    pub fn install_signal_handlers(&self) {
        self.connector.shutdown_coordinator().install_signal_handlers();
    }

    /// Process control messages until the connector stops
    pub async fn run<B: ControlBus>(mut self, mut bus: B) -> ShutdownReason {
        let coordinator = self.connector.shutdown_coordinator().clone();

        loop {
            let event = tokio::select! {
                biased;
                reason = coordinator.requested() => Event::Shutdown(reason),
                failure = self.failures.recv() => Event::Failure(failure),
                message = bus.pull() => Event::Message(message),
            };

            match event {
                Event::Shutdown(reason) => return self.stop(reason),
                Event::Failure(Some(failure)) => {
                    log::error!("{}", failure);
                    return self.stop(ShutdownReason::FatalTransport {
                        session: failure.session_id,
                        error: failure.error.to_string(),
                    });
                }
                // The connector keeps a sender alive, so this only happens mid-drop
                Event::Failure(None) => return self.stop(ShutdownReason::BusClosed),
                Event::Message(None) => {
                    log::info!("Control bus closed");
                    return self.stop(ShutdownReason::BusClosed);
                }
                Event::Message(Some(raw)) => {
                    if self.handle_message(&raw) == Some(Disposition::ShutDown) {
                        return self.stop(ShutdownReason::ConnectorClosed);
                    }
                }
            }
        }
    }

    fn handle_message(&self, raw: &str) -> Option<Disposition> {
        let message = match ControlMessage::from_json(raw) {
            Ok(message) => message,
            Err(error) => {
                log::warn!("Discarding control message: {}", error);
                return None;
            }
        };

        match self.connector.dispatch(&message) {
            Ok(disposition) => {
                log::debug!("{} -> {}", message.action(), disposition);
                Some(disposition)
            }
            Err(error) => {
                log_error_with_context(&error, &format!("Applying {}", message.action()));
                None
            }
        }
    }

    /// Shut the connector down and return the first recorded reason
    fn stop(&self, reason: ShutdownReason) -> ShutdownReason {
        if let Err(error) = self.connector.shutdown(reason.clone()) {
            log_error_with_context(&error, "Stopping connector");
        }
        self.connector.shutdown_coordinator().reason().unwrap_or(reason)
    }
}
