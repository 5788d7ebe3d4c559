//! In-process transport
//!
//! Connect attempts follow a script of outcomes; once the script runs out
//! every attempt succeeds. Live connections can be severed to exercise the
//! reconnect path.

use super::error::{TransportError, TransportResult};
use super::params::TransportParameters;
use super::transport::{ChannelHandle, Transport, TransportConnection};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

/// Scripted result of one connect attempt
#[derive(Debug)]
pub enum ConnectOutcome {
    Accept,
    Fail(TransportError),
    /// Never completes
    Hang,
    /// Connects, then fails to open the channel
    RejectChannel(TransportError),
}

impl ConnectOutcome {
    pub fn fail(kind: io::ErrorKind) -> Self {
        ConnectOutcome::Fail(TransportError::Io(io::Error::from(kind)))
    }
}

#[derive(Default)]
struct MemoryState {
    outcomes: VecDeque<ConnectOutcome>,
    connects: Vec<TransportParameters>,
    live: Vec<(u64, oneshot::Sender<TransportError>)>,
    next_connection: u64,
    next_channel: u16,
    closes: usize,
}

#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock_state(&self.state)
    }

    /// Queue the outcome of a future connect attempt
    pub fn push_outcome(&self, outcome: ConnectOutcome) {
        self.lock().outcomes.push_back(outcome);
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connects.len()
    }

    /// Parameters of every connect attempt, oldest first
    pub fn connect_params(&self) -> Vec<TransportParameters> {
        self.lock().connects.clone()
    }

    pub fn last_connect_params(&self) -> Option<TransportParameters> {
        self.lock().connects.last().cloned()
    }

    pub fn live_connections(&self) -> usize {
        self.lock().live.len()
    }

    /// Number of orderly closes performed by sessions
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    /// Drop every live connection with an I/O error of `kind`
    pub fn sever_all(&self, kind: io::ErrorKind) -> usize {
        self.sever_all_with(|| TransportError::Io(io::Error::from(kind)))
    }

    pub fn sever_all_with(&self, make_error: impl Fn() -> TransportError) -> usize {
        let severed: Vec<_> = self.lock().live.drain(..).collect();
        let count = severed.len();
        for (_, lost) in severed {
            if lost.send(make_error()).is_err() {
                log::trace!("Severed connection was already gone");
            }
        }
        count
    }

    fn open_connection(&self, reject_channel: Option<TransportError>) -> MemoryConnection {
        let (lost_tx, lost_rx) = oneshot::channel();
        let id = {
            let mut state = self.lock();
            state.next_connection += 1;
            let id = state.next_connection;
            state.live.push((id, lost_tx));
            id
        };
        MemoryConnection {
            id,
            state: Arc::clone(&self.state),
            lost: lost_rx,
            reject_channel,
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(
        &self,
        params: &TransportParameters,
    ) -> TransportResult<Box<dyn TransportConnection>> {
        let outcome = {
            let mut state = self.lock();
            state.connects.push(params.clone());
            state.outcomes.pop_front().unwrap_or(ConnectOutcome::Accept)
        };

        match outcome {
            ConnectOutcome::Accept => Ok(Box::new(self.open_connection(None))),
            ConnectOutcome::RejectChannel(error) => Ok(Box::new(self.open_connection(Some(error)))),
            ConnectOutcome::Fail(error) => Err(error),
            ConnectOutcome::Hang => std::future::pending().await,
        }
    }
}

struct MemoryConnection {
    id: u64,
    state: Arc<Mutex<MemoryState>>,
    lost: oneshot::Receiver<TransportError>,
    reject_channel: Option<TransportError>,
}

impl MemoryConnection {
    /// Remove from the live set; true if it was still live
    fn detach(&self) -> bool {
        let mut state = lock_state(&self.state);
        let before = state.live.len();
        state.live.retain(|(id, _)| *id != self.id);
        state.live.len() != before
    }
}

#[async_trait]
impl TransportConnection for MemoryConnection {
    async fn open_channel(&mut self) -> TransportResult<ChannelHandle> {
        if let Some(error) = self.reject_channel.take() {
            return Err(error);
        }
        let mut state = lock_state(&self.state);
        state.next_channel += 1;
        Ok(ChannelHandle {
            number: state.next_channel,
        })
    }

    async fn closed(&mut self) -> TransportError {
        match (&mut self.lost).await {
            Ok(error) => error,
            Err(_) => TransportError::Internal("connection state dropped".to_string()),
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.detach() {
            lock_state(&self.state).closes += 1;
        }
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.detach();
    }
}

fn lock_state(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::params::Credentials;

    fn params() -> TransportParameters {
        TransportParameters::new("mq1", 5672, "/", Credentials::plain("guest", "guest"))
    }

    #[tokio::test]
    async fn test_script_then_accept() {
        let transport = MemoryTransport::new();
        transport.push_outcome(ConnectOutcome::fail(io::ErrorKind::ConnectionRefused));

        assert!(transport.connect(&params()).await.is_err());
        let mut connection = transport.connect(&params()).await.unwrap();
        assert_eq!(transport.connect_count(), 2);
        assert_eq!(transport.live_connections(), 1);

        let channel = connection.open_channel().await.unwrap();
        assert_eq!(channel.number, 1);

        connection.close().await.unwrap();
        connection.close().await.unwrap();
        assert_eq!(transport.close_count(), 1);
        assert_eq!(transport.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_severed_connection_reports_error() {
        let transport = MemoryTransport::new();
        let mut connection = transport.connect(&params()).await.unwrap();

        assert_eq!(transport.sever_all(io::ErrorKind::ConnectionReset), 1);
        match connection.closed().await {
            TransportError::Io(error) => assert_eq!(error.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(transport.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_dropped_connection_leaves_live_set() {
        let transport = MemoryTransport::new();
        let connection = transport.connect(&params()).await.unwrap();
        drop(connection);
        assert_eq!(transport.live_connections(), 0);
        assert_eq!(transport.close_count(), 0);
    }
}
