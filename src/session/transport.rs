//! Broker client seam
//!
//! Framing, handshake and heartbeats belong to the broker client library.
//! A session only needs to open a connection, open a channel on it, learn
//! when the connection drops, and close it.

use super::error::{TransportError, TransportResult};
use super::params::TransportParameters;
use async_trait::async_trait;

/// Logical channel opened on a transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHandle {
    pub number: u16,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Complete the transport handshake with the broker
    async fn connect(
        &self,
        params: &TransportParameters,
    ) -> TransportResult<Box<dyn TransportConnection>>;
}

#[async_trait]
pub trait TransportConnection: Send {
    async fn open_channel(&mut self) -> TransportResult<ChannelHandle>;

    /// Resolves with the cause once the connection is lost
    async fn closed(&mut self) -> TransportError;

    /// Orderly shutdown of the connection
    async fn close(&mut self) -> TransportResult<()>;
}
