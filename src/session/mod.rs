//! Broker connection sessions
//!
//! One session drives one transport connection through
//! `Idle -> Connecting -> ChannelPending -> Ready`, reconnecting on retryable
//! failures and reporting fatal ones to its owner.

mod classify;
mod connection;
mod error;
mod memory;
mod params;
mod transport;
mod types;

pub use classify::{classify_failure, FailureClass};
pub use connection::{ConnectionSession, ParamsProvider, ParamsSource, SessionHandle};
pub use error::{TransportError, TransportResult};
pub use memory::{ConnectOutcome, MemoryTransport};
pub use params::{
    build_message_properties, build_transport_parameters, Credentials, DeliveryMode,
    MessageProperties, OutgoingAttributes, TransportParameters, DEFAULT_FRAME_MAX, MAX_PRIORITY,
};
pub use transport::{ChannelHandle, Transport, TransportConnection};
pub use types::{
    SessionDiagnostics, SessionFailure, SessionId, SessionRole, SessionState, SessionStatus,
};
