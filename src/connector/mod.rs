//! Connector: owner of the active definition and its sessions
//!
//! Control messages are decoded in [`messages`], filtered and routed by the
//! dispatcher, and applied by handlers that follow the fixed lock order
//! described in the manager module.

mod bus;
mod dispatcher;
mod error;
mod handlers;
mod manager;
pub mod messages;
mod registry;
mod runtime;


pub use bus::{ChannelBus, ControlBus};
pub use dispatcher::{accepts, Disposition};
pub use error::{ConnectorError, ConnectorResult};
pub use manager::Connector;
pub use messages::{ControlAction, ControlMessage, ControlMessageError};
pub use registry::SessionRegistry;
pub use runtime::ConnectorRuntime;
