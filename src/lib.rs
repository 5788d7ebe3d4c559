//! Broker connection core for an AMQP connector process
//!
//! A [`connector::Connector`] owns one connection definition, the outgoing
//! and inbound sessions derived from it, and applies control-plane messages
//! to them. [`connector::ConnectorRuntime`] drives it from a control bus and
//! reports why it stopped.

pub mod connector;
pub mod core;
pub mod definition;
pub mod session;
