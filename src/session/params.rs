//! Transport parameters and message properties
//!
//! Both are plain values derived from other data; building them has no side
//! effects.

use crate::definition::Definition;
use std::fmt;
use std::time::Duration;

/// Largest frame the broker client negotiates when nothing else is configured
pub const DEFAULT_FRAME_MAX: u32 = 131_072;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn plain(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Protocol-ready connection settings derived from a [`Definition`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportParameters {
    pub host: String,
    pub port: u16,
    pub virtual_host: String,
    pub credentials: Credentials,
    /// Zero disables heartbeats
    pub heartbeat: Duration,
    pub frame_max: u32,
}

impl TransportParameters {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        virtual_host: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            virtual_host: virtual_host.into(),
            credentials,
            heartbeat: Duration::ZERO,
            frame_max: DEFAULT_FRAME_MAX,
        }
    }

    pub fn with_frame_max(mut self, frame_max: u32) -> Self {
        self.frame_max = frame_max;
        self
    }

    /// `host:port/vhost`
    pub fn endpoint(&self) -> String {
        format!("{}:{}{}", self.host, self.port, self.virtual_host)
    }
}

/// Derive transport parameters from a definition
pub fn build_transport_parameters(definition: &Definition) -> TransportParameters {
    let mut params = TransportParameters::new(
        definition.host.clone(),
        definition.port,
        definition.virtual_host.clone(),
        Credentials::plain(definition.username.clone(), definition.password.clone()),
    )
    .with_frame_max(definition.frame_max_bytes);

    // Assigned after construction: the interval is a count of seconds, not an on/off flag
    params.heartbeat = Duration::from_secs(u64::from(definition.heartbeat_seconds));

    params
}

/// AMQP delivery mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeliveryMode {
    NonPersistent = 1,
    Persistent = 2,
}

impl DeliveryMode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for DeliveryMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(DeliveryMode::NonPersistent),
            2 => Ok(DeliveryMode::Persistent),
            other => Err(other),
        }
    }
}

/// Basic properties attached to a published message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub delivery_mode: Option<DeliveryMode>,
    pub priority: Option<u8>,
    pub expiration: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
}

/// Publishing attributes as stored on an outgoing connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingAttributes {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub delivery_mode: u8,
    pub priority: Option<u8>,
    pub expiration: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
}

/// Highest message priority a publisher may request
pub const MAX_PRIORITY: u8 = 9;

/// Assemble publish properties; a priority above [`MAX_PRIORITY`] is clamped
pub fn build_message_properties(
    content_type: Option<&str>,
    content_encoding: Option<&str>,
    delivery_mode: Option<DeliveryMode>,
    priority: Option<u8>,
    expiration: Option<&str>,
    user_id: Option<&str>,
    app_id: Option<&str>,
) -> MessageProperties {
    MessageProperties {
        content_type: content_type.map(str::to_string),
        content_encoding: content_encoding.map(str::to_string),
        delivery_mode,
        priority: priority.map(clamp_priority),
        expiration: expiration.map(str::to_string),
        user_id: user_id.map(str::to_string),
        app_id: app_id.map(str::to_string),
    }
}

fn clamp_priority(priority: u8) -> u8 {
    if priority > MAX_PRIORITY {
        log::debug!("Priority {} clamped to {}", priority, MAX_PRIORITY);
        MAX_PRIORITY
    } else {
        priority
    }
}

impl MessageProperties {
    /// Properties for a message published through an outgoing connection
    ///
    /// A delivery mode outside the protocol's 1/2 range is left unset.
    pub fn from_attrs(attrs: &OutgoingAttributes) -> Self {
        build_message_properties(
            attrs.content_type.as_deref(),
            attrs.content_encoding.as_deref(),
            DeliveryMode::try_from(attrs.delivery_mode).ok(),
            attrs.priority,
            attrs.expiration.as_deref(),
            attrs.user_id.as_deref(),
            attrs.app_id.as_deref(),
        )
    }
}
