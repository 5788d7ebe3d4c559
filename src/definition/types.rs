//! Definition record and edit request types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a definition in the definition store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefinitionId(pub i64);

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection parameters for one broker endpoint
///
/// Replaced wholesale on edit, never mutated field by field except for the
/// password change path.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub id: DefinitionId,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub virtual_host: String,
    pub username: String,
    pub password: String,
    pub heartbeat_seconds: u16,
    pub frame_max_bytes: u32,
}

// Passwords never reach log output
impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("virtual_host", &self.virtual_host)
            .field("username", &self.username)
            .field("password", &"***")
            .field("heartbeat_seconds", &self.heartbeat_seconds)
            .field("frame_max_bytes", &self.frame_max_bytes)
            .finish()
    }
}

impl Definition {
    /// `host:port/vhost`, used to identify the endpoint in log lines
    pub fn endpoint(&self) -> String {
        format!("{}:{}{}", self.host, self.port, self.virtual_host)
    }
}

/// Replacement definition carried by an edit control message
///
/// An edit never changes the credential: the password of the definition
/// being replaced always carries over. Only a password change sets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionEdit {
    pub id: DefinitionId,
    /// Absent names keep the current name
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
    pub virtual_host: String,
    pub username: String,
    pub heartbeat_seconds: u16,
    pub frame_max_bytes: u32,
}

impl DefinitionEdit {
    /// Build the definition that replaces `previous`
    pub fn apply_to(self, previous: &Definition) -> Definition {
        Definition {
            id: self.id,
            name: self.name.unwrap_or_else(|| previous.name.clone()),
            host: self.host.trim().to_string(),
            port: self.port,
            virtual_host: self.virtual_host,
            username: self.username,
            password: previous.password.clone(),
            heartbeat_seconds: self.heartbeat_seconds,
            frame_max_bytes: self.frame_max_bytes,
        }
    }
}

/// Canonical string form of a host value received from the control bus
///
/// Strings are trimmed; any other scalar uses its JSON rendering, so `10`
/// becomes `"10"`.
pub fn canonical_host(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(host) => Some(host.trim().to_string()),
        other => Some(other.to_string()),
    }
}
