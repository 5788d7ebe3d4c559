//! Control-plane message decoding
//!
//! Messages arrive as JSON objects. Field names vary between producers, so
//! decoding goes through a permissive raw form and then builds one typed
//! message per action.

use crate::core::error_handling::ContextualError;
use crate::definition::{canonical_host, Definition, DefinitionEdit, DefinitionId};
use crate::session::DEFAULT_FRAME_MAX;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Control-plane action names
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
pub enum ControlAction {
    #[strum(serialize = "CONNECTOR_CLOSE")]
    ConnectorClose,
    #[strum(to_string = "DEFINITION_AMQP_CREATE", serialize = "DEFINITION_CREATE")]
    DefinitionCreate,
    #[strum(to_string = "DEFINITION_AMQP_EDIT", serialize = "DEFINITION_EDIT")]
    DefinitionEdit,
    #[strum(to_string = "DEFINITION_AMQP_DELETE", serialize = "DEFINITION_DELETE")]
    DefinitionDelete,
    #[strum(
        to_string = "DEFINITION_AMQP_CHANGE_PASSWORD",
        serialize = "DEFINITION_CHANGE_PASSWORD"
    )]
    DefinitionChangePassword,
}

impl ControlAction {
    /// True for the `DEFINITION_*` family, which is addressed by definition id
    pub fn is_definition_action(self) -> bool {
        !matches!(self, ControlAction::ConnectorClose)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlMessageError {
    #[error("Unknown control action '{action}'")]
    UnknownAction { action: String },

    #[error("{action} message is missing '{field}'")]
    MissingField {
        action: ControlAction,
        field: &'static str,
    },

    #[error("Malformed control message: {message}")]
    Malformed { message: String },
}

impl ContextualError for ControlMessageError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}

/// A decoded control-plane message
#[derive(Clone, PartialEq, Eq)]
pub enum ControlMessage {
    ConnectorClose { token: String },
    DefinitionCreate(Definition),
    DefinitionEdit(DefinitionEdit),
    DefinitionDelete { id: DefinitionId },
    DefinitionChangePassword { id: DefinitionId, password: String },
}

impl fmt::Debug for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMessage::ConnectorClose { token } => f
                .debug_struct("ConnectorClose")
                .field("token", token)
                .finish(),
            ControlMessage::DefinitionCreate(definition) => {
                f.debug_tuple("DefinitionCreate").field(definition).finish()
            }
            ControlMessage::DefinitionEdit(edit) => {
                f.debug_tuple("DefinitionEdit").field(edit).finish()
            }
            ControlMessage::DefinitionDelete { id } => f
                .debug_struct("DefinitionDelete")
                .field("id", id)
                .finish(),
            ControlMessage::DefinitionChangePassword { id, .. } => f
                .debug_struct("DefinitionChangePassword")
                .field("id", id)
                .field("password", &"***")
                .finish(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawCredentials {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    action: String,
    id: Option<i64>,
    odb_token: Option<String>,
    name: Option<String>,
    host: Option<serde_json::Value>,
    port: Option<u16>,
    #[serde(alias = "vhost")]
    virtual_host: Option<String>,
    username: Option<String>,
    password: Option<String>,
    #[serde(default)]
    credentials: RawCredentials,
    heartbeat: Option<u16>,
    frame_max: Option<u32>,
}

/// Fields shared by CREATE and EDIT
struct ConnectionFields {
    id: DefinitionId,
    name: Option<String>,
    host: String,
    port: u16,
    virtual_host: String,
    username: String,
    password: Option<String>,
    heartbeat_seconds: u16,
    frame_max_bytes: u32,
}

impl RawMessage {
    fn require<T>(
        action: ControlAction,
        field: &'static str,
        value: Option<T>,
    ) -> Result<T, ControlMessageError> {
        value.ok_or(ControlMessageError::MissingField { action, field })
    }

    fn definition_id(&self, action: ControlAction) -> Result<DefinitionId, ControlMessageError> {
        Self::require(action, "id", self.id).map(DefinitionId)
    }

    fn password(&mut self) -> Option<String> {
        self.password.take().or_else(|| self.credentials.password.take())
    }

    fn connection_fields(
        mut self,
        action: ControlAction,
    ) -> Result<ConnectionFields, ControlMessageError> {
        let id = self.definition_id(action)?;
        let host = Self::require(action, "host", self.host.as_ref().and_then(canonical_host))?;
        let password = self.password();
        let username = self.username.or(self.credentials.username);

        Ok(ConnectionFields {
            id,
            name: self.name,
            host,
            port: Self::require(action, "port", self.port)?,
            virtual_host: Self::require(action, "virtual_host", self.virtual_host)?,
            username: Self::require(action, "username", username)?,
            password,
            heartbeat_seconds: self.heartbeat.unwrap_or(0),
            frame_max_bytes: self.frame_max.unwrap_or(DEFAULT_FRAME_MAX),
        })
    }
}

impl ControlMessage {
    pub fn from_json(raw: &str) -> Result<Self, ControlMessageError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ControlMessageError::Malformed {
                message: e.to_string(),
            })?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, ControlMessageError> {
        let mut raw: RawMessage =
            serde_json::from_value(value).map_err(|e| ControlMessageError::Malformed {
                message: e.to_string(),
            })?;
        let action = ControlAction::from_str(&raw.action).map_err(|_| {
            ControlMessageError::UnknownAction {
                action: raw.action.clone(),
            }
        })?;

        match action {
            ControlAction::ConnectorClose => Ok(ControlMessage::ConnectorClose {
                token: RawMessage::require(action, "odb_token", raw.odb_token)?,
            }),
            ControlAction::DefinitionCreate => {
                let fields = raw.connection_fields(action)?;
                Ok(ControlMessage::DefinitionCreate(Definition {
                    id: fields.id,
                    name: fields.name.unwrap_or_else(|| fields.id.to_string()),
                    host: fields.host,
                    port: fields.port,
                    virtual_host: fields.virtual_host,
                    username: fields.username,
                    password: RawMessage::require(action, "password", fields.password)?,
                    heartbeat_seconds: fields.heartbeat_seconds,
                    frame_max_bytes: fields.frame_max_bytes,
                }))
            }
            ControlAction::DefinitionEdit => {
                let fields = raw.connection_fields(action)?;
                Ok(ControlMessage::DefinitionEdit(DefinitionEdit {
                    id: fields.id,
                    name: fields.name,
                    host: fields.host,
                    port: fields.port,
                    virtual_host: fields.virtual_host,
                    username: fields.username,
                    heartbeat_seconds: fields.heartbeat_seconds,
                    frame_max_bytes: fields.frame_max_bytes,
                }))
            }
            ControlAction::DefinitionDelete => Ok(ControlMessage::DefinitionDelete {
                id: raw.definition_id(action)?,
            }),
            ControlAction::DefinitionChangePassword => {
                let id = raw.definition_id(action)?;
                let password = RawMessage::require(action, "password", raw.password())?;
                Ok(ControlMessage::DefinitionChangePassword { id, password })
            }
        }
    }

    pub fn action(&self) -> ControlAction {
        match self {
            ControlMessage::ConnectorClose { .. } => ControlAction::ConnectorClose,
            ControlMessage::DefinitionCreate(_) => ControlAction::DefinitionCreate,
            ControlMessage::DefinitionEdit(_) => ControlAction::DefinitionEdit,
            ControlMessage::DefinitionDelete { .. } => ControlAction::DefinitionDelete,
            ControlMessage::DefinitionChangePassword { .. } => {
                ControlAction::DefinitionChangePassword
            }
        }
    }

    /// Definition the message is addressed to, for `DEFINITION_*` actions
    pub fn definition_id(&self) -> Option<DefinitionId> {
        match self {
            ControlMessage::ConnectorClose { .. } => None,
            ControlMessage::DefinitionCreate(definition) => Some(definition.id),
            ControlMessage::DefinitionEdit(edit) => Some(edit.id),
            ControlMessage::DefinitionDelete { id } => Some(*id),
            ControlMessage::DefinitionChangePassword { id, .. } => Some(*id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn test_action_names_and_aliases() {
        assert_eq!(ControlAction::DefinitionEdit.to_string(), "DEFINITION_AMQP_EDIT");
        assert_eq!(
            ControlAction::from_str("DEFINITION_EDIT").unwrap(),
            ControlAction::DefinitionEdit
        );
        for action in ControlAction::iter() {
            assert_eq!(ControlAction::from_str(&action.to_string()).unwrap(), action);
        }
        assert!(!ControlAction::ConnectorClose.is_definition_action());
        assert!(ControlAction::DefinitionCreate.is_definition_action());
    }

    #[test]
    fn test_decode_connector_close() {
        let message =
            ControlMessage::from_json(r#"{"action": "CONNECTOR_CLOSE", "odb_token": "t-1"}"#)
                .unwrap();
        assert_eq!(
            message,
            ControlMessage::ConnectorClose {
                token: "t-1".to_string()
            }
        );
        assert_eq!(message.definition_id(), None);
    }

    #[test]
    fn test_decode_edit_without_password() {
        let message = ControlMessage::from_value(json!({
            "action": "DEFINITION_AMQP_EDIT",
            "id": 1,
            "host": "mq2",
            "port": 5672,
            "vhost": "/",
            "username": "guest",
            "heartbeat": 30,
            "frame_max": 65536,
        }))
        .unwrap();

        match message {
            ControlMessage::DefinitionEdit(edit) => {
                assert_eq!(edit.id, DefinitionId(1));
                assert_eq!(edit.host, "mq2");
                assert_eq!(edit.virtual_host, "/");
                assert_eq!(edit.heartbeat_seconds, 30);
                assert_eq!(edit.frame_max_bytes, 65536);
                assert_eq!(edit.name, None);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_create_with_nested_credentials_and_numeric_host() {
        let message = ControlMessage::from_value(json!({
            "action": "DEFINITION_CREATE",
            "id": 4,
            "name": "billing",
            "host": 10,
            "port": 5672,
            "virtual_host": "/billing",
            "credentials": {"username": "svc", "password": "s3"},
        }))
        .unwrap();

        match message {
            ControlMessage::DefinitionCreate(definition) => {
                assert_eq!(definition.host, "10");
                assert_eq!(definition.username, "svc");
                assert_eq!(definition.password, "s3");
                assert_eq!(definition.name, "billing");
                assert_eq!(definition.heartbeat_seconds, 0);
                assert_eq!(definition.frame_max_bytes, DEFAULT_FRAME_MAX);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_change_password() {
        let message = ControlMessage::from_value(json!({
            "action": "DEFINITION_AMQP_CHANGE_PASSWORD",
            "id": 1,
            "password": "p2",
        }))
        .unwrap();
        assert_eq!(message.action(), ControlAction::DefinitionChangePassword);
        assert_eq!(message.definition_id(), Some(DefinitionId(1)));
        assert!(!format!("{:?}", message).contains("p2"));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            ControlMessage::from_value(json!({"action": "OUTGOING_AMQP_EDIT", "id": 1})),
            Err(ControlMessageError::UnknownAction {
                action: "OUTGOING_AMQP_EDIT".to_string()
            })
        );
        assert_eq!(
            ControlMessage::from_value(json!({"action": "DEFINITION_AMQP_DELETE"})),
            Err(ControlMessageError::MissingField {
                action: ControlAction::DefinitionDelete,
                field: "id"
            })
        );
        assert_eq!(
            ControlMessage::from_value(json!({"action": "CONNECTOR_CLOSE"})),
            Err(ControlMessageError::MissingField {
                action: ControlAction::ConnectorClose,
                field: "odb_token"
            })
        );
        assert!(matches!(
            ControlMessage::from_json("not json"),
            Err(ControlMessageError::Malformed { .. })
        ));
        assert!(matches!(
            ControlMessage::from_value(json!({"id": 1})),
            Err(ControlMessageError::Malformed { .. })
        ));
    }
}
