//! Control-message filtering and dispatch

use super::error::ConnectorResult;
use super::manager::Connector;
use super::messages::ControlMessage;
use crate::definition::DefinitionId;

/// What dispatching a message did
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Disposition {
    Applied,
    /// Addressed to another connector, or arrived after shutdown
    Ignored,
    /// The message stopped this connector
    ShutDown,
}

/// Whether a connector holding `token` and `definition_id` acts on `message`
///
/// CONNECTOR_CLOSE is matched on the store session token, every
/// `DEFINITION_*` action on the definition id.
pub fn accepts(message: &ControlMessage, token: &str, definition_id: DefinitionId) -> bool {
    match message {
        ControlMessage::ConnectorClose { token: target } => target == token,
        other => other.definition_id() == Some(definition_id),
    }
}

impl Connector {
    pub fn accepts(&self, message: &ControlMessage) -> ConnectorResult<bool> {
        Ok(accepts(message, self.token(), self.definition_id()?))
    }

    /// Apply `message` if it is addressed to this connector
    pub fn dispatch(&self, message: &ControlMessage) -> ConnectorResult<Disposition> {
        {
            let state = self.read_definition()?;
            if state.shut_down {
                log::debug!("Connector shut down, ignoring {}", message.action());
                return Ok(Disposition::Ignored);
            }
            if !accepts(message, self.token(), state.active.id) {
                log::debug!("Ignoring {} addressed elsewhere", message.action());
                return Ok(Disposition::Ignored);
            }
        }

        log::info!("Applying {}", message.action());
        match message {
            ControlMessage::ConnectorClose { .. } => self.on_connector_close(),
            ControlMessage::DefinitionCreate(definition) => self.on_definition_create(definition),
            ControlMessage::DefinitionEdit(edit) => self.on_definition_edit(edit),
            ControlMessage::DefinitionDelete { id } => self.on_definition_delete(*id),
            ControlMessage::DefinitionChangePassword { id, password } => {
                self.on_definition_change_password(*id, password)
            }
        }
    }
}
