//! Control-message handlers
//!
//! Each handler takes the definition lock first and checks that the
//! connector is still running before touching anything. Handlers never
//! touch a session's internals; they only close and start sessions.

use super::dispatcher::Disposition;
use super::error::ConnectorResult;
use super::manager::Connector;
use crate::core::shutdown::ShutdownReason;
use crate::definition::{Definition, DefinitionEdit, DefinitionId};

impl Connector {
    pub(super) fn on_connector_close(&self) -> ConnectorResult<Disposition> {
        Ok(shut_down_or_ignored(self.shutdown(ShutdownReason::ConnectorClosed)?))
    }

    pub(super) fn on_definition_create(
        &self,
        definition: &Definition,
    ) -> ConnectorResult<Disposition> {
        let mut state = self.write_definition()?;
        if state.shut_down {
            return Ok(Disposition::Ignored);
        }
        state.catalog.insert(definition.id, definition.clone());
        log::info!(
            "Stored definition {} '{}' at {}",
            definition.id,
            definition.name,
            definition.endpoint()
        );
        Ok(Disposition::Applied)
    }

    pub(super) fn on_definition_edit(&self, edit: &DefinitionEdit) -> ConnectorResult<Disposition> {
        let mut state = self.write_definition()?;
        if state.shut_down || state.active.id != edit.id {
            return Ok(Disposition::Ignored);
        }
        let replacement = edit.clone().apply_to(&state.active);
        state.active = replacement;
        log::info!(
            "Definition {} now points at {}",
            state.active.id,
            state.active.endpoint()
        );
        log::trace!("Active definition: {:?}", state.active);

        let mut registries = self.lock_registries(&state)?;
        self.recreate_outgoing_locked(&state.active, &mut registries);
        Ok(Disposition::Applied)
    }

    pub(super) fn on_definition_delete(&self, id: DefinitionId) -> ConnectorResult<Disposition> {
        log::info!("Definition {} deleted", id);
        Ok(shut_down_or_ignored(self.shutdown(ShutdownReason::DefinitionDeleted)?))
    }

    pub(super) fn on_definition_change_password(
        &self,
        id: DefinitionId,
        password: &str,
    ) -> ConnectorResult<Disposition> {
        let mut state = self.write_definition()?;
        if state.shut_down || state.active.id != id {
            return Ok(Disposition::Ignored);
        }
        state.active.password = password.to_string();
        log::info!("Password changed for definition {}", id);

        let mut registries = self.lock_registries(&state)?;
        self.recreate_outgoing_locked(&state.active, &mut registries);
        Ok(Disposition::Applied)
    }
}

fn shut_down_or_ignored(stopped: bool) -> Disposition {
    if stopped {
        Disposition::ShutDown
    } else {
        Disposition::Ignored
    }
}
