//! Connector state and lock hierarchy
//!
//! The connector owns one active definition and two session registries.
//! Locks are always taken in the same order: definition, outgoing registry,
//! inbound registry. The registries can only be locked through
//! [`Connector::lock_registries`], which borrows from a held definition
//! guard, so the guard outlives the registry guards and the order cannot be
//! inverted.

use super::error::{ConnectorError, ConnectorResult};
use super::registry::SessionRegistry;
use crate::core::retry::ReconnectPolicy;
use crate::core::shutdown::{ShutdownCoordinator, ShutdownReason};
use crate::core::sync::{handle_mutex_poison, handle_rwlock_read, handle_rwlock_write};
use crate::definition::{Definition, DefinitionId, DefinitionStore};
use crate::session::{
    build_transport_parameters, ConnectionSession, ParamsProvider, ParamsSource, SessionFailure,
    SessionHandle, SessionId, SessionRole, SessionState, Transport, TransportError,
    TransportParameters, TransportResult,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

fn sync_error(message: String) -> ConnectorError {
    ConnectorError::Synchronisation { message }
}

/// Everything guarded by the definition lock
pub(super) struct DefinitionState {
    pub(super) active: Definition,
    /// Records stored by DEFINITION_CREATE
    pub(super) catalog: BTreeMap<DefinitionId, Definition>,
    pub(super) shut_down: bool,
}

/// Both registry guards, taken in order
///
/// Fields drop in declaration order, so the inbound guard is released first.
pub(super) struct Registries<'a> {
    pub(super) inbound: MutexGuard<'a, SessionRegistry>,
    pub(super) outgoing: MutexGuard<'a, SessionRegistry>,
}

impl Registries<'_> {
    fn contains(&self, name: &str) -> bool {
        self.outgoing.contains(name) || self.inbound.contains(name)
    }

    fn for_role(&mut self, role: SessionRole) -> &mut SessionRegistry {
        match role {
            SessionRole::Outgoing => &mut self.outgoing,
            SessionRole::Inbound => &mut self.inbound,
        }
    }
}

/// Live view of the active definition for inbound sessions
struct DefinitionView(Arc<RwLock<DefinitionState>>);

impl ParamsProvider for DefinitionView {
    fn transport_parameters(&self) -> TransportResult<TransportParameters> {
        let state = handle_rwlock_read(self.0.read(), "definition", TransportError::Internal)?;
        Ok(build_transport_parameters(&state.active))
    }
}

struct SessionFactory {
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    runtime: Handle,
    failures: mpsc::UnboundedSender<SessionFailure>,
}

impl SessionFactory {
    fn start(&self, name: &str, role: SessionRole, params: ParamsSource) -> SessionHandle {
        ConnectionSession::new(
            name,
            role,
            params,
            Arc::clone(&self.transport),
            self.policy.clone(),
            self.failures.clone(),
        )
        .start(&self.runtime)
    }
}

/// Owner of one active definition and the sessions derived from it
pub struct Connector {
    token: String,
    definition: Arc<RwLock<DefinitionState>>,
    outgoing: Mutex<SessionRegistry>,
    inbound: Mutex<SessionRegistry>,
    store: Arc<dyn DefinitionStore>,
    sessions: SessionFactory,
    shutdown: ShutdownCoordinator,
}

impl Connector {
    /// Create a connector for `definition`
    ///
    /// Must be called inside a tokio runtime; sessions are spawned on it.
    /// Fatal session failures are delivered on the returned receiver.
    pub fn new(
        definition: Definition,
        store: Arc<dyn DefinitionStore>,
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
    ) -> ConnectorResult<(Self, mpsc::UnboundedReceiver<SessionFailure>)> {
        let runtime = Handle::try_current().map_err(|_| ConnectorError::NoRuntime)?;
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        log::info!(
            "Connector for definition {} '{}' at {}",
            definition.id,
            definition.name,
            definition.endpoint()
        );
        log::trace!("Active definition: {:?}", definition);

        let connector = Self {
            token: store.session_token(),
            definition: Arc::new(RwLock::new(DefinitionState {
                active: definition,
                catalog: BTreeMap::new(),
                shut_down: false,
            })),
            outgoing: Mutex::new(SessionRegistry::new()),
            inbound: Mutex::new(SessionRegistry::new()),
            store,
            sessions: SessionFactory {
                transport,
                policy,
                runtime,
                failures: failures_tx,
            },
            shutdown: ShutdownCoordinator::new(),
        };
        Ok((connector, failures_rx))
    }

    /// Load the definition from the store, then create the connector
    pub fn load(
        cluster_id: i64,
        definition_id: DefinitionId,
        store: Arc<dyn DefinitionStore>,
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
    ) -> ConnectorResult<(Self, mpsc::UnboundedReceiver<SessionFailure>)> {
        let definition = store.load_definition(cluster_id, definition_id)?;
        Self::new(definition, store, transport, policy)
    }

    pub(super) fn read_definition(&self) -> ConnectorResult<RwLockReadGuard<'_, DefinitionState>> {
        handle_rwlock_read(self.definition.read(), "definition", sync_error)
    }

    pub(super) fn write_definition(
        &self,
    ) -> ConnectorResult<RwLockWriteGuard<'_, DefinitionState>> {
        handle_rwlock_write(self.definition.write(), "definition", sync_error)
    }

    /// Lock outgoing then inbound; `_held` proves the definition lock is taken
    pub(super) fn lock_registries<'a>(
        &'a self,
        _held: &'a DefinitionState,
    ) -> ConnectorResult<Registries<'a>> {
        let outgoing = handle_mutex_poison(self.outgoing.lock(), "outgoing registry", sync_error)?;
        let inbound = handle_mutex_poison(self.inbound.lock(), "inbound registry", sync_error)?;
        Ok(Registries { inbound, outgoing })
    }

    /// Token of the definition store session; CONNECTOR_CLOSE must carry it
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn definition(&self) -> ConnectorResult<Definition> {
        Ok(self.read_definition()?.active.clone())
    }

    pub fn definition_id(&self) -> ConnectorResult<DefinitionId> {
        Ok(self.read_definition()?.active.id)
    }

    /// A record stored by DEFINITION_CREATE
    pub fn catalog_definition(&self, id: DefinitionId) -> ConnectorResult<Option<Definition>> {
        Ok(self.read_definition()?.catalog.get(&id).cloned())
    }

    pub fn transport_parameters(&self) -> ConnectorResult<TransportParameters> {
        Ok(build_transport_parameters(&self.read_definition()?.active))
    }

    pub fn outgoing_session_ids(&self) -> ConnectorResult<Vec<(String, SessionId)>> {
        let state = self.read_definition()?;
        let registries = self.lock_registries(&state)?;
        Ok(registries.outgoing.ids())
    }

    pub fn inbound_session_ids(&self) -> ConnectorResult<Vec<(String, SessionId)>> {
        let state = self.read_definition()?;
        let registries = self.lock_registries(&state)?;
        Ok(registries.inbound.ids())
    }

    /// Current state of the named session, in either registry
    pub fn session_state(&self, name: &str) -> ConnectorResult<Option<SessionState>> {
        let state = self.read_definition()?;
        let registries = self.lock_registries(&state)?;
        Ok(registries
            .outgoing
            .get(name)
            .or_else(|| registries.inbound.get(name))
            .map(SessionHandle::state))
    }

    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    pub fn is_shut_down(&self) -> ConnectorResult<bool> {
        Ok(self.read_definition()?.shut_down)
    }

    /// Start a publishing session from the active definition
    ///
    /// Outgoing sessions connect with the parameters current at creation;
    /// they pick up later changes only when recreated.
    pub fn provision_outgoing(&self, name: &str) -> ConnectorResult<SessionId> {
        self.provision(name, SessionRole::Outgoing)
    }

    /// Start a consuming session that reads the active definition on every connect attempt
    pub fn provision_inbound(&self, name: &str) -> ConnectorResult<SessionId> {
        self.provision(name, SessionRole::Inbound)
    }

    fn provision(&self, name: &str, role: SessionRole) -> ConnectorResult<SessionId> {
        let state = self.read_definition()?;
        if state.shut_down {
            return Err(ConnectorError::ShutDown);
        }
        let mut registries = self.lock_registries(&state)?;
        if registries.contains(name) {
            return Err(ConnectorError::DuplicateSession {
                name: name.to_string(),
            });
        }

        let params = match role {
            SessionRole::Outgoing => {
                ParamsSource::Snapshot(build_transport_parameters(&state.active))
            }
            SessionRole::Inbound => {
                ParamsSource::Live(Arc::new(DefinitionView(Arc::clone(&self.definition))))
            }
        };
        let handle = self.sessions.start(name, role, params);
        let id = handle.id();
        registries.for_role(role).insert(handle);

        log::info!("Provisioned {} session '{}' ({})", role, name, id);
        Ok(id)
    }

    /// Close the named session and remove it from its registry
    pub fn release_session(&self, name: &str) -> ConnectorResult<SessionId> {
        let state = self.read_definition()?;
        let mut registries = self.lock_registries(&state)?;
        let handle = registries
            .outgoing
            .remove(name)
            .or_else(|| registries.inbound.remove(name))
            .ok_or_else(|| ConnectorError::UnknownSession {
                name: name.to_string(),
            })?;

        handle.close();
        log::info!("Released {} session '{}' ({})", handle.role(), name, handle.id());
        Ok(handle.id())
    }

    /// Close every outgoing session and start a replacement from the active definition
    ///
    /// Inbound sessions are left alone; they re-read the definition on their
    /// own reconnect path. Returns the ids of the new sessions.
    pub fn recreate_outgoing_sessions(&self) -> ConnectorResult<Vec<SessionId>> {
        let state = self.read_definition()?;
        if state.shut_down {
            return Err(ConnectorError::ShutDown);
        }
        let mut registries = self.lock_registries(&state)?;
        Ok(self.recreate_outgoing_locked(&state.active, &mut registries))
    }

    pub(super) fn recreate_outgoing_locked(
        &self,
        definition: &Definition,
        registries: &mut Registries<'_>,
    ) -> Vec<SessionId> {
        let params = build_transport_parameters(definition);
        let previous = registries.outgoing.close_all();

        let mut fresh = Vec::with_capacity(previous.len());
        for old in &previous {
            let handle = self.sessions.start(
                old.name(),
                SessionRole::Outgoing,
                ParamsSource::Snapshot(params.clone()),
            );
            log::debug!("Outgoing session '{}': {} -> {}", old.name(), old.id(), handle.id());
            fresh.push(handle.id());
            registries.outgoing.insert(handle);
        }

        log::info!(
            "Recreated {} outgoing sessions for {}",
            fresh.len(),
            definition.endpoint()
        );
        fresh
    }

    /// Stop every session, release the definition store and record `reason`
    ///
    /// Runs once; returns `false` when the connector was already shut down.
    /// The process is not terminated here: the reason reaches the supervisor
    /// through the [`ShutdownCoordinator`].
    pub fn shutdown(&self, reason: ShutdownReason) -> ConnectorResult<bool> {
        let mut state = self.write_definition()?;
        if state.shut_down {
            log::debug!("Connector already shut down, ignoring '{}'", reason);
            return Ok(false);
        }
        state.shut_down = true;

        let mut registries = self.lock_registries(&state)?;
        let outgoing = registries.outgoing.close_all();
        let inbound = registries.inbound.close_all();
        log::info!(
            "Stopping connector for definition {} ({}): closed {} outgoing and {} inbound sessions",
            state.active.id,
            reason,
            outgoing.len(),
            inbound.len()
        );

        self.store.close();
        self.shutdown.trigger(reason);
        Ok(true)
    }
}
