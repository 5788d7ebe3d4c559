//! Role-specific session registries

use crate::session::{SessionHandle, SessionId};
use std::collections::BTreeMap;

/// Sessions of one role, keyed by name
///
/// The registry owns its handles: removing an entry hands ownership to the
/// caller, and dropping a handle closes its session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<String, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&SessionHandle> {
        self.sessions.get(name)
    }

    /// Insert a session, returning the one it replaced
    pub fn insert(&mut self, handle: SessionHandle) -> Option<SessionHandle> {
        self.sessions.insert(handle.name().to_string(), handle)
    }

    pub fn remove(&mut self, name: &str) -> Option<SessionHandle> {
        self.sessions.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    /// Name and current session id of every entry
    pub fn ids(&self) -> Vec<(String, SessionId)> {
        self.sessions
            .iter()
            .map(|(name, handle)| (name.clone(), handle.id()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Request a close of every session and empty the registry
    pub fn close_all(&mut self) -> Vec<SessionHandle> {
        let drained: Vec<SessionHandle> =
            std::mem::take(&mut self.sessions).into_values().collect();
        for handle in &drained {
            handle.close();
        }
        drained
    }
}
