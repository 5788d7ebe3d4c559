//! Definition store contract
//!
//! The store is read once, at connector startup. The connector never writes
//! back to it; later changes arrive as control messages.

use super::error::{StoreError, StoreResult};
use super::types::{Definition, DefinitionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Read access to persisted connection definitions
pub trait DefinitionStore: Send + Sync {
    /// Load one definition; fails with [`StoreError::NotFound`] if no record matches
    fn load_definition(
        &self,
        cluster_id: i64,
        definition_id: DefinitionId,
    ) -> StoreResult<Definition>;

    /// Token of this process's store session; CONNECTOR_CLOSE messages carry it
    fn session_token(&self) -> String;

    /// Release the store session
    fn close(&self);
}

/// Definition store held entirely in memory
///
/// Used by tests and by embedders that receive definitions some other way.
pub struct InMemoryDefinitionStore {
    token: String,
    definitions: RwLock<HashMap<(i64, DefinitionId), Definition>>,
    close_count: AtomicUsize,
}

impl InMemoryDefinitionStore {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            definitions: RwLock::new(HashMap::new()),
            close_count: AtomicUsize::new(0),
        }
    }

    pub fn with_definition(self, cluster_id: i64, definition: Definition) -> Self {
        self.insert(cluster_id, definition);
        self
    }

    pub fn insert(&self, cluster_id: i64, definition: Definition) {
        let mut definitions = self
            .definitions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        definitions.insert((cluster_id, definition.id), definition);
    }

    /// Number of times [`DefinitionStore::close`] has been called
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::Acquire)
    }
}

impl DefinitionStore for InMemoryDefinitionStore {
    fn load_definition(
        &self,
        cluster_id: i64,
        definition_id: DefinitionId,
    ) -> StoreResult<Definition> {
        let definitions = self.definitions.read().map_err(|_| StoreError::Unavailable {
            message: "definition map lock poisoned".to_string(),
        })?;
        definitions
            .get(&(cluster_id, definition_id))
            .cloned()
            .ok_or(StoreError::NotFound {
                cluster_id,
                definition_id,
            })
    }

    fn session_token(&self) -> String {
        self.token.clone()
    }

    fn close(&self) {
        self.close_count.fetch_add(1, Ordering::AcqRel);
        log::debug!("Definition store session closed");
    }
}
