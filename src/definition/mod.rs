//! Connection definitions
//!
//! A definition is the named set of parameters (host, credentials, tuning)
//! for one broker endpoint. A connector loads its definition once from the
//! definition store at startup; after that every change arrives over the
//! control bus.

mod error;
mod store;
mod types;

pub use error::{StoreError, StoreResult};
pub use store::{DefinitionStore, InMemoryDefinitionStore};
pub use types::{canonical_host, Definition, DefinitionEdit, DefinitionId};
