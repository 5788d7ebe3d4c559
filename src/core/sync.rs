//! Lock acquisition helpers
//!
//! The connector guards its definition and session registries with std
//! locks. A panic while one of those locks is held poisons it; these helpers
//! turn the poison into the caller's error type, naming the lock so the log
//! line says which piece of shared state is no longer trustworthy.

use std::sync::{LockResult, MutexGuard, RwLockReadGuard, RwLockWriteGuard};

fn poison_message(lock_name: &str, mode: &str) -> String {
    format!(
        "Internal synchronisation error ({} {} poisoned). A panic occurred while the lock was held",
        lock_name, mode
    )
}

/// Convert a poisoned mutex acquisition into an application error
///
/// # Examples
/// ```
/// use std::sync::Mutex;
/// use amqp_connector::core::sync::handle_mutex_poison;
/// use amqp_connector::connector::ConnectorError;
///
/// let registry = Mutex::new(Vec::<String>::new());
/// let guard = handle_mutex_poison(registry.lock(), "outgoing registry", |message| {
///     ConnectorError::Synchronisation { message }
/// })
/// .unwrap();
/// assert!(guard.is_empty());
/// ```
pub fn handle_mutex_poison<'a, T, E>(
    result: LockResult<MutexGuard<'a, T>>,
    lock_name: &str,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<MutexGuard<'a, T>, E> {
    result.map_err(|_| error_constructor(poison_message(lock_name, "mutex")))
}

/// Convert a poisoned RwLock read acquisition into an application error
pub fn handle_rwlock_read<'a, T, E>(
    result: LockResult<RwLockReadGuard<'a, T>>,
    lock_name: &str,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockReadGuard<'a, T>, E> {
    result.map_err(|_| error_constructor(poison_message(lock_name, "read lock")))
}

/// Convert a poisoned RwLock write acquisition into an application error
pub fn handle_rwlock_write<'a, T, E>(
    result: LockResult<RwLockWriteGuard<'a, T>>,
    lock_name: &str,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockWriteGuard<'a, T>, E> {
    result.map_err(|_| error_constructor(poison_message(lock_name, "write lock")))
}
