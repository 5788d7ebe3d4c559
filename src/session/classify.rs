//! Retryable vs fatal transport failures
//!
//! The table lives here, apart from any retry policy, so the owner of a
//! session decides how often to retry without repeating the error list.

use super::error::TransportError;
use std::io;

/// Outcome of classifying a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureClass {
    /// The session reconnects on its own
    Retryable,
    /// The failure propagates to the session's owner
    Fatal,
}

#[cfg(unix)]
const RECONNECT_ERRNOS: [i32; 7] = [
    libc::ENETUNREACH,
    libc::ENETRESET,
    libc::ECONNABORTED,
    libc::ECONNRESET,
    libc::ETIMEDOUT,
    libc::ECONNREFUSED,
    libc::EHOSTUNREACH,
];

/// Classify a transport failure
pub fn classify_failure(error: &TransportError) -> FailureClass {
    match error {
        TransportError::Io(io_error) if is_reconnectable(io_error) => FailureClass::Retryable,
        // Compatibility accommodation for a known broker-client quirk, not a general rule
        TransportError::StartupTypeMismatch(_) => FailureClass::Retryable,
        _ => FailureClass::Fatal,
    }
}

fn is_reconnectable(error: &io::Error) -> bool {
    #[cfg(unix)]
    {
        if let Some(errno) = error.raw_os_error() {
            return RECONNECT_ERRNOS.contains(&errno);
        }
    }

    // ENETRESET has no ErrorKind, so a network reset is only retryable on unix
    matches!(
        error.kind(),
        io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::HostUnreachable
    )
}
