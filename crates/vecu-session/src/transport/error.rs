//! Transport errors

use thiserror::Error;

/// Failures surfaced by a transport channel.
///
/// All of them map to the `Transient` error kind when they occur before
/// anything irreversible; the programming executor escalates them to
/// `Critical` once a flash has passed its commit point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response within the allowed window
    #[error("timeout waiting for ECU response")]
    Timeout,

    /// The link to the vehicle dropped
    #[error("transport disconnected")]
    Disconnected,

    /// The response did not parse as a protocol frame
    #[error("malformed response: {0}")]
    Malformed(String),
}
