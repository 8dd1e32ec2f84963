//! Session-level errors
//!
//! [`SessionError`] covers everything a manager call can return
//! synchronously. The taxonomy mapping in [`SessionError::kind`] is what
//! accepted-but-invalid invocations carry into their immediate terminal
//! result event.

use std::fmt;

use thiserror::Error;
use vecu_core::{ErrorKind, ImageFormat, ParameterError};
use vecu_resolver::ResolverError;

use crate::transport::TransportError;

/// Convenience alias for manager call results.
pub type SessionResult<T> = Result<T, SessionError>;

/// The two mutually-exclusive operation kinds a manager serialises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Test,
    Programming,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Test => f.write_str("test"),
            OperationKind::Programming => f.write_str("programming"),
        }
    }
}

/// Errors surfaced directly by manager calls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("No vehicle selected")]
    NoVehicleSelected,

    #[error("Vehicle not found: {make} {model} {year}")]
    VehicleNotFound {
        make: String,
        model: String,
        year: u16,
    },

    #[error("Unknown ECU '{0}'")]
    UnknownEcu(String),

    #[error("Unknown test '{test_id}' on ECU '{ecu_id}'")]
    UnknownTest { ecu_id: String, test_id: String },

    #[error("Invalid parameters for test '{test_id}': {source}")]
    InvalidParameters {
        test_id: String,
        #[source]
        source: ParameterError,
    },

    #[error("ECU '{0}' does not support programming")]
    ProgrammingNotSupported(String),

    #[error("ECU '{ecu_id}' does not accept {format} images")]
    UnsupportedImageFormat {
        ecu_id: String,
        format: ImageFormat,
    },

    #[error("A {0} operation is already in progress")]
    OperationInProgress(OperationKind),

    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// Taxonomy classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NoVehicleSelected
            | SessionError::VehicleNotFound { .. }
            | SessionError::UnknownEcu(_)
            | SessionError::UnknownTest { .. } => ErrorKind::NotFound,
            SessionError::InvalidParameters { .. }
            | SessionError::ProgrammingNotSupported(_)
            | SessionError::UnsupportedImageFormat { .. }
            | SessionError::InvalidConfig(_) => ErrorKind::InvalidInput,
            SessionError::OperationInProgress(_) | SessionError::Transport(_) => {
                ErrorKind::Transient
            }
        }
    }
}

impl From<ResolverError> for SessionError {
    fn from(err: ResolverError) -> Self {
        match err {
            ResolverError::VehicleNotFound { make, model, year } => {
                SessionError::VehicleNotFound { make, model, year }
            }
        }
    }
}
