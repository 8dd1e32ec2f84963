//! Error taxonomy for terminal operation outcomes
//!
//! Every failed test or programming invocation carries exactly one
//! [`ExecutionError`]. The [`ErrorKind`] tells callers whether a retry can
//! help; the [`Severity`] tells the presentation layer how loudly to warn
//! the operator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classifies a terminal failure for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown vehicle, ECU or test id. Retrying the same input cannot succeed.
    NotFound,
    /// Missing or mistyped parameters, rejected image format, bad credentials.
    InvalidInput,
    /// Transport timeout, disconnect or ECU reject before anything irreversible.
    /// Safe to retry from idle.
    Transient,
    /// Failure after an irreversible step began. Requires operator attention
    /// before anything else touches the ECU.
    Critical,
    /// The invocation was cancelled. Not a fault of input or hardware.
    Cancelled,
}

/// How severe a terminal failure is for the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Recoverable; the vehicle is in a known-good state.
    Routine,
    /// The ECU may be left in an uncertain, possibly non-bootable state.
    Critical,
}

/// Terminal error carried by a failed test or programming result.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ExecutionError {
    /// Taxonomy classification
    pub kind: ErrorKind,
    /// Operator-facing severity
    pub severity: Severity,
    /// Human-readable description, always present
    pub message: String,
}

impl ExecutionError {
    /// A routine-severity error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Routine,
            message: message.into(),
        }
    }

    /// A critical-severity error.
    pub fn critical(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Critical,
            message: message.into(),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}
