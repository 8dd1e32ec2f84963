//! Terminal outcome models
//!
//! Exactly one of these is published per accepted invocation, success or
//! not. Every variant carries a human-readable message.

use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, Severity};

/// One named reading produced by a measurements-shaped test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Payload of a successful diagnostic test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum TestPayload {
    /// Plain acknowledgement
    Ack,
    /// Named numeric readings
    Measurements { readings: Vec<Measurement> },
    /// Free-form text report
    Report { text: String },
}

/// Terminal outcome of a diagnostic test invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestResult {
    /// The test ran to completion.
    Success { payload: TestPayload, message: String },
    /// The test failed or was cancelled.
    Error(ExecutionError),
}

impl TestResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TestResult::Success { .. })
    }

    /// The human-readable message carried by either variant.
    pub fn message(&self) -> &str {
        match self {
            TestResult::Success { message, .. } => message,
            TestResult::Error(err) => &err.message,
        }
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            TestResult::Success { .. } => None,
            TestResult::Error(err) => Some(err),
        }
    }
}

/// Payload of a successful programming operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgrammingPayload {
    /// Payload bytes transferred to the ECU
    pub bytes_written: u64,
    /// Blocks transferred
    pub blocks_written: u32,
    /// Checksum the ECU reported during verification
    pub verified_checksum: u32,
    /// Version string the ECU reported during verification
    pub reported_version: String,
}

/// Terminal outcome of a programming invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgrammingResult {
    /// The image was written and verified.
    Success {
        payload: ProgrammingPayload,
        message: String,
    },
    /// Programming failed or was cancelled.
    Error(ExecutionError),
}

impl ProgrammingResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ProgrammingResult::Success { .. })
    }

    /// The human-readable message carried by either variant.
    pub fn message(&self) -> &str {
        match self {
            ProgrammingResult::Success { message, .. } => message,
            ProgrammingResult::Error(err) => &err.message,
        }
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            ProgrammingResult::Success { .. } => None,
            ProgrammingResult::Error(err) => Some(err),
        }
    }

    /// Whether this outcome must be presented as a hardware-risk warning.
    pub fn is_critical(&self) -> bool {
        matches!(self, ProgrammingResult::Error(err) if err.severity == Severity::Critical)
    }
}
