//! In-flight progress models
//!
//! Progress is single-writer: only the active executor produces updates,
//! and within one invocation the fraction never decreases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Progress of a running diagnostic test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestProgress {
    /// ECU under test
    pub ecu_id: String,
    /// Test being run
    pub test_id: String,
    /// Completion fraction in [0, 1]
    pub fraction: f64,
    /// Human-readable description of the current step
    pub step: String,
}

impl TestProgress {
    /// Snapshot published the moment an invocation is accepted.
    pub fn starting(ecu_id: &str, test_id: &str) -> Self {
        Self {
            ecu_id: ecu_id.to_string(),
            test_id: test_id.to_string(),
            fraction: 0.0,
            step: "Starting".to_string(),
        }
    }
}

/// Stages of a programming invocation, in execution order.
///
/// The ordering matters: at `Erasing` and beyond the invocation is
/// committed and the ECU can no longer be assumed bootable if the
/// operation stops there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgrammingStage {
    Validating,
    SecurityUnlock,
    Erasing,
    Writing,
    Verifying,
}

impl ProgrammingStage {
    /// Whether stopping in this stage leaves the ECU in an uncertain,
    /// possibly non-bootable state.
    pub fn is_committed(self) -> bool {
        self >= ProgrammingStage::Erasing
    }

    /// Progress fraction at which this stage begins.
    pub fn base_fraction(self) -> f64 {
        match self {
            ProgrammingStage::Validating => 0.0,
            ProgrammingStage::SecurityUnlock => 0.05,
            ProgrammingStage::Erasing => 0.10,
            ProgrammingStage::Writing => 0.25,
            ProgrammingStage::Verifying => 0.90,
        }
    }
}

impl fmt::Display for ProgrammingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProgrammingStage::Validating => "validating",
            ProgrammingStage::SecurityUnlock => "security unlock",
            ProgrammingStage::Erasing => "erasing",
            ProgrammingStage::Writing => "writing",
            ProgrammingStage::Verifying => "verifying",
        };
        f.write_str(name)
    }
}

/// Progress of a running programming operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgrammingProgress {
    /// ECU being programmed
    pub ecu_id: String,
    /// Current stage
    pub stage: ProgrammingStage,
    /// Completion fraction in [0, 1]
    pub fraction: f64,
    /// Human-readable description of the current step
    pub step: String,
    /// Blocks written so far (meaningful in the writing stage)
    pub blocks_written: u32,
    /// Total block count, once the download window is negotiated
    pub blocks_total: u32,
}

impl ProgrammingProgress {
    /// Snapshot published the moment an invocation is accepted.
    pub fn starting(ecu_id: &str) -> Self {
        Self {
            ecu_id: ecu_id.to_string(),
            stage: ProgrammingStage::Validating,
            fraction: 0.0,
            step: "Validating firmware image".to_string(),
            blocks_written: 0,
            blocks_total: 0,
        }
    }
}
