//! ECU capability descriptors
//!
//! Capabilities come from the resolver and are read-only for the life of a
//! vehicle selection. Executors trust them: validation against these
//! descriptors happens once, at the manager boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::params::ParameterSpec;

/// Wire protocols an ECU can be reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireProtocol {
    Can,
    CanFd,
    DoIp,
    KLine,
}

/// Firmware image container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    RawBinary,
    IntelHex,
    SRecord,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageFormat::RawBinary => "raw binary",
            ImageFormat::IntelHex => "Intel HEX",
            ImageFormat::SRecord => "S-record",
        };
        f.write_str(name)
    }
}

/// Shape of the payload a diagnostic test produces on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    /// Plain acknowledgement, no data
    Ack,
    /// Named numeric readings
    Measurements,
    /// Free-form text report
    Report,
}

/// One protocol step of a diagnostic test.
///
/// Progress fractions are derived from the step count; the label becomes
/// the human-readable description while the step is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStep {
    pub label: String,
}

/// A named diagnostic operation belonging to one ECU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcuTest {
    /// Stable test identifier ("OIL_RESET")
    pub id: String,
    /// Human-readable name
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Routine number the request framing dispatches on
    pub routine: u16,
    /// Parameters this test accepts
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parameters: Vec<ParameterSpec>,
    /// Expected result payload shape
    pub result_shape: ResultShape,
    /// Ordered protocol steps
    pub steps: Vec<TestStep>,
}

/// Firmware programming capability of one ECU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgrammingCapability {
    /// Whether flashing is supported at all
    pub flash_supported: bool,
    /// Accepted firmware image container formats
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub accepted_formats: Vec<ImageFormat>,
    /// Whether a security unlock must precede flashing
    #[serde(default)]
    pub requires_unlock: bool,
    /// Upper bound on the write block size, when the ECU declares one
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_block_size: Option<u16>,
}

impl ProgrammingCapability {
    pub fn accepts(&self, format: ImageFormat) -> bool {
        self.accepted_formats.contains(&format)
    }
}

/// Security-access requirement declared by an ECU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAccessRequirement {
    /// Access level to unlock (vendor-defined)
    pub level: u8,
}

/// One ECU of the selected vehicle, with everything a session may do to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcuCapability {
    /// Stable identifier ("ECM-1")
    pub id: String,
    /// Display name ("Engine Control Module")
    pub name: String,
    /// Wire protocols the ECU answers on
    pub protocols: Vec<WireProtocol>,
    /// Diagnostic tests the ECU supports
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tests: Vec<EcuTest>,
    /// Programming capability, when declared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub programming: Option<ProgrammingCapability>,
    /// Security-access requirement, when the ECU is protected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityAccessRequirement>,
}

impl EcuCapability {
    /// Look up a declared test by id.
    pub fn test(&self, test_id: &str) -> Option<&EcuTest> {
        self.tests.iter().find(|t| t.id == test_id)
    }

    /// Whether this ECU can be flashed at all.
    pub fn is_programmable(&self) -> bool {
        self.programming.as_ref().is_some_and(|p| p.flash_supported)
    }

    /// Whether this ECU declares a security-access requirement.
    pub fn is_security_protected(&self) -> bool {
        self.security.is_some()
    }
}
