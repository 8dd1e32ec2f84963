//! Session configuration
//!
//! Tuning knobs for a vehicle session: transport timeout and the firmware
//! programming settings (block size fallback, security access secret).
//! Everything has a sensible default so `SessionConfig::default()` works
//! against the mock transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a vehicle session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Per-request transport timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Firmware programming settings
    #[serde(default)]
    pub programming: ProgrammingConfig,
}

impl SessionConfig {
    /// Parse from a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Per-request transport timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            programming: ProgrammingConfig::default(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    5000
}

/// Firmware programming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgrammingConfig {
    /// Write block size used when neither the ECU capability nor the
    /// download negotiation constrains it further
    #[serde(default = "default_block_size")]
    pub block_size: u16,
    /// Security access settings
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for ProgrammingConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            security: SecurityConfig::default(),
        }
    }
}

fn default_block_size() -> u16 {
    256
}

/// Security access (seed/key) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Access level requested when the ECU capability does not declare one
    #[serde(default = "default_security_level")]
    pub level: u8,
    /// Hex-encoded supplier secret for key derivation; unlock-protected
    /// ECUs cannot be flashed without it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            level: default_security_level(),
            secret: None,
        }
    }
}

fn default_security_level() -> u8 {
    1
}
