//! Firmware image model
//!
//! An image carries its own CRC-32 so the programming executor can check
//! payload integrity before touching the ECU and compare against the
//! ECU's readback after writing.

use bytes::Bytes;
use crc::{Crc, CRC_32_ISO_HDLC};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ecu::ImageFormat;

/// CRC implementation used for firmware checksums.
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Checksum over an arbitrary payload, with the same CRC the images use.
///
/// Transport simulators use this to answer verification readbacks.
pub fn payload_checksum(payload: &[u8]) -> u32 {
    CRC32.checksum(payload)
}

/// A firmware image staged for programming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    /// Container format
    pub format: ImageFormat,
    /// Version string the ECU should report after flashing
    pub version: String,
    /// Raw payload
    pub payload: Bytes,
    /// CRC-32 of the payload
    pub checksum: u32,
}

impl FirmwareImage {
    /// Build an image, computing the payload checksum.
    pub fn new(format: ImageFormat, version: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let checksum = payload_checksum(&payload);
        Self {
            format,
            version: version.into(),
            payload,
            checksum,
        }
    }

    /// Recompute the checksum over the current payload.
    pub fn compute_checksum(&self) -> u32 {
        payload_checksum(&self.payload)
    }

    /// Integrity check: non-empty payload whose checksum matches the
    /// stored one.
    pub fn verify(&self) -> Result<(), FirmwareImageError> {
        if self.payload.is_empty() {
            return Err(FirmwareImageError::EmptyPayload);
        }
        let computed = self.compute_checksum();
        if computed != self.checksum {
            return Err(FirmwareImageError::ChecksumMismatch {
                expected: self.checksum,
                got: computed,
            });
        }
        Ok(())
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Firmware image integrity failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FirmwareImageError {
    #[error("firmware payload is empty")]
    EmptyPayload,

    #[error("checksum mismatch: stored {expected:#010x}, computed {got:#010x}")]
    ChecksumMismatch { expected: u32, got: u32 },
}

/// Kind of programming operation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgrammingType {
    /// Replace the full application image
    FullFlash,
    /// Update the calibration region only
    Calibration,
}

impl ProgrammingType {
    /// Region selector byte used in erase and download framing.
    pub fn region(self) -> u8 {
        match self {
            ProgrammingType::FullFlash => 0x01,
            ProgrammingType::Calibration => 0x02,
        }
    }

    /// Human-readable name for messages.
    pub fn label(self) -> &'static str {
        match self {
            ProgrammingType::FullFlash => "full flash",
            ProgrammingType::Calibration => "calibration update",
        }
    }
}

/// Caller-selectable programming options.
///
/// Encoded into the erase request as a flags byte so the ECU sees them
/// before anything irreversible happens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgrammingOptions {
    /// Keep learned adaptation values across the flash
    #[serde(default)]
    pub preserve_adaptations: bool,
    /// Skip the pre-erase backup readout on the ECU side
    #[serde(default)]
    pub skip_backup: bool,
}

impl ProgrammingOptions {
    /// Flags byte for the erase request.
    pub fn flags(self) -> u8 {
        let mut flags = 0u8;
        if self.preserve_adaptations {
            flags |= 0x01;
        }
        if self.skip_backup {
            flags |= 0x02;
        }
        flags
    }
}
