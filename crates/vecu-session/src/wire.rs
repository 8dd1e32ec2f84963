//! Request/response framing
//!
//! The byte-level diagnostic protocol is the transport's concern; this
//! module only fixes the minimal frames executors and the mock agree on.
//! Every reply starts with a status byte: [`ACK`] followed by a payload,
//! or [`NAK`] followed by a reject code.

use vecu_core::Measurement;

use crate::transport::TransportError;

/// Positive reply status byte.
pub const ACK: u8 = 0x50;
/// Negative reply status byte.
pub const NAK: u8 = 0x7F;

/// Request opcodes.
pub mod op {
    /// Run one step of a diagnostic routine
    pub const ROUTINE_STEP: u8 = 0x31;
    /// Request a security seed
    pub const SECURITY_SEED: u8 = 0x27;
    /// Send a derived security key
    pub const SECURITY_KEY: u8 = 0x28;
    /// Erase a firmware region
    pub const ERASE_REGION: u8 = 0x44;
    /// Negotiate the download window
    pub const REQUEST_DOWNLOAD: u8 = 0x34;
    /// Write one firmware block
    pub const WRITE_BLOCK: u8 = 0x36;
    /// Read back checksum and version after writing
    pub const VERIFY_READBACK: u8 = 0x37;
}

/// Reject codes carried by [`NAK`] replies.
pub mod reject {
    pub const GENERAL: u8 = 0x10;
    pub const BUSY: u8 = 0x21;
    pub const OUT_OF_RANGE: u8 = 0x31;
    pub const SECURITY_DENIED: u8 = 0x33;
}

// ============================================================================
// Request builders
// ============================================================================

/// One step of a diagnostic routine: opcode, routine number, step index,
/// encoded parameters.
pub fn routine_step(routine: u16, step: u8, params: &[u8]) -> Vec<u8> {
    let mut req = Vec::with_capacity(4 + params.len());
    req.push(op::ROUTINE_STEP);
    req.extend_from_slice(&routine.to_be_bytes());
    req.push(step);
    req.extend_from_slice(params);
    req
}

pub fn security_seed(level: u8) -> Vec<u8> {
    vec![op::SECURITY_SEED, level]
}

pub fn security_key(level: u8, key: &[u8]) -> Vec<u8> {
    let mut req = Vec::with_capacity(2 + key.len());
    req.push(op::SECURITY_KEY);
    req.push(level);
    req.extend_from_slice(key);
    req
}

/// Erase a firmware region. `flags` carries the programming options.
pub fn erase_region(region: u8, flags: u8, size: u32) -> Vec<u8> {
    let mut req = vec![op::ERASE_REGION, region, flags];
    req.extend_from_slice(&size.to_be_bytes());
    req
}

pub fn request_download(region: u8, size: u32) -> Vec<u8> {
    let mut req = vec![op::REQUEST_DOWNLOAD, region];
    req.extend_from_slice(&size.to_be_bytes());
    req
}

/// Write one block. The counter wraps 1..=255, skipping zero.
pub fn write_block(counter: u8, chunk: &[u8]) -> Vec<u8> {
    let mut req = Vec::with_capacity(2 + chunk.len());
    req.push(op::WRITE_BLOCK);
    req.push(counter);
    req.extend_from_slice(chunk);
    req
}

pub fn verify_readback(region: u8) -> Vec<u8> {
    vec![op::VERIFY_READBACK, region]
}

// ============================================================================
// Reply parsing
// ============================================================================

/// A raw reply split into its two legal forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Positive reply with payload (possibly empty)
    Ack(Vec<u8>),
    /// Negative reply with reject code
    Reject(u8),
}

/// Parse a raw reply frame.
pub fn parse_reply(raw: &[u8]) -> Result<Reply, TransportError> {
    match raw.first() {
        Some(&ACK) => Ok(Reply::Ack(raw[1..].to_vec())),
        Some(&NAK) => {
            let code = raw
                .get(1)
                .copied()
                .ok_or_else(|| TransportError::Malformed("reject frame without code".to_string()))?;
            Ok(Reply::Reject(code))
        }
        Some(other) => Err(TransportError::Malformed(format!(
            "unknown status byte {other:#04x}"
        ))),
        None => Err(TransportError::Malformed("empty response".to_string())),
    }
}

/// Download-window reply payload: maximum block size, big-endian u16.
pub fn parse_download_window(payload: &[u8]) -> Result<u16, TransportError> {
    if payload.len() < 2 {
        return Err(TransportError::Malformed(
            "download window reply too short".to_string(),
        ));
    }
    Ok(u16::from_be_bytes([payload[0], payload[1]]))
}

/// Verification readback payload: CRC-32 (big-endian) then a UTF-8
/// version string.
pub fn parse_verify_readback(payload: &[u8]) -> Result<(u32, String), TransportError> {
    if payload.len() < 4 {
        return Err(TransportError::Malformed(
            "verification readback too short".to_string(),
        ));
    }
    let checksum = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let version = std::str::from_utf8(&payload[4..])
        .map_err(|_| TransportError::Malformed("readback version is not UTF-8".to_string()))?
        .trim_end_matches('\0')
        .to_string();
    Ok((checksum, version))
}

/// Measurements payload: repeated `[name_len][name][f64 be]` entries.
pub fn parse_measurements(payload: &[u8]) -> Result<Vec<Measurement>, TransportError> {
    let mut readings = Vec::new();
    let mut rest = payload;
    while !rest.is_empty() {
        let name_len = rest[0] as usize;
        if rest.len() < 1 + name_len + 8 {
            return Err(TransportError::Malformed(
                "truncated measurement entry".to_string(),
            ));
        }
        let name = std::str::from_utf8(&rest[1..1 + name_len])
            .map_err(|_| TransportError::Malformed("measurement name is not UTF-8".to_string()))?
            .to_string();
        let mut value_bytes = [0u8; 8];
        value_bytes.copy_from_slice(&rest[1 + name_len..1 + name_len + 8]);
        readings.push(Measurement {
            name,
            value: f64::from_be_bytes(value_bytes),
            unit: None,
        });
        rest = &rest[1 + name_len + 8..];
    }
    Ok(readings)
}

/// Encode measurements into a reply payload. Used by the mock.
pub fn encode_measurements(readings: &[(&str, f64)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in readings {
        out.push(name.len().min(u8::MAX as usize) as u8);
        out.extend_from_slice(&name.as_bytes()[..name.len().min(u8::MAX as usize)]);
        out.extend_from_slice(&value.to_be_bytes());
    }
    out
}

/// Report payload: plain UTF-8 text.
pub fn parse_report(payload: &[u8]) -> Result<String, TransportError> {
    Ok(std::str::from_utf8(payload)
        .map_err(|_| TransportError::Malformed("report text is not UTF-8".to_string()))?
        .to_string())
}

/// Human-readable description of a reject code.
pub fn describe_reject(code: u8) -> &'static str {
    match code {
        reject::GENERAL => "general reject",
        reject::BUSY => "ECU busy",
        reject::OUT_OF_RANGE => "request out of range",
        reject::SECURITY_DENIED => "security access denied",
        _ => "request rejected",
    }
}
