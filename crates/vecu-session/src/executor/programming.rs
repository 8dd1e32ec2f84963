//! Firmware programming executor
//!
//! Runs one flash strictly staged: `Validating -> (SecurityUnlock) ->
//! Erasing -> Writing -> Verifying`. The commit point is the erase
//! request: from the moment it goes out, every failure is reported as
//! critical because the ECU can no longer be assumed bootable. Before
//! that point failures are routine and the ECU is untouched.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use vecu_core::{
    EcuCapability, ErrorKind, ExecutionError, FirmwareImage, ProgrammingCapability,
    ProgrammingOptions, ProgrammingPayload, ProgrammingProgress, ProgrammingResult,
    ProgrammingStage, ProgrammingType,
};

use crate::config::SessionConfig;
use crate::transport::TransportChannel;
use crate::wire::{self, Reply};

/// Executes firmware programming over a transport channel.
pub struct ProgrammingExecutor {
    transport: Arc<dyn TransportChannel>,
    timeout: Duration,
    fallback_block_size: u16,
    default_security_level: u8,
    secret: Option<Vec<u8>>,
}

impl ProgrammingExecutor {
    /// `secret` is the decoded security-access secret; the manager
    /// validates the hex encoding before construction.
    pub fn new(
        transport: Arc<dyn TransportChannel>,
        config: &SessionConfig,
        secret: Option<Vec<u8>>,
    ) -> Self {
        Self {
            transport,
            timeout: config.request_timeout(),
            fallback_block_size: config.programming.block_size,
            default_security_level: config.programming.security.level,
            secret,
        }
    }

    /// Run the programming operation to its terminal result, reporting
    /// progress at every stage transition and written block.
    pub async fn program<F>(
        &self,
        ecu: &EcuCapability,
        capability: &ProgrammingCapability,
        image: &FirmwareImage,
        programming_type: ProgrammingType,
        options: ProgrammingOptions,
        progress: F,
    ) -> ProgrammingResult
    where
        F: Fn(ProgrammingProgress) + Send + Sync,
    {
        let ecu_id = ecu.id.as_str();
        let region = programming_type.region();

        let report = |stage: ProgrammingStage, fraction: f64, step: String, written: u32, total: u32| {
            progress(ProgrammingProgress {
                ecu_id: ecu_id.to_string(),
                stage,
                fraction,
                step,
                blocks_written: written,
                blocks_total: total,
            });
        };

        // Stage 1: validate the image before touching the ECU
        report(
            ProgrammingStage::Validating,
            0.0,
            format!("Validating {} image", image.format),
            0,
            0,
        );
        if let Err(err) = image.verify() {
            return ProgrammingResult::Error(ExecutionError::new(
                ErrorKind::InvalidInput,
                format!("Firmware image rejected: {err}"),
            ));
        }

        // Stage 2: security unlock, when the capability demands one
        if capability.requires_unlock {
            report(
                ProgrammingStage::SecurityUnlock,
                ProgrammingStage::SecurityUnlock.base_fraction(),
                "Requesting security access".to_string(),
                0,
                0,
            );
            let level = ecu
                .security
                .map(|s| s.level)
                .unwrap_or(self.default_security_level);
            if let Err(err) = self.unlock(ecu_id, level).await {
                return ProgrammingResult::Error(err);
            }
        }

        // Stage 3: erase. Commit point: once the erase request goes out,
        // the old image is gone for all we know.
        report(
            ProgrammingStage::Erasing,
            ProgrammingStage::Erasing.base_fraction(),
            format!("Erasing {} region", programming_type.label()),
            0,
            0,
        );
        let erase = wire::erase_region(region, options.flags(), image.size() as u32);
        if let Err(err) = self.send_committed(ecu_id, &erase, "Erase").await {
            return ProgrammingResult::Error(err);
        }

        // Stage 4: negotiate the download window, then stream blocks
        report(
            ProgrammingStage::Writing,
            ProgrammingStage::Writing.base_fraction(),
            "Negotiating download window".to_string(),
            0,
            0,
        );
        let download = wire::request_download(region, image.size() as u32);
        let window = match self.send_committed(ecu_id, &download, "Download request").await {
            Ok(payload) => match wire::parse_download_window(&payload) {
                Ok(window) => window,
                Err(err) => {
                    return ProgrammingResult::Error(critical_failure("Download request", err))
                }
            },
            Err(err) => return ProgrammingResult::Error(err),
        };

        let block_size = self.effective_block_size(capability, window);
        if block_size == 0 {
            return ProgrammingResult::Error(critical_failure(
                "Download request",
                "ECU offered a zero-byte window",
            ));
        }

        let total_blocks = ((image.size() + block_size - 1) / block_size) as u32;
        let mut counter: u8 = 1;
        let mut bytes_written: u64 = 0;

        for (index, chunk) in image.payload.chunks(block_size).enumerate() {
            let request = wire::write_block(counter, chunk);
            let context = format!("Write of block {}/{}", index + 1, total_blocks);
            if let Err(err) = self.send_committed(ecu_id, &request, &context).await {
                return ProgrammingResult::Error(err);
            }

            bytes_written += chunk.len() as u64;
            counter = counter.wrapping_add(1);
            if counter == 0 {
                // Block counters skip zero when they wrap.
                counter = 1;
            }

            let written = (index + 1) as u32;
            report(
                ProgrammingStage::Writing,
                0.25 + 0.65 * (bytes_written as f64 / image.size() as f64),
                format!("Writing block {written}/{total_blocks}"),
                written,
                total_blocks,
            );
        }

        // Stage 5: read back checksum and version
        report(
            ProgrammingStage::Verifying,
            ProgrammingStage::Verifying.base_fraction(),
            "Reading back checksum".to_string(),
            total_blocks,
            total_blocks,
        );
        let readback = match self
            .send_committed(ecu_id, &wire::verify_readback(region), "Verification readback")
            .await
        {
            Ok(payload) => payload,
            Err(err) => return ProgrammingResult::Error(err),
        };
        let (reported_checksum, reported_version) = match wire::parse_verify_readback(&readback) {
            Ok(parsed) => parsed,
            Err(err) => {
                return ProgrammingResult::Error(critical_failure("Verification readback", err))
            }
        };

        if reported_checksum != image.checksum {
            warn!(
                ecu_id,
                expected = format_args!("{:#010x}", image.checksum),
                reported = format_args!("{:#010x}", reported_checksum),
                "Verification checksum mismatch"
            );
            return ProgrammingResult::Error(critical_failure(
                "Verification",
                format!(
                    "expected checksum {:#010x}, ECU reported {:#010x}",
                    image.checksum, reported_checksum
                ),
            ));
        }

        report(
            ProgrammingStage::Verifying,
            0.98,
            "Verification passed".to_string(),
            total_blocks,
            total_blocks,
        );
        info!(
            ecu_id,
            bytes = bytes_written,
            blocks = total_blocks,
            version = %reported_version,
            "Programming completed"
        );
        ProgrammingResult::Success {
            payload: ProgrammingPayload {
                bytes_written,
                blocks_written: total_blocks,
                verified_checksum: reported_checksum,
                reported_version,
            },
            message: format!(
                "Completed {} on {}: {} bytes written and verified",
                programming_type.label(),
                ecu.name,
                bytes_written
            ),
        }
    }

    /// Seed/key security access exchange.
    ///
    /// Runs before the commit point, so failures are routine: a denied
    /// unlock leaves the ECU exactly as it was.
    async fn unlock(&self, ecu_id: &str, level: u8) -> Result<(), ExecutionError> {
        let secret = match self.secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                return Err(ExecutionError::new(
                    ErrorKind::InvalidInput,
                    "Security unlock required but no security secret is configured",
                ))
            }
        };

        let seed = match self.send_routine(ecu_id, &wire::security_seed(level)).await? {
            Reply::Ack(seed) => seed,
            Reply::Reject(code) => {
                return Err(ExecutionError::new(
                    ErrorKind::InvalidInput,
                    format!("Security access denied: {}", wire::describe_reject(code)),
                ))
            }
        };

        // An all-zero seed means the ECU is already unlocked.
        if seed.iter().all(|&b| b == 0) {
            debug!(ecu_id, level, "Security access already granted");
            return Ok(());
        }

        let key: Vec<u8> = seed
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ secret[i % secret.len()])
            .collect();
        match self
            .send_routine(ecu_id, &wire::security_key(level, &key))
            .await?
        {
            Reply::Ack(_) => {
                debug!(ecu_id, level, "Security access granted");
                Ok(())
            }
            Reply::Reject(code) => Err(ExecutionError::new(
                ErrorKind::InvalidInput,
                format!("Security access denied: {}", wire::describe_reject(code)),
            )),
        }
    }

    /// One pre-commit exchange; transport and parse failures are transient.
    async fn send_routine(&self, ecu_id: &str, request: &[u8]) -> Result<Reply, ExecutionError> {
        let raw = self
            .transport
            .send(ecu_id, request, self.timeout)
            .await
            .map_err(|err| {
                ExecutionError::new(ErrorKind::Transient, format!("Security exchange failed: {err}"))
            })?;
        wire::parse_reply(&raw).map_err(|err| {
            ExecutionError::new(ErrorKind::Transient, format!("Security exchange failed: {err}"))
        })
    }

    /// One exchange past the commit point; every failure is critical,
    /// including an ECU reject.
    async fn send_committed(
        &self,
        ecu_id: &str,
        request: &[u8],
        context: &str,
    ) -> Result<Vec<u8>, ExecutionError> {
        let raw = self
            .transport
            .send(ecu_id, request, self.timeout)
            .await
            .map_err(|err| critical_failure(context, err))?;
        match wire::parse_reply(&raw) {
            Ok(Reply::Ack(payload)) => Ok(payload),
            Ok(Reply::Reject(code)) => Err(critical_failure(context, wire::describe_reject(code))),
            Err(err) => Err(critical_failure(context, err)),
        }
    }

    /// The smallest of the negotiated window, the capability bound and
    /// the configured block size.
    fn effective_block_size(&self, capability: &ProgrammingCapability, window: u16) -> usize {
        let mut size = window.min(self.fallback_block_size);
        if let Some(max) = capability.max_block_size {
            size = size.min(max);
        }
        size as usize
    }
}

fn critical_failure(context: &str, cause: impl fmt::Display) -> ExecutionError {
    ExecutionError::critical(
        ErrorKind::Critical,
        format!(
            "{context} failed: {cause}. The ECU may be left non-bootable; manual recovery may be required"
        ),
    )
}
