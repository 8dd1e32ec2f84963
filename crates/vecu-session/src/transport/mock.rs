//! Mock transport channel for tests and development
//!
//! Behaves like a small, well-behaved vehicle: routine steps acknowledge,
//! security seeds are handed out, and written firmware blocks are
//! accumulated so the verification readback returns their real checksum.
//! Tests bend the behaviour with scripted replies, injected failures and
//! hold gates, all matched by request prefix.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::debug;
use vecu_core::payload_checksum;

use super::{TransportChannel, TransportError};
use crate::wire::{self, op};

/// Seed handed out by the default security-seed reply.
const DEFAULT_SEED: [u8; 4] = [0x11, 0x22, 0x33, 0x44];

/// Gate a held request parks on until a test releases it.
pub struct HoldGate {
    notify: Notify,
    released: AtomicBool,
}

impl HoldGate {
    fn new() -> Self {
        Self {
            notify: Notify::new(),
            released: AtomicBool::new(false),
        }
    }

    /// Let every held and future matching request proceed.
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn wait(&self) {
        loop {
            if self.released.load(Ordering::SeqCst) {
                return;
            }
            let notified = self.notify.notified();
            if self.released.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

/// Mock transport channel.
pub struct MockTransport {
    latency: Duration,
    connected: AtomicBool,
    /// Scripted replies (request prefix -> raw reply); exact match wins
    /// over prefix match
    responses: RwLock<Vec<(Vec<u8>, Vec<u8>)>>,
    /// Injected failures (request prefix -> error)
    failures: RwLock<Vec<(Vec<u8>, TransportError)>>,
    /// Hold gates (request prefix -> gate)
    holds: RwLock<Vec<(Vec<u8>, Arc<HoldGate>)>>,
    /// Every request sent, in order
    sent: Mutex<Vec<(String, Vec<u8>)>>,
    /// Simulated flash memory, cleared on erase
    written: Mutex<Vec<u8>>,
    /// Version string the verification readback reports
    reported_version: RwLock<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            connected: AtomicBool::new(true),
            responses: RwLock::new(Vec::new()),
            failures: RwLock::new(Vec::new()),
            holds: RwLock::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            written: Mutex::new(Vec::new()),
            reported_version: RwLock::new("1.0.0".to_string()),
        }
    }

    /// Mock with a per-request artificial latency.
    pub fn with_latency(latency: Duration) -> Self {
        let mut mock = Self::new();
        mock.latency = latency;
        mock
    }

    /// Script a raw reply for requests starting with `prefix`.
    pub fn script_reply(&self, prefix: Vec<u8>, reply: Vec<u8>) {
        self.responses.write().push((prefix, reply));
    }

    /// Fail requests starting with `prefix` with the given error.
    pub fn fail_on(&self, prefix: Vec<u8>, error: TransportError) {
        self.failures.write().push((prefix, error));
    }

    /// Park requests starting with `prefix` until the returned gate is
    /// released.
    pub fn hold_on(&self, prefix: Vec<u8>) -> Arc<HoldGate> {
        let gate = Arc::new(HoldGate::new());
        self.holds.write().push((prefix, gate.clone()));
        gate
    }

    /// Set the link state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Version the verification readback reports.
    pub fn set_reported_version(&self, version: &str) {
        *self.reported_version.write() = version.to_string();
    }

    /// Every request sent so far, as `(ecu_id, frame)` pairs.
    pub fn sent_requests(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Bytes accumulated in the simulated flash since the last erase.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    fn find_scripted(&self, request: &[u8]) -> Option<Vec<u8>> {
        let responses = self.responses.read();
        // Exact match first
        for (req, reply) in responses.iter() {
            if req == request {
                return Some(reply.clone());
            }
        }
        // Then prefix match for variable-length requests
        for (req, reply) in responses.iter() {
            if request.starts_with(req) {
                return Some(reply.clone());
            }
        }
        None
    }

    fn find_failure(&self, request: &[u8]) -> Option<TransportError> {
        self.failures
            .read()
            .iter()
            .find(|(prefix, _)| request.starts_with(prefix))
            .map(|(_, err)| err.clone())
    }

    fn find_hold(&self, request: &[u8]) -> Option<Arc<HoldGate>> {
        self.holds
            .read()
            .iter()
            .find(|(prefix, _)| request.starts_with(prefix))
            .map(|(_, gate)| gate.clone())
    }

    /// Simulated ECU behaviour when nothing is scripted.
    fn default_reply(&self, request: &[u8]) -> Vec<u8> {
        match request.first() {
            Some(&op::SECURITY_SEED) => {
                let mut reply = vec![wire::ACK];
                reply.extend_from_slice(&DEFAULT_SEED);
                reply
            }
            Some(&op::ERASE_REGION) => {
                self.written.lock().clear();
                vec![wire::ACK]
            }
            Some(&op::REQUEST_DOWNLOAD) => vec![wire::ACK, 0x02, 0x00],
            Some(&op::WRITE_BLOCK) => {
                let chunk = request.get(2..).unwrap_or(&[]);
                self.written.lock().extend_from_slice(chunk);
                vec![wire::ACK]
            }
            Some(&op::VERIFY_READBACK) => {
                let checksum = payload_checksum(&self.written.lock());
                let mut reply = vec![wire::ACK];
                reply.extend_from_slice(&checksum.to_be_bytes());
                reply.extend_from_slice(self.reported_version.read().as_bytes());
                reply
            }
            _ => vec![wire::ACK],
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportChannel for MockTransport {
    async fn send(
        &self,
        ecu_id: &str,
        request: &[u8],
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }

        if self.latency > Duration::ZERO {
            tokio::time::sleep(self.latency).await;
        }

        self.sent.lock().push((ecu_id.to_string(), request.to_vec()));

        if let Some(gate) = self.find_hold(request) {
            debug!(ecu_id, "Mock transport holding request");
            gate.wait().await;
        }

        if let Some(err) = self.find_failure(request) {
            return Err(err);
        }

        if let Some(reply) = self.find_scripted(request) {
            return Ok(reply);
        }

        Ok(self.default_reply(request))
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
