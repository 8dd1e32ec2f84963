//! Vehicle ECU manager
//!
//! Single owner of mutable session state. The manager resolves and holds
//! the selected vehicle's capability set, admits at most one diagnostic
//! test and one programming operation at a time, spawns executors as
//! tokio tasks and fans their progress and terminal results out over a
//! broadcast channel. Observers that miss events can always poll the
//! current snapshots instead.
//!
//! Admission is checked before validation: a busy manager answers
//! `OperationInProgress` regardless of the target. An admitted invocation
//! always ends in exactly one terminal result event, even when it fails
//! validation without spawning, and even when it races `cleanup()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vecu_core::{
    EcuCapability, EcuTest, ErrorKind, ExecutionError, FirmwareImage, ProgrammingCapability,
    ProgrammingOptions, ProgrammingProgress, ProgrammingResult, ProgrammingType, SessionEvent,
    TestParameters, TestProgress, TestResult, VehicleDiagnosticSummary, VehicleProfile,
};
use vecu_resolver::{CapabilityResolver, Resolution};

use crate::config::SessionConfig;
use crate::error::{OperationKind, SessionError, SessionResult};
use crate::executor::{ProgrammingExecutor, TestExecutor};
use crate::transport::TransportChannel;

/// Broadcast capacity; a slow subscriber lags instead of blocking.
const EVENT_CAPACITY: usize = 256;

/// Immutable snapshot of the selected vehicle and its capability set.
///
/// Replaced wholesale on re-selection; readers holding an old `Arc` keep
/// a consistent view.
#[derive(Debug, Clone)]
pub struct VehicleSnapshot {
    pub profile: Arc<VehicleProfile>,
    pub ecus: Vec<EcuCapability>,
    pub summary: VehicleDiagnosticSummary,
    /// Brands the backing database covers, for selection pickers
    pub supported_brands: Vec<String>,
    /// When this capability set was resolved
    pub resolved_at: DateTime<Utc>,
}

impl VehicleSnapshot {
    pub fn ecu(&self, ecu_id: &str) -> Option<&EcuCapability> {
        self.ecus.iter().find(|e| e.id == ecu_id)
    }
}

/// State shared between the manager and its spawned executor tasks.
struct Shared {
    events: broadcast::Sender<SessionEvent>,
    test_in_flight: AtomicBool,
    programming_in_flight: AtomicBool,
    test_progress: RwLock<Option<TestProgress>>,
    programming_progress: RwLock<Option<ProgrammingProgress>>,
}

impl Shared {
    fn publish(&self, event: SessionEvent) {
        // Err only means no live subscribers; snapshots stay pollable.
        let _ = self.events.send(event);
    }

    /// Store and publish a test progress update.
    ///
    /// The fraction is clamped to [0, 1] and never drops below the last
    /// stored value. Nothing is published once `finished` is set; the
    /// progress slot lock serialises this against the terminal event.
    fn publish_test_progress(&self, finished: &AtomicBool, mut progress: TestProgress) {
        let mut slot = self.test_progress.write();
        if finished.load(Ordering::SeqCst) {
            return;
        }
        progress.fraction =
            clamp_monotone(progress.fraction, slot.as_ref().map(|p| p.fraction));
        *slot = Some(progress.clone());
        self.publish(SessionEvent::TestProgress(progress));
    }

    fn publish_programming_progress(
        &self,
        finished: &AtomicBool,
        mut progress: ProgrammingProgress,
    ) {
        let mut slot = self.programming_progress.write();
        if finished.load(Ordering::SeqCst) {
            return;
        }
        progress.fraction =
            clamp_monotone(progress.fraction, slot.as_ref().map(|p| p.fraction));
        *slot = Some(progress.clone());
        self.publish(SessionEvent::ProgrammingProgress(progress));
    }

    /// Publish the terminal test result exactly once per invocation.
    ///
    /// Whoever flips `finished` first wins; the loser returns without
    /// publishing. The in-flight flag is released only after the terminal
    /// event is out.
    fn finish_test(&self, finished: &AtomicBool, result: TestResult) {
        let mut slot = self.test_progress.write();
        if finished.swap(true, Ordering::SeqCst) {
            return;
        }
        *slot = None;
        self.publish(SessionEvent::TestFinished(result));
        drop(slot);
        self.test_in_flight.store(false, Ordering::SeqCst);
    }

    fn finish_programming(&self, finished: &AtomicBool, result: ProgrammingResult) {
        let mut slot = self.programming_progress.write();
        if finished.swap(true, Ordering::SeqCst) {
            return;
        }
        *slot = None;
        self.publish(SessionEvent::ProgrammingFinished(result));
        drop(slot);
        self.programming_in_flight.store(false, Ordering::SeqCst);
    }
}

fn clamp_monotone(fraction: f64, last: Option<f64>) -> f64 {
    let clamped = fraction.clamp(0.0, 1.0);
    match last {
        Some(last) if clamped < last => last,
        _ => clamped,
    }
}

/// Handle to one spawned invocation, kept for cancellation.
struct ActiveOperation {
    invocation_id: Uuid,
    finished: Arc<AtomicBool>,
    abort: AbortHandle,
}

/// Orchestrates one vehicle session.
pub struct VehicleEcuManager {
    resolver: Arc<CapabilityResolver>,
    transport: Arc<dyn TransportChannel>,
    test_executor: Arc<TestExecutor>,
    programming_executor: Arc<ProgrammingExecutor>,
    shared: Arc<Shared>,
    vehicle: RwLock<Option<Arc<VehicleSnapshot>>>,
    active_test: RwLock<Option<ActiveOperation>>,
    active_programming: RwLock<Option<ActiveOperation>>,
}

impl VehicleEcuManager {
    /// Build a manager over a resolver and a transport channel.
    ///
    /// Fails with `InvalidConfig` when the configured security secret is
    /// not valid non-empty hex.
    pub fn new(
        resolver: Arc<CapabilityResolver>,
        transport: Arc<dyn TransportChannel>,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        let secret = match config.programming.security.secret.as_deref() {
            Some(text) => {
                let decoded = hex::decode(text).map_err(|err| {
                    SessionError::InvalidConfig(format!(
                        "security secret is not valid hex: {err}"
                    ))
                })?;
                if decoded.is_empty() {
                    return Err(SessionError::InvalidConfig(
                        "security secret is empty".to_string(),
                    ));
                }
                Some(decoded)
            }
            None => None,
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            resolver,
            test_executor: Arc::new(TestExecutor::new(
                transport.clone(),
                config.request_timeout(),
            )),
            programming_executor: Arc::new(ProgrammingExecutor::new(
                transport.clone(),
                &config,
                secret,
            )),
            transport,
            shared: Arc::new(Shared {
                events,
                test_in_flight: AtomicBool::new(false),
                programming_in_flight: AtomicBool::new(false),
                test_progress: RwLock::new(None),
                programming_progress: RwLock::new(None),
            }),
            vehicle: RwLock::new(None),
            active_test: RwLock::new(None),
            active_programming: RwLock::new(None),
        })
    }

    // =========================================================================
    // Vehicle selection
    // =========================================================================

    /// Resolve and select a vehicle, replacing any previous selection.
    ///
    /// On `VehicleNotFound` the previous selection is untouched.
    pub fn select_vehicle(
        &self,
        make: &str,
        model: &str,
        year: u16,
        engine: Option<&str>,
    ) -> SessionResult<Arc<VehicleSnapshot>> {
        let resolution = self.resolver.resolve(make, model, year, engine)?;
        Ok(self.install_resolution(&resolution))
    }

    /// Re-resolve the selected vehicle, bypassing the resolver cache.
    ///
    /// After a critical programming outcome this observes current data
    /// instead of the cached entry.
    pub fn refresh(&self) -> SessionResult<Arc<VehicleSnapshot>> {
        let current = self.snapshot()?;
        let profile = &current.profile;
        let resolution = self.resolver.resolve_uncached(
            &profile.make,
            &profile.model,
            profile.year,
            profile.engine.as_deref(),
        )?;
        Ok(self.install_resolution(&resolution))
    }

    fn install_resolution(&self, resolution: &Resolution) -> Arc<VehicleSnapshot> {
        let summary = VehicleDiagnosticSummary::from_ecus(&resolution.ecus);
        let snapshot = Arc::new(VehicleSnapshot {
            profile: Arc::new(resolution.profile.clone()),
            ecus: resolution.ecus.clone(),
            summary,
            supported_brands: resolution.supported_brands.clone(),
            resolved_at: Utc::now(),
        });
        *self.vehicle.write() = Some(snapshot.clone());

        info!(
            make = %snapshot.profile.make,
            model = %snapshot.profile.model,
            year = snapshot.profile.year,
            ecus = summary.ecu_count,
            "Vehicle selected"
        );
        self.shared.publish(SessionEvent::VehicleSelected {
            profile: snapshot.profile.clone(),
            summary,
        });
        snapshot
    }

    // =========================================================================
    // Diagnostic tests
    // =========================================================================

    /// Start a diagnostic test. Returns the invocation id; the outcome
    /// arrives as events and through the progress snapshot.
    ///
    /// Admission is first: when a test is already in flight this returns
    /// `OperationInProgress` without looking at the target. An admitted
    /// invocation that fails validation publishes its terminal error
    /// event (zero progress events) before the error is returned.
    pub fn execute_ecu_test(
        &self,
        ecu_id: &str,
        test_id: &str,
        parameters: TestParameters,
    ) -> SessionResult<Uuid> {
        if self
            .shared
            .test_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::OperationInProgress(OperationKind::Test));
        }

        let invocation_id = Uuid::new_v4();
        match self.validate_test(ecu_id, test_id, &parameters) {
            Ok(test) => {
                self.spawn_test(invocation_id, ecu_id.to_string(), test, parameters);
                Ok(invocation_id)
            }
            Err(err) => {
                warn!(ecu_id, test_id, error = %err, "Test invocation rejected");
                self.shared.publish(SessionEvent::TestFinished(TestResult::Error(
                    ExecutionError::new(err.kind(), err.to_string()),
                )));
                self.shared.test_in_flight.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    fn validate_test(
        &self,
        ecu_id: &str,
        test_id: &str,
        parameters: &TestParameters,
    ) -> SessionResult<EcuTest> {
        let snapshot = self.snapshot()?;
        let ecu = snapshot
            .ecu(ecu_id)
            .ok_or_else(|| SessionError::UnknownEcu(ecu_id.to_string()))?;
        let test = ecu.test(test_id).ok_or_else(|| SessionError::UnknownTest {
            ecu_id: ecu_id.to_string(),
            test_id: test_id.to_string(),
        })?;
        parameters
            .validate(&test.parameters)
            .map_err(|source| SessionError::InvalidParameters {
                test_id: test_id.to_string(),
                source,
            })?;
        Ok(test.clone())
    }

    fn spawn_test(
        &self,
        invocation_id: Uuid,
        ecu_id: String,
        test: EcuTest,
        parameters: TestParameters,
    ) {
        let shared = self.shared.clone();
        let executor = self.test_executor.clone();
        let finished = Arc::new(AtomicBool::new(false));

        info!(%invocation_id, ecu_id, test_id = %test.id, "Test started");

        // The slot lock is held from before the starting snapshot until
        // the abort handle is stored, so cleanup() either sees nothing
        // yet or a fully cancellable operation.
        let mut slot = self.active_test.write();
        shared.publish_test_progress(&finished, TestProgress::starting(&ecu_id, &test.id));

        let task_shared = shared.clone();
        let task_finished = finished.clone();
        let handle = tokio::spawn(async move {
            let progress_shared = task_shared.clone();
            let progress_finished = task_finished.clone();
            let result = executor
                .execute(&ecu_id, &test, &parameters, move |p| {
                    progress_shared.publish_test_progress(&progress_finished, p)
                })
                .await;
            task_shared.finish_test(&task_finished, result);
        });
        *slot = Some(ActiveOperation {
            invocation_id,
            finished,
            abort: handle.abort_handle(),
        });
    }

    // =========================================================================
    // Firmware programming
    // =========================================================================

    /// Start a programming operation. Returns the invocation id; the
    /// outcome arrives as events and through the progress snapshot.
    ///
    /// Same admission pattern as [`Self::execute_ecu_test`], on the
    /// independent programming flag. Image integrity is checked by the
    /// executor's validating stage, not here.
    pub fn program_ecu(
        &self,
        ecu_id: &str,
        image: FirmwareImage,
        programming_type: ProgrammingType,
        options: ProgrammingOptions,
    ) -> SessionResult<Uuid> {
        if self
            .shared
            .programming_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::OperationInProgress(OperationKind::Programming));
        }

        let invocation_id = Uuid::new_v4();
        match self.validate_programming(ecu_id, &image) {
            Ok((ecu, capability)) => {
                self.spawn_programming(invocation_id, ecu, capability, image, programming_type, options);
                Ok(invocation_id)
            }
            Err(err) => {
                warn!(ecu_id, error = %err, "Programming invocation rejected");
                self.shared
                    .publish(SessionEvent::ProgrammingFinished(ProgrammingResult::Error(
                        ExecutionError::new(err.kind(), err.to_string()),
                    )));
                self.shared
                    .programming_in_flight
                    .store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    fn validate_programming(
        &self,
        ecu_id: &str,
        image: &FirmwareImage,
    ) -> SessionResult<(EcuCapability, ProgrammingCapability)> {
        let snapshot = self.snapshot()?;
        let ecu = snapshot
            .ecu(ecu_id)
            .ok_or_else(|| SessionError::UnknownEcu(ecu_id.to_string()))?;
        let capability = ecu
            .programming
            .as_ref()
            .filter(|p| p.flash_supported)
            .ok_or_else(|| SessionError::ProgrammingNotSupported(ecu_id.to_string()))?;
        if !capability.accepts(image.format) {
            return Err(SessionError::UnsupportedImageFormat {
                ecu_id: ecu_id.to_string(),
                format: image.format,
            });
        }
        Ok((ecu.clone(), capability.clone()))
    }

    fn spawn_programming(
        &self,
        invocation_id: Uuid,
        ecu: EcuCapability,
        capability: ProgrammingCapability,
        image: FirmwareImage,
        programming_type: ProgrammingType,
        options: ProgrammingOptions,
    ) {
        let shared = self.shared.clone();
        let executor = self.programming_executor.clone();
        let finished = Arc::new(AtomicBool::new(false));

        info!(
            %invocation_id,
            ecu_id = %ecu.id,
            kind = programming_type.label(),
            bytes = image.size(),
            "Programming started"
        );

        let mut slot = self.active_programming.write();
        shared.publish_programming_progress(&finished, ProgrammingProgress::starting(&ecu.id));

        let task_shared = shared.clone();
        let task_finished = finished.clone();
        let handle = tokio::spawn(async move {
            let progress_shared = task_shared.clone();
            let progress_finished = task_finished.clone();
            let result = executor
                .program(&ecu, &capability, &image, programming_type, options, move |p| {
                    progress_shared.publish_programming_progress(&progress_finished, p)
                })
                .await;
            task_shared.finish_programming(&task_finished, result);
        });
        *slot = Some(ActiveOperation {
            invocation_id,
            finished,
            abort: handle.abort_handle(),
        });
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// The selected vehicle snapshot, if any.
    pub fn vehicle(&self) -> Option<Arc<VehicleSnapshot>> {
        self.vehicle.read().clone()
    }

    /// The resolved capability set; empty when nothing is selected.
    pub fn capabilities(&self) -> Vec<EcuCapability> {
        self.vehicle()
            .map(|s| s.ecus.clone())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> Option<VehicleDiagnosticSummary> {
        self.vehicle().map(|s| s.summary)
    }

    pub fn ecu_by_id(&self, ecu_id: &str) -> Option<EcuCapability> {
        self.vehicle()?.ecu(ecu_id).cloned()
    }

    pub fn tests_for_ecu(&self, ecu_id: &str) -> Option<Vec<EcuTest>> {
        Some(self.ecu_by_id(ecu_id)?.tests)
    }

    pub fn programming_capability_for_ecu(&self, ecu_id: &str) -> Option<ProgrammingCapability> {
        self.ecu_by_id(ecu_id)?.programming
    }

    /// Progress of the running test, while one is in flight.
    pub fn test_progress(&self) -> Option<TestProgress> {
        self.shared.test_progress.read().clone()
    }

    /// Progress of the running programming operation, while one is in
    /// flight.
    pub fn programming_progress(&self) -> Option<ProgrammingProgress> {
        self.shared.programming_progress.read().clone()
    }

    pub fn is_test_running(&self) -> bool {
        self.shared.test_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_programming_running(&self) -> bool {
        self.shared.programming_in_flight.load(Ordering::SeqCst)
    }

    /// Subscribe to session events from this point on; earlier events
    /// are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Session events as a `Stream`.
    pub fn event_stream(&self) -> BroadcastStream<SessionEvent> {
        BroadcastStream::new(self.subscribe())
    }

    pub async fn transport_connected(&self) -> bool {
        self.transport.is_connected().await
    }

    fn snapshot(&self) -> SessionResult<Arc<VehicleSnapshot>> {
        self.vehicle().ok_or(SessionError::NoVehicleSelected)
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Cancel everything in flight and release the session.
    ///
    /// The only cancellation entry point. Idempotent: each call cancels
    /// whatever is running, publishes exactly one `Cancelled` terminal
    /// result per in-flight invocation, clears the progress snapshots and
    /// in-flight flags and closes the transport. A repeat call with
    /// nothing in flight emits nothing.
    ///
    /// The manager stays usable: new operations are admitted afterwards
    /// and fail `Transient` from their first send while the link is down.
    pub async fn cleanup(&self) {
        info!("Session cleanup");
        self.cancel_active_test();
        self.cancel_active_programming();
        self.transport.close().await;
    }

    fn cancel_active_test(&self) {
        let Some(active) = self.active_test.write().take() else {
            return;
        };
        active.abort.abort();
        debug!(invocation_id = %active.invocation_id, "Test invocation cancelled");
        self.shared.finish_test(
            &active.finished,
            TestResult::Error(ExecutionError::new(
                ErrorKind::Cancelled,
                "Test cancelled by session cleanup",
            )),
        );
    }

    fn cancel_active_programming(&self) {
        let Some(active) = self.active_programming.write().take() else {
            return;
        };
        active.abort.abort();

        // Past the erase request the ECU state is uncertain; the terminal
        // result must say so.
        let committed = self
            .shared
            .programming_progress
            .read()
            .as_ref()
            .is_some_and(|p| p.stage.is_committed());
        let error = if committed {
            ExecutionError::critical(
                ErrorKind::Cancelled,
                "Programming cancelled after erase began. \
                 The ECU may be left non-bootable; manual recovery may be required",
            )
        } else {
            ExecutionError::new(
                ErrorKind::Cancelled,
                "Programming cancelled by session cleanup",
            )
        };
        debug!(
            invocation_id = %active.invocation_id,
            committed,
            "Programming invocation cancelled"
        );
        self.shared
            .finish_programming(&active.finished, ProgrammingResult::Error(error));
    }
}

impl Drop for VehicleEcuManager {
    fn drop(&mut self) {
        if let Some(active) = self.active_test.get_mut().take() {
            active.abort.abort();
        }
        if let Some(active) = self.active_programming.get_mut().take() {
            active.abort.abort();
        }
    }
}
