//! Firmware programming integration tests
//!
//! Exercise the staged programming flow end to end against the mock
//! transport's simulated flash: the happy path, boundary rejections and
//! the safety gating past the erase commit point.
//!
//! Run with: cargo test -p vecu-tests --test programming_flow

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;
use vecu_core::ProgrammingStage;
use vecu_session::wire::{self, op};
use vecu_session::{
    ErrorKind, FirmwareImage, ImageFormat, MockTransport, ProgrammingOptions, ProgrammingType,
    SessionConfig, SessionError, SessionEvent, Severity, TransportError, VehicleEcuManager,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct ProgrammingFixture {
    mock: Arc<MockTransport>,
    manager: VehicleEcuManager,
}

impl ProgrammingFixture {
    fn new() -> Self {
        init_tracing();
        let mock = Arc::new(MockTransport::new());
        let mut config = SessionConfig::default();
        config.programming.security.secret = Some("a1b2c3d4".to_string());
        let manager = VehicleEcuManager::new(
            Arc::new(vecu_resolver::CapabilityResolver::builtin()),
            mock.clone(),
            config,
        )
        .expect("config is valid");
        manager
            .select_vehicle("BMW", "3 Series", 2021, Some("B48"))
            .expect("bundled dataset covers the fixture vehicle");
        Self { mock, manager }
    }

    /// Start programming and collect every event up to the terminal one.
    async fn run_to_terminal(
        &self,
        ecu_id: &str,
        image: FirmwareImage,
    ) -> (Vec<SessionEvent>, vecu_session::ProgrammingResult) {
        let mut rx = self.manager.subscribe();
        self.manager
            .program_ecu(
                ecu_id,
                image,
                ProgrammingType::FullFlash,
                ProgrammingOptions::default(),
            )
            .unwrap();
        self.collect_terminal(&mut rx).await
    }

    async fn collect_terminal(
        &self,
        rx: &mut broadcast::Receiver<SessionEvent>,
    ) -> (Vec<SessionEvent>, vecu_session::ProgrammingResult) {
        let mut seen = Vec::new();
        loop {
            let event = timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event channel closed");
            if let SessionEvent::ProgrammingFinished(result) = event {
                return (seen, result);
            }
            seen.push(event);
        }
    }
}

fn image_of(len: usize) -> FirmwareImage {
    FirmwareImage::new(ImageFormat::RawBinary, "2.4.0", vec![0x5A; len])
}

#[tokio::test]
async fn full_flash_writes_and_verifies() {
    let fixture = ProgrammingFixture::new();
    fixture.mock.set_reported_version("2.4.0");
    let image = image_of(1000);
    let expected_checksum = image.checksum;

    let (seen, result) = fixture.run_to_terminal("ECM-1", image).await;

    match &result {
        vecu_session::ProgrammingResult::Success { payload, message } => {
            assert_eq!(payload.bytes_written, 1000);
            assert_eq!(payload.blocks_written, 4);
            assert_eq!(payload.verified_checksum, expected_checksum);
            assert_eq!(payload.reported_version, "2.4.0");
            assert!(message.contains("verified"));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    // The simulated flash holds exactly the image payload.
    assert_eq!(fixture.mock.written_bytes(), vec![0x5A; 1000]);

    // Progress walked every stage in order with monotone fractions.
    let stages: Vec<ProgrammingStage> = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::ProgrammingProgress(p) => Some(p.stage),
            _ => None,
        })
        .collect();
    assert!(stages.contains(&ProgrammingStage::Validating));
    assert!(stages.contains(&ProgrammingStage::Writing));
    assert!(stages.contains(&ProgrammingStage::Verifying));
    for pair in stages.windows(2) {
        assert!(pair[1] >= pair[0], "stages regressed: {stages:?}");
    }
    let fractions: Vec<f64> = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::ProgrammingProgress(p) => Some(p.fraction),
            _ => None,
        })
        .collect();
    for pair in fractions.windows(2) {
        assert!(pair[1] >= pair[0], "fractions regressed: {fractions:?}");
    }
    assert!(fixture.manager.programming_progress().is_none());
}

#[tokio::test]
async fn locked_down_ecu_is_rejected_with_zero_progress() {
    let fixture = ProgrammingFixture::new();
    let mut rx = fixture.manager.subscribe();

    // BCM-1 declares programming but flashing is locked down.
    let err = fixture
        .manager
        .program_ecu(
            "BCM-1",
            image_of(64),
            ProgrammingType::FullFlash,
            ProgrammingOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, SessionError::ProgrammingNotSupported(_)));

    let (seen, result) = fixture.collect_terminal(&mut rx).await;
    let terminal_err = result.error().unwrap();
    assert_eq!(terminal_err.kind, ErrorKind::InvalidInput);
    assert_eq!(terminal_err.severity, Severity::Routine);

    // No progress events, no transport traffic, slot free again.
    assert!(seen.is_empty(), "unexpected events: {seen:?}");
    assert_eq!(fixture.mock.request_count(), 0);
    assert!(!fixture.manager.is_programming_running());
}

#[tokio::test]
async fn rejected_image_format_never_reaches_the_transport() {
    let fixture = ProgrammingFixture::new();
    let mut rx = fixture.manager.subscribe();

    let image = FirmwareImage::new(ImageFormat::SRecord, "2.4.0", vec![0x01; 64]);
    let err = fixture
        .manager
        .program_ecu(
            "ECM-1",
            image,
            ProgrammingType::FullFlash,
            ProgrammingOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, SessionError::UnsupportedImageFormat { .. }));

    let (seen, result) = fixture.collect_terminal(&mut rx).await;
    assert_eq!(result.error().unwrap().kind, ErrorKind::InvalidInput);
    assert!(seen.is_empty());
    assert_eq!(fixture.mock.request_count(), 0);
}

#[tokio::test]
async fn transport_failure_after_erase_is_critical() {
    let fixture = ProgrammingFixture::new();
    fixture
        .mock
        .fail_on(vec![op::WRITE_BLOCK], TransportError::Disconnected);

    let (seen, result) = fixture.run_to_terminal("ECM-1", image_of(600)).await;

    let err = result.error().unwrap();
    assert_eq!(err.kind, ErrorKind::Critical);
    assert_eq!(err.severity, Severity::Critical);
    assert!(result.is_critical());
    assert!(err.message.contains("manual recovery"));

    // The run got past the commit point before dying.
    assert!(seen.iter().any(|e| matches!(
        e,
        SessionEvent::ProgrammingProgress(p) if p.stage.is_committed()
    )));
}

#[tokio::test]
async fn verification_mismatch_is_critical() {
    let fixture = ProgrammingFixture::new();
    let mut wrong = vec![wire::ACK];
    wrong.extend_from_slice(&0x1234_5678u32.to_be_bytes());
    wrong.extend_from_slice(b"2.4.0");
    fixture.mock.script_reply(vec![op::VERIFY_READBACK], wrong);

    let (_, result) = fixture.run_to_terminal("ECM-1", image_of(600)).await;

    let err = result.error().unwrap();
    assert_eq!(err.kind, ErrorKind::Critical);
    assert_eq!(err.severity, Severity::Critical);
    assert!(err.message.contains("0x12345678"));
}

#[tokio::test]
async fn denied_security_access_is_routine() {
    let fixture = ProgrammingFixture::new();
    fixture.mock.script_reply(
        vec![op::SECURITY_SEED],
        vec![wire::NAK, wire::reject::SECURITY_DENIED],
    );

    let (_, result) = fixture.run_to_terminal("ECM-1", image_of(600)).await;

    let err = result.error().unwrap();
    assert_eq!(err.kind, ErrorKind::InvalidInput);
    assert_eq!(err.severity, Severity::Routine);

    // Pre-commit failure: the erase request never went out.
    assert!(!fixture
        .mock
        .sent_requests()
        .iter()
        .any(|(_, frame)| frame.first() == Some(&op::ERASE_REGION)));
}
