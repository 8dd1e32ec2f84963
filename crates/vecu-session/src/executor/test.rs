//! Diagnostic test executor
//!
//! Runs one test against one ECU, step by step: `Idle -> Running ->
//! {Completed | Failed}`. Each acknowledged step advances the progress
//! fraction by an equal share; the final step's payload becomes the
//! result payload in the shape the test declares.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use vecu_core::{
    EcuTest, ErrorKind, ExecutionError, ResultShape, TestParameters, TestPayload, TestProgress,
    TestResult,
};

use crate::transport::{TransportChannel, TransportError};
use crate::wire::{self, Reply};

/// Executes diagnostic tests over a transport channel.
pub struct TestExecutor {
    transport: Arc<dyn TransportChannel>,
    timeout: Duration,
}

impl TestExecutor {
    pub fn new(transport: Arc<dyn TransportChannel>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Run the test to its terminal result, reporting progress after each
    /// acknowledged step.
    ///
    /// The terminal result is returned, never reported through `progress`.
    pub async fn execute<F>(
        &self,
        ecu_id: &str,
        test: &EcuTest,
        parameters: &TestParameters,
        progress: F,
    ) -> TestResult
    where
        F: Fn(TestProgress) + Send + Sync,
    {
        let params = parameters.encode(&test.parameters);
        let total_steps = test.steps.len();
        let mut final_payload = Vec::new();

        for (index, step) in test.steps.iter().enumerate() {
            debug!(ecu_id, test_id = %test.id, step = %step.label, "Executing test step");
            let request = wire::routine_step(test.routine, index as u8, &params);

            let raw = match self.transport.send(ecu_id, &request, self.timeout).await {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(ecu_id, test_id = %test.id, error = %err, "Test transport failure");
                    return TestResult::Error(ExecutionError::new(
                        ErrorKind::Transient,
                        format!("{} failed at step '{}': {}", test.name, step.label, err),
                    ));
                }
            };

            match wire::parse_reply(&raw) {
                Ok(Reply::Ack(payload)) => final_payload = payload,
                Ok(Reply::Reject(code)) => {
                    warn!(ecu_id, test_id = %test.id, code, "Test step rejected by ECU");
                    return TestResult::Error(ExecutionError::new(
                        ErrorKind::Transient,
                        format!(
                            "{} rejected at step '{}': {}",
                            test.name,
                            step.label,
                            wire::describe_reject(code)
                        ),
                    ));
                }
                Err(err) => {
                    return TestResult::Error(ExecutionError::new(
                        ErrorKind::Transient,
                        format!("{} failed at step '{}': {}", test.name, step.label, err),
                    ));
                }
            }

            progress(TestProgress {
                ecu_id: ecu_id.to_string(),
                test_id: test.id.clone(),
                fraction: (index + 1) as f64 / total_steps as f64,
                step: step.label.clone(),
            });
        }

        match decode_payload(test.result_shape, &final_payload) {
            Ok(payload) => {
                info!(ecu_id, test_id = %test.id, "Test completed");
                TestResult::Success {
                    payload,
                    message: format!("{} completed", test.name),
                }
            }
            Err(err) => TestResult::Error(ExecutionError::new(
                ErrorKind::Transient,
                format!("{} returned an unreadable result: {}", test.name, err),
            )),
        }
    }
}

fn decode_payload(shape: ResultShape, raw: &[u8]) -> Result<TestPayload, TransportError> {
    match shape {
        ResultShape::Ack => Ok(TestPayload::Ack),
        ResultShape::Measurements => {
            wire::parse_measurements(raw).map(|readings| TestPayload::Measurements { readings })
        }
        ResultShape::Report => wire::parse_report(raw).map(|text| TestPayload::Report { text }),
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use vecu_core::{ResultShape, TestStep};

    use super::*;
    use crate::transport::MockTransport;

    fn oil_reset() -> EcuTest {
        EcuTest {
            id: "OIL_RESET".to_string(),
            name: "Oil Service Reset".to_string(),
            description: None,
            routine: 0x0201,
            parameters: Vec::new(),
            result_shape: ResultShape::Ack,
            steps: vec![
                TestStep {
                    label: "Reading service state".to_string(),
                },
                TestStep {
                    label: "Resetting counters".to_string(),
                },
            ],
        }
    }

    fn executor(mock: &Arc<MockTransport>) -> TestExecutor {
        TestExecutor::new(mock.clone(), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn happy_path_reports_each_step() {
        let mock = Arc::new(MockTransport::new());
        let seen = Mutex::new(Vec::new());

        let result = executor(&mock)
            .execute("ECM-1", &oil_reset(), &TestParameters::empty(), |p| {
                seen.lock().push(p)
            })
            .await;

        assert!(result.is_success());
        let seen = seen.into_inner();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].fraction, 0.5);
        assert_eq!(seen[0].step, "Reading service state");
        assert_eq!(seen[1].fraction, 1.0);
        // One routine-step request went out per step.
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn ecu_reject_fails_transient() {
        let mock = Arc::new(MockTransport::new());
        mock.script_reply(
            vec![wire::op::ROUTINE_STEP, 0x02, 0x01],
            vec![wire::NAK, wire::reject::BUSY],
        );

        let result = executor(&mock)
            .execute("ECM-1", &oil_reset(), &TestParameters::empty(), |_| {})
            .await;

        let err = result.error().unwrap();
        assert_eq!(err.kind, ErrorKind::Transient);
        assert!(err.message.contains("ECU busy"));
    }

    #[tokio::test]
    async fn transport_timeout_fails_transient_at_failing_step() {
        let mock = Arc::new(MockTransport::new());
        // First step answers, second step times out.
        mock.script_reply(
            vec![wire::op::ROUTINE_STEP, 0x02, 0x01, 0x00],
            vec![wire::ACK],
        );
        mock.fail_on(
            vec![wire::op::ROUTINE_STEP, 0x02, 0x01, 0x01],
            TransportError::Timeout,
        );
        let seen = Mutex::new(Vec::new());

        let result = executor(&mock)
            .execute("ECM-1", &oil_reset(), &TestParameters::empty(), |p| {
                seen.lock().push(p)
            })
            .await;

        let err = result.error().unwrap();
        assert_eq!(err.kind, ErrorKind::Transient);
        assert!(err.message.contains("Resetting counters"));
        // Progress stopped after the acknowledged first step.
        assert_eq!(seen.into_inner().len(), 1);
    }

    #[tokio::test]
    async fn measurements_shape_decodes_final_payload() {
        let mock = Arc::new(MockTransport::new());
        let mut test = oil_reset();
        test.result_shape = ResultShape::Measurements;

        let mut reply = vec![wire::ACK];
        reply.extend(wire::encode_measurements(&[("stft_b1", 2.5)]));
        // Final step (index 1) returns the readings.
        mock.script_reply(vec![wire::op::ROUTINE_STEP, 0x02, 0x01, 0x01], reply);

        let result = executor(&mock)
            .execute("ECM-1", &test, &TestParameters::empty(), |_| {})
            .await;

        match result {
            TestResult::Success {
                payload: TestPayload::Measurements { readings },
                ..
            } => {
                assert_eq!(readings.len(), 1);
                assert_eq!(readings[0].name, "stft_b1");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_reply_fails_transient() {
        let mock = Arc::new(MockTransport::new());
        mock.script_reply(vec![wire::op::ROUTINE_STEP], vec![0x99]);

        let result = executor(&mock)
            .execute("ECM-1", &oil_reset(), &TestParameters::empty(), |_| {})
            .await;

        assert_eq!(result.error().unwrap().kind, ErrorKind::Transient);
    }
}
