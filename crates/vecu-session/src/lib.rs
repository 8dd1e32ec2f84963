//! vecu-session - Vehicle session orchestration
//!
//! This crate runs a vehicle session end to end: select a vehicle, run
//! diagnostic tests against its ECUs, flash firmware, and observe
//! everything through a broadcast event stream.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   VehicleEcuManager                         │
//! │  admission flags, capability snapshot, event fan-out        │
//! │                                                             │
//! │  ┌──────────────────┐        ┌───────────────────────────┐  │
//! │  │CapabilityResolver│        │ TestExecutor              │  │
//! │  │ (vecu-resolver)  │        │ ProgrammingExecutor       │  │
//! │  └──────────────────┘        └─────────────┬─────────────┘  │
//! │                                            │                │
//! │                                  ┌─────────┴─────────┐      │
//! │                                  │ TransportChannel  │      │
//! │                                  │ (mock / vehicle)  │      │
//! │                                  └───────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod manager;
pub mod transport;
pub mod wire;

pub use config::{ProgrammingConfig, SecurityConfig, SessionConfig};
pub use error::{OperationKind, SessionError, SessionResult};
pub use executor::{ProgrammingExecutor, TestExecutor};
pub use manager::{VehicleEcuManager, VehicleSnapshot};
pub use transport::{MockTransport, TransportChannel, TransportError};

// Re-export for convenience
pub use vecu_core::{
    EcuCapability, EcuTest, ErrorKind, ExecutionError, FirmwareImage, ImageFormat, ParamValue,
    ProgrammingOptions, ProgrammingProgress, ProgrammingResult, ProgrammingStage, ProgrammingType,
    SessionEvent, Severity, TestParameters, TestProgress, TestResult, VehicleDiagnosticSummary,
    VehicleProfile,
};
