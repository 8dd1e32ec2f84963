//! vecu-core - Core models, events and error taxonomy for vECU management
//!
//! This crate provides the shared vocabulary of the workspace: vehicle and
//! ECU capability descriptors, typed test parameters, firmware images,
//! progress/result models and the session event enum. It contains no I/O;
//! resolution lives in `vecu-resolver` and execution in `vecu-session`.

pub mod error;
pub mod events;
pub mod models;

pub use error::{ErrorKind, ExecutionError, Severity};
pub use events::SessionEvent;
pub use models::*;
