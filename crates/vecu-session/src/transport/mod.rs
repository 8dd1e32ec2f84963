//! Transport layer for vehicle communication
//!
//! Executors speak to ECUs through the [`TransportChannel`] trait: one
//! request, one response, opaque bytes. The in-tree [`MockTransport`]
//! simulates a small vehicle for tests and development; a production
//! channel (CAN, DoIP) plugs in behind the same trait.

mod adapter;
pub mod error;
pub mod mock;

pub use adapter::TransportChannel;
pub use error::TransportError;
pub use mock::{HoldGate, MockTransport};
