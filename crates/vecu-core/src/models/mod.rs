//! Shared data models for vehicle ECU management

mod ecu;
mod firmware;
mod params;
mod progress;
mod result;
mod summary;
mod vehicle;

pub use ecu::*;
pub use firmware::*;
pub use params::*;
pub use progress::*;
pub use result::*;
pub use summary::*;
pub use vehicle::*;
