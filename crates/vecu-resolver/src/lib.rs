//! vecu-resolver - Vehicle to ECU capability resolution
//!
//! Maps a vehicle selection (make, model, year, optional engine) to the
//! set of ECUs reachable in that vehicle and what each supports. The
//! resolution is a pure function of its inputs plus a static
//! [`CapabilityDatabase`]; a TOML-backed implementation with a bundled
//! development dataset is provided.

pub mod database;
pub mod resolver;

pub use database::{
    CapabilityDatabase, DatabaseError, ProfileEntry, TomlVehicleDatabase, VehicleRecord,
};
pub use resolver::{CapabilityResolver, Resolution, ResolverError};
