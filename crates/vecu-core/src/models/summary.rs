//! Derived per-vehicle aggregate

use serde::{Deserialize, Serialize};

use super::ecu::EcuCapability;

/// Read-only aggregate over a resolved capability set.
///
/// Recomputed whenever the set is replaced, never mutated in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDiagnosticSummary {
    /// ECUs resolved for the vehicle
    pub ecu_count: usize,
    /// Diagnostic tests across all ECUs
    pub total_tests: usize,
    /// ECUs whose capability allows flashing
    pub programmable_ecus: usize,
    /// ECUs declaring a security-access requirement
    pub security_protected_ecus: usize,
}

impl VehicleDiagnosticSummary {
    pub fn from_ecus(ecus: &[EcuCapability]) -> Self {
        Self {
            ecu_count: ecus.len(),
            total_tests: ecus.iter().map(|e| e.tests.len()).sum(),
            programmable_ecus: ecus.iter().filter(|e| e.is_programmable()).count(),
            security_protected_ecus: ecus.iter().filter(|e| e.is_security_protected()).count(),
        }
    }
}
