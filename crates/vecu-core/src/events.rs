//! Session events fanned out to observers
//!
//! Delivery is broadcast-style: a late subscriber only sees events
//! emitted after it attached. Current state stays pollable from the
//! manager, so missing an event never strands an observer.

use std::sync::Arc;

use crate::models::{
    ProgrammingProgress, ProgrammingResult, TestProgress, TestResult, VehicleDiagnosticSummary,
    VehicleProfile,
};

/// One event published by the vehicle ECU manager.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A vehicle was selected or re-resolved and its capability set replaced.
    VehicleSelected {
        profile: Arc<VehicleProfile>,
        summary: VehicleDiagnosticSummary,
    },
    /// A running test advanced.
    TestProgress(TestProgress),
    /// A test invocation reached its terminal result.
    TestFinished(TestResult),
    /// A running programming operation advanced.
    ProgrammingProgress(ProgrammingProgress),
    /// A programming invocation reached its terminal result.
    ProgrammingFinished(ProgrammingResult),
}

impl SessionEvent {
    /// Whether this event terminates an invocation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::TestFinished(_) | SessionEvent::ProgrammingFinished(_)
        )
    }
}
