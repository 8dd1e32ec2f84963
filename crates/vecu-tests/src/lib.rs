//! Integration tests for the vecu workspace
//!
//! This crate exercises the full orchestration stack through its public
//! API: capability resolution, the vehicle ECU manager, both executors
//! and the mock transport.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p vecu-tests
//! ```
//!
//! Set `RUST_LOG=vecu_session=debug` to see the session tracing output.
//!
//! # Test Structure
//!
//! - `session_lifecycle.rs` - selection, capability reads, a full test run
//! - `operation_guards.rs` - same-kind exclusion, cross-kind concurrency
//! - `programming_flow.rs` - firmware programming outcomes and safety gating
//! - `cleanup_behaviour.rs` - cancellation, idempotence, session recovery

// This crate only contains tests, no library code
