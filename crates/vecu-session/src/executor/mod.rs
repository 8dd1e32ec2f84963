//! Operation executors
//!
//! An executor owns one invocation from first request to terminal result.
//! It never validates identity or capability; the manager does that at
//! the boundary before anything is spawned. Progress goes out through a
//! callback, the terminal result is the return value.

mod programming;
mod test;

pub use programming::ProgrammingExecutor;
pub use test::TestExecutor;
