//! Run-time function registry.
//!
//! Key concepts:
//! - `Flag`: the per-function atomic switch read on every invocation
//! - `REGISTRATIONS`: bootstrap hooks contributed by instrumented files
//! - `mock` / `call_original` / `reset` / `reset_all`: the test-facing API
//!
//! The registry has no dependency on the instrumentation engine; the engine
//! only needs to know the call shapes it must emit (`register`, `mock_for`,
//! `Flag`).

mod error;
mod flag;
mod registry;

pub use error::MockError;
pub use flag::Flag;
pub use registry::{
    call_original, mock, mock_for, register, reset, reset_all, RegisterFn, REGISTRATIONS,
};
