//! softmock: run-time function mocking via source instrumentation.
//!
//! Two halves, consumed at different times:
//!
//! - the **instrumentation engine** ([`rewrite`]) is a build-time
//!   source-to-source pass that rewrites every safely instrumentable
//!   function so its body can be redirected: a per-function guard flag, a
//!   redirect check as the first statement, and a registration hook per
//!   file;
//! - the **function registry** ([`runtime`]) is the run-time table tracking,
//!   per function, whether a redirect is active and what to call instead.
//!
//! [`sync`] mirrors whole source trees through the engine, and the CLI
//! (`softmock rewrite`, `softmock sync`) drives both.
//!
//! The stable test-facing surface is [`mock`], [`call_original`], [`reset`]
//! and [`reset_all`]; everything else (identity computation, flag encoding,
//! `register`, `mock_for`) exists for generated code.

pub mod rewrite;
pub mod runtime;
pub mod sync;

pub use runtime::{call_original, mock, reset, reset_all, MockError};
