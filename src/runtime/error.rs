//! Error type for registry operations.

use thiserror::Error;

/// Failure installing, resetting, or calling through a mock.
///
/// Both variants signal a setup bug at the call site rather than a
/// recoverable condition; tests usually `unwrap` and let the failure abort
/// the test immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MockError {
    /// The function was never registered: its defining file was not
    /// instrumented, or the declaration was classified as unsupported.
    #[error("function is not registered for mocking")]
    NotRegistered,
    /// The replacement's parameter/result shape differs from the original's.
    #[error("replacement signature does not match the mocked function")]
    SignatureMismatch,
}
