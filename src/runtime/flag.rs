//! Per-function guard flags.
//!
//! The engine synthesizes one [`Flag`] static per instrumented declaration.
//! Instrumented code reads it on entry to every call, so the cost of the
//! unmocked path is exactly one atomic load.

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide switch marking a mock as active for one function.
///
/// Read (acquire) by instrumented code on every invocation; written
/// (release) by the registry when a mock is installed, reset, or
/// temporarily suppressed for call-through.
#[derive(Debug)]
pub struct Flag {
    active: AtomicBool,
}

impl Flag {
    /// An inactive flag. `const` so generated statics can initialize it.
    pub const fn new() -> Self {
        Flag {
            active: AtomicBool::new(false),
        }
    }

    /// Hot-path check emitted as the first statement of instrumented bodies.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn activate(&self) {
        self.active.store(true, Ordering::Release);
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Deactivate an active flag until the returned guard drops.
    ///
    /// Call-through runs the original with redirection switched off and the
    /// mock becomes visible again afterwards, unwind included. Nested
    /// suppression of the same flag is last-writer-wins.
    pub(crate) fn suppress(&self) -> Suppressed<'_> {
        let was_active = self.is_active();
        if was_active {
            self.deactivate();
        }
        Suppressed {
            flag: self,
            was_active,
        }
    }
}

impl Default for Flag {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores the flag it was taken from when dropped.
pub(crate) struct Suppressed<'a> {
    flag: &'a Flag,
    was_active: bool,
}

impl Drop for Suppressed<'_> {
    fn drop(&mut self) {
        if self.was_active {
            self.flag.activate();
        }
    }
}
