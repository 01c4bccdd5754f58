//! Process-wide mock registry.
//!
//! The sole run-time source of truth for "is function F currently
//! redirected, and to what". Generated bootstrap code registers every
//! instrumented declaration here; instrumented bodies consult [`mock_for`]
//! when their guard flag is active; test code installs and clears
//! replacements through [`mock`], [`reset`] and [`reset_all`].
//!
//! Lock discipline: the guard flag read is the only thing on the hot path
//! and never takes a lock. All table operations share one global mutex with
//! O(1) critical sections that never run user code.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::mem;
use std::sync::{LazyLock, Mutex, MutexGuard, Once, PoisonError};

use linkme::distributed_slice;

use super::error::MockError;
use super::flag::Flag;

/// A bootstrap registration hook, one per instrumented file.
pub type RegisterFn = fn();

/// Every instrumented file contributes one element. The slice is drained
/// exactly once, before the registry serves its first public operation, so
/// registration can never race a test's first `mock`.
#[distributed_slice]
pub static REGISTRATIONS: [RegisterFn] = [..];

/// A type-erased callable. Always holds a `Copy` fn pointer.
type Callable = Box<dyn Any + Send + Sync>;

struct Entry {
    flag: &'static Flag,
    signature: TypeId,
    original: Callable,
    replacement: Option<Callable>,
}

static REGISTRY: LazyLock<Mutex<HashMap<usize, Entry>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn table() -> MutexGuard<'static, HashMap<usize, Entry>> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run the bootstrap hooks exactly once.
///
/// Invoked from every public operation. [`register`] must not call this: it
/// runs inside the hooks themselves.
fn ensure_registered() {
    static BOOTSTRAP: Once = Once::new();
    BOOTSTRAP.call_once(|| {
        for hook in &*REGISTRATIONS {
            hook();
        }
    });
}

/// Entry-point address of a callable, used as its registry key.
///
/// The instrumentation always supplies a concrete fn pointer at the cast
/// site, so the value is pointer-sized. Two casts of the same function
/// agree; distinct functions differ unless the linker merged identical
/// bodies, a known limitation of address-based identity.
fn callable_addr<F>(f: F) -> usize
where
    F: Copy + Send + Sync + 'static,
{
    assert_eq!(
        mem::size_of::<F>(),
        mem::size_of::<usize>(),
        "mockable callables must be fn pointers"
    );
    // Used only as a map key, never dereferenced.
    unsafe { mem::transmute_copy(&f) }
}

/// Record `f` as mockable, guarded by `flag`.
///
/// Called from generated bootstrap hooks, once per instrumented
/// declaration. Re-registering with the same flag is harmless.
pub fn register<F>(f: F, flag: &'static Flag)
where
    F: Copy + Send + Sync + 'static,
{
    let key = callable_addr(f);
    table().insert(
        key,
        Entry {
            flag,
            signature: TypeId::of::<F>(),
            original: Box::new(f),
            replacement: None,
        },
    );
}

/// Install `replacement` for `original`.
///
/// Every caller of `original`, on any thread, observes the replacement as
/// soon as this returns, until [`reset`] or [`reset_all`].
pub fn mock<F, G>(original: F, replacement: G) -> Result<(), MockError>
where
    F: Copy + Send + Sync + 'static,
    G: Copy + Send + Sync + 'static,
{
    ensure_registered();
    let mut entries = table();
    let entry = entries
        .get_mut(&callable_addr(original))
        .ok_or(MockError::NotRegistered)?;
    // For fn pointers TypeId equality is structural: same parameter and
    // result types, names irrelevant.
    if TypeId::of::<G>() != entry.signature {
        return Err(MockError::SignatureMismatch);
    }
    // Flag and replacement are published under the same lock `mock_for`
    // takes, so a dispatcher can never observe the flag active and then
    // find no replacement.
    entry.flag.activate();
    entry.replacement = Some(Box::new(replacement));
    Ok(())
}

/// The currently installed replacement for `f`, if any.
///
/// Consulted by instrumented code after its guard flag reads active; shares
/// the table lock with [`mock`] and [`reset`], so the read is never torn.
pub fn mock_for<F>(f: F) -> Option<F>
where
    F: Copy + Send + Sync + 'static,
{
    ensure_registered();
    let entries = table();
    let entry = entries.get(&callable_addr(f))?;
    entry.replacement.as_ref()?.downcast_ref::<F>().copied()
}

/// Invoke the original implementation of `f` with redirection suppressed.
///
/// `invoke` receives the registered original and its return value is passed
/// through, so a replacement can delegate without recursing into itself.
/// The guard flag is restored afterwards, unwind included, and other
/// callers keep seeing the mock throughout. Recursive call-through on the
/// same function is last-writer-wins on the flag and is not reentrant-safe.
pub fn call_original<F, R>(f: F, invoke: impl FnOnce(F) -> R) -> Result<R, MockError>
where
    F: Copy + Send + Sync + 'static,
{
    ensure_registered();
    let (flag, original) = {
        let entries = table();
        let entry = entries
            .get(&callable_addr(f))
            .ok_or(MockError::NotRegistered)?;
        let original = entry
            .original
            .downcast_ref::<F>()
            .copied()
            .ok_or(MockError::SignatureMismatch)?;
        (entry.flag, original)
    };
    // Lock released above: user code never runs under the table lock.
    let _suppressed = flag.suppress();
    Ok(invoke(original))
}

/// Clear the mock for `f` and deactivate its guard flag.
pub fn reset<F>(f: F) -> Result<(), MockError>
where
    F: Copy + Send + Sync + 'static,
{
    ensure_registered();
    let mut entries = table();
    let entry = entries
        .get_mut(&callable_addr(f))
        .ok_or(MockError::NotRegistered)?;
    entry.flag.deactivate();
    entry.replacement = None;
    Ok(())
}

/// Clear every installed mock at once.
pub fn reset_all() {
    ensure_registered();
    for entry in table().values_mut() {
        entry.flag.deactivate();
        entry.replacement = None;
    }
}
