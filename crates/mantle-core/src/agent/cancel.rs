//! Cooperative cancellation primitives.
//!
//! Nothing here preempts anything: `AbortHandle` and `RunFlags` are
//! shared flags that long-running paths poll at their next safe
//! checkpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Session-wide abort signal.
///
/// Sticky once set; cleared explicitly with `reset` when a new run
/// starts. Cheap to clone, all clones share state.
#[derive(Clone, Default)]
pub struct AbortHandle {
    inner: Arc<AbortInner>,
}

#[derive(Default)]
struct AbortInner {
    set: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the abort flag. The first reason wins.
    pub fn set(&self, reason: impl Into<String>) {
        let mut guard = self.inner.reason.lock();
        if guard.is_none() {
            *guard = Some(reason.into());
        }
        self.inner.set.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().clone()
    }

    pub fn reset(&self) {
        self.inner.set.store(false, Ordering::SeqCst);
        *self.inner.reason.lock() = None;
    }
}

/// Phase-scoped run control flags, shared across hooks and the loop.
///
/// A phase is a named span of the run; hook directives can complete the
/// active phase or abort the whole run. A completion naming a phase
/// other than the active one is ignored.
#[derive(Clone, Default)]
pub struct RunFlags {
    inner: Arc<RunFlagsInner>,
}

#[derive(Default)]
struct RunFlagsInner {
    active_phase: Mutex<Option<String>>,
    phase_complete: AtomicBool,
    run_abort: AtomicBool,
}

impl RunFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a new phase, clearing any stale completion flag.
    pub fn begin_phase(&self, name: impl Into<String>) {
        *self.inner.active_phase.lock() = Some(name.into());
        self.inner.phase_complete.store(false, Ordering::SeqCst);
    }

    pub fn active_phase(&self) -> Option<String> {
        self.inner.active_phase.lock().clone()
    }

    /// Mark the active phase complete. With a scope, the mark only
    /// applies when the scope names the phase that is actually active.
    /// Returns whether the flag was set.
    pub fn complete_phase(&self, scope: Option<&str>) -> bool {
        if let Some(scope) = scope {
            let active = self.inner.active_phase.lock();
            if active.as_deref() != Some(scope) {
                return false;
            }
        }
        self.inner.phase_complete.store(true, Ordering::SeqCst);
        true
    }

    pub fn phase_complete(&self) -> bool {
        self.inner.phase_complete.load(Ordering::SeqCst)
    }

    pub fn abort_run(&self) {
        self.inner.run_abort.store(true, Ordering::SeqCst);
    }

    pub fn run_aborted(&self) -> bool {
        self.inner.run_abort.load(Ordering::SeqCst)
    }

    /// Reset everything for a fresh run.
    pub fn clear(&self) {
        *self.inner.active_phase.lock() = None;
        self.inner.phase_complete.store(false, Ordering::SeqCst);
        self.inner.run_abort.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_is_sticky_and_first_reason_wins() {
        let handle = AbortHandle::new();
        assert!(!handle.is_set());

        handle.set("keyboard");
        handle.set("second");
        assert!(handle.is_set());
        assert_eq!(handle.reason().as_deref(), Some("keyboard"));

        handle.reset();
        assert!(!handle.is_set());
        assert_eq!(handle.reason(), None);
    }

    #[test]
    fn clones_share_state() {
        let a = AbortHandle::new();
        let b = a.clone();
        b.set("from clone");
        assert!(a.is_set());
    }

    #[test]
    fn scoped_completion_ignores_mismatched_phase() {
        let flags = RunFlags::new();
        flags.begin_phase("bar");

        assert!(!flags.complete_phase(Some("foo")));
        assert!(!flags.phase_complete());

        assert!(flags.complete_phase(Some("bar")));
        assert!(flags.phase_complete());
    }

    #[test]
    fn unscoped_completion_applies_to_any_phase() {
        let flags = RunFlags::new();
        flags.begin_phase("anything");
        assert!(flags.complete_phase(None));
        assert!(flags.phase_complete());
    }

    #[test]
    fn begin_phase_clears_stale_completion() {
        let flags = RunFlags::new();
        flags.begin_phase("one");
        flags.complete_phase(None);
        flags.begin_phase("two");
        assert!(!flags.phase_complete());
        assert_eq!(flags.active_phase().as_deref(), Some("two"));
    }
}
