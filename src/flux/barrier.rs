// src/flux/barrier.rs

//! Reusable fan-in completion counter.

use std::sync::{Arc, Mutex};

use tracing::trace;

type EndAction = Box<dyn FnOnce() + Send>;

struct BarrierState {
    name: String,
    counter: u64,
    action: Option<EndAction>,
}

/// Counts pending sub-operations and fires a registered end action exactly
/// once when the count reaches zero (or on [`Barrier::force`]).
///
/// The counter is armed with an internal +1 that [`Barrier::end_with`]
/// consumes, so `Barrier::new("x", n)` followed by `n` calls to `dec` plus
/// one `end_with` fires regardless of their relative order. Registering the
/// end action after completion fires it immediately; `inc`/`dec`/`force`
/// after completion are no-ops.
#[derive(Clone)]
pub struct Barrier {
    state: Arc<Mutex<BarrierState>>,
}

impl Barrier {
    pub fn new(name: impl Into<String>, counter: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(BarrierState {
                name: name.into(),
                counter: counter + 1,
                action: None,
            })),
        }
    }

    /// Add one pending operation. No-op once the barrier has completed.
    pub fn inc(&self) {
        let mut state = self.state.lock().unwrap();
        if state.counter > 0 {
            state.counter += 1;
        }
    }

    /// Signal completion of one pending operation.
    pub fn dec(&self) {
        let action = {
            let mut state = self.state.lock().unwrap();
            if state.counter == 0 {
                return;
            }
            state.counter -= 1;
            if state.counter > 0 {
                return;
            }
            trace!(barrier = %state.name, "barrier completed");
            state.action.take()
        };
        if let Some(action) = action {
            action();
        }
    }

    /// Force immediate completion (abort-on-first-error policies).
    /// Idempotent: forcing an already-completed barrier is a no-op.
    pub fn force(&self) {
        let action = {
            let mut state = self.state.lock().unwrap();
            if state.counter == 0 && state.action.is_none() {
                return;
            }
            trace!(barrier = %state.name, "barrier forced");
            state.counter = 0;
            state.action.take()
        };
        if let Some(action) = action {
            action();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().unwrap().counter > 0
    }

    /// Register the completion action, consuming the arming +1.
    ///
    /// Fires immediately if every pending operation already completed.
    pub fn end_with(&self, action: impl FnOnce() + Send + 'static) {
        let fire = {
            let mut state = self.state.lock().unwrap();
            match state.counter {
                // Already completed (e.g. forced): fire right away.
                0 => true,
                // Only the arming count is left: nothing pending.
                1 => {
                    state.counter = 0;
                    true
                }
                _ => {
                    state.counter -= 1;
                    state.action = Some(Box::new(action));
                    return;
                }
            }
        };
        if fire {
            action();
        }
    }

    /// A callback that decrements this barrier once, for handing to
    /// completion hooks.
    pub fn dec_callback(&self) -> impl FnOnce() + Send + 'static {
        let barrier = self.clone();
        move || barrier.dec()
    }
}
