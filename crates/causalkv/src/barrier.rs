//! Drain-on-close usage tracking for owners whose callbacks outlive a call
//! stack.
//!
//! An owner holds a [`LifetimeBarrier`] and hands [`BarrierRef`]s to its
//! asynchronous callbacks. A callback briefly acquires a [`UseGuard`] before
//! touching the owner; once the owner starts closing, acquisition fails and
//! the callback drops itself on the floor. `close` blocks until every
//! outstanding guard has been released, so after it returns no callback can
//! be running or about to run.
//!
//! The count lives under a mutex with a condition variable rather than a
//! bare atomic: close must both forbid new acquisitions and wait for the
//! drain in one step.

use std::sync::{Arc, Condvar, Mutex};

struct State {
    uses: u32,
    closed: bool,
}

struct Shared {
    state: Mutex<State>,
    drained: Condvar,
}

/// Owner side of the barrier. Dropping it closes it (blocking) if the owner
/// has not already done so.
pub struct LifetimeBarrier {
    shared: Arc<Shared>,
    closed: bool,
}

/// A handle issued by the owner; cheap to clone and send across tasks.
#[derive(Clone)]
pub struct BarrierRef {
    shared: Arc<Shared>,
}

/// Proof of a live owner. The use count stays elevated until this drops.
pub struct UseGuard {
    shared: Arc<Shared>,
}

impl LifetimeBarrier {
    /// Creates an open barrier with no outstanding uses.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State { uses: 0, closed: false }),
                drained: Condvar::new(),
            }),
            closed: false,
        }
    }

    /// Issues a reference for a callback to probe liveness with.
    pub fn issue(&self) -> BarrierRef {
        BarrierRef { shared: Arc::clone(&self.shared) }
    }

    /// Marks the barrier closed and blocks the caller until every
    /// outstanding [`UseGuard`] has been released. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.shared.state.lock().unwrap();
        state.closed = true;
        while state.uses > 0 {
            state = self.shared.drained.wait(state).unwrap();
        }
    }

    /// Whether `close` has completed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Default for LifetimeBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LifetimeBarrier {
    fn drop(&mut self) {
        self.close();
    }
}

impl BarrierRef {
    /// Attempts to acquire a usage right. Returns `None` once the owner has
    /// started closing; succeeding guarantees the owner stays alive until
    /// the returned guard drops.
    pub fn try_use(&self) -> Option<UseGuard> {
        let mut state = self.shared.state.lock().unwrap();
        if state.closed {
            return None;
        }
        state.uses += 1;
        Some(UseGuard { shared: Arc::clone(&self.shared) })
    }
}

impl Drop for UseGuard {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.uses -= 1;
        if state.uses == 0 && state.closed {
            self.shared.drained.notify_all();
        }
    }
}
