//! Completion joining for parallel fan-outs.
//!
//! A [`CompletionGroup`] hands out tokens; each asynchronous branch of a
//! fan-out holds one and drops it when its handler has run. Once the group
//! is sealed and every token is gone, the group's continuation runs exactly
//! once, on whichever thread released the last token. A [`BlockingGroup`]
//! couples that continuation to a latch so a caller thread can simply wait.

use std::sync::{Arc, Condvar, Mutex};

type DoneFn = Box<dyn FnOnce() + Send>;

struct Trigger {
    done: Mutex<Option<DoneFn>>,
}

impl Drop for Trigger {
    fn drop(&mut self) {
        if let Some(done) = self.done.lock().unwrap().take() {
            done();
        }
    }
}

/// Runs a continuation exactly once, after the group has been sealed and
/// every issued [`CompletionToken`] has been dropped.
pub struct CompletionGroup {
    trigger: Option<Arc<Trigger>>,
}

/// A participation mark in a [`CompletionGroup`]; dropping it signals that
/// this branch of the fan-out has completed.
#[derive(Clone)]
pub struct CompletionToken {
    _trigger: Arc<Trigger>,
}

impl CompletionGroup {
    /// Creates a group whose continuation is `done`.
    pub fn new(done: impl FnOnce() + Send + 'static) -> Self {
        Self {
            trigger: Some(Arc::new(Trigger { done: Mutex::new(Some(Box::new(done))) })),
        }
    }

    /// Issues a token. Panics once the group has been sealed.
    pub fn token(&self) -> CompletionToken {
        let trigger = self.trigger.as_ref().expect("completion group already sealed");
        CompletionToken { _trigger: Arc::clone(trigger) }
    }

    /// Wraps a single-use callback so that running (or dropping) it releases
    /// one token.
    pub fn wrap<T>(&self, callback: impl FnOnce(T)) -> impl FnOnce(T) {
        let token = self.token();
        move |value| {
            callback(value);
            drop(token);
        }
    }

    /// Seals the group: no more tokens can be issued, and the continuation
    /// fires as soon as the outstanding tokens are gone (immediately, when
    /// there are none).
    pub fn seal(&mut self) {
        self.trigger = None;
    }

    /// Whether the group is still unsealed.
    pub fn pending(&self) -> bool {
        self.trigger.is_some()
    }
}

struct Latch {
    state: Mutex<bool>,
    released: Condvar,
}

impl Latch {
    fn new() -> Self {
        Self { state: Mutex::new(false), released: Condvar::new() }
    }

    fn release(&self) {
        let mut released = self.state.lock().unwrap();
        *released = true;
        self.released.notify_all();
    }

    fn wait(&self) {
        let mut released = self.state.lock().unwrap();
        while !*released {
            released = self.released.wait(released).unwrap();
        }
    }
}

/// A [`CompletionGroup`] bound to a latch, so a caller thread can block
/// until every wrapped handler has run.
///
/// Dropping a group that was never waited on is a programmer error and
/// panics, analogous to dropping a joinable thread.
pub struct BlockingGroup {
    group: CompletionGroup,
    latch: Arc<Latch>,
    waited: bool,
}

impl BlockingGroup {
    /// Creates an empty group; issue tokens, hand them to the fan-out, then
    /// call [`BlockingGroup::wait`].
    pub fn new() -> Self {
        let latch = Arc::new(Latch::new());
        let released = Arc::clone(&latch);
        Self {
            group: CompletionGroup::new(move || released.release()),
            latch,
            waited: false,
        }
    }

    /// Issues a token; see [`CompletionGroup::token`].
    pub fn token(&self) -> CompletionToken {
        self.group.token()
    }

    /// Wraps a single-use callback; see [`CompletionGroup::wrap`].
    pub fn wrap<T>(&self, callback: impl FnOnce(T)) -> impl FnOnce(T) {
        self.group.wrap(callback)
    }

    /// Seals the group and blocks until every outstanding token has been
    /// released. Idempotent.
    pub fn wait(&mut self) {
        if !self.waited {
            self.waited = true;
            self.group.seal();
            self.latch.wait();
        }
    }

    /// Whether [`BlockingGroup::wait`] has not been called yet.
    pub fn pending(&self) -> bool {
        !self.waited
    }
}

impl Default for BlockingGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BlockingGroup {
    fn drop(&mut self) {
        assert!(
            self.waited || std::thread::panicking(),
            "blocking group dropped before a call to wait()"
        );
    }
}
