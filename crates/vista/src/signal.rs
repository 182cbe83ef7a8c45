//! Enumerated state broadcast with single-fire wait notifications
//!
//! A [`Signal`] holds one state out of a declared set. Callers can read it at
//! any time or ask to be told when it becomes a given state. Every wait gets
//! its own one-shot channel, created on demand under the same mutex that
//! guards transitions, so no transition can slip between "check current
//! state" and "register waiter".

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::oneshot;
use vista_core::error::{Result, VistaError};

/// Receiver side of a state wait. Resolves with `Ok(())` once the awaited
/// state is reached; resolves with an error only if the signal is dropped first.
pub type StateWaiter = oneshot::Receiver<()>;

/// Shared handle to an enumerated state. Clones observe the same state.
pub struct Signal<S> {
    inner: Arc<Mutex<SignalInner<S>>>,
}

struct SignalInner<S> {
    state: S,
    allowed: Vec<S>,
    waiters: HashMap<S, Vec<oneshot::Sender<()>>>,
}

impl<S> Clone for Signal<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> Signal<S>
where
    S: Copy + Eq + Hash + fmt::Debug,
{
    /// Create a signal in `initial`, restricted to `allowed` (plus `initial`).
    pub fn new(initial: S, allowed: impl IntoIterator<Item = S>) -> Self {
        let mut states: Vec<S> = allowed.into_iter().collect();
        if !states.contains(&initial) {
            states.push(initial);
        }

        Self {
            inner: Arc::new(Mutex::new(SignalInner {
                state: initial,
                allowed: states,
                waiters: HashMap::new(),
            })),
        }
    }

    /// Replace the current state and wake every waiter registered for it.
    ///
    /// # Errors
    ///
    /// `InvalidState` if `state` is not one of the declared states; the
    /// current state is left untouched.
    pub fn set_state(&self, state: S) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.allowed.contains(&state) {
            return Err(VistaError::InvalidState(format!(
                "state {:?} is not allowed (allowed: {:?})",
                state, inner.allowed
            )));
        }

        inner.state = state;
        if let Some(waiters) = inner.waiters.remove(&state) {
            for tx in waiters {
                // The receiver may be gone already; nothing to wake then.
                let _ = tx.send(());
            }
        }
        Ok(())
    }

    pub fn state(&self) -> S {
        self.inner.lock().state
    }

    pub fn is_state(&self, state: S) -> bool {
        self.inner.lock().state == state
    }

    /// Notification for the next time the signal is in `state`.
    ///
    /// Already satisfied if the signal is in `state` right now; otherwise
    /// satisfied by the next `set_state(state)`.
    pub fn wait_for_state(&self, state: S) -> StateWaiter {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();

        if inner.state == state {
            let _ = tx.send(());
            return rx;
        }

        let waiters = inner.waiters.entry(state).or_default();
        waiters.retain(|w| !w.is_closed());
        waiters.push(tx);
        rx
    }

    /// Number of registered waiters that have not been dropped yet
    pub fn pending_waiters(&self) -> usize {
        self.inner
            .lock()
            .waiters
            .values()
            .flat_map(|w| w.iter())
            .filter(|w| !w.is_closed())
            .count()
    }
}

impl<S: fmt::Debug> fmt::Debug for Signal<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Signal")
            .field("state", &inner.state)
            .field("allowed", &inner.allowed)
            .finish()
    }
}
