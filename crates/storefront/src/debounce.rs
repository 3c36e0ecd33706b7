//! Trailing-edge debouncing keyed by an arbitrary id.
//!
//! Each call to [`Debouncer::settle`] takes a ticket for its key and sleeps
//! for the fixed delay. Only the call holding the newest ticket when its
//! sleep ends gets `true`; every earlier call for the same key returns
//! `false` and should drop its work. N calls inside the window therefore
//! produce exactly one winner, `delay` after the last call.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Per-key debouncer with a fixed delay.
#[derive(Debug)]
pub struct Debouncer<K> {
    delay: Duration,
    state: Mutex<DebounceState<K>>,
}

#[derive(Debug)]
struct DebounceState<K> {
    next_ticket: u64,
    latest: HashMap<K, u64>,
}

impl<K: Eq + Hash + Clone> Debouncer<K> {
    /// Create a debouncer with the given window.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Mutex::new(DebounceState {
                next_ticket: 0,
                latest: HashMap::new(),
            }),
        }
    }

    /// The fixed window.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait out the window for `key`. Returns `true` if this call is still
    /// the newest one for `key` once the window elapses.
    pub async fn settle(&self, key: K) -> bool {
        let ticket = {
            let mut state = self.lock();
            state.next_ticket += 1;
            let ticket = state.next_ticket;
            state.latest.insert(key.clone(), ticket);
            ticket
        };

        tokio::time::sleep(self.delay).await;

        let mut state = self.lock();
        if state.latest.get(&key) == Some(&ticket) {
            state.latest.remove(&key);
            true
        } else {
            false
        }
    }

    /// Whether a call for `key` is currently waiting.
    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.lock().latest.contains_key(key)
    }

    /// Drop any waiting call for `key`; it will return `false`.
    pub fn cancel(&self, key: &K) {
        self.lock().latest.remove(key);
    }

    /// Drop every waiting call.
    pub fn cancel_all(&self) {
        self.lock().latest.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DebounceState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
