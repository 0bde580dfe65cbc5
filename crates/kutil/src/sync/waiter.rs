// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resettable cross-thread rendezvous.
//!
//! `release` wakes every thread currently blocked in `wait` and leaves the
//! waiter open: later calls to `wait` return at once until `reset`.
//!
//! # Example
//! ```
//! use kutil::sync::ThreadWaiter;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let waiter = Arc::new(ThreadWaiter::new());
//! let w = Arc::clone(&waiter);
//! std::thread::spawn(move || w.release());
//! assert!(waiter.wait(Some(Duration::from_secs(5))));
//! ```

use super::Semaphore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    waiters: usize,
    released: bool,
    /// Permits for the waiters of the current round. Replaced on every
    /// wake-up so a permit only ever reaches a waiter it was posted for.
    gate: Arc<Semaphore>,
}

/// One-shot, resettable gate.
#[derive(Debug, Default)]
pub struct ThreadWaiter {
    state: Mutex<State>,
}

impl ThreadWaiter {
    /// Armed (not released) waiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until [`ThreadWaiter::release`]. Returns `true` when released,
    /// `false` when `max_time` elapsed first.
    pub fn wait(&self, max_time: Option<Duration>) -> bool {
        let gate = {
            let mut state = self.state.lock();
            if state.released {
                return true;
            }
            state.waiters += 1;
            Arc::clone(&state.gate)
        };

        let Some(timeout) = max_time else {
            gate.wait();
            return true;
        };
        if gate.wait_timeout(timeout) {
            return true;
        }

        let mut state = self.state.lock();
        if !Arc::ptr_eq(&state.gate, &gate) {
            // Woken between the timeout and this lock; our permit is on
            // the old gate and nobody else can take it.
            drop(state);
            gate.wait();
            return true;
        }
        state.waiters -= 1;
        false
    }

    /// Wake all current waiters and stay open until [`ThreadWaiter::reset`].
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.released = true;
        Self::wake_all(&mut state);
    }

    /// Wake all current waiters, then re-arm.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        Self::wake_all(&mut state);
        state.released = false;
    }

    /// True between [`ThreadWaiter::release`] and [`ThreadWaiter::reset`].
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    fn wake_all(state: &mut State) {
        if state.waiters > 0 {
            state.gate.post_many(state.waiters);
            state.waiters = 0;
            state.gate = Arc::new(Semaphore::new(0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_release_before_wait() {
        let waiter = ThreadWaiter::new();
        waiter.release();
        assert!(waiter.is_released());
        assert!(waiter.wait(Some(Duration::from_millis(1))));
        assert!(waiter.wait(None));
    }

    #[test]
    fn test_timeout_returns_false() {
        let waiter = ThreadWaiter::new();
        let start = Instant::now();
        assert!(!waiter.wait(Some(Duration::from_millis(50))));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(!waiter.is_released());
    }

    #[test]
    fn test_release_after_100ms() {
        let waiter = Arc::new(ThreadWaiter::new());
        let releaser = Arc::clone(&waiter);
        let start = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            releaser.release();
        });
        assert!(waiter.wait(Some(Duration::from_secs(5))));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(1500), "{:?}", elapsed);
        handle.join().unwrap();
    }

    #[test]
    fn test_release_wakes_every_waiter() {
        let waiter = Arc::new(ThreadWaiter::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let w = Arc::clone(&waiter);
                thread::spawn(move || w.wait(Some(Duration::from_secs(5))))
            })
            .collect();
        thread::sleep(Duration::from_millis(50));
        waiter.release();
        for h in handles {
            assert!(h.join().unwrap());
        }
    }

    #[test]
    fn test_reset_does_not_leak_permits_to_later_waiters() {
        for _ in 0..50 {
            let waiter = Arc::new(ThreadWaiter::new());
            let early = {
                let w = Arc::clone(&waiter);
                thread::spawn(move || w.wait(Some(Duration::from_millis(20))))
            };
            thread::sleep(Duration::from_millis(19));
            waiter.reset();
            // a waiter of the next round must not pick up the early permit
            assert!(!waiter.wait(Some(Duration::from_millis(30))));
            assert!(early.join().is_ok());
        }
    }

    #[test]
    fn test_reset_rearms() {
        let waiter = ThreadWaiter::new();
        waiter.release();
        waiter.reset();
        assert!(!waiter.is_released());
        assert!(!waiter.wait(Some(Duration::from_millis(10))));
    }
}
