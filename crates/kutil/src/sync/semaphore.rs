// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Counting semaphore on a parking_lot mutex + condvar.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Counting semaphore.
#[derive(Debug, Default)]
pub struct Semaphore {
    permits: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    /// Semaphore holding `permits` initial permits.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            condvar: Condvar::new(),
        }
    }

    /// Add one permit and wake one waiter.
    pub fn post(&self) {
        self.post_many(1);
    }

    /// Add `n` permits and wake up to `n` waiters.
    pub fn post_many(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut permits = self.permits.lock();
        *permits += n;
        drop(permits);
        for _ in 0..n {
            self.condvar.notify_one();
        }
    }

    /// Block until a permit is available, then take it.
    pub fn wait(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.condvar.wait(&mut permits);
        }
        *permits -= 1;
    }

    /// Like [`Semaphore::wait`] with a deadline. Returns `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut permits = self.permits.lock();
        while *permits == 0 {
            if self.condvar.wait_until(&mut permits, deadline).timed_out() && *permits == 0 {
                return false;
            }
        }
        *permits -= 1;
        true
    }

    /// Take a permit if one is available.
    pub fn try_wait(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits > 0 {
            *permits -= 1;
            true
        } else {
            false
        }
    }

    /// Permits currently available.
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }
}
