// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thread coordination primitives.

mod semaphore;
mod waiter;

pub use semaphore::Semaphore;
pub use waiter::ThreadWaiter;
