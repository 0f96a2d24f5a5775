//! Atomics over any plain-data value, with explicit memory orders and a
//! futex-style `wait`/`notify`.
//!
//! ```
//! use std::thread;
//! use waitable_atomics::{Atomic, MemoryOrder::*};
//!
//! let ready = Atomic::new(false);
//! thread::scope(|s| {
//!     s.spawn(|| {
//!         ready.store(true, Release);
//!         ready.notify_one();
//!     });
//!     while !ready.load(Acquire) {
//!         ready.wait(false, Acquire);
//!     }
//! });
//! ```
//!
//! Values up to [`atomic::layout::MAX_LOCK_FREE_SIZE`] bytes use hardware
//! atomics. Larger ones ([`Spill`]) fall back to a striped lock table but
//! keep the same interface.

pub mod atomic;
pub mod locks;
pub mod wait;

pub use atomic::{
    signal_fence, thread_fence, Atomic, AtomicAdd, AtomicBits, AtomicValue, MemoryOrder, Spill,
};
pub use wait::{set_spin_policy, spin_policy, SpinPolicy};
