//! Locks built on `Atomic::wait` and `Atomic::notify_one`.

mod mutex;
mod spin_lock;

pub use mutex::{Mutex, MutexGuard};
pub use spin_lock::{SpinGuard, SpinLock};
