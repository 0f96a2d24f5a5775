use crate::atomic::Atomic;
use crate::atomic::MemoryOrder::{Acquire, Relaxed, Release};
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
const CONTENDED: u32 = 2;

/// A mutex on one `Atomic<u32>` that only goes to the OS when there is
/// contention.
pub struct Mutex<T> {
    /// 0: unlocked
    /// 1: locked, no other threads waiting
    /// 2: locked, other threads waiting
    state: Atomic<u32>,
    value: UnsafeCell<T>,
}

unsafe impl<T> Sync for Mutex<T> where T: Send {}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

unsafe impl<T> Sync for MutexGuard<'_, T> where T: Sync {}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Safety: the guard proves the lock is held.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Atomic::new(UNLOCKED),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<T> {
        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Acquire)
            .is_err()
        {
            lock_contended(&self.state);
        }
        MutexGuard { mutex: self }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<T>> {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Acquire)
            .ok()
            .map(|_| MutexGuard { mutex: self })
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

#[cold]
fn lock_contended(state: &Atomic<u32>) {
    let mut spin_count = 0;

    // Spin on a load rather than a compare-exchange: loads keep the cache
    // line shared instead of pulling it away from the holder.
    //
    // Only spin while nobody else is waiting. A state of 2 means another
    // thread already spun and gave up.
    while state.load(Relaxed) == LOCKED && spin_count < 100 {
        spin_count += 1;
        std::hint::spin_loop();
    }

    if state.compare_exchange(UNLOCKED, LOCKED, Acquire).is_ok() {
        return;
    }

    // Mark the lock contended so the holder knows to wake somebody.
    while state.swap(CONTENDED, Acquire) != UNLOCKED {
        state.wait(CONTENDED, Relaxed);
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        if self.mutex.state.swap(UNLOCKED, Release) == CONTENDED {
            self.mutex.state.notify_one();
        }
    }
}

#[test]
fn uncontended_lock_stays_out_of_the_kernel() {
    let m = Mutex::new(0);
    std::hint::black_box(&m);
    for _ in 0..100_000 {
        *m.lock() += 1;
    }
    assert_eq!(m.state.load(Relaxed), UNLOCKED);
    assert_eq!(m.into_inner(), 100_000);
}

#[test]
fn contended_increments_are_not_lost() {
    use std::thread;

    let m = Mutex::new(0);
    std::hint::black_box(&m);
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..100_000 {
                    *m.lock() += 1;
                }
            });
        }
    });

    let value = *m.lock();
    assert!(value == 100_000 * 4, "value = {}", value);
}

#[test]
fn try_lock_fails_while_held() {
    let m = Mutex::new(());
    let guard = m.lock();
    assert!(m.try_lock().is_none());
    drop(guard);
    assert!(m.try_lock().is_some());
}
