use crate::atomic::Atomic;
use crate::atomic::MemoryOrder::{Acquire, Relaxed, Release};
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

/// A lock on a single `Atomic<i32>` word: 0 unlocked, 1 locked.
///
/// Acquire retries a weak compare-exchange and waits on the word between
/// attempts, so a thread that loses the race first spins briefly inside
/// `wait` and only then sleeps. Release stores 0 and wakes one waiter.
pub struct SpinLock<T> {
    locked: Atomic<i32>,
    value: UnsafeCell<T>,
}

unsafe impl<T> Sync for SpinLock<T> where T: Send {}

pub struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

unsafe impl<T> Sync for SpinGuard<'_, T> where T: Sync {}

impl<T> SpinLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            locked: Atomic::new(0),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> SpinGuard<T> {
        // The weak version may fail even if the lock is free. The loop
        // retries it anyway, and it is cheaper on LL/SC machines.
        while self.locked.compare_exchange_weak(0, 1, Acquire).is_err() {
            self.locked.wait(1, Relaxed);
        }
        SpinGuard { lock: self }
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Safety: the guard proves the lock is held.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(0, Release);
        self.lock.locked.notify_one();
    }
}

// Every thread hammers the lock, checking that the four-word payload it finds
// was written completely by one holder. When all of them are done a
// coordinator publishes a sentinel with `notify_all`, which must release
// every thread parked on it.
#[cfg(test)]
fn hammer(threads: usize) {
    use std::thread;

    const ROUNDS: u64 = 2_000;
    const DONE: i32 = -1;

    let lock = SpinLock::new([0u64; 4]);
    let finished = Atomic::new(0i32);
    let released = Atomic::new(0i32);

    thread::scope(|s| {
        for _ in 0..threads {
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    let mut payload = lock.lock();
                    let n = payload[0];
                    assert!(payload.iter().all(|&x| x == n), "torn payload {:?}", *payload);
                    for word in payload.iter_mut() {
                        *word = n + 1;
                    }
                }
                finished.fetch_add(1, Release);
                finished.notify_all();

                loop {
                    let state = released.load(Acquire);
                    if state == DONE {
                        break;
                    }
                    released.wait(state, Acquire);
                }
            });
        }

        // The designated thread.
        s.spawn(|| {
            loop {
                let n = finished.load(Acquire);
                if n == threads as i32 {
                    break;
                }
                finished.wait(n, Acquire);
            }
            released.store(DONE, Release);
            released.notify_all();
        });
    });

    assert_eq!(lock.into_inner(), [threads as u64 * ROUNDS; 4]);
}

#[test]
fn spin_lock_4_threads() {
    hammer(4);
}

#[test]
fn spin_lock_8_threads() {
    hammer(8);
}

#[test]
fn spin_lock_16_threads() {
    hammer(16);
}

#[test]
fn spin_lock_32_threads() {
    hammer(32);
}
