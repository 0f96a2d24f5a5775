//! Wait until an atomic changes, then wake.
//!
//! A wait first compares once, then busy-polls for the [`SpinPolicy`]
//! budget, and only then asks the OS to park the thread. Words the OS can
//! wait on directly are parked on in place. Everything else (words of an
//! unsupported size, 16-byte words, spilled values) goes through the
//! contention table.

pub(crate) mod backend;
mod contention;
mod spin;

pub use spin::{set_spin_policy, spin_policy, SpinPolicy};

use crate::atomic::{ops, MemoryOrder, RawWord};
use backend::{Platform, WaitBackend};
use spin::SpinWait;
use std::mem;
use std::sync::atomic::Ordering::Relaxed;

pub(crate) fn wait<W: RawWord>(cell: &W::Cell, old: W, order: MemoryOrder) {
    wait_with(cell, old, order, spin::spin_policy(), || {})
}

/// `wait` with an explicit spin policy. `before_park` runs right before the
/// thread would be handed to the OS; tests use it to slip a notify into that
/// window.
pub(crate) fn wait_with<W: RawWord>(
    cell: &W::Cell,
    old: W,
    order: MemoryOrder,
    policy: SpinPolicy,
    before_park: impl FnOnce(),
) {
    let changed = || !ops::load::<W>(cell, order).same(old);

    if changed() {
        return;
    }

    // Poll relaxed, then confirm with the caller's ordering so that a
    // successful return synchronizes the same way a plain load would.
    let spin = SpinWait::new(policy);
    if spin.spin_until(|| !W::load(cell, Relaxed).same(old)) && changed() {
        return;
    }

    let addr = W::cell_ptr(cell);
    if W::NATIVE_WAIT {
        tracing::trace!(size = mem::size_of::<W>(), "parking on the value's address");
        before_park();
        // Safety: `NATIVE_WAIT` is only set for words of a size the backend
        // takes, and the cell is aligned to its size.
        unsafe { Platform::wait_on_address(addr, old.wait_bits(), mem::size_of::<W>()) }
    } else {
        tracing::trace!(
            size = mem::size_of::<W>(),
            bucket = contention::bucket(addr as usize),
            "parking on the contention table"
        );
        contention::entry_for(addr).wait(|| !changed(), before_park);
    }
}

pub(crate) fn notify_one<W: RawWord>(cell: &W::Cell) {
    let addr = W::cell_ptr(cell);
    if W::NATIVE_WAIT {
        // Safety: see `wait_with`.
        unsafe { Platform::notify_one(addr, mem::size_of::<W>()) }
    } else {
        contention::entry_for(addr).notify();
    }
}

pub(crate) fn notify_all<W: RawWord>(cell: &W::Cell) {
    let addr = W::cell_ptr(cell);
    if W::NATIVE_WAIT {
        unsafe { Platform::notify_all(addr, mem::size_of::<W>()) }
    } else {
        contention::entry_for(addr).notify();
    }
}

#[test]
fn wait_on_a_changed_value_returns_immediately() {
    use crate::Atomic;
    use std::time::{Duration, Instant};
    use MemoryOrder::*;

    let direct = Atomic::new(1u32);
    let indirect = Atomic::new([1u8; 24]);

    let start = Instant::now();
    for _ in 0..1000 {
        direct.wait(0, Acquire);
        indirect.wait([0; 24], Acquire);
    }
    // Far below a scheduler quantum per call.
    assert!(start.elapsed() < Duration::from_millis(100), "{:?}", start.elapsed());
}

#[test]
fn notify_wakes_a_parked_waiter() {
    use crate::Atomic;
    use std::thread;
    use std::time::Duration;
    use MemoryOrder::*;

    fn check<T: crate::AtomicValue + PartialEq + Send + Sync>(a: Atomic<T>, old: T, new: T) {
        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(50));
                a.store(new, Release);
                a.notify_one();
            });
            while a.load(Acquire) == old {
                a.wait(old, Acquire);
            }
        });
    }

    check(Atomic::new(0u8), 0, 1);
    check(Atomic::new(0u32), 0, 1);
    check(Atomic::new(0u64), 0, 1);
    check(Atomic::new(0u128), 0, 1);
    check(Atomic::new([0u8; 3]), [0; 3], [1; 3]);
    check(Atomic::new([0u64; 4]), [0; 4], [1; 4]);
}

// A notify that arrives after the waiter registered in the contention table
// and checked its value, but before it parked, must still wake it.
#[test]
fn indirect_notify_between_register_and_park_is_not_lost() {
    use crate::atomic::Spill;
    use crate::Atomic;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use MemoryOrder::*;

    assert!(!<Spill<[u64; 3]> as RawWord>::NATIVE_WAIT);
    let a = Atomic::new([0u64; 3]);
    let entry = contention::entry_for(a.as_ptr());
    let (in_window, window_entered) = mpsc::channel();
    let (done, finished) = mpsc::channel();

    thread::scope(|s| {
        let a = &a;
        s.spawn(move || {
            let policy = SpinPolicy::DEFAULT;
            wait_with(a.storage().cell(), Spill([0u64; 3]), Acquire, policy, || {
                // Registered and past the value check. Hold the thread here
                // while the main thread changes the value and notifies.
                in_window.send(()).unwrap();
                thread::sleep(Duration::from_millis(200));
            });
            done.send(()).unwrap();
        });

        window_entered.recv().unwrap();
        assert!(entry.waiters() >= 1);
        a.store([1, 2, 3], Release);
        a.notify_one();

        // The waiter's OS call sees a stale generation and returns. Without
        // the generation protocol it would sleep forever.
        finished
            .recv_timeout(Duration::from_secs(10))
            .expect("notify in the register-to-park window was lost");
    });
}

#[test]
fn handoff_without_spinning() {
    use crate::Atomic;
    use std::thread;
    use MemoryOrder::*;

    fn wait_unspun<T: crate::AtomicValue>(a: &Atomic<T>, old: T) {
        let word = crate::atomic::to_word(old);
        wait_with(a.storage().cell(), word, Acquire, SpinPolicy::NONE, || {});
    }

    let small = Atomic::new(0u32);
    let big = Atomic::new([0u32; 4]);
    thread::scope(|s| {
        s.spawn(|| {
            for i in 1..=100 {
                small.store(i, Release);
                small.notify_all();
                big.store([i; 4], Release);
                big.notify_all();
            }
        });
        let mut seen = 0;
        while seen < 100 {
            wait_unspun(&small, seen);
            seen = small.load(Acquire);
        }
        let mut seen = [0; 4];
        while seen[0] < 100 {
            wait_unspun(&big, seen);
            seen = big.load(Acquire);
        }
    });
}

// Threads take turns on one counter: thread `k` only acts on values `v` with
// `v % threads == k`, logs `v`, and publishes `v + 1`. Everyone stops once
// the counter passes 100.
#[cfg(test)]
fn handoff(threads: u32) {
    use crate::locks::Mutex;
    use crate::Atomic;
    use std::thread;
    use MemoryOrder::*;

    let counter = Atomic::new(0u32);
    let log = Mutex::new(Vec::new());

    thread::scope(|s| {
        for k in 0..threads {
            let (counter, log) = (&counter, &log);
            s.spawn(move || loop {
                let mut v = counter.load(Acquire);
                while v % threads != k && v <= 100 {
                    counter.wait(v, Acquire);
                    v = counter.load(Acquire);
                }
                if v > 100 {
                    break;
                }
                log.lock().push(v);
                counter.store(v + 1, Release);
                if threads == 2 {
                    counter.notify_one();
                } else {
                    counter.notify_all();
                }
            });
        }
    });

    assert_eq!(counter.into_inner(), 101);
    assert_eq!(log.into_inner(), (0..=100).collect::<Vec<_>>());
}

#[test]
fn two_thread_handoff() {
    handoff(2);
}

#[test]
fn many_thread_handoff() {
    handoff(3);
    handoff(8);
}
