//! `Atomic<T>`: atomic operations with explicit memory ordering on any
//! plain-data value, plus blocking wait/notify on that value.

mod arith;
pub mod layout;
pub mod ops;
mod order;
mod spill;
mod storage;

pub use arith::{AtomicAdd, AtomicBits};
pub use ops::{signal_fence, thread_fence, IntWord, RawWord};
pub use order::MemoryOrder;
pub use spill::{Spill, SpillCell};
pub use storage::{AtomicStorage, AtomicValue};

use crate::wait;
use std::fmt;
pub(crate) use storage::{from_word, to_word};

pub struct Atomic<T: AtomicValue> {
    storage: AtomicStorage<T>,
}

impl<T: AtomicValue> Atomic<T> {
    pub fn new(value: T) -> Self {
        Self {
            storage: AtomicStorage::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.storage.into_inner()
    }

    /// Address of the stored word. Two `Atomic`s never share one.
    pub fn as_ptr(&self) -> *const u8 {
        self.storage.as_ptr()
    }

    /// Whether operations on `T` compile to lock-free instructions on every
    /// CPU this binary can run on.
    pub const fn is_always_lock_free() -> bool {
        <T::Word as RawWord>::ALWAYS_LOCK_FREE
    }

    /// Whether operations on this atomic are lock-free. Always false once
    /// `T` is larger than [`layout::MAX_LOCK_FREE_SIZE`].
    pub fn is_lock_free(&self) -> bool {
        <T::Word as RawWord>::is_lock_free()
    }

    pub fn load(&self, order: MemoryOrder) -> T {
        from_word(ops::load(self.storage.cell(), order))
    }

    pub fn store(&self, value: T, order: MemoryOrder) {
        ops::store(self.storage.cell(), to_word(value), order)
    }

    /// Stores `value` and returns the previous value.
    pub fn swap(&self, value: T, order: MemoryOrder) -> T {
        from_word(ops::exchange(self.storage.cell(), to_word(value), order))
    }

    /// Stores `new` if the current value is bitwise equal to `current`.
    ///
    /// Returns the previous value: `Ok` if the store happened, `Err` with the
    /// value actually found otherwise. Only fails when that value differs
    /// from `current`. The failure ordering is derived from `success` with
    /// [`MemoryOrder::failure`].
    pub fn compare_exchange(&self, current: T, new: T, success: MemoryOrder) -> Result<T, T> {
        self.compare_exchange_explicit(current, new, success, success.failure())
    }

    pub fn compare_exchange_explicit(
        &self,
        current: T,
        new: T,
        success: MemoryOrder,
        failure: MemoryOrder,
    ) -> Result<T, T> {
        ops::compare_exchange_strong(
            self.storage.cell(),
            to_word(current),
            to_word(new),
            success,
            failure,
        )
        .map(from_word)
        .map_err(from_word)
    }

    /// Like [`Atomic::compare_exchange`], but allowed to fail even when the
    /// current value equals `current`. Use it inside a retry loop.
    pub fn compare_exchange_weak(&self, current: T, new: T, success: MemoryOrder) -> Result<T, T> {
        self.compare_exchange_weak_explicit(current, new, success, success.failure())
    }

    pub fn compare_exchange_weak_explicit(
        &self,
        current: T,
        new: T,
        success: MemoryOrder,
        failure: MemoryOrder,
    ) -> Result<T, T> {
        ops::compare_exchange_weak(
            self.storage.cell(),
            to_word(current),
            to_word(new),
            success,
            failure,
        )
        .map(from_word)
        .map_err(from_word)
    }

    /// Blocks while the value is bitwise equal to `old`.
    ///
    /// Returns immediately if it already differs. Otherwise spins for a
    /// short while and then parks the thread until a `notify_*` call on this
    /// atomic. It can return without the value having changed (a spurious
    /// wakeup), so call it in a loop that re-checks the value.
    pub fn wait(&self, old: T, order: MemoryOrder) {
        wait::wait::<T::Word>(self.storage.cell(), to_word(old), order)
    }

    /// Wakes at least one thread blocked in [`Atomic::wait`] on this atomic.
    pub fn notify_one(&self) {
        wait::notify_one::<T::Word>(self.storage.cell())
    }

    /// Wakes every thread blocked in [`Atomic::wait`] on this atomic.
    pub fn notify_all(&self) {
        wait::notify_all::<T::Word>(self.storage.cell())
    }

    #[cfg(test)]
    pub(crate) fn storage(&self) -> &AtomicStorage<T> {
        &self.storage
    }
}

impl<T: AtomicAdd> Atomic<T> {
    /// Adds to the current value, wrapping around on overflow for integers,
    /// and returns the previous value.
    pub fn fetch_add(&self, value: T, order: MemoryOrder) -> T {
        T::fetch_add(self.storage.cell(), value, order)
    }

    pub fn fetch_sub(&self, value: T, order: MemoryOrder) -> T {
        T::fetch_sub(self.storage.cell(), value, order)
    }
}

impl<T: AtomicBits> Atomic<T> {
    pub fn fetch_and(&self, value: T, order: MemoryOrder) -> T {
        T::fetch_and(self.storage.cell(), value, order)
    }

    pub fn fetch_or(&self, value: T, order: MemoryOrder) -> T {
        T::fetch_or(self.storage.cell(), value, order)
    }

    pub fn fetch_xor(&self, value: T, order: MemoryOrder) -> T {
        T::fetch_xor(self.storage.cell(), value, order)
    }
}

impl<T: AtomicValue + Default> Default for Atomic<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: AtomicValue> From<T> for Atomic<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: AtomicValue + fmt::Debug> fmt::Debug for Atomic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Atomic")
            .field(&self.load(MemoryOrder::SeqCst))
            .finish()
    }
}

#[test]
fn lock_free_up_to_the_platform_limit() {
    fn check<T: AtomicValue>() {
        let size = std::mem::size_of::<T>();
        assert_eq!(
            Atomic::<T>::is_always_lock_free(),
            layout::is_always_lock_free(size),
            "size {size}"
        );
    }

    check::<[u8; 1]>();
    check::<[u8; 2]>();
    check::<[u8; 3]>();
    check::<[u8; 4]>();
    check::<[u8; 5]>();
    check::<[u8; 8]>();
    check::<[u8; 9]>();
    check::<[u8; 12]>();
    check::<[u8; 16]>();
    check::<[u8; 17]>();
    check::<[u8; 32]>();
    check::<[u64; 4]>();

    assert!(Atomic::new(0u32).is_lock_free());
    assert_eq!(
        Atomic::new([0u8; 16]).is_lock_free(),
        layout::MAX_LOCK_FREE_SIZE >= 16
    );
    assert_eq!(Atomic::new(0u128).is_lock_free(), layout::MAX_LOCK_FREE_SIZE >= 16);
    assert!(!Atomic::new([0u8; 17]).is_lock_free());
    if layout::MAX_LOCK_FREE_SIZE < 16 {
        assert!(!Atomic::new([0u8; 9]).is_lock_free());
        assert!(!Atomic::new([0u64; 2]).is_lock_free());
    }
}

#[test]
fn store_then_load_for_every_order_pair() {
    use MemoryOrder::*;

    let a = Atomic::new(0u64);
    let big = Atomic::new([0u8; 24]);
    let mut n = 0u64;
    for store in [Relaxed, Release, SeqCst] {
        for load in [Relaxed, Acquire, SeqCst] {
            n += 1;
            a.store(n, store);
            assert_eq!(a.load(load), n);

            big.store([n as u8; 24], store);
            assert_eq!(big.load(load), [n as u8; 24]);
        }
    }
}

#[test]
fn strong_cas_only_fails_on_a_different_value() {
    use MemoryOrder::*;

    let a = Atomic::new(10i32);
    for success in [Relaxed, Acquire, Release, AcqRel, SeqCst] {
        let current = a.load(Relaxed);
        assert_eq!(a.compare_exchange(current, current + 1, success), Ok(current));
        // The Err carries what was really there.
        assert_eq!(a.compare_exchange(current, 0, success), Err(current + 1));
    }

    let big = Atomic::new([1u8; 17]);
    assert_eq!(big.compare_exchange([2; 17], [3; 17], SeqCst), Err([1; 17]));
    assert_eq!(big.compare_exchange([1; 17], [3; 17], SeqCst), Ok([1; 17]));
    assert_eq!(big.into_inner(), [3; 17]);
}

#[test]
fn weak_cas_succeeds_in_a_loop() {
    use MemoryOrder::*;

    let a = Atomic::new([1u8, 2, 3]);
    let mut current = a.load(Relaxed);
    loop {
        let mut next = current;
        next[0] += 1;
        match a.compare_exchange_weak(current, next, AcqRel) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
    assert_eq!(a.load(Acquire), [2, 2, 3]);
}

#[test]
fn fetch_ops_return_the_previous_value() {
    use MemoryOrder::*;

    let a = Atomic::new(5u16);
    assert_eq!(a.fetch_add(3, Relaxed), 5);
    assert_eq!(a.fetch_sub(10, AcqRel), 8);
    assert_eq!(a.load(Relaxed), u16::MAX - 1);
    assert_eq!(a.fetch_and(0xFF, SeqCst), u16::MAX - 1);
    assert_eq!(a.fetch_or(0x100, SeqCst), 0xFE);
    assert_eq!(a.fetch_xor(0x1FE, SeqCst), 0x1FE);
    assert_eq!(a.into_inner(), 0);

    let flag = Atomic::new(false);
    assert!(!flag.fetch_or(true, SeqCst));
    assert!(flag.fetch_xor(true, SeqCst));
    assert!(!flag.fetch_and(true, SeqCst));
    assert!(!flag.load(SeqCst));

    // Lock-free or spilled, 16-byte integers wrap the same way.
    let wide = Atomic::new(u128::MAX);
    assert_eq!(wide.fetch_add(1, AcqRel), u128::MAX);
    assert_eq!(wide.load(Acquire), 0);
    let signed = Atomic::new(i128::MIN);
    assert_eq!(signed.fetch_sub(1, AcqRel), i128::MIN);
    assert_eq!(signed.fetch_or(1, Relaxed), i128::MAX);
    assert_eq!(signed.into_inner(), i128::MAX);

    let f = Atomic::new(1.5f32);
    assert_eq!(f.fetch_add(1.0, SeqCst), 1.5);
    assert_eq!(f.fetch_sub(0.5, SeqCst), 2.5);
    assert_eq!(f.load(SeqCst), 2.0);
}

#[test]
fn swap_and_debug() {
    use MemoryOrder::*;

    let a = Atomic::from('x');
    assert_eq!(a.swap('y', AcqRel), 'x');
    assert_eq!(format!("{a:?}"), "Atomic('y')");
    assert_eq!(Atomic::<i64>::default().into_inner(), 0);
}

// The upgrade step of a weak reference: take a strong count, but only while
// it is still non-zero.
#[test]
fn increment_if_nonzero() {
    use std::thread;
    use MemoryOrder::*;

    fn try_retain(strong: &Atomic<usize>) -> bool {
        let mut n = strong.load(Relaxed);
        loop {
            if n == 0 {
                return false;
            }
            match strong.compare_exchange_weak(n, n + 1, Acquire) {
                Ok(_) => return true,
                Err(actual) => n = actual,
            }
        }
    }

    let strong = Atomic::new(1usize);
    let retained = Atomic::new(0usize);
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..1_000 {
                    if try_retain(&strong) {
                        retained.fetch_add(1, Relaxed);
                        strong.fetch_sub(1, Release);
                    }
                }
            });
        }
        // Drop the last strong reference while the others race.
        strong.fetch_sub(1, Release);
    });

    assert_eq!(strong.load(Acquire), 0);
    assert!(!try_retain(&strong));
    assert!(retained.load(Relaxed) <= 4_000);
}
