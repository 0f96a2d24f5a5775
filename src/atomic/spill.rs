use super::ops::{sealed, IntWord, RawWord};
use bytemuck::NoUninit;
use std::cell::UnsafeCell;
use std::hint::spin_loop;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release, SeqCst};
use std::sync::atomic::{fence, AtomicBool, Ordering};
use std::thread;

/// Word for values larger than any lock-free atomic on this target.
///
/// The value is stored as is, at its own alignment, and every operation on
/// it takes one of a fixed set of global spin-locks chosen by address.
/// Nothing here is lock-free, but the operations are still atomic with
/// respect to each other and waiting works through the contention table.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct Spill<T>(pub T);

pub struct SpillCell<T> {
    value: UnsafeCell<T>,
}

// Safety: every access to `value` goes through the stripe lock for its address.
unsafe impl<T: Send> Sync for SpillCell<T> {}

impl<T: NoUninit + Send + Sync> sealed::Sealed for Spill<T> {}

impl<T: NoUninit + Send + Sync> RawWord for Spill<T> {
    type Cell = SpillCell<T>;

    const ALWAYS_LOCK_FREE: bool = false;
    const NATIVE_WAIT: bool = false;

    fn new_cell(self) -> SpillCell<T> {
        SpillCell {
            value: UnsafeCell::new(self.0),
        }
    }

    fn into_word(cell: SpillCell<T>) -> Self {
        Spill(cell.value.into_inner())
    }

    fn cell_ptr(cell: &SpillCell<T>) -> *const u8 {
        cell.value.get() as *const u8
    }

    fn is_lock_free() -> bool {
        false
    }

    fn same(self, other: Self) -> bool {
        bytemuck::bytes_of(&self.0) == bytemuck::bytes_of(&other.0)
    }

    fn wait_bits(self) -> u64 {
        0
    }

    fn load(cell: &SpillCell<T>, order: Ordering) -> Self {
        let _guard = stripe(cell).lock(order);
        // Safety: the stripe lock is held.
        Spill(unsafe { *cell.value.get() })
    }

    fn store(cell: &SpillCell<T>, word: Self, order: Ordering) {
        let _guard = stripe(cell).lock(order);
        unsafe { *cell.value.get() = word.0 };
    }

    fn swap(cell: &SpillCell<T>, word: Self, order: Ordering) -> Self {
        Self::update(cell, order, |_| word.0)
    }

    fn compare_exchange(
        cell: &SpillCell<T>,
        current: Self,
        new: Self,
        success: Ordering,
        _failure: Ordering,
    ) -> Result<Self, Self> {
        let _guard = stripe(cell).lock(success);
        let previous = Spill(unsafe { *cell.value.get() });
        if previous.same(current) {
            unsafe { *cell.value.get() = new.0 };
            Ok(previous)
        } else {
            Err(previous)
        }
    }

    // The lock makes the comparison exact, so there is nothing to gain from
    // failing spuriously.
    fn compare_exchange_weak(
        cell: &SpillCell<T>,
        current: Self,
        new: Self,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self, Self> {
        Self::compare_exchange(cell, current, new, success, failure)
    }
}

impl<T: NoUninit + Send + Sync> Spill<T> {
    /// Replaces the value with `f` of it under the stripe lock and returns
    /// the previous value.
    fn update(cell: &SpillCell<T>, order: Ordering, f: impl FnOnce(T) -> T) -> Self {
        let _guard = stripe(cell).lock(order);
        // Safety: the stripe lock is held.
        unsafe {
            let previous = *cell.value.get();
            *cell.value.get() = f(previous);
            Spill(previous)
        }
    }
}

// Where 16-byte values spill, `u128` and `i128` still get their arithmetic.
impl IntWord for Spill<u128> {
    fn fetch_add(cell: &SpillCell<u128>, word: Self, order: Ordering) -> Self {
        Self::update(cell, order, |v| v.wrapping_add(word.0))
    }

    fn fetch_sub(cell: &SpillCell<u128>, word: Self, order: Ordering) -> Self {
        Self::update(cell, order, |v| v.wrapping_sub(word.0))
    }

    fn fetch_and(cell: &SpillCell<u128>, word: Self, order: Ordering) -> Self {
        Self::update(cell, order, |v| v & word.0)
    }

    fn fetch_or(cell: &SpillCell<u128>, word: Self, order: Ordering) -> Self {
        Self::update(cell, order, |v| v | word.0)
    }

    fn fetch_xor(cell: &SpillCell<u128>, word: Self, order: Ordering) -> Self {
        Self::update(cell, order, |v| v ^ word.0)
    }
}

struct Stripe {
    locked: AtomicBool,
}

struct StripeGuard {
    stripe: &'static Stripe,
    seq_cst: bool,
}

impl Stripe {
    /// Acquiring and releasing the lock gives every operation acquire and
    /// release semantics. SeqCst additionally gets full fences on both sides
    /// so it joins the single total order of SeqCst operations.
    fn lock(&'static self, order: Ordering) -> StripeGuard {
        let mut spins = 0u32;
        // Spin on a plain load so waiting threads don't keep stealing the
        // cache line from the holder.
        while self.locked.swap(true, Acquire) {
            while self.locked.load(Relaxed) {
                if spins < 100 {
                    spins += 1;
                    spin_loop();
                } else {
                    thread::yield_now();
                }
            }
        }
        let seq_cst = order == SeqCst;
        if seq_cst {
            fence(SeqCst);
        }
        StripeGuard {
            stripe: self,
            seq_cst,
        }
    }
}

impl Drop for StripeGuard {
    fn drop(&mut self) {
        if self.seq_cst {
            fence(SeqCst);
        }
        self.stripe.locked.store(false, Release);
    }
}

fn stripe<T>(cell: &SpillCell<T>) -> &'static Stripe {
    // A prime number of stripes, so values laid out at a regular stride still
    // spread over all of them.
    const LEN: usize = 97;
    #[allow(clippy::declare_interior_mutable_const)]
    const UNLOCKED: Stripe = Stripe {
        locked: AtomicBool::new(false),
    };
    static STRIPES: [Stripe; LEN] = [UNLOCKED; LEN];

    &STRIPES[cell.value.get() as usize % LEN]
}

#[test]
fn spill_ops_are_exact() {
    let cell = Spill([1u64, 2, 3]).new_cell();
    let read = Spill::load(&cell, SeqCst);
    assert_eq!(read.0, [1, 2, 3]);

    assert!(Spill::compare_exchange_weak(&cell, Spill([0, 0, 0]), Spill([4, 5, 6]), SeqCst, SeqCst)
        .is_err());
    assert!(Spill::compare_exchange_weak(&cell, Spill([1, 2, 3]), Spill([4, 5, 6]), SeqCst, SeqCst)
        .is_ok());
    assert_eq!(Spill::swap(&cell, Spill([7, 8, 9]), Relaxed).0, [4, 5, 6]);
    assert_eq!(Spill::into_word(cell).0, [7, 8, 9]);
}

#[test]
fn spilled_integers_wrap() {
    let cell = Spill(u128::MAX).new_cell();
    assert_eq!(Spill::fetch_add(&cell, Spill(2), SeqCst).0, u128::MAX);
    assert_eq!(Spill::fetch_sub(&cell, Spill(2), Relaxed).0, 1);
    assert_eq!(Spill::fetch_xor(&cell, Spill(1 << 100), Relaxed).0, u128::MAX);
    assert_eq!(Spill::into_word(cell).0, u128::MAX ^ (1 << 100));
}

#[test]
fn spill_is_never_torn() {
    let cell = Spill([0u64; 4]).new_cell();
    thread::scope(|s| {
        for i in 1..=4u64 {
            let cell = &cell;
            s.spawn(move || {
                for _ in 0..10_000 {
                    Spill::store(cell, Spill([i; 4]), Release);
                }
            });
        }
        for _ in 0..10_000 {
            let Spill(v) = Spill::load(&cell, Acquire);
            assert!(v.iter().all(|&x| x == v[0]), "torn read {v:?}");
        }
    });
}
