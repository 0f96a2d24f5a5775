//! Word-level atomic operations.
//!
//! Every value stored in an [`Atomic`](super::Atomic) lives in a *word*: an
//! unsigned integer of 1, 2, 4, 8 or 16 bytes backed by the matching hardware
//! atomic, or a [`Spill`](super::Spill) for values too large for any of them.
//! The free functions here take a [`MemoryOrder`] and hand the operation to
//! the word's atomic type.

use super::layout;
use super::order::MemoryOrder;
use portable_atomic::AtomicU128;
use std::sync::atomic::{self, AtomicU16, AtomicU32, AtomicU64, AtomicU8, Ordering};

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// A storage word: the bit container a value is kept in, plus the atomic
/// cell type that can operate on it.
///
/// This trait is sealed. The `Word` of an [`AtomicValue`](super::AtomicValue)
/// is one of `u8`, `u16`, `u32`, `u64`, `u128` or
/// [`Spill<Self>`](super::Spill), whichever [`layout::word_size`] names.
pub trait RawWord: sealed::Sealed + Copy + Send + Sync + 'static {
    /// The in-memory cell that holds one word.
    type Cell: Send + Sync;

    /// Every operation on `Cell` compiles to lock-free instructions.
    const ALWAYS_LOCK_FREE: bool;

    /// The platform wait primitive can block on the cell's address directly.
    const NATIVE_WAIT: bool;

    fn new_cell(self) -> Self::Cell;
    fn into_word(cell: Self::Cell) -> Self;
    fn cell_ptr(cell: &Self::Cell) -> *const u8;
    fn is_lock_free() -> bool;

    /// Bitwise equality.
    fn same(self, other: Self) -> bool;

    /// The word zero-extended to 64 bits, as handed to the OS wait call.
    /// Only meaningful when `NATIVE_WAIT` holds.
    fn wait_bits(self) -> u64;

    fn load(cell: &Self::Cell, order: Ordering) -> Self;
    fn store(cell: &Self::Cell, word: Self, order: Ordering);
    fn swap(cell: &Self::Cell, word: Self, order: Ordering) -> Self;
    fn compare_exchange(
        cell: &Self::Cell,
        current: Self,
        new: Self,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self, Self>;
    fn compare_exchange_weak(
        cell: &Self::Cell,
        current: Self,
        new: Self,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self, Self>;
}

/// Integer words with native read-modify-write arithmetic.
///
/// Two's complement makes wrapping addition on the unsigned word identical
/// to wrapping addition on a signed value of the same width, so signed
/// integers use these operations too.
pub trait IntWord: RawWord {
    fn fetch_add(cell: &Self::Cell, word: Self, order: Ordering) -> Self;
    fn fetch_sub(cell: &Self::Cell, word: Self, order: Ordering) -> Self;
    fn fetch_and(cell: &Self::Cell, word: Self, order: Ordering) -> Self;
    fn fetch_or(cell: &Self::Cell, word: Self, order: Ordering) -> Self;
    fn fetch_xor(cell: &Self::Cell, word: Self, order: Ordering) -> Self;
}

macro_rules! impl_word {
    ($word:ty, $cell:ty, $always_lock_free:expr, $is_lock_free:expr) => {
        impl sealed::Sealed for $word {}

        impl RawWord for $word {
            type Cell = $cell;

            const ALWAYS_LOCK_FREE: bool = $always_lock_free;
            const NATIVE_WAIT: bool = layout::natively_waitable(std::mem::size_of::<$word>());

            #[inline]
            fn new_cell(self) -> $cell {
                <$cell>::new(self)
            }

            #[inline]
            fn into_word(cell: $cell) -> $word {
                cell.into_inner()
            }

            #[inline]
            fn cell_ptr(cell: &$cell) -> *const u8 {
                cell as *const $cell as *const u8
            }

            #[inline]
            fn is_lock_free() -> bool {
                $is_lock_free
            }

            #[inline]
            fn same(self, other: $word) -> bool {
                self == other
            }

            #[inline]
            fn wait_bits(self) -> u64 {
                self as u64
            }

            #[inline]
            fn load(cell: &$cell, order: Ordering) -> $word {
                cell.load(order)
            }

            #[inline]
            fn store(cell: &$cell, word: $word, order: Ordering) {
                cell.store(word, order)
            }

            #[inline]
            fn swap(cell: &$cell, word: $word, order: Ordering) -> $word {
                cell.swap(word, order)
            }

            #[inline]
            fn compare_exchange(
                cell: &$cell,
                current: $word,
                new: $word,
                success: Ordering,
                failure: Ordering,
            ) -> Result<$word, $word> {
                cell.compare_exchange(current, new, success, failure)
            }

            #[inline]
            fn compare_exchange_weak(
                cell: &$cell,
                current: $word,
                new: $word,
                success: Ordering,
                failure: Ordering,
            ) -> Result<$word, $word> {
                cell.compare_exchange_weak(current, new, success, failure)
            }
        }

        impl IntWord for $word {
            #[inline]
            fn fetch_add(cell: &$cell, word: $word, order: Ordering) -> $word {
                cell.fetch_add(word, order)
            }

            #[inline]
            fn fetch_sub(cell: &$cell, word: $word, order: Ordering) -> $word {
                cell.fetch_sub(word, order)
            }

            #[inline]
            fn fetch_and(cell: &$cell, word: $word, order: Ordering) -> $word {
                cell.fetch_and(word, order)
            }

            #[inline]
            fn fetch_or(cell: &$cell, word: $word, order: Ordering) -> $word {
                cell.fetch_or(word, order)
            }

            #[inline]
            fn fetch_xor(cell: &$cell, word: $word, order: Ordering) -> $word {
                cell.fetch_xor(word, order)
            }
        }
    };
}

impl_word!(u8, AtomicU8, true, true);
impl_word!(u16, AtomicU16, true, true);
impl_word!(u32, AtomicU32, true, true);
impl_word!(u64, AtomicU64, true, true);
// Only reported lock-free when the double-width CAS is known at compile
// time. Values never land in this word otherwise, see `wide_word!`.
impl_word!(u128, AtomicU128, layout::WIDE_LOCK_FREE, layout::WIDE_LOCK_FREE);

#[inline]
pub fn load<W: RawWord>(cell: &W::Cell, order: MemoryOrder) -> W {
    W::load(cell, order.for_load())
}

#[inline]
pub fn store<W: RawWord>(cell: &W::Cell, word: W, order: MemoryOrder) {
    W::store(cell, word, order.for_store())
}

#[inline]
pub fn exchange<W: RawWord>(cell: &W::Cell, word: W, order: MemoryOrder) -> W {
    W::swap(cell, word, order.for_rmw())
}

/// Never fails when the cell holds `current`. On failure returns the value
/// that was actually there.
#[inline]
pub fn compare_exchange_strong<W: RawWord>(
    cell: &W::Cell,
    current: W,
    new: W,
    success: MemoryOrder,
    failure: MemoryOrder,
) -> Result<W, W> {
    let (success, failure) = MemoryOrder::for_cas(success, failure);
    W::compare_exchange(cell, current, new, success, failure)
}

/// Like [`compare_exchange_strong`] but allowed to fail spuriously, which
/// lets LL/SC architectures skip their internal retry loop. Meant for
/// callers that already loop.
#[inline]
pub fn compare_exchange_weak<W: RawWord>(
    cell: &W::Cell,
    current: W,
    new: W,
    success: MemoryOrder,
    failure: MemoryOrder,
) -> Result<W, W> {
    let (success, failure) = MemoryOrder::for_cas(success, failure);
    W::compare_exchange_weak(cell, current, new, success, failure)
}

#[inline]
pub fn fetch_add<W: IntWord>(cell: &W::Cell, word: W, order: MemoryOrder) -> W {
    W::fetch_add(cell, word, order.for_rmw())
}

#[inline]
pub fn fetch_sub<W: IntWord>(cell: &W::Cell, word: W, order: MemoryOrder) -> W {
    W::fetch_sub(cell, word, order.for_rmw())
}

#[inline]
pub fn fetch_and<W: IntWord>(cell: &W::Cell, word: W, order: MemoryOrder) -> W {
    W::fetch_and(cell, word, order.for_rmw())
}

#[inline]
pub fn fetch_or<W: IntWord>(cell: &W::Cell, word: W, order: MemoryOrder) -> W {
    W::fetch_or(cell, word, order.for_rmw())
}

#[inline]
pub fn fetch_xor<W: IntWord>(cell: &W::Cell, word: W, order: MemoryOrder) -> W {
    W::fetch_xor(cell, word, order.for_rmw())
}

/// A memory fence between threads. A relaxed fence orders nothing and
/// compiles to nothing.
#[inline]
pub fn thread_fence(order: MemoryOrder) {
    if let Some(order) = order.for_fence() {
        atomic::fence(order);
    }
}

/// A fence that only restrains the compiler, for synchronising with a
/// signal handler running on the same thread.
#[inline]
pub fn signal_fence(order: MemoryOrder) {
    if let Some(order) = order.for_fence() {
        atomic::compiler_fence(order);
    }
}

#[test]
fn word_ops_follow_std_semantics() {
    use MemoryOrder::*;

    let cell = 5u32.new_cell();
    assert_eq!(exchange::<u32>(&cell, 7, AcqRel), 5);
    assert_eq!(compare_exchange_strong::<u32>(&cell, 1, 2, SeqCst, SeqCst), Err(7));
    assert_eq!(compare_exchange_strong::<u32>(&cell, 7, 2, Release, Relaxed), Ok(7));
    assert_eq!(fetch_sub::<u32>(&cell, 3, Relaxed), 2);
    // Wraps like the hardware does.
    assert_eq!(load::<u32>(&cell, Acquire), u32::MAX);
    assert_eq!(fetch_or::<u32>(&cell, 0, Relaxed), u32::MAX);
    assert_eq!(fetch_and::<u32>(&cell, 0xF0, Relaxed), u32::MAX);
    assert_eq!(fetch_xor::<u32>(&cell, 0xFF, Relaxed), 0xF0);
    assert_eq!(u32::into_word(cell), 0x0F);
}

#[test]
fn wide_words_operate_on_all_bits() {
    use MemoryOrder::*;

    let cell = (1u128 << 100).new_cell();
    assert_eq!(fetch_add::<u128>(&cell, 1, SeqCst), 1 << 100);
    store::<u128>(&cell, u128::MAX, Release);
    assert_eq!(load::<u128>(&cell, Acquire), u128::MAX);
    assert!(!<u128 as RawWord>::NATIVE_WAIT);
}

#[test]
fn fences_accept_every_order() {
    use MemoryOrder::*;

    for order in [Relaxed, Consume, Acquire, Release, AcqRel, SeqCst] {
        thread_fence(order);
        signal_fence(order);
    }
}
