use super::layout;
use super::ops::RawWord;
use super::spill::Spill;
use bytemuck::NoUninit;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ptr;

/// A plain-data type that can be kept in an [`Atomic`](super::Atomic).
///
/// `Word` picks the storage. It must be the word [`layout::word_size`] gives
/// for `size_of::<Self>()`: the smallest of `u8`, `u16`, `u32`, `u64`,
/// `u128` the value fits in, or [`Spill<Self>`] once the value is larger
/// than [`layout::MAX_LOCK_FREE_SIZE`]. Any other choice is rejected when
/// the `Atomic` is instantiated.
///
/// # Safety
///
/// A value is moved into its word by copying its bytes and zero-filling the
/// rest, and read back by copying those bytes out again. The implementor
/// guarantees that
///
/// * a `Spill<U>` word is `Spill<Self>`, or a spill of a same-sized `U`
///   whose every bit pattern is a valid `Self` (`i128` spills as `u128`);
/// * every word the value's own operations can produce reads back as a
///   valid `Self`. For a type that is not valid for every bit pattern this
///   rules out implementing [`AtomicAdd`](super::AtomicAdd) or
///   [`AtomicBits`](super::AtomicBits) unless the results stay valid.
///
/// ```
/// use bytemuck::NoUninit;
/// use waitable_atomics::{Atomic, AtomicValue, MemoryOrder};
///
/// #[derive(Clone, Copy, NoUninit)]
/// #[repr(C)]
/// struct Point {
///     x: i16,
///     y: i16,
/// }
///
/// // Safety: four bytes in a u32, and every Point is plain integers.
/// unsafe impl AtomicValue for Point {
///     type Word = u32;
/// }
///
/// let p = Atomic::new(Point { x: 1, y: 2 });
/// assert_eq!(p.load(MemoryOrder::Relaxed).y, 2);
/// ```
///
/// Implementing it without `unsafe` does not compile:
///
/// ```compile_fail
/// use bytemuck::NoUninit;
/// use waitable_atomics::{AtomicValue, Spill};
///
/// #[derive(Clone, Copy, NoUninit)]
/// #[repr(transparent)]
/// struct Byte(u8);
///
/// impl AtomicValue for Byte {
///     type Word = Spill<bool>;
/// }
/// ```
pub unsafe trait AtomicValue: NoUninit {
    type Word: RawWord;
}

/// Embedded storage for one value of `T`, held as its word.
///
/// The cell type of each word is aligned to the word size, so a value that
/// fits a lock-free word is stored at the alignment that word needs no matter
/// how loosely `T` itself is aligned. Bytes of the word past
/// `size_of::<T>()` are always zero, which keeps bitwise comparison of
/// words equivalent to bitwise comparison of values.
#[repr(transparent)]
pub struct AtomicStorage<T: AtomicValue> {
    cell: <T::Word as RawWord>::Cell,
    _value: PhantomData<T>,
}

struct Fits<T>(PhantomData<T>);

impl<T: AtomicValue> Fits<T> {
    const CHECK: () = {
        let size = mem::size_of::<T>();
        assert!(
            mem::size_of::<T::Word>() == layout::word_size(size),
            "atomic word is not the one layout::word_size picks for this value"
        );
        assert!(
            mem::align_of::<AtomicStorage<T>>() == layout::storage_align(size, mem::align_of::<T>()),
            "atomic storage is not aligned the way layout::storage_align says"
        );
    };
}

impl<T: AtomicValue> AtomicStorage<T> {
    pub fn new(value: T) -> Self {
        let () = Fits::<T>::CHECK;
        Self {
            cell: to_word(value).new_cell(),
            _value: PhantomData,
        }
    }

    pub fn into_inner(self) -> T {
        from_word(T::Word::into_word(self.cell))
    }

    pub(crate) fn cell(&self) -> &<T::Word as RawWord>::Cell {
        &self.cell
    }

    pub(crate) fn as_ptr(&self) -> *const u8 {
        T::Word::cell_ptr(&self.cell)
    }
}

pub(crate) fn to_word<T: AtomicValue>(value: T) -> T::Word {
    let mut word = MaybeUninit::<T::Word>::zeroed();
    // Safety: `Fits` guarantees the word has room for the value. `T` has no
    // uninitialised bytes, and every byte of the word is either a byte of
    // `value` or zero. By the `AtomicValue` contract a `Spill` payload is
    // valid for any bytes of a `T`.
    unsafe {
        ptr::copy_nonoverlapping(
            &value as *const T as *const u8,
            word.as_mut_ptr() as *mut u8,
            mem::size_of::<T>(),
        );
        word.assume_init()
    }
}

pub(crate) fn from_word<T: AtomicValue>(word: T::Word) -> T {
    // Safety: words only ever hold bytes written by `to_word` from a valid
    // `T`, or the result of an integer operation that `T` opted into.
    unsafe { ptr::read_unaligned(&word as *const T::Word as *const T) }
}

macro_rules! atomic_value {
    ($($ty:ty => $word:ty),* $(,)?) => {
        $(
            // Safety: every word below is the one `layout::word_size` picks.
            // Spills hold their own type, except `i128` in a `u128` spill.
            unsafe impl AtomicValue for $ty {
                type Word = $word;
            }
        )*
    };
}

// Storage for 9 to 16 byte values: a lock-free 16-byte word where the
// target always has one, otherwise a spill like any oversized value.
cfg_if::cfg_if! {
    if #[cfg(any(
        target_arch = "aarch64",
        all(target_arch = "x86_64", target_feature = "cmpxchg16b")
    ))] {
        macro_rules! wide_word {
            ($ty:ty) => { u128 };
        }
    } else {
        macro_rules! wide_word {
            ($ty:ty) => { Spill<$ty> };
        }
    }
}

atomic_value! {
    u8 => u8, i8 => u8, bool => u8,
    u16 => u16, i16 => u16,
    u32 => u32, i32 => u32, f32 => u32, char => u32,
    u64 => u64, i64 => u64, f64 => u64,
    // Both share one word so the spilled form keeps integer arithmetic.
    u128 => wide_word!(u128), i128 => wide_word!(u128),
}

#[cfg(target_pointer_width = "64")]
atomic_value! { usize => u64, isize => u64 }
#[cfg(target_pointer_width = "32")]
atomic_value! { usize => u32, isize => u32 }

atomic_value! {
    [u8; 1] => u8,
    [u8; 2] => u16,
    [u8; 3] => u32, [u8; 4] => u32,
    [u8; 5] => u64, [u8; 6] => u64, [u8; 7] => u64, [u8; 8] => u64,
    [u8; 9] => wide_word!([u8; 9]), [u8; 10] => wide_word!([u8; 10]),
    [u8; 11] => wide_word!([u8; 11]), [u8; 12] => wide_word!([u8; 12]),
    [u8; 13] => wide_word!([u8; 13]), [u8; 14] => wide_word!([u8; 14]),
    [u8; 15] => wide_word!([u8; 15]), [u8; 16] => wide_word!([u8; 16]),
    [u8; 17] => Spill<[u8; 17]>,
    [u8; 24] => Spill<[u8; 24]>,
    [u8; 32] => Spill<[u8; 32]>,
    [u8; 64] => Spill<[u8; 64]>,
    [u16; 2] => u32, [u16; 4] => u64,
    [u32; 2] => u64, [u32; 4] => wide_word!([u32; 4]),
    [u64; 2] => wide_word!([u64; 2]),
    [u64; 3] => Spill<[u64; 3]>,
    [u64; 4] => Spill<[u64; 4]>,
}

#[test]
fn words_are_zero_extended() {
    let word = to_word([0xABu8; 3]);
    assert_eq!(word, u32::from_ne_bytes([0xAB, 0xAB, 0xAB, 0]));
    assert_eq!(from_word::<[u8; 3]>(word), [0xAB; 3]);

    assert_eq!(to_word(true), 1u8);
    assert_eq!(to_word(-1i16), u16::MAX);
    assert_eq!(from_word::<f32>(to_word(1.5f32)), 1.5);
}

#[test]
fn storage_alignment_matches_layout() {
    fn check<T: AtomicValue>() {
        let size = mem::size_of::<T>();
        assert_eq!(
            mem::align_of::<AtomicStorage<T>>(),
            layout::storage_align(size, mem::align_of::<T>()),
            "{}",
            std::any::type_name::<T>()
        );
        assert_eq!(mem::size_of::<T::Word>(), layout::word_size(size));
    }

    check::<[u8; 1]>();
    check::<[u8; 2]>();
    check::<[u8; 3]>();
    check::<[u8; 8]>();
    check::<[u16; 4]>();
    check::<u32>();
    check::<u64>();
    check::<[u8; 9]>();
    check::<[u8; 12]>();
    check::<[u8; 16]>();
    check::<[u32; 4]>();
    check::<[u64; 2]>();
    check::<u128>();
    check::<i128>();
    check::<[u8; 17]>();
    check::<[u64; 3]>();
}

#[test]
fn mid_sized_values_follow_the_lock_free_limit() {
    // Past the limit a 12-byte array keeps its own alignment of 1 instead of
    // being padded out to a 16-byte word.
    if layout::MAX_LOCK_FREE_SIZE < 16 {
        assert_eq!(mem::align_of::<AtomicStorage<[u8; 12]>>(), 1);
        assert_eq!(mem::size_of::<AtomicStorage<[u8; 12]>>(), 12);
    } else {
        assert_eq!(mem::align_of::<AtomicStorage<[u8; 12]>>(), 16);
    }
}

// A user type that is not valid for every bit pattern, spilled as itself.
#[test]
fn user_spill_keeps_the_value_intact() {
    use crate::{Atomic, MemoryOrder::*};

    #[derive(Clone, Copy, Debug, PartialEq, bytemuck::NoUninit)]
    #[repr(C)]
    struct Flags {
        on: [bool; 20],
        id: u32,
    }

    // Safety: spilled as itself.
    unsafe impl AtomicValue for Flags {
        type Word = Spill<Flags>;
    }

    let mut on = [false; 20];
    on[3] = true;
    let a = Atomic::new(Flags { on, id: 2 });
    let loaded = a.load(SeqCst);
    assert!(loaded.on[3] && !loaded.on[4]);
    assert_eq!(loaded.id, 2);

    let next = Flags { on: [true; 20], id: 9 };
    assert_eq!(a.compare_exchange(loaded, next, AcqRel), Ok(loaded));
    assert_eq!(a.into_inner(), next);
}

#[test]
fn oversized_storage_is_not_padded() {
    assert_eq!(mem::size_of::<AtomicStorage<[u8; 17]>>(), 17);
    assert_eq!(mem::size_of::<AtomicStorage<[u64; 3]>>(), 24);
}
