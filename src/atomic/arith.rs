use super::ops::{self, IntWord, RawWord};
use super::order::MemoryOrder;
use super::storage::{from_word, to_word, AtomicValue};

type Cell<T> = <<T as AtomicValue>::Word as RawWord>::Cell;

/// Values with an atomic wrapping `+` and `-`.
pub trait AtomicAdd: AtomicValue {
    fn fetch_add(cell: &Cell<Self>, value: Self, order: MemoryOrder) -> Self;
    fn fetch_sub(cell: &Cell<Self>, value: Self, order: MemoryOrder) -> Self;
}

/// Values with atomic bitwise `&`, `|` and `^`.
pub trait AtomicBits: AtomicValue {
    fn fetch_and(cell: &Cell<Self>, value: Self, order: MemoryOrder) -> Self;
    fn fetch_or(cell: &Cell<Self>, value: Self, order: MemoryOrder) -> Self;
    fn fetch_xor(cell: &Cell<Self>, value: Self, order: MemoryOrder) -> Self;
}

macro_rules! int_arith {
    ($($ty:ty),*) => {
        $(
            impl AtomicAdd for $ty {
                #[inline]
                fn fetch_add(cell: &Cell<Self>, value: Self, order: MemoryOrder) -> Self {
                    from_word(ops::fetch_add(cell, to_word(value), order))
                }

                #[inline]
                fn fetch_sub(cell: &Cell<Self>, value: Self, order: MemoryOrder) -> Self {
                    from_word(ops::fetch_sub(cell, to_word(value), order))
                }
            }

            bit_arith!($ty);
        )*
    };
}

macro_rules! bit_arith {
    ($ty:ty) => {
        impl AtomicBits for $ty {
            #[inline]
            fn fetch_and(cell: &Cell<Self>, value: Self, order: MemoryOrder) -> Self {
                from_word(ops::fetch_and(cell, to_word(value), order))
            }

            #[inline]
            fn fetch_or(cell: &Cell<Self>, value: Self, order: MemoryOrder) -> Self {
                from_word(ops::fetch_or(cell, to_word(value), order))
            }

            #[inline]
            fn fetch_xor(cell: &Cell<Self>, value: Self, order: MemoryOrder) -> Self {
                from_word(ops::fetch_xor(cell, to_word(value), order))
            }
        }
    };
}

int_arith!(u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, usize, isize);

// `true` is stored as 1 and `false` as 0, and and/or/xor keep it that way.
bit_arith!(bool);

/// Floating point add has no instruction of its own, so it retries a
/// compare-exchange on the bit pattern until no other thread got in between.
fn float_rmw<T, W, F>(cell: &W::Cell, order: MemoryOrder, f: F) -> T
where
    T: AtomicValue<Word = W>,
    W: IntWord,
    F: Fn(T) -> T,
{
    let mut current = ops::load::<W>(cell, MemoryOrder::Relaxed);
    loop {
        let new = to_word(f(from_word::<T>(current)));
        match ops::compare_exchange_weak(cell, current, new, order, order.failure()) {
            Ok(previous) => return from_word(previous),
            Err(actual) => current = actual,
        }
    }
}

macro_rules! float_arith {
    ($($ty:ty),*) => {
        $(
            impl AtomicAdd for $ty {
                fn fetch_add(cell: &Cell<Self>, value: Self, order: MemoryOrder) -> Self {
                    float_rmw::<$ty, <$ty as AtomicValue>::Word, _>(cell, order, |x| x + value)
                }

                fn fetch_sub(cell: &Cell<Self>, value: Self, order: MemoryOrder) -> Self {
                    float_rmw::<$ty, <$ty as AtomicValue>::Word, _>(cell, order, |x| x - value)
                }
            }
        )*
    };
}

float_arith!(f32, f64);

#[test]
fn signed_add_wraps_like_the_integer() {
    use MemoryOrder::Relaxed;

    let cell = to_word(i8::MAX).new_cell();
    assert_eq!(<i8 as AtomicAdd>::fetch_add(&cell, 1, Relaxed), i8::MAX);
    assert_eq!(from_word::<i8>(ops::load(&cell, Relaxed)), i8::MIN);
    assert_eq!(<i8 as AtomicAdd>::fetch_sub(&cell, 1, Relaxed), i8::MIN);
    assert_eq!(from_word::<i8>(ops::load(&cell, Relaxed)), i8::MAX);
}

#[test]
fn float_add_accumulates() {
    use std::thread;
    use MemoryOrder::{AcqRel, Acquire};

    let cell = to_word(0.0f64).new_cell();
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..1000 {
                    <f64 as AtomicAdd>::fetch_add(&cell, 0.5, AcqRel);
                }
            });
        }
    });
    assert_eq!(from_word::<f64>(ops::load(&cell, Acquire)), 2000.0);
}
