//! Compile-time classification of value sizes: which word a value is stored
//! in, how that storage is aligned, whether it is lock-free and whether the
//! OS can wait on it directly.

use crate::wait::backend::{Platform, WaitBackend};

/// A 16-byte compare-exchange is available to every binary built for this
/// target, without runtime detection. Must agree with the `wide_word!`
/// selection in `storage.rs`.
pub(crate) const WIDE_LOCK_FREE: bool = cfg!(any(
    target_arch = "aarch64",
    all(target_arch = "x86_64", target_feature = "cmpxchg16b")
));

/// Largest size, in bytes, that this target operates on without a lock.
pub const MAX_LOCK_FREE_SIZE: usize = if WIDE_LOCK_FREE {
    16
} else if cfg!(target_has_atomic = "64") {
    8
} else {
    4
};

/// Distance, in bytes, two independently written atomics should keep to
/// avoid false sharing.
#[cfg(any(target_arch = "aarch64", target_arch = "powerpc64"))]
pub const DESTRUCTIVE_INTERFERENCE_SIZE: usize = 128;
#[cfg(target_arch = "x86")]
pub const DESTRUCTIVE_INTERFERENCE_SIZE: usize = 32;
#[cfg(not(any(target_arch = "aarch64", target_arch = "powerpc64", target_arch = "x86")))]
pub const DESTRUCTIVE_INTERFERENCE_SIZE: usize = 64;

/// Size of the word a value of `size` bytes is stored in: the next power of
/// two, or `size` itself once it is past [`MAX_LOCK_FREE_SIZE`].
pub const fn word_size(size: usize) -> usize {
    if size > MAX_LOCK_FREE_SIZE {
        size
    } else {
        size.next_power_of_two()
    }
}

/// Alignment of the storage for a value with the given size and natural
/// alignment.
///
/// Values that fit a lock-free word are aligned to the word, which is what
/// lets the CPU operate on them atomically (a `[u8; 8]` has alignment 1 but
/// still needs an 8-byte-aligned slot for a 64-bit CAS). Larger values keep
/// their own alignment.
pub const fn storage_align(size: usize, align: usize) -> usize {
    if size > MAX_LOCK_FREE_SIZE {
        align
    } else {
        let word = word_size(size);
        if word > align {
            word
        } else {
            align
        }
    }
}

pub const fn is_always_lock_free(size: usize) -> bool {
    size <= MAX_LOCK_FREE_SIZE
}

/// Whether the compiled-in wait backend can block on a word of this size
/// without going through the contention table.
pub const fn natively_waitable(size: usize) -> bool {
    let sizes = <Platform as WaitBackend>::WAITABLE_SIZES;
    let mut i = 0;
    while i < sizes.len() {
        if sizes[i] == size {
            return true;
        }
        i += 1;
    }
    false
}

#[test]
fn word_sizes_round_up_to_powers_of_two() {
    assert_eq!(word_size(1), 1);
    assert_eq!(word_size(3), 4);
    assert_eq!(word_size(5), 8);
    assert_eq!(word_size(8), 8);
    assert_eq!(word_size(MAX_LOCK_FREE_SIZE + 1), MAX_LOCK_FREE_SIZE + 1);
}

#[test]
fn alignment_follows_word_until_oversized() {
    assert_eq!(storage_align(1, 1), 1);
    assert_eq!(storage_align(3, 1), 4);
    assert_eq!(storage_align(8, 1), 8);
    assert_eq!(storage_align(4, 4), 4);
    // Past the lock-free limit only the value's own alignment matters.
    assert_eq!(storage_align(MAX_LOCK_FREE_SIZE + 1, 1), 1);
    assert_eq!(storage_align(4 * MAX_LOCK_FREE_SIZE, 8), 8);
}

#[test]
fn wide_words_agree_with_portable_atomic() {
    use portable_atomic::AtomicU128;

    assert_eq!(AtomicU128::is_always_lock_free(), WIDE_LOCK_FREE);
}

#[test]
fn lock_free_limit_is_a_supported_word() {
    assert!(matches!(MAX_LOCK_FREE_SIZE, 4 | 8 | 16));
    assert!(is_always_lock_free(MAX_LOCK_FREE_SIZE));
    assert!(!is_always_lock_free(MAX_LOCK_FREE_SIZE + 1));
}

#[test]
fn four_byte_words_are_waitable_everywhere() {
    // The contention table parks on a u32, so every backend has to take one.
    assert!(natively_waitable(4));
    assert!(!natively_waitable(3));
    assert!(!natively_waitable(16));
}
