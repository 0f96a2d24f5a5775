//! Side table for waiting on values the OS cannot wait on directly.
//!
//! Every address hashes to one of 64 entries. A waiter registers in the
//! entry's `waiters` count and parks on the entry's `generation` word; a
//! notifier bumps `generation` and wakes the entry's waiters. Unrelated
//! atomics can hash to the same entry, which costs them spurious wakeups but
//! nothing else, since every waiter re-checks its own value.

use super::backend::{Platform, WaitBackend};
use std::mem;
use std::sync::atomic::Ordering::{Release, SeqCst};
use std::sync::atomic::{fence, AtomicU32, AtomicUsize};

const TABLE_SIZE: usize = 64;

// Padded to a full line so notifiers on one entry don't bounce the line of
// waiters on the next.
#[cfg_attr(any(target_arch = "aarch64", target_arch = "powerpc64"), repr(align(128)))]
#[cfg_attr(target_arch = "x86", repr(align(32)))]
#[cfg_attr(
    not(any(target_arch = "aarch64", target_arch = "powerpc64", target_arch = "x86")),
    repr(align(64))
)]
pub(crate) struct ContentionEntry {
    /// Threads currently inside `wait` on this entry.
    waiters: AtomicUsize,
    /// Bumped by every notify. Waiters park on this word.
    generation: AtomicU32,
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY: ContentionEntry = ContentionEntry {
    waiters: AtomicUsize::new(0),
    generation: AtomicU32::new(0),
};

static TABLE: [ContentionEntry; TABLE_SIZE] = [EMPTY; TABLE_SIZE];

/// Bucket for an address. The low six bits are dropped since they only
/// distinguish bytes within one cache line.
pub(crate) fn bucket(addr: usize) -> usize {
    let line = addr >> 6;
    (line ^ (line >> 16)) & (TABLE_SIZE - 1)
}

pub(crate) fn entry_for(addr: *const u8) -> &'static ContentionEntry {
    &TABLE[bucket(addr as usize)]
}

impl ContentionEntry {
    /// Parks the calling thread unless `still_waiting` says the guarded value
    /// already moved on. `before_park` runs after that check and right before
    /// the OS call.
    ///
    /// The waiter counts itself in before reading `generation`, and a
    /// notifier bumps `generation` before reading the count. So either the
    /// notifier sees our registration and wakes us, or we read the bumped
    /// generation and the OS call returns at once. A notify that lands
    /// between our check and our park can't be lost.
    pub(crate) fn wait(&self, still_waiting: impl FnOnce() -> bool, before_park: impl FnOnce()) {
        self.waiters.fetch_add(1, SeqCst);
        fence(SeqCst);
        let generation = self.generation.load(SeqCst);
        if still_waiting() {
            before_park();
            // Safety: `generation` is a live, aligned u32 for the whole call.
            unsafe {
                Platform::wait_on_address(
                    self.generation_ptr(),
                    u64::from(generation),
                    mem::size_of::<AtomicU32>(),
                );
            }
        }
        self.waiters.fetch_sub(1, Release);
    }

    /// Always bumps the generation, but only goes to the OS when somebody is
    /// registered. Wakes every waiter even for a single notify: the entry is
    /// shared with unrelated atomics, and waking just one thread could pick
    /// one that waits on something else.
    pub(crate) fn notify(&self) {
        self.generation.fetch_add(1, SeqCst);
        if self.waiters.load(SeqCst) != 0 {
            // Safety: the table is static.
            unsafe { Platform::notify_all(self.generation_ptr(), mem::size_of::<AtomicU32>()) }
        }
    }

    fn generation_ptr(&self) -> *const u8 {
        &self.generation as *const AtomicU32 as *const u8
    }

    #[cfg(test)]
    pub(crate) fn waiters(&self) -> usize {
        self.waiters.load(SeqCst)
    }
}

#[test]
fn bucket_hash_matches_the_formula() {
    assert_eq!(bucket(0), 0);
    // Same cache line, same bucket.
    assert_eq!(bucket(0x1000), bucket(0x103F));
    assert_eq!(bucket(0x40), 1);
    assert_eq!(bucket(63 << 6), 63);
    assert_eq!(bucket(64 << 6), 0);
    // The high half folds into the low bits.
    assert_eq!(bucket(1 << 22), 1);
    for addr in (0..1 << 24).step_by(4099) {
        assert!(bucket(addr) < TABLE_SIZE);
    }
}

#[test]
fn entries_do_not_share_cache_lines() {
    use crate::atomic::layout::DESTRUCTIVE_INTERFERENCE_SIZE;

    assert_eq!(mem::align_of::<ContentionEntry>(), DESTRUCTIVE_INTERFERENCE_SIZE);
    assert_eq!(mem::size_of::<ContentionEntry>() % DESTRUCTIVE_INTERFERENCE_SIZE, 0);
}

#[test]
fn wait_skips_parking_when_value_moved_on() {
    let entry = &TABLE[7];
    let mut parked = false;
    entry.wait(|| false, || parked = true);
    assert!(!parked);
}

#[test]
fn stale_generation_does_not_park() {
    use std::sync::atomic::Ordering::Relaxed;

    // A notify that happens after the snapshot changes the generation, so
    // the OS call returns instead of sleeping.
    let entry = &TABLE[9];
    entry.wait(
        || true,
        || {
            entry.generation.fetch_add(1, Relaxed);
        },
    );
}
