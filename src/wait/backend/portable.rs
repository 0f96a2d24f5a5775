use super::WaitBackend;
use atomic_wait::{wait, wake_all, wake_one};
use std::sync::atomic::AtomicU32;

/// Whatever `atomic-wait` uses on this target (`_umtx_op` on FreeBSD, for
/// example). Only 32-bit words.
pub(crate) struct Portable;

impl WaitBackend for Portable {
    const WAITABLE_SIZES: &'static [usize] = &[4];

    unsafe fn wait_on_address(addr: *const u8, expected: u64, size: usize) {
        debug_assert_eq!(size, 4);
        wait(&*(addr as *const AtomicU32), expected as u32);
    }

    unsafe fn notify_one(addr: *const u8, size: usize) {
        debug_assert_eq!(size, 4);
        wake_one(addr as *const AtomicU32);
    }

    unsafe fn notify_all(addr: *const u8, size: usize) {
        debug_assert_eq!(size, 4);
        wake_all(addr as *const AtomicU32);
    }
}
