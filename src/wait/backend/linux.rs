use super::WaitBackend;
use std::ptr;

/// `futex(2)`. Only 32-bit words.
pub(crate) struct Futex;

impl WaitBackend for Futex {
    const WAITABLE_SIZES: &'static [usize] = &[4];

    unsafe fn wait_on_address(addr: *const u8, expected: u64, size: usize) {
        debug_assert_eq!(size, 4);
        // Refer to the futex (2) man page for the syscall signature.
        // The private variants skip the cross-process lookup, since every
        // word we wait on lives in this process.
        libc::syscall(
            libc::SYS_futex,
            addr as *const u32,
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected as u32,
            ptr::null::<libc::timespec>(), // No timeout.
        );
    }

    unsafe fn notify_one(addr: *const u8, size: usize) {
        debug_assert_eq!(size, 4);
        libc::syscall(
            libc::SYS_futex,
            addr as *const u32,
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            1, // The number of threads to wake up.
        );
    }

    unsafe fn notify_all(addr: *const u8, size: usize) {
        debug_assert_eq!(size, 4);
        libc::syscall(
            libc::SYS_futex,
            addr as *const u32,
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            i32::MAX,
        );
    }
}
