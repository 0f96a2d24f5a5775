use super::WaitBackend;
use std::ffi::{c_int, c_void};

// From <os/os_sync_wait_on_address.h>, macOS 14.4 / iOS 17.4.
const OS_SYNC_WAIT_ON_ADDRESS_NONE: u32 = 0;
const OS_SYNC_WAKE_BY_ADDRESS_NONE: u32 = 0;

extern "C" {
    fn os_sync_wait_on_address(addr: *mut c_void, value: u64, size: usize, flags: u32) -> c_int;
    fn os_sync_wake_by_address_any(addr: *mut c_void, size: usize, flags: u32) -> c_int;
    fn os_sync_wake_by_address_all(addr: *mut c_void, size: usize, flags: u32) -> c_int;
}

/// `os_sync_wait_on_address` and `os_sync_wake_by_address_*`.
pub(crate) struct OsSync;

impl WaitBackend for OsSync {
    const WAITABLE_SIZES: &'static [usize] = &[4, 8];

    unsafe fn wait_on_address(addr: *const u8, expected: u64, size: usize) {
        // Returns -1 with EINTR or EFAULT on failure; both look like a
        // spurious wakeup to the caller.
        os_sync_wait_on_address(addr as *mut c_void, expected, size, OS_SYNC_WAIT_ON_ADDRESS_NONE);
    }

    unsafe fn notify_one(addr: *const u8, size: usize) {
        // ENOENT just means nobody was waiting.
        os_sync_wake_by_address_any(addr as *mut c_void, size, OS_SYNC_WAKE_BY_ADDRESS_NONE);
    }

    unsafe fn notify_all(addr: *const u8, size: usize) {
        os_sync_wake_by_address_all(addr as *mut c_void, size, OS_SYNC_WAKE_BY_ADDRESS_NONE);
    }
}
