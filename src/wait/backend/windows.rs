use super::WaitBackend;
use std::ffi::c_void;
use windows_sys::Win32::System::Threading::{
    WaitOnAddress as OsWaitOnAddress, WakeByAddressAll, WakeByAddressSingle, INFINITE,
};

/// `WaitOnAddress` and `WakeByAddress*`, available since Windows 8.
pub(crate) struct WaitOnAddress;

impl WaitBackend for WaitOnAddress {
    const WAITABLE_SIZES: &'static [usize] = &[1, 2, 4, 8];

    unsafe fn wait_on_address(addr: *const u8, expected: u64, size: usize) {
        // The OS compares `size` bytes at each address. Windows targets are
        // little-endian, so the low bytes of `expected` come first.
        let expected = expected.to_le_bytes();
        OsWaitOnAddress(
            addr as *const c_void,
            expected.as_ptr() as *const c_void,
            size,
            INFINITE,
        );
    }

    unsafe fn notify_one(addr: *const u8, _size: usize) {
        WakeByAddressSingle(addr as *const c_void);
    }

    unsafe fn notify_all(addr: *const u8, _size: usize) {
        WakeByAddressAll(addr as *const c_void);
    }
}
