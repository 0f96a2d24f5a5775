//! OS primitives that park a thread on a memory word.
//!
//! Exactly one backend is compiled in, chosen by target OS, and exported as
//! [`Platform`]. None of them report errors: an interrupted or failed wait
//! is indistinguishable from a spurious wakeup, and callers re-check the
//! value either way.

/// Park and wake on an address.
pub(crate) trait WaitBackend {
    /// Word sizes, in bytes, the OS can compare and wait on directly.
    /// Always includes 4.
    const WAITABLE_SIZES: &'static [usize];

    /// Blocks while the `size` bytes at `addr` equal the low `size` bytes of
    /// `expected`, until woken by a notify on `addr`. May return early.
    ///
    /// # Safety
    ///
    /// `addr` must point to a live atomic word of `size` bytes, aligned to
    /// `size`, and `size` must be one of `WAITABLE_SIZES`.
    unsafe fn wait_on_address(addr: *const u8, expected: u64, size: usize);

    /// # Safety
    ///
    /// Same requirements on `addr` and `size` as `wait_on_address`.
    unsafe fn notify_one(addr: *const u8, size: usize);

    /// # Safety
    ///
    /// Same requirements on `addr` and `size` as `wait_on_address`.
    unsafe fn notify_all(addr: *const u8, size: usize);
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod linux;
        pub(crate) use self::linux::Futex as Platform;
    } else if #[cfg(windows)] {
        mod windows;
        pub(crate) use self::windows::WaitOnAddress as Platform;
    } else if #[cfg(target_vendor = "apple")] {
        mod apple;
        pub(crate) use self::apple::OsSync as Platform;
    } else {
        mod portable;
        pub(crate) use self::portable::Portable as Platform;
    }
}

#[test]
fn notify_without_waiters_is_harmless() {
    use std::sync::atomic::AtomicU32;

    let word = AtomicU32::new(0);
    let addr = &word as *const AtomicU32 as *const u8;
    unsafe {
        Platform::notify_one(addr, 4);
        Platform::notify_all(addr, 4);
    }
}

#[test]
fn wait_returns_when_value_differs() {
    use std::sync::atomic::AtomicU32;

    let word = AtomicU32::new(7);
    let addr = &word as *const AtomicU32 as *const u8;
    // The OS compares before sleeping, so a mismatch returns at once.
    unsafe { Platform::wait_on_address(addr, 8, 4) };
}

#[test]
fn wake_reaches_a_parked_thread() {
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering::{Acquire, Release};
    use std::thread;
    use std::time::Duration;

    let word = AtomicU32::new(0);
    let addr = &word as *const AtomicU32 as usize;
    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(100));
            word.store(1, Release);
            unsafe { Platform::notify_one(addr as *const u8, 4) };
        });
        while word.load(Acquire) == 0 {
            unsafe { Platform::wait_on_address(addr as *const u8, 0, 4) };
        }
    });
}
