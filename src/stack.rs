//! Stack-pointer capture for the conservative scanner.

/// Returns an address at or below every live stack frame of the calling
/// thread at the point of the call.
///
/// On the supported architectures this reads the stack pointer directly; the
/// fallback takes the address of a fresh local, which on a down-growing stack
/// is below every caller frame.
#[inline(never)]
pub fn current_sp() -> *const u8 {
    #[cfg(target_arch = "x86_64")]
    {
        let sp: usize;
        unsafe { core::arch::asm!("mov {}, rsp", out(reg) sp, options(nomem, nostack)) };
        sp as *const u8
    }

    #[cfg(target_arch = "aarch64")]
    {
        let sp: usize;
        unsafe { core::arch::asm!("mov {}, sp", out(reg) sp, options(nomem, nostack)) };
        sp as *const u8
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        let probe: usize = 0;
        core::ptr::addr_of!(probe).cast()
    }
}
