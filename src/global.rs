//! The process-wide runtime surface.
//!
//! A host runtime that wants one collector for the whole process calls
//! [`init`] once near the bottom of its call tree and then allocates through
//! [`alloc`] everywhere. Both operate on a single [`Calxk`]-wrapped
//! [`Calx`] drawing from [`MmapSource`].

use core::ptr::NonNull;

use crate::{stack, Calx, Calxk, MmapSource};

/// Bytes added to the stack pointer observed inside [`init`] when recording
/// the scan boundary, so the scanner skips `init`'s own frame temporaries.
const STACK_BIAS: usize = 32;

static RUNTIME: Calxk<spin::Mutex<()>, MmapSource> = Calx::new(MmapSource).lock();

/// Record the mutator stack boundary.
///
/// Call exactly once, from a frame at or below every frame that will later
/// allocate: the stack pointer observed here, plus a small bias, becomes the
/// upper bound of every conservative scan.
///
/// # Safety
/// * Every subsequent [`alloc`] and [`collect`] call must happen above this
///   frame on the same thread's stack.
/// * Must not be called more than once.
#[inline(never)]
pub unsafe fn init() {
    let bound = stack::current_sp().add(STACK_BIAS);
    RUNTIME.lock().set_stack_bound(bound);
}

/// Allocate `size` bytes of managed memory from the process-wide collector.
///
/// Never returns null; the process exits if the OS refuses memory. May run a
/// collection cycle first.
///
/// # Safety
/// As for [`Calx::alloc`]: the returned payload address must stay visible on
/// the scanned stack (or inside a reachable payload) while the memory is in
/// use, and the call must come from above the [`init`] frame. Not reentrant;
/// signal handlers must not allocate.
pub unsafe fn alloc(size: usize) -> NonNull<u8> {
    RUNTIME.lock().alloc(size)
}

/// Force a full collection cycle on the process-wide collector.
///
/// # Safety
/// As for [`Calx::collect`].
pub unsafe fn collect() {
    RUNTIME.lock().collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_runtime_serves_memory() {
        unsafe {
            init();

            let p = alloc(24);
            p.as_ptr().write_bytes(0x42, 24);
            assert_eq!(*p.as_ptr().add(23), 0x42);

            let q = alloc(8);
            assert_ne!(p.as_ptr(), q.as_ptr());
        }
    }
}
