use core::ptr::NonNull;

/// Where the heap manager obtains raw memory when the free list runs dry.
///
/// The returned region must be readable, writable, zero-filled, process
/// private, and at least page aligned. There is no unmapping counterpart:
/// memory handed to the heap manager stays committed for the life of the
/// process.
///
/// Failure is not survivable. An implementation that cannot produce the
/// requested region must terminate the process with a non-zero exit status
/// rather than return; the allocator has already committed to handing out a
/// pointer by the time the source is consulted.
pub trait MemorySource {
    /// Obtain exactly `size` bytes of fresh memory, or never return.
    fn map(&mut self, size: usize) -> NonNull<u8>;
}

/// The standard source: anonymous private [`libc::mmap`].
///
/// Maps pages at an OS-chosen address. On failure the mapping error is logged
/// and the process exits with status 1.
pub struct MmapSource;

impl MemorySource for MmapSource {
    fn map(&mut self, size: usize) -> NonNull<u8> {
        let base = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if base == libc::MAP_FAILED {
            log::error!("mmap of {} bytes failed: {}", size, std::io::Error::last_os_error());
            std::process::exit(1);
        }

        // MAP_FAILED is the only null-adjacent sentinel mmap returns
        unsafe { NonNull::new_unchecked(base.cast()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_is_zeroed_and_writable() {
        let size = 2 * 4096;
        let base = MmapSource.map(size);

        unsafe {
            let bytes = core::slice::from_raw_parts_mut(base.as_ptr(), size);
            assert!(bytes.iter().all(|&b| b == 0));
            bytes[0] = 0xab;
            bytes[size - 1] = 0xcd;
            assert_eq!(bytes[0], 0xab);
        }
    }

    #[test]
    fn mappings_are_page_aligned() {
        let base = MmapSource.map(4096);
        assert_eq!(base.as_ptr() as usize % 4096, 0);
    }
}
