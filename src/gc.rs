//! The heap manager: allocation, conservative marking, sweeping.

use core::ptr::{null_mut, NonNull};

use crate::counters::Counters;
use crate::free_list::{FreeList, FreeSpans};
use crate::header::{payload_of, AllocHeader, FreeHeader, ALLOC_HEADER_SIZE, FREE_HEADER_SIZE};
use crate::ptr_utils::{align_down, align_up, WORD_SIZE};
use crate::source::MemorySource;
use crate::span::Span;
use crate::{stack, MINIMUM_BLOCK_SIZE, MINIMUM_THRESHOLD};

/// The Calx collector.
///
/// One value owns the entire managed heap: the allocation list, the free
/// list, the collection trigger, and the memory source it draws fresh pages
/// from. The host runtime threads it through wherever allocation happens;
/// a process-wide singleton behind a lock lives in the `global` module.
///
/// One way to get started:
/// 1. Construct with [`new`](Calx::new) (supply [`MmapSource`] to draw from
///    the OS).
/// 2. Record the scan boundary with [`set_stack_bound`](Calx::set_stack_bound).
/// 3. Serve the runtime's requests with [`alloc`](Calx::alloc).
///
/// Reclamation is automatic: once enough bytes have been handed out, the next
/// [`alloc`](Calx::alloc) scans the mutator stack for words that look like
/// payload addresses, marks the transitive closure, and sweeps the rest back
/// onto the free list.
///
/// [`MmapSource`]: crate::MmapSource
pub struct Calx<M: MemorySource> {
    /// Head of the allocation list: every live, not-yet-reclaimed span.
    alloc_head: *mut AllocHeader,
    /// The free list, address ordered and eagerly coalesced.
    free: FreeList,

    /// Oldest address of the mutator stack region to scan. Written once.
    stack_bound: *const u8,

    /// Bytes handed out since the last sweep. Signed: sweeping survivors of
    /// an earlier accounting period legitimately drives it negative.
    bytes_allocated: isize,
    /// `bytes_allocated` level at which the next allocation collects first.
    trigger_threshold: isize,

    /// Allocation and collection stats.
    counters: Counters,

    /// Where fresh memory comes from when the free list has no fit.
    ///
    /// Its state is entirely maintained by the implementation.
    pub source: M,
}

unsafe impl<M: Send + MemorySource> Send for Calx<M> {}

impl<M: MemorySource> core::fmt::Debug for Calx<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Calx")
            .field("alloc_head", &self.alloc_head)
            .field("free_list_len", &self.free.len())
            .field("stack_bound", &self.stack_bound)
            .field("bytes_allocated", &self.bytes_allocated)
            .field("trigger_threshold", &self.trigger_threshold)
            .finish()
    }
}

impl<M: MemorySource> Calx<M> {
    /// Returns a new collector with an empty heap.
    ///
    /// No memory is mapped until the first allocation.
    pub const fn new(source: M) -> Self {
        Self {
            alloc_head: null_mut(),
            free: FreeList::new(),
            stack_bound: core::ptr::null(),
            bytes_allocated: 0,
            trigger_threshold: MINIMUM_THRESHOLD as isize,
            counters: Counters::new(),
            source,
        }
    }

    /// Records the oldest end of the mutator stack region to scan.
    ///
    /// On a down-growing stack this is the highest stack address still
    /// belonging to the mutator; the mark phase scans from the collector's
    /// own stack position up to it. With no bound recorded, collection marks
    /// nothing and every allocation is considered unreachable.
    ///
    /// # Safety
    /// Every address between any later mutator stack pointer and `bound`
    /// must remain readable for the life of this value.
    pub unsafe fn set_stack_bound(&mut self, bound: *const u8) {
        self.stack_bound = bound;
    }

    pub fn stack_bound(&self) -> *const u8 {
        self.stack_bound
    }

    /// Allocate `payload_size` bytes of managed memory.
    ///
    /// The payload is zero filled when it comes from a fresh mapping and
    /// carries stale bytes when it reuses swept memory. Never returns null:
    /// if the OS cannot supply memory the process exits.
    ///
    /// May first run a full collection cycle, reclaiming every managed
    /// allocation whose payload address is not visible in the scanned stack
    /// range.
    ///
    /// # Safety
    /// * The caller must keep the returned payload address visible as a word
    ///   somewhere in the scanned stack range (or inside a reachable payload)
    ///   for as long as the memory is in use; conservative marking recognizes
    ///   exact payload addresses only, not interior pointers.
    /// * Must not be called from a signal handler or reentrantly from a
    ///   collection.
    pub unsafe fn alloc(&mut self, payload_size: usize) -> NonNull<u8> {
        let need = payload_size + ALLOC_HEADER_SIZE;

        if self.bytes_allocated > self.trigger_threshold {
            self.collect();
        }

        // accounted before the search so the running total reflects demand
        self.bytes_allocated += need as isize;
        self.counters.account_alloc(need);

        let (span, prev) = match self.free.find_fit(need) {
            Some(fit) => fit,
            None => {
                let mapped = need.max(MINIMUM_BLOCK_SIZE);
                let base = self.source.map(mapped);

                let fresh = base.as_ptr().cast::<FreeHeader>();
                fresh.write(FreeHeader { size: mapped - FREE_HEADER_SIZE, next: null_mut() });
                self.free.insert(fresh);

                // insertion may have absorbed the fresh span into a lower
                // neighbor, so re-derive by containment rather than identity
                match self.free.locate(base.as_ptr().cast_const()) {
                    Some(fit) => fit,
                    None => unreachable!("fresh mapping missing from the free list"),
                }
            }
        };

        let block = if (*span).size > need {
            self.free.split(span, need).cast::<AllocHeader>()
        } else {
            self.free.remove(span, prev);
            span.cast::<AllocHeader>()
        };

        block.write(AllocHeader { mark: 0, size: payload_size, next: self.alloc_head });
        self.alloc_head = block;

        NonNull::new_unchecked(payload_of(block))
    }

    /// Run a full collection cycle against the mutator stack.
    ///
    /// Scans from the current stack pointer up to the recorded bound.
    ///
    /// # Safety
    /// Every managed payload used after this call must be reachable from a
    /// word in the scanned range. The stack region between the current stack
    /// pointer and the recorded bound must be readable.
    pub unsafe fn collect(&mut self) {
        self.collect_range(stack::current_sp(), self.stack_bound);
    }

    /// Run a full collection cycle against an explicit root range.
    ///
    /// `[low, high)` is scanned word by word (ends brought to word alignment
    /// inward) and each word treated as a candidate payload address. This is
    /// the primitive beneath [`collect`](Calx::collect); embedders with their
    /// own root discovery can drive it directly.
    ///
    /// # Safety
    /// * The aligned `[low, high)` range must be readable.
    /// * Every managed payload used after this call must be reachable from a
    ///   word in the range.
    pub unsafe fn collect_range(&mut self, low: *const u8, high: *const u8) {
        log::debug!("starting collection, {} bytes allocated since last cycle", self.bytes_allocated);

        self.mark_range(align_up(low).cast(), align_down(high).cast());
        log::debug!("mark done, {} objects reachable", self.counters.marked_last_cycle);

        self.sweep();
        log::debug!("sweep done, {} bytes remain allocated", self.bytes_allocated);

        self.trigger_threshold = (self.bytes_allocated * 2).max(MINIMUM_THRESHOLD as isize);
        self.bytes_allocated = 0;

        log::debug!(
            "next collection at {} bytes, free list holds {} spans",
            self.trigger_threshold,
            self.free.len()
        );
    }

    /// The mark phase: scan `[low, high)` for roots, then the payloads of hit
    /// blocks transitively. Every reachable block ends marked exactly once.
    unsafe fn mark_range(&mut self, low: *const usize, high: *const usize) {
        let mut marked = 0;
        // explicit worklist in place of recursing per discovered block,
        // bounded by the number of live allocations
        let mut worklist: Vec<*mut AllocHeader> = Vec::new();

        let mut current = low;
        while current < high {
            self.mark_word(current.read(), &mut marked, &mut worklist);
            current = current.add(1);
        }

        while let Some(block) = worklist.pop() {
            let mut word = payload_of(block).cast::<usize>().cast_const();
            // a trailing partial word is never a candidate
            for _ in 0..(*block).size / WORD_SIZE {
                self.mark_word(word.read(), &mut marked, &mut worklist);
                word = word.add(1);
            }
        }

        self.counters.account_mark_phase(marked);
    }

    /// The conservative pointer classifier: a candidate word hits iff it
    /// equals the first payload byte address of a block on the allocation
    /// list. Interior pointers are not recognized.
    unsafe fn mark_word(
        &mut self,
        candidate: usize,
        marked: &mut usize,
        worklist: &mut Vec<*mut AllocHeader>,
    ) {
        if candidate == 0 {
            return;
        }

        let mut block = self.alloc_head;
        while !block.is_null() {
            if payload_of(block) as usize == candidate {
                if (*block).mark == 0 {
                    (*block).mark = 1;
                    *marked += 1;
                    worklist.push(block);
                }
                return;
            }
            block = (*block).next;
        }
    }

    /// The sweep phase: unlink every unmarked block and return its span to
    /// the free list; clear the mark on every survivor.
    unsafe fn sweep(&mut self) {
        let mut swept = 0;
        let mut swept_bytes = 0;

        let mut prev: *mut AllocHeader = null_mut();
        let mut current = self.alloc_head;

        while !current.is_null() {
            if (*current).mark == 0 {
                let next = (*current).next;

                if prev.is_null() {
                    self.alloc_head = next;
                } else {
                    (*prev).next = next;
                }

                let reclaimed = (*current).size + ALLOC_HEADER_SIZE;
                self.bytes_allocated -= reclaimed as isize;
                swept += 1;
                swept_bytes += reclaimed;

                // the span sheds the larger header; the delta is counted as
                // free payload
                let span = current.cast::<FreeHeader>();
                span.write(FreeHeader { size: reclaimed - FREE_HEADER_SIZE, next: null_mut() });
                self.free.insert(span);

                current = next;
            } else {
                (*current).mark = 0;
                prev = current;
                current = (*current).next;
            }
        }

        self.counters.account_sweep_phase(swept, swept_bytes);
    }

    /// Physical address ranges of every free span, ascending.
    pub fn free_spans(&self) -> FreeSpans<'_> {
        self.free.iter()
    }

    /// Payload address ranges of every live allocation, in allocation-list
    /// order (most recent first).
    pub fn alloc_spans(&self) -> AllocSpans<'_, M> {
        AllocSpans { next: self.alloc_head, _calx: core::marker::PhantomData }
    }

    pub fn free_list_len(&self) -> usize {
        self.free.len()
    }

    /// Bytes handed out since the last sweep.
    pub fn bytes_allocated(&self) -> isize {
        self.bytes_allocated
    }

    /// `bytes_allocated` level at which the next allocation collects first.
    pub fn trigger_threshold(&self) -> isize {
        self.trigger_threshold
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }
}

/// Iterator over live payload ranges. See [`Calx::alloc_spans`].
pub struct AllocSpans<'a, M: MemorySource> {
    next: *mut AllocHeader,
    _calx: core::marker::PhantomData<&'a Calx<M>>,
}

impl<M: MemorySource> Iterator for AllocSpans<'_, M> {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        if self.next.is_null() {
            return None;
        }

        unsafe {
            let block = self.next;
            self.next = (*block).next;
            Some(Span::from_ptr_size(payload_of(block), (*block).size))
        }
    }
}
