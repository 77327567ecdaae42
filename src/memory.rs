use core::{
    alloc::Layout,
    fmt,
    ptr::NonNull,
    slice,
};

use crate::platform::BufferAlloc;

const DMA_ALIGN: usize = 4;

/// Where a framebuffer is requested from.
///
/// Mirrors ESP-IDF heap capabilities: `Dma` is `MALLOC_CAP_DMA`, `DmaWord`
/// is `MALLOC_CAP_DMA | MALLOC_CAP_32BIT`, `Internal` is the plain heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferPlacement {
    Dma,
    DmaWord,
    Internal,
}

impl BufferPlacement {
    fn layout(self, len: usize) -> Option<Layout> {
        match self {
            Self::Internal => Layout::from_size_align(len, 1).ok(),
            Self::Dma => Layout::from_size_align(len, DMA_ALIGN).ok(),
            Self::DmaWord => {
                let padded = len.checked_add(DMA_ALIGN - 1)? & !(DMA_ALIGN - 1);
                Layout::from_size_align(padded, DMA_ALIGN).ok()
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferAllocError {
    ZeroSized,
    LayoutOverflow,
    OutOfMemory,
    BudgetExhausted { requested: usize, free: usize },
}

/// Owned, zero-initialised framebuffer memory.
pub struct FrameMemory {
    placement: BufferPlacement,
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

// The memory is exclusively owned and only reachable through `&self`/`&mut self`.
unsafe impl Send for FrameMemory {}
unsafe impl Sync for FrameMemory {}

impl FrameMemory {
    fn alloc_zeroed(len: usize, placement: BufferPlacement) -> Result<Self, BufferAllocError> {
        if len == 0 {
            return Err(BufferAllocError::ZeroSized);
        }
        let layout = placement
            .layout(len)
            .ok_or(BufferAllocError::LayoutOverflow)?;
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(BufferAllocError::OutOfMemory)?;
        Ok(Self {
            placement,
            ptr,
            len,
            layout,
        })
    }

    pub fn placement(&self) -> BufferPlacement {
        self.placement
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for `len` initialised bytes for the lifetime of self.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for FrameMemory {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by `alloc_zeroed` with exactly this layout.
        unsafe { alloc::alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl fmt::Debug for FrameMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameMemory")
            .field("placement", &self.placement)
            .field("len", &self.len)
            .finish()
    }
}

/// Global-heap allocator. Placement only affects alignment on the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapAlloc;

impl BufferAlloc for HeapAlloc {
    fn alloc_zeroed(
        &mut self,
        len: usize,
        placement: BufferPlacement,
    ) -> Result<FrameMemory, BufferAllocError> {
        FrameMemory::alloc_zeroed(len, placement)
    }
}

/// Heap allocator limited to a fixed DMA-capable budget.
///
/// Stands in for a capability-restricted region such as ESP32 internal DMA
/// RAM. Requests for `Internal` placement bypass the budget. Frees are not
/// credited back: framebuffers live for the whole session.
#[derive(Clone, Copy, Debug)]
pub struct BoundedAlloc {
    capacity: usize,
    used: usize,
    peak_used: usize,
    last_logged_peak: usize,
}

impl BoundedAlloc {
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: 0,
            peak_used: 0,
            last_logged_peak: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn free(&self) -> usize {
        self.capacity.saturating_sub(self.used)
    }

    pub fn peak_used(&self) -> usize {
        self.peak_used
    }

    /// Single contiguous region, so the largest block is everything left.
    pub fn largest_free_block(&self) -> usize {
        self.free()
    }

    fn record(&mut self, tag: &str, bytes: usize) {
        self.used += bytes;
        if self.used > self.peak_used {
            self.peak_used = self.used;
        }
        if self.peak_used > self.last_logged_peak {
            self.last_logged_peak = self.peak_used;
            log::info!(
                "dma: high_water tag={} peak_used_bytes={} total_bytes={} free_bytes={}",
                tag,
                self.peak_used,
                self.capacity,
                self.free()
            );
        }
    }
}

impl BufferAlloc for BoundedAlloc {
    fn alloc_zeroed(
        &mut self,
        len: usize,
        placement: BufferPlacement,
    ) -> Result<FrameMemory, BufferAllocError> {
        if placement == BufferPlacement::Internal {
            return FrameMemory::alloc_zeroed(len, placement);
        }
        let reserved = placement
            .layout(len)
            .ok_or(BufferAllocError::LayoutOverflow)?
            .size();
        if reserved > self.free() {
            return Err(BufferAllocError::BudgetExhausted {
                requested: reserved,
                free: self.free(),
            });
        }
        let memory = FrameMemory::alloc_zeroed(len, placement)?;
        self.record("framebuffer", reserved);
        Ok(memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_alloc_returns_zeroed_memory() {
        let memory = HeapAlloc.alloc_zeroed(37, BufferPlacement::Internal).unwrap();
        assert_eq!(memory.len(), 37);
        assert!(memory.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn dma_memory_is_word_aligned() {
        let memory = HeapAlloc.alloc_zeroed(10, BufferPlacement::Dma).unwrap();
        assert_eq!(memory.as_slice().as_ptr() as usize % DMA_ALIGN, 0);
    }

    #[test]
    fn zero_sized_request_is_rejected() {
        assert_eq!(
            HeapAlloc.alloc_zeroed(0, BufferPlacement::Dma).unwrap_err(),
            BufferAllocError::ZeroSized
        );
    }

    #[test]
    fn bounded_alloc_tracks_budget_and_peak() {
        let mut alloc = BoundedAlloc::new(100);
        let _a = alloc.alloc_zeroed(40, BufferPlacement::Dma).unwrap();
        let _b = alloc.alloc_zeroed(30, BufferPlacement::DmaWord).unwrap();
        assert_eq!(alloc.used(), 72);
        assert_eq!(alloc.peak_used(), 72);
        assert_eq!(alloc.largest_free_block(), 28);

        let err = alloc.alloc_zeroed(40, BufferPlacement::Dma).unwrap_err();
        assert_eq!(
            err,
            BufferAllocError::BudgetExhausted {
                requested: 40,
                free: 28
            }
        );
        assert_eq!(alloc.used(), 72);
    }

    #[test]
    fn internal_placement_bypasses_budget() {
        let mut alloc = BoundedAlloc::new(8);
        let memory = alloc.alloc_zeroed(64, BufferPlacement::Internal).unwrap();
        assert_eq!(memory.len(), 64);
        assert_eq!(alloc.used(), 0);
    }
}
