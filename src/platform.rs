use crate::memory::{BufferAllocError, BufferPlacement, FrameMemory};

/// Pixel sink the HAL flushes into.
///
/// `write_rect` receives `width * height` packed pixels in display-native byte
/// order and addresses the display window `(x, y)..(x + width, y + height)`.
/// Implementations are synchronous: the call returns once the bytes are
/// queued or sent.
pub trait Transport {
    type Error;

    fn write_rect(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        pixels: &[u8],
    ) -> Result<usize, Self::Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    fn write_rect(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        pixels: &[u8],
    ) -> Result<usize, Self::Error> {
        T::write_rect(self, x, y, width, height, pixels)
    }
}

/// Source of backing memory for framebuffers.
pub trait BufferAlloc {
    fn alloc_zeroed(
        &mut self,
        len: usize,
        placement: BufferPlacement,
    ) -> Result<FrameMemory, BufferAllocError>;
}

impl<A: BufferAlloc + ?Sized> BufferAlloc for &mut A {
    fn alloc_zeroed(
        &mut self,
        len: usize,
        placement: BufferPlacement,
    ) -> Result<FrameMemory, BufferAllocError> {
        A::alloc_zeroed(self, len, placement)
    }
}
