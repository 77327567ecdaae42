use crate::{color::PixelFormat, memory::FrameMemory};

/// Geometry of a framebuffer, without its memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
    pub bytes_per_pixel: usize,
    pub stride: usize,
    pub size: usize,
}

/// Owned framebuffer. Pixels are addressed at `stride * y + bpp * x`.
pub struct PixelSurface {
    width: u16,
    height: u16,
    format: PixelFormat,
    stride: usize,
    memory: FrameMemory,
}

impl PixelSurface {
    /// Wraps `memory`, which must hold at least `stride * height` bytes.
    pub(crate) fn new(
        width: u16,
        height: u16,
        format: PixelFormat,
        stride: usize,
        memory: FrameMemory,
    ) -> Self {
        debug_assert!(stride >= width as usize * format.bytes_per_pixel());
        debug_assert!(memory.len() >= stride * height as usize);
        Self {
            width,
            height,
            format,
            stride,
            memory,
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn size(&self) -> usize {
        self.stride * self.height as usize
    }

    pub fn info(&self) -> SurfaceInfo {
        SurfaceInfo {
            width: self.width,
            height: self.height,
            format: self.format,
            bytes_per_pixel: self.format.bytes_per_pixel(),
            stride: self.stride,
            size: self.size(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.memory.as_slice()[..self.size()]
    }

    pub fn view(&self) -> SurfaceView<'_> {
        SurfaceView {
            width: self.width,
            height: self.height,
            format: self.format,
            stride: self.stride,
            bytes: self.as_bytes(),
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let size = self.size();
        &mut self.memory.as_mut_slice()[..size]
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    #[inline]
    fn offset(&self, x: u16, y: u16) -> usize {
        self.stride * y as usize + self.format.bytes_per_pixel() * x as usize
    }

    /// Rows carry no padding, so any run of rows is one packed block.
    pub(crate) fn is_packed(&self) -> bool {
        self.stride == self.row_bytes()
    }

    /// Packed pixels of row `y`.
    pub(crate) fn row(&self, y: u16) -> &[u8] {
        let start = self.stride * y as usize;
        &self.as_bytes()[start..start + self.row_bytes()]
    }

    /// Rows `y..y + count` including any padding between them.
    pub(crate) fn rows(&self, y: u16, count: u16) -> &[u8] {
        let start = self.stride * y as usize;
        &self.as_bytes()[start..start + self.stride * count as usize]
    }

    pub fn pixel(&self, x: u16, y: u16) -> u32 {
        let offset = self.offset(x, y);
        self.format.load(&self.as_bytes()[offset..])
    }

    pub(crate) fn put_pixel(&mut self, x: u16, y: u16, raw: u32) {
        let offset = self.offset(x, y);
        let format = self.format;
        format.store(raw, &mut self.bytes_mut()[offset..]);
    }

    pub(crate) fn hline(&mut self, x: u16, y: u16, width: u16, raw: u32) {
        let bpp = self.format.bytes_per_pixel();
        let pixel = self.format.encode(raw);
        let start = self.offset(x, y);
        let run = &mut self.bytes_mut()[start..start + bpp * width as usize];
        for slot in run.chunks_exact_mut(bpp) {
            slot.copy_from_slice(&pixel[..bpp]);
        }
    }

    pub(crate) fn vline(&mut self, x: u16, y: u16, height: u16, raw: u32) {
        let bpp = self.format.bytes_per_pixel();
        let stride = self.stride;
        let pixel = self.format.encode(raw);
        let mut offset = self.offset(x, y);
        let bytes = self.bytes_mut();
        for _ in 0..height {
            bytes[offset..offset + bpp].copy_from_slice(&pixel[..bpp]);
            offset += stride;
        }
    }

    /// Copies `source` row by row; formats must match.
    pub(crate) fn blit(&mut self, x: u16, y: u16, source: &SurfaceView<'_>) {
        let row_bytes = source.row_bytes();
        let stride = self.stride;
        let mut dst = self.offset(x, y);
        let bytes = self.bytes_mut();
        for sy in 0..source.height {
            bytes[dst..dst + row_bytes].copy_from_slice(source.row(sy));
            dst += stride;
        }
    }

    /// Nearest-neighbour resample of `source` into a `width` x `height` box.
    pub(crate) fn scale_blit(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        source: &SurfaceView<'_>,
    ) {
        if source.width == 0 || source.height == 0 {
            return;
        }
        let bpp = self.format.bytes_per_pixel();
        let stride = self.stride;
        let origin = self.offset(x, y);
        let bytes = self.bytes_mut();
        for dy in 0..height as usize {
            let sy = dy * source.height as usize / height as usize;
            let src_row = source.row(sy as u16);
            let dst_row = origin + dy * stride;
            for dx in 0..width as usize {
                let sx = dx * source.width as usize / width as usize;
                let dst = dst_row + dx * bpp;
                bytes[dst..dst + bpp].copy_from_slice(&src_row[sx * bpp..(sx + 1) * bpp]);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.bytes_mut().fill(0);
    }
}

impl core::fmt::Debug for PixelSurface {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PixelSurface")
            .field("info", &self.info())
            .field("placement", &self.memory.placement())
            .finish()
    }
}

/// Borrowed, read-only image used as a blit source.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceView<'a> {
    width: u16,
    height: u16,
    format: PixelFormat,
    stride: usize,
    bytes: &'a [u8],
}

impl<'a> SurfaceView<'a> {
    /// Packed rows of `width * bpp` bytes. `None` if `bytes` is too short.
    pub fn new(width: u16, height: u16, format: PixelFormat, bytes: &'a [u8]) -> Option<Self> {
        let stride = width as usize * format.bytes_per_pixel();
        Self::with_stride(width, height, format, stride, bytes)
    }

    pub fn with_stride(
        width: u16,
        height: u16,
        format: PixelFormat,
        stride: usize,
        bytes: &'a [u8],
    ) -> Option<Self> {
        let row_bytes = width as usize * format.bytes_per_pixel();
        if stride < row_bytes || bytes.len() < stride * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            format,
            stride,
            bytes,
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// All pixels as one block, if rows carry no padding.
    pub(crate) fn packed_bytes(&self) -> Option<&'a [u8]> {
        let len = self.row_bytes() * self.height as usize;
        (self.stride == self.row_bytes()).then(|| &self.bytes[..len])
    }

    pub(crate) fn row(&self, y: u16) -> &'a [u8] {
        let start = self.stride * y as usize;
        &self.bytes[start..start + self.row_bytes()]
    }
}

/// Inclusive span of rows written since the last transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirtyRows {
    span: Option<(u16, u16)>,
}

impl DirtyRows {
    pub fn mark(&mut self, first: u16, last: u16) {
        self.span = Some(match self.span {
            Some((y0, y1)) => (y0.min(first), y1.max(last)),
            None => (first, last),
        });
    }

    pub fn mark_all(&mut self, height: u16) {
        if height > 0 {
            self.mark(0, height - 1);
        }
    }

    pub fn span(&self) -> Option<(u16, u16)> {
        self.span
    }

    pub fn take(&mut self) -> Option<(u16, u16)> {
        self.span.take()
    }
}
