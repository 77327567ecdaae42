use core::f64::consts::PI;

pub const PALETTE_LEN: usize = 256;

/// Pixel layout of the framebuffer and of the bytes sent to the panel.
///
/// Direct-color values are carried as `u32` in the format's native
/// representation (`0xF800` is red for `Rgb565`, `0xFF0000` for `Rgb888`)
/// and stored most-significant byte first, the order RAMWR expects on SPI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb565,
    Indexed8,
    Rgb666,
    Rgb888,
}

impl PixelFormat {
    /// Bytes one pixel occupies in a framebuffer.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Indexed8 => 1,
            Self::Rgb565 => 2,
            Self::Rgb666 | Self::Rgb888 => 4,
        }
    }

    /// Bytes one pixel occupies on the wire after palette expansion.
    ///
    /// 18- and 24-bit panels read three bytes per pixel, so the pad byte of
    /// the stored `u32` never leaves the host.
    pub const fn wire_bytes_per_pixel(self) -> usize {
        match self {
            Self::Indexed8 | Self::Rgb565 => 2,
            Self::Rgb666 | Self::Rgb888 => 3,
        }
    }

    /// Stored direct-color pixels that must be repacked before transfer.
    pub(crate) const fn repacks_on_wire(self) -> bool {
        matches!(self, Self::Rgb666 | Self::Rgb888)
    }

    /// Wire bytes of one stored direct-color pixel.
    #[inline]
    pub(crate) fn wire_pixel(self, stored: &[u8]) -> &[u8] {
        match self {
            Self::Rgb666 | Self::Rgb888 => &stored[1..4],
            _ => &stored[..self.bytes_per_pixel()],
        }
    }

    /// Packs a row of stored direct-color pixels into `out`.
    pub(crate) fn pack_row(self, stored: &[u8], out: &mut [u8]) {
        let wire = self.wire_bytes_per_pixel();
        for (pixel, packed) in stored
            .chunks_exact(self.bytes_per_pixel())
            .zip(out.chunks_exact_mut(wire))
        {
            packed.copy_from_slice(self.wire_pixel(pixel));
        }
    }

    pub const fn is_indexed(self) -> bool {
        matches!(self, Self::Indexed8)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Rgb565 => "rgb565",
            Self::Indexed8 => "indexed8",
            Self::Rgb666 => "rgb666",
            Self::Rgb888 => "rgb888",
        }
    }

    /// Writes `raw` into `out[..bytes_per_pixel]`, big-endian.
    #[inline]
    pub fn store(self, raw: u32, out: &mut [u8]) {
        match self {
            Self::Indexed8 => out[0] = raw as u8,
            Self::Rgb565 => out[..2].copy_from_slice(&(raw as u16).to_be_bytes()),
            Self::Rgb666 | Self::Rgb888 => out[..4].copy_from_slice(&raw.to_be_bytes()),
        }
    }

    /// `raw` as stored bytes; only the first `bytes_per_pixel` are meaningful.
    #[inline]
    pub(crate) fn encode(self, raw: u32) -> [u8; 4] {
        let mut pixel = [0u8; 4];
        self.store(raw, &mut pixel);
        pixel
    }

    /// Reads one stored pixel back into its raw value.
    #[inline]
    pub fn load(self, bytes: &[u8]) -> u32 {
        match self {
            Self::Indexed8 => u32::from(bytes[0]),
            Self::Rgb565 => u32::from(u16::from_be_bytes([bytes[0], bytes[1]])),
            Self::Rgb666 | Self::Rgb888 => {
                u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
            }
        }
    }

    /// Packs an 8-bit-per-channel color. `None` for indexed surfaces.
    pub fn encode_rgb(self, r: u8, g: u8, b: u8) -> Option<u32> {
        match self {
            Self::Indexed8 => None,
            Self::Rgb565 => Some(u32::from(rgb565(r, g, b))),
            Self::Rgb666 => {
                Some((u32::from(r & 0xFC) << 16) | (u32::from(g & 0xFC) << 8) | u32::from(b & 0xFC))
            }
            Self::Rgb888 => Some((u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)),
        }
    }
}

#[inline]
pub const fn rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}

/// 256-entry RGB565 lookup table used to expand `Indexed8` framebuffers.
#[derive(Clone, PartialEq, Eq)]
pub struct Palette {
    entries: [u16; PALETTE_LEN],
}

impl Palette {
    pub const fn from_entries(entries: [u16; PALETTE_LEN]) -> Self {
        Self { entries }
    }

    pub fn grayscale() -> Self {
        let mut entries = [0u16; PALETTE_LEN];
        for (i, entry) in entries.iter_mut().enumerate() {
            let level = i as u8;
            *entry = rgb565(level, level, level);
        }
        Self { entries }
    }

    #[inline]
    pub fn get(&self, index: u8) -> u16 {
        self.entries[index as usize]
    }

    pub fn set(&mut self, index: u8, color: u16) {
        self.entries[index as usize] = color;
    }

    pub fn entries(&self) -> &[u16; PALETTE_LEN] {
        &self.entries
    }

    /// Expands a row of indices into big-endian RGB565.
    pub(crate) fn expand_row(&self, indices: &[u8], out: &mut [u8]) {
        for (index, pixel) in indices.iter().zip(out.chunks_exact_mut(2)) {
            pixel.copy_from_slice(&self.get(*index).to_be_bytes());
        }
    }
}

/// Continuous sine ramp on red and green with a fixed blue channel. Entry 0
/// is black so a zeroed framebuffer flushes as a blank screen.
impl Default for Palette {
    fn default() -> Self {
        let mut entries = [0u16; PALETTE_LEN];
        for (i, entry) in entries.iter_mut().enumerate() {
            let step = i as f64;
            let r = 128.0 + 128.0 * libm::sin(PI * step / 128.0 + 1.0);
            let g = 128.0 + 128.0 * libm::sin(PI * step / 64.0 + 1.0);
            *entry = rgb565(channel(r), channel(g), 64);
        }
        entries[0] = 0x0000;
        Self { entries }
    }
}

fn channel(value: f64) -> u8 {
    if value <= 0.0 {
        0
    } else if value >= 255.0 {
        255
    } else {
        value as u8
    }
}

impl core::fmt::Debug for Palette {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Palette")
            .field("first", &self.entries[0])
            .field("last", &self.entries[PALETTE_LEN - 1])
            .finish()
    }
}
