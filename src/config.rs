use crate::color::{Palette, PixelFormat};

pub const DEFAULT_DISPLAY_WIDTH: u16 = 240;
pub const DEFAULT_DISPLAY_HEIGHT: u16 = 240;
pub const DEFAULT_PIXEL_FORMAT: PixelFormat = PixelFormat::Rgb565;
pub const DEFAULT_ROW_ALIGN: usize = 1;
/// Upper bound for one expanded or unbuffered scratch line.
pub const MAX_LINE_BYTES: usize = 4096;
/// Largest payload handed to the SPI bus in one transaction.
pub const DCS_CHUNK_BYTES: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferingMode {
    None,
    Single,
    Double,
    Triple,
    SplitDouble { split_row: u16 },
}

impl BufferingMode {
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Single => "single",
            Self::Double => "double",
            Self::Triple => "triple",
            Self::SplitDouble { .. } => "split_double",
        }
    }

    pub const fn is_buffered(self) -> bool {
        !matches!(self, Self::None)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    MultipleModes,
    ZeroDimensions,
    SplitRowOutOfRange { split_row: u16, height: u16 },
    SplitRowMissing,
    SplitTripleUnsupported,
    InvalidRowAlign(usize),
    LineTooWide { bytes: usize },
    IndexedUnbuffered,
    DirtyTrackingWithTriple,
    GuardMismatch { lock_on_flush: bool },
}

/// Validated description of one display and how it is buffered.
#[derive(Clone, Debug)]
pub struct HalConfig {
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
    pub mode: BufferingMode,
    pub lock_on_flush: bool,
    pub dirty_tracking: bool,
    /// Row stride is rounded up to a multiple of this many bytes.
    pub row_align: usize,
    pub palette: Palette,
}

impl HalConfig {
    pub fn new(width: u16, height: u16, format: PixelFormat, mode: BufferingMode) -> Self {
        Self {
            width,
            height,
            format,
            mode,
            lock_on_flush: false,
            dirty_tracking: false,
            row_align: DEFAULT_ROW_ALIGN,
            palette: Palette::default(),
        }
    }

    pub fn with_lock_on_flush(mut self, lock_on_flush: bool) -> Self {
        self.lock_on_flush = lock_on_flush;
        self
    }

    pub fn with_dirty_tracking(mut self, dirty_tracking: bool) -> Self {
        self.dirty_tracking = dirty_tracking;
        self
    }

    pub fn with_row_align(mut self, row_align: usize) -> Self {
        self.row_align = row_align;
        self
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    /// Bytes per framebuffer row including alignment padding.
    pub fn stride(&self) -> usize {
        let packed = self.width as usize * self.format.bytes_per_pixel();
        let align = self.row_align.max(1);
        packed.div_ceil(align) * align
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ZeroDimensions);
        }
        if self.row_align == 0 || !self.row_align.is_power_of_two() {
            return Err(ConfigError::InvalidRowAlign(self.row_align));
        }
        if let BufferingMode::SplitDouble { split_row } = self.mode {
            if split_row == 0 || split_row >= self.height {
                return Err(ConfigError::SplitRowOutOfRange {
                    split_row,
                    height: self.height,
                });
            }
        }
        // Unbuffered vertical runs stream a whole column through the scratch line.
        let line_pixels = if self.mode.is_buffered() {
            self.width
        } else {
            self.width.max(self.height)
        };
        let line_bytes = line_pixels as usize * self.format.wire_bytes_per_pixel();
        if line_bytes > MAX_LINE_BYTES {
            return Err(ConfigError::LineTooWide { bytes: line_bytes });
        }
        if self.format.is_indexed() && !self.mode.is_buffered() {
            return Err(ConfigError::IndexedUnbuffered);
        }
        if self.dirty_tracking && self.mode == BufferingMode::Triple {
            return Err(ConfigError::DirtyTrackingWithTriple);
        }
        Ok(())
    }
}

impl Default for HalConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_DISPLAY_WIDTH,
            DEFAULT_DISPLAY_HEIGHT,
            DEFAULT_PIXEL_FORMAT,
            BufferingMode::None,
        )
    }
}

/// Build-time style flag set, one flag per buffering mode.
///
/// Unbuffered is the default when no mode flag is set. A `buffer_split`
/// row turns double buffering into split double buffering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfigOptions {
    pub width: u16,
    pub height: u16,
    pub format: Option<PixelFormat>,
    pub no_buffering: bool,
    pub single_buffering: bool,
    pub double_buffering: bool,
    pub triple_buffering: bool,
    pub split_double_buffering: bool,
    pub buffer_split: Option<u16>,
    pub lock_when_flushing: bool,
    pub dirty_tracking: bool,
}

impl ConfigOptions {
    pub fn resolve(&self) -> Result<HalConfig, ConfigError> {
        let selected = [
            self.no_buffering,
            self.single_buffering,
            self.double_buffering,
            self.triple_buffering,
            self.split_double_buffering,
        ]
        .iter()
        .filter(|flag| **flag)
        .count();
        if selected > 1 {
            return Err(ConfigError::MultipleModes);
        }

        let mode = match self.buffer_split {
            Some(_) if self.triple_buffering => return Err(ConfigError::SplitTripleUnsupported),
            Some(split_row) if self.double_buffering || self.split_double_buffering => {
                BufferingMode::SplitDouble { split_row }
            }
            None if self.split_double_buffering => return Err(ConfigError::SplitRowMissing),
            _ if self.single_buffering => BufferingMode::Single,
            _ if self.double_buffering => BufferingMode::Double,
            _ if self.triple_buffering => BufferingMode::Triple,
            _ => BufferingMode::None,
        };
        if let Some(split_row) = self.buffer_split {
            if !matches!(mode, BufferingMode::SplitDouble { .. }) {
                log::warn!(
                    "config: buffer_split ignored split_row={} mode={}",
                    split_row,
                    mode.name()
                );
            }
        }

        let width = if self.width == 0 {
            DEFAULT_DISPLAY_WIDTH
        } else {
            self.width
        };
        let height = if self.height == 0 {
            DEFAULT_DISPLAY_HEIGHT
        } else {
            self.height
        };
        let config = HalConfig::new(
            width,
            height,
            self.format.unwrap_or(DEFAULT_PIXEL_FORMAT),
            mode,
        )
        .with_lock_on_flush(self.lock_when_flushing)
        .with_dirty_tracking(self.dirty_tracking);
        config.validate()?;
        Ok(config)
    }
}
