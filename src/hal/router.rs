use heapless::Vec;

use crate::{
    color::PixelFormat,
    config::MAX_LINE_BYTES,
    platform::Transport,
    surface::SurfaceView,
};

use super::{strategy::Backbuffer, GuardMutex, HalError, MipiHal, TransportError, UnsupportedOp};

/// Repeats one pixel, in wire layout, `count` times. Line capacity is
/// checked at init.
fn fill_line(
    line: &mut Vec<u8, MAX_LINE_BYTES>,
    format: PixelFormat,
    raw: u32,
    count: u16,
) -> &[u8] {
    let pixel = format.encode(raw);
    let wire = format.wire_pixel(&pixel);
    line.clear();
    for _ in 0..count {
        let pushed = line.extend_from_slice(wire);
        debug_assert!(pushed.is_ok(), "run exceeds the scratch line");
        if pushed.is_err() {
            break;
        }
    }
    line
}

/// Packs one stored source row into `line` for a direct write.
fn pack_line<'a>(
    line: &'a mut Vec<u8, MAX_LINE_BYTES>,
    format: PixelFormat,
    row: &[u8],
    width: u16,
) -> &'a [u8] {
    line.clear();
    let sized = line.resize(width as usize * format.wire_bytes_per_pixel(), 0);
    debug_assert!(sized.is_ok(), "row exceeds the scratch line");
    format.pack_row(row, &mut line[..]);
    line
}

fn mark_rows(back: &mut Backbuffer, local_y: u16, rows: u16) {
    if rows > 0 {
        back.dirty.mark(local_y, local_y + rows - 1);
    }
}

impl<T, M> MipiHal<T, M>
where
    T: Transport,
    M: GuardMutex,
{
    /// Writes one pixel. `color` is the raw format value, or the palette
    /// index for `Indexed8`.
    pub fn put_pixel(&self, x: u16, y: u16, color: u32) -> Result<(), HalError<T::Error>> {
        let format = self.format;
        self.with_state(|state| -> Result<(), TransportError<T>> {
            match state.buffers.target_mut(y, 1).map_err(TransportError::<T>::Unsupported)? {
                Some((back, local_y)) => {
                    back.surface.put_pixel(x, local_y, color);
                    mark_rows(back, local_y, 1);
                }
                None => {
                    let pixel = fill_line(&mut state.line, format, color, 1);
                    state.transport.write_rect(x, y, 1, 1, pixel)?;
                }
            }
            Ok(())
        })
    }

    /// Writes exactly `width` pixels starting at `(x, y)`.
    pub fn hline(&self, x: u16, y: u16, width: u16, color: u32) -> Result<(), HalError<T::Error>> {
        let format = self.format;
        self.with_state(|state| -> Result<(), TransportError<T>> {
            match state.buffers.target_mut(y, 1).map_err(TransportError::<T>::Unsupported)? {
                Some((back, local_y)) => {
                    back.surface.hline(x, local_y, width, color);
                    mark_rows(back, local_y, 1);
                }
                None => {
                    let run = fill_line(&mut state.line, format, color, width);
                    state.transport.write_rect(x, y, width, 1, run)?;
                }
            }
            Ok(())
        })
    }

    /// Writes exactly `height` pixels starting at `(x, y)`, one row apart.
    pub fn vline(&self, x: u16, y: u16, height: u16, color: u32) -> Result<(), HalError<T::Error>> {
        let format = self.format;
        self.with_state(|state| -> Result<(), TransportError<T>> {
            match state.buffers.target_mut(y, height).map_err(TransportError::<T>::Unsupported)? {
                Some((back, local_y)) => {
                    back.surface.vline(x, local_y, height, color);
                    mark_rows(back, local_y, height);
                }
                None => {
                    let run = fill_line(&mut state.line, format, color, height);
                    state.transport.write_rect(x, y, 1, height, run)?;
                }
            }
            Ok(())
        })
    }

    /// Copies `source` with its top-left corner at `(x, y)`.
    pub fn blit(&self, x: u16, y: u16, source: &SurfaceView<'_>) -> Result<(), HalError<T::Error>> {
        if source.format() != self.format {
            return Err(HalError::Unsupported(UnsupportedOp::FormatMismatch));
        }
        let (rows, format) = (source.height(), self.format);
        self.with_state(|state| -> Result<(), TransportError<T>> {
            match state.buffers.target_mut(y, rows).map_err(TransportError::<T>::Unsupported)? {
                Some((back, local_y)) => {
                    back.surface.blit(x, local_y, source);
                    mark_rows(back, local_y, rows);
                }
                None if source.format().repacks_on_wire() => {
                    let width = source.width();
                    for row in 0..rows {
                        let packed = pack_line(&mut state.line, format, source.row(row), width);
                        state.transport.write_rect(x, y + row, width, 1, packed)?;
                    }
                }
                None => match source.packed_bytes() {
                    Some(bytes) => {
                        state.transport.write_rect(x, y, source.width(), rows, bytes)?;
                    }
                    None => {
                        for row in 0..rows {
                            state
                                .transport
                                .write_rect(x, y + row, source.width(), 1, source.row(row))?;
                        }
                    }
                },
            }
            Ok(())
        })
    }

    /// Nearest-neighbour scales `source` into the `width` x `height` box at
    /// `(x, y)`. Needs a host framebuffer.
    pub fn scale_blit(
        &self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        source: &SurfaceView<'_>,
    ) -> Result<(), HalError<T::Error>> {
        if source.format() != self.format {
            return Err(HalError::Unsupported(UnsupportedOp::FormatMismatch));
        }
        self.with_state(|state| -> Result<(), TransportError<T>> {
            match state.buffers.target_mut(y, height).map_err(TransportError::<T>::Unsupported)? {
                Some((back, local_y)) => {
                    back.surface.scale_blit(x, local_y, width, height, source);
                    mark_rows(back, local_y, height);
                    Ok(())
                }
                None => Err(HalError::Unsupported(UnsupportedOp::ScaleBlitUnbuffered)),
            }
        })
    }

    /// Zeroes every owned framebuffer. Unbuffered displays get zero rows
    /// written straight to panel memory.
    pub fn clear_screen(&self) -> Result<(), HalError<T::Error>> {
        let (width, height, format) = (self.width, self.height, self.format);
        self.with_state(|state| -> Result<(), TransportError<T>> {
            if self.mode.is_buffered() {
                state.buffers.clear_all();
                return Ok(());
            }
            let zeros = fill_line(&mut state.line, format, 0, width);
            for y in 0..height {
                state.transport.write_rect(0, y, width, 1, zeros)?;
            }
            Ok(())
        })
    }

    /// Raw value at `(x, y)` in the current drawing target; `None` when
    /// unbuffered.
    pub fn pixel(&self, x: u16, y: u16) -> Option<u32> {
        self.with_state(|state| {
            state
                .buffers
                .target(y)
                .map(|(back, local_y)| back.surface.pixel(x, local_y))
        })
    }
}
