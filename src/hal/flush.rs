use heapless::Vec;

use crate::{color::Palette, config::MAX_LINE_BYTES, platform::Transport, surface::PixelSurface};

use super::{
    strategy::{Backbuffer, Buffers},
    GuardMutex, HalError, HalState, MipiHal, TransportError, UnsupportedOp,
};

/// Sends framebuffer rows to the transport, expanding indexed rows and
/// repacking padded direct-color rows on the way.
struct RowSink<'a, T> {
    transport: &'a mut T,
    palette: &'a Palette,
    line: &'a mut Vec<u8, MAX_LINE_BYTES>,
}

impl<T: Transport> RowSink<'_, T> {
    /// Transfers local rows `first..first + count` of `surface` to display
    /// rows starting at `origin + first`.
    fn transfer(
        &mut self,
        surface: &PixelSurface,
        origin: u16,
        first: u16,
        count: u16,
    ) -> Result<usize, T::Error> {
        if count == 0 {
            return Ok(0);
        }
        let width = surface.width();
        let format = surface.format();
        if format.is_indexed() || format.repacks_on_wire() {
            let mut sent = 0;
            for y in first..first + count {
                self.line.clear();
                let sized = self
                    .line
                    .resize(width as usize * format.wire_bytes_per_pixel(), 0);
                debug_assert!(sized.is_ok(), "row exceeds the scratch line");
                if format.is_indexed() {
                    self.palette.expand_row(surface.row(y), &mut self.line[..]);
                } else {
                    format.pack_row(surface.row(y), &mut self.line[..]);
                }
                sent += self
                    .transport
                    .write_rect(0, origin + y, width, 1, &self.line[..])?;
            }
            return Ok(sent);
        }
        if surface.is_packed() {
            return self
                .transport
                .write_rect(0, origin + first, width, count, surface.rows(first, count));
        }
        let mut sent = 0;
        for y in first..first + count {
            sent += self
                .transport
                .write_rect(0, origin + y, width, 1, surface.row(y))?;
        }
        Ok(sent)
    }

    /// Whole surface, or only its dirty rows when `tracking` is on.
    fn flush_back(
        &mut self,
        back: &mut Backbuffer,
        origin: u16,
        tracking: bool,
    ) -> Result<usize, T::Error> {
        let span = back.dirty.take();
        let (first, last) = match (tracking, span) {
            (true, None) => return Ok(0),
            (true, Some(span)) => span,
            (false, _) => (0, back.surface.height() - 1),
        };
        let result = self.transfer(&back.surface, origin, first, last - first + 1);
        if result.is_err() {
            if let Some((y0, y1)) = span {
                back.dirty.mark(y0, y1);
            }
        }
        result
    }

    /// Local rows `first..=last`; clears the dirty span if it was covered.
    fn flush_hint(
        &mut self,
        back: &mut Backbuffer,
        origin: u16,
        first: u16,
        last: u16,
    ) -> Result<usize, T::Error> {
        let sent = self.transfer(&back.surface, origin, first, last - first + 1)?;
        if let Some((y0, y1)) = back.dirty.span() {
            if first <= y0 && y1 <= last {
                back.dirty.take();
            }
        }
        Ok(sent)
    }
}

impl<T, M> MipiHal<T, M>
where
    T: Transport,
    M: GuardMutex,
{
    /// Transfers the back buffer and returns the bytes the transport
    /// reported.
    ///
    /// Triple buffering hands drawing over to the other surface once the
    /// transfer succeeded; a failed transfer leaves the roles unchanged.
    pub fn flush(&self) -> Result<usize, HalError<T::Error>> {
        let tracking = self.dirty_tracking;
        let sent = self.with_state(|state| -> Result<usize, T::Error> {
            let HalState {
                transport,
                buffers,
                palette,
                line,
            } = state;
            let mut sink = RowSink {
                transport,
                palette,
                line,
            };
            match buffers {
                Buffers::Unbuffered => Ok(0),
                Buffers::Single(back) | Buffers::Double(back) => {
                    sink.flush_back(back, 0, tracking)
                }
                Buffers::Triple { surfaces, current } => {
                    let back = &mut surfaces[*current];
                    let height = back.surface.height();
                    let sent = sink.transfer(&back.surface, 0, 0, height)?;
                    back.dirty.take();
                    *current ^= 1;
                    log::trace!("hal: swap current={}", *current);
                    Ok(sent)
                }
                Buffers::SplitDouble { blocks, split } => {
                    let [upper, lower] = blocks;
                    let upper_sent = sink.flush_back(upper, 0, tracking)?;
                    let lower_sent = sink.flush_back(lower, *split, tracking)?;
                    Ok(upper_sent + lower_sent)
                }
            }
        })?;
        log::trace!("hal: flush mode={} bytes={}", self.mode.name(), sent);
        Ok(sent)
    }

    /// Transfers display rows `y0..=y1` regardless of dirty tracking.
    ///
    /// Not available for triple buffering, where part of a rotating buffer
    /// would mix two frames on the panel.
    pub fn flush_rows(&self, y0: u16, y1: u16) -> Result<usize, HalError<T::Error>> {
        let y1 = y1.min(self.height - 1);
        if y0 > y1 {
            return Ok(0);
        }
        let sent = self.with_state(|state| -> Result<usize, TransportError<T>> {
            let HalState {
                transport,
                buffers,
                palette,
                line,
            } = state;
            let mut sink = RowSink {
                transport,
                palette,
                line,
            };
            match buffers {
                Buffers::Unbuffered => Ok(0),
                Buffers::Triple { .. } => {
                    Err(HalError::Unsupported(UnsupportedOp::PartialTripleFlush))
                }
                Buffers::Single(back) | Buffers::Double(back) => {
                    Ok(sink.flush_hint(back, 0, y0, y1)?)
                }
                Buffers::SplitDouble { blocks, split } => {
                    let split = *split;
                    let [upper, lower] = blocks;
                    let mut sent = 0;
                    if y0 < split {
                        sent += sink.flush_hint(upper, 0, y0, y1.min(split - 1))?;
                    }
                    if y1 >= split {
                        sent += sink.flush_hint(lower, split, y0.max(split) - split, y1 - split)?;
                    }
                    Ok(sent)
                }
            }
        })?;
        log::trace!("hal: flush_rows y0={} y1={} bytes={}", y0, y1, sent);
        Ok(sent)
    }
}
