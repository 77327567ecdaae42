use crate::{
    config::{BufferingMode, HalConfig},
    memory::{BufferAllocError, BufferPlacement},
    platform::BufferAlloc,
    surface::{DirtyRows, PixelSurface},
};

use super::UnsupportedOp;

pub(super) struct Backbuffer {
    pub(super) surface: PixelSurface,
    pub(super) dirty: DirtyRows,
}

/// Framebuffers owned by one display, one variant per buffering mode.
pub(super) enum Buffers {
    Unbuffered,
    Single(Backbuffer),
    Double(Backbuffer),
    /// Drawing goes to `surfaces[current]`; a completed flush flips `current`.
    Triple {
        surfaces: [Backbuffer; 2],
        current: usize,
    },
    /// Block 0 holds rows `[0, split)`, block 1 rows `[split, height)`.
    SplitDouble {
        blocks: [Backbuffer; 2],
        split: u16,
    },
}

fn allocate_surface<A: BufferAlloc>(
    config: &HalConfig,
    rows: u16,
    placement: BufferPlacement,
    index: usize,
    alloc: &mut A,
) -> Result<Backbuffer, BufferAllocError> {
    let stride = config.stride();
    let bytes = stride * rows as usize;
    let memory = alloc.alloc_zeroed(bytes, placement).map_err(|err| {
        log::error!(
            "hal: buffer alloc failed index={} bytes={} placement={:?} err={:?}",
            index,
            bytes,
            placement,
            err
        );
        err
    })?;
    log::info!(
        "hal: buffer alloc index={} width={} rows={} stride={} bytes={} placement={:?}",
        index,
        config.width,
        rows,
        stride,
        bytes,
        placement
    );
    Ok(Backbuffer {
        surface: PixelSurface::new(config.width, rows, config.format, stride, memory),
        dirty: DirtyRows::default(),
    })
}

impl Buffers {
    pub(super) fn allocate<A: BufferAlloc>(
        config: &HalConfig,
        alloc: &mut A,
    ) -> Result<Self, BufferAllocError> {
        let height = config.height;
        Ok(match config.mode {
            BufferingMode::None => Self::Unbuffered,
            BufferingMode::Single => Self::Single(allocate_surface(
                config,
                height,
                BufferPlacement::Dma,
                0,
                alloc,
            )?),
            BufferingMode::Double => Self::Double(allocate_surface(
                config,
                height,
                BufferPlacement::DmaWord,
                0,
                alloc,
            )?),
            BufferingMode::Triple => {
                let first = allocate_surface(config, height, BufferPlacement::DmaWord, 0, alloc)?;
                let second = allocate_surface(config, height, BufferPlacement::DmaWord, 1, alloc)?;
                Self::Triple {
                    surfaces: [first, second],
                    current: 0,
                }
            }
            BufferingMode::SplitDouble { split_row } => {
                let upper =
                    allocate_surface(config, split_row, BufferPlacement::DmaWord, 0, alloc)?;
                let lower = allocate_surface(
                    config,
                    height - split_row,
                    BufferPlacement::DmaWord,
                    1,
                    alloc,
                )?;
                Self::SplitDouble {
                    blocks: [upper, lower],
                    split: split_row,
                }
            }
        })
    }

    pub(super) fn total_bytes(&self) -> usize {
        self.iter().map(|back| back.surface.size()).sum()
    }

    fn iter(&self) -> impl Iterator<Item = &Backbuffer> {
        let (first, second) = match self {
            Self::Unbuffered => (None, None),
            Self::Single(back) | Self::Double(back) => (Some(back), None),
            Self::Triple { surfaces, .. } => (Some(&surfaces[0]), Some(&surfaces[1])),
            Self::SplitDouble { blocks, .. } => (Some(&blocks[0]), Some(&blocks[1])),
        };
        first.into_iter().chain(second)
    }

    /// The single surface drawing currently goes to.
    pub(super) fn front(&self) -> Option<&Backbuffer> {
        match self {
            Self::Single(back) | Self::Double(back) => Some(back),
            Self::Triple { surfaces, current } => Some(&surfaces[*current]),
            Self::Unbuffered | Self::SplitDouble { .. } => None,
        }
    }

    pub(super) fn current_index(&self) -> Option<usize> {
        match self {
            Self::Triple { current, .. } => Some(*current),
            _ => None,
        }
    }

    /// Resolves the surface owning rows `y..y + rows` and the row local to it.
    ///
    /// `Ok(None)` means there is no host buffer.
    pub(super) fn target_mut(
        &mut self,
        y: u16,
        rows: u16,
    ) -> Result<Option<(&mut Backbuffer, u16)>, UnsupportedOp> {
        Ok(match self {
            Self::Unbuffered => None,
            Self::Single(back) | Self::Double(back) => Some((back, y)),
            Self::Triple { surfaces, current } => Some((&mut surfaces[*current], y)),
            Self::SplitDouble { blocks, split } => {
                let (block, local_y) = route_split(*split, y, rows)?;
                Some((&mut blocks[block], local_y))
            }
        })
    }

    pub(super) fn target(&self, y: u16) -> Option<(&Backbuffer, u16)> {
        match self {
            Self::Unbuffered => None,
            Self::SplitDouble { blocks, split } => {
                let (block, local_y) = block_of(*split, y);
                Some((&blocks[block], local_y))
            }
            _ => self.front().map(|back| (back, y)),
        }
    }

    /// Zeroes every owned surface, including the idle triple buffer.
    pub(super) fn clear_all(&mut self) {
        let clear = |back: &mut Backbuffer| {
            back.surface.clear();
            let height = back.surface.height();
            back.dirty.mark_all(height);
        };
        match self {
            Self::Unbuffered => {}
            Self::Single(back) | Self::Double(back) => clear(back),
            Self::Triple { surfaces, .. } => surfaces.iter_mut().for_each(clear),
            Self::SplitDouble { blocks, .. } => blocks.iter_mut().for_each(clear),
        }
    }
}

#[inline]
pub(super) fn block_of(split: u16, y: u16) -> (usize, u16) {
    if y < split {
        (0, y)
    } else {
        (1, y - split)
    }
}

/// A span of `rows` starting at `y` must stay on one side of the split.
pub(super) fn route_split(split: u16, y: u16, rows: u16) -> Result<(usize, u16), UnsupportedOp> {
    let (block, local_y) = block_of(split, y);
    let last = y.saturating_add(rows.max(1) - 1);
    if block_of(split, last).0 != block {
        return Err(UnsupportedOp::StraddlesSplit);
    }
    Ok((block, local_y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_row_has_exactly_one_block() {
        let split = 5;
        assert_eq!(block_of(split, 0), (0, 0));
        assert_eq!(block_of(split, 4), (0, 4));
        assert_eq!(block_of(split, 5), (1, 0));
        assert_eq!(block_of(split, 9), (1, 4));
    }

    #[test]
    fn spans_crossing_the_split_are_rejected() {
        assert_eq!(route_split(5, 3, 2), Ok((0, 3)));
        assert_eq!(route_split(5, 5, 3), Ok((1, 0)));
        assert_eq!(route_split(5, 4, 2), Err(UnsupportedOp::StraddlesSplit));
        assert_eq!(route_split(5, 0, 0), Ok((0, 0)));
    }
}
