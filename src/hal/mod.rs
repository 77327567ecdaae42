use core::cell::RefCell;

use embassy_sync::blocking_mutex::{
    raw::{CriticalSectionRawMutex, NoopRawMutex, RawMutex},
    Mutex,
};
use heapless::Vec;

use crate::{
    color::{Palette, PixelFormat},
    config::{BufferingMode, ConfigError, HalConfig, MAX_LINE_BYTES},
    memory::BufferAllocError,
    platform::{BufferAlloc, Transport},
    surface::{PixelSurface, SurfaceInfo},
};

use strategy::Buffers;

mod flush;
#[cfg(feature = "graphics")]
mod graphics;
mod router;
mod strategy;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnsupportedOp {
    /// Resampling straight to panel memory is not implemented.
    ScaleBlitUnbuffered,
    /// A run or blit crosses the split row.
    StraddlesSplit,
    /// Blit source format differs from the framebuffer format.
    FormatMismatch,
    /// Direct colors cannot be drawn into an indexed framebuffer.
    IndexedColor,
    /// Partial transfer of a rotating triple buffer.
    PartialTripleFlush,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HalError<E> {
    AllocationFailure(BufferAllocError),
    InvalidConfiguration(ConfigError),
    Unsupported(UnsupportedOp),
    TransferFailure(E),
}

impl<E> From<E> for HalError<E> {
    fn from(value: E) -> Self {
        Self::TransferFailure(value)
    }
}

/// Error type of a HAL driving transport `T`.
pub type TransportError<T> = HalError<<T as Transport>::Error>;

/// Raw mutex that can back the HAL guard.
///
/// `LOCKING` tells whether the mutex really excludes other contexts, so
/// `lock_on_flush` can be checked against the chosen type at init.
pub trait GuardMutex: RawMutex {
    const LOCKING: bool;
}

impl GuardMutex for NoopRawMutex {
    const LOCKING: bool = false;
}

impl GuardMutex for CriticalSectionRawMutex {
    const LOCKING: bool = true;
}

/// HAL whose router and flush share a critical-section lock. Contexts
/// waiting for the lock are not served in any particular order.
///
/// Each HAL owns its own guard, but a critical section is global: on target
/// it masks interrupts for the length of every call, whole frame transfers
/// included, and excludes every other critical section meanwhile. RTOS
/// targets that need a per-instance lock can implement [`GuardMutex`] for
/// their own [`RawMutex`] and use `MipiHal<T, TheirMutex>`.
pub type LockedMipiHal<T> = MipiHal<T, CriticalSectionRawMutex>;
/// HAL for a single context; the guard compiles to nothing.
pub type UnlockedMipiHal<T> = MipiHal<T, NoopRawMutex>;

struct HalState<T> {
    transport: T,
    buffers: Buffers,
    palette: Palette,
    line: Vec<u8, MAX_LINE_BYTES>,
}

/// Buffered MIPI DCS display.
///
/// All framebuffers, the palette and the transport live behind one guard,
/// so every drawing call and every flush is serialised per display.
pub struct MipiHal<T, M: GuardMutex = NoopRawMutex> {
    width: u16,
    height: u16,
    format: PixelFormat,
    mode: BufferingMode,
    dirty_tracking: bool,
    state: Mutex<M, RefCell<HalState<T>>>,
}

impl<T, M> MipiHal<T, M>
where
    T: Transport,
    M: GuardMutex,
{
    /// Validates `config` and allocates every framebuffer the mode needs.
    ///
    /// Fails with `InvalidConfiguration` before touching the allocator, and
    /// with `AllocationFailure` if any buffer cannot be obtained. There is no
    /// fallback to a cheaper mode.
    pub fn init<A>(
        config: HalConfig,
        transport: T,
        alloc: &mut A,
    ) -> Result<Self, HalError<T::Error>>
    where
        A: BufferAlloc,
    {
        config
            .validate()
            .map_err(TransportError::<T>::InvalidConfiguration)?;
        if config.lock_on_flush != M::LOCKING {
            return Err(HalError::InvalidConfiguration(ConfigError::GuardMismatch {
                lock_on_flush: config.lock_on_flush,
            }));
        }

        let buffers =
            Buffers::allocate(&config, alloc).map_err(TransportError::<T>::AllocationFailure)?;
        log::info!(
            "hal: init mode={} format={} width={} height={} buffer_bytes={} locking={}",
            config.mode.name(),
            config.format.name(),
            config.width,
            config.height,
            buffers.total_bytes(),
            M::LOCKING
        );

        Ok(Self {
            width: config.width,
            height: config.height,
            format: config.format,
            mode: config.mode,
            dirty_tracking: config.dirty_tracking,
            state: Mutex::new(RefCell::new(HalState {
                transport,
                buffers,
                palette: config.palette,
                line: Vec::new(),
            })),
        })
    }
}

impl<T, M: GuardMutex> MipiHal<T, M> {
    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn mode(&self) -> BufferingMode {
        self.mode
    }

    pub fn dirty_tracking(&self) -> bool {
        self.dirty_tracking
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut HalState<T>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Descriptor of the surface the application draws into.
    ///
    /// `None` when there is no single drawable surface: unbuffered, or the
    /// rows are split across two blocks.
    pub fn surface_info(&self) -> Option<SurfaceInfo> {
        self.with_state(|state| state.buffers.front().map(|back| back.surface.info()))
    }

    /// Borrows the current drawing surface under the guard.
    pub fn with_front<R>(&self, f: impl FnOnce(&PixelSurface) -> R) -> Option<R> {
        self.with_state(|state| state.buffers.front().map(|back| f(&back.surface)))
    }

    /// Index of the current triple-buffer surface, `None` for other modes.
    pub fn current_index(&self) -> Option<usize> {
        self.with_state(|state| state.buffers.current_index())
    }

    pub fn set_palette(&self, palette: Palette) {
        self.with_state(|state| state.palette = palette);
    }

    /// Tears the HAL down, freeing every framebuffer.
    pub fn release(self) -> T {
        self.state.into_inner().into_inner().transport
    }
}

#[cfg(test)]
mod tests;
