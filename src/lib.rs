#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod color;
pub mod config;
pub mod drivers;
pub mod hal;
pub mod memory;
pub mod platform;
pub mod surface;

pub use color::{rgb565, Palette, PixelFormat};
pub use config::{BufferingMode, ConfigError, ConfigOptions, HalConfig};
pub use hal::{
    GuardMutex, HalError, LockedMipiHal, MipiHal, TransportError, UnlockedMipiHal, UnsupportedOp,
};
pub use memory::{BoundedAlloc, BufferAllocError, BufferPlacement, FrameMemory, HeapAlloc};
pub use platform::{BufferAlloc, Transport};
pub use surface::{DirtyRows, PixelSurface, SurfaceInfo, SurfaceView};
