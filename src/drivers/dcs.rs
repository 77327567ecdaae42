use embedded_hal::{digital::OutputPin, spi::SpiDevice};

use crate::{config::DCS_CHUNK_BYTES, platform::Transport};

pub mod dcs_command {
    pub const CASET: u8 = 0x2A; // Set column address
    pub const RASET: u8 = 0x2B; // Set row (page) address
    pub const RAMWR: u8 = 0x2C; // Write frame memory
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DcsError<SPI, DC> {
    Spi(SPI),
    Dc(DC),
}

/// Four-wire SPI link to a MIPI DCS panel: SPI device plus data/command pin.
///
/// Only the window and memory-write commands are issued here; the panel
/// must already be initialised.
pub struct DcsSpiTransport<SPI, DC> {
    spi: SPI,
    dc: DC,
    chunk_bytes: usize,
}

impl<SPI, DC> DcsSpiTransport<SPI, DC>
where
    SPI: SpiDevice,
    DC: OutputPin,
{
    pub fn new(spi: SPI, dc: DC) -> Self {
        Self {
            spi,
            dc,
            chunk_bytes: DCS_CHUNK_BYTES,
        }
    }

    /// Caps each SPI write, e.g. to the DMA descriptor size.
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    pub fn release(self) -> (SPI, DC) {
        (self.spi, self.dc)
    }

    pub fn send_command(
        &mut self,
        command: u8,
        args: &[u8],
    ) -> Result<(), DcsError<SPI::Error, DC::Error>> {
        self.dc.set_low().map_err(DcsError::Dc)?;
        self.spi.write(&[command]).map_err(DcsError::Spi)?;
        if !args.is_empty() {
            self.dc.set_high().map_err(DcsError::Dc)?;
            self.spi.write(args).map_err(DcsError::Spi)?;
        }
        Ok(())
    }

    /// Sets the inclusive window `(x0, y0)..=(x1, y1)` for the next RAMWR.
    fn set_window(
        &mut self,
        x0: u16,
        y0: u16,
        x1: u16,
        y1: u16,
    ) -> Result<(), DcsError<SPI::Error, DC::Error>> {
        let [x0_hi, x0_lo] = x0.to_be_bytes();
        let [x1_hi, x1_lo] = x1.to_be_bytes();
        self.send_command(dcs_command::CASET, &[x0_hi, x0_lo, x1_hi, x1_lo])?;
        let [y0_hi, y0_lo] = y0.to_be_bytes();
        let [y1_hi, y1_lo] = y1.to_be_bytes();
        self.send_command(dcs_command::RASET, &[y0_hi, y0_lo, y1_hi, y1_lo])
    }
}

impl<SPI, DC> Transport for DcsSpiTransport<SPI, DC>
where
    SPI: SpiDevice,
    DC: OutputPin,
{
    type Error = DcsError<SPI::Error, DC::Error>;

    fn write_rect(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        pixels: &[u8],
    ) -> Result<usize, Self::Error> {
        if width == 0 || height == 0 || pixels.is_empty() {
            return Ok(0);
        }
        self.set_window(x, y, x + width - 1, y + height - 1)?;
        self.send_command(dcs_command::RAMWR, &[])?;
        self.dc.set_high().map_err(DcsError::Dc)?;
        for chunk in pixels.chunks(self.chunk_bytes) {
            self.spi.write(chunk).map_err(DcsError::Spi)?;
        }
        Ok(pixels.len())
    }
}
