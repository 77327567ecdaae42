use embedded_graphics::{
    pixelcolor::{Rgb888, RgbColor},
    prelude::{Dimensions, DrawTarget, OriginDimensions, Pixel, Size},
    primitives::Rectangle,
};

use crate::platform::Transport;

use super::{GuardMutex, HalError, MipiHal, TransportError, UnsupportedOp};

impl<T, M: GuardMutex> OriginDimensions for MipiHal<T, M> {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

impl<T, M> MipiHal<T, M>
where
    T: Transport,
    M: GuardMutex,
{
    fn raw_color(&self, color: Rgb888) -> Result<u32, TransportError<T>> {
        self.format
            .encode_rgb(color.r(), color.g(), color.b())
            .ok_or(HalError::Unsupported(UnsupportedOp::IndexedColor))
    }
}

impl<T, M> DrawTarget for MipiHal<T, M>
where
    T: Transport,
    M: GuardMutex,
{
    type Color = Rgb888;
    type Error = TransportError<T>;

    fn draw_iter<It>(&mut self, pixels: It) -> core::result::Result<(), Self::Error>
    where
        It: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = (self.width as i32, self.height as i32);
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 || point.x >= width || point.y >= height {
                continue;
            }
            let raw = self.raw_color(color)?;
            self.put_pixel(point.x as u16, point.y as u16, raw)?;
        }
        Ok(())
    }

    fn fill_solid(
        &mut self,
        area: &Rectangle,
        color: Self::Color,
    ) -> core::result::Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(());
        };
        let raw = self.raw_color(color)?;
        let x = area.top_left.x as u16;
        let width = area.size.width as u16;
        for y in area.top_left.y..=bottom_right.y {
            self.hline(x, y as u16, width, raw)?;
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> core::result::Result<(), Self::Error> {
        let area = self.bounding_box();
        self.fill_solid(&area, color)
    }
}
