use core::sync::atomic::{AtomicBool, Ordering};
use std::{vec, vec::Vec};

use super::*;
use crate::{
    color::PALETTE_LEN,
    memory::{BoundedAlloc, HeapAlloc},
    surface::SurfaceView,
};

#[derive(Clone, Debug, PartialEq, Eq)]
struct Rect {
    x: u16,
    y: u16,
    width: u16,
    height: u16,
    bytes: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LinkDown;

#[derive(Default)]
struct Recorder {
    writes: Vec<Rect>,
    fail_at: Option<usize>,
    attempts: usize,
}

impl Recorder {
    fn failing_at(attempt: usize) -> Self {
        Self {
            fail_at: Some(attempt),
            ..Self::default()
        }
    }
}

impl Transport for Recorder {
    type Error = LinkDown;

    fn write_rect(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        pixels: &[u8],
    ) -> Result<usize, Self::Error> {
        let attempt = self.attempts;
        self.attempts += 1;
        if self.fail_at == Some(attempt) {
            return Err(LinkDown);
        }
        self.writes.push(Rect {
            x,
            y,
            width,
            height,
            bytes: pixels.to_vec(),
        });
        Ok(pixels.len())
    }
}

fn config(width: u16, height: u16, format: PixelFormat, mode: BufferingMode) -> HalConfig {
    HalConfig::new(width, height, format, mode)
}

fn hal(config: HalConfig) -> UnlockedMipiHal<Recorder> {
    MipiHal::init(config, Recorder::default(), &mut HeapAlloc).unwrap()
}

fn init_err(config: HalConfig) -> HalError<LinkDown> {
    match UnlockedMipiHal::init(config, Recorder::default(), &mut HeapAlloc) {
        Ok(_) => panic!("init unexpectedly succeeded"),
        Err(err) => err,
    }
}

#[test]
fn double_flush_sends_whole_frame_big_endian() {
    let hal = hal(config(64, 64, PixelFormat::Rgb565, BufferingMode::Double));
    hal.put_pixel(0, 0, 0xF800).unwrap();

    assert_eq!(hal.flush().unwrap(), 8192);

    let writes = hal.release().writes;
    assert_eq!(writes.len(), 1);
    let frame = &writes[0];
    assert_eq!((frame.x, frame.y, frame.width, frame.height), (0, 0, 64, 64));
    assert_eq!(&frame.bytes[..2], &[0xF8, 0x00]);
    assert!(frame.bytes[2..].iter().all(|&b| b == 0));
}

#[test]
fn direct_color_frames_go_out_three_bytes_per_pixel() {
    let hal = hal(config(2, 1, PixelFormat::Rgb888, BufferingMode::Single));
    hal.put_pixel(0, 0, 0xFF_00_00).unwrap();
    hal.put_pixel(1, 0, 0x00_FF_00).unwrap();

    assert_eq!(hal.flush(), Ok(6));
    let writes = hal.release().writes;
    assert_eq!(writes.len(), 1);
    assert_eq!((writes[0].width, writes[0].height), (2, 1));
    assert_eq!(writes[0].bytes, vec![0xFF, 0x00, 0x00, 0x00, 0xFF, 0x00]);
}

#[test]
fn rgb666_rows_are_repacked_per_row() {
    let hal = hal(config(3, 2, PixelFormat::Rgb666, BufferingMode::Double).with_row_align(16));
    assert_eq!(hal.surface_info().map(|info| info.stride), Some(16));
    hal.hline(0, 1, 3, 0xFC_00_80).unwrap();

    assert_eq!(hal.flush(), Ok(2 * 3 * 3));
    let writes = hal.release().writes;
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].bytes, vec![0; 9]);
    assert_eq!(writes[1].y, 1);
    assert_eq!(writes[1].bytes, [0xFC, 0x00, 0x80].repeat(3));
}

#[test]
fn widest_direct_color_line_is_sent_whole() {
    // 1365 * 3 bytes is the last width that fits the scratch line.
    let hal = hal(config(1365, 1, PixelFormat::Rgb888, BufferingMode::Single));
    hal.put_pixel(1364, 0, 0x12_34_56).unwrap();
    assert_eq!(hal.flush(), Ok(4095));
    let writes = hal.release().writes;
    assert_eq!(&writes[0].bytes[4092..], &[0x12, 0x34, 0x56]);

    assert_eq!(
        init_err(config(1366, 1, PixelFormat::Rgb888, BufferingMode::Single)),
        HalError::InvalidConfiguration(ConfigError::LineTooWide { bytes: 4098 })
    );
}

#[test]
fn unbuffered_direct_color_writes_are_packed() {
    let hal = hal(config(4, 4, PixelFormat::Rgb888, BufferingMode::None));
    hal.hline(0, 0, 2, 0x01_02_03).unwrap();
    let src = [0x00, 0xAA, 0xBB, 0xCC, 0x00, 0x11, 0x22, 0x33];
    hal.blit(1, 2, &SurfaceView::new(2, 1, PixelFormat::Rgb888, &src).unwrap())
        .unwrap();

    let writes = hal.release().writes;
    assert_eq!(writes[0].bytes, vec![0x01, 0x02, 0x03, 0x01, 0x02, 0x03]);
    assert_eq!((writes[1].x, writes[1].y, writes[1].width), (1, 2, 2));
    assert_eq!(writes[1].bytes, vec![0xAA, 0xBB, 0xCC, 0x11, 0x22, 0x33]);
}

#[test]
fn repeated_flush_without_drawing_repeats_bytes() {
    for mode in [BufferingMode::Single, BufferingMode::Double] {
        let hal = hal(config(8, 4, PixelFormat::Rgb565, mode));
        hal.hline(1, 2, 5, 0x1234).unwrap();
        hal.flush().unwrap();
        hal.flush().unwrap();
        let writes = hal.release().writes;
        assert_eq!(writes[0], writes[1]);
    }
}

#[test]
fn every_mode_reads_back_what_was_drawn() {
    let modes = [
        BufferingMode::Single,
        BufferingMode::Double,
        BufferingMode::Triple,
        BufferingMode::SplitDouble { split_row: 3 },
    ];
    for mode in modes {
        let hal = hal(config(6, 6, PixelFormat::Rgb888, mode));
        for y in 0..6 {
            hal.put_pixel(y, y, 0x0010_2030 + y as u32).unwrap();
        }
        for y in 0..6 {
            assert_eq!(hal.pixel(y, y), Some(0x0010_2030 + y as u32), "{:?}", mode);
        }
    }
}

#[test]
fn triple_alternates_current_surface() {
    let hal = hal(config(4, 4, PixelFormat::Rgb565, BufferingMode::Triple));
    assert_eq!(hal.current_index(), Some(0));
    for flushes in 1..=5 {
        hal.flush().unwrap();
        assert_eq!(hal.current_index(), Some(flushes % 2));
    }
}

#[test]
fn triple_draws_into_the_other_surface_after_flush() {
    let hal = hal(config(4, 2, PixelFormat::Rgb565, BufferingMode::Triple));
    hal.put_pixel(0, 0, 0xAAAA).unwrap();
    hal.flush().unwrap();

    assert_eq!(hal.pixel(0, 0), Some(0));
    hal.put_pixel(1, 0, 0xBBBB).unwrap();
    hal.flush().unwrap();

    let writes = hal.release().writes;
    assert_eq!(&writes[0].bytes[..4], &[0xAA, 0xAA, 0x00, 0x00]);
    assert_eq!(&writes[1].bytes[..4], &[0x00, 0x00, 0xBB, 0xBB]);
}

#[test]
fn triple_keeps_roles_when_transfer_fails() {
    let hal: UnlockedMipiHal<Recorder> = MipiHal::init(
        config(4, 2, PixelFormat::Rgb565, BufferingMode::Triple),
        Recorder::failing_at(0),
        &mut HeapAlloc,
    )
    .unwrap();
    hal.put_pixel(0, 0, 0x1111).unwrap();

    assert_eq!(hal.flush(), Err(HalError::TransferFailure(LinkDown)));
    assert_eq!(hal.current_index(), Some(0));

    assert_eq!(hal.flush(), Ok(16));
    assert_eq!(hal.current_index(), Some(1));
    let writes = hal.release().writes;
    assert_eq!(&writes[0].bytes[..2], &[0x11, 0x11]);
}

#[test]
fn split_rows_route_to_their_block() {
    let hal = hal(config(
        2,
        8,
        PixelFormat::Indexed8,
        BufferingMode::SplitDouble { split_row: 4 },
    ));
    let mut entries = [0u16; PALETTE_LEN];
    entries[7] = 0x7777;
    entries[9] = 0x9999;
    hal.set_palette(Palette::from_entries(entries));
    hal.put_pixel(1, 3, 7).unwrap();
    hal.put_pixel(0, 4, 9).unwrap();

    assert_eq!(hal.surface_info(), None);
    assert_eq!(hal.flush().unwrap(), 8 * 2 * 2);

    let writes = hal.release().writes;
    // Indexed frames go out one expanded row at a time.
    assert_eq!(writes.len(), 8);
    assert_eq!(writes[3].y, 3);
    assert_eq!(writes[3].bytes, vec![0x00, 0x00, 0x77, 0x77]);
    assert_eq!(writes[4].y, 4);
    assert_eq!(writes[4].bytes, vec![0x99, 0x99, 0x00, 0x00]);
}

#[test]
fn split_flush_addresses_both_blocks() {
    let hal = hal(config(
        3,
        5,
        PixelFormat::Rgb565,
        BufferingMode::SplitDouble { split_row: 2 },
    ));
    assert_eq!(hal.flush().unwrap(), 3 * 5 * 2);
    let writes = hal.release().writes;
    assert_eq!(
        writes
            .iter()
            .map(|w| (w.x, w.y, w.width, w.height))
            .collect::<Vec<_>>(),
        vec![(0, 0, 3, 2), (0, 2, 3, 3)]
    );
}

#[test]
fn split_rejects_spans_across_the_boundary() {
    let hal = hal(config(
        4,
        8,
        PixelFormat::Rgb565,
        BufferingMode::SplitDouble { split_row: 4 },
    ));
    assert_eq!(
        hal.vline(0, 2, 4, 0xFFFF),
        Err(HalError::Unsupported(UnsupportedOp::StraddlesSplit))
    );
    let src = [0u8; 2 * 2 * 2];
    let view = SurfaceView::new(2, 2, PixelFormat::Rgb565, &src).unwrap();
    assert_eq!(
        hal.blit(0, 3, &view),
        Err(HalError::Unsupported(UnsupportedOp::StraddlesSplit))
    );
    assert_eq!(hal.pixel(0, 2), Some(0));
    hal.vline(0, 4, 4, 0xFFFF).unwrap();
    assert_eq!(hal.pixel(0, 7), Some(0xFFFF));
}

#[test]
fn indexed_flush_expands_through_palette() {
    let mut entries = [0u16; PALETTE_LEN];
    entries[1] = 0xFFFF;
    let hal = hal(
        config(16, 1, PixelFormat::Indexed8, BufferingMode::Single)
            .with_palette(Palette::from_entries(entries)),
    );
    for x in (0..16).step_by(2) {
        hal.put_pixel(x, 0, 1).unwrap();
    }
    assert_eq!(hal.pixel(0, 0), Some(1));

    assert_eq!(hal.flush().unwrap(), 32);
    let writes = hal.release().writes;
    assert_eq!(writes.len(), 1);
    let expected: Vec<u8> = (0..16)
        .flat_map(|x| if x % 2 == 0 { [0xFF, 0xFF] } else { [0x00, 0x00] })
        .collect();
    assert_eq!(writes[0].bytes, expected);
}

#[test]
fn split_row_outside_display_is_rejected() {
    for split_row in [0, 16] {
        let err = init_err(config(
            8,
            16,
            PixelFormat::Rgb565,
            BufferingMode::SplitDouble { split_row },
        ));
        assert_eq!(
            err,
            HalError::InvalidConfiguration(ConfigError::SplitRowOutOfRange {
                split_row,
                height: 16
            })
        );
    }
}

#[test]
fn lock_flag_must_match_guard_type() {
    let config = config(8, 8, PixelFormat::Rgb565, BufferingMode::Single).with_lock_on_flush(true);
    let err = init_err(config);
    assert_eq!(
        err,
        HalError::InvalidConfiguration(ConfigError::GuardMismatch {
            lock_on_flush: true
        })
    );
}

/// Lock owned by one HAL; re-entering the same instance is a bug.
struct InstanceLock {
    held: AtomicBool,
}

unsafe impl RawMutex for InstanceLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        held: AtomicBool::new(false),
    };

    fn lock<R>(&self, f: impl FnOnce() -> R) -> R {
        assert!(!self.held.swap(true, Ordering::Acquire), "guard re-entered");
        let result = f();
        self.held.store(false, Ordering::Release);
        result
    }
}

impl GuardMutex for InstanceLock {
    const LOCKING: bool = true;
}

#[test]
fn custom_guard_locks_each_display_separately() {
    let locked = |width| {
        let config =
            config(width, 2, PixelFormat::Rgb565, BufferingMode::Single).with_lock_on_flush(true);
        MipiHal::<Recorder, InstanceLock>::init(config, Recorder::default(), &mut HeapAlloc)
            .unwrap()
    };
    let (first, second) = (locked(2), locked(3));
    first.put_pixel(0, 0, 0xFFFF).unwrap();

    // Holding the first display's guard does not block the second one.
    let nested = first.with_front(|_| second.flush());
    assert_eq!(nested, Some(Ok(3 * 2 * 2)));
    assert_eq!(first.flush(), Ok(2 * 2 * 2));

    let config = config(2, 2, PixelFormat::Rgb565, BufferingMode::Single);
    assert!(matches!(
        MipiHal::<Recorder, InstanceLock>::init(config, Recorder::default(), &mut HeapAlloc),
        Err(HalError::InvalidConfiguration(ConfigError::GuardMismatch {
            lock_on_flush: false
        }))
    ));
}

#[test]
fn allocation_failure_is_fatal() {
    let mut alloc = BoundedAlloc::new(64 * 64 * 2);
    let result = UnlockedMipiHal::init(
        config(64, 64, PixelFormat::Rgb565, BufferingMode::Triple),
        Recorder::default(),
        &mut alloc,
    );
    assert!(matches!(
        result,
        Err(HalError::AllocationFailure(
            BufferAllocError::BudgetExhausted { .. }
        ))
    ));
}

#[test]
fn unbuffered_writes_go_straight_to_transport() {
    let hal = hal(config(8, 8, PixelFormat::Rgb565, BufferingMode::None));
    hal.put_pixel(1, 2, 0xF800).unwrap();
    hal.hline(0, 3, 4, 0x07E0).unwrap();
    hal.vline(5, 1, 3, 0x001F).unwrap();
    let src = [0x12u8, 0x34, 0x56, 0x78];
    hal.blit(6, 6, &SurfaceView::new(2, 1, PixelFormat::Rgb565, &src).unwrap())
        .unwrap();

    assert_eq!(hal.flush(), Ok(0));
    assert_eq!(hal.pixel(1, 2), None);
    assert_eq!(hal.surface_info(), None);
    assert_eq!(
        hal.scale_blit(0, 0, 4, 2, &SurfaceView::new(2, 1, PixelFormat::Rgb565, &src).unwrap()),
        Err(HalError::Unsupported(UnsupportedOp::ScaleBlitUnbuffered))
    );

    let writes = hal.release().writes;
    assert_eq!(
        writes[0],
        Rect {
            x: 1,
            y: 2,
            width: 1,
            height: 1,
            bytes: vec![0xF8, 0x00]
        }
    );
    assert_eq!((writes[1].width, writes[1].height), (4, 1));
    assert_eq!(writes[1].bytes, [0x07, 0xE0].repeat(4));
    assert_eq!((writes[2].width, writes[2].height), (1, 3));
    assert_eq!(writes[2].bytes.len(), 6);
    assert_eq!(writes[3].bytes, src.to_vec());
}

#[test]
fn unbuffered_clear_streams_zero_rows() {
    let hal = hal(config(4, 3, PixelFormat::Rgb565, BufferingMode::None));
    hal.clear_screen().unwrap();
    let writes = hal.release().writes;
    assert_eq!(writes.len(), 3);
    for (y, row) in writes.iter().enumerate() {
        assert_eq!((row.y, row.width, row.height), (y as u16, 4, 1));
        assert_eq!(row.bytes, vec![0; 8]);
    }
}

#[test]
fn unbuffered_transfer_failure_is_returned() {
    let hal: UnlockedMipiHal<Recorder> = MipiHal::init(
        config(4, 4, PixelFormat::Rgb565, BufferingMode::None),
        Recorder::failing_at(0),
        &mut HeapAlloc,
    )
    .unwrap();
    assert_eq!(hal.put_pixel(0, 0, 1), Err(HalError::TransferFailure(LinkDown)));
    assert_eq!(hal.put_pixel(0, 0, 1), Ok(()));
}

#[test]
fn dirty_tracking_sends_only_touched_rows() {
    let hal = hal(
        config(4, 8, PixelFormat::Rgb565, BufferingMode::Single).with_dirty_tracking(true),
    );
    assert_eq!(hal.flush(), Ok(0));

    hal.put_pixel(0, 3, 0xFFFF).unwrap();
    hal.vline(2, 5, 2, 0xFFFF).unwrap();
    assert_eq!(hal.flush(), Ok(4 * 2 * 4));
    assert_eq!(hal.flush(), Ok(0));

    let writes = hal.release().writes;
    assert_eq!(writes.len(), 1);
    assert_eq!((writes[0].y, writes[0].height), (3, 4));
}

#[test]
fn dirty_span_survives_failed_transfer() {
    let hal: UnlockedMipiHal<Recorder> = MipiHal::init(
        config(4, 4, PixelFormat::Rgb565, BufferingMode::Double).with_dirty_tracking(true),
        Recorder::failing_at(0),
        &mut HeapAlloc,
    )
    .unwrap();
    hal.put_pixel(0, 1, 0xFFFF).unwrap();
    assert!(hal.flush().is_err());
    assert_eq!(hal.flush(), Ok(8));
}

#[test]
fn flush_rows_sends_the_hinted_span() {
    let hal = hal(config(4, 8, PixelFormat::Rgb565, BufferingMode::Double));
    assert_eq!(hal.flush_rows(2, 3), Ok(16));
    assert_eq!(hal.flush_rows(6, 100), Ok(16));
    assert_eq!(hal.flush_rows(5, 4), Ok(0));
    let writes = hal.release().writes;
    assert_eq!((writes[0].y, writes[0].height), (2, 2));
    assert_eq!((writes[1].y, writes[1].height), (6, 2));
}

#[test]
fn flush_rows_splits_across_blocks() {
    let hal = hal(config(
        2,
        6,
        PixelFormat::Rgb565,
        BufferingMode::SplitDouble { split_row: 3 },
    ));
    assert_eq!(hal.flush_rows(1, 4), Ok(16));
    let writes = hal.release().writes;
    assert_eq!(
        writes
            .iter()
            .map(|w| (w.y, w.height))
            .collect::<Vec<_>>(),
        vec![(1, 2), (3, 2)]
    );
}

#[test]
fn flush_rows_is_unsupported_for_triple() {
    let hal = hal(config(4, 4, PixelFormat::Rgb565, BufferingMode::Triple));
    assert_eq!(
        hal.flush_rows(0, 1),
        Err(HalError::Unsupported(UnsupportedOp::PartialTripleFlush))
    );
    assert_eq!(hal.current_index(), Some(0));
}

#[test]
fn padded_rows_are_sent_packed() {
    let hal = hal(config(3, 2, PixelFormat::Rgb565, BufferingMode::Single).with_row_align(8));
    assert_eq!(hal.surface_info().map(|info| info.stride), Some(8));
    hal.hline(0, 1, 3, 0xABCD).unwrap();
    assert_eq!(hal.flush(), Ok(12));
    let writes = hal.release().writes;
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[1].bytes, [0xAB, 0xCD].repeat(3));
}

#[test]
fn clear_screen_zeroes_both_triple_surfaces() {
    let hal = hal(config(2, 2, PixelFormat::Rgb565, BufferingMode::Triple));
    hal.put_pixel(0, 0, 0xFFFF).unwrap();
    hal.flush().unwrap();
    hal.put_pixel(1, 1, 0xFFFF).unwrap();
    hal.clear_screen().unwrap();

    assert_eq!(hal.pixel(1, 1), Some(0));
    hal.flush().unwrap();
    assert_eq!(hal.pixel(0, 0), Some(0));
}

#[test]
fn blit_and_scale_blit_into_buffer() {
    let hal = hal(config(4, 4, PixelFormat::Indexed8, BufferingMode::Single));
    let src = [1u8, 2, 3, 4];
    let view = SurfaceView::new(2, 2, PixelFormat::Indexed8, &src).unwrap();
    hal.blit(2, 0, &view).unwrap();
    hal.scale_blit(0, 2, 4, 2, &view).unwrap();

    let rows: Vec<Vec<u8>> = hal
        .with_front(|surface| (0..4).map(|y| surface.row(y).to_vec()).collect())
        .unwrap();
    assert_eq!(rows[0], vec![0, 0, 1, 2]);
    assert_eq!(rows[1], vec![0, 0, 3, 4]);
    assert_eq!(rows[2], vec![1, 1, 2, 2]);
    assert_eq!(rows[3], vec![3, 3, 4, 4]);
}

#[test]
fn blit_rejects_foreign_format() {
    let hal = hal(config(4, 4, PixelFormat::Rgb565, BufferingMode::Single));
    let src = [0u8; 4];
    let view = SurfaceView::new(2, 2, PixelFormat::Indexed8, &src).unwrap();
    assert_eq!(
        hal.blit(0, 0, &view),
        Err(HalError::Unsupported(UnsupportedOp::FormatMismatch))
    );
}

#[test]
fn surface_info_describes_front_buffer() {
    let hal = hal(config(10, 4, PixelFormat::Rgb666, BufferingMode::Double));
    assert_eq!(
        hal.surface_info(),
        Some(SurfaceInfo {
            width: 10,
            height: 4,
            format: PixelFormat::Rgb666,
            bytes_per_pixel: 4,
            stride: 40,
            size: 160,
        })
    );
}

#[cfg(feature = "graphics")]
mod graphics {
    use embedded_graphics::{
        pixelcolor::Rgb888,
        prelude::{DrawTarget, Point, Primitive, RgbColor, Size},
        primitives::{PrimitiveStyle, Rectangle},
        Drawable, Pixel,
    };

    use super::*;

    #[test]
    fn draw_target_clips_and_encodes() {
        let mut hal = hal(config(4, 4, PixelFormat::Rgb565, BufferingMode::Single));
        Rectangle::new(Point::new(-2, 1), Size::new(4, 2))
            .into_styled(PrimitiveStyle::with_fill(Rgb888::RED))
            .draw(&mut hal)
            .unwrap();
        hal.draw_iter([
            Pixel(Point::new(-1, 0), Rgb888::GREEN),
            Pixel(Point::new(3, 3), Rgb888::BLUE),
        ])
        .unwrap();

        assert_eq!(hal.pixel(0, 1), Some(0xF800));
        assert_eq!(hal.pixel(1, 2), Some(0xF800));
        assert_eq!(hal.pixel(2, 1), Some(0));
        assert_eq!(hal.pixel(3, 3), Some(0x001F));
    }

    #[test]
    fn draw_target_rejects_indexed_surfaces() {
        let mut hal = hal(config(4, 4, PixelFormat::Indexed8, BufferingMode::Single));
        assert_eq!(
            hal.clear(Rgb888::WHITE),
            Err(HalError::Unsupported(UnsupportedOp::IndexedColor))
        );
    }
}
