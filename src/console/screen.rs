//! Direct pixel writer over a pair of hardware framebuffers.
//!
//! `frame1` is the left eye and `frame2` the right eye. A mono screen passes
//! the same address twice. Pixels are stored BGR8, column-major, with the
//! y axis flipped (the panel is mounted rotated), so pixel `(x, y)` lives at
//! `frame + ((x * height) + (height - 1 - y)) * 3`.

use crate::console::drawable::Drawable;
use crate::console::vram::VideoMemory;
use crate::console::{Color, ConsoleError, BYTES_PER_PIXEL};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
    /// Same content to both framebuffers.
    Both,
}

#[derive(Debug)]
pub struct Screen {
    vram: Arc<VideoMemory>,
    frame1: u32,
    frame2: u32,
    width: u32,
    height: u32,
    stereo_offset: f32,
}

impl Screen {
    pub fn new(
        addr1: u32,
        addr2: u32,
        width: u32,
        height: u32,
        vram: Arc<VideoMemory>,
    ) -> Result<Self, ConsoleError> {
        let len = width
            .checked_mul(height)
            .and_then(|px| px.checked_mul(BYTES_PER_PIXEL))
            .filter(|len| *len > 0)
            .ok_or(ConsoleError::InvalidDimensions { width, height })?;
        vram.check_range(addr1, len)?;
        vram.check_range(addr2, len)?;
        Ok(Self {
            vram,
            frame1: addr1,
            frame2: addr2,
            width,
            height,
            stereo_offset: 0.0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes occupied by one framebuffer.
    pub fn frame_len(&self) -> u32 {
        self.width * self.height * BYTES_PER_PIXEL
    }

    pub fn is_stereo(&self) -> bool {
        self.frame1 != self.frame2
    }

    pub fn frame_address(&self, eye: Eye) -> u32 {
        match eye {
            Eye::Left | Eye::Both => self.frame1,
            Eye::Right => self.frame2,
        }
    }

    /// Horizontal parallax in pixels applied by `draw(.., use_3d = true)`.
    pub fn stereo_offset(&self) -> f32 {
        self.stereo_offset
    }

    pub fn set_stereo_offset(&mut self, px: f32) {
        self.stereo_offset = if px.is_finite() { px.max(0.0) } else { 0.0 };
    }

    #[inline]
    fn pixel_offset(&self, x: u32, y: u32) -> u32 {
        ((x * self.height) + (self.height - 1 - y)) * BYTES_PER_PIXEL
    }

    #[inline]
    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    fn set_pixel_address(&self, addr: u32, color: Color) {
        self.vram.write(addr, &color.to_bgr());
    }

    fn frames(&self, eye: Eye) -> impl Iterator<Item = u32> {
        let (first, second) = match eye {
            Eye::Left => (Some(self.frame1), None),
            Eye::Right => (Some(self.frame2), None),
            Eye::Both if self.is_stereo() => (Some(self.frame1), Some(self.frame2)),
            Eye::Both => (Some(self.frame1), None),
        };
        first.into_iter().chain(second)
    }

    /// Set a pixel on both eyes. Off-screen coordinates are clipped.
    pub fn set_pixel(&mut self, x: i32, y: i32, color: Color) {
        self.set_pixel_eye(Eye::Both, x, y, color);
    }

    pub fn set_pixel_eye(&mut self, eye: Eye, x: i32, y: i32, color: Color) {
        if !self.in_bounds(x, y) {
            return;
        }
        let off = self.pixel_offset(x as u32, y as u32);
        for frame in self.frames(eye) {
            self.set_pixel_address(frame + off, color);
        }
    }

    /// Read a pixel back from one eye. `Eye::Both` reads the left eye.
    pub fn get_pixel(&self, eye: Eye, x: i32, y: i32) -> Option<Color> {
        if !self.in_bounds(x, y) {
            return None;
        }
        let addr = self.frame_address(eye) + self.pixel_offset(x as u32, y as u32);
        let mut bgr = [0u8; 3];
        self.vram.read_into(addr, &mut bgr);
        Some(Color::from_bgr(bgr))
    }

    pub fn clear(&mut self, color: Color) {
        let len = self.frame_len();
        let pattern = color.to_bgr();
        for frame in self.frames(Eye::Both) {
            self.vram.fill_pattern(frame, len, &pattern);
        }
    }

    /// Fill an axis-aligned rectangle, clipped to the screen.
    ///
    /// Columns are contiguous in VRAM, so each clipped column is one fill.
    pub fn fill_rect(&mut self, eye: Eye, x: i32, y: i32, w: u32, h: u32, color: Color) {
        // i64 so that huge sizes or far-off origins clip instead of wrapping.
        let x0 = i64::from(x).max(0);
        let y0 = i64::from(y).max(0);
        let x1 = (i64::from(x) + i64::from(w)).min(i64::from(self.width));
        let y1 = (i64::from(y) + i64::from(h)).min(i64::from(self.height));
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        let pattern = color.to_bgr();
        let rows = (y1 - y0) as u32;
        for frame in self.frames(eye) {
            for cx in x0..x1 {
                // Bottom-most row has the lowest address within the column.
                let start = frame + self.pixel_offset(cx as u32, (y1 - 1) as u32);
                self.vram
                    .fill_pattern(start, rows * BYTES_PER_PIXEL, &pattern);
            }
        }
    }

    /// Draw an object. With `use_3d` on a stereo screen the object is drawn
    /// once per eye, shifted apart by the current stereo offset.
    pub fn draw<D: Drawable + ?Sized>(&mut self, obj: &D, x: f32, y: f32, use_3d: bool) {
        let offset = self.stereo_offset;
        if use_3d && self.is_stereo() && offset > 0.0 {
            obj.draw(self, Eye::Left, x - offset, y);
            obj.draw(self, Eye::Right, x + offset, y);
        } else {
            obj.draw(self, Eye::Both, x, y);
        }
    }

    /// Copy one eye out as row-major RGB8.
    pub fn read_rgb(&self, eye: Eye) -> Vec<u8> {
        let frame = self.frame_address(eye);
        let mut column = vec![0u8; (self.height * BYTES_PER_PIXEL) as usize];
        let mut out = vec![0u8; (self.width * self.height * 3) as usize];
        for x in 0..self.width {
            self.vram
                .read_into(frame + self.pixel_offset(x, self.height - 1), &mut column);
            // Column bytes run from y = height-1 up to y = 0.
            for (i, bgr) in column.chunks_exact(3).enumerate() {
                let y = self.height - 1 - i as u32;
                let dst = ((y * self.width + x) * 3) as usize;
                out[dst] = bgr[2];
                out[dst + 1] = bgr[1];
                out[dst + 2] = bgr[0];
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::drawable::Rectangle;

    fn stereo_screen(w: u32, h: u32) -> (Arc<VideoMemory>, Screen) {
        let vram = Arc::new(VideoMemory::with_window(0x1000, 4096));
        let len = w * h * BYTES_PER_PIXEL;
        let screen = Screen::new(0x1000, 0x1000 + len, w, h, vram.clone()).unwrap();
        (vram, screen)
    }

    #[test]
    fn pixel_lands_at_rotated_address() {
        let (vram, mut screen) = stereo_screen(4, 3);
        screen.set_pixel_eye(Eye::Left, 1, 0, Color::rgb(10, 20, 30));
        // x=1, y=0 -> (1*3 + 2) * 3 = 15
        let mut bgr = [0u8; 3];
        vram.read_into(0x1000 + 15, &mut bgr);
        assert_eq!(bgr, [30, 20, 10]);
    }

    #[test]
    fn both_eyes_receive_mono_writes() {
        let (_vram, mut screen) = stereo_screen(4, 3);
        screen.set_pixel(2, 2, Color::RED);
        assert_eq!(screen.get_pixel(Eye::Left, 2, 2), Some(Color::RED));
        assert_eq!(screen.get_pixel(Eye::Right, 2, 2), Some(Color::RED));
    }

    #[test]
    fn off_screen_writes_are_clipped() {
        let (_vram, mut screen) = stereo_screen(4, 3);
        screen.set_pixel(-1, 0, Color::RED);
        screen.set_pixel(4, 0, Color::RED);
        screen.set_pixel(0, 3, Color::RED);
        assert_eq!(screen.get_pixel(Eye::Left, 4, 0), None);
        let rgb = screen.read_rgb(Eye::Left);
        assert!(rgb.iter().all(|b| *b == 0));
    }

    #[test]
    fn rejects_framebuffer_outside_vram() {
        let vram = Arc::new(VideoMemory::with_window(0x1000, 64));
        let err = Screen::new(0x1000, 0x1030, 4, 4, vram).unwrap_err();
        assert!(matches!(err, ConsoleError::AddressOutOfRange { .. }));
    }

    #[test]
    fn rejects_empty_dimensions() {
        let vram = Arc::new(VideoMemory::with_window(0x1000, 64));
        let err = Screen::new(0x1000, 0x1000, 0, 4, vram).unwrap_err();
        assert!(matches!(err, ConsoleError::InvalidDimensions { .. }));
    }

    #[test]
    fn clear_and_read_back_row_major() {
        let (_vram, mut screen) = stereo_screen(4, 3);
        screen.clear(Color::BLUE);
        screen.set_pixel(3, 1, Color::WHITE);
        let rgb = screen.read_rgb(Eye::Right);
        assert_eq!(&rgb[0..3], &[0, 0, 255]);
        let idx = ((1 * 4 + 3) * 3) as usize;
        assert_eq!(&rgb[idx..idx + 3], &[255, 255, 255]);
    }

    #[test]
    fn fill_rect_matches_per_pixel_writes() {
        let (_vram, mut screen) = stereo_screen(5, 4);
        screen.fill_rect(Eye::Both, 1, 1, 3, 2, Color::GREEN);
        for y in 0..4 {
            for x in 0..5 {
                let inside = (1..4).contains(&x) && (1..3).contains(&y);
                let expected = if inside { Color::GREEN } else { Color::BLACK };
                assert_eq!(screen.get_pixel(Eye::Left, x, y), Some(expected), "({x},{y})");
            }
        }
    }

    #[test]
    fn oversized_and_far_away_shapes_clip() {
        let (_vram, mut screen) = stereo_screen(5, 4);
        screen.draw(&Rectangle::new(u32::MAX, 2, Color::RED), 0.0, 0.0, false);
        assert_eq!(screen.get_pixel(Eye::Left, 0, 0), Some(Color::RED));
        assert_eq!(screen.get_pixel(Eye::Left, 4, 1), Some(Color::RED));
        assert_eq!(screen.get_pixel(Eye::Left, 0, 2), Some(Color::BLACK));

        screen.fill_rect(Eye::Both, i32::MIN, i32::MIN, u32::MAX, u32::MAX, Color::BLUE);
        assert_eq!(screen.get_pixel(Eye::Right, 3, 3), Some(Color::BLUE));
        screen.fill_rect(Eye::Both, i32::MAX, 0, u32::MAX, 1, Color::GREEN);
        assert_eq!(screen.get_pixel(Eye::Left, 4, 0), Some(Color::BLUE));
    }

    #[test]
    fn stereo_draw_shifts_eyes_apart() {
        let (_vram, mut screen) = stereo_screen(10, 2);
        screen.set_stereo_offset(2.0);
        let dot = Rectangle::new(1, 1, Color::WHITE);
        screen.draw(&dot, 5.0, 0.0, true);
        assert_eq!(screen.get_pixel(Eye::Left, 3, 0), Some(Color::WHITE));
        assert_eq!(screen.get_pixel(Eye::Right, 7, 0), Some(Color::WHITE));
        assert_eq!(screen.get_pixel(Eye::Left, 5, 0), Some(Color::BLACK));
    }

    #[test]
    fn flat_draw_ignores_stereo_offset() {
        let (_vram, mut screen) = stereo_screen(10, 2);
        screen.set_stereo_offset(2.0);
        let dot = Rectangle::new(1, 1, Color::WHITE);
        screen.draw(&dot, 5.0, 1.0, false);
        assert_eq!(screen.get_pixel(Eye::Left, 5, 1), Some(Color::WHITE));
        assert_eq!(screen.get_pixel(Eye::Right, 5, 1), Some(Color::WHITE));
    }
}
