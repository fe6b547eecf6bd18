//! Console hardware model: video memory, the two screens and input.
//!
//! This is the surface a console program sees. It is deliberately close to
//! the hardware: framebuffers are integer addresses into VRAM and input is a
//! polled register.

mod color;
pub mod drawable;
pub mod input;
pub mod screen;
pub mod vram;

pub use color::Color;
pub use drawable::{Rectangle, Sprite};
pub use input::{Button, HidRegister};
pub use screen::Eye;

use input::Input;
use screen::Screen;
use vram::VideoMemory;

use std::sync::Arc;

pub const BYTES_PER_PIXEL: u32 = 3;

pub const TOP_WIDTH: u32 = 400;
pub const TOP_HEIGHT: u32 = 240;
pub const BOTTOM_WIDTH: u32 = 320;
pub const BOTTOM_HEIGHT: u32 = 240;

pub const TOP_LEFT_FB: u32 = 0x1F1E_6000;
pub const TOP_RIGHT_FB: u32 = TOP_LEFT_FB + TOP_WIDTH * TOP_HEIGHT * BYTES_PER_PIXEL;
pub const BOTTOM_FB: u32 = TOP_RIGHT_FB + TOP_WIDTH * TOP_HEIGHT * BYTES_PER_PIXEL;

/// Parallax in pixels at full slider.
pub const STEREO_PARALLAX_PX: f32 = 12.0;

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error(
        "framebuffer {addr:#010x}+{len:#x} lies outside video memory {base:#010x}+{size:#x}"
    )]
    AddressOutOfRange {
        addr: u32,
        len: u32,
        base: u32,
        size: u32,
    },
    #[error("invalid screen dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Row-major RGB8 copy of everything on the displays at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub frame: u64,
    pub top_width: u32,
    pub top_height: u32,
    pub top_left: Vec<u8>,
    pub top_right: Vec<u8>,
    pub bottom_width: u32,
    pub bottom_height: u32,
    pub bottom: Vec<u8>,
    pub slider: f32,
}

impl FrameSnapshot {
    /// Pixel of the top screen for one eye.
    pub fn top_pixel(&self, eye: Eye, x: u32, y: u32) -> Option<Color> {
        let buf = match eye {
            Eye::Right => &self.top_right,
            Eye::Left | Eye::Both => &self.top_left,
        };
        rgb_at(buf, self.top_width, self.top_height, x, y)
    }

    pub fn bottom_pixel(&self, x: u32, y: u32) -> Option<Color> {
        rgb_at(&self.bottom, self.bottom_width, self.bottom_height, x, y)
    }
}

fn rgb_at(buf: &[u8], w: u32, h: u32, x: u32, y: u32) -> Option<Color> {
    if x >= w || y >= h {
        return None;
    }
    let i = ((y * w + x) * 3) as usize;
    buf.get(i..i + 3).map(|p| Color::rgb(p[0], p[1], p[2]))
}

/// Everything a console program can touch during a frame.
#[derive(Debug)]
pub struct Console {
    pub top: Screen,
    pub bottom: Screen,
    pub input: Input,
}

impl Console {
    pub fn new(hid: Arc<HidRegister>) -> Result<Self, ConsoleError> {
        Self::with_vram(Arc::new(VideoMemory::new()), hid)
    }

    pub fn with_vram(vram: Arc<VideoMemory>, hid: Arc<HidRegister>) -> Result<Self, ConsoleError> {
        let top = Screen::new(TOP_LEFT_FB, TOP_RIGHT_FB, TOP_WIDTH, TOP_HEIGHT, vram.clone())?;
        let bottom = Screen::new(BOTTOM_FB, BOTTOM_FB, BOTTOM_WIDTH, BOTTOM_HEIGHT, vram)?;
        Ok(Self {
            top,
            bottom,
            input: Input::new(hid),
        })
    }

    /// Latch input and apply the slider to the top screen.
    pub fn begin_frame(&mut self) {
        self.input.update();
        self.input.update_3d_slider();
        self.top
            .set_stereo_offset(self.input.get_3d_slider() * STEREO_PARALLAX_PX);
    }

    pub fn snapshot(&self, frame: u64) -> FrameSnapshot {
        FrameSnapshot {
            frame,
            top_width: self.top.width(),
            top_height: self.top.height(),
            top_left: self.top.read_rgb(Eye::Left),
            top_right: self.top.read_rgb(Eye::Right),
            bottom_width: self.bottom.width(),
            bottom_height: self.bottom.height(),
            bottom: self.bottom.read_rgb(Eye::Left),
            slider: self.input.get_3d_slider(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framebuffers_fit_in_vram() {
        let vram = VideoMemory::new();
        let top_len = TOP_WIDTH * TOP_HEIGHT * BYTES_PER_PIXEL;
        let bottom_len = BOTTOM_WIDTH * BOTTOM_HEIGHT * BYTES_PER_PIXEL;
        assert!(vram.check_range(TOP_LEFT_FB, top_len).is_ok());
        assert!(vram.check_range(TOP_RIGHT_FB, top_len).is_ok());
        assert!(vram.check_range(BOTTOM_FB, bottom_len).is_ok());
        assert!(TOP_RIGHT_FB >= TOP_LEFT_FB + top_len);
        assert!(BOTTOM_FB >= TOP_RIGHT_FB + top_len);
    }

    #[test]
    fn begin_frame_applies_slider_to_top_screen() {
        let hid = Arc::new(HidRegister::new());
        let mut console = Console::new(hid.clone()).unwrap();
        hid.set_slider(0.5);
        console.begin_frame();
        assert_eq!(console.top.stereo_offset(), STEREO_PARALLAX_PX * 0.5);
        assert!(console.top.is_stereo());
        assert!(!console.bottom.is_stereo());
    }

    #[test]
    fn snapshot_reflects_both_eyes_and_bottom() {
        let hid = Arc::new(HidRegister::new());
        let mut console = Console::new(hid).unwrap();
        console.top.set_pixel_eye(Eye::Right, 10, 20, Color::RED);
        console.bottom.set_pixel(0, 239, Color::GREEN);
        let snap = console.snapshot(7);
        assert_eq!(snap.frame, 7);
        assert_eq!(snap.top_pixel(Eye::Right, 10, 20), Some(Color::RED));
        assert_eq!(snap.top_pixel(Eye::Left, 10, 20), Some(Color::BLACK));
        assert_eq!(snap.bottom_pixel(0, 239), Some(Color::GREEN));
        assert_eq!(snap.bottom_pixel(320, 0), None);
    }
}
