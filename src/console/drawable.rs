use crate::console::screen::{Eye, Screen};
use crate::console::Color;

/// Anything that can render itself onto one eye of a screen.
pub trait Drawable {
    fn draw(&self, screen: &mut Screen, eye: Eye, x: f32, y: f32);
}

/// Solid filled rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub width: u32,
    pub height: u32,
    pub color: Color,
}

impl Rectangle {
    pub fn new(width: u32, height: u32, color: Color) -> Self {
        Self {
            width,
            height,
            color,
        }
    }
}

impl Drawable for Rectangle {
    fn draw(&self, screen: &mut Screen, eye: Eye, x: f32, y: f32) {
        screen.fill_rect(
            eye,
            x.round() as i32,
            y.round() as i32,
            self.width,
            self.height,
            self.color,
        );
    }
}

/// Small bitmap with per-pixel transparency.
#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    width: u32,
    height: u32,
    pixels: Vec<Option<Color>>,
}

impl Sprite {
    /// Returns `None` when `pixels` does not hold exactly `width * height` entries.
    pub fn new(width: u32, height: u32, pixels: Vec<Option<Color>>) -> Option<Self> {
        (pixels.len() == (width as usize) * (height as usize)).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build a sprite from text rows: `#` is opaque `color`, anything else is
    /// transparent. Short rows are padded with transparency.
    pub fn from_pattern(rows: &[&str], color: Color) -> Self {
        let height = rows.len() as u32;
        let width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0) as u32;
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for row in rows {
            let mut n = 0;
            for ch in row.chars() {
                pixels.push((ch == '#').then_some(color));
                n += 1;
            }
            pixels.extend(std::iter::repeat(None).take(width as usize - n));
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Drawable for Sprite {
    fn draw(&self, screen: &mut Screen, eye: Eye, x: f32, y: f32) {
        let ox = x.round() as i32;
        let oy = y.round() as i32;
        for (i, px) in self.pixels.iter().enumerate() {
            if let Some(color) = px {
                let sx = (i as u32 % self.width) as i32;
                let sy = (i as u32 / self.width) as i32;
                screen.set_pixel_eye(eye, ox.saturating_add(sx), oy.saturating_add(sy), *color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::vram::VideoMemory;
    use std::sync::Arc;

    #[test]
    fn sprite_size_must_match_pixels() {
        assert!(Sprite::new(2, 2, vec![None; 4]).is_some());
        assert!(Sprite::new(2, 2, vec![None; 3]).is_none());
    }

    #[test]
    fn pattern_sprite_leaves_transparent_pixels_alone() {
        let vram = Arc::new(VideoMemory::with_window(0x2000, 1024));
        let mut screen = Screen::new(0x2000, 0x2000, 4, 4, vram).unwrap();
        screen.clear(Color::BLUE);
        let sprite = Sprite::from_pattern(&["#.", ".#"], Color::YELLOW);
        assert_eq!((sprite.width(), sprite.height()), (2, 2));
        screen.draw(&sprite, 1.0, 1.0, false);
        assert_eq!(screen.get_pixel(Eye::Left, 1, 1), Some(Color::YELLOW));
        assert_eq!(screen.get_pixel(Eye::Left, 2, 1), Some(Color::BLUE));
        assert_eq!(screen.get_pixel(Eye::Left, 2, 2), Some(Color::YELLOW));
    }

    #[test]
    fn far_off_sprites_are_clipped() {
        let vram = Arc::new(VideoMemory::with_window(0x2000, 1024));
        let mut screen = Screen::new(0x2000, 0x2000, 4, 4, vram).unwrap();
        let sprite = Sprite::from_pattern(&["##", "##"], Color::RED);
        screen.draw(&sprite, f32::MAX, 0.0, false);
        screen.draw(&sprite, f32::MIN, f32::MAX, false);
        screen.draw(&sprite, -1.0, -1.0, false);
        assert_eq!(screen.get_pixel(Eye::Left, 0, 0), Some(Color::RED));
        assert_eq!(screen.get_pixel(Eye::Left, 1, 0), Some(Color::BLACK));
        assert_eq!(screen.get_pixel(Eye::Left, 3, 3), Some(Color::BLACK));
    }
}
