//! Renders presented frames with half-block characters.
//!
//! Each terminal cell carries two vertically stacked pixels: `▀` with the
//! upper pixel as foreground and the lower one as background.

use crate::console::{Color as PixelColor, Eye, FrameSnapshot};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::Color,
    widgets::{Paragraph, Widget},
};

pub struct ScreenView<'a> {
    frame: Option<&'a FrameSnapshot>,
    stereo: bool,
}

impl<'a> ScreenView<'a> {
    pub fn new(frame: Option<&'a FrameSnapshot>, stereo: bool) -> Self {
        Self { frame, stereo }
    }
}

/// Largest rect inside `area` that shows `src_w x src_h` with square pixels,
/// centred.
fn fit(area: Rect, src_w: u32, src_h: u32) -> Rect {
    if src_w == 0 || src_h == 0 || area.width == 0 || area.height == 0 {
        return Rect::new(area.x, area.y, 0, 0);
    }
    let scale = (area.width as f64 / src_w as f64).min(area.height as f64 * 2.0 / src_h as f64);
    let w = ((src_w as f64 * scale).floor() as u16).clamp(1, area.width);
    let h = ((src_h as f64 * scale / 2.0).floor() as u16).clamp(1, area.height);
    Rect::new(
        area.x + (area.width - w) / 2,
        area.y + (area.height - h) / 2,
        w,
        h,
    )
}

fn to_term(c: Option<PixelColor>) -> Color {
    c.map(|c| Color::Rgb(c.r, c.g, c.b)).unwrap_or(Color::Reset)
}

/// Nearest-neighbour sample of a `src_w x src_h` image into `rect`.
fn paint<F>(buf: &mut Buffer, rect: Rect, src_w: u32, src_h: u32, pixel: F)
where
    F: Fn(u32, u32) -> Option<PixelColor>,
{
    if rect.width == 0 || rect.height == 0 {
        return;
    }
    let rows = rect.height as u32 * 2;
    for cy in 0..rect.height {
        for cx in 0..rect.width {
            let sx = cx as u32 * src_w / rect.width as u32;
            let upper = (cy as u32 * 2) * src_h / rows;
            let lower = (cy as u32 * 2 + 1) * src_h / rows;
            if let Some(cell) = buf.cell_mut((rect.x + cx, rect.y + cy)) {
                cell.set_char('▀')
                    .set_fg(to_term(pixel(sx, upper)))
                    .set_bg(to_term(pixel(sx, lower)));
            }
        }
    }
}

impl Widget for ScreenView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = self.frame else {
            Paragraph::new("No frame presented yet. Press p to play.")
                .alignment(Alignment::Center)
                .render(area, buf);
            return;
        };

        let top_area = Rect::new(area.x, area.y, area.width, area.height / 2);
        let bottom_area = Rect::new(
            area.x,
            area.y + top_area.height,
            area.width,
            area.height - top_area.height,
        );

        let eyes: &[Eye] = if self.stereo {
            &[Eye::Left, Eye::Right]
        } else {
            &[Eye::Left]
        };
        let panel_w = top_area.width / eyes.len() as u16;
        for (i, eye) in eyes.iter().enumerate() {
            let panel = Rect::new(
                top_area.x + i as u16 * panel_w,
                top_area.y,
                panel_w,
                top_area.height,
            );
            // Keep the top screen's scale when both eyes share the width.
            let target = fit(panel, frame.top_width, frame.top_height);
            paint(buf, target, frame.top_width, frame.top_height, |x, y| {
                frame.top_pixel(*eye, x, y)
            });
        }

        // Bottom screen uses the top screen's scale so its narrower width shows.
        let top_fit = fit(
            Rect::new(bottom_area.x, bottom_area.y, panel_w, bottom_area.height),
            frame.top_width,
            frame.top_height,
        );
        let w = ((top_fit.width as u32 * frame.bottom_width) / frame.top_width.max(1)) as u16;
        let h = top_fit.height.min(bottom_area.height);
        let target = Rect::new(
            bottom_area.x + (bottom_area.width.saturating_sub(w)) / 2,
            bottom_area.y,
            w.min(bottom_area.width),
            h,
        );
        paint(buf, target, frame.bottom_width, frame.bottom_height, |x, y| {
            frame.bottom_pixel(x, y)
        });
    }
}
