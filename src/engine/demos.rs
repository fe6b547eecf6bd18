//! Built-in console programs.
//!
//! Every demo leaves its main loop with exit code 0 when START is pressed,
//! the way homebrew conventionally returns to the launcher.

use crate::console::{
    Button, Color, Console, Eye, Rectangle, Sprite, BOTTOM_HEIGHT, BOTTOM_WIDTH, TOP_HEIGHT,
    TOP_WIDTH,
};
use crate::engine::{ConsoleProgram, ProgramFactory, ProgramFlow};
use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Name and one-line description of every built-in program.
pub const PROGRAMS: &[(&str, &str)] = &[
    ("bounce", "A square bouncing on the top screen; D-pad nudges it, buttons light up below"),
    ("stereo", "Layered panels at different depths to check the 3D slider"),
    ("starfield", "Scrolling stars in 3D; hold A to speed up"),
];

pub fn program_names() -> impl Iterator<Item = &'static str> {
    PROGRAMS.iter().map(|(name, _)| *name)
}

/// Factory for a built-in program, or `None` for an unknown name.
pub fn factory(name: &str) -> Option<ProgramFactory> {
    let f: ProgramFactory = match name {
        "bounce" => Arc::new(|| Box::new(Bounce::default()) as Box<dyn ConsoleProgram>),
        "stereo" => Arc::new(|| Box::new(Stereo::default()) as Box<dyn ConsoleProgram>),
        "starfield" => Arc::new(|| Box::new(Starfield::new(0x5eed)) as Box<dyn ConsoleProgram>),
        _ => return None,
    };
    Some(f)
}

fn exit_on_start(console: &Console) -> ProgramFlow {
    if console.input.is_pressed(Button::Start) {
        ProgramFlow::Exit(0)
    } else {
        ProgramFlow::Continue
    }
}

/// Light one cell per button on the bottom screen, in HID bit order.
fn draw_button_panel(console: &mut Console) {
    const CELL: u32 = 20;
    const GAP: u32 = 6;
    let cols = 6;
    let origin_x = (BOTTOM_WIDTH - cols * (CELL + GAP) + GAP) / 2;
    let origin_y = BOTTOM_HEIGHT - 2 * (CELL + GAP) - 10;
    for (i, button) in Button::ALL.iter().enumerate() {
        let i = i as u32;
        let x = origin_x + (i % cols) * (CELL + GAP);
        let y = origin_y + (i / cols) * (CELL + GAP);
        let color = if console.input.is_down(*button) {
            Color::YELLOW
        } else {
            Color::rgb(40, 40, 60)
        };
        console
            .bottom
            .fill_rect(Eye::Both, x as i32, y as i32, CELL, CELL, color);
    }
}

#[derive(Debug)]
pub struct Bounce {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    size: u32,
    frame: u64,
}

impl Default for Bounce {
    fn default() -> Self {
        Self {
            x: 40.0,
            y: 30.0,
            vx: 2.5,
            vy: 1.75,
            size: 24,
            frame: 0,
        }
    }
}

impl ConsoleProgram for Bounce {
    fn name(&self) -> &str {
        "bounce"
    }

    fn frame(&mut self, console: &mut Console) -> Result<ProgramFlow> {
        self.frame += 1;
        let input = &console.input;
        if input.is_down(Button::Left) {
            self.vx -= 0.25;
        }
        if input.is_down(Button::Right) {
            self.vx += 0.25;
        }
        if input.is_down(Button::Up) {
            self.vy -= 0.25;
        }
        if input.is_down(Button::Down) {
            self.vy += 0.25;
        }
        self.vx = self.vx.clamp(-8.0, 8.0);
        self.vy = self.vy.clamp(-8.0, 8.0);

        let max_x = (TOP_WIDTH - self.size) as f32;
        let max_y = (TOP_HEIGHT - self.size) as f32;
        self.x += self.vx;
        self.y += self.vy;
        if self.x <= 0.0 || self.x >= max_x {
            self.vx = -self.vx;
            self.x = self.x.clamp(0.0, max_x);
        }
        if self.y <= 0.0 || self.y >= max_y {
            self.vy = -self.vy;
            self.y = self.y.clamp(0.0, max_y);
        }

        let shade = ((self.frame % 120) as f32 / 120.0 * std::f32::consts::TAU).sin() * 0.5 + 0.5;
        console
            .top
            .clear(Color::rgb(10, 10, 30).lerp(Color::rgb(20, 30, 60), shade));
        let body = Rectangle::new(self.size, self.size, Color::CYAN);
        console.top.draw(&body, self.x, self.y, true);

        console.bottom.clear(Color::rgb(16, 16, 24));
        draw_button_panel(console);
        Ok(exit_on_start(console))
    }
}

#[derive(Debug, Default)]
pub struct Stereo {
    frame: u64,
}

impl ConsoleProgram for Stereo {
    fn name(&self) -> &str {
        "stereo"
    }

    fn frame(&mut self, console: &mut Console) -> Result<ProgramFlow> {
        self.frame += 1;
        let top = &mut console.top;
        top.clear(Color::rgb(30, 30, 30));

        // Flat backdrop grid: identical in both eyes.
        let line = Rectangle::new(1, TOP_HEIGHT, Color::rgb(60, 60, 60));
        for x in (0..TOP_WIDTH).step_by(40) {
            top.draw(&line, x as f32, 0.0, false);
        }

        // Three panels at increasing depth; deeper panels get a scaled offset.
        let full = top.stereo_offset();
        let panels = [
            (0.33, Color::BLUE, 60.0),
            (0.66, Color::GREEN, 140.0),
            (1.0, Color::RED, 220.0),
        ];
        for (depth, color, x) in panels {
            top.set_stereo_offset(full * depth);
            let wobble = ((self.frame as f32) / 30.0 + x / 50.0).sin() * 10.0;
            top.draw(&Rectangle::new(100, 80, color), x - 40.0, 80.0 + wobble, true);
        }
        top.set_stereo_offset(full);

        let slider = console.input.get_3d_slider();
        console.bottom.clear(Color::BLACK);
        let width = (slider * (BOTTOM_WIDTH - 40) as f32).round() as u32;
        console
            .bottom
            .fill_rect(Eye::Both, 20, 110, BOTTOM_WIDTH - 40, 20, Color::rgb(50, 50, 50));
        console
            .bottom
            .fill_rect(Eye::Both, 20, 110, width, 20, Color::MAGENTA);
        Ok(exit_on_start(console))
    }
}

#[derive(Debug, Clone, Copy)]
struct Star {
    x: f32,
    y: f32,
    depth: f32,
}

#[derive(Debug)]
pub struct Starfield {
    rng: StdRng,
    stars: Vec<Star>,
    ship: Sprite,
}

impl Starfield {
    const STARS: usize = 120;

    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            stars: Vec::new(),
            ship: Sprite::from_pattern(
                &["...#...", "..###..", ".#####.", "###.###", "#.....#"],
                Color::WHITE,
            ),
        }
    }

    fn spawn(&mut self, x: Option<f32>) -> Star {
        Star {
            x: x.unwrap_or_else(|| self.rng.gen_range(0.0..TOP_WIDTH as f32)),
            y: self.rng.gen_range(0.0..TOP_HEIGHT as f32),
            depth: self.rng.gen_range(0.1..1.0),
        }
    }
}

impl ConsoleProgram for Starfield {
    fn name(&self) -> &str {
        "starfield"
    }

    fn setup(&mut self, _console: &mut Console) -> Result<()> {
        self.stars = (0..Self::STARS).map(|_| self.spawn(None)).collect();
        Ok(())
    }

    fn frame(&mut self, console: &mut Console) -> Result<ProgramFlow> {
        let speed = if console.input.is_down(Button::A) {
            6.0
        } else {
            2.0
        };
        let full = console.top.stereo_offset();
        console.top.clear(Color::BLACK);

        for i in 0..self.stars.len() {
            let mut star = self.stars[i];
            star.x -= speed * star.depth;
            if star.x < 0.0 {
                star = self.spawn(Some(TOP_WIDTH as f32 - 1.0));
            }
            self.stars[i] = star;

            let glow = Color::rgb(60, 60, 80).lerp(Color::WHITE, star.depth);
            console.top.set_stereo_offset(full * star.depth);
            console
                .top
                .draw(&Rectangle::new(1, 1, glow), star.x, star.y, true);
        }
        console.top.set_stereo_offset(full);
        console.top.draw(
            &self.ship,
            40.0,
            (TOP_HEIGHT / 2) as f32,
            true,
        );

        console.bottom.clear(Color::rgb(8, 8, 16));
        draw_button_panel(console);
        Ok(exit_on_start(console))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::HidRegister;

    fn console() -> (Arc<HidRegister>, Console) {
        let hid = Arc::new(HidRegister::new());
        let console = Console::new(hid.clone()).unwrap();
        (hid, console)
    }

    #[test]
    fn every_listed_program_has_a_factory() {
        for name in program_names() {
            let make = factory(name).unwrap_or_else(|| panic!("no factory for {name}"));
            assert_eq!(make().name(), name);
        }
        assert!(factory("nope").is_none());
    }

    #[test]
    fn demos_run_and_exit_on_start() {
        for name in program_names() {
            let (hid, mut console) = console();
            let mut program = factory(name).unwrap()();
            program.setup(&mut console).unwrap();
            for _ in 0..3 {
                console.begin_frame();
                assert_eq!(program.frame(&mut console).unwrap(), ProgramFlow::Continue);
            }
            hid.press(Button::Start);
            console.begin_frame();
            assert_eq!(program.frame(&mut console).unwrap(), ProgramFlow::Exit(0));
        }
    }

    #[test]
    fn button_panel_lights_pressed_buttons() {
        let (hid, mut console) = console();
        let mut program = Bounce::default();
        hid.press(Button::A);
        console.begin_frame();
        program.frame(&mut console).unwrap();
        let snap = console.snapshot(1);
        let lit = (0..BOTTOM_HEIGHT)
            .flat_map(|y| (0..BOTTOM_WIDTH).map(move |x| (x, y)))
            .filter(|(x, y)| snap.bottom_pixel(*x, *y) == Some(Color::YELLOW))
            .count();
        assert_eq!(lit, 20 * 20);
    }
}
