//! Button and 3D slider polling over the HID register.
//!
//! The host writes the register (keyboard state, slider position); the
//! console program reads it once per frame through `Input::update`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Console buttons with their HID bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Button {
    A = 1,
    B = 2,
    Select = 4,
    Start = 8,
    Right = 16,
    Left = 32,
    Up = 64,
    Down = 128,
    R1 = 256,
    L1 = 512,
    X = 1024,
    Y = 2048,
}

impl Button {
    pub const ALL: [Button; 12] = [
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
        Button::Right,
        Button::Left,
        Button::Up,
        Button::Down,
        Button::R1,
        Button::L1,
        Button::X,
        Button::Y,
    ];

    pub const fn mask(self) -> u32 {
        self as u32
    }

    pub fn label(self) -> &'static str {
        match self {
            Button::A => "A",
            Button::B => "B",
            Button::Select => "SELECT",
            Button::Start => "START",
            Button::Right => "RIGHT",
            Button::Left => "LEFT",
            Button::Up => "UP",
            Button::Down => "DOWN",
            Button::R1 => "R",
            Button::L1 => "L",
            Button::X => "X",
            Button::Y => "Y",
        }
    }
}

/// How a button changed between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Down this frame (level).
    Down,
    /// Released this frame.
    Up,
    /// Went down this frame.
    Press,
    /// Down this frame and the previous one.
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub button: Button,
    pub kind: EventKind,
}

/// Hardware input register shared between host and worker.
#[derive(Debug, Default)]
pub struct HidRegister {
    buttons: AtomicU32,
    slider_bits: AtomicU32,
}

impl HidRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buttons(&self) -> u32 {
        self.buttons.load(Ordering::Acquire)
    }

    pub fn set_buttons(&self, mask: u32) {
        self.buttons.store(mask, Ordering::Release);
    }

    pub fn press(&self, button: Button) {
        self.buttons.fetch_or(button.mask(), Ordering::AcqRel);
    }

    pub fn release(&self, button: Button) {
        self.buttons.fetch_and(!button.mask(), Ordering::AcqRel);
    }

    /// Effective slider position in `[0, 1]`. 0 means 3D is off.
    pub fn slider(&self) -> f32 {
        f32::from_bits(self.slider_bits.load(Ordering::Acquire))
    }

    pub fn set_slider(&self, value: f32) {
        let v = if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.slider_bits.store(v.to_bits(), Ordering::Release);
    }
}

pub type InputCallback = Box<dyn FnMut(Button) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

struct Binding {
    id: BindingId,
    button: Button,
    kind: EventKind,
    callback: InputCallback,
}

pub struct Input {
    hid: Arc<HidRegister>,
    current: u32,
    last_hid: u32,
    slider: f32,
    bindings: Vec<Binding>,
    next_binding: u64,
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Input")
            .field("current", &format_args!("{:#06x}", self.current))
            .field("last_hid", &format_args!("{:#06x}", self.last_hid))
            .field("slider", &self.slider)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

impl Input {
    pub fn new(hid: Arc<HidRegister>) -> Self {
        Self {
            hid,
            current: 0,
            last_hid: 0,
            slider: 0.0,
            bindings: Vec::new(),
            next_binding: 1,
        }
    }

    /// Latch the HID register for this frame and fire matching bindings.
    pub fn update(&mut self) {
        self.last_hid = self.current;
        self.current = self.hid.buttons();

        let (current, last) = (self.current, self.last_hid);
        for binding in &mut self.bindings {
            if Self::matches(current, last, binding.button, binding.kind) {
                (binding.callback)(binding.button);
            }
        }
    }

    fn matches(current: u32, last: u32, button: Button, kind: EventKind) -> bool {
        let now = current & button.mask() != 0;
        let before = last & button.mask() != 0;
        match kind {
            EventKind::Down => now,
            EventKind::Up => before && !now,
            EventKind::Press => now && !before,
            EventKind::Hold => now && before,
        }
    }

    pub fn is_down(&self, button: Button) -> bool {
        Self::matches(self.current, self.last_hid, button, EventKind::Down)
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        Self::matches(self.current, self.last_hid, button, EventKind::Press)
    }

    pub fn is_released(&self, button: Button) -> bool {
        Self::matches(self.current, self.last_hid, button, EventKind::Up)
    }

    pub fn is_held(&self, button: Button) -> bool {
        Self::matches(self.current, self.last_hid, button, EventKind::Hold)
    }

    /// Raw mask latched by the last `update`.
    pub fn buttons(&self) -> u32 {
        self.current
    }

    pub fn update_3d_slider(&mut self) {
        self.slider = self.hid.slider();
    }

    pub fn get_3d_slider(&self) -> f32 {
        self.slider
    }

    /// Edge and hold events for this frame, in `Button::ALL` order.
    pub fn events(&self) -> Vec<InputEvent> {
        let mut out = Vec::new();
        for button in Button::ALL {
            for kind in [EventKind::Press, EventKind::Hold, EventKind::Up] {
                if Self::matches(self.current, self.last_hid, button, kind) {
                    out.push(InputEvent { button, kind });
                }
            }
        }
        out
    }

    pub fn bind<F>(&mut self, button: Button, kind: EventKind, callback: F) -> BindingId
    where
        F: FnMut(Button) + Send + 'static,
    {
        let id = BindingId(self.next_binding);
        self.next_binding += 1;
        self.bindings.push(Binding {
            id,
            button,
            kind,
            callback: Box::new(callback),
        });
        id
    }

    /// Returns false when `id` was not bound.
    pub fn unbind(&mut self, id: BindingId) -> bool {
        let before = self.bindings.len();
        self.bindings.retain(|b| b.id != id);
        self.bindings.len() != before
    }

    pub fn unbind_button(&mut self, button: Button) {
        self.bindings.retain(|b| b.button != button);
    }

    pub fn unbind_all(&mut self) {
        self.bindings.clear();
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}
