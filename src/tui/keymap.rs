//! Keyboard to console button mapping.
//!
//! Most terminals only report key presses. A button therefore stays down
//! until its key stops auto-repeating for `HOLD_TIMEOUT`, unless the
//! terminal reports releases, in which case those are used instead.

use crate::console::{Button, HidRegister};
use crossterm::event::KeyCode;
use std::time::{Duration, Instant};

pub const HOLD_TIMEOUT: Duration = Duration::from_millis(120);

pub fn console_button(code: KeyCode) -> Option<Button> {
    let b = match code {
        KeyCode::Up => Button::Up,
        KeyCode::Down => Button::Down,
        KeyCode::Left => Button::Left,
        KeyCode::Right => Button::Right,
        KeyCode::Char('x') => Button::A,
        KeyCode::Char('z') => Button::B,
        KeyCode::Char('s') => Button::X,
        KeyCode::Char('a') => Button::Y,
        KeyCode::Char('[') => Button::L1,
        KeyCode::Char(']') => Button::R1,
        KeyCode::Enter => Button::Start,
        KeyCode::Backspace => Button::Select,
        _ => return None,
    };
    Some(b)
}

fn slot(button: Button) -> usize {
    Button::ALL
        .iter()
        .position(|b| *b == button)
        .unwrap_or_default()
}

/// Buttons currently held from the keyboard.
#[derive(Debug, Default)]
pub struct HeldButtons {
    last_seen: [Option<Instant>; 12],
    release_events: bool,
}

impl HeldButtons {
    pub fn press(&mut self, hid: &HidRegister, button: Button, now: Instant) {
        self.last_seen[slot(button)] = Some(now);
        hid.press(button);
    }

    pub fn release(&mut self, hid: &HidRegister, button: Button) {
        self.last_seen[slot(button)] = None;
        hid.release(button);
    }

    /// The terminal reports key releases; stop timing buttons out.
    pub fn saw_release_event(&mut self) {
        self.release_events = true;
    }

    /// Release buttons whose key hasn't repeated within `HOLD_TIMEOUT`.
    pub fn expire(&mut self, hid: &HidRegister, now: Instant) {
        if self.release_events {
            return;
        }
        for (i, seen) in self.last_seen.iter_mut().enumerate() {
            if seen.is_some_and(|t| now.saturating_duration_since(t) >= HOLD_TIMEOUT) {
                *seen = None;
                hid.release(Button::ALL[i]);
            }
        }
    }

    pub fn release_all(&mut self, hid: &HidRegister) {
        for button in Button::ALL {
            self.release(hid, button);
        }
    }

    pub fn mask(&self) -> u32 {
        Button::ALL
            .iter()
            .zip(self.last_seen.iter())
            .filter(|(_, seen)| seen.is_some())
            .fold(0, |acc, (b, _)| acc | b.mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_buttons() {
        assert_eq!(console_button(KeyCode::Char('x')), Some(Button::A));
        assert_eq!(console_button(KeyCode::Enter), Some(Button::Start));
        assert_eq!(console_button(KeyCode::Char(']')), Some(Button::R1));
        assert_eq!(console_button(KeyCode::Char('q')), None);
    }

    #[test]
    fn held_buttons_time_out_without_release_events() {
        let hid = HidRegister::new();
        let mut held = HeldButtons::default();
        let t0 = Instant::now();
        held.press(&hid, Button::A, t0);
        held.press(&hid, Button::Up, t0 + Duration::from_millis(100));
        assert_eq!(hid.buttons(), Button::A.mask() | Button::Up.mask());

        held.expire(&hid, t0 + HOLD_TIMEOUT);
        assert_eq!(hid.buttons(), Button::Up.mask());
        assert_eq!(held.mask(), Button::Up.mask());
    }

    #[test]
    fn release_events_disable_the_timeout() {
        let hid = HidRegister::new();
        let mut held = HeldButtons::default();
        let t0 = Instant::now();
        held.saw_release_event();
        held.press(&hid, Button::B, t0);
        held.expire(&hid, t0 + Duration::from_secs(5));
        assert_eq!(hid.buttons(), Button::B.mask());
        held.release(&hid, Button::B);
        assert_eq!(hid.buttons(), 0);
    }
}
