//! Pointer and keyboard input delivered by the host viewer

use crate::annotation::ScreenPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// Press, release or move of the pointer over the canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub position: ScreenPoint,
    pub button: PointerButton,
    /// Host timestamp in milliseconds, used for click-vs-drag decisions
    pub timestamp_ms: u64,
    pub shift: bool,
}

impl PointerEvent {
    pub fn primary(x: f64, y: f64, timestamp_ms: u64) -> Self {
        Self {
            position: ScreenPoint::new(x, y),
            button: PointerButton::Primary,
            timestamp_ms,
            shift: false,
        }
    }

    pub fn secondary(x: f64, y: f64, timestamp_ms: u64) -> Self {
        Self { button: PointerButton::Secondary, ..Self::primary(x, y, timestamp_ms) }
    }

    pub fn is_left(&self) -> bool {
        self.button == PointerButton::Primary
    }
}

/// Mouse wheel or trackpad scroll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    pub position: ScreenPoint,
    pub delta_y: f64,
    pub shift: bool,
}

impl WheelEvent {
    pub fn new(x: f64, y: f64, delta_y: f64) -> Self {
        Self { position: ScreenPoint::new(x, y), delta_y, shift: false }
    }
}

/// Physical key; letters are matched by position, so Caps Lock is irrelevant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCode {
    /// `KeyA` ... `KeyZ`, stored upper-case
    Letter(char),
    Delete,
    Escape,
    Other(String),
}

impl KeyCode {
    pub fn letter(c: char) -> Self {
        KeyCode::Letter(c.to_ascii_uppercase())
    }

    /// Parse a DOM `KeyboardEvent.code` value such as `KeyE` or `Escape`
    pub fn from_code(code: &str) -> Self {
        match code {
            "Delete" => KeyCode::Delete,
            "Escape" => KeyCode::Escape,
            _ => match code.strip_prefix("Key").map(|rest| rest.chars().collect::<Vec<_>>()) {
                Some(chars) if chars.len() == 1 && chars[0].is_ascii_alphabetic() => {
                    KeyCode::letter(chars[0])
                }
                _ => KeyCode::Other(code.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    /// Whether the canvas (not a text field) holds keyboard focus
    pub focus_canvas: bool,
}

impl KeyEvent {
    pub fn new(code: KeyCode) -> Self {
        Self { code, ctrl: false, shift: false, alt: false, focus_canvas: true }
    }

    pub fn letter(c: char) -> Self {
        Self::new(KeyCode::letter(c))
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn unfocused(mut self) -> Self {
        self.focus_canvas = false;
        self
    }

    /// The given letter without any modifier
    pub fn is_plain_letter(&self, letter: char) -> bool {
        self.is_letter(letter) && !self.ctrl && !self.shift && !self.alt
    }

    pub fn is_letter(&self, letter: char) -> bool {
        self.code == KeyCode::letter(letter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_code_parsing() {
        assert_eq!(KeyCode::from_code("KeyE"), KeyCode::Letter('E'));
        assert_eq!(KeyCode::from_code("Escape"), KeyCode::Escape);
        assert_eq!(KeyCode::from_code("Digit1"), KeyCode::Other("Digit1".into()));
    }

    #[test]
    fn test_letters_ignore_case() {
        let event = KeyEvent::letter('e');
        assert!(event.is_plain_letter('E'));
        assert!(!event.clone().with_shift().is_plain_letter('E'));
        assert!(event.with_ctrl().is_letter('e'));
    }
}
