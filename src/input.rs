use std::collections::HashSet;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Degrees of rotation per pixel of cursor travel.
pub const MOUSE_SENSITIVITY: f32 = 0.1;

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    /// Parses names such as `W`, `space`, `LeftShift` or `3`.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) if ch.is_ascii_alphabetic() => {
                Some(Self::Character(ch.to_ascii_uppercase()))
            }
            (Some(ch), None) if ch.is_ascii_digit() => Some(Self::Digit(ch as u8 - b'0')),
            _ => None,
        }
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name.to_ascii_lowercase().as_str() {
        "space" => Space,
        "escape" | "esc" => Escape,
        "leftshift" | "lshift" | "shift" => LeftShift,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Keys bound by the viewer that are not letters or digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Escape,
    LeftShift,
}

/// Set of keys currently held down.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    keys: HashSet<KeyCode>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&mut self, key: KeyCode) {
        self.keys.insert(key);
    }

    pub fn set_key_up(&mut self, key: KeyCode) {
        self.keys.remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    pub fn is_key_down_by_name(&self, name: &str) -> bool {
        KeyCode::from_name(name).is_some_and(|key| self.is_key_down(key))
    }

    pub fn release_all(&mut self) {
        self.keys.clear();
    }
}

/// Turns absolute cursor positions into yaw/pitch offsets.
#[derive(Debug, Clone)]
pub struct MouseLook {
    last: Option<Vec2>,
    sensitivity: f32,
}

impl Default for MouseLook {
    fn default() -> Self {
        Self::new(MOUSE_SENSITIVITY)
    }
}

impl MouseLook {
    pub fn new(sensitivity: f32) -> Self {
        Self {
            last: None,
            sensitivity,
        }
    }

    /// Returns the (yaw, pitch) offset in degrees for a new cursor position.
    ///
    /// The first sample after creation or [`MouseLook::reset`] only records
    /// the position, so capturing the cursor never makes the view jump.
    pub fn offset(&mut self, position: Vec2) -> Option<Vec2> {
        let last = self.last.replace(position)?;
        // Screen y grows downwards; pitch grows upwards.
        let delta = Vec2::new(position.x - last.x, last.y - position.y);
        Some(delta * self.sensitivity)
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_cover_viewer_bindings() {
        assert_eq!(KeyCode::from_name("esc"), Some(KeyCode::Named(NamedKey::Escape)));
        assert_eq!(KeyCode::from_name("LSHIFT"), Some(KeyCode::Named(NamedKey::LeftShift)));
        assert_eq!(KeyCode::from_name("j"), Some(KeyCode::Character('J')));
        assert_eq!(KeyCode::from_name("3"), Some(KeyCode::Digit(3)));
        assert_eq!(KeyCode::from_name("F12"), None);
        assert_eq!(KeyCode::from_name(""), None);
    }

    #[test]
    fn held_keys_are_released_together() {
        let mut state = InputState::new();
        state.set_key_down(KeyCode::Character('W'));
        state.set_key_down(KeyCode::Digit(2));
        assert!(state.is_key_down_by_name("w"));
        state.set_key_up(KeyCode::Character('W'));
        assert!(!state.is_key_down(KeyCode::Character('W')));
        state.release_all();
        assert!(!state.is_key_down_by_name("2"));
    }

    #[test]
    fn first_cursor_sample_is_swallowed() {
        let mut look = MouseLook::default();
        assert_eq!(look.offset(Vec2::new(512.0, 384.0)), None);
        let offset = look.offset(Vec2::new(522.0, 374.0)).unwrap();
        assert!((offset - Vec2::new(1.0, 1.0)).length() < 1e-6);
        look.reset();
        assert_eq!(look.offset(Vec2::new(0.0, 0.0)), None);
    }
}
