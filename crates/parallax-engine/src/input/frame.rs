use std::collections::HashSet;

use super::types::{Key, MouseButton};

/// Edges and motion accumulated since the last redraw.
///
/// Toggles read `keys_pressed`; camera look reads `pointer_delta`. The runtime
/// clears it after every frame.
#[derive(Debug, Default)]
pub struct InputFrame {
    pub keys_pressed: HashSet<Key>,
    pub buttons_pressed: HashSet<MouseButton>,
    /// Logical pixels.
    pub pointer_delta: (f32, f32),
    pub wheel_lines: f32,
}

impl InputFrame {
    pub fn clear(&mut self) {
        self.keys_pressed.clear();
        self.buttons_pressed.clear();
        self.pointer_delta = (0.0, 0.0);
        self.wheel_lines = 0.0;
    }

    /// `key` went down this frame. Auto-repeat does not count.
    pub fn pressed(&self, key: Key) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn clicked(&self, button: MouseButton) -> bool {
        self.buttons_pressed.contains(&button)
    }
}
