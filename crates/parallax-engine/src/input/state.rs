use std::collections::HashSet;

use super::frame::InputFrame;
use super::types::{InputEvent, Key, MouseButton, Transition};

/// Held keys and buttons plus the last pointer position of the window.
#[derive(Debug, Default)]
pub struct InputState {
    pub keys_down: HashSet<Key>,
    pub buttons_down: HashSet<MouseButton>,
    /// Logical pixels; `None` while the pointer is outside the window.
    pub pointer: Option<(f32, f32)>,
}

impl InputState {
    /// Folds `ev` into the held state and records its edges in `frame`.
    pub fn apply(&mut self, frame: &mut InputFrame, ev: InputEvent) {
        match ev {
            InputEvent::Key {
                key, transition, ..
            } => match transition {
                Transition::Pressed => {
                    if self.keys_down.insert(key) {
                        frame.keys_pressed.insert(key);
                    }
                }
                Transition::Released => {
                    self.keys_down.remove(&key);
                }
            },
            InputEvent::Button { button, transition } => match transition {
                Transition::Pressed => {
                    if self.buttons_down.insert(button) {
                        frame.buttons_pressed.insert(button);
                    }
                }
                Transition::Released => {
                    self.buttons_down.remove(&button);
                }
            },
            InputEvent::PointerMoved { x, y } => {
                // No delta for the first sample after entering the window.
                if let Some((px, py)) = self.pointer {
                    frame.pointer_delta.0 += x - px;
                    frame.pointer_delta.1 += y - py;
                }
                self.pointer = Some((x, y));
            }
            InputEvent::PointerLeft => self.pointer = None,
            InputEvent::Wheel { lines } => frame.wheel_lines += lines,
            InputEvent::FocusLost => {
                // Releases never arrive for keys held while focus moves away.
                self.keys_down.clear();
                self.buttons_down.clear();
            }
        }
    }

    pub fn key_down(&self, key: Key) -> bool {
        self.keys_down.contains(&key)
    }

    pub fn button_down(&self, button: MouseButton) -> bool {
        self.buttons_down.contains(&button)
    }

    /// `1.0` while only `positive` is held, `-1.0` while only `negative` is, else `0.0`.
    pub fn axis(&self, positive: Key, negative: Key) -> f32 {
        match (self.key_down(positive), self.key_down(negative)) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(key: Key, transition: Transition) -> InputEvent {
        InputEvent::Key {
            key,
            transition,
            repeat: false,
        }
    }

    #[test]
    fn pointer_delta_accumulates_within_frame() {
        let mut st = InputState::default();
        let mut fr = InputFrame::default();
        st.apply(&mut fr, InputEvent::PointerMoved { x: 10.0, y: 10.0 });
        assert_eq!(fr.pointer_delta, (0.0, 0.0));
        st.apply(&mut fr, InputEvent::PointerMoved { x: 13.0, y: 8.0 });
        st.apply(&mut fr, InputEvent::PointerMoved { x: 15.0, y: 9.0 });
        assert_eq!(fr.pointer_delta, (5.0, -1.0));

        fr.clear();
        assert_eq!(fr.pointer_delta, (0.0, 0.0));
        assert_eq!(st.pointer, Some((15.0, 9.0)));
    }

    #[test]
    fn reentering_window_does_not_jump() {
        let mut st = InputState::default();
        let mut fr = InputFrame::default();
        st.apply(&mut fr, InputEvent::PointerMoved { x: 10.0, y: 10.0 });
        st.apply(&mut fr, InputEvent::PointerLeft);
        st.apply(&mut fr, InputEvent::PointerMoved { x: 400.0, y: 300.0 });
        assert_eq!(fr.pointer_delta, (0.0, 0.0));
    }

    #[test]
    fn held_key_is_pressed_once() {
        let mut st = InputState::default();
        let mut fr = InputFrame::default();
        st.apply(&mut fr, key(Key::W, Transition::Pressed));
        assert!(fr.pressed(Key::W));
        fr.clear();
        st.apply(&mut fr, key(Key::W, Transition::Pressed));
        assert!(!fr.pressed(Key::W));
        assert!(st.key_down(Key::W));
    }

    #[test]
    fn axis_cancels_opposing_keys() {
        let mut st = InputState::default();
        let mut fr = InputFrame::default();
        st.apply(&mut fr, key(Key::D, Transition::Pressed));
        assert_eq!(st.axis(Key::D, Key::A), 1.0);
        st.apply(&mut fr, key(Key::A, Transition::Pressed));
        assert_eq!(st.axis(Key::D, Key::A), 0.0);
        st.apply(&mut fr, key(Key::D, Transition::Released));
        assert_eq!(st.axis(Key::D, Key::A), -1.0);
    }

    #[test]
    fn focus_loss_releases_everything() {
        let mut st = InputState::default();
        let mut fr = InputFrame::default();
        st.apply(&mut fr, key(Key::Shift, Transition::Pressed));
        st.apply(
            &mut fr,
            InputEvent::Button {
                button: MouseButton::Right,
                transition: Transition::Pressed,
            },
        );
        assert!(fr.clicked(MouseButton::Right));
        st.apply(&mut fr, InputEvent::FocusLost);
        assert!(!st.key_down(Key::Shift));
        assert!(!st.button_down(MouseButton::Right));
    }
}
