/// Keys a fly camera and its debug toggles bind to.
///
/// Left and right modifier keys collapse into one variant. Anything else arrives
/// as `Other`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Key {
    Escape,
    Enter,
    Tab,
    Space,

    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,

    Shift,
    Control,
    Alt,

    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,

    Digit0, Digit1, Digit2, Digit3, Digit4,
    Digit5, Digit6, Digit7, Digit8, Digit9,

    Other,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

/// Edge of a key or button.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transition {
    Pressed,
    Released,
}

/// Window input after translation from the platform.
///
/// Positions and wheel deltas are in logical pixels and lines.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum InputEvent {
    Key {
        key: Key,
        transition: Transition,
        /// Auto-repeat from a held key.
        repeat: bool,
    },
    Button {
        button: MouseButton,
        transition: Transition,
    },
    PointerMoved {
        x: f32,
        y: f32,
    },
    PointerLeft,
    Wheel {
        lines: f32,
    },
    FocusLost,
}
