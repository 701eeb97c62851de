//! Keyboard and pointer input.
//!
//! The public types carry no winit types; `platform` translates window events
//! for the runtime.

mod frame;
pub(crate) mod platform;
mod state;
mod types;

pub use frame::InputFrame;
pub use state::InputState;
pub use types::{InputEvent, Key, MouseButton, Transition};
