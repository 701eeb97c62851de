//! Parallax engine crate.
//!
//! Platform + GPU runtime shared by the stereo renderer and its hosts:
//! device/surface ownership, the window loop, frame timing and input.

pub mod device;
pub mod window;
pub mod input;
pub mod time;
pub mod core;

pub mod logging;
pub mod render;
