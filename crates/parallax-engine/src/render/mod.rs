//! GPU rendering handles shared with renderer crates.
//!
//! Renderers own their GPU resources (pipelines, buffers, textures) and receive
//! a `RenderCtx` for device/queue access plus the command encoder of the frame.

mod ctx;

pub use ctx::RenderCtx;
