//! Window and event loop.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig, RuntimeCtx};
