//! GPU device and window surface.
//!
//! Creates the adapter, device and queue with the features the renderer can use,
//! configures the surface and hands out one encoder per acquired frame.

mod gpu;

pub use gpu::{check_downlevel, Acquired, Gpu, GpuInit, SurfaceFrame};
