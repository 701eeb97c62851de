//! Stereo reprojection renderer.
//!
//! Shades the left eye with a deferred pipeline, warps the result into the right
//! eye through an adaptively tessellated screen-space grid, then fills the
//! disocclusion holes by ray tracing or by stencil-masked re-rasterization.
//!
//! Entry point is [`StereoRenderer`]; the passes it drives are public so hosts can
//! assemble their own frame if needed.

pub mod camera;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod grid;
pub mod passes;
pub mod renderer;
pub mod scene;
pub mod shadow;
pub mod tessellation;

pub use camera::{Camera, CameraInput, EyeCamera, EyePair, StereoCameraController};
pub use config::{
    DiagnosticsConfig, EyeOutput, HoleFillConfig, HoleFillMode, LightingConfig, OutputConfig,
    ReprojectionConfig, ShadingMode, ShadowConfig, StereoConfig, StereoParams,
};
pub use error::PassError;
pub use renderer::{plan_frame, FramePlan, PlannedPass, SceneStatus, StereoRenderer};
pub use scene::{Scene, SceneGpu};
