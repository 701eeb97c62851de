//! Strategies that fill the right-eye pixels the warp left uncovered.

mod raytrace;
mod reraster;

pub use raytrace::RayTraceFiller;
pub use reraster::ReRasterFiller;

use std::sync::Arc;

use crate::config::HoleFillMode;
use crate::error::PassError;
use crate::scene::SceneGpu;

use super::RenderPass;

/// A pass that writes shaded color into uncovered right-eye pixels.
///
/// Fillers leave covered pixels untouched unless the frame asks to trace all of them.
pub trait HoleFiller: RenderPass {
    fn mode(&self) -> HoleFillMode;

    /// Whether the filler can run against `scene`.
    fn available(&self, scene: Option<&Arc<SceneGpu>>) -> Result<(), PassError>;
}

/// Scene requirements shared by both fillers.
pub(crate) fn require_scene(
    mode: HoleFillMode,
    scene: Option<&Arc<SceneGpu>>,
) -> Result<&Arc<SceneGpu>, PassError> {
    let scene = scene.ok_or(PassError::MissingScene)?;
    if mode == HoleFillMode::RayTrace && scene.accel.is_none() {
        return Err(PassError::MissingAccelerationStructure);
    }
    Ok(scene)
}
