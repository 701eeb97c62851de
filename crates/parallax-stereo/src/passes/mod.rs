//! GPU passes of the stereo frame.
//!
//! Every pass follows one lifecycle: [`RenderPass::reflect`] declares the named
//! resources it reads and writes, [`RenderPass::on_resize`] and
//! [`RenderPass::set_scene`] (re)allocate what depends on them, and
//! [`RenderPass::execute`] records commands. Passes create their pipelines
//! lazily on first use and keep them until a knob baked into the pipeline changes.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Mat4;
use parallax_engine::render::RenderCtx;

use crate::camera::EyePair;
use crate::config::StereoConfig;
use crate::error::PassError;
use crate::grid::GridDims;
use crate::scene::SceneGpu;

mod common;
pub mod compose;
pub mod discontinuity;
pub mod gbuffer;
pub mod hole_count;
pub mod hole_fill;
pub mod lighting;
pub mod shadow;
pub mod targets;
pub mod warp;

pub use compose::{Compositor, EyeSink, SurfaceSink};
pub use discontinuity::DiscontinuityPass;
pub use gbuffer::{GBufferPass, GBufferSlots};
pub use hole_count::HoleCountPass;
pub use hole_fill::{HoleFiller, RayTraceFiller, ReRasterFiller};
pub use lighting::{LightingPass, LightingSlots, LightingUniforms};
pub use shadow::ShadowPass;
pub use targets::FrameTargets;
pub use warp::WarpPass;

/// Resource names shared between the renderer and the passes.
pub mod slot {
    pub const LEFT_POSITION: &str = "left.position";
    pub const LEFT_NORMAL: &str = "left.normal";
    pub const LEFT_DIFFUSE: &str = "left.diffuse";
    pub const LEFT_SPECULAR: &str = "left.specular";
    /// Depth-stencil attachment view.
    pub const LEFT_DEPTH: &str = "left.depth";
    /// Depth-only view for sampling.
    pub const LEFT_DEPTH_SAMPLED: &str = "left.depth_sampled";
    pub const LEFT_COLOR: &str = "left.color";

    pub const RIGHT_COLOR: &str = "right.color";
    pub const RIGHT_DEPTH: &str = "right.depth";
    /// Stencil-only view for sampling.
    pub const RIGHT_STENCIL: &str = "right.stencil";

    pub const REFILL_POSITION: &str = "refill.position";
    pub const REFILL_NORMAL: &str = "refill.normal";
    pub const REFILL_DIFFUSE: &str = "refill.diffuse";
    pub const REFILL_SPECULAR: &str = "refill.specular";

    pub const SHADOW_MAP: &str = "shadow_map";

    pub const GRID_VERTICES: &str = "grid.vertices";
    pub const GRID_INDICES: &str = "grid.indices";
    pub const DISCONTINUITY: &str = "discontinuity";
}

// ── reflection ────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SlotKind {
    Texture(wgpu::TextureFormat),
    DepthStencil,
    Buffer,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Slot {
    pub name: &'static str,
    pub kind: SlotKind,
    pub optional: bool,
}

/// Resources a pass reads, writes and keeps to itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReflection {
    pub inputs: Vec<Slot>,
    pub outputs: Vec<Slot>,
    pub internal: Vec<Slot>,
}

impl PassReflection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, name: &'static str, kind: SlotKind) -> Self {
        self.inputs.push(Slot {
            name,
            kind,
            optional: false,
        });
        self
    }

    pub fn optional_input(mut self, name: &'static str, kind: SlotKind) -> Self {
        self.inputs.push(Slot {
            name,
            kind,
            optional: true,
        });
        self
    }

    pub fn output(mut self, name: &'static str, kind: SlotKind) -> Self {
        self.outputs.push(Slot {
            name,
            kind,
            optional: false,
        });
        self
    }

    pub fn internal(mut self, name: &'static str, kind: SlotKind) -> Self {
        self.internal.push(Slot {
            name,
            kind,
            optional: false,
        });
        self
    }

    /// Required inputs and all outputs; these must be bound before `execute`.
    pub fn required(&self) -> impl Iterator<Item = &Slot> {
        self.inputs
            .iter()
            .filter(|s| !s.optional)
            .chain(self.outputs.iter())
    }
}

// ── render data ───────────────────────────────────────────────────────────

/// Named views and buffers bound for one frame.
#[derive(Clone, Default)]
pub struct RenderData<'a> {
    textures: HashMap<&'static str, &'a wgpu::TextureView>,
    buffers: HashMap<&'static str, &'a wgpu::Buffer>,
}

impl<'a> RenderData<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_texture(&mut self, name: &'static str, view: &'a wgpu::TextureView) {
        self.textures.insert(name, view);
    }

    pub fn insert_buffer(&mut self, name: &'static str, buffer: &'a wgpu::Buffer) {
        self.buffers.insert(name, buffer);
    }

    pub fn with_texture(mut self, name: &'static str, view: &'a wgpu::TextureView) -> Self {
        self.insert_texture(name, view);
        self
    }

    pub fn with_buffer(mut self, name: &'static str, buffer: &'a wgpu::Buffer) -> Self {
        self.insert_buffer(name, buffer);
        self
    }

    pub fn texture(&self, name: &'static str) -> Result<&'a wgpu::TextureView, PassError> {
        self.textures
            .get(name)
            .copied()
            .ok_or(PassError::MissingInput(name))
    }

    pub fn buffer(&self, name: &'static str) -> Result<&'a wgpu::Buffer, PassError> {
        self.buffers
            .get(name)
            .copied()
            .ok_or(PassError::MissingInput(name))
    }

    pub fn contains(&self, slot: &Slot) -> bool {
        match slot.kind {
            SlotKind::Buffer => self.buffers.contains_key(slot.name),
            SlotKind::Texture(_) | SlotKind::DepthStencil => {
                self.textures.contains_key(slot.name)
            }
        }
    }

    /// Fails with the first required slot of `reflection` that is not bound.
    pub fn validate(&self, reflection: &PassReflection) -> Result<(), PassError> {
        match reflection.required().find(|s| !self.contains(s)) {
            Some(slot) => Err(PassError::MissingInput(slot.name)),
            None => Ok(()),
        }
    }
}

// ── frame parameters ──────────────────────────────────────────────────────

/// Per-frame state every pass may read.
#[derive(Copy, Clone)]
pub struct FrameParams<'a> {
    pub config: &'a StereoConfig,
    pub eyes: &'a EyePair,
    /// Per-eye resolution.
    pub size: (u32, u32),
    pub grid: Option<GridDims>,
    pub frame_index: u64,
    /// Fill every pixel instead of only uncovered ones.
    pub trace_all: bool,
    pub shadow_view_proj: Mat4,
    /// The shadow map must be redrawn this frame.
    pub shadow_dirty: bool,
}

/// One stage of the stereo frame.
pub trait RenderPass {
    fn name(&self) -> &'static str;

    fn reflect(&self) -> PassReflection;

    fn on_resize(&mut self, _ctx: &RenderCtx<'_>, _width: u32, _height: u32) {}

    fn set_scene(&mut self, _ctx: &RenderCtx<'_>, _scene: Option<&Arc<SceneGpu>>) {}

    fn execute(
        &mut self,
        ctx: &RenderCtx<'_>,
        encoder: &mut wgpu::CommandEncoder,
        data: &RenderData<'_>,
        frame: &FrameParams<'_>,
    ) -> Result<(), PassError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_reports_first_missing_required_slot() {
        let reflection = PassReflection::new()
            .optional_input("optional", SlotKind::Buffer)
            .input("needed", SlotKind::Buffer)
            .output("out", SlotKind::DepthStencil);
        let data = RenderData::new();
        assert_eq!(
            data.validate(&reflection),
            Err(PassError::MissingInput("needed"))
        );
    }

    #[test]
    fn optional_inputs_are_not_required() {
        let reflection = PassReflection::new()
            .optional_input("optional", SlotKind::Buffer)
            .internal("scratch", SlotKind::Buffer);
        assert_eq!(reflection.required().count(), 0);
        assert!(RenderData::new().validate(&reflection).is_ok());
    }
}
