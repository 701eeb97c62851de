use std::sync::Arc;

use parallax_engine::render::RenderCtx;

use crate::config::HoleFillMode;
use crate::error::PassError;
use crate::scene::SceneGpu;

use super::super::common::color_attachment;
use super::super::gbuffer::GBufferPass;
use super::super::lighting::LightingPass;
use super::super::targets::{
    GBufferTargets, COLOR_FORMAT, DIFFUSE_FORMAT, NORMAL_FORMAT, POSITION_FORMAT, SHADOW_FORMAT,
    SPECULAR_FORMAT,
};
use super::super::{slot, FrameParams, PassReflection, RenderData, RenderPass, SlotKind};
use super::{require_scene, HoleFiller};

/// Re-rasterizes the scene from the right eye into a second G-buffer, masked
/// to the pixels the warp left uncovered, then re-lights only those pixels.
pub struct ReRasterFiller {
    gbuffer: GBufferPass,
    lighting: LightingPass,
    targets: Option<GBufferTargets>,
    scene: Option<Arc<SceneGpu>>,
}

impl Default for ReRasterFiller {
    fn default() -> Self {
        Self::new()
    }
}

impl ReRasterFiller {
    pub fn new() -> Self {
        Self {
            gbuffer: GBufferPass::refill(),
            lighting: LightingPass::refill(),
            targets: None,
            scene: None,
        }
    }

    fn bind_refill<'a>(targets: &'a GBufferTargets, data: &RenderData<'a>) -> RenderData<'a> {
        data.clone()
            .with_texture(slot::REFILL_POSITION, &targets.position)
            .with_texture(slot::REFILL_NORMAL, &targets.normal)
            .with_texture(slot::REFILL_DIFFUSE, &targets.diffuse)
            .with_texture(slot::REFILL_SPECULAR, &targets.specular)
    }
}

impl RenderPass for ReRasterFiller {
    fn name(&self) -> &'static str {
        "re-raster fill"
    }

    fn reflect(&self) -> PassReflection {
        PassReflection::new()
            .input(slot::RIGHT_DEPTH, SlotKind::DepthStencil)
            .input(slot::SHADOW_MAP, SlotKind::Texture(SHADOW_FORMAT))
            .output(slot::RIGHT_COLOR, SlotKind::Texture(COLOR_FORMAT))
            .internal(slot::REFILL_POSITION, SlotKind::Texture(POSITION_FORMAT))
            .internal(slot::REFILL_NORMAL, SlotKind::Texture(NORMAL_FORMAT))
            .internal(slot::REFILL_DIFFUSE, SlotKind::Texture(DIFFUSE_FORMAT))
            .internal(slot::REFILL_SPECULAR, SlotKind::Texture(SPECULAR_FORMAT))
    }

    fn on_resize(&mut self, ctx: &RenderCtx<'_>, width: u32, height: u32) {
        self.targets = Some(GBufferTargets::new(
            ctx.device,
            "parallax refill gbuffer",
            width.max(1),
            height.max(1),
        ));
        self.gbuffer.on_resize(ctx, width, height);
        self.lighting.on_resize(ctx, width, height);
    }

    fn set_scene(&mut self, ctx: &RenderCtx<'_>, scene: Option<&Arc<SceneGpu>>) {
        self.scene = scene.cloned();
        self.gbuffer.set_scene(ctx, scene);
        self.lighting.set_scene(ctx, scene);
    }

    fn execute(
        &mut self,
        ctx: &RenderCtx<'_>,
        encoder: &mut wgpu::CommandEncoder,
        data: &RenderData<'_>,
        frame: &FrameParams<'_>,
    ) -> Result<(), PassError> {
        data.validate(&self.reflect())?;
        require_scene(HoleFillMode::ReRaster, self.scene.as_ref())?;

        let (width, height) = frame.size;
        if self.targets.is_none() {
            self.on_resize(ctx, width, height);
        }
        let Some(targets) = self.targets.as_ref() else {
            return Ok(());
        };
        let data = Self::bind_refill(targets, data);

        if frame.config.hole_fill.debug_clear {
            // Warped pixels go black; only re-rastered ones stay visible.
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("parallax refill debug clear"),
                color_attachments: &[color_attachment(
                    data.texture(slot::RIGHT_COLOR)?,
                    wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                )],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }

        self.gbuffer.execute(ctx, encoder, &data, frame)?;
        self.lighting.execute(ctx, encoder, &data, frame)
    }
}

impl HoleFiller for ReRasterFiller {
    fn mode(&self) -> HoleFillMode {
        HoleFillMode::ReRaster
    }

    fn available(&self, scene: Option<&Arc<SceneGpu>>) -> Result<(), PassError> {
        require_scene(HoleFillMode::ReRaster, scene).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refill_targets_are_internal() {
        let filler = ReRasterFiller::new();
        let reflection = filler.reflect();
        assert!(reflection.internal.iter().any(|s| s.name == slot::REFILL_POSITION));
        assert!(reflection.inputs.iter().any(|s| s.name == slot::RIGHT_DEPTH));
        assert_eq!(filler.available(None), Err(PassError::MissingScene));
    }
}
