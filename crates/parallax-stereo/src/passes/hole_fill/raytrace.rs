use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use parallax_engine::render::RenderCtx;

use crate::config::HoleFillMode;
use crate::error::PassError;
use crate::scene::SceneGpu;

use super::super::common::{
    buffer_entry, compute_pipeline, depth_entry, pipeline_layout, sampler_entry, shader,
    storage_entry, storage_texture_entry, texture_entry, uniform_buffer, uniform_entry, workgroups,
};
use super::super::lighting::{shadow_sampler, LightingBuffer, LightingUniforms};
use super::super::targets::{COLOR_FORMAT, SHADOW_FORMAT};
use super::super::{slot, FrameParams, PassReflection, RenderData, RenderPass, SlotKind};
use super::{require_scene, HoleFiller};

const WORKGROUP: u32 = 8;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct TraceUniforms {
    inv_view_proj: [[f32; 4]; 4],
    screen: [u32; 2],
    trace_all: u32,
    _pad0: u32,
    spread_angle: f32,
    _pad: [f32; 3],
}

/// Traces one primary ray per uncovered right-eye pixel against the scene BVH.
///
/// Coverage comes from the warp's stencil bit; with `trace_all` set every pixel
/// is traced, which is how the ray-trace-only mode renders the whole eye.
#[derive(Default)]
pub struct RayTraceFiller {
    env_map: Option<bool>,
    pipeline: Option<wgpu::ComputePipeline>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    trace_ubo: Option<wgpu::Buffer>,
    lighting: Option<LightingBuffer>,
    shadow_sampler: Option<wgpu::Sampler>,

    scene: Option<Arc<SceneGpu>>,
}

impl RayTraceFiller {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_pipeline(&mut self, ctx: &RenderCtx<'_>, env_map: bool) {
        if self.env_map == Some(env_map) && self.pipeline.is_some() {
            return;
        }
        let source = concat!(
            include_str!("../shaders/material.wgsl"),
            include_str!("../shaders/lighting_common.wgsl"),
            include_str!("../shaders/raytrace.wgsl")
        );
        let module = shader(ctx.device, "parallax raytrace shader", source);

        let compute = wgpu::ShaderStages::COMPUTE;
        let bgl = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("parallax raytrace bgl"),
                entries: &[
                    uniform_entry(0, compute, false),
                    uniform_entry(1, compute, false),
                    texture_entry(
                        2,
                        compute,
                        wgpu::TextureSampleType::Uint,
                        wgpu::TextureViewDimension::D2,
                    ),
                    storage_texture_entry(3, COLOR_FORMAT),
                    storage_entry(4, compute, true),
                    storage_entry(5, compute, true),
                    storage_entry(6, compute, true),
                    depth_entry(7, compute),
                    sampler_entry(8, compute, wgpu::SamplerBindingType::Comparison),
                    texture_entry(
                        9,
                        compute,
                        wgpu::TextureSampleType::Float { filterable: true },
                        wgpu::TextureViewDimension::Cube,
                    ),
                    sampler_entry(10, compute, wgpu::SamplerBindingType::Filtering),
                ],
            });
        let layout = pipeline_layout(ctx.device, "parallax raytrace pipeline layout", &[&bgl]);
        let constants = [("USE_ENV_MAP", f64::from(u8::from(env_map)))];
        let pipeline = compute_pipeline(
            ctx.device,
            "parallax raytrace pipeline",
            &layout,
            &module,
            "main",
            &constants,
        );

        if self.trace_ubo.is_none() {
            self.trace_ubo = Some(uniform_buffer::<TraceUniforms>(ctx.device, "parallax raytrace ubo"));
            self.lighting = Some(LightingBuffer::new(ctx.device, "parallax raytrace lighting ubo"));
            self.shadow_sampler = Some(shadow_sampler(ctx.device));
        }
        self.pipeline = Some(pipeline);
        self.bind_group_layout = Some(bgl);
        self.env_map = Some(env_map);
        log::debug!("raytrace pipeline built (env_map={env_map})");
    }
}

impl RenderPass for RayTraceFiller {
    fn name(&self) -> &'static str {
        "ray trace fill"
    }

    fn reflect(&self) -> PassReflection {
        PassReflection::new()
            .input(slot::RIGHT_STENCIL, SlotKind::DepthStencil)
            .input(slot::SHADOW_MAP, SlotKind::Texture(SHADOW_FORMAT))
            .output(slot::RIGHT_COLOR, SlotKind::Texture(COLOR_FORMAT))
    }

    fn set_scene(&mut self, _ctx: &RenderCtx<'_>, scene: Option<&Arc<SceneGpu>>) {
        self.scene = scene.cloned();
    }

    fn execute(
        &mut self,
        ctx: &RenderCtx<'_>,
        encoder: &mut wgpu::CommandEncoder,
        data: &RenderData<'_>,
        frame: &FrameParams<'_>,
    ) -> Result<(), PassError> {
        data.validate(&self.reflect())?;
        let scene = require_scene(HoleFillMode::RayTrace, self.scene.as_ref())?.clone();
        let Some(accel) = scene.accel.as_ref() else {
            return Err(PassError::MissingAccelerationStructure);
        };

        let env_map = frame.config.hole_fill.env_map && scene.has_environment;
        self.ensure_pipeline(ctx, env_map);

        let right = &frame.eyes.right;
        let uniforms = LightingUniforms::new(&scene, frame.config, right.position, frame.shadow_view_proj);
        if let Some(lighting) = self.lighting.as_mut() {
            lighting.write(ctx.queue, &uniforms);
        }

        let (Some(pipeline), Some(bgl), Some(trace_ubo), Some(lighting), Some(shadow_sampler)) = (
            self.pipeline.as_ref(),
            self.bind_group_layout.as_ref(),
            self.trace_ubo.as_ref(),
            self.lighting.as_ref(),
            self.shadow_sampler.as_ref(),
        ) else {
            return Ok(());
        };

        let (width, height) = frame.size;
        let trace = TraceUniforms {
            inv_view_proj: right.inv_view_proj.to_cols_array_2d(),
            screen: [width, height],
            trace_all: u32::from(frame.trace_all),
            _pad0: 0,
            spread_angle: frame.eyes.pixel_spread_angle(height),
            _pad: [0.0; 3],
        };
        ctx.queue.write_buffer(trace_ubo, 0, bytemuck::bytes_of(&trace));

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("parallax raytrace bind group"),
            layout: bgl,
            entries: &[
                buffer_entry(0, trace_ubo),
                buffer_entry(1, &lighting.buffer),
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(data.texture(slot::RIGHT_STENCIL)?),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(data.texture(slot::RIGHT_COLOR)?),
                },
                buffer_entry(4, &accel.nodes),
                buffer_entry(5, &accel.triangles),
                buffer_entry(6, &scene.materials),
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: wgpu::BindingResource::TextureView(data.texture(slot::SHADOW_MAP)?),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: wgpu::BindingResource::Sampler(shadow_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 9,
                    resource: wgpu::BindingResource::TextureView(&scene.environment.view),
                },
                wgpu::BindGroupEntry {
                    binding: 10,
                    resource: wgpu::BindingResource::Sampler(&scene.environment.sampler),
                },
            ],
        });

        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("parallax raytrace pass"),
            timestamp_writes: None,
        });
        cpass.set_pipeline(pipeline);
        cpass.set_bind_group(0, &bind_group, &[]);
        cpass.dispatch_workgroups(workgroups(width, WORKGROUP), workgroups(height, WORKGROUP), 1);
        Ok(())
    }
}

impl HoleFiller for RayTraceFiller {
    fn mode(&self) -> HoleFillMode {
        HoleFillMode::RayTrace
    }

    fn available(&self, scene: Option<&Arc<SceneGpu>>) -> Result<(), PassError> {
        require_scene(HoleFillMode::RayTrace, scene).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_uniforms_match_shader_struct() {
        assert_eq!(std::mem::size_of::<TraceUniforms>(), 96);
    }

    #[test]
    fn unavailable_without_scene() {
        let filler = RayTraceFiller::new();
        assert_eq!(filler.available(None), Err(PassError::MissingScene));
        assert_eq!(filler.mode(), HoleFillMode::RayTrace);
    }
}
