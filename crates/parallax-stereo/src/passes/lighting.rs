use std::mem::{offset_of, size_of};
use std::sync::{Arc, OnceLock};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use parallax_engine::render::RenderCtx;

use crate::camera::EyeCamera;
use crate::config::StereoConfig;
use crate::error::PassError;
use crate::scene::SceneGpu;

use super::common::{
    color_attachment, depth_entry, opaque_target, pipeline_layout, primitive, sampler_entry,
    shader, texture_entry, uniform_buffer, uniform_entry, unfilterable_entry,
};
use super::gbuffer::GBufferSlots;
use super::targets::{stencil, COLOR_FORMAT, DEPTH_STENCIL_FORMAT, SHADOW_FORMAT};
use super::{slot, FrameParams, PassReflection, RenderData, RenderPass, SlotKind};

/// Shading inputs shared by the lighting pass and the ray-traced fill.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct LightingUniforms {
    pub camera_pos: [f32; 4],
    pub light_dir: [f32; 4],
    pub light_color: [f32; 4],
    pub ambient: [f32; 4],
    /// rgb background, a = 1 when the environment map is drawn.
    pub background: [f32; 4],
    pub shadow_view_proj: [[f32; 4]; 4],
    /// bias, PCF kernel width, shadow texel size, unused.
    pub shadow_params: [f32; 4],
}

impl LightingUniforms {
    pub fn new(
        scene: &SceneGpu,
        config: &StereoConfig,
        camera_pos: Vec3,
        shadow_view_proj: Mat4,
    ) -> Self {
        let light = scene.light;
        let ambient = scene.probe.map_or(Vec3::splat(0.03), |p| p.irradiance);
        let skybox = config.lighting.skybox && scene.has_environment;
        Self {
            camera_pos: camera_pos.extend(1.0).to_array(),
            light_dir: light.direction.normalize_or(Vec3::NEG_Y).extend(0.0).to_array(),
            light_color: (light.color * light.intensity).extend(1.0).to_array(),
            ambient: ambient.extend(1.0).to_array(),
            background: scene.background.extend(if skybox { 1.0 } else { 0.0 }).to_array(),
            shadow_view_proj: shadow_view_proj.to_cols_array_2d(),
            shadow_params: [
                config.lighting.shadow_bias,
                config.lighting.pcf_kernel as f32,
                1.0 / config.shadow.map_size.max(1) as f32,
                0.0,
            ],
        }
    }

    fn camera_block(&self) -> &[u8] {
        let block = CameraBlock::get();
        let bytes = bytemuck::bytes_of(self);
        &bytes[block.offset..block.offset + block.size]
    }

    fn same_except_camera(&self, other: &Self) -> bool {
        Self {
            camera_pos: other.camera_pos,
            ..*self
        } == *other
    }
}

/// Byte range of the camera position inside [`LightingUniforms`].
struct CameraBlock {
    offset: usize,
    size: usize,
}

impl CameraBlock {
    fn get() -> &'static CameraBlock {
        static BLOCK: OnceLock<CameraBlock> = OnceLock::new();
        BLOCK.get_or_init(|| CameraBlock {
            offset: offset_of!(LightingUniforms, camera_pos),
            size: size_of::<[f32; 4]>(),
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum LightingUpdate {
    Unchanged,
    CameraOnly,
    Full,
}

impl LightingUpdate {
    pub(crate) fn between(prev: Option<&LightingUniforms>, next: &LightingUniforms) -> Self {
        match prev {
            Some(p) if p == next => LightingUpdate::Unchanged,
            Some(p) if p.same_except_camera(next) => LightingUpdate::CameraOnly,
            _ => LightingUpdate::Full,
        }
    }
}

/// Lighting uniform buffer that uploads only what changed since the last write.
pub(crate) struct LightingBuffer {
    pub(crate) buffer: wgpu::Buffer,
    last: Option<LightingUniforms>,
}

impl LightingBuffer {
    pub(crate) fn new(device: &wgpu::Device, label: &str) -> Self {
        Self {
            buffer: uniform_buffer::<LightingUniforms>(device, label),
            last: None,
        }
    }

    pub(crate) fn write(&mut self, queue: &wgpu::Queue, uniforms: &LightingUniforms) {
        match LightingUpdate::between(self.last.as_ref(), uniforms) {
            LightingUpdate::Unchanged => {}
            LightingUpdate::CameraOnly => {
                let offset = CameraBlock::get().offset as u64;
                queue.write_buffer(&self.buffer, offset, uniforms.camera_block());
            }
            LightingUpdate::Full => {
                queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(uniforms));
            }
        }
        self.last = Some(*uniforms);
    }
}

// ── lighting pass ─────────────────────────────────────────────────────────

/// G-buffer inputs and the lit output of one lighting pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LightingSlots {
    pub gbuffer: GBufferSlots,
    pub output: &'static str,
}

impl LightingSlots {
    pub const LEFT: Self = Self {
        gbuffer: GBufferSlots::LEFT,
        output: slot::LEFT_COLOR,
    };

    pub const REFILL: Self = Self {
        gbuffer: GBufferSlots::REFILL,
        output: slot::RIGHT_COLOR,
    };
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct EyeUniform {
    inv_view_proj: [[f32; 4]; 4],
}

/// Full-screen deferred shading of a G-buffer.
///
/// The masked variant shades only pixels whose stencil reads exactly
/// [`stencil::REFILLED`] (uncovered by the warp, then re-rasterized) and leaves
/// every other output pixel as it was.
pub struct LightingPass {
    slots: LightingSlots,
    masked: bool,

    pipeline: Option<wgpu::RenderPipeline>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    lighting: Option<LightingBuffer>,
    eye_ubo: Option<wgpu::Buffer>,
    shadow_sampler: Option<wgpu::Sampler>,

    scene: Option<Arc<SceneGpu>>,
}

impl LightingPass {
    pub fn left() -> Self {
        Self::with_slots(LightingSlots::LEFT, false)
    }

    pub fn refill() -> Self {
        Self::with_slots(LightingSlots::REFILL, true)
    }

    fn with_slots(slots: LightingSlots, masked: bool) -> Self {
        Self {
            slots,
            masked,
            pipeline: None,
            bind_group_layout: None,
            lighting: None,
            eye_ubo: None,
            shadow_sampler: None,
            scene: None,
        }
    }

    fn eye<'f>(&self, frame: &FrameParams<'f>) -> &'f EyeCamera {
        if self.masked {
            &frame.eyes.right
        } else {
            &frame.eyes.left
        }
    }

    fn ensure_pipeline(&mut self, ctx: &RenderCtx<'_>) {
        if self.pipeline.is_some() {
            return;
        }
        let source = concat!(
            include_str!("shaders/lighting_common.wgsl"),
            include_str!("shaders/lighting.wgsl")
        );
        let module = shader(ctx.device, "parallax lighting shader", source);

        let fragment = wgpu::ShaderStages::FRAGMENT;
        let bgl = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("parallax lighting bgl"),
                entries: &[
                    uniform_entry(0, fragment, false),
                    uniform_entry(1, fragment, false),
                    unfilterable_entry(2, fragment),
                    unfilterable_entry(3, fragment),
                    unfilterable_entry(4, fragment),
                    unfilterable_entry(5, fragment),
                    depth_entry(6, fragment),
                    sampler_entry(7, fragment, wgpu::SamplerBindingType::Comparison),
                    texture_entry(
                        8,
                        fragment,
                        wgpu::TextureSampleType::Float { filterable: true },
                        wgpu::TextureViewDimension::Cube,
                    ),
                    sampler_entry(9, fragment, wgpu::SamplerBindingType::Filtering),
                ],
            });
        let layout = pipeline_layout(ctx.device, "parallax lighting pipeline layout", &[&bgl]);

        let depth_stencil = self.masked.then(|| {
            let face = wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::Equal,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::Keep,
                pass_op: wgpu::StencilOperation::Keep,
            };
            wgpu::DepthStencilState {
                format: DEPTH_STENCIL_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState {
                    front: face,
                    back: face,
                    read_mask: stencil::COVERED | stencil::REFILLED,
                    write_mask: 0,
                },
                bias: wgpu::DepthBiasState::default(),
            }
        });

        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(if self.masked {
                "parallax refill lighting pipeline"
            } else {
                "parallax lighting pipeline"
            }),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_fullscreen"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[opaque_target(COLOR_FORMAT)],
            }),
            primitive: primitive(wgpu::PolygonMode::Fill),
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        self.lighting = Some(LightingBuffer::new(ctx.device, "parallax lighting ubo"));
        self.eye_ubo = Some(uniform_buffer::<EyeUniform>(ctx.device, "parallax lighting eye ubo"));
        self.shadow_sampler = Some(shadow_sampler(ctx.device));
        self.pipeline = Some(pipeline);
        self.bind_group_layout = Some(bgl);
    }
}

pub(crate) fn shadow_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("parallax shadow sampler"),
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        compare: Some(wgpu::CompareFunction::LessEqual),
        ..Default::default()
    })
}

impl RenderPass for LightingPass {
    fn name(&self) -> &'static str {
        if self.masked { "refill lighting" } else { "lighting" }
    }

    fn reflect(&self) -> PassReflection {
        let g = self.slots.gbuffer;
        let reflection = PassReflection::new()
            .input(g.position, SlotKind::Texture(super::targets::POSITION_FORMAT))
            .input(g.normal, SlotKind::Texture(super::targets::NORMAL_FORMAT))
            .input(g.diffuse, SlotKind::Texture(super::targets::DIFFUSE_FORMAT))
            .input(g.specular, SlotKind::Texture(super::targets::SPECULAR_FORMAT))
            .input(slot::SHADOW_MAP, SlotKind::Texture(SHADOW_FORMAT))
            .output(self.slots.output, SlotKind::Texture(COLOR_FORMAT));
        if self.masked {
            reflection.input(g.depth, SlotKind::DepthStencil)
        } else {
            reflection
        }
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
        let output = data.texture(self.slots.output)?;

        let Some(scene) = self.scene.clone() else {
            if !self.masked {
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("parallax lighting clear"),
                    color_attachments: &[color_attachment(
                        output,
                        wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    )],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                    multiview_mask: None,
                });
            }
            return Err(PassError::MissingScene);
        };

        self.ensure_pipeline(ctx);
        let eye = *self.eye(frame);
        let uniforms = LightingUniforms::new(&scene, frame.config, eye.position, frame.shadow_view_proj);
        if let Some(lighting) = self.lighting.as_mut() {
            lighting.write(ctx.queue, &uniforms);
        }

        let (Some(pipeline), Some(bgl), Some(lighting), Some(eye_ubo), Some(shadow_sampler)) = (
            self.pipeline.as_ref(),
            self.bind_group_layout.as_ref(),
            self.lighting.as_ref(),
            self.eye_ubo.as_ref(),
            self.shadow_sampler.as_ref(),
        ) else {
            return Ok(());
        };

        let eye_uniform = EyeUniform {
            inv_view_proj: eye.inv_view_proj.to_cols_array_2d(),
        };
        ctx.queue.write_buffer(eye_ubo, 0, bytemuck::bytes_of(&eye_uniform));

        let g = self.slots.gbuffer;
        let views = [
            data.texture(g.position)?,
            data.texture(g.normal)?,
            data.texture(g.diffuse)?,
            data.texture(g.specular)?,
            data.texture(slot::SHADOW_MAP)?,
        ];
        // Targets are reallocated on resize, so the bind group follows the frame's views.
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("parallax lighting bind group"),
            layout: bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: lighting.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: eye_ubo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(views[0]),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(views[1]),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(views[2]),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(views[3]),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::TextureView(views[4]),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: wgpu::BindingResource::Sampler(shadow_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: wgpu::BindingResource::TextureView(&scene.environment.view),
                },
                wgpu::BindGroupEntry {
                    binding: 9,
                    resource: wgpu::BindingResource::Sampler(&scene.environment.sampler),
                },
            ],
        });

        let (load, depth_stencil_attachment) = if self.masked {
            (
                wgpu::LoadOp::Load,
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view: data.texture(g.depth)?,
                    depth_ops: None,
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                }),
            )
        } else {
            (wgpu::LoadOp::Clear(wgpu::Color::BLACK), None)
        };

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(if self.masked {
                "parallax refill lighting pass"
            } else {
                "parallax lighting pass"
            }),
            color_attachments: &[color_attachment(output, load)],
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        if self.masked {
            rpass.set_stencil_reference(stencil::REFILLED);
        }
        rpass.draw(0..3, 0..1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniforms() -> LightingUniforms {
        LightingUniforms {
            camera_pos: [0.0, 1.0, 5.0, 1.0],
            light_dir: [0.0, -1.0, 0.0, 0.0],
            light_color: [3.0; 4],
            ambient: [0.1; 4],
            background: [0.2, 0.3, 0.4, 1.0],
            shadow_view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            shadow_params: [0.01, 4.0, 1.0 / 2048.0, 0.0],
        }
    }

    #[test]
    fn layout_matches_shader_struct() {
        assert_eq!(size_of::<LightingUniforms>(), 160);
        assert_eq!(CameraBlock::get().offset, 0);
        assert_eq!(CameraBlock::get().size, 16);
    }

    #[test]
    fn camera_moves_patch_only_the_camera_block() {
        let a = uniforms();
        let mut b = a;
        b.camera_pos = [0.062, 1.0, 5.0, 1.0];
        assert_eq!(LightingUpdate::between(Some(&a), &a), LightingUpdate::Unchanged);
        assert_eq!(LightingUpdate::between(Some(&a), &b), LightingUpdate::CameraOnly);
        assert_eq!(b.camera_block(), bytemuck::bytes_of(&b.camera_pos));
    }

    #[test]
    fn light_changes_rewrite_everything() {
        let a = uniforms();
        let mut b = a;
        b.light_dir = [0.3, -1.0, 0.0, 0.0];
        b.camera_pos = [1.0; 4];
        assert_eq!(LightingUpdate::between(Some(&a), &b), LightingUpdate::Full);
        assert_eq!(LightingUpdate::between(None, &a), LightingUpdate::Full);
    }
}
