use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use parallax_engine::render::RenderCtx;

use crate::error::PassError;
use crate::scene::{GpuVertex, SceneGpu};

use super::common::{
    color_attachment, opaque_target, pipeline_layout, primitive, shader, stencil_face, storage_entry,
    uniform_buffer, uniform_entry,
};
use super::targets::{
    stencil, DEPTH_STENCIL_FORMAT, DIFFUSE_FORMAT, NORMAL_FORMAT, POSITION_FORMAT, SPECULAR_FORMAT,
};
use super::{slot, FrameParams, PassReflection, RenderData, RenderPass, SlotKind};

/// Names of the targets one G-buffer pass writes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GBufferSlots {
    pub position: &'static str,
    pub normal: &'static str,
    pub diffuse: &'static str,
    pub specular: &'static str,
    pub depth: &'static str,
}

impl GBufferSlots {
    pub const LEFT: Self = Self {
        position: slot::LEFT_POSITION,
        normal: slot::LEFT_NORMAL,
        diffuse: slot::LEFT_DIFFUSE,
        specular: slot::LEFT_SPECULAR,
        depth: slot::LEFT_DEPTH,
    };

    /// Re-raster fill: its own color targets over the right eye's depth-stencil.
    pub const REFILL: Self = Self {
        position: slot::REFILL_POSITION,
        normal: slot::REFILL_NORMAL,
        diffuse: slot::REFILL_DIFFUSE,
        specular: slot::REFILL_SPECULAR,
        depth: slot::RIGHT_DEPTH,
    };
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    position: [f32; 4],
}

/// Rasterizes the scene into a G-buffer.
///
/// The left-eye variant owns its depth-stencil. The stencil-masked variant draws
/// from the right eye and only touches pixels the warp left uncovered, tagging
/// each one it writes with [`stencil::REFILLED`].
pub struct GBufferPass {
    slots: GBufferSlots,
    masked: bool,

    pipeline: Option<wgpu::RenderPipeline>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    bind_group: Option<wgpu::BindGroup>,
    camera_ubo: Option<wgpu::Buffer>,

    scene: Option<Arc<SceneGpu>>,
}

impl GBufferPass {
    /// Full G-buffer of the left eye.
    pub fn left() -> Self {
        Self::with_slots(GBufferSlots::LEFT, false)
    }

    /// Stencil-masked G-buffer of the right eye's holes.
    pub fn refill() -> Self {
        Self::with_slots(GBufferSlots::REFILL, true)
    }

    fn with_slots(slots: GBufferSlots, masked: bool) -> Self {
        Self {
            slots,
            masked,
            pipeline: None,
            bind_group_layout: None,
            bind_group: None,
            camera_ubo: None,
            scene: None,
        }
    }

    pub fn slots(&self) -> GBufferSlots {
        self.slots
    }

    fn ensure_pipeline(&mut self, ctx: &RenderCtx<'_>) {
        if self.pipeline.is_some() {
            return;
        }
        let source = concat!(
            include_str!("shaders/material.wgsl"),
            include_str!("shaders/gbuffer.wgsl")
        );
        let module = shader(ctx.device, "parallax gbuffer shader", source);

        let bgl = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("parallax gbuffer bgl"),
                entries: &[
                    uniform_entry(0, wgpu::ShaderStages::VERTEX, false),
                    storage_entry(1, wgpu::ShaderStages::FRAGMENT, true),
                ],
            });
        let layout = pipeline_layout(ctx.device, "parallax gbuffer pipeline layout", &[&bgl]);

        let stencil_state = if self.masked {
            wgpu::StencilState {
                front: stencil_face(wgpu::CompareFunction::Equal),
                back: stencil_face(wgpu::CompareFunction::Equal),
                read_mask: stencil::COVERED,
                write_mask: stencil::REFILLED,
            }
        } else {
            wgpu::StencilState::default()
        };

        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(if self.masked {
                "parallax refill gbuffer pipeline"
            } else {
                "parallax gbuffer pipeline"
            }),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[GpuVertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[
                    opaque_target(POSITION_FORMAT),
                    opaque_target(NORMAL_FORMAT),
                    opaque_target(DIFFUSE_FORMAT),
                    opaque_target(SPECULAR_FORMAT),
                ],
            }),
            primitive: wgpu::PrimitiveState {
                cull_mode: Some(wgpu::Face::Back),
                ..primitive(wgpu::PolygonMode::Fill)
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_STENCIL_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: stencil_state,
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        self.camera_ubo = Some(uniform_buffer::<CameraUniform>(
            ctx.device,
            "parallax gbuffer camera ubo",
        ));
        self.pipeline = Some(pipeline);
        self.bind_group_layout = Some(bgl);
        self.bind_group = None;
    }

    fn ensure_bind_group(&mut self, ctx: &RenderCtx<'_>) {
        if self.bind_group.is_some() {
            return;
        }
        let (Some(bgl), Some(ubo), Some(scene)) = (
            self.bind_group_layout.as_ref(),
            self.camera_ubo.as_ref(),
            self.scene.as_ref(),
        ) else {
            return;
        };
        self.bind_group = Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("parallax gbuffer bind group"),
            layout: bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ubo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: scene.materials.as_entire_binding(),
                },
            ],
        }));
    }
}

impl RenderPass for GBufferPass {
    fn name(&self) -> &'static str {
        if self.masked { "refill gbuffer" } else { "gbuffer" }
    }

    fn reflect(&self) -> PassReflection {
        PassReflection::new()
            .output(self.slots.position, SlotKind::Texture(POSITION_FORMAT))
            .output(self.slots.normal, SlotKind::Texture(NORMAL_FORMAT))
            .output(self.slots.diffuse, SlotKind::Texture(DIFFUSE_FORMAT))
            .output(self.slots.specular, SlotKind::Texture(SPECULAR_FORMAT))
            .output(self.slots.depth, SlotKind::DepthStencil)
    }

    fn set_scene(&mut self, _ctx: &RenderCtx<'_>, scene: Option<&Arc<SceneGpu>>) {
        self.scene = scene.cloned();
        self.bind_group = None;
    }

    fn execute(
        &mut self,
        ctx: &RenderCtx<'_>,
        encoder: &mut wgpu::CommandEncoder,
        data: &RenderData<'_>,
        frame: &FrameParams<'_>,
    ) -> Result<(), PassError> {
        data.validate(&self.reflect())?;
        self.ensure_pipeline(ctx);
        self.ensure_bind_group(ctx);

        let eye = if self.masked {
            &frame.eyes.right
        } else {
            &frame.eyes.left
        };
        if let Some(ubo) = self.camera_ubo.as_ref() {
            let uniform = CameraUniform {
                view_proj: eye.view_proj.to_cols_array_2d(),
                position: eye.position.extend(1.0).to_array(),
            };
            ctx.queue.write_buffer(ubo, 0, bytemuck::bytes_of(&uniform));
        }

        let clear = wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT);
        let stencil_ops = if self.masked {
            // Keep the warp's coverage bits; they gate every fragment here.
            wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            }
        } else {
            wgpu::Operations {
                load: wgpu::LoadOp::Clear(0),
                store: wgpu::StoreOp::Store,
            }
        };

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(if self.masked {
                "parallax refill gbuffer pass"
            } else {
                "parallax gbuffer pass"
            }),
            color_attachments: &[
                color_attachment(data.texture(self.slots.position)?, clear),
                color_attachment(data.texture(self.slots.normal)?, clear),
                color_attachment(data.texture(self.slots.diffuse)?, clear),
                color_attachment(data.texture(self.slots.specular)?, clear),
            ],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: data.texture(self.slots.depth)?,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(stencil_ops),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let (Some(pipeline), Some(bind_group), Some(scene)) = (
            self.pipeline.as_ref(),
            self.bind_group.as_ref(),
            self.scene.as_ref(),
        ) else {
            // No scene: the cleared targets read as background everywhere.
            return Ok(());
        };
        if scene.index_count == 0 {
            return Ok(());
        }

        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, bind_group, &[]);
        if self.masked {
            rpass.set_stencil_reference(stencil::REFILLED);
        }
        rpass.set_vertex_buffer(0, scene.vertices.slice(..));
        rpass.set_index_buffer(scene.indices.slice(..), wgpu::IndexFormat::Uint32);
        rpass.draw_indexed(0..scene.index_count, 0, 0..1);
        Ok(())
    }
}
