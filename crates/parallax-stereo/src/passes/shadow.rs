use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use parallax_engine::render::RenderCtx;

use crate::error::PassError;
use crate::scene::{GpuVertex, SceneGpu};

use super::common::{pipeline_layout, primitive, shader, uniform_buffer, uniform_entry};
use super::targets::SHADOW_FORMAT;
use super::{slot, FrameParams, PassReflection, RenderData, RenderPass, SlotKind};

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct ShadowCameraUniform {
    view_proj: [[f32; 4]; 4],
}

/// Depth map of the scene as seen from the directional light.
///
/// Only redrawn when the frame says the light or the scene changed; otherwise
/// the previous map is reused as is.
#[derive(Default)]
pub struct ShadowPass {
    pipeline: Option<wgpu::RenderPipeline>,
    bind_group: Option<wgpu::BindGroup>,
    camera_ubo: Option<wgpu::Buffer>,

    map_size: u32,
    map: Option<wgpu::TextureView>,
    /// The map was (re)allocated and still holds no depth.
    map_fresh: bool,

    scene: Option<Arc<SceneGpu>>,
    draws: u64,
}

impl ShadowPass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the map at `size`² texels; a no-op when it already has that size.
    pub fn ensure_map(&mut self, ctx: &RenderCtx<'_>, size: u32) {
        if self.map.is_some() && self.map_size == size {
            return;
        }
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("parallax shadow map"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        self.map = Some(texture.create_view(&wgpu::TextureViewDescriptor::default()));
        self.map_size = size;
        self.map_fresh = true;
        log::debug!("shadow map allocated: {size}x{size}");
    }

    pub fn map_view(&self) -> Option<&wgpu::TextureView> {
        self.map.as_ref()
    }

    pub fn map_size(&self) -> u32 {
        self.map_size
    }

    /// Number of times the map has been redrawn.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    fn ensure_pipeline(&mut self, ctx: &RenderCtx<'_>) {
        if self.pipeline.is_some() {
            return;
        }
        let module = shader(ctx.device, "parallax shadow shader", include_str!("shaders/shadow.wgsl"));
        let bgl = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("parallax shadow bgl"),
                entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX, false)],
            });
        let layout = pipeline_layout(ctx.device, "parallax shadow pipeline layout", &[&bgl]);

        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("parallax shadow pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[GpuVertex::layout()],
            },
            fragment: None,
            primitive: primitive(wgpu::PolygonMode::Fill),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: SHADOW_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                },
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let camera_ubo = uniform_buffer::<ShadowCameraUniform>(ctx.device, "parallax shadow camera ubo");
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("parallax shadow bind group"),
            layout: &bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_ubo.as_entire_binding(),
            }],
        });

        self.pipeline = Some(pipeline);
        self.bind_group = Some(bind_group);
        self.camera_ubo = Some(camera_ubo);
    }
}

impl RenderPass for ShadowPass {
    fn name(&self) -> &'static str {
        "shadow"
    }

    fn reflect(&self) -> PassReflection {
        PassReflection::new().internal(slot::SHADOW_MAP, SlotKind::Texture(SHADOW_FORMAT))
    }

    fn set_scene(&mut self, _ctx: &RenderCtx<'_>, scene: Option<&Arc<SceneGpu>>) {
        self.scene = scene.cloned();
        self.map_fresh = true;
    }

    fn execute(
        &mut self,
        ctx: &RenderCtx<'_>,
        encoder: &mut wgpu::CommandEncoder,
        _data: &RenderData<'_>,
        frame: &FrameParams<'_>,
    ) -> Result<(), PassError> {
        self.ensure_map(ctx, frame.config.shadow.map_size);
        if !frame.shadow_dirty && !self.map_fresh {
            return Ok(());
        }
        self.ensure_pipeline(ctx);

        let scene = self.scene.clone().ok_or(PassError::MissingScene)?;
        let (Some(pipeline), Some(bind_group), Some(ubo), Some(map)) = (
            self.pipeline.as_ref(),
            self.bind_group.as_ref(),
            self.camera_ubo.as_ref(),
            self.map.as_ref(),
        ) else {
            return Ok(());
        };

        let uniform = ShadowCameraUniform {
            view_proj: frame.shadow_view_proj.to_cols_array_2d(),
        };
        ctx.queue.write_buffer(ubo, 0, bytemuck::bytes_of(&uniform));

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("parallax shadow pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: map,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        if scene.index_count > 0 {
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, bind_group, &[]);
            rpass.set_vertex_buffer(0, scene.vertices.slice(..));
            rpass.set_index_buffer(scene.indices.slice(..), wgpu::IndexFormat::Uint32);
            rpass.draw_indexed(0..scene.index_count, 0, 0..1);
        }
        drop(rpass);

        self.map_fresh = false;
        self.draws += 1;
        Ok(())
    }
}
