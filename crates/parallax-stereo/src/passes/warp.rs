//! Grid warp: left-eye color reprojected into the right eye.
//!
//! wgpu exposes no tessellation stages, so the three stages are emulated:
//! a compute hull buckets patches by tessellation level, one indirect draw per
//! level expands its patches in the vertex shader (domain), and the fragment
//! shader writes color plus a coverage stencil bit (pixel).

use bytemuck::{Pod, Zeroable};
use parallax_engine::logging::WarnOnce;
use parallax_engine::render::RenderCtx;

use crate::config::{ReprojectionConfig, ShadingMode};
use crate::diagnostics::{triangle_count, Readback};
use crate::error::PassError;
use crate::grid::GridDims;
use crate::tessellation::{factor_levels, vertices_per_patch};

use super::common::{
    align_to, binding_size, buffer_entry, color_attachment, compute_pipeline, depth_entry, opaque_target,
    pipeline_layout, primitive, sampler_entry, shader, stencil_face, storage_entry, texture_entry,
    uniform_buffer, uniform_entry,
};
use super::targets::{stencil, COLOR_FORMAT, DEPTH_STENCIL_FORMAT, HOLE_CLEAR};
use super::{slot, FrameParams, PassReflection, RenderData, RenderPass, SlotKind};

const HULL_WORKGROUP: u32 = 64;
const MAX_WORKGROUPS_PER_DIM: u32 = 65_535;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct HullParams {
    patch_count: u32,
    level_count: u32,
    max_factor: u32,
    threshold: f32,
    row_stride: u32,
    _pad: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct WarpUniforms {
    inv_left_view_proj: [[f32; 4]; 4],
    right_view_proj: [[f32; 4]; 4],
    screen: [f32; 2],
    near: f32,
    far: f32,
    pixel_threshold: f32,
    geo_threshold: f32,
    _pad: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct LevelUniform {
    index: u32,
    factor: u32,
    _pad: [u32; 2],
}

/// Indirect draw arguments as laid out for `draw_indirect`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct DrawArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

const DRAW_ARGS_SIZE: u64 = std::mem::size_of::<DrawArgs>() as u64;

/// Pixel-stage variant; every field is baked into the render pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct WarpKey {
    shading_mode: ShadingMode,
    show_disocclusion: bool,
    discard_triangles: bool,
    wireframe: bool,
}

/// Buffers whose size depends on the grid and the tessellation levels.
struct HullBuffers {
    patch_count: u32,
    factors: Vec<u32>,
    level_stride: u64,
    patch_levels: wgpu::Buffer,
    patch_lists: wgpu::Buffer,
    draws: wgpu::Buffer,
    cursors: wgpu::Buffer,
    list_offsets: wgpu::Buffer,
    levels: wgpu::Buffer,
}

impl HullBuffers {
    fn new(ctx: &RenderCtx<'_>, patch_count: u32, max_factor: u32) -> Self {
        let factors = factor_levels(max_factor);
        let level_count = factors.len() as u64;
        let patch_bytes = patch_count as u64 * 4;
        let storage = |label: &str, size: u64, extra: wgpu::BufferUsages| {
            ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | extra,
                mapped_at_creation: false,
            })
        };

        let level_stride = align_to(
            std::mem::size_of::<LevelUniform>() as u64,
            ctx.device.limits().min_uniform_buffer_offset_alignment as u64,
        );
        let levels = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("parallax warp level ubo"),
            size: level_stride * level_count,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        for (i, &factor) in factors.iter().enumerate() {
            let level = LevelUniform {
                index: i as u32,
                factor,
                _pad: [0; 2],
            };
            ctx.queue
                .write_buffer(&levels, i as u64 * level_stride, bytemuck::bytes_of(&level));
        }

        log::debug!(
            "warp buffers allocated: {patch_count} patches, factors {factors:?}"
        );

        Self {
            patch_count,
            level_stride,
            patch_levels: storage("parallax hull patch levels", patch_bytes, wgpu::BufferUsages::empty()),
            patch_lists: storage("parallax hull patch lists", patch_bytes, wgpu::BufferUsages::empty()),
            draws: storage(
                "parallax warp indirect draws",
                DRAW_ARGS_SIZE * level_count,
                wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            ),
            cursors: storage("parallax hull cursors", 4 * level_count, wgpu::BufferUsages::COPY_DST),
            list_offsets: storage("parallax hull list offsets", 4 * level_count, wgpu::BufferUsages::empty()),
            levels,
            factors,
        }
    }

    fn matches(&self, patch_count: u32, max_factor: u32) -> bool {
        self.patch_count == patch_count && self.factors == factor_levels(max_factor)
    }

    /// Arguments with zero instances; the hull fills in the counts.
    fn reset_args(&self) -> Vec<DrawArgs> {
        self.factors
            .iter()
            .map(|&f| DrawArgs {
                vertex_count: vertices_per_patch(f),
                instance_count: 0,
                first_vertex: 0,
                first_instance: 0,
            })
            .collect()
    }
}

/// Workgroup grid for `patch_count` hull threads: `(x, y, threads per row)`.
fn hull_dispatch(patch_count: u32) -> (u32, u32, u32) {
    let groups = patch_count.div_ceil(HULL_WORKGROUP).max(1);
    let x = groups.min(MAX_WORKGROUPS_PER_DIM);
    (x, groups.div_ceil(x), x * HULL_WORKGROUP)
}

/// Reprojects the lit left eye into the right eye through the adaptive grid.
///
/// Pixels it covers get color with alpha 1 and stencil bit [`stencil::COVERED`];
/// everything else keeps the hole clear value.
#[derive(Default)]
pub struct WarpPass {
    hull_bgl: Option<wgpu::BindGroupLayout>,
    classify: Option<wgpu::ComputePipeline>,
    scatter: Option<wgpu::ComputePipeline>,
    hull_ubo: Option<wgpu::Buffer>,

    key: Option<WarpKey>,
    pipeline: Option<wgpu::RenderPipeline>,
    warp_bgl: Option<wgpu::BindGroupLayout>,
    warp_ubo: Option<wgpu::Buffer>,
    sampler: Option<wgpu::Sampler>,

    buffers: Option<HullBuffers>,
    triangle_readback: Option<Readback>,
    wireframe_unsupported: WarnOnce,
}

impl WarpPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_hull(&mut self, ctx: &RenderCtx<'_>) {
        if self.classify.is_some() {
            return;
        }
        let module = shader(ctx.device, "parallax hull shader", include_str!("shaders/hull.wgsl"));
        let compute = wgpu::ShaderStages::COMPUTE;
        let bgl = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("parallax hull bgl"),
                entries: &[
                    uniform_entry(0, compute, false),
                    storage_entry(1, compute, true),
                    storage_entry(2, compute, true),
                    storage_entry(3, compute, true),
                    storage_entry(4, compute, false),
                    storage_entry(5, compute, false),
                    storage_entry(6, compute, false),
                    storage_entry(7, compute, false),
                    storage_entry(8, compute, false),
                ],
            });
        let layout = pipeline_layout(ctx.device, "parallax hull pipeline layout", &[&bgl]);
        self.classify = Some(compute_pipeline(
            ctx.device,
            "parallax hull classify pipeline",
            &layout,
            &module,
            "classify",
            &[],
        ));
        self.scatter = Some(compute_pipeline(
            ctx.device,
            "parallax hull scatter pipeline",
            &layout,
            &module,
            "scatter",
            &[],
        ));
        self.hull_ubo = Some(uniform_buffer::<HullParams>(ctx.device, "parallax hull params ubo"));
        self.hull_bgl = Some(bgl);
    }

    fn ensure_pipeline(&mut self, ctx: &RenderCtx<'_>, config: &ReprojectionConfig) {
        let wireframe = if config.wireframe && !ctx.supports(wgpu::Features::POLYGON_MODE_LINE) {
            self.wireframe_unsupported.warn(
                "parallax_stereo::warp",
                format_args!("wireframe requested but the device lacks POLYGON_MODE_LINE; drawing filled"),
            );
            false
        } else {
            config.wireframe
        };
        let key = WarpKey {
            shading_mode: config.shading_mode,
            show_disocclusion: config.show_disocclusion,
            discard_triangles: config.discard_triangles,
            wireframe,
        };
        if self.key == Some(key) && self.pipeline.is_some() {
            return;
        }

        let module = shader(ctx.device, "parallax warp shader", include_str!("shaders/warp.wgsl"));
        let vertex = wgpu::ShaderStages::VERTEX;
        let bgl = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("parallax warp bgl"),
                entries: &[
                    uniform_entry(0, vertex, false),
                    uniform_entry(1, vertex, true),
                    storage_entry(2, vertex, true),
                    storage_entry(3, vertex, true),
                    storage_entry(4, vertex, true),
                    storage_entry(5, vertex, true),
                    depth_entry(6, vertex),
                    texture_entry(
                        7,
                        wgpu::ShaderStages::FRAGMENT,
                        wgpu::TextureSampleType::Float { filterable: true },
                        wgpu::TextureViewDimension::D2,
                    ),
                    sampler_entry(
                        8,
                        wgpu::ShaderStages::FRAGMENT,
                        wgpu::SamplerBindingType::Filtering,
                    ),
                ],
            });
        let layout = pipeline_layout(ctx.device, "parallax warp pipeline layout", &[&bgl]);

        let constants = [
            ("SHADING_MODE", key.shading_mode.shader_value()),
            ("SHOW_DISOCCLUSION", f64::from(u8::from(key.show_disocclusion))),
            ("DISCARD_TRIANGLES", f64::from(u8::from(key.discard_triangles))),
        ];
        let options = wgpu::PipelineCompilationOptions {
            constants: &constants,
            ..Default::default()
        };

        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("parallax warp pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_domain"),
                compilation_options: options.clone(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_warp"),
                compilation_options: options,
                targets: &[opaque_target(COLOR_FORMAT)],
            }),
            primitive: primitive(if key.wireframe {
                wgpu::PolygonMode::Line
            } else {
                wgpu::PolygonMode::Fill
            }),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_STENCIL_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState {
                    front: stencil_face(wgpu::CompareFunction::Always),
                    back: stencil_face(wgpu::CompareFunction::Always),
                    read_mask: 0xff,
                    write_mask: stencil::COVERED,
                },
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        if self.warp_ubo.is_none() {
            self.warp_ubo = Some(uniform_buffer::<WarpUniforms>(ctx.device, "parallax warp ubo"));
        }
        if self.sampler.is_none() {
            self.sampler = Some(ctx.device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("parallax warp color sampler"),
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                ..Default::default()
            }));
        }
        self.pipeline = Some(pipeline);
        self.warp_bgl = Some(bgl);
        self.key = Some(key);
        log::debug!("warp pipeline built: {key:?}");
    }

    fn ensure_buffers(&mut self, ctx: &RenderCtx<'_>, dims: GridDims, max_factor: u32) {
        let patch_count = dims.quad_count();
        if self.buffers.as_ref().is_some_and(|b| b.matches(patch_count, max_factor)) {
            return;
        }
        let buffers = HullBuffers::new(ctx, patch_count, max_factor);
        // The staging copy must match the new argument buffer.
        self.triangle_readback = None;
        self.buffers = Some(buffers);
    }

    /// Starts mapping the triangle count copied this frame.
    pub fn after_submit(&mut self) {
        if let Some(r) = self.triangle_readback.as_mut() {
            r.after_submit();
        }
    }

    /// Triangles drawn by a recent frame, once its read-back has landed.
    pub fn poll_triangle_count(&mut self, device: &wgpu::Device) -> Option<u64> {
        let bytes = self.triangle_readback.as_mut()?.try_read(device)?;
        let factors = &self.buffers.as_ref()?.factors;
        let counts: Vec<u32> = bytes
            .chunks_exact(DRAW_ARGS_SIZE as usize)
            .map(|chunk| bytemuck::pod_read_unaligned::<DrawArgs>(chunk).instance_count)
            .collect();
        Some(triangle_count(&counts, factors))
    }

    fn record_hull(
        &self,
        ctx: &RenderCtx<'_>,
        encoder: &mut wgpu::CommandEncoder,
        data: &RenderData<'_>,
        buffers: &HullBuffers,
        config: &ReprojectionConfig,
    ) -> Result<(), PassError> {
        let (Some(bgl), Some(classify), Some(scatter), Some(ubo)) = (
            self.hull_bgl.as_ref(),
            self.classify.as_ref(),
            self.scatter.as_ref(),
            self.hull_ubo.as_ref(),
        ) else {
            return Ok(());
        };

        let (groups_x, groups_y, row_stride) = hull_dispatch(buffers.patch_count);
        let params = HullParams {
            patch_count: buffers.patch_count,
            level_count: buffers.factors.len() as u32,
            max_factor: buffers.factors.last().copied().unwrap_or(1),
            threshold: config.hull_threshold,
            row_stride,
            _pad: [0; 3],
        };
        ctx.queue.write_buffer(ubo, 0, bytemuck::bytes_of(&params));
        ctx.queue
            .write_buffer(&buffers.draws, 0, bytemuck::cast_slice(&buffers.reset_args()));
        encoder.clear_buffer(&buffers.cursors, 0, None);

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("parallax hull bind group"),
            layout: bgl,
            entries: &[
                buffer_entry(0, ubo),
                buffer_entry(1, data.buffer(slot::GRID_VERTICES)?),
                buffer_entry(2, data.buffer(slot::GRID_INDICES)?),
                buffer_entry(3, data.buffer(slot::DISCONTINUITY)?),
                buffer_entry(4, &buffers.patch_levels),
                buffer_entry(5, &buffers.patch_lists),
                buffer_entry(6, &buffers.draws),
                buffer_entry(7, &buffers.cursors),
                buffer_entry(8, &buffers.list_offsets),
            ],
        });

        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("parallax hull pass"),
            timestamp_writes: None,
        });
        cpass.set_bind_group(0, &bind_group, &[]);
        cpass.set_pipeline(classify);
        cpass.dispatch_workgroups(groups_x, groups_y, 1);
        cpass.set_pipeline(scatter);
        cpass.dispatch_workgroups(groups_x, groups_y, 1);
        Ok(())
    }
}

impl RenderPass for WarpPass {
    fn name(&self) -> &'static str {
        "warp"
    }

    fn reflect(&self) -> PassReflection {
        PassReflection::new()
            .input(slot::LEFT_COLOR, SlotKind::Texture(COLOR_FORMAT))
            .input(slot::LEFT_DEPTH_SAMPLED, SlotKind::DepthStencil)
            .input(slot::GRID_VERTICES, SlotKind::Buffer)
            .input(slot::GRID_INDICES, SlotKind::Buffer)
            .input(slot::DISCONTINUITY, SlotKind::Buffer)
            .output(slot::RIGHT_COLOR, SlotKind::Texture(COLOR_FORMAT))
            .output(slot::RIGHT_DEPTH, SlotKind::DepthStencil)
            .internal("warp.indirect_draws", SlotKind::Buffer)
            .internal("warp.patch_lists", SlotKind::Buffer)
    }

    fn execute(
        &mut self,
        ctx: &RenderCtx<'_>,
        encoder: &mut wgpu::CommandEncoder,
        data: &RenderData<'_>,
        frame: &FrameParams<'_>,
    ) -> Result<(), PassError> {
        data.validate(&self.reflect())?;
        let config = &frame.config.reprojection;
        let (width, height) = frame.size;
        let dims = frame.grid.ok_or(PassError::EmptyGrid {
            width,
            height,
            divide: config.quad_divide_factor,
        })?;
        let discontinuity = data.buffer(slot::DISCONTINUITY)?;
        if discontinuity.size() != dims.discontinuity_bytes() {
            return Err(PassError::StaleBuffer {
                expected: dims.discontinuity_bytes(),
                actual: discontinuity.size(),
            });
        }

        self.ensure_hull(ctx);
        self.ensure_pipeline(ctx, config);
        self.ensure_buffers(ctx, dims, config.max_tess_factor);
        if frame.config.diagnostics.triangle_count {
            if self.triangle_readback.is_none() {
                if let Some(b) = self.buffers.as_ref() {
                    self.triangle_readback =
                        Some(Readback::new(ctx.device, "parallax triangle count readback", b.draws.size()));
                }
            }
        } else {
            self.triangle_readback = None;
        }

        let Some(buffers) = self.buffers.take() else {
            return Ok(());
        };
        let result = self.record_warp(ctx, encoder, data, frame, &buffers);
        self.buffers = Some(buffers);
        result
    }
}

impl WarpPass {
    fn record_warp(
        &mut self,
        ctx: &RenderCtx<'_>,
        encoder: &mut wgpu::CommandEncoder,
        data: &RenderData<'_>,
        frame: &FrameParams<'_>,
        buffers: &HullBuffers,
    ) -> Result<(), PassError> {
        let config = &frame.config.reprojection;
        self.record_hull(ctx, encoder, data, buffers, config)?;

        let (Some(pipeline), Some(bgl), Some(ubo), Some(sampler)) = (
            self.pipeline.as_ref(),
            self.warp_bgl.as_ref(),
            self.warp_ubo.as_ref(),
            self.sampler.as_ref(),
        ) else {
            return Ok(());
        };

        let (width, height) = frame.size;
        let uniforms = WarpUniforms {
            inv_left_view_proj: frame.eyes.left.inv_view_proj.to_cols_array_2d(),
            right_view_proj: frame.eyes.right.view_proj.to_cols_array_2d(),
            screen: [width as f32, height as f32],
            near: frame.eyes.near,
            far: frame.eyes.far,
            pixel_threshold: config.pixel_threshold,
            geo_threshold: config.geo_threshold,
            _pad: [0.0; 2],
        };
        ctx.queue.write_buffer(ubo, 0, bytemuck::bytes_of(&uniforms));

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("parallax warp bind group"),
            layout: bgl,
            entries: &[
                buffer_entry(0, ubo),
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &buffers.levels,
                        offset: 0,
                        size: binding_size::<LevelUniform>(),
                    }),
                },
                buffer_entry(2, data.buffer(slot::GRID_VERTICES)?),
                buffer_entry(3, data.buffer(slot::GRID_INDICES)?),
                buffer_entry(4, &buffers.patch_lists),
                buffer_entry(5, &buffers.list_offsets),
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::TextureView(
                        data.texture(slot::LEFT_DEPTH_SAMPLED)?,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: wgpu::BindingResource::TextureView(data.texture(slot::LEFT_COLOR)?),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("parallax warp pass"),
                color_attachments: &[color_attachment(
                    data.texture(slot::RIGHT_COLOR)?,
                    wgpu::LoadOp::Clear(HOLE_CLEAR),
                )],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: data.texture(slot::RIGHT_DEPTH)?,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            rpass.set_pipeline(pipeline);
            rpass.set_stencil_reference(stencil::COVERED);
            for level in 0..buffers.factors.len() as u64 {
                let offset = (level * buffers.level_stride) as u32;
                rpass.set_bind_group(0, &bind_group, &[offset]);
                rpass.draw_indirect(&buffers.draws, level * DRAW_ARGS_SIZE);
            }
        }

        if let Some(readback) = self.triangle_readback.as_mut() {
            readback.record_copy(encoder, &buffers.draws);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layouts_match_shader_structs() {
        assert_eq!(std::mem::size_of::<HullParams>(), 32);
        assert_eq!(std::mem::size_of::<WarpUniforms>(), 160);
        assert_eq!(std::mem::size_of::<LevelUniform>(), 16);
        assert_eq!(DRAW_ARGS_SIZE, 16);
    }

    #[test]
    fn hull_dispatch_covers_every_patch() {
        for patches in [1, 64, 65, 8_040, 32_400, 8_294_400] {
            let (x, y, stride) = hull_dispatch(patches);
            assert!(x <= MAX_WORKGROUPS_PER_DIM && y <= MAX_WORKGROUPS_PER_DIM);
            assert_eq!(stride, x * HULL_WORKGROUP);
            assert!(x as u64 * y as u64 * HULL_WORKGROUP as u64 >= patches as u64);
        }
    }

    #[test]
    fn uhd_quad_grid_fits_one_dispatch_row() {
        // 3840x2160 at divide 16
        assert_eq!(hull_dispatch(32_400), (507, 1, 507 * 64));
    }
}
