use bytemuck::{Pod, Zeroable};
use parallax_engine::render::RenderCtx;

use crate::error::PassError;

use super::common::{
    compute_pipeline, depth_entry, pipeline_layout, shader, storage_entry, uniform_buffer,
    uniform_entry, unfilterable_entry, workgroups,
};
use super::targets::{NORMAL_FORMAT, POSITION_FORMAT};
use super::{slot, FrameParams, PassReflection, RenderData, RenderPass, SlotKind};

const WORKGROUP: u32 = 8;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct AnalyzerParams {
    screen: [u32; 2],
    quads: [u32; 2],
    camera_pos: [f32; 4],
    near: f32,
    far: f32,
    _pad: [f32; 2],
}

/// Pipeline variant; both knobs are shader override constants.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct AnalyzerKey {
    eight_neighbor: bool,
    binocular: bool,
}

/// Depth-discontinuity analyzer.
///
/// Writes one scalar per grid quad into the discontinuity buffer: the largest
/// depth (or disparity) jump between adjacent left-eye pixels inside the quad.
#[derive(Default)]
pub struct DiscontinuityPass {
    key: Option<AnalyzerKey>,
    pipeline: Option<wgpu::ComputePipeline>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    params_ubo: Option<wgpu::Buffer>,
}

impl DiscontinuityPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_pipeline(&mut self, ctx: &RenderCtx<'_>, key: AnalyzerKey) {
        if self.key == Some(key) && self.pipeline.is_some() {
            return;
        }
        let module = shader(
            ctx.device,
            "parallax discontinuity shader",
            include_str!("shaders/discontinuity.wgsl"),
        );
        let compute = wgpu::ShaderStages::COMPUTE;
        let bgl = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("parallax discontinuity bgl"),
                entries: &[
                    uniform_entry(0, compute, false),
                    depth_entry(1, compute),
                    unfilterable_entry(2, compute),
                    unfilterable_entry(3, compute),
                    storage_entry(4, compute, false),
                ],
            });
        let layout = pipeline_layout(ctx.device, "parallax discontinuity pipeline layout", &[&bgl]);
        let constants = [
            ("EIGHT_NEIGHBOR", f64::from(u8::from(key.eight_neighbor))),
            ("BINOCULAR", f64::from(u8::from(key.binocular))),
        ];
        let pipeline = compute_pipeline(
            ctx.device,
            "parallax discontinuity pipeline",
            &layout,
            &module,
            "main",
            &constants,
        );

        if self.params_ubo.is_none() {
            self.params_ubo = Some(uniform_buffer::<AnalyzerParams>(
                ctx.device,
                "parallax discontinuity params ubo",
            ));
        }
        self.pipeline = Some(pipeline);
        self.bind_group_layout = Some(bgl);
        self.key = Some(key);
        log::debug!(
            "discontinuity pipeline built (eight_neighbor={}, binocular={})",
            key.eight_neighbor,
            key.binocular
        );
    }
}

impl RenderPass for DiscontinuityPass {
    fn name(&self) -> &'static str {
        "discontinuity"
    }

    fn reflect(&self) -> PassReflection {
        PassReflection::new()
            .input(slot::LEFT_DEPTH_SAMPLED, SlotKind::DepthStencil)
            .input(slot::LEFT_NORMAL, SlotKind::Texture(NORMAL_FORMAT))
            .input(slot::LEFT_POSITION, SlotKind::Texture(POSITION_FORMAT))
            .output(slot::DISCONTINUITY, SlotKind::Buffer)
    }

    fn execute(
        &mut self,
        ctx: &RenderCtx<'_>,
        encoder: &mut wgpu::CommandEncoder,
        data: &RenderData<'_>,
        frame: &FrameParams<'_>,
    ) -> Result<(), PassError> {
        data.validate(&self.reflect())?;
        let (width, height) = frame.size;
        let dims = frame.grid.ok_or(PassError::EmptyGrid {
            width,
            height,
            divide: frame.config.reprojection.quad_divide_factor,
        })?;
        let output = data.buffer(slot::DISCONTINUITY)?;
        if output.size() != dims.discontinuity_bytes() {
            return Err(PassError::StaleBuffer {
                expected: dims.discontinuity_bytes(),
                actual: output.size(),
            });
        }

        let r = &frame.config.reprojection;
        self.ensure_pipeline(
            ctx,
            AnalyzerKey {
                eight_neighbor: r.eight_neighbor,
                binocular: r.binocular_metric,
            },
        );
        let (Some(pipeline), Some(bgl), Some(ubo)) = (
            self.pipeline.as_ref(),
            self.bind_group_layout.as_ref(),
            self.params_ubo.as_ref(),
        ) else {
            return Ok(());
        };

        let params = AnalyzerParams {
            screen: [width, height],
            quads: [dims.quads_x, dims.quads_y],
            camera_pos: frame.eyes.left.position.extend(1.0).to_array(),
            near: frame.eyes.near,
            far: frame.eyes.far,
            _pad: [0.0; 2],
        };
        ctx.queue.write_buffer(ubo, 0, bytemuck::bytes_of(&params));

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("parallax discontinuity bind group"),
            layout: bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ubo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(
                        data.texture(slot::LEFT_DEPTH_SAMPLED)?,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(data.texture(slot::LEFT_NORMAL)?),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(
                        data.texture(slot::LEFT_POSITION)?,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: output.as_entire_binding(),
                },
            ],
        });

        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("parallax discontinuity pass"),
            timestamp_writes: None,
        });
        cpass.set_pipeline(pipeline);
        cpass.set_bind_group(0, &bind_group, &[]);
        cpass.dispatch_workgroups(
            workgroups(dims.quads_x, WORKGROUP),
            workgroups(dims.quads_y, WORKGROUP),
            1,
        );
        Ok(())
    }
}
