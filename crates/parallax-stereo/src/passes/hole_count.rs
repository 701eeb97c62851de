use parallax_engine::render::RenderCtx;

use crate::diagnostics::{HoleStats, Readback};
use crate::error::PassError;

use super::common::{
    buffer_entry, compute_pipeline, pipeline_layout, shader, storage_entry, unfilterable_entry,
    workgroups,
};
use super::targets::COLOR_FORMAT;
use super::{slot, FrameParams, PassReflection, RenderData, RenderPass, SlotKind};

const WORKGROUP: u32 = 16;
const COUNTER_SIZE: u64 = 4;

/// Counts right-eye pixels still holding the hole clear value after the fill.
///
/// The count reaches the CPU through a [`Readback`], a frame or two late.
#[derive(Default)]
pub struct HoleCountPass {
    pipeline: Option<wgpu::ComputePipeline>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    counter: Option<wgpu::Buffer>,
    readback: Option<Readback>,
    /// Eye size of the frame whose count is in flight.
    counted_size: (u32, u32),
}

impl HoleCountPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_pipeline(&mut self, ctx: &RenderCtx<'_>) {
        if self.pipeline.is_some() {
            return;
        }
        let module = shader(
            ctx.device,
            "parallax hole count shader",
            include_str!("shaders/hole_count.wgsl"),
        );
        let compute = wgpu::ShaderStages::COMPUTE;
        let bgl = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("parallax hole count bgl"),
                entries: &[unfilterable_entry(0, compute), storage_entry(1, compute, false)],
            });
        let layout = pipeline_layout(ctx.device, "parallax hole count pipeline layout", &[&bgl]);
        self.pipeline = Some(compute_pipeline(
            ctx.device,
            "parallax hole count pipeline",
            &layout,
            &module,
            "main",
            &[],
        ));
        self.bind_group_layout = Some(bgl);
        self.counter = Some(ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("parallax hole counter"),
            size: COUNTER_SIZE,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.readback = Some(Readback::new(ctx.device, "parallax hole count readback", COUNTER_SIZE));
    }

    pub fn after_submit(&mut self) {
        if let Some(r) = self.readback.as_mut() {
            r.after_submit();
        }
    }

    /// Hole statistics of a recent frame, once its read-back has landed.
    pub fn poll(&mut self, device: &wgpu::Device) -> Option<HoleStats> {
        let bytes = self.readback.as_mut()?.try_read(device)?;
        let count: u32 = bytemuck::pod_read_unaligned(bytes.get(..COUNTER_SIZE as usize)?);
        let (width, height) = self.counted_size;
        Some(HoleStats::from_count(count as u64, width, height))
    }
}

impl RenderPass for HoleCountPass {
    fn name(&self) -> &'static str {
        "hole count"
    }

    fn reflect(&self) -> PassReflection {
        PassReflection::new()
            .input(slot::RIGHT_COLOR, SlotKind::Texture(COLOR_FORMAT))
            .internal("hole_count.counter", SlotKind::Buffer)
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
        let (Some(pipeline), Some(bgl), Some(counter), Some(readback)) = (
            self.pipeline.as_ref(),
            self.bind_group_layout.as_ref(),
            self.counter.as_ref(),
            self.readback.as_mut(),
        ) else {
            return Ok(());
        };
        // Counting while the previous value is still mapped would be thrown away.
        if !readback.is_idle() {
            return Ok(());
        }

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("parallax hole count bind group"),
            layout: bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(data.texture(slot::RIGHT_COLOR)?),
                },
                buffer_entry(1, counter),
            ],
        });

        encoder.clear_buffer(counter, 0, None);
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("parallax hole count pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);
            let (width, height) = frame.size;
            cpass.dispatch_workgroups(workgroups(width, WORKGROUP), workgroups(height, WORKGROUP), 1);
        }
        readback.record_copy(encoder, counter);
        self.counted_size = frame.size;
        Ok(())
    }
}
