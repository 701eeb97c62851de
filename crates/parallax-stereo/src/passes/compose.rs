//! Presentation of both eyes.

use bytemuck::{Pod, Zeroable};
use parallax_engine::render::RenderCtx;

use crate::config::{EyeOutput, OutputConfig};

use super::common::{
    buffer_entry, color_attachment, opaque_target, pipeline_layout, primitive, sampler_entry,
    shader, texture_entry, uniform_buffer, uniform_entry,
};

/// Horizontal fraction of each eye shown when cropping.
pub const CROP_SCALE: f32 = 0.8;

/// Destination of the composed frame.
pub trait EyeSink {
    fn view(&self) -> &wgpu::TextureView;
    fn format(&self) -> wgpu::TextureFormat;
}

/// A surface texture view acquired for the current frame.
pub struct SurfaceSink<'a> {
    pub view: &'a wgpu::TextureView,
    pub format: wgpu::TextureFormat,
}

impl EyeSink for SurfaceSink<'_> {
    fn view(&self) -> &wgpu::TextureView {
        self.view
    }

    fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
struct ComposeUniforms {
    eyes: u32,
    crop: f32,
    exposure: f32,
    _pad: f32,
}

impl ComposeUniforms {
    fn new(config: &OutputConfig) -> Self {
        Self {
            eyes: match config.eyes {
                EyeOutput::Both => 0,
                EyeOutput::Left => 1,
                EyeOutput::Right => 2,
            },
            crop: if config.crop { CROP_SCALE } else { 1.0 },
            exposure: if config.exposure.is_finite() {
                config.exposure.max(0.0)
            } else {
                1.0
            },
            _pad: 0.0,
        }
    }
}

/// Tonemaps the two HDR eye images into an [`EyeSink`].
#[derive(Default)]
pub struct Compositor {
    pipeline_format: Option<wgpu::TextureFormat>,
    pipeline: Option<wgpu::RenderPipeline>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    ubo: Option<wgpu::Buffer>,
    sampler: Option<wgpu::Sampler>,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_pipeline(&mut self, ctx: &RenderCtx<'_>, format: wgpu::TextureFormat) {
        if self.pipeline_format == Some(format) && self.pipeline.is_some() {
            return;
        }
        let module = shader(
            ctx.device,
            "parallax compose shader",
            include_str!("shaders/compose.wgsl"),
        );
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let eye = wgpu::TextureSampleType::Float { filterable: true };
        let bgl = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("parallax compose bgl"),
                entries: &[
                    uniform_entry(0, fragment, false),
                    texture_entry(1, fragment, eye, wgpu::TextureViewDimension::D2),
                    texture_entry(2, fragment, eye, wgpu::TextureViewDimension::D2),
                    sampler_entry(3, fragment, wgpu::SamplerBindingType::Filtering),
                ],
            });
        let layout = pipeline_layout(ctx.device, "parallax compose pipeline layout", &[&bgl]);

        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("parallax compose pipeline"),
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
                targets: &[opaque_target(format)],
            }),
            primitive: primitive(wgpu::PolygonMode::Fill),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        if self.ubo.is_none() {
            self.ubo = Some(uniform_buffer::<ComposeUniforms>(ctx.device, "parallax compose ubo"));
            self.sampler = Some(ctx.device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("parallax compose sampler"),
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                ..Default::default()
            }));
        }
        self.pipeline = Some(pipeline);
        self.bind_group_layout = Some(bgl);
        self.pipeline_format = Some(format);
        log::debug!("compose pipeline built for {format:?}");
    }

    /// Draws `left` and `right` into `sink` as `config` asks.
    pub fn compose(
        &mut self,
        ctx: &RenderCtx<'_>,
        encoder: &mut wgpu::CommandEncoder,
        sink: &dyn EyeSink,
        left: &wgpu::TextureView,
        right: &wgpu::TextureView,
        config: &OutputConfig,
    ) {
        self.ensure_pipeline(ctx, sink.format());
        let (Some(pipeline), Some(bgl), Some(ubo), Some(sampler)) = (
            self.pipeline.as_ref(),
            self.bind_group_layout.as_ref(),
            self.ubo.as_ref(),
            self.sampler.as_ref(),
        ) else {
            return;
        };

        ctx.queue
            .write_buffer(ubo, 0, bytemuck::bytes_of(&ComposeUniforms::new(config)));
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("parallax compose bind group"),
            layout: bgl,
            entries: &[
                buffer_entry(0, ubo),
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(left),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(right),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("parallax compose pass"),
            color_attachments: &[color_attachment(
                sink.view(),
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            )],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_follow_output_config() {
        let u = ComposeUniforms::new(&OutputConfig {
            eyes: EyeOutput::Right,
            crop: true,
            exposure: f32::NAN,
        });
        assert_eq!(u.eyes, 2);
        assert_eq!(u.crop, CROP_SCALE);
        assert_eq!(u.exposure, 1.0);
        assert_eq!(std::mem::size_of::<ComposeUniforms>(), 16);
    }

    #[test]
    fn defaults_show_both_eyes_uncropped() {
        let u = ComposeUniforms::new(&OutputConfig::default());
        assert_eq!(u.eyes, 0);
        assert_eq!(u.crop, 1.0);
        assert_eq!(u.exposure, 1.0);
    }
}
