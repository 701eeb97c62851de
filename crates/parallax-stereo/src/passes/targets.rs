//! Per-eye render targets, reallocated on resize.

use super::{slot, RenderData};

pub const POSITION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
pub const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DIFFUSE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const SPECULAR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
/// Lit HDR color of either eye.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Right-eye clear value; alpha 0 marks a pixel no pass has written.
pub const HOLE_CLEAR: wgpu::Color = wgpu::Color::TRANSPARENT;

/// Right-eye stencil bits.
pub mod stencil {
    /// Set by the warp pass on every pixel it covers.
    pub const COVERED: u32 = 0b01;
    /// Set by the re-raster fill on uncovered pixels it re-rasterized.
    pub const REFILLED: u32 = 0b10;
}

/// Color, normal, material and position targets of one deferred G-buffer.
pub struct GBufferTargets {
    pub position: wgpu::TextureView,
    pub normal: wgpu::TextureView,
    pub diffuse: wgpu::TextureView,
    pub specular: wgpu::TextureView,
}

impl GBufferTargets {
    pub fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let target = |name: &str, format| {
            color_texture(device, &format!("{label} {name}"), width, height, format)
                .create_view(&wgpu::TextureViewDescriptor::default())
        };
        Self {
            position: target("position", POSITION_FORMAT),
            normal: target("normal", NORMAL_FORMAT),
            diffuse: target("diffuse", DIFFUSE_FORMAT),
            specular: target("specular", SPECULAR_FORMAT),
        }
    }
}

/// Depth-stencil texture with an attachment view and sampling views per aspect.
pub struct DepthStencilTarget {
    pub texture: wgpu::Texture,
    pub attachment: wgpu::TextureView,
    pub depth: wgpu::TextureView,
    pub stencil: wgpu::TextureView,
}

impl DepthStencilTarget {
    pub fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_STENCIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let attachment = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("parallax depth-only view"),
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });
        let stencil = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("parallax stencil-only view"),
            aspect: wgpu::TextureAspect::StencilOnly,
            ..Default::default()
        });
        Self {
            texture,
            attachment,
            depth,
            stencil,
        }
    }
}

/// Everything both eyes render into, sized to one eye.
pub struct FrameTargets {
    pub width: u32,
    pub height: u32,
    pub left: GBufferTargets,
    pub left_depth: DepthStencilTarget,
    pub left_color: wgpu::TextureView,
    pub right_color_texture: wgpu::Texture,
    pub right_color: wgpu::TextureView,
    pub right_depth: DepthStencilTarget,
}

impl FrameTargets {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let left_color = color_texture(device, "parallax left color", width, height, COLOR_FORMAT)
            .create_view(&wgpu::TextureViewDescriptor::default());
        let right_color_texture =
            color_texture(device, "parallax right color", width, height, COLOR_FORMAT);
        let right_color = right_color_texture.create_view(&wgpu::TextureViewDescriptor::default());

        log::debug!("frame targets allocated: {width}x{height} per eye");

        Self {
            width,
            height,
            left: GBufferTargets::new(device, "parallax left gbuffer", width, height),
            left_depth: DepthStencilTarget::new(device, "parallax left depth", width, height),
            left_color,
            right_color_texture,
            right_color,
            right_depth: DepthStencilTarget::new(device, "parallax right depth", width, height),
        }
    }

    /// Binds every target under its [`slot`] name.
    pub fn bind<'a>(&'a self, data: &mut RenderData<'a>) {
        data.insert_texture(slot::LEFT_POSITION, &self.left.position);
        data.insert_texture(slot::LEFT_NORMAL, &self.left.normal);
        data.insert_texture(slot::LEFT_DIFFUSE, &self.left.diffuse);
        data.insert_texture(slot::LEFT_SPECULAR, &self.left.specular);
        data.insert_texture(slot::LEFT_DEPTH, &self.left_depth.attachment);
        data.insert_texture(slot::LEFT_DEPTH_SAMPLED, &self.left_depth.depth);
        data.insert_texture(slot::LEFT_COLOR, &self.left_color);
        data.insert_texture(slot::RIGHT_COLOR, &self.right_color);
        data.insert_texture(slot::RIGHT_DEPTH, &self.right_depth.attachment);
        data.insert_texture(slot::RIGHT_STENCIL, &self.right_depth.stencil);
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn color_texture(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}
