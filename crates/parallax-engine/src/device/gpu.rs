use anyhow::{Context, Result};
use wgpu::SurfaceError;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::render::RenderCtx;

/// Device and surface requests made when the window opens.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Pick an sRGB surface format when one exists. The stereo compositor writes
    /// linear color and relies on the surface for encoding.
    pub prefer_srgb: bool,
    pub present_mode: wgpu::PresentMode,
    /// Device creation fails when the adapter lacks any of these.
    pub required_features: wgpu::Features,
    /// Enabled when the adapter has them, ignored otherwise (wireframe warp).
    pub optional_features: wgpu::Features,
    pub required_limits: wgpu::Limits,
    /// Hint only; backends may clamp it.
    pub frame_latency: u32,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::AutoVsync,
            required_features: wgpu::Features::empty(),
            optional_features: wgpu::Features::POLYGON_MODE_LINE,
            required_limits: wgpu::Limits::default(),
            frame_latency: 2,
        }
    }
}

/// Surface texture plus the encoder recording into it for one frame.
pub struct SurfaceFrame {
    pub texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
    pub encoder: wgpu::CommandEncoder,
}

/// Result of trying to acquire the next surface texture.
pub enum Acquired {
    Frame(SurfaceFrame),
    /// Nothing to draw into this frame; try again on the next one.
    Skip,
    /// The surface cannot recover.
    Fatal(SurfaceError),
}

/// Device, queue and the window surface they present to.
///
/// `'w` ties the surface to the window it was created from.
pub struct Gpu<'w> {
    surface: wgpu::Surface<'w>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
}

impl<'w> Gpu<'w> {
    pub async fn new(window: &'w Window, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no GPU adapter can present to this window")?;
        let adapter_info = adapter.get_info();
        check_downlevel(&adapter.get_downlevel_capabilities())
            .with_context(|| format!("adapter {:?} is unsuitable", adapter_info.name))?;

        let features = negotiate_features(
            init.required_features,
            init.optional_features,
            adapter.features(),
        )
        .with_context(|| format!("adapter {:?} is unsuitable", adapter_info.name))?;
        log::info!(
            "adapter: {} ({:?}), features: {features:?}",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("parallax device"),
                required_features: features,
                required_limits: init.required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = surface_format(&caps.formats, init.prefer_srgb)
            .context("surface reports no formats")?;
        let present_mode = if caps.present_modes.contains(&init.present_mode) {
            init.present_mode
        } else {
            log::warn!("{:?} unsupported, falling back to Fifo", init.present_mode);
            wgpu::PresentMode::Fifo
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: init.frame_latency,
        };
        surface.configure(&device, &config);
        log::debug!("surface {format:?} {}x{} {present_mode:?}", size.width, size.height);

        Ok(Gpu {
            surface,
            device,
            queue,
            adapter_info,
            config,
            size,
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Drawable size in physical pixels; zero while minimized.
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn render_ctx(&self) -> RenderCtx<'_> {
        RenderCtx::new(
            &self.device,
            &self.queue,
            self.config.format,
            (self.size.width, self.size.height),
        )
    }

    /// Records the new size; the surface is only reconfigured for non-zero sizes.
    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        self.size = size;
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.device, &self.config);
    }

    /// Acquires the next surface texture, reconfiguring a lost or outdated surface.
    pub fn acquire(&mut self) -> Acquired {
        let texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(err @ (SurfaceError::Lost | SurfaceError::Outdated)) => {
                log::debug!("surface {err}, reconfiguring");
                if self.size.width > 0 && self.size.height > 0 {
                    self.surface.configure(&self.device, &self.config);
                }
                return Acquired::Skip;
            }
            Err(SurfaceError::OutOfMemory) => return Acquired::Fatal(SurfaceError::OutOfMemory),
            Err(err) => {
                log::warn!("surface acquisition failed: {err}");
                return Acquired::Skip;
            }
        };

        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("parallax frame encoder"),
            });
        Acquired::Frame(SurfaceFrame {
            texture,
            view,
            encoder,
        })
    }

    /// Submits the frame's commands and presents its texture.
    pub fn present(&self, frame: SurfaceFrame) {
        let SurfaceFrame {
            texture,
            view,
            encoder,
        } = frame;
        self.queue.submit(std::iter::once(encoder.finish()));
        drop(view);
        texture.present();
    }
}

/// Fails for downlevel adapters (GL, WebGL) that cannot render to the float
/// G-buffer formats or run the compute passes.
pub fn check_downlevel(caps: &wgpu::DownlevelCapabilities) -> Result<()> {
    let missing = wgpu::DownlevelFlags::compliant() - caps.flags;
    anyhow::ensure!(missing.is_empty(), "downlevel adapter lacks {missing:?}");
    anyhow::ensure!(
        caps.is_webgpu_compliant(),
        "downlevel adapter: shader model {:?}, limits {:?}",
        caps.shader_model,
        caps.limits
    );
    Ok(())
}

fn negotiate_features(
    required: wgpu::Features,
    optional: wgpu::Features,
    available: wgpu::Features,
) -> Result<wgpu::Features> {
    let missing = required - available;
    anyhow::ensure!(missing.is_empty(), "missing required features {missing:?}");
    Ok(required | (optional & available))
}

fn surface_format(formats: &[wgpu::TextureFormat], prefer_srgb: bool) -> Option<wgpu::TextureFormat> {
    let srgb = formats
        .iter()
        .copied()
        .find(|f| prefer_srgb && f.is_srgb());
    srgb.or_else(|| formats.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::{Features, TextureFormat};

    #[test]
    fn optional_features_follow_the_adapter() {
        let with_line = negotiate_features(
            Features::empty(),
            Features::POLYGON_MODE_LINE,
            Features::POLYGON_MODE_LINE | Features::DEPTH_CLIP_CONTROL,
        )
        .unwrap();
        assert_eq!(with_line, Features::POLYGON_MODE_LINE);

        let without = negotiate_features(Features::empty(), Features::POLYGON_MODE_LINE, Features::empty())
            .unwrap();
        assert!(without.is_empty());
    }

    #[test]
    fn missing_required_feature_is_an_error() {
        assert!(negotiate_features(Features::POLYGON_MODE_LINE, Features::empty(), Features::empty()).is_err());
    }

    #[test]
    fn downlevel_adapters_are_rejected() {
        assert!(check_downlevel(&wgpu::DownlevelCapabilities::default()).is_ok());

        let gl = wgpu::DownlevelCapabilities {
            flags: wgpu::DownlevelFlags::compliant() - wgpu::DownlevelFlags::WEBGPU_TEXTURE_FORMAT_SUPPORT,
            ..Default::default()
        };
        let err = check_downlevel(&gl).unwrap_err().to_string();
        assert!(err.contains("WEBGPU_TEXTURE_FORMAT_SUPPORT"), "{err}");
    }

    #[test]
    fn srgb_format_is_preferred() {
        let formats = [TextureFormat::Bgra8Unorm, TextureFormat::Bgra8UnormSrgb];
        assert_eq!(surface_format(&formats, true), Some(TextureFormat::Bgra8UnormSrgb));
        assert_eq!(surface_format(&formats, false), Some(TextureFormat::Bgra8Unorm));
        assert_eq!(surface_format(&[], true), None);
    }
}
