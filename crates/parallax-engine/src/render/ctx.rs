/// Renderer-facing context (device/queue + surface format + drawable size).
///
/// This is intentionally small and stable.
#[derive(Copy, Clone)]
pub struct RenderCtx<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub surface_format: wgpu::TextureFormat,
    /// Features the device was created with.
    pub features: wgpu::Features,
    /// Drawable size in physical pixels.
    pub size: (u32, u32),
}

impl<'a> RenderCtx<'a> {
    #[inline]
    pub fn new(
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        size: (u32, u32),
    ) -> Self {
        Self {
            device,
            queue,
            surface_format,
            features: device.features(),
            size,
        }
    }

    /// Returns `true` when `feature` was enabled at device creation.
    #[inline]
    pub fn supports(&self, feature: wgpu::Features) -> bool {
        self.features.contains(feature)
    }
}
