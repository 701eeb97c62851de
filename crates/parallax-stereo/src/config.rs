//! Renderer configuration.
//!
//! Plain typed structs with defaults; hosts mutate them between frames. Knobs that
//! change buffer shapes (quad divisor, half-pixel offset) only take effect through
//! [`StereoRenderer::request_rebuild`](crate::StereoRenderer::request_rebuild).

use std::fmt;
use std::path::PathBuf;

use crate::tessellation::MAX_TESS_FACTOR;

/// Strategy used to fill pixels the warp pass left uncovered.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum HoleFillMode {
    /// One primary ray per uncovered pixel against the scene BVH.
    #[default]
    RayTrace,
    /// Stencil-masked re-rasterization into a second G-buffer plus re-lighting.
    ReRaster,
}

impl fmt::Display for HoleFillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoleFillMode::RayTrace => f.write_str("ray trace"),
            HoleFillMode::ReRaster => f.write_str("re-raster"),
        }
    }
}

/// What the warp pixel stage writes for covered pixels.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum ShadingMode {
    /// Left-eye color at the reprojected source position.
    #[default]
    PerFragment,
    /// The source UV as red/green, for inspecting the warp.
    SourceUv,
}

impl ShadingMode {
    pub(crate) fn shader_value(self) -> f64 {
        match self {
            ShadingMode::PerFragment => 0.0,
            ShadingMode::SourceUv => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReprojectionConfig {
    /// Screen pixels per grid quad along each axis.
    pub quad_divide_factor: u32,
    /// Discontinuity metric above which a quad is subdivided.
    pub hull_threshold: f32,
    /// Upper bound on the per-quad tessellation factor.
    pub max_tess_factor: u32,
    /// Relative depth spread over a warped triangle that counts as disoccluding.
    pub pixel_threshold: f32,
    /// Relative depth spread over a warped triangle above which it is dropped.
    pub geo_threshold: f32,
    /// Compare diagonal neighbours in the discontinuity analyzer as well.
    pub eight_neighbor: bool,
    /// Use inverse-distance (disparity) differences instead of relative depth.
    pub binocular_metric: bool,
    pub half_pixel_offset: bool,
    pub wireframe: bool,
    pub shading_mode: ShadingMode,
    /// Tint triangles exceeding `pixel_threshold`.
    pub show_disocclusion: bool,
    /// Drop triangles exceeding `geo_threshold` so they become holes.
    pub discard_triangles: bool,
    /// Skip the analyzer and warp; trace every right-eye pixel.
    pub ray_trace_only: bool,
}

impl Default for ReprojectionConfig {
    fn default() -> Self {
        Self {
            quad_divide_factor: 16,
            hull_threshold: 0.003,
            max_tess_factor: 16,
            pixel_threshold: 0.008,
            geo_threshold: 0.010,
            eight_neighbor: false,
            binocular_metric: true,
            half_pixel_offset: true,
            wireframe: false,
            shading_mode: ShadingMode::PerFragment,
            show_disocclusion: false,
            discard_triangles: false,
            ray_trace_only: false,
        }
    }
}

impl ReprojectionConfig {
    /// Returns a copy with every knob clamped into its valid range.
    pub fn sanitized(&self) -> Self {
        let non_negative = |v: f32| if v.is_finite() { v.max(0.0) } else { 0.0 };
        Self {
            quad_divide_factor: self.quad_divide_factor.max(1),
            max_tess_factor: self.max_tess_factor.clamp(1, MAX_TESS_FACTOR),
            hull_threshold: non_negative(self.hull_threshold),
            pixel_threshold: non_negative(self.pixel_threshold),
            geo_threshold: non_negative(self.geo_threshold),
            ..self.clone()
        }
    }

    /// True when switching from `self` to `other` changes the grid geometry.
    pub fn grid_differs(&self, other: &Self) -> bool {
        self.quad_divide_factor != other.quad_divide_factor
            || self.half_pixel_offset != other.half_pixel_offset
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoleFillConfig {
    pub enabled: bool,
    pub mode: HoleFillMode,
    /// Sample the environment cube on ray misses instead of the background color.
    pub env_map: bool,
    /// Clear the output before re-lighting so only re-rastered pixels show.
    pub debug_clear: bool,
}

impl Default for HoleFillConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: HoleFillMode::RayTrace,
            env_map: true,
            debug_clear: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsConfig {
    pub hole_count: bool,
    pub triangle_count: bool,
    /// Dump collected samples to disk every `log_batch_size` frames.
    pub batch_logging: bool,
    pub log_batch_size: u32,
    pub log_dir: PathBuf,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            hole_count: false,
            triangle_count: false,
            batch_logging: false,
            log_batch_size: 1000,
            log_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightingConfig {
    pub shadow_bias: f32,
    /// PCF taps per axis.
    pub pcf_kernel: u32,
    /// Show the environment cube behind geometry in the left eye.
    pub skybox: bool,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            shadow_bias: 0.01,
            pcf_kernel: 4,
            skybox: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShadowConfig {
    pub map_size: u32,
    /// Per-component light direction change that invalidates the shadow map.
    pub dirty_epsilon: f32,
    /// Added to the scene extent when fitting the light frustum.
    pub padding: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            map_size: 2048,
            dirty_epsilon: 0.01,
            padding: 1.0,
        }
    }
}

/// Interpupillary distance and zero-parallax distance, in scene units.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StereoParams {
    pub ipd: f32,
    pub z0: f32,
}

impl Default for StereoParams {
    fn default() -> Self {
        Self { ipd: 0.062, z0: 2.0 }
    }
}

impl StereoParams {
    pub const IPD_RANGE: (f32, f32) = (0.05, 0.08);
    pub const Z0_RANGE: (f32, f32) = (0.0, 20.0);

    pub fn clamped(self) -> Self {
        Self {
            ipd: self.ipd.clamp(Self::IPD_RANGE.0, Self::IPD_RANGE.1),
            z0: self.z0.clamp(Self::Z0_RANGE.0, Self::Z0_RANGE.1),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum EyeOutput {
    #[default]
    Both,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub eyes: EyeOutput,
    /// Show only the central part of each eye horizontally.
    pub crop: bool,
    pub exposure: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            eyes: EyeOutput::Both,
            crop: false,
            exposure: 1.0,
        }
    }
}

/// Complete renderer configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoConfig {
    pub reprojection: ReprojectionConfig,
    pub hole_fill: HoleFillConfig,
    pub diagnostics: DiagnosticsConfig,
    pub lighting: LightingConfig,
    pub shadow: ShadowConfig,
    pub stereo: StereoParams,
    pub output: OutputConfig,
}

impl StereoConfig {
    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();
        out.reprojection = self.reprojection.sanitized();
        out.stereo = self.stereo.clamped();
        out.lighting.pcf_kernel = self.lighting.pcf_kernel.clamp(1, 8);
        out.shadow.map_size = self.shadow.map_size.clamp(256, 8192);
        out.diagnostics.log_batch_size = self.diagnostics.log_batch_size.max(1);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_reference_values() {
        let c = StereoConfig::default();
        assert_eq!(c.reprojection.quad_divide_factor, 16);
        assert_eq!(c.reprojection.max_tess_factor, 16);
        assert_eq!(c.reprojection.pixel_threshold, 0.008);
        assert_eq!(c.reprojection.geo_threshold, 0.010);
        assert_eq!(c.stereo, StereoParams { ipd: 0.062, z0: 2.0 });
        assert_eq!(c.lighting.pcf_kernel, 4);
        assert_eq!(c.shadow.map_size, 2048);
        assert_eq!(c.diagnostics.log_batch_size, 1000);
    }

    #[test]
    fn sanitize_clamps_out_of_range_knobs() {
        let raw = ReprojectionConfig {
            quad_divide_factor: 0,
            max_tess_factor: 1000,
            hull_threshold: -1.0,
            geo_threshold: f32::NAN,
            ..Default::default()
        };
        let s = raw.sanitized();
        assert_eq!(s.quad_divide_factor, 1);
        assert_eq!(s.max_tess_factor, MAX_TESS_FACTOR);
        assert_eq!(s.hull_threshold, 0.0);
        assert_eq!(s.geo_threshold, 0.0);

        let zero = ReprojectionConfig {
            max_tess_factor: 0,
            ..Default::default()
        };
        assert_eq!(zero.sanitized().max_tess_factor, 1);
    }

    #[test]
    fn only_structural_knobs_require_grid_rebuild() {
        let a = ReprojectionConfig::default();
        let mut b = a.clone();
        b.hull_threshold = 0.5;
        b.wireframe = true;
        assert!(!a.grid_differs(&b));
        b.quad_divide_factor = 8;
        assert!(a.grid_differs(&b));
    }

    #[test]
    fn stereo_params_clamp_to_slider_ranges() {
        let p = StereoParams { ipd: 0.2, z0: -3.0 }.clamped();
        assert_eq!(p.ipd, 0.08);
        assert_eq!(p.z0, 0.0);
    }
}
