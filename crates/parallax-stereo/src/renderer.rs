//! Per-frame orchestration of the stereo passes.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use parallax_engine::render::RenderCtx;

use crate::camera::EyePair;
use crate::config::{HoleFillMode, StereoConfig};
use crate::diagnostics::{Diagnostics, FrameStats};
use crate::error::PassError;
use crate::grid::{AdaptiveGrid, GridDims, GridResources};
use crate::passes::hole_fill::HoleFiller;
use crate::passes::targets::{FrameTargets, HOLE_CLEAR};
use crate::passes::{
    slot, Compositor, DiscontinuityPass, EyeSink, FrameParams, GBufferPass, HoleCountPass,
    LightingPass, RayTraceFiller, ReRasterFiller, RenderData, RenderPass, ShadowPass, WarpPass,
};
use crate::scene::{Scene, SceneGpu};
use crate::shadow::ShadowState;

/// What the bound scene can support this frame.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SceneStatus {
    pub has_scene: bool,
    pub has_acceleration_structure: bool,
}

impl SceneStatus {
    pub fn of(scene: Option<&SceneGpu>) -> Self {
        Self {
            has_scene: scene.is_some(),
            has_acceleration_structure: scene.is_some_and(|s| s.accel.is_some()),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlannedPass {
    Shadow,
    GBuffer,
    Lighting,
    Discontinuity,
    Warp,
    /// Reset the right eye to holes without warping into it.
    ClearRight,
    Fill(HoleFillMode),
    HoleCount,
}

impl PlannedPass {
    pub fn name(&self) -> &'static str {
        match self {
            PlannedPass::Shadow => "shadow",
            PlannedPass::GBuffer => "gbuffer",
            PlannedPass::Lighting => "lighting",
            PlannedPass::Discontinuity => "discontinuity",
            PlannedPass::Warp => "warp",
            PlannedPass::ClearRight => "clear right",
            PlannedPass::Fill(HoleFillMode::RayTrace) => "ray trace fill",
            PlannedPass::Fill(HoleFillMode::ReRaster) => "re-raster fill",
            PlannedPass::HoleCount => "hole count",
        }
    }
}

/// Ordered passes of one frame plus the ones left out and why.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub passes: Vec<PlannedPass>,
    pub skipped: Vec<(PlannedPass, PassError)>,
    /// The fill pass covers every right-eye pixel, not only holes.
    pub trace_all: bool,
}

/// Decides which passes run this frame.
///
/// Order is fixed: producers, analyzer, warp, at most one fill, hole count.
/// A missing scene or acceleration structure removes only the fill pass that
/// needs it.
pub fn plan_frame(config: &StereoConfig, status: SceneStatus) -> FramePlan {
    let mut passes = Vec::with_capacity(8);
    let mut skipped = Vec::new();

    if status.has_scene {
        passes.push(PlannedPass::Shadow);
    }
    passes.push(PlannedPass::GBuffer);
    passes.push(PlannedPass::Lighting);

    let trace_all = config.reprojection.ray_trace_only;
    let fill_mode = if trace_all {
        Some(HoleFillMode::RayTrace)
    } else {
        passes.push(PlannedPass::Discontinuity);
        passes.push(PlannedPass::Warp);
        config.hole_fill.enabled.then_some(config.hole_fill.mode)
    };
    if trace_all {
        passes.push(PlannedPass::ClearRight);
    }

    if let Some(mode) = fill_mode {
        let fill = PlannedPass::Fill(mode);
        if !status.has_scene {
            skipped.push((fill, PassError::MissingScene));
        } else if mode == HoleFillMode::RayTrace && !status.has_acceleration_structure {
            skipped.push((fill, PassError::MissingAccelerationStructure));
        } else {
            passes.push(fill);
        }
    }

    if config.diagnostics.hole_count {
        passes.push(PlannedPass::HoleCount);
    }

    FramePlan {
        passes,
        skipped,
        trace_all,
    }
}

/// The warp reads this frame's discontinuity flags, so it only runs after the
/// analyzer succeeded on the current grid.
fn warp_ready(has_grid: bool, analyzed: bool, grid_error: &PassError) -> Result<(), PassError> {
    if !has_grid {
        return Err(grid_error.clone());
    }
    if !analyzed {
        return Err(PassError::MissingInput(slot::DISCONTINUITY));
    }
    Ok(())
}

/// Logs each pass's skip reason once, and again only when it changes.
#[derive(Debug, Default)]
struct SkipLog {
    reasons: HashMap<&'static str, PassError>,
}

impl SkipLog {
    /// Returns `true` when the pass ran.
    fn record(&mut self, pass: &'static str, result: Result<(), PassError>) -> bool {
        match result {
            Ok(()) => {
                if self.reasons.remove(pass).is_some() {
                    log::info!("{pass} pass resumed");
                }
                true
            }
            Err(err) => {
                if self.reasons.get(pass) != Some(&err) {
                    log::warn!("{pass} pass skipped: {err}");
                    self.reasons.insert(pass, err);
                }
                false
            }
        }
    }
}

/// Grid buffers plus the parameters they were generated with.
struct Grid {
    resources: GridResources,
    divide: u32,
}

/// Renders the left eye, reprojects it into the right eye and fills the holes.
///
/// Owns every pass, the per-eye targets and the warp grid. Hosts call
/// [`on_resize`](Self::on_resize) before the first frame and whenever the eye
/// size changes, then per frame [`render`](Self::render),
/// [`present`](Self::present), submit, and [`after_submit`](Self::after_submit).
pub struct StereoRenderer {
    config: StereoConfig,
    size: (u32, u32),
    targets: Option<FrameTargets>,
    grid: Option<Grid>,
    grid_error: Option<PassError>,
    rebuild_requested: bool,

    scene: Option<Arc<SceneGpu>>,
    shadow_state: ShadowState,

    shadow: ShadowPass,
    gbuffer: GBufferPass,
    lighting: LightingPass,
    analyzer: DiscontinuityPass,
    warp: WarpPass,
    ray_trace: RayTraceFiller,
    re_raster: ReRasterFiller,
    hole_count: HoleCountPass,
    compositor: Compositor,

    diagnostics: Diagnostics,
    skips: SkipLog,
    frame_index: u64,
}

impl Default for StereoRenderer {
    fn default() -> Self {
        Self::new(StereoConfig::default())
    }
}

impl StereoRenderer {
    /// Creates the renderer. No GPU work happens until the first resize.
    pub fn new(config: StereoConfig) -> Self {
        let config = config.sanitized();
        Self {
            size: (0, 0),
            targets: None,
            grid: None,
            grid_error: None,
            rebuild_requested: false,
            scene: None,
            shadow_state: ShadowState::new(config.shadow.dirty_epsilon),
            shadow: ShadowPass::new(),
            gbuffer: GBufferPass::left(),
            lighting: LightingPass::left(),
            analyzer: DiscontinuityPass::new(),
            warp: WarpPass::new(),
            ray_trace: RayTraceFiller::new(),
            re_raster: ReRasterFiller::new(),
            hole_count: HoleCountPass::new(),
            compositor: Compositor::new(),
            diagnostics: Diagnostics::new(&config.diagnostics),
            skips: SkipLog::default(),
            frame_index: 0,
            config,
        }
    }

    pub fn config(&self) -> &StereoConfig {
        &self.config
    }

    /// Applies `config` from the next frame on.
    ///
    /// Grid structure (quad divisor, half-pixel offset) changes only after
    /// [`request_rebuild`](Self::request_rebuild) or a resize.
    pub fn set_config(&mut self, config: StereoConfig) {
        let config = config.sanitized();
        if config == self.config {
            return;
        }
        if config.reprojection.grid_differs(&self.config.reprojection) {
            log::info!("grid parameters changed; regenerated on the next rebuild request");
        }
        if config.hole_fill.mode != self.config.hole_fill.mode {
            log::info!("hole filling switched to {}", config.hole_fill.mode);
        }
        self.shadow_state.set_epsilon(config.shadow.dirty_epsilon);
        if config.shadow.padding != self.config.shadow.padding {
            self.shadow_state.mark_dirty();
        }
        self.diagnostics.configure(&config.diagnostics);
        self.config = config;
    }

    /// Regenerates the grid and its buffers before the next frame.
    pub fn request_rebuild(&mut self) {
        self.rebuild_requested = true;
    }

    /// Per-eye size in pixels.
    pub fn eye_size(&self) -> (u32, u32) {
        self.size
    }

    pub fn grid_dims(&self) -> Option<GridDims> {
        self.grid.as_ref().map(|g| g.resources.dims)
    }

    /// Latest diagnostics read back from the GPU.
    pub fn stats(&self) -> FrameStats {
        self.diagnostics.stats()
    }

    pub fn scene(&self) -> Option<&Arc<SceneGpu>> {
        self.scene.as_ref()
    }

    /// Reallocates the eye targets and regenerates the grid for `width × height` per eye.
    pub fn on_resize(&mut self, ctx: &RenderCtx<'_>, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        self.size = (width, height);
        self.targets = Some(FrameTargets::new(ctx.device, width, height));
        self.rebuild_grid(ctx);
        self.re_raster.on_resize(ctx, width, height);
        self.shadow_state.mark_dirty();
        log::info!("stereo renderer resized to {width}x{height} per eye");
    }

    fn rebuild_grid(&mut self, ctx: &RenderCtx<'_>) {
        self.rebuild_requested = false;
        // Drop the old buffers first; no frame ever sees a partial grid.
        self.grid = None;
        let (width, height) = self.size;
        let r = &self.config.reprojection;
        match AdaptiveGrid::generate(width, height, r.quad_divide_factor, r.half_pixel_offset) {
            Ok(grid) => {
                self.grid = Some(Grid {
                    resources: GridResources::new(ctx.device, &grid),
                    divide: r.quad_divide_factor,
                });
                self.grid_error = None;
            }
            Err(err) => {
                log::warn!("no warp grid: {err}");
                self.grid_error = Some(err);
            }
        }
    }

    /// Uploads `scene` and rebinds every scene-dependent pass.
    pub fn set_scene(&mut self, ctx: &RenderCtx<'_>, scene: &Scene) -> Result<()> {
        let gpu = SceneGpu::upload(ctx.device, ctx.queue, scene).context("failed to upload scene")?;
        log::info!(
            "scene bound: {} triangles, acceleration structure {}",
            scene.triangle_count(),
            if gpu.accel.is_some() { "ready" } else { "absent" }
        );
        self.bind_scene(ctx, Some(Arc::new(gpu)));
        Ok(())
    }

    /// Unbinds the scene; fills that need one are skipped from now on.
    pub fn clear_scene(&mut self, ctx: &RenderCtx<'_>) {
        self.bind_scene(ctx, None);
    }

    fn bind_scene(&mut self, ctx: &RenderCtx<'_>, scene: Option<Arc<SceneGpu>>) {
        let s = scene.as_ref();
        self.shadow.set_scene(ctx, s);
        self.gbuffer.set_scene(ctx, s);
        self.lighting.set_scene(ctx, s);
        self.ray_trace.set_scene(ctx, s);
        self.re_raster.set_scene(ctx, s);
        self.shadow_state.mark_dirty();
        self.scene = scene;
    }

    /// Records both eyes of one frame into `encoder`.
    pub fn render(&mut self, ctx: &RenderCtx<'_>, encoder: &mut wgpu::CommandEncoder, eyes: &EyePair) {
        self.poll_diagnostics(ctx.device);

        if self.targets.is_none() {
            return;
        }
        if self.rebuild_requested {
            self.rebuild_grid(ctx);
        }
        if let Some(grid) = &self.grid {
            let (width, height) = self.size;
            let stale = GridDims::new(width, height, grid.divide)
                .and_then(|dims| grid.resources.check(dims));
            if let Err(err) = stale {
                self.skips.record("grid", Err(err));
                self.rebuild_grid(ctx);
            }
        }

        let (shadow_dirty, shadow_view_proj) = match &self.scene {
            Some(scene) => {
                let dirty = self.shadow_state.update(
                    scene.light.direction,
                    &scene.bounds,
                    self.config.shadow.padding,
                );
                (dirty, self.shadow_state.view_proj())
            }
            None => (false, self.shadow_state.view_proj()),
        };
        self.shadow.ensure_map(ctx, self.config.shadow.map_size);
        let Some(shadow_map) = self.shadow.map_view().cloned() else {
            return;
        };
        let Some(targets) = self.targets.as_ref() else {
            return;
        };

        let mut data = RenderData::new();
        targets.bind(&mut data);
        data.insert_texture(slot::SHADOW_MAP, &shadow_map);
        if let Some(grid) = &self.grid {
            data.insert_buffer(slot::GRID_VERTICES, &grid.resources.vertices);
            data.insert_buffer(slot::GRID_INDICES, &grid.resources.indices);
            data.insert_buffer(slot::DISCONTINUITY, &grid.resources.discontinuity);
        }

        let plan = plan_frame(&self.config, SceneStatus::of(self.scene.as_deref()));
        for (pass, err) in &plan.skipped {
            self.skips.record(pass.name(), Err(err.clone()));
        }

        let frame = FrameParams {
            config: &self.config,
            eyes,
            size: self.size,
            grid: self.grid.as_ref().map(|g| g.resources.dims),
            frame_index: self.frame_index,
            trace_all: plan.trace_all,
            shadow_view_proj,
            shadow_dirty,
        };
        let grid_error = self.grid_error.clone().unwrap_or(PassError::EmptyGrid {
            width: self.size.0,
            height: self.size.1,
            divide: self.config.reprojection.quad_divide_factor,
        });

        let mut analyzed = false;
        for pass in &plan.passes {
            let result = match pass {
                PlannedPass::Shadow => self.shadow.execute(ctx, encoder, &data, &frame),
                PlannedPass::GBuffer => self.gbuffer.execute(ctx, encoder, &data, &frame),
                PlannedPass::Lighting => self.lighting.execute(ctx, encoder, &data, &frame),
                PlannedPass::Discontinuity if frame.grid.is_none() => Err(grid_error.clone()),
                PlannedPass::Discontinuity => {
                    let result = self.analyzer.execute(ctx, encoder, &data, &frame);
                    analyzed = result.is_ok();
                    result
                }
                PlannedPass::Warp => {
                    let warped = warp_ready(frame.grid.is_some(), analyzed, &grid_error)
                        .and_then(|()| self.warp.execute(ctx, encoder, &data, &frame));
                    if warped.is_err() {
                        // Without a warp the whole right eye is a hole.
                        clear_right(encoder, targets);
                    }
                    warped
                }
                PlannedPass::ClearRight => {
                    clear_right(encoder, targets);
                    Ok(())
                }
                PlannedPass::Fill(mode) => {
                    let filler: &mut dyn HoleFiller = match mode {
                        HoleFillMode::RayTrace => &mut self.ray_trace,
                        HoleFillMode::ReRaster => &mut self.re_raster,
                    };
                    filler
                        .available(self.scene.as_ref())
                        .and_then(|()| filler.execute(ctx, encoder, &data, &frame))
                }
                PlannedPass::HoleCount => self.hole_count.execute(ctx, encoder, &data, &frame),
            };
            self.skips.record(pass.name(), result);
        }

        self.frame_index += 1;
    }

    /// Composes both eyes into `sink` as the output config asks.
    pub fn present(&mut self, ctx: &RenderCtx<'_>, encoder: &mut wgpu::CommandEncoder, sink: &dyn EyeSink) {
        let Some(targets) = self.targets.as_ref() else {
            return;
        };
        self.compositor.compose(
            ctx,
            encoder,
            sink,
            &targets.left_color,
            &targets.right_color,
            &self.config.output,
        );
    }

    /// Starts the read-backs copied by the frame just submitted.
    pub fn after_submit(&mut self) {
        self.warp.after_submit();
        self.hole_count.after_submit();
    }

    fn poll_diagnostics(&mut self, device: &wgpu::Device) {
        if self.config.diagnostics.hole_count {
            if let Some(stats) = self.hole_count.poll(device) {
                self.diagnostics.record_holes(stats);
            }
        }
        if self.config.diagnostics.triangle_count {
            if let Some(triangles) = self.warp.poll_triangle_count(device) {
                self.diagnostics.record_triangles(triangles);
            }
        }
    }
}

/// Resets the right eye to holes: hole clear color, far depth, empty stencil.
fn clear_right(encoder: &mut wgpu::CommandEncoder, targets: &FrameTargets) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("parallax clear right eye"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &targets.right_color,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(HOLE_CLEAR),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: &targets.right_depth.attachment,
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
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: SceneStatus = SceneStatus {
        has_scene: true,
        has_acceleration_structure: true,
    };

    fn fill_count(plan: &FramePlan) -> usize {
        plan.passes
            .iter()
            .filter(|p| matches!(p, PlannedPass::Fill(_)))
            .count()
    }

    fn position(plan: &FramePlan, pass: PlannedPass) -> usize {
        plan.passes
            .iter()
            .position(|p| *p == pass)
            .unwrap_or_else(|| panic!("{pass:?} not planned"))
    }

    // ── ordering ──────────────────────────────────────────────────────────

    #[test]
    fn default_frame_runs_analyzer_warp_fill_in_order() {
        let mut config = StereoConfig::default();
        config.diagnostics.hole_count = true;
        let plan = plan_frame(&config, FULL);

        let analyzer = position(&plan, PlannedPass::Discontinuity);
        let warp = position(&plan, PlannedPass::Warp);
        let fill = position(&plan, PlannedPass::Fill(HoleFillMode::RayTrace));
        let count = position(&plan, PlannedPass::HoleCount);
        assert!(position(&plan, PlannedPass::Lighting) < analyzer);
        assert!(analyzer < warp && warp < fill && fill < count);
        assert_eq!(plan.passes[0], PlannedPass::Shadow);
        assert!(plan.skipped.is_empty());
        assert!(!plan.trace_all);
    }

    #[test]
    fn at_most_one_filler_per_frame() {
        for mode in [HoleFillMode::RayTrace, HoleFillMode::ReRaster] {
            let mut config = StereoConfig::default();
            config.hole_fill.mode = mode;
            let plan = plan_frame(&config, FULL);
            assert_eq!(fill_count(&plan), 1);
            assert!(plan.passes.contains(&PlannedPass::Fill(mode)));
        }
    }

    #[test]
    fn disabled_fill_and_count_are_left_out() {
        let mut config = StereoConfig::default();
        config.hole_fill.enabled = false;
        let plan = plan_frame(&config, FULL);
        assert_eq!(fill_count(&plan), 0);
        assert!(!plan.passes.contains(&PlannedPass::HoleCount));
        assert!(plan.skipped.is_empty());
    }

    // ── missing prerequisites ─────────────────────────────────────────────

    #[test]
    fn missing_acceleration_structure_drops_only_ray_trace() {
        let status = SceneStatus {
            has_scene: true,
            has_acceleration_structure: false,
        };
        let plan = plan_frame(&StereoConfig::default(), status);
        assert_eq!(fill_count(&plan), 0);
        assert!(plan.passes.contains(&PlannedPass::Warp));
        assert_eq!(
            plan.skipped,
            vec![(
                PlannedPass::Fill(HoleFillMode::RayTrace),
                PassError::MissingAccelerationStructure
            )]
        );

        let mut config = StereoConfig::default();
        config.hole_fill.mode = HoleFillMode::ReRaster;
        let plan = plan_frame(&config, status);
        assert!(plan.passes.contains(&PlannedPass::Fill(HoleFillMode::ReRaster)));
    }

    #[test]
    fn missing_scene_skips_fill_and_shadow() {
        let plan = plan_frame(&StereoConfig::default(), SceneStatus::default());
        assert!(!plan.passes.contains(&PlannedPass::Shadow));
        assert!(plan.passes.contains(&PlannedPass::Warp));
        assert_eq!(fill_count(&plan), 0);
        assert_eq!(plan.skipped[0].1, PassError::MissingScene);
    }

    // ── ray trace only ────────────────────────────────────────────────────

    #[test]
    fn ray_trace_only_replaces_warp_with_a_full_trace() {
        let mut config = StereoConfig::default();
        config.reprojection.ray_trace_only = true;
        config.hole_fill.mode = HoleFillMode::ReRaster;
        let plan = plan_frame(&config, FULL);

        assert!(plan.trace_all);
        assert!(!plan.passes.contains(&PlannedPass::Discontinuity));
        assert!(!plan.passes.contains(&PlannedPass::Warp));
        let clear = position(&plan, PlannedPass::ClearRight);
        let fill = position(&plan, PlannedPass::Fill(HoleFillMode::RayTrace));
        assert!(clear < fill);
    }

    #[test]
    fn warp_waits_for_this_frames_analysis() {
        let empty = PassError::EmptyGrid {
            width: 4,
            height: 4,
            divide: 16,
        };
        assert_eq!(warp_ready(false, true, &empty), Err(empty.clone()));
        assert_eq!(
            warp_ready(true, false, &empty),
            Err(PassError::MissingInput(slot::DISCONTINUITY))
        );
        assert_eq!(warp_ready(true, true, &empty), Ok(()));
    }

    #[test]
    fn skip_log_reports_each_reason_once() {
        let mut log = SkipLog::default();
        assert!(!log.record("warp", Err(PassError::MissingScene)));
        assert!(!log.record("warp", Err(PassError::MissingScene)));
        assert_eq!(log.reasons.len(), 1);
        assert!(log.record("warp", Ok(())));
        assert!(log.reasons.is_empty());
    }
}
