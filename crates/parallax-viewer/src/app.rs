use parallax_engine::core::{App, AppControl, FrameCtx};
use parallax_engine::input::Key;
use parallax_stereo::passes::SurfaceSink;
use parallax_stereo::{EyeOutput, Scene, StereoCameraController, StereoConfig, StereoRenderer};

use crate::controls::{apply_toggles, camera_input};

/// Radians per logical pixel of pointer motion.
const LOOK_SENSITIVITY: f32 = 0.004;
/// Seconds between title bar refreshes.
const TITLE_INTERVAL: f32 = 0.5;

/// Flies a stereo camera through one scene and shows both eyes side by side.
pub struct ViewerApp {
    renderer: StereoRenderer,
    controller: StereoCameraController,
    scene: Scene,
    scene_bound: bool,
    eye_size: (u32, u32),
    title_timer: f32,
}

impl ViewerApp {
    pub fn new(scene: Scene, config: StereoConfig) -> Self {
        let renderer = StereoRenderer::new(config);
        let controller = StereoCameraController::new(scene.camera, renderer.config().stereo);
        Self {
            renderer,
            controller,
            scene,
            scene_bound: false,
            eye_size: (0, 0),
            title_timer: 0.0,
        }
    }

    /// Per-eye resolution for a window of `width × height`.
    fn eye_size_for(&self, (width, height): (u32, u32)) -> (u32, u32) {
        let width = match self.renderer.config().output.eyes {
            EyeOutput::Both => width / 2,
            EyeOutput::Left | EyeOutput::Right => width,
        };
        (width.max(1), height.max(1))
    }

    fn title(&self, fps: f32) -> String {
        let config = self.renderer.config();
        let stats = self.renderer.stats();
        let mut title = format!("parallax | {fps:.0} fps | ");
        if config.reprojection.ray_trace_only {
            title.push_str("ray trace only");
        } else if config.hole_fill.enabled {
            title.push_str(&format!("fill: {}", config.hole_fill.mode));
        } else {
            title.push_str("fill: off");
        }
        if let Some(holes) = stats.holes {
            title.push_str(&format!(" | holes {:.2}%", holes.percent()));
        }
        if let Some(triangles) = stats.triangles {
            title.push_str(&format!(" | {triangles} tris"));
        }
        title
    }
}

impl App for ViewerApp {
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        if ctx.input_frame.pressed(Key::Escape) {
            return AppControl::Exit;
        }

        // ── Configuration ─────────────────────────────────────────────────
        let mut config = self.renderer.config().clone();
        let outcome = apply_toggles(&mut config, |key| ctx.input_frame.pressed(key));
        if outcome.config_changed {
            self.controller.set_params(config.stereo);
            self.renderer.set_config(config);
        }
        if outcome.rebuild {
            self.renderer.request_rebuild();
        }

        // ── Resources ─────────────────────────────────────────────────────
        {
            let rctx = ctx.render_ctx();
            if !self.scene_bound {
                if let Err(err) = self.renderer.set_scene(&rctx, &self.scene) {
                    log::error!("{err:#}");
                    return AppControl::Exit;
                }
                self.scene_bound = true;
            }

            let eye_size = self.eye_size_for(ctx.window.physical_size());
            if eye_size != self.eye_size {
                self.eye_size = eye_size;
                self.renderer.on_resize(&rctx, eye_size.0, eye_size.1);
                self.controller
                    .set_aspect(eye_size.0 as f32 / eye_size.1 as f32);
            }
        }

        // ── Camera ────────────────────────────────────────────────────────
        let input = camera_input(ctx.input, ctx.input_frame, LOOK_SENSITIVITY);
        self.controller.update(&input, ctx.time.dt);
        let eyes = self.controller.eyes();

        // ── Render ────────────────────────────────────────────────────────
        let renderer = &mut self.renderer;
        let control = ctx.present(|rctx, encoder, view| {
            renderer.render(rctx, encoder, &eyes);
            let sink = SurfaceSink {
                view,
                format: rctx.surface_format,
            };
            renderer.present(rctx, encoder, &sink);
        });
        self.renderer.after_submit();

        self.title_timer += ctx.time.dt;
        if self.title_timer >= TITLE_INTERVAL {
            self.title_timer = 0.0;
            ctx.runtime.set_title(self.title(ctx.time.fps));
        }

        control
    }
}
