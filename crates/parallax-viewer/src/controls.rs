//! Keyboard and mouse bindings.
//!
//! Camera: `W`/`S` forward/back, `A`/`D` strafe, `Q`/`E` down/up, `Shift` fast,
//! `Ctrl` precise, right mouse drag to look around.
//!
//! Toggles:
//!
//! | key | effect |
//! |-----|--------|
//! | `Tab` | switch hole filling between ray trace and re-raster |
//! | `F` | hole filling on/off |
//! | `M` | environment map for ray misses |
//! | `K` | re-raster debug clear |
//! | `T` | ray-trace-only mode |
//! | `G` | wireframe warp |
//! | `H` | half-pixel offset (regenerates the grid) |
//! | `V` | warp shading: left image / source UV |
//! | `O` | colour disoccluded triangles |
//! | `X` | discard triangles across depth edges |
//! | `N` | eight-neighbour discontinuity test |
//! | `B` | binocular discontinuity metric |
//! | `←` `→` | halve / double the quad divide factor (regenerates the grid) |
//! | `↓` `↑` | halve / double the max tessellation factor |
//! | `9` `0` | narrower / wider interpupillary distance |
//! | `1` `2` `3` | show both eyes / left / right |
//! | `C` | centre crop |
//! | `P` `L` `J` | hole count / triangle count / batch logging |
//! | `R` | regenerate the grid |

use parallax_engine::input::{InputFrame, InputState, Key, MouseButton};
use parallax_stereo::tessellation::MAX_TESS_FACTOR;
use parallax_stereo::{CameraInput, EyeOutput, HoleFillMode, ShadingMode, StereoConfig};

const MAX_QUAD_DIVIDE: u32 = 64;
const IPD_STEP: f32 = 0.002;

/// Result of applying one frame of toggle keys.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ControlOutcome {
    pub config_changed: bool,
    pub rebuild: bool,
}

/// Applies toggle keys pressed this frame to `config`.
pub fn apply_toggles(config: &mut StereoConfig, pressed: impl Fn(Key) -> bool) -> ControlOutcome {
    let before = config.clone();
    let mut rebuild = false;

    let r = &mut config.reprojection;
    let flips: [(Key, &mut bool); 8] = [
        (Key::T, &mut r.ray_trace_only),
        (Key::G, &mut r.wireframe),
        (Key::H, &mut r.half_pixel_offset),
        (Key::O, &mut r.show_disocclusion),
        (Key::X, &mut r.discard_triangles),
        (Key::N, &mut r.eight_neighbor),
        (Key::B, &mut r.binocular_metric),
        (Key::C, &mut config.output.crop),
    ];
    for (key, flag) in flips {
        if pressed(key) {
            *flag = !*flag;
        }
    }
    if pressed(Key::H) {
        rebuild = true;
    }

    if pressed(Key::V) {
        r.shading_mode = match r.shading_mode {
            ShadingMode::PerFragment => ShadingMode::SourceUv,
            ShadingMode::SourceUv => ShadingMode::PerFragment,
        };
    }
    if pressed(Key::ArrowLeft) && r.quad_divide_factor > 1 {
        r.quad_divide_factor /= 2;
        rebuild = true;
    }
    if pressed(Key::ArrowRight) && r.quad_divide_factor < MAX_QUAD_DIVIDE {
        r.quad_divide_factor = (r.quad_divide_factor * 2).min(MAX_QUAD_DIVIDE);
        rebuild = true;
    }
    if pressed(Key::ArrowDown) {
        r.max_tess_factor = (r.max_tess_factor / 2).max(1);
    }
    if pressed(Key::ArrowUp) {
        r.max_tess_factor = (r.max_tess_factor * 2).min(MAX_TESS_FACTOR);
    }

    let fill = &mut config.hole_fill;
    for (key, flag) in [
        (Key::F, &mut fill.enabled),
        (Key::M, &mut fill.env_map),
        (Key::K, &mut fill.debug_clear),
    ] {
        if pressed(key) {
            *flag = !*flag;
        }
    }
    if pressed(Key::Tab) {
        fill.mode = match fill.mode {
            HoleFillMode::RayTrace => HoleFillMode::ReRaster,
            HoleFillMode::ReRaster => HoleFillMode::RayTrace,
        };
    }

    let diag = &mut config.diagnostics;
    for (key, flag) in [
        (Key::P, &mut diag.hole_count),
        (Key::L, &mut diag.triangle_count),
        (Key::J, &mut diag.batch_logging),
    ] {
        if pressed(key) {
            *flag = !*flag;
        }
    }

    for (key, eyes) in [
        (Key::Digit1, EyeOutput::Both),
        (Key::Digit2, EyeOutput::Left),
        (Key::Digit3, EyeOutput::Right),
    ] {
        if pressed(key) {
            config.output.eyes = eyes;
        }
    }

    if pressed(Key::Digit9) {
        config.stereo.ipd -= IPD_STEP;
    }
    if pressed(Key::Digit0) {
        config.stereo.ipd += IPD_STEP;
    }
    config.stereo = config.stereo.clamped();

    if pressed(Key::R) {
        rebuild = true;
    }

    ControlOutcome {
        config_changed: *config != before,
        rebuild,
    }
}

/// Builds this frame's camera movement from held keys and pointer motion.
pub fn camera_input(input: &InputState, frame: &InputFrame, look_sensitivity: f32) -> CameraInput {
    let speed_scale = if input.key_down(Key::Shift) {
        10.0
    } else if input.key_down(Key::Control) {
        0.25
    } else {
        1.0
    };

    let (yaw, pitch) = if input.button_down(MouseButton::Right) {
        let (dx, dy) = frame.pointer_delta;
        (-dx * look_sensitivity, -dy * look_sensitivity)
    } else {
        (0.0, 0.0)
    };

    CameraInput {
        forward: input.axis(Key::W, Key::S),
        right: input.axis(Key::D, Key::A),
        up: input.axis(Key::E, Key::Q),
        yaw,
        pitch,
        speed_scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(keys: &[Key]) -> impl Fn(Key) -> bool + '_ {
        move |k| keys.contains(&k)
    }

    // ── toggles ───────────────────────────────────────────────────────────

    #[test]
    fn no_keys_change_nothing() {
        let mut config = StereoConfig::default();
        let outcome = apply_toggles(&mut config, press(&[]));
        assert_eq!(outcome, ControlOutcome::default());
        assert_eq!(config, StereoConfig::default());
    }

    #[test]
    fn tab_switches_fill_mode() {
        let mut config = StereoConfig::default();
        let outcome = apply_toggles(&mut config, press(&[Key::Tab]));
        assert!(outcome.config_changed);
        assert!(!outcome.rebuild);
        assert_eq!(config.hole_fill.mode, HoleFillMode::ReRaster);
        apply_toggles(&mut config, press(&[Key::Tab]));
        assert_eq!(config.hole_fill.mode, HoleFillMode::RayTrace);
    }

    #[test]
    fn grid_keys_request_rebuild() {
        let mut config = StereoConfig::default();
        let outcome = apply_toggles(&mut config, press(&[Key::ArrowLeft]));
        assert!(outcome.rebuild);
        assert_eq!(config.reprojection.quad_divide_factor, 8);

        let outcome = apply_toggles(&mut config, press(&[Key::H]));
        assert!(outcome.rebuild);
        assert!(!config.reprojection.half_pixel_offset);
    }

    #[test]
    fn factors_stay_in_range() {
        let mut config = StereoConfig::default();
        config.reprojection.quad_divide_factor = 1;
        config.reprojection.max_tess_factor = MAX_TESS_FACTOR;
        let outcome = apply_toggles(&mut config, press(&[Key::ArrowLeft, Key::ArrowUp]));
        assert!(!outcome.rebuild);
        assert!(!outcome.config_changed);
        assert_eq!(config.reprojection.quad_divide_factor, 1);
        assert_eq!(config.reprojection.max_tess_factor, MAX_TESS_FACTOR);
    }

    #[test]
    fn ipd_is_clamped() {
        let mut config = StereoConfig::default();
        for _ in 0..20 {
            apply_toggles(&mut config, press(&[Key::Digit0]));
        }
        assert_eq!(config.stereo.ipd, parallax_stereo::StereoParams::IPD_RANGE.1);
    }

    // ── camera ────────────────────────────────────────────────────────────

    #[test]
    fn held_keys_map_to_axes() {
        let mut input = InputState::default();
        input.keys_down.insert(Key::W);
        input.keys_down.insert(Key::A);
        input.keys_down.insert(Key::Shift);
        let frame = InputFrame::default();

        let cam = camera_input(&input, &frame, 0.005);
        assert_eq!((cam.forward, cam.right, cam.up), (1.0, -1.0, 0.0));
        assert_eq!(cam.speed_scale, 10.0);
        assert_eq!((cam.yaw, cam.pitch), (0.0, 0.0));
    }

    #[test]
    fn pointer_rotates_only_while_right_button_is_held() {
        let mut input = InputState::default();
        let mut frame = InputFrame::default();
        frame.pointer_delta = (10.0, -4.0);
        assert!(camera_input(&input, &frame, 0.01).is_idle());

        input.buttons_down.insert(MouseButton::Right);
        let cam = camera_input(&input, &frame, 0.01);
        assert!((cam.yaw + 0.1).abs() < 1e-6);
        assert!((cam.pitch - 0.04).abs() < 1e-6);
    }
}
