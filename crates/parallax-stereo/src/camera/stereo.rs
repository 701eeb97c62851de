use glam::{Mat4, Vec3, Vec4};

use crate::config::StereoParams;

use super::camera::{Camera, CameraInput};

/// View and projection for one eye.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EyeCamera {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    /// World-space eye position.
    pub position: Vec3,
}

impl EyeCamera {
    fn new(view: Mat4, projection: Mat4) -> Self {
        let view_proj = projection * view;
        Self {
            view,
            projection,
            view_proj,
            inv_view_proj: view_proj.inverse(),
            position: view.inverse().w_axis.truncate(),
        }
    }
}

/// Both eyes for one frame. Shares near/far, FOV and aspect with the mono camera.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EyePair {
    pub left: EyeCamera,
    pub right: EyeCamera,
    pub near: f32,
    pub far: f32,
    pub fovy: f32,
    pub aspect: f32,
}

impl EyePair {
    /// Off-axis stereo pair around `camera`.
    ///
    /// Each eye is shifted laterally by `ipd / 2` and its frustum is skewed by
    /// `ipd / 2 * near / z0` toward the other eye, so both frusta converge at `z0`.
    pub fn from_camera(camera: &Camera, params: StereoParams) -> Self {
        let half_ipd = params.ipd * 0.5;
        let top = camera.near * (camera.fovy * 0.5).tan();
        let right = camera.aspect * top;
        let offset = if params.z0 > 0.0 {
            half_ipd * camera.near / params.z0
        } else {
            0.0
        };

        let left_proj = frustum_rh(-right + offset, right + offset, -top, top, camera.near, camera.far);
        let right_proj = frustum_rh(-right - offset, right - offset, -top, top, camera.near, camera.far);

        let view = camera.view();
        let left_view = Mat4::from_translation(Vec3::new(half_ipd, 0.0, 0.0)) * view;
        let right_view = Mat4::from_translation(Vec3::new(-half_ipd, 0.0, 0.0)) * view;

        Self {
            left: EyeCamera::new(left_view, left_proj),
            right: EyeCamera::new(right_view, right_proj),
            near: camera.near,
            far: camera.far,
            fovy: camera.fovy,
            aspect: camera.aspect,
        }
    }

    /// Cone spread angle for one pixel of the right eye at `height` rows.
    pub fn pixel_spread_angle(&self, height: u32) -> f32 {
        // Recover the vertical FOV from the projection so off-axis skew is ignored.
        let fovy = 2.0 * (1.0 / self.right.projection.y_axis.y).atan();
        (2.0 * (fovy * 0.5).tan() / height.max(1) as f32).atan()
    }
}

/// Off-center right-handed perspective projection with a 0..1 depth range.
pub fn frustum_rh(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let w = right - left;
    let h = top - bottom;
    let d = near - far;
    Mat4::from_cols(
        Vec4::new(2.0 * near / w, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 * near / h, 0.0, 0.0),
        Vec4::new((right + left) / w, (top + bottom) / h, far / d, -1.0),
        Vec4::new(0.0, 0.0, near * far / d, 0.0),
    )
}

/// Fly camera that produces the stereo eye pair every frame.
#[derive(Debug, Clone)]
pub struct StereoCameraController {
    camera: Camera,
    params: StereoParams,
    /// Units per second at `speed_scale == 1`.
    pub move_speed: f32,
}

impl StereoCameraController {
    pub fn new(camera: Camera, params: StereoParams) -> Self {
        Self {
            camera,
            params,
            move_speed: 2.0,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    pub fn params(&self) -> StereoParams {
        self.params
    }

    pub fn set_params(&mut self, params: StereoParams) {
        self.params = params;
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.camera.aspect = aspect;
        }
    }

    /// Applies one frame of movement. Returns `true` when the camera changed.
    pub fn update(&mut self, input: &CameraInput, dt: f32) -> bool {
        if input.is_idle() {
            return false;
        }

        let step = self.move_speed * input.speed_scale * dt;
        let delta = self.camera.forward() * input.forward
            + self.camera.right() * input.right
            + self.camera.up * input.up;
        self.camera.translate(delta * step);

        if input.yaw != 0.0 || input.pitch != 0.0 {
            self.camera.rotate(input.yaw, input.pitch);
        }
        true
    }

    pub fn eyes(&self) -> EyePair {
        EyePair::from_camera(&self.camera, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera {
            aspect: 16.0 / 9.0,
            ..Camera::default()
        }
    }

    fn mirror_x(m: Mat4) -> Mat4 {
        let s = Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0));
        s * m * s
    }

    #[test]
    fn zero_ipd_gives_identical_eyes() {
        let eyes = EyePair::from_camera(&camera(), StereoParams { ipd: 0.0, z0: 2.0 });
        assert_eq!(eyes.left.view, eyes.right.view);
        assert_eq!(eyes.left.projection, eyes.right.projection);
    }

    #[test]
    fn projections_are_mirror_symmetric() {
        for ipd in [0.05, 0.062, 0.08] {
            let eyes = EyePair::from_camera(&camera(), StereoParams { ipd, z0: 2.0 });
            assert!(eyes.right.projection.abs_diff_eq(mirror_x(eyes.left.projection), 1e-6));
            assert_ne!(eyes.left.projection, eyes.right.projection);
        }
    }

    #[test]
    fn eyes_sit_half_ipd_either_side() {
        let cam = camera();
        let eyes = EyePair::from_camera(&cam, StereoParams { ipd: 0.062, z0: 2.0 });
        let l = eyes.left.position - cam.position;
        let r = eyes.right.position - cam.position;
        assert!((l + cam.right() * 0.031).length() < 1e-5);
        assert!((r - cam.right() * 0.031).length() < 1e-5);
    }

    #[test]
    fn convergence_point_projects_to_same_ndc() {
        let cam = Camera {
            position: Vec3::ZERO,
            target: Vec3::NEG_Z,
            ..camera()
        };
        let eyes = EyePair::from_camera(&cam, StereoParams { ipd: 0.062, z0: 2.0 });
        let p = Vec3::new(0.0, 0.0, -2.0);
        let l = eyes.left.view_proj.project_point3(p);
        let r = eyes.right.view_proj.project_point3(p);
        assert!((l - r).length() < 1e-5, "left {l}, right {r}");
    }

    #[test]
    fn frustum_matches_symmetric_perspective() {
        let cam = camera();
        let top = cam.near * (cam.fovy * 0.5).tan();
        let right = cam.aspect * top;
        let off = frustum_rh(-right, right, -top, top, cam.near, cam.far);
        assert!(off.abs_diff_eq(cam.projection(), 1e-5));
    }

    #[test]
    fn spread_angle_is_about_one_pixel_of_fov() {
        let eyes = EyePair::from_camera(&camera(), StereoParams::default());
        let angle = eyes.pixel_spread_angle(1080);
        let approx = camera().fovy / 1080.0;
        assert!((angle - approx).abs() / approx < 0.2);
    }

    #[test]
    fn idle_input_leaves_camera_untouched() {
        let mut ctl = StereoCameraController::new(camera(), StereoParams::default());
        assert!(!ctl.update(&CameraInput::default(), 0.016));
        let moved = ctl.update(
            &CameraInput {
                forward: 1.0,
                speed_scale: 10.0,
                ..Default::default()
            },
            0.1,
        );
        assert!(moved);
        assert!((ctl.camera().position - camera().position).length() > 1.0);
    }
}
