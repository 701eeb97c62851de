use glam::{Mat4, Quat, Vec3};

/// Right-handed perspective camera.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fovy: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.5, 6.0),
            target: Vec3::new(0.0, 1.0, 0.0),
            up: Vec3::Y,
            fovy: 60f32.to_radians(),
            aspect: 1.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or(Vec3::NEG_Z)
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize_or(Vec3::X)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Perspective projection with a 0..1 depth range.
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fovy, self.aspect, self.near, self.far)
    }

    /// Moves position and target together.
    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
        self.target += delta;
    }

    /// Rotates the view direction by `yaw` around `up` and `pitch` around the right
    /// axis, keeping the target distance. Pitch stops short of the poles.
    pub fn rotate(&mut self, yaw: f32, pitch: f32) {
        let offset = self.target - self.position;
        let distance = offset.length().max(1e-3);
        let dir = offset / distance;

        let current_pitch = dir.dot(self.up).clamp(-1.0, 1.0).asin();
        let limit = 89f32.to_radians();
        let pitch = (current_pitch + pitch).clamp(-limit, limit) - current_pitch;

        let rotation = Quat::from_axis_angle(self.up, yaw) * Quat::from_axis_angle(self.right(), pitch);
        self.target = self.position + rotation * dir * distance;
    }
}

/// Platform-agnostic movement request for one frame.
///
/// Axes are in `-1..=1`; rotation deltas are in radians.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraInput {
    pub forward: f32,
    pub right: f32,
    pub up: f32,
    pub yaw: f32,
    pub pitch: f32,
    /// Multiplies the movement speed (e.g. 0.25 for precise, 10 for fast).
    pub speed_scale: f32,
}

impl Default for CameraInput {
    fn default() -> Self {
        Self {
            forward: 0.0,
            right: 0.0,
            up: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            speed_scale: 1.0,
        }
    }
}

impl CameraInput {
    pub fn is_idle(&self) -> bool {
        self.forward == 0.0
            && self.right == 0.0
            && self.up == 0.0
            && self.yaw == 0.0
            && self.pitch == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_keeps_target_distance() {
        let mut cam = Camera::default();
        let before = cam.position.distance(cam.target);
        cam.rotate(0.3, -0.2);
        assert!((cam.position.distance(cam.target) - before).abs() < 1e-4);
    }

    #[test]
    fn pitch_is_clamped_below_the_pole() {
        let mut cam = Camera::default();
        cam.rotate(0.0, 10.0);
        let elevation = cam.forward().dot(Vec3::Y).asin().to_degrees();
        assert!(elevation <= 89.01 && elevation > 80.0, "elevation {elevation}");
    }

    #[test]
    fn translate_moves_target_along() {
        let mut cam = Camera::default();
        let fwd = cam.forward();
        cam.translate(Vec3::new(1.0, 2.0, 3.0));
        assert!((cam.forward() - fwd).length() < 1e-6);
    }
}
