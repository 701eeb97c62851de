//! Directional-light shadow transform with change tracking.

use glam::{Mat4, Vec3};

use crate::scene::Aabb;

/// Shadow transform for one directional light.
///
/// The transform is recomputed only when the light direction moved more than
/// `epsilon` on any axis since the last recomputation, or after
/// [`mark_dirty`](Self::mark_dirty) (resize, scene change).
#[derive(Debug, Clone)]
pub struct ShadowState {
    epsilon: f32,
    last_dir: Option<Vec3>,
    dirty: bool,
    view_proj: Mat4,
    recomputations: u64,
}

impl ShadowState {
    pub fn new(epsilon: f32) -> Self {
        Self {
            epsilon,
            last_dir: None,
            dirty: true,
            view_proj: Mat4::IDENTITY,
            recomputations: 0,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn set_epsilon(&mut self, epsilon: f32) {
        self.epsilon = epsilon;
    }

    /// Whether the next [`update`](Self::update) with `light_dir` recomputes.
    pub fn needs_update(&self, light_dir: Vec3) -> bool {
        if self.dirty {
            return true;
        }
        match self.last_dir {
            None => true,
            Some(last) => (last - light_dir).abs().max_element() > self.epsilon,
        }
    }

    /// Recomputes the transform if needed. Returns `true` when the shadow map must
    /// be redrawn this frame.
    pub fn update(&mut self, light_dir: Vec3, bounds: &Aabb, padding: f32) -> bool {
        if !self.needs_update(light_dir) {
            return false;
        }

        self.view_proj = light_view_proj(light_dir, bounds, padding);
        self.last_dir = Some(light_dir);
        self.dirty = false;
        self.recomputations += 1;
        log::debug!("shadow transform recomputed for light direction {light_dir}");
        true
    }

    pub fn view_proj(&self) -> Mat4 {
        self.view_proj
    }

    /// Number of recomputations since creation.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}

/// Orthographic light transform enclosing `bounds`, looking along `light_dir`.
pub fn light_view_proj(light_dir: Vec3, bounds: &Aabb, padding: f32) -> Mat4 {
    let dir = light_dir.normalize_or(Vec3::NEG_Y);
    let center = bounds.center();
    let radius = bounds.extent().max_element() + padding;

    let up = if dir.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let view = Mat4::look_at_rh(center, center + dir, up);
    let proj = Mat4::orthographic_rh(-radius, radius, -radius, radius, -radius, radius);
    proj * view
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Aabb {
        Aabb {
            min: Vec3::new(-5.0, 0.0, -5.0),
            max: Vec3::new(5.0, 3.0, 5.0),
        }
    }

    #[test]
    fn first_update_recomputes_once() {
        let mut s = ShadowState::new(0.01);
        let dir = Vec3::new(-0.3, -1.0, -0.2);
        assert!(s.update(dir, &bounds(), 1.0));
        assert!(!s.update(dir, &bounds(), 1.0));
        assert_eq!(s.recomputations(), 1);
    }

    #[test]
    fn small_changes_keep_the_matrix() {
        let mut s = ShadowState::new(0.01);
        let dir = Vec3::new(-0.3, -1.0, -0.2);
        s.update(dir, &bounds(), 1.0);
        let m = s.view_proj();

        // Drift below epsilon every frame does not accumulate: the reference
        // direction only advances on recomputation.
        assert!(!s.update(dir + Vec3::new(0.005, 0.0, 0.0), &bounds(), 1.0));
        assert!(!s.update(dir + Vec3::new(0.009, 0.0, -0.009), &bounds(), 1.0));
        assert_eq!(s.view_proj(), m);
        assert_eq!(s.recomputations(), 1);
    }

    #[test]
    fn large_change_forces_exactly_one_recompute() {
        let mut s = ShadowState::new(0.01);
        s.update(Vec3::new(-0.3, -1.0, -0.2), &bounds(), 1.0);
        let moved = Vec3::new(-0.25, -1.0, -0.2);
        assert!(s.update(moved, &bounds(), 1.0));
        assert!(!s.update(moved, &bounds(), 1.0));
        assert_eq!(s.recomputations(), 2);
    }

    #[test]
    fn mark_dirty_forces_recompute() {
        let mut s = ShadowState::new(0.01);
        let dir = Vec3::new(0.0, -1.0, 0.0);
        s.update(dir, &bounds(), 1.0);
        s.mark_dirty();
        assert!(s.update(dir, &bounds(), 1.0));
        assert_eq!(s.recomputations(), 2);
    }

    #[test]
    fn light_frustum_contains_scene_corners() {
        let b = bounds();
        for dir in [Vec3::new(-0.3, -1.0, -0.2), Vec3::NEG_Y] {
            let m = light_view_proj(dir, &b, 1.0);
            for corner in b.corners() {
                let p = m.project_point3(corner);
                assert!(p.x.abs() <= 1.0 && p.y.abs() <= 1.0, "{corner} -> {p}");
                assert!((0.0..=1.0).contains(&p.z), "{corner} -> {p}");
            }
        }
    }
}
