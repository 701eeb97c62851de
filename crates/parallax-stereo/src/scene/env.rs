use glam::Vec3;

/// Procedural sky: a vertical gradient baked into a cube map at upload.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EnvironmentMap {
    pub zenith: Vec3,
    pub horizon: Vec3,
    pub ground: Vec3,
    /// Face resolution in texels.
    pub size: u32,
}

impl Default for EnvironmentMap {
    fn default() -> Self {
        Self {
            zenith: Vec3::new(0.18, 0.32, 0.62),
            horizon: Vec3::new(0.75, 0.80, 0.85),
            ground: Vec3::new(0.22, 0.20, 0.18),
            size: 64,
        }
    }
}

impl EnvironmentMap {
    pub fn radiance(&self, dir: Vec3) -> Vec3 {
        let y = dir.normalize_or(Vec3::Y).y;
        if y >= 0.0 {
            self.horizon.lerp(self.zenith, y.sqrt())
        } else {
            self.horizon.lerp(self.ground, (-y).sqrt())
        }
    }

    /// RGBA8 texels for the six faces, in +X, -X, +Y, -Y, +Z, -Z order.
    pub fn bake(&self) -> Vec<u8> {
        let n = self.size.max(1);
        let mut out = Vec::with_capacity((n * n * 6 * 4) as usize);
        for face in 0..6 {
            for y in 0..n {
                for x in 0..n {
                    let u = (x as f32 + 0.5) / n as f32 * 2.0 - 1.0;
                    let v = (y as f32 + 0.5) / n as f32 * 2.0 - 1.0;
                    let c = self.radiance(cube_face_direction(face, u, v)).clamp(Vec3::ZERO, Vec3::ONE);
                    out.extend_from_slice(&[
                        (c.x * 255.0).round() as u8,
                        (c.y * 255.0).round() as u8,
                        (c.z * 255.0).round() as u8,
                        255,
                    ]);
                }
            }
        }
        out
    }
}

/// Direction through texel coordinate `(u, v)` in `-1..=1` of cube `face`,
/// using the standard cube map face orientation (v grows downward).
pub fn cube_face_direction(face: u32, u: f32, v: f32) -> Vec3 {
    let d = match face {
        0 => Vec3::new(1.0, -v, -u),
        1 => Vec3::new(-1.0, -v, u),
        2 => Vec3::new(u, 1.0, v),
        3 => Vec3::new(u, -1.0, -v),
        4 => Vec3::new(u, -v, 1.0),
        _ => Vec3::new(-u, -v, -1.0),
    };
    d.normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_centers_point_along_axes() {
        let axes = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        for (face, axis) in axes.iter().enumerate() {
            assert!((cube_face_direction(face as u32, 0.0, 0.0) - *axis).length() < 1e-6);
        }
    }

    #[test]
    fn top_face_is_zenith_colored() {
        let env = EnvironmentMap {
            size: 4,
            ..Default::default()
        };
        let texels = env.bake();
        assert_eq!(texels.len(), 4 * 4 * 6 * 4);
        let face_bytes = 4 * 4 * 4;
        let top = &texels[2 * face_bytes..3 * face_bytes];
        let bottom = &texels[3 * face_bytes..4 * face_bytes];
        // Blue channel dominates above, not below.
        assert!(top[2] > top[0]);
        assert!(bottom[2] < top[2]);
    }
}
