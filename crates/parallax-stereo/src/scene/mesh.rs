use glam::Vec3;

/// Surface description shared by the rasterizer and the ray tracer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Material {
    pub diffuse: Vec3,
    pub specular: Vec3,
    /// 0 = mirror-like, 1 = fully rough.
    pub roughness: f32,
    /// World-space checker cell size; `None` for a flat color.
    pub checker: Option<f32>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Vec3::splat(0.8),
            specular: Vec3::splat(0.04),
            roughness: 0.5,
            checker: None,
        }
    }
}

impl Material {
    pub fn diffuse(color: Vec3) -> Self {
        Self {
            diffuse: color,
            ..Self::default()
        }
    }

    pub fn with_checker(mut self, cell: f32) -> Self {
        self.checker = (cell > 0.0).then_some(cell);
        self
    }

    pub fn with_specular(mut self, specular: Vec3, roughness: f32) -> Self {
        self.specular = specular;
        self.roughness = roughness.clamp(0.02, 1.0);
        self
    }
}

/// Indexed triangle mesh with per-vertex normals and one material.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub material: u32,
}

impl Mesh {
    /// Horizontal square centered at `center`, facing +Y.
    pub fn plane(center: Vec3, size: f32, material: u32) -> Self {
        let h = size * 0.5;
        let positions = vec![
            center + Vec3::new(-h, 0.0, -h),
            center + Vec3::new(h, 0.0, -h),
            center + Vec3::new(h, 0.0, h),
            center + Vec3::new(-h, 0.0, h),
        ];
        Self {
            positions,
            normals: vec![Vec3::Y; 4],
            indices: vec![0, 2, 1, 0, 3, 2],
            material,
        }
    }

    /// Axis-aligned box with flat-shaded faces.
    pub fn cuboid(center: Vec3, half_extents: Vec3, material: u32) -> Self {
        // (normal, up, side) with side × up == normal so quads wind outward.
        const FACES: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::Y, Vec3::NEG_Z),
            (Vec3::NEG_X, Vec3::Y, Vec3::Z),
            (Vec3::Y, Vec3::Z, Vec3::NEG_X),
            (Vec3::NEG_Y, Vec3::Z, Vec3::X),
            (Vec3::Z, Vec3::Y, Vec3::X),
            (Vec3::NEG_Z, Vec3::Y, Vec3::NEG_X),
        ];

        let mut mesh = Self {
            material,
            ..Self::default()
        };
        for (normal, up, side) in FACES {
            let base = mesh.positions.len() as u32;
            let c = center + normal * half_extents;
            let u = side * half_extents;
            let v = up * half_extents;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                mesh.positions.push(c + u * su + v * sv);
                mesh.normals.push(normal);
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// Latitude/longitude sphere.
    pub fn uv_sphere(center: Vec3, radius: f32, segments: u32, rings: u32, material: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);

        let mut mesh = Self {
            material,
            ..Self::default()
        };
        for r in 0..=rings {
            let theta = std::f32::consts::PI * r as f32 / rings as f32;
            for s in 0..=segments {
                let phi = std::f32::consts::TAU * s as f32 / segments as f32;
                let n = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
                mesh.positions.push(center + n * radius);
                mesh.normals.push(n);
            }
        }

        let stride = segments + 1;
        for r in 0..rings {
            for s in 0..segments {
                let a = r * stride + s;
                let b = a + stride;
                mesh.indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }
        mesh
    }

    /// Fails when normals and positions disagree in length, the index list is
    /// not whole triangles, or an index is out of range.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.normals.len() == self.positions.len(),
            "{} normals for {} positions",
            self.normals.len(),
            self.positions.len()
        );
        anyhow::ensure!(
            self.indices.len() % 3 == 0,
            "{} indices do not form whole triangles",
            self.indices.len()
        );
        if let Some(&i) = self
            .indices
            .iter()
            .find(|&&i| i as usize >= self.positions.len())
        {
            anyhow::bail!("index {i} out of range for {} vertices", self.positions.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward(mesh: &Mesh, center: Vec3) {
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.positions[tri[i] as usize]);
            let n = (b - a).cross(c - a);
            let mid = (a + b + c) / 3.0;
            // Degenerate pole triangles have no orientation.
            if n.length() > 1e-6 {
                assert!(n.dot(mid - center) > 0.0, "inward triangle {tri:?}");
            }
        }
    }

    #[test]
    fn cuboid_faces_wind_outward() {
        let m = Mesh::cuboid(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.5, 1.0, 2.0), 0);
        assert_eq!(m.positions.len(), 24);
        assert_eq!(m.indices.len(), 36);
        assert_outward(&m, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn sphere_faces_wind_outward() {
        let m = Mesh::uv_sphere(Vec3::ZERO, 1.0, 12, 8, 0);
        assert_eq!(m.indices.len() as u32, 12 * 8 * 6);
        assert_outward(&m, Vec3::ZERO);
    }

    #[test]
    fn malformed_meshes_fail_validation() {
        assert!(Mesh::uv_sphere(Vec3::ZERO, 1.0, 6, 4, 0).validate().is_ok());

        let mut m = Mesh::plane(Vec3::ZERO, 1.0, 0);
        m.indices = vec![0, 1, 5];
        let err = m.validate().unwrap_err().to_string();
        assert!(err.contains("index 5"), "{err}");

        let mut m = Mesh::plane(Vec3::ZERO, 1.0, 0);
        m.normals.pop();
        assert!(m.validate().is_err());

        let mut m = Mesh::plane(Vec3::ZERO, 1.0, 0);
        m.indices.push(0);
        assert!(m.validate().is_err());
    }

    #[test]
    fn plane_faces_up() {
        let m = Mesh::plane(Vec3::ZERO, 4.0, 0);
        assert_outward(&m, Vec3::new(0.0, -1.0, 0.0));
    }
}
