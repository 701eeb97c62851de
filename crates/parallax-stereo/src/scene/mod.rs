//! Scene description and its GPU upload.

mod bounds;
mod bvh;
mod env;
mod gpu;
mod mesh;

pub use bounds::Aabb;
pub use bvh::{Bvh, BvhNode, GpuTriangle, RayHit};
pub use env::{cube_face_direction, EnvironmentMap};
pub use gpu::{AccelerationStructure, EnvironmentGpu, GpuMaterial, GpuVertex, SceneGpu};
pub use mesh::{Material, Mesh};

use anyhow::Context;
use glam::Vec3;

use crate::camera::Camera;

/// The single directional light.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels, world space.
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.4, -1.0, -0.3).normalize(),
            color: Vec3::ONE,
            intensity: 3.0,
        }
    }
}

/// Uniform ambient irradiance.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LightProbe {
    pub irradiance: Vec3,
}

/// CPU scene: triangle meshes, materials, one light, optional probe and sky.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub light: DirectionalLight,
    pub probe: Option<LightProbe>,
    pub environment: Option<EnvironmentMap>,
    pub background: Vec3,
    pub camera: Camera,
}

impl Scene {
    /// Adds a material and returns its index.
    pub fn add_material(&mut self, material: Material) -> u32 {
        self.materials.push(material);
        (self.materials.len() - 1) as u32
    }

    pub fn add_mesh(&mut self, mesh: Mesh) {
        self.meshes.push(mesh);
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.indices.len() / 3).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.triangle_count() == 0
    }

    /// World bounds of all meshes; a unit box at the origin for an empty scene.
    pub fn bounds(&self) -> Aabb {
        let mut b = Aabb::empty();
        for p in self.meshes.iter().flat_map(|m| m.positions.iter()) {
            b.expand(*p);
        }
        if b.is_valid() {
            b
        } else {
            Aabb {
                min: Vec3::splat(-0.5),
                max: Vec3::splat(0.5),
            }
        }
    }

    /// Checks every mesh and its material reference.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, mesh) in self.meshes.iter().enumerate() {
            anyhow::ensure!(
                (mesh.material as usize) < self.materials.len(),
                "mesh {i} references material {} but the scene has {}",
                mesh.material,
                self.materials.len()
            );
            mesh.validate()
                .with_context(|| format!("mesh {i} is malformed"))?;
        }
        Ok(())
    }

    /// Flattened triangles with their material index, in mesh order.
    ///
    /// Triangles with an out-of-range vertex are skipped; [`Scene::validate`]
    /// reports them.
    pub fn triangles(&self) -> Vec<GpuTriangle> {
        let mut out = Vec::with_capacity(self.triangle_count());
        for mesh in &self.meshes {
            for tri in mesh.indices.chunks_exact(3) {
                let vertex = |k: usize| {
                    let i = tri[k] as usize;
                    Some((*mesh.positions.get(i)?, *mesh.normals.get(i)?))
                };
                let (Some(a), Some(b), Some(c)) = (vertex(0), vertex(1), vertex(2)) else {
                    continue;
                };
                out.push(GpuTriangle::new([a.0, b.0, c.0], [a.1, b.1, c.1], mesh.material));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_plane() -> Scene {
        let mut scene = Scene::default();
        let m = scene.add_material(Material::default());
        scene.add_mesh(Mesh::plane(Vec3::ZERO, 2.0, m));
        scene
    }

    #[test]
    fn out_of_range_index_is_an_error_not_a_panic() {
        let mut scene = one_plane();
        scene.meshes[0].indices = vec![0, 1, 5];
        let err = format!("{:#}", scene.validate().unwrap_err());
        assert!(err.contains("mesh 0 is malformed"), "{err}");
        assert!(scene.triangles().is_empty());
    }

    #[test]
    fn missing_normals_are_an_error() {
        let mut scene = one_plane();
        scene.meshes[0].normals.truncate(2);
        assert!(scene.validate().is_err());
        assert_eq!(scene.triangles().len(), 0);
    }

    #[test]
    fn unknown_material_is_an_error() {
        let mut scene = one_plane();
        scene.meshes[0].material = 3;
        let err = scene.validate().unwrap_err().to_string();
        assert!(err.contains("material 3"), "{err}");
    }

    #[test]
    fn well_formed_scene_flattens_every_triangle() {
        let scene = one_plane();
        assert!(scene.validate().is_ok());
        assert_eq!(scene.triangles().len(), scene.triangle_count());
    }
}
