//! Procedural demo scene.
//!
//! Objects sit at staggered depths in front of a far wall so that the right eye
//! sees plenty of disocclusion next to their silhouettes.

use glam::Vec3;
use parallax_stereo::scene::{DirectionalLight, EnvironmentMap, LightProbe, Material, Mesh};
use parallax_stereo::{Camera, Scene};

pub fn demo_scene() -> Scene {
    let mut scene = Scene {
        light: DirectionalLight {
            direction: Vec3::new(-0.5, -1.0, -0.35).normalize(),
            color: Vec3::new(1.0, 0.96, 0.9),
            intensity: 2.5,
        },
        probe: Some(LightProbe {
            irradiance: Vec3::new(0.12, 0.14, 0.18),
        }),
        environment: Some(EnvironmentMap::default()),
        background: Vec3::new(0.05, 0.05, 0.07),
        camera: Camera {
            position: Vec3::new(0.0, 1.6, 7.0),
            target: Vec3::new(0.0, 1.0, 0.0),
            ..Camera::default()
        },
        ..Scene::default()
    };

    let floor = scene.add_material(Material::diffuse(Vec3::splat(0.75)).with_checker(1.0));
    let wall = scene.add_material(Material::diffuse(Vec3::new(0.55, 0.6, 0.7)));
    let red = scene.add_material(
        Material::diffuse(Vec3::new(0.8, 0.15, 0.12)).with_specular(Vec3::splat(0.6), 0.25),
    );
    let gold = scene.add_material(
        Material::diffuse(Vec3::new(0.75, 0.55, 0.15)).with_specular(Vec3::new(0.9, 0.8, 0.5), 0.15),
    );
    let teal = scene.add_material(Material::diffuse(Vec3::new(0.1, 0.55, 0.5)).with_checker(0.25));

    scene.add_mesh(Mesh::plane(Vec3::ZERO, 24.0, floor));
    scene.add_mesh(Mesh::cuboid(Vec3::new(0.0, 3.0, -8.0), Vec3::new(12.0, 3.0, 0.25), wall));

    // Thin pillars produce the widest holes relative to their size.
    for (i, x) in [-3.0f32, -1.0, 1.0, 3.0].into_iter().enumerate() {
        let z = -1.5 - i as f32 * 1.25;
        scene.add_mesh(Mesh::cuboid(Vec3::new(x, 1.25, z), Vec3::new(0.15, 1.25, 0.15), teal));
    }
    scene.add_mesh(Mesh::uv_sphere(Vec3::new(-1.2, 0.8, 1.5), 0.8, 48, 24, red));
    scene.add_mesh(Mesh::uv_sphere(Vec3::new(1.6, 0.5, 2.5), 0.5, 32, 16, gold));
    scene.add_mesh(Mesh::cuboid(Vec3::new(0.3, 0.35, 3.6), Vec3::splat(0.35), red));

    scene
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_scene_is_consistent() {
        let scene = demo_scene();
        assert!(!scene.is_empty());
        assert!(scene
            .meshes
            .iter()
            .all(|m| (m.material as usize) < scene.materials.len()));
        let bounds = scene.bounds();
        assert!(bounds.is_valid());
        assert!(bounds.extent().y > 0.0);
    }
}
