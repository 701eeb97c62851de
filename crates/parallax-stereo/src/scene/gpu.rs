use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use wgpu::util::DeviceExt;

use super::bounds::Aabb;
use super::bvh::Bvh;
use super::{DirectionalLight, LightProbe, Scene};

/// Rasterizer vertex: position, material index, normal.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub material: u32,
    pub normal: [f32; 3],
    pub _pad: f32,
}

impl GpuVertex {
    const ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x3, // position
        1 => Uint32,    // material
        2 => Float32x3  // normal
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<GpuVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    /// rgb diffuse, a = checker cell size (0 for none).
    pub diffuse: [f32; 4],
    /// rgb specular, a = roughness.
    pub specular: [f32; 4],
}

/// BVH nodes and reordered triangles on the GPU.
pub struct AccelerationStructure {
    pub nodes: wgpu::Buffer,
    pub triangles: wgpu::Buffer,
    pub node_count: u32,
    pub triangle_count: u32,
}

/// Sky cube map and its sampler.
pub struct EnvironmentGpu {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

/// Everything the passes need from a scene, resident on the GPU.
pub struct SceneGpu {
    pub vertices: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub index_count: u32,
    pub materials: wgpu::Buffer,
    /// `None` when the scene has no triangles.
    pub accel: Option<AccelerationStructure>,
    /// Always present; a 1×1 background-colored cube when the scene has no sky.
    pub environment: EnvironmentGpu,
    pub has_environment: bool,
    pub bounds: Aabb,
    pub light: DirectionalLight,
    pub probe: Option<LightProbe>,
    pub background: Vec3,
}

impl SceneGpu {
    pub fn upload(device: &wgpu::Device, queue: &wgpu::Queue, scene: &Scene) -> Result<Self> {
        scene.validate().context("scene cannot be uploaded")?;
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for mesh in &scene.meshes {
            let base = vertices.len() as u32;
            vertices.extend(mesh.positions.iter().zip(&mesh.normals).map(|(p, n)| GpuVertex {
                position: p.to_array(),
                material: mesh.material,
                normal: n.to_array(),
                _pad: 0.0,
            }));
            indices.extend(mesh.indices.iter().map(|i| base + i));
        }

        // Storage and vertex buffers may not be empty.
        if vertices.is_empty() {
            vertices.push(GpuVertex::zeroed());
        }
        let index_count = indices.len() as u32;
        if indices.is_empty() {
            indices.extend_from_slice(&[0, 0, 0]);
        }

        let mut materials: Vec<GpuMaterial> = scene
            .materials
            .iter()
            .map(|m| GpuMaterial {
                diffuse: m.diffuse.extend(m.checker.unwrap_or(0.0)).to_array(),
                specular: m.specular.extend(m.roughness).to_array(),
            })
            .collect();
        if materials.is_empty() {
            materials.push(GpuMaterial::zeroed());
        }

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("parallax scene vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("parallax scene indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let material_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("parallax scene materials"),
            contents: bytemuck::cast_slice(&materials),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let accel = if scene.is_empty() {
            log::warn!("scene has no triangles; ray-traced hole filling is unavailable");
            None
        } else {
            let bvh = Bvh::build(scene.triangles()).context("failed to build scene BVH")?;
            Some(AccelerationStructure {
                nodes: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("parallax bvh nodes"),
                    contents: bytemuck::cast_slice(&bvh.nodes),
                    usage: wgpu::BufferUsages::STORAGE,
                }),
                triangles: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("parallax bvh triangles"),
                    contents: bytemuck::cast_slice(&bvh.triangles),
                    usage: wgpu::BufferUsages::STORAGE,
                }),
                node_count: bvh.nodes.len() as u32,
                triangle_count: bvh.triangles.len() as u32,
            })
        };

        let environment = upload_environment(device, queue, scene);

        log::info!(
            "scene uploaded: {} meshes, {} triangles, {} materials",
            scene.meshes.len(),
            index_count / 3,
            scene.materials.len()
        );

        Ok(Self {
            vertices: vertex_buffer,
            indices: index_buffer,
            index_count,
            materials: material_buffer,
            accel,
            environment,
            has_environment: scene.environment.is_some(),
            bounds: scene.bounds(),
            light: scene.light,
            probe: scene.probe,
            background: scene.background,
        })
    }
}

fn upload_environment(device: &wgpu::Device, queue: &wgpu::Queue, scene: &Scene) -> EnvironmentGpu {
    let (size, texels) = match &scene.environment {
        Some(env) => (env.size.max(1), env.bake()),
        None => {
            let c = scene.background.clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
            let texel = [c.x.round() as u8, c.y.round() as u8, c.z.round() as u8, 255];
            (1, texel.repeat(6))
        }
    };

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("parallax environment cube"),
        size: wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 6,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &texels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * size),
            rows_per_image: Some(size),
        },
        wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 6,
        },
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("parallax environment cube view"),
        dimension: Some(wgpu::TextureViewDimension::Cube),
        ..Default::default()
    });
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("parallax environment sampler"),
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });

    EnvironmentGpu {
        texture,
        view,
        sampler,
    }
}
