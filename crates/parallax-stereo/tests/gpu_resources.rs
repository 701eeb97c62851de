//! GPU allocation across resizes and scene uploads.
//!
//! Needs a WebGPU-compliant adapter; every test returns early when none is
//! available.

use glam::{Mat4, Vec3};
use parallax_engine::device::check_downlevel;
use parallax_engine::render::RenderCtx;
use parallax_stereo::diagnostics::HoleStats;
use parallax_stereo::grid::{AdaptiveGrid, GridDims, GridResources};
use parallax_stereo::passes::targets::{COLOR_FORMAT, HOLE_CLEAR};
use parallax_stereo::passes::{slot, FrameParams, HoleCountPass, RenderData, RenderPass};
use parallax_stereo::scene::{Material, Mesh};
use parallax_stereo::{
    Camera, EyePair, PassError, Scene, SceneGpu, SceneStatus, StereoConfig, StereoParams,
    StereoRenderer,
};
use wgpu::util::DeviceExt;

fn device() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter =
        pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default())).ok()?;
    if let Err(err) = check_downlevel(&adapter.get_downlevel_capabilities()) {
        eprintln!("skipping: {err}");
        return None;
    }
    pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default())).ok()
}

fn ctx<'a>(device: &'a wgpu::Device, queue: &'a wgpu::Queue) -> RenderCtx<'a> {
    RenderCtx::new(device, queue, wgpu::TextureFormat::Bgra8UnormSrgb, (1, 1))
}

fn demo_scene() -> Scene {
    let mut scene = Scene::default();
    let floor = scene.add_material(Material::diffuse(Vec3::splat(0.8)).with_checker(1.0));
    let ball = scene.add_material(Material::diffuse(Vec3::new(0.8, 0.2, 0.2)));
    scene.add_mesh(Mesh::plane(Vec3::ZERO, 10.0, floor));
    scene.add_mesh(Mesh::uv_sphere(Vec3::new(0.0, 1.0, 0.0), 1.0, 16, 8, ball));
    scene
}

// ── grid buffers ──────────────────────────────────────────────────────────

#[test]
fn grid_buffers_follow_resolution() {
    let Some((device, _queue)) = device() else {
        return;
    };

    let hd = AdaptiveGrid::generate(1920, 1080, 16, true).unwrap();
    let resources = GridResources::new(&device, &hd);
    assert_eq!((resources.dims.quads_x, resources.dims.quads_y), (120, 67));
    assert_eq!(resources.discontinuity.size(), 8040 * 4);
    assert!(resources.check(hd.dims).is_ok());

    let uhd_dims = GridDims::new(3840, 2160, 16).unwrap();
    assert_eq!((uhd_dims.quads_x, uhd_dims.quads_y), (240, 135));
    assert!(matches!(
        resources.check(uhd_dims),
        Err(PassError::StaleBuffer { actual: 32160, .. })
    ));

    let uhd = AdaptiveGrid::generate(3840, 2160, 16, true).unwrap();
    let resources = GridResources::new(&device, &uhd);
    assert_eq!(resources.discontinuity.size(), 240 * 135 * 4);
    assert!(resources.check(uhd_dims).is_ok());
}

#[test]
fn renderer_regenerates_grid_on_resize() {
    let Some((device, queue)) = device() else {
        return;
    };
    let ctx = ctx(&device, &queue);
    let mut renderer = StereoRenderer::new(StereoConfig::default());
    assert!(renderer.grid_dims().is_none());

    renderer.on_resize(&ctx, 1920, 1080);
    let dims = renderer.grid_dims().unwrap();
    assert_eq!((dims.quads_x, dims.quads_y, dims.quad_count()), (120, 67, 8040));

    renderer.on_resize(&ctx, 3840, 2160);
    let dims = renderer.grid_dims().unwrap();
    assert_eq!((dims.quads_x, dims.quads_y), (240, 135));
    assert_eq!(renderer.eye_size(), (3840, 2160));
}

#[test]
fn oversized_divisor_leaves_no_grid() {
    let Some((device, queue)) = device() else {
        return;
    };
    let ctx = ctx(&device, &queue);
    let mut config = StereoConfig::default();
    config.reprojection.quad_divide_factor = 64;
    let mut renderer = StereoRenderer::new(config);

    renderer.on_resize(&ctx, 32, 32);
    assert!(renderer.grid_dims().is_none());

    let mut config = renderer.config().clone();
    config.reprojection.quad_divide_factor = 8;
    renderer.set_config(config);
    assert!(renderer.grid_dims().is_none());
    renderer.on_resize(&ctx, 32, 32);
    assert_eq!(renderer.grid_dims().map(|d| d.quad_count()), Some(16));
}

// ── scene upload ──────────────────────────────────────────────────────────

#[test]
fn scene_upload_builds_acceleration_structure() {
    let Some((device, queue)) = device() else {
        return;
    };
    let scene = demo_scene();
    let gpu = SceneGpu::upload(&device, &queue, &scene).unwrap();
    let accel = gpu.accel.as_ref().unwrap();
    assert_eq!(accel.triangle_count as usize, scene.triangle_count());
    assert_eq!(
        SceneStatus::of(Some(&gpu)),
        SceneStatus {
            has_scene: true,
            has_acceleration_structure: true
        }
    );
}

#[test]
fn empty_scene_has_no_acceleration_structure() {
    let Some((device, queue)) = device() else {
        return;
    };
    let gpu = SceneGpu::upload(&device, &queue, &Scene::default()).unwrap();
    assert!(gpu.accel.is_none());
    assert!(!SceneStatus::of(Some(&gpu)).has_acceleration_structure);
}

// ── hole count ────────────────────────────────────────────────────────────

const HALF_ONE: u16 = 0x3c00;
const HALF_NEG_ZERO: u16 = 0x8000;

fn color_target(width: u32, height: u32, usage: wgpu::TextureUsages) -> wgpu::TextureDescriptor<'static> {
    wgpu::TextureDescriptor {
        label: Some("test right color"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: COLOR_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | usage,
        view_formats: &[],
    }
}

/// Runs the hole count over `view` and blocks until its read-back lands.
fn count_holes(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    view: &wgpu::TextureView,
    size: (u32, u32),
    before: impl FnOnce(&mut wgpu::CommandEncoder),
) -> HoleStats {
    let ctx = RenderCtx::new(device, queue, wgpu::TextureFormat::Bgra8UnormSrgb, size);
    let config = StereoConfig::default();
    let eyes = EyePair::from_camera(&Camera::default(), StereoParams::default());
    let frame = FrameParams {
        config: &config,
        eyes: &eyes,
        size,
        grid: None,
        frame_index: 0,
        trace_all: false,
        shadow_view_proj: Mat4::IDENTITY,
        shadow_dirty: false,
    };
    let data = RenderData::new().with_texture(slot::RIGHT_COLOR, view);

    let mut pass = HoleCountPass::new();
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
    before(&mut encoder);
    pass.execute(&ctx, &mut encoder, &data, &frame).unwrap();
    queue.submit(std::iter::once(encoder.finish()));
    pass.after_submit();

    for _ in 0..16 {
        let _ = device.poll(wgpu::PollType::wait_indefinitely());
        if let Some(stats) = pass.poll(device) {
            return stats;
        }
    }
    panic!("hole count never read back");
}

#[test]
fn hole_count_matches_sentinel_texels() {
    let Some((device, queue)) = device() else {
        return;
    };
    let (width, height) = (100u32, 70u32);
    let total = (width * height) as usize;
    let mut texels = vec![[HALF_ONE; 4]; total];
    let holes: Vec<usize> = (0..total).step_by(189).take(37).collect();
    for &i in &holes {
        texels[i] = [0, 0, 0, 0];
    }
    // Negative zero alpha is a hole too.
    texels[holes[5]][3] = HALF_NEG_ZERO;
    // Black but opaque is covered.
    texels[1] = [0, 0, 0, HALF_ONE];

    let texture = device.create_texture_with_data(
        &queue,
        &color_target(width, height, wgpu::TextureUsages::COPY_DST),
        wgpu::util::TextureDataOrder::LayerMajor,
        bytemuck::cast_slice(&texels),
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let stats = count_holes(&device, &queue, &view, (width, height), |_| {});
    assert_eq!(stats, HoleStats { holes: 37, total: 7000 });
    assert!((stats.percent() - 100.0 * 37.0 / 7000.0).abs() < 1e-12);
}

#[test]
fn untouched_right_eye_is_all_holes() {
    let Some((device, queue)) = device() else {
        return;
    };
    let (width, height) = (48u32, 20u32);
    let texture = device.create_texture(&color_target(width, height, wgpu::TextureUsages::RENDER_ATTACHMENT));
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let stats = count_holes(&device, &queue, &view, (width, height), |encoder| {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("test hole clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(HOLE_CLEAR),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
    });
    assert_eq!(stats.holes, stats.total);
    assert_eq!(stats.percent(), 100.0);
}

// ── scene validation ──────────────────────────────────────────────────────

#[test]
fn malformed_scene_upload_is_an_error() {
    let Some((device, queue)) = device() else {
        return;
    };
    let mut scene = demo_scene();
    scene.meshes[1].indices.extend_from_slice(&[0, 1, 100_000]);
    let err = SceneGpu::upload(&device, &queue, &scene).err().unwrap();
    assert!(format!("{err:#}").contains("mesh 1 is malformed"), "{err:#}");
}
