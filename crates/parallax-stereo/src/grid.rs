//! Screen-space warp grid.
//!
//! A lattice of `quads_x × quads_y` quad patches covering the right-eye viewport.
//! Rows are emitted top to bottom. Each vertex carries a quad ID equal to
//! `row * quads_x + column`; a patch is identified by the ID of its top-left
//! corner, which is also its slot in the discontinuity buffer.
//!
//! The last vertex of each row shares its ID with the first vertex of the next
//! row, and the bottom row carries IDs past the quad range. Neither is ever a
//! top-left corner, so patch IDs still cover `0..quad_count` exactly once.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::error::PassError;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct GridVertex {
    /// NDC position before displacement.
    pub position: [f32; 2],
    /// Left-eye texture coordinate (origin top-left).
    pub uv: [f32; 2],
    pub quad_id: i32,
    pub _pad: u32,
}

/// Quad lattice dimensions for a resolution and divide factor.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct GridDims {
    pub quads_x: u32,
    pub quads_y: u32,
}

impl GridDims {
    pub fn new(width: u32, height: u32, divide: u32) -> Result<Self, PassError> {
        let divide = divide.max(1);
        let dims = Self {
            quads_x: width / divide,
            quads_y: height / divide,
        };
        if dims.quads_x == 0 || dims.quads_y == 0 {
            return Err(PassError::EmptyGrid {
                width,
                height,
                divide,
            });
        }
        Ok(dims)
    }

    pub fn quad_count(&self) -> u32 {
        self.quads_x * self.quads_y
    }

    pub fn vertex_count(&self) -> u32 {
        (self.quads_x + 1) * (self.quads_y + 1)
    }

    pub fn index_count(&self) -> u32 {
        self.quad_count() * 4
    }

    /// Byte size of a buffer holding one `f32` per quad.
    pub fn discontinuity_bytes(&self) -> u64 {
        self.quad_count() as u64 * std::mem::size_of::<f32>() as u64
    }
}

/// CPU-side grid geometry.
#[derive(Debug, Clone)]
pub struct AdaptiveGrid {
    pub dims: GridDims,
    pub vertices: Vec<GridVertex>,
    /// Four corners per patch: bottom-left, bottom-right, top-right, top-left.
    pub indices: Vec<u32>,
}

impl AdaptiveGrid {
    pub fn generate(
        width: u32,
        height: u32,
        divide: u32,
        half_pixel_offset: bool,
    ) -> Result<Self, PassError> {
        let dims = GridDims::new(width, height, divide)?;
        let (qx, qy) = (dims.quads_x, dims.quads_y);

        let (pos_offset, uv_offset) = if half_pixel_offset {
            let (w, h) = (width as f32, height as f32);
            ([0.5 / w, -0.5 / h], [0.5 / w, 0.5 / h])
        } else {
            ([0.0; 2], [0.0; 2])
        };

        let mut vertices = Vec::with_capacity(dims.vertex_count() as usize);
        let mut indices = Vec::with_capacity(dims.index_count() as usize);

        let mut quad_id: i32 = -1;
        for y in (0..=qy).rev() {
            let row_start = vertices.len() as u32;
            for x in 0..=qx {
                quad_id += 1;
                let fx = x as f32 / qx as f32;
                let fy = y as f32 / qy as f32;
                vertices.push(GridVertex {
                    position: [fx * 2.0 - 1.0 + pos_offset[0], fy * 2.0 - 1.0 + pos_offset[1]],
                    uv: [fx + uv_offset[0], 1.0 - fy + uv_offset[1]],
                    quad_id,
                    _pad: 0,
                });

                if y > 0 && x < qx {
                    let vi = row_start + x;
                    indices.extend_from_slice(&[vi + qx + 1, vi + qx + 2, vi + 1, vi]);
                }
            }
            quad_id -= 1;
        }

        let grid = Self {
            dims,
            vertices,
            indices,
        };
        debug_assert!(
            (0..dims.quad_count() as usize).all(|p| grid.patch_quad_id(p) == p as i32),
            "patch quad IDs do not match their slots"
        );
        Ok(grid)
    }

    /// Quad ID of patch `patch`, read from its top-left corner.
    pub fn patch_quad_id(&self, patch: usize) -> i32 {
        self.vertices[self.indices[patch * 4 + 3] as usize].quad_id
    }
}

/// GPU copies of the grid plus the discontinuity buffer indexed by quad ID.
///
/// Replaced as a whole on regeneration; passes never see a partially rebuilt grid.
pub struct GridResources {
    pub dims: GridDims,
    pub vertices: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub discontinuity: wgpu::Buffer,
}

impl GridResources {
    pub fn new(device: &wgpu::Device, grid: &AdaptiveGrid) -> Self {
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("parallax grid vertices"),
            contents: bytemuck::cast_slice(&grid.vertices),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("parallax grid indices"),
            contents: bytemuck::cast_slice(&grid.indices),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let discontinuity = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("parallax discontinuity buffer"),
            size: grid.dims.discontinuity_bytes(),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        log::debug!(
            "grid allocated: {}x{} quads, {} vertices",
            grid.dims.quads_x,
            grid.dims.quads_y,
            grid.dims.vertex_count()
        );

        Self {
            dims: grid.dims,
            vertices,
            indices,
            discontinuity,
        }
    }

    /// Fails when the buffers were sized for different dimensions than `dims`.
    pub fn check(&self, dims: GridDims) -> Result<(), PassError> {
        let expected = dims.discontinuity_bytes();
        let actual = self.discontinuity.size();
        if expected != actual || self.dims != dims {
            return Err(PassError::StaleBuffer { expected, actual });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── counts ────────────────────────────────────────────────────────────

    #[test]
    fn counts_match_dimensions() {
        for &(w, h, d) in &[(1920, 1080, 16), (64, 48, 1), (100, 37, 7), (17, 17, 16), (3840, 2160, 16)] {
            let g = AdaptiveGrid::generate(w, h, d, true).unwrap();
            let (qx, qy) = (w / d, h / d);
            assert_eq!(g.vertices.len() as u32, (qx + 1) * (qy + 1));
            assert_eq!(g.indices.len() as u32, qx * qy * 4);
            assert!(g.indices.iter().all(|&i| (i as usize) < g.vertices.len()));
        }
    }

    #[test]
    fn full_hd_reference_dimensions() {
        let g = AdaptiveGrid::generate(1920, 1080, 16, true).unwrap();
        assert_eq!((g.dims.quads_x, g.dims.quads_y), (120, 67));
        assert_eq!(g.vertices.len(), 121 * 68);
        assert_eq!(g.dims.quad_count(), 8040);
        assert_eq!(g.dims.discontinuity_bytes(), 8040 * 4);

        let uhd = GridDims::new(3840, 2160, 16).unwrap();
        assert_eq!((uhd.quads_x, uhd.quads_y), (240, 135));
    }

    #[test]
    fn divide_larger_than_resolution_is_rejected() {
        assert_eq!(
            GridDims::new(8, 600, 16),
            Err(PassError::EmptyGrid { width: 8, height: 600, divide: 16 })
        );
        assert!(AdaptiveGrid::generate(0, 0, 1, false).is_err());
    }

    // ── quad ids ──────────────────────────────────────────────────────────

    #[test]
    fn patch_quad_ids_are_a_bijection() {
        for &(w, h, d) in &[(1920, 1080, 16), (33, 20, 4), (5, 3, 1), (1, 1, 1), (640, 480, 7)] {
            let g = AdaptiveGrid::generate(w, h, d, false).unwrap();
            let n = g.dims.quad_count() as usize;
            let mut seen = vec![false; n];
            for patch in 0..n {
                let id = g.patch_quad_id(patch);
                assert!(id >= 0 && (id as usize) < n, "id {id} out of range for {w}x{h}/{d}");
                assert!(!seen[id as usize], "id {id} assigned twice for {w}x{h}/{d}");
                seen[id as usize] = true;
            }
        }
    }

    #[test]
    fn patch_id_matches_analyzer_slot() {
        let g = AdaptiveGrid::generate(160, 96, 16, false).unwrap();
        let qx = g.dims.quads_x as usize;
        for patch in 0..g.dims.quad_count() as usize {
            let tl = g.vertices[g.indices[patch * 4 + 3] as usize];
            let bx = (tl.uv[0] * qx as f32).round() as usize;
            let by = (tl.uv[1] * g.dims.quads_y as f32).round() as usize;
            assert_eq!(g.patch_quad_id(patch) as usize, by * qx + bx);
        }
    }

    #[test]
    fn row_end_vertex_shares_id_with_next_row_start() {
        let g = AdaptiveGrid::generate(64, 32, 16, false).unwrap();
        let stride = (g.dims.quads_x + 1) as usize;
        assert_eq!(g.vertices[stride - 1].quad_id, g.vertices[stride].quad_id);
    }

    // ── layout ────────────────────────────────────────────────────────────

    #[test]
    fn corners_follow_winding_and_screen_orientation() {
        let g = AdaptiveGrid::generate(32, 32, 16, false).unwrap();
        let c: Vec<GridVertex> = g.indices[0..4].iter().map(|&i| g.vertices[i as usize]).collect();
        let (bl, br, tr, tl) = (c[0], c[1], c[2], c[3]);
        assert_eq!(tl.position, [-1.0, 1.0]);
        assert_eq!(tl.uv, [0.0, 0.0]);
        assert_eq!(tr.position, [0.0, 1.0]);
        assert_eq!(bl.position, [-1.0, 0.0]);
        assert_eq!(br.uv, [0.5, 0.5]);
    }

    #[test]
    fn half_pixel_offset_shifts_position_and_uv() {
        let plain = AdaptiveGrid::generate(100, 50, 10, false).unwrap();
        let shifted = AdaptiveGrid::generate(100, 50, 10, true).unwrap();
        let (a, b) = (plain.vertices[0], shifted.vertices[0]);
        assert!((b.position[0] - a.position[0] - 0.005).abs() < 1e-6);
        assert!((b.position[1] - a.position[1] + 0.01).abs() < 1e-6);
        assert!((b.uv[0] - a.uv[0] - 0.005).abs() < 1e-6);
        assert!((b.uv[1] - a.uv[1] - 0.01).abs() < 1e-6);
    }

    #[test]
    fn generation_checks_ids_on_uneven_grids() {
        for w in [1, 2, 15, 16, 17, 31, 97] {
            for h in [1, 3, 16, 33] {
                for d in [1, 4, 16] {
                    if let Ok(g) = AdaptiveGrid::generate(w, h, d, w % 2 == 0) {
                        assert_eq!(g.patch_quad_id(g.dims.quad_count() as usize - 1), g.dims.quad_count() as i32 - 1);
                    }
                }
            }
        }
    }

    #[test]
    fn vertex_layout_is_storage_compatible() {
        assert_eq!(std::mem::size_of::<GridVertex>(), 24);
    }
}
