//! Median-split BVH over scene triangles, flattened for GPU traversal.
//!
//! Layout: internal nodes store the index of their left child; the right child
//! always follows it. Leaves store the first triangle and a non-zero count into
//! the reordered triangle array.

use anyhow::{ensure, Result};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use super::bounds::Aabb;

const MAX_LEAF_SIZE: usize = 4;
const MAX_DEPTH: u32 = 48;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct BvhNode {
    pub aabb_min: [f32; 3],
    /// Left child (internal) or first triangle (leaf).
    pub left_first: u32,
    pub aabb_max: [f32; 3],
    /// Triangle count; zero for internal nodes.
    pub count: u32,
}

impl BvhNode {
    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }

    fn bounds(&self) -> Aabb {
        Aabb {
            min: Vec3::from(self.aabb_min),
            max: Vec3::from(self.aabb_max),
        }
    }
}

/// Triangle as stored for the ray tracer: positions, vertex normals and material.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct GpuTriangle {
    pub p0: [f32; 4],
    pub p1: [f32; 4],
    pub p2: [f32; 4],
    pub n0: [f32; 3],
    pub material: u32,
    pub n1: [f32; 4],
    pub n2: [f32; 4],
}

impl GpuTriangle {
    pub fn new(p: [Vec3; 3], n: [Vec3; 3], material: u32) -> Self {
        Self {
            p0: p[0].extend(1.0).to_array(),
            p1: p[1].extend(1.0).to_array(),
            p2: p[2].extend(1.0).to_array(),
            n0: n[0].to_array(),
            material,
            n1: n[1].extend(0.0).to_array(),
            n2: n[2].extend(0.0).to_array(),
        }
    }

    pub fn positions(&self) -> [Vec3; 3] {
        [
            Vec3::from_slice(&self.p0[..3]),
            Vec3::from_slice(&self.p1[..3]),
            Vec3::from_slice(&self.p2[..3]),
        ]
    }

    fn bounds(&self) -> Aabb {
        let mut b = Aabb::empty();
        for p in self.positions() {
            b.expand(p);
        }
        b
    }

    fn centroid(&self) -> Vec3 {
        let [a, b, c] = self.positions();
        (a + b + c) / 3.0
    }

    /// Möller-Trumbore. Returns `(t, u, v)` for hits in `(t_min, t_max)`.
    pub fn intersect(&self, origin: Vec3, dir: Vec3, t_min: f32, t_max: f32) -> Option<(f32, f32, f32)> {
        let [a, b, c] = self.positions();
        let e1 = b - a;
        let e2 = c - a;
        let p = dir.cross(e2);
        let det = e1.dot(p);
        if det.abs() < 1e-9 {
            return None;
        }
        let inv = 1.0 / det;
        let s = origin - a;
        let u = s.dot(p) * inv;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(e1);
        let v = dir.dot(q) * inv;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = e2.dot(q) * inv;
        (t > t_min && t < t_max).then_some((t, u, v))
    }
}

/// Closest hit found by [`Bvh::intersect`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RayHit {
    pub t: f32,
    pub triangle: u32,
    pub u: f32,
    pub v: f32,
}

/// Flattened BVH with its reordered triangles.
#[derive(Debug, Clone)]
pub struct Bvh {
    pub nodes: Vec<BvhNode>,
    pub triangles: Vec<GpuTriangle>,
}

impl Bvh {
    /// Builds a BVH over `triangles`. Fails on an empty input.
    pub fn build(triangles: Vec<GpuTriangle>) -> Result<Self> {
        ensure!(!triangles.is_empty(), "cannot build a BVH without triangles");
        ensure!(
            triangles.len() < u32::MAX as usize,
            "too many triangles for a 32-bit BVH: {}",
            triangles.len()
        );

        let centroids: Vec<Vec3> = triangles.iter().map(GpuTriangle::centroid).collect();
        let bounds: Vec<Aabb> = triangles.iter().map(GpuTriangle::bounds).collect();
        let mut order: Vec<u32> = (0..triangles.len() as u32).collect();

        let mut nodes = Vec::with_capacity(triangles.len() * 2);
        nodes.push(BvhNode::zeroed());
        let mut builder = Builder {
            centroids: &centroids,
            bounds: &bounds,
            order: &mut order,
            nodes: &mut nodes,
        };
        builder.subdivide(0, 0, triangles.len(), 0);

        let reordered = order.iter().map(|&i| triangles[i as usize]).collect();
        log::debug!("bvh built: {} triangles, {} nodes", triangles.len(), nodes.len());

        Ok(Self {
            nodes,
            triangles: reordered,
        })
    }

    pub fn bounds(&self) -> Aabb {
        self.nodes[0].bounds()
    }

    /// Closest hit along `origin + t * dir`, same traversal as the GPU tracer.
    pub fn intersect(&self, origin: Vec3, dir: Vec3, t_max: f32) -> Option<RayHit> {
        let inv_dir = dir.recip();
        let mut best: Option<RayHit> = None;
        let mut closest = t_max;
        let mut stack = Vec::with_capacity(64);
        stack.push(0u32);

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if node.bounds().intersect_ray(origin, inv_dir, closest).is_none() {
                continue;
            }
            if node.is_leaf() {
                let first = node.left_first as usize;
                for (i, tri) in self.triangles[first..first + node.count as usize].iter().enumerate() {
                    if let Some((t, u, v)) = tri.intersect(origin, dir, 1e-4, closest) {
                        closest = t;
                        best = Some(RayHit {
                            t,
                            triangle: (first + i) as u32,
                            u,
                            v,
                        });
                    }
                }
            } else {
                stack.push(node.left_first);
                stack.push(node.left_first + 1);
            }
        }
        best
    }
}

struct Builder<'a> {
    centroids: &'a [Vec3],
    bounds: &'a [Aabb],
    order: &'a mut [u32],
    nodes: &'a mut Vec<BvhNode>,
}

impl Builder<'_> {
    fn subdivide(&mut self, node: usize, start: usize, end: usize, depth: u32) {
        let mut bounds = Aabb::empty();
        let mut centroid_bounds = Aabb::empty();
        for &i in &self.order[start..end] {
            bounds = bounds.union(&self.bounds[i as usize]);
            centroid_bounds.expand(self.centroids[i as usize]);
        }

        let count = end - start;
        let spread = centroid_bounds.extent();
        let axis = if spread.x >= spread.y && spread.x >= spread.z {
            0
        } else if spread.y >= spread.z {
            1
        } else {
            2
        };

        if count <= MAX_LEAF_SIZE || depth >= MAX_DEPTH || spread[axis] <= 0.0 {
            self.nodes[node] = BvhNode {
                aabb_min: bounds.min.to_array(),
                left_first: start as u32,
                aabb_max: bounds.max.to_array(),
                count: count as u32,
            };
            return;
        }

        let mid = start + count / 2;
        let centroids = self.centroids;
        self.order[start..end].select_nth_unstable_by(count / 2, |&a, &b| {
            centroids[a as usize][axis].total_cmp(&centroids[b as usize][axis])
        });

        let left = self.nodes.len();
        self.nodes.push(BvhNode::zeroed());
        self.nodes.push(BvhNode::zeroed());
        self.nodes[node] = BvhNode {
            aabb_min: bounds.min.to_array(),
            left_first: left as u32,
            aabb_max: bounds.max.to_array(),
            count: 0,
        };

        self.subdivide(left, start, mid, depth + 1);
        self.subdivide(left + 1, mid, end, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Mesh;

    fn soup() -> Vec<GpuTriangle> {
        let mut tris = Vec::new();
        let meshes = [
            Mesh::plane(Vec3::ZERO, 20.0, 0),
            Mesh::cuboid(Vec3::new(0.0, 1.0, 0.0), Vec3::splat(1.0), 1),
            Mesh::uv_sphere(Vec3::new(2.5, 1.0, -1.0), 0.8, 16, 10, 2),
            Mesh::cuboid(Vec3::new(-3.0, 0.5, 2.0), Vec3::new(0.5, 0.5, 2.0), 1),
        ];
        for m in &meshes {
            for t in m.indices.chunks_exact(3) {
                let [a, b, c] = [0, 1, 2].map(|i| t[i] as usize);
                tris.push(GpuTriangle::new(
                    [m.positions[a], m.positions[b], m.positions[c]],
                    [m.normals[a], m.normals[b], m.normals[c]],
                    m.material,
                ));
            }
        }
        tris
    }

    fn brute_force(tris: &[GpuTriangle], origin: Vec3, dir: Vec3) -> Option<f32> {
        tris.iter()
            .filter_map(|t| t.intersect(origin, dir, 1e-4, f32::MAX).map(|h| h.0))
            .min_by(|a, b| a.total_cmp(b))
    }

    #[test]
    fn layout_matches_shader_structs() {
        assert_eq!(std::mem::size_of::<BvhNode>(), 32);
        assert_eq!(std::mem::size_of::<GpuTriangle>(), 96);
    }

    #[test]
    fn every_triangle_lands_in_exactly_one_leaf() {
        let bvh = Bvh::build(soup()).unwrap();
        let mut covered = vec![0u32; bvh.triangles.len()];
        for n in bvh.nodes.iter().filter(|n| n.is_leaf()) {
            for i in n.left_first..n.left_first + n.count {
                covered[i as usize] += 1;
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
    }

    #[test]
    fn traversal_matches_brute_force() {
        let tris = soup();
        let bvh = Bvh::build(tris.clone()).unwrap();
        let origin = Vec3::new(0.3, 4.0, 9.0);
        for i in 0..400 {
            let a = i as f32 * 0.137;
            let dir = Vec3::new(a.sin() * 0.6, -0.35 - 0.3 * (a * 0.7).cos().abs(), -1.0).normalize();
            let expected = brute_force(&tris, origin, dir);
            let got = bvh.intersect(origin, dir, f32::MAX).map(|h| h.t);
            match (expected, got) {
                (None, None) => {}
                (Some(e), Some(g)) => assert!((e - g).abs() < 1e-4, "ray {i}: {e} vs {g}"),
                other => panic!("ray {i}: mismatch {other:?}"),
            }
        }
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(Bvh::build(Vec::new()).is_err());
    }
}
