//! Ray casting against a triangle mesh.
//!
//! Candidate triangles come from the R-Tree in [`crate::spatial`]; each is
//! tested with Möller–Trumbore and the closest hit along the ray wins.

use crate::error::{ExploreError, Result};
use crate::mesh::{FaceId, Mesh};
use crate::spatial::SpatialQuery;
use crate::types::{Vec3, DIRECTION_EPS};
use rayon::prelude::*;
use std::sync::Arc;

/// Hits closer than this to the ray origin are ignored
const MIN_HIT_DISTANCE: f64 = 1e-10;
/// Slack on barycentric bounds so rays through shared edges and vertices still hit
const BARYCENTRIC_SLACK: f64 = 1e-9;

/// Casts rays against a mesh owned elsewhere.
///
/// The caster keeps a handle to the mesh plus its own spatial index. The
/// index is a snapshot: after the geometry changes, call [`RayCaster::update_mesh`].
pub struct RayCaster {
    mesh: Arc<Mesh>,
    index: SpatialQuery,
}

impl RayCaster {
    pub fn new(mesh: Arc<Mesh>) -> Self {
        let index = SpatialQuery::from_mesh(&mesh);
        RayCaster { mesh, index }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Swap in a new or mutated mesh and rebuild the index before any further query
    pub fn update_mesh(&mut self, mesh: Arc<Mesh>) {
        self.index.rebuild(&mesh);
        self.mesh = mesh;
    }

    /// First point where the ray from `source` through `target` meets the mesh.
    ///
    /// The ray is unbounded past `target`. Equal-distance hits on shared
    /// edges resolve to the lowest face index.
    pub fn cast_ray(&self, source: &Vec3, target: &Vec3) -> Result<Vec3> {
        let direction = (target - source)
            .try_normalize(DIRECTION_EPS)
            .ok_or(ExploreError::NoIntersection)?;

        let mut closest: Option<(f64, FaceId)> = None;
        for tri in self.index.ray_candidates(source, &direction)? {
            let [v0, v1, v2] = &tri.corners;
            if let Some(t) = ray_triangle_intersection(source, &direction, v0, v1, v2) {
                let better = match closest {
                    None => true,
                    Some((best_t, best_face)) => t < best_t || (t == best_t && tri.face < best_face),
                };
                if better {
                    closest = Some((t, tri.face));
                }
            }
        }

        closest
            .map(|(t, _)| source + direction * t)
            .ok_or(ExploreError::NoIntersection)
    }

    /// [`RayCaster::cast_ray`] for every target, in parallel.
    ///
    /// The output has one entry per target, in order; `None` marks a miss.
    /// Only an empty mesh fails the whole batch.
    pub fn cast_ray_batch(&self, source: &Vec3, targets: &[Vec3]) -> Result<Vec<Option<Vec3>>> {
        if self.index.is_empty() {
            return Err(ExploreError::EmptyMesh);
        }
        targets
            .par_iter()
            .map(|target| match self.cast_ray(source, target) {
                Ok(point) => Ok(Some(point)),
                Err(e) if e.is_recoverable() => Ok(None),
                Err(e) => Err(e),
            })
            .collect()
    }

    /// Shortest distance from `point` to the mesh surface
    pub fn minimum_distance(&self, point: &Vec3) -> Result<f64> {
        self.index.nearest_primitive(point).map(|(distance, _)| distance)
    }
}

/// Möller–Trumbore ray-triangle intersection.
///
/// Returns the ray parameter `t > 0` of the hit, or `None`.
pub fn ray_triangle_intersection(
    origin: &Vec3,
    direction: &Vec3,
    v0: &Vec3,
    v1: &Vec3,
    v2: &Vec3,
) -> Option<f64> {
    const PARALLEL_EPS: f64 = 1e-14;

    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = direction.cross(&edge2);
    let a = edge1.dot(&h);
    if a.abs() < PARALLEL_EPS {
        return None; // parallel to the triangle plane
    }

    let f = 1.0 / a;
    let s = origin - v0;
    let u = f * s.dot(&h);
    if u < -BARYCENTRIC_SLACK || u > 1.0 + BARYCENTRIC_SLACK {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * direction.dot(&q);
    if v < -BARYCENTRIC_SLACK || u + v > 1.0 + BARYCENTRIC_SLACK {
        return None;
    }

    let t = f * edge2.dot(&q);
    if t < MIN_HIT_DISTANCE {
        return None;
    }
    Some(t)
}
