use crate::error::{ExploreError, Result};
use crate::mesh::{FaceId, Mesh, VertexId};
use crate::types::Vec3;
use rstar::primitives::GeomWithData;
use rstar::{PointDistance, RTree, RTreeObject, SelectionFunction, AABB};

/// Mesh triangle with its spatial indexing envelope
#[derive(Clone, Debug)]
pub struct IndexedTriangle {
    pub face: FaceId,
    pub corners: [Vec3; 3],
    pub envelope: AABB<[f64; 3]>,
}

impl IndexedTriangle {
    pub fn new(face: FaceId, corners: [Vec3; 3]) -> Self {
        let envelope = compute_envelope(&corners);
        IndexedTriangle {
            face,
            corners,
            envelope,
        }
    }

    /// Closest point of the triangle to `point`
    pub fn closest_point(&self, point: &Vec3) -> Vec3 {
        let [v0, v1, v2] = &self.corners;
        closest_point_on_triangle(point, v0, v1, v2)
    }
}

impl RTreeObject for IndexedTriangle {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for IndexedTriangle {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let p = Vec3::from(*point);
        (self.closest_point(&p) - p).norm_squared()
    }
}

type IndexedVertex = GeomWithData<[f64; 3], VertexId>;

/// R-Tree spatial index over a static triangle mesh
///
/// # Architecture
/// - Triangles indexed by bounding box for nearest-surface and ray queries
/// - Vertices indexed as points for k-nearest queries
/// - Built once from a [`Mesh`]; geometry changes require [`SpatialQuery::rebuild`]
///
/// # Usage
/// ```
/// use asteroid_explore::mesh::unit_cube;
/// use asteroid_explore::spatial::SpatialQuery;
/// use nalgebra::Vector3;
///
/// let index = SpatialQuery::from_mesh(&unit_cube());
/// let (distance, _face) = index.nearest_primitive(&Vector3::new(2.0, 0.0, 0.0)).unwrap();
/// assert!((distance - 1.5).abs() < 1e-12);
/// ```
pub struct SpatialQuery {
    triangles: RTree<IndexedTriangle>,
    vertices: RTree<IndexedVertex>,
    face_count: usize,
}

impl SpatialQuery {
    /// Build both trees from a mesh snapshot
    pub fn from_mesh(mesh: &Mesh) -> Self {
        let triangles: Vec<IndexedTriangle> = mesh
            .faces()
            .iter()
            .enumerate()
            .map(|(i, &[a, b, c])| {
                let v = mesh.vertices();
                IndexedTriangle::new(FaceId(i), [v[a], v[b], v[c]])
            })
            .collect();
        let vertices: Vec<IndexedVertex> = mesh
            .vertices()
            .iter()
            .enumerate()
            .map(|(i, v)| GeomWithData::new([v.x, v.y, v.z], VertexId(i)))
            .collect();

        let face_count = triangles.len();

        SpatialQuery {
            triangles: RTree::bulk_load(triangles),
            vertices: RTree::bulk_load(vertices),
            face_count,
        }
    }

    /// Replace the index contents with a new mesh snapshot.
    ///
    /// Takes `&mut self`, so no query can observe a partially rebuilt index.
    pub fn rebuild(&mut self, mesh: &Mesh) {
        *self = SpatialQuery::from_mesh(mesh);
    }

    /// Total triangles in the index
    pub fn face_count(&self) -> usize {
        self.face_count
    }

    pub fn is_empty(&self) -> bool {
        self.face_count == 0
    }

    /// Minimum distance from `point` to the surface and the closest triangle
    pub fn nearest_primitive(&self, point: &Vec3) -> Result<(f64, FaceId)> {
        let query = [point.x, point.y, point.z];
        let nearest = self
            .non_empty()?
            .triangles
            .nearest_neighbor(&query)
            .ok_or(ExploreError::EmptyMesh)?;
        Ok((nearest.distance_2(&query).sqrt(), nearest.face))
    }

    /// The `k` closest vertices to `point`, nearest first, ties by lower index
    pub fn k_nearest_vertices(&self, point: &Vec3, k: usize) -> Result<Vec<VertexId>> {
        let query = [point.x, point.y, point.z];
        let mut found: Vec<(f64, VertexId)> = Vec::with_capacity(k);

        // Keep pulling while distances tie with the k-th so the index tie-break is exact
        for (vertex, d2) in self
            .non_empty()?
            .vertices
            .nearest_neighbor_iter_with_distance_2(&query)
        {
            if found.len() >= k && (k == 0 || d2 > found[k - 1].0) {
                break;
            }
            found.push((d2, vertex.data));
        }

        found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        found.truncate(k);
        Ok(found.into_iter().map(|(_, id)| id).collect())
    }

    /// Triangles whose envelope is crossed by the ray `origin + t * direction`, `t >= 0`
    pub fn ray_candidates(
        &self,
        origin: &Vec3,
        direction: &Vec3,
    ) -> Result<impl Iterator<Item = &IndexedTriangle>> {
        let selection = RaySelection {
            origin: *origin,
            direction: *direction,
        };
        Ok(self
            .non_empty()?
            .triangles
            .locate_with_selection_function(selection))
    }

    fn non_empty(&self) -> Result<&Self> {
        if self.is_empty() {
            Err(ExploreError::EmptyMesh)
        } else {
            Ok(self)
        }
    }
}

/// Envelope padding, relative to the coordinate magnitude
const SLAB_TOLERANCE: f64 = 1e-9;

/// Prunes R-Tree nodes whose bounding box the ray misses (slab test).
/// Boxes are padded slightly so a ray grazing a shared vertex or edge keeps
/// every triangle that touches it.
struct RaySelection {
    origin: Vec3,
    direction: Vec3,
}

impl RaySelection {
    fn crosses(&self, envelope: &AABB<[f64; 3]>) -> bool {
        let (lower, upper) = (envelope.lower(), envelope.upper());
        let mut t_enter = 0.0_f64;
        let mut t_exit = f64::INFINITY;

        for axis in 0..3 {
            let (o, d) = (self.origin[axis], self.direction[axis]);
            let pad = SLAB_TOLERANCE * (1.0 + lower[axis].abs().max(upper[axis].abs()));
            let (lo, hi) = (lower[axis] - pad, upper[axis] + pad);
            if d.abs() < f64::EPSILON {
                if o < lo || o > hi {
                    return false;
                }
                continue;
            }
            let t1 = (lo - o) / d;
            let t2 = (hi - o) / d;
            t_enter = t_enter.max(t1.min(t2));
            t_exit = t_exit.min(t1.max(t2));
            if t_enter > t_exit {
                return false;
            }
        }
        true
    }
}

impl SelectionFunction<IndexedTriangle> for RaySelection {
    fn should_unpack_parent(&self, envelope: &AABB<[f64; 3]>) -> bool {
        self.crosses(envelope)
    }

    fn should_unpack_leaf(&self, leaf: &IndexedTriangle) -> bool {
        self.crosses(&leaf.envelope)
    }
}

/// Compute bounding box (envelope) for a triangle
fn compute_envelope(corners: &[Vec3; 3]) -> AABB<[f64; 3]> {
    let mut lower = [f64::INFINITY; 3];
    let mut upper = [f64::NEG_INFINITY; 3];
    for corner in corners {
        for axis in 0..3 {
            lower[axis] = lower[axis].min(corner[axis]);
            upper[axis] = upper[axis].max(corner[axis]);
        }
    }
    AABB::from_corners(lower, upper)
}

/// Closest point on a triangle to a query point (Ericson, Real-Time Collision Detection)
pub fn closest_point_on_triangle(point: &Vec3, v0: &Vec3, v1: &Vec3, v2: &Vec3) -> Vec3 {
    let ab = v1 - v0;
    let ac = v2 - v0;
    let ap = point - v0;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *v0;
    }

    let bp = point - v1;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *v1;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return v0 + ab * v;
    }

    let cp = point - v2;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *v2;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return v0 + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return v1 + (v2 - v1) * w;
    }

    // inside the face region
    let denom = 1.0 / (va + vb + vc);
    v0 + ab * (vb * denom) + ac * (vc * denom)
}
