//! Flat indexed triangle mesh
//!
//! Vertex positions `V` and triangle faces `F` (triples of vertex indices).
//! Meshes used by the reconstruction are assumed star-shaped about the
//! body-fixed origin: every surface point is visible along a straight ray
//! from the origin. The radial update in [`crate::reconstruct`] is unsound
//! for bodies that violate this.

pub mod mesher;
pub mod obj;

pub use mesher::{ellipsoid_mesh, icosahedron, unit_cube, MesherParams};
pub use obj::{load_obj, write_obj};

use crate::error::{ExploreError, Result};
use crate::types::Vec3;
use std::collections::HashMap;

/// Handle to a triangle of a mesh
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FaceId(pub usize);

/// Handle to a vertex of a mesh
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(pub usize);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vec3>,
    faces: Vec<[usize; 3]>,
}

impl Mesh {
    /// Build a mesh, checking every face index against the vertex count
    pub fn new(vertices: Vec<Vec3>, faces: Vec<[usize; 3]>) -> Result<Self> {
        let count = vertices.len();
        if let Some((face, bad)) = faces
            .iter()
            .enumerate()
            .find_map(|(i, f)| f.iter().find(|&&v| v >= count).map(|&v| (i, v)))
        {
            return Err(ExploreError::InvalidMesh(format!(
                "face {} references vertex {} but mesh has {} vertices",
                face, bad, count
            )));
        }
        Ok(Mesh { vertices, faces })
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vec3> {
        self.vertices.get(id.0)
    }

    /// Corner positions of a face
    pub fn triangle(&self, id: FaceId) -> Option<[Vec3; 3]> {
        self.faces
            .get(id.0)
            .map(|f| [self.vertices[f[0]], self.vertices[f[1]], self.vertices[f[2]]])
    }

    /// Move a vertex in place. Topology is untouched.
    pub fn set_vertex(&mut self, id: VertexId, position: Vec3) -> Result<()> {
        let slot = self.vertices.get_mut(id.0).ok_or_else(|| {
            ExploreError::InvalidMesh(format!("vertex {} out of range", id.0))
        })?;
        *slot = position;
        Ok(())
    }

    /// Uniformly scale every vertex about the origin
    pub fn scaled(&self, factor: f64) -> Mesh {
        Mesh {
            vertices: self.vertices.iter().map(|v| v * factor).collect(),
            faces: self.faces.clone(),
        }
    }

    /// Scale each axis independently about the origin
    pub fn scaled_axes(&self, axes: &Vec3) -> Mesh {
        Mesh {
            vertices: self.vertices.iter().map(|v| v.component_mul(axes)).collect(),
            faces: self.faces.clone(),
        }
    }

    /// Mean distance of the vertices from the origin
    pub fn mean_radius(&self) -> f64 {
        if self.vertices.is_empty() {
            return 0.0;
        }
        self.vertices.iter().map(|v| v.norm()).sum::<f64>() / self.vertices.len() as f64
    }

    /// Radius of the smallest origin-centred sphere enclosing every vertex
    pub fn bounding_radius(&self) -> f64 {
        self.vertices.iter().map(|v| v.norm()).fold(0.0, f64::max)
    }

    /// Split every triangle into four at its edge midpoints.
    ///
    /// Existing vertices keep their indices; new midpoint vertices are appended
    /// in the order their edges are first met while scanning the faces.
    pub fn subdivide(&self) -> Mesh {
        let mut vertices = self.vertices.clone();
        let mut faces = Vec::with_capacity(self.faces.len() * 4);
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();

        let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Vec3>| -> usize {
            let key = if a < b { (a, b) } else { (b, a) };
            *midpoints.entry(key).or_insert_with(|| {
                vertices.push((vertices[a] + vertices[b]) * 0.5);
                vertices.len() - 1
            })
        };

        for &[a, b, c] in &self.faces {
            let ab = midpoint(a, b, &mut vertices);
            let bc = midpoint(b, c, &mut vertices);
            let ca = midpoint(c, a, &mut vertices);
            faces.push([a, ab, ca]);
            faces.push([b, bc, ab]);
            faces.push([c, ca, bc]);
            faces.push([ab, bc, ca]);
        }

        Mesh { vertices, faces }
    }

    /// Push every vertex onto the unit sphere, dropping degenerate ones to the origin
    pub fn normalized_to_sphere(&self) -> Mesh {
        Mesh {
            vertices: self
                .vertices
                .iter()
                .map(|v| v.try_normalize(0.0).unwrap_or_else(Vec3::zeros))
                .collect(),
            faces: self.faces.clone(),
        }
    }
}
