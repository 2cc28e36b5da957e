//! Initial surface meshes: icosahedron, unit cube and refined ellipsoids.

use super::Mesh;
use crate::error::{ExploreError, Result};
use crate::types::Vec3;
use serde::{Deserialize, Serialize};

/// Subdivision levels tried before giving up on the quality criteria
const MAX_REFINEMENT_LEVELS: usize = 6;

/// Meshing quality criteria
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MesherParams {
    /// Lower bound on triangle angles, degrees. Must lie in (0, 30].
    pub min_angle: f64,
    /// Upper bound on triangle circumradius
    pub max_radius: f64,
    /// Upper bound on the radial gap between a triangle centroid and the surface
    pub max_distance: f64,
}

impl Default for MesherParams {
    fn default() -> Self {
        MesherParams {
            min_angle: 10.0,
            max_radius: 0.1,
            max_distance: 0.5,
        }
    }
}

impl MesherParams {
    /// Same criteria with the length bounds multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> MesherParams {
        MesherParams {
            min_angle: self.min_angle,
            max_radius: self.max_radius * factor,
            max_distance: self.max_distance * factor,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_angle > 0.0 && self.min_angle <= 30.0) {
            return Err(ExploreError::InvalidConfiguration(format!(
                "mesher min_angle must lie in (0, 30] degrees, got {}",
                self.min_angle
            )));
        }
        if !(self.max_radius > 0.0) || !(self.max_distance > 0.0) {
            return Err(ExploreError::InvalidConfiguration(format!(
                "mesher max_radius and max_distance must be positive, got {} and {}",
                self.max_radius, self.max_distance
            )));
        }
        Ok(())
    }
}

/// Regular icosahedron inscribed in the unit sphere, faces wound outward
pub fn icosahedron() -> Mesh {
    let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let raw = [
        (-1.0, phi, 0.0),
        (1.0, phi, 0.0),
        (-1.0, -phi, 0.0),
        (1.0, -phi, 0.0),
        (0.0, -1.0, phi),
        (0.0, 1.0, phi),
        (0.0, -1.0, -phi),
        (0.0, 1.0, -phi),
        (phi, 0.0, -1.0),
        (phi, 0.0, 1.0),
        (-phi, 0.0, -1.0),
        (-phi, 0.0, 1.0),
    ];
    let vertices = raw
        .iter()
        .map(|&(x, y, z)| Vec3::new(x, y, z).normalize())
        .collect();
    let faces = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];
    Mesh { vertices, faces }
}

/// Axis-aligned cube of edge 1 centred on the origin (8 vertices, 12 faces)
pub fn unit_cube() -> Mesh {
    let vertices = (0..8)
        .map(|i| {
            let coord = |bit: usize| if i & bit != 0 { 0.5 } else { -0.5 };
            Vec3::new(coord(1), coord(2), coord(4))
        })
        .collect();
    let faces = vec![
        [0, 2, 3],
        [0, 3, 1],
        [4, 5, 7],
        [4, 7, 6],
        [0, 1, 5],
        [0, 5, 4],
        [2, 6, 7],
        [2, 7, 3],
        [0, 4, 6],
        [0, 6, 2],
        [1, 3, 7],
        [1, 7, 5],
    ];
    Mesh { vertices, faces }
}

/// Triangulate the ellipsoid with semi-axes `axes`.
///
/// Starts from the icosahedron and refines by midpoint subdivision,
/// re-projecting onto the sphere, until every triangle meets `params`.
pub fn ellipsoid_mesh(axes: &Vec3, params: &MesherParams) -> Result<Mesh> {
    params.validate()?;
    if axes.iter().any(|&a| !(a > 0.0) || !a.is_finite()) {
        return Err(ExploreError::InvalidConfiguration(format!(
            "ellipsoid semi-axes must be positive, got [{}, {}, {}]",
            axes.x, axes.y, axes.z
        )));
    }

    let mut sphere = icosahedron();
    let mut level = 0;
    loop {
        let mesh = sphere.scaled_axes(axes);
        if meets_criteria(&mesh, axes, params) {
            log::debug!(
                "ellipsoid mesh accepted at level {} ({} vertices)",
                level,
                mesh.vertex_count()
            );
            warn_on_sliver_triangles(&mesh, params.min_angle);
            return Ok(mesh);
        }
        if level == MAX_REFINEMENT_LEVELS {
            log::warn!(
                "ellipsoid mesh stopped at {} levels without meeting criteria ({} vertices)",
                level,
                mesh.vertex_count()
            );
            warn_on_sliver_triangles(&mesh, params.min_angle);
            return Ok(mesh);
        }
        sphere = sphere.subdivide().normalized_to_sphere();
        level += 1;
    }
}

/// Subdivision never improves angles, so this bound is reported, not enforced
fn warn_on_sliver_triangles(mesh: &Mesh, min_angle_deg: f64) {
    let smallest = mesh
        .faces()
        .iter()
        .map(|&[a, b, c]| smallest_angle(&mesh.vertices[a], &mesh.vertices[b], &mesh.vertices[c]))
        .fold(f64::INFINITY, f64::min);
    if smallest < min_angle_deg.to_radians() {
        log::warn!(
            "smallest triangle angle {:.2} deg is below min_angle {:.2} deg",
            smallest.to_degrees(),
            min_angle_deg
        );
    }
}

fn meets_criteria(mesh: &Mesh, axes: &Vec3, params: &MesherParams) -> bool {
    mesh.faces().iter().all(|&[a, b, c]| {
        let (p0, p1, p2) = (mesh.vertices[a], mesh.vertices[b], mesh.vertices[c]);
        let centroid = (p0 + p1 + p2) / 3.0;
        circumradius(&p0, &p1, &p2) <= params.max_radius
            && (ellipsoid_radius(axes, &centroid) - centroid.norm()).abs() <= params.max_distance
    })
}

fn circumradius(p0: &Vec3, p1: &Vec3, p2: &Vec3) -> f64 {
    let (a, b, c) = ((p1 - p0).norm(), (p2 - p1).norm(), (p0 - p2).norm());
    let twice_area = (p1 - p0).cross(&(p2 - p0)).norm();
    if twice_area <= f64::EPSILON {
        return f64::INFINITY;
    }
    a * b * c / (2.0 * twice_area)
}

fn smallest_angle(p0: &Vec3, p1: &Vec3, p2: &Vec3) -> f64 {
    let corner = |at: &Vec3, u: &Vec3, v: &Vec3| {
        let (du, dv) = (u - at, v - at);
        du.cross(&dv).norm().atan2(du.dot(&dv))
    };
    corner(p0, p1, p2)
        .min(corner(p1, p2, p0))
        .min(corner(p2, p0, p1))
}

/// Distance from the origin to the ellipsoid surface along `direction`
fn ellipsoid_radius(axes: &Vec3, direction: &Vec3) -> f64 {
    match direction.try_normalize(0.0) {
        Some(d) => 1.0 / d.component_div(axes).norm(),
        None => 0.0,
    }
}
