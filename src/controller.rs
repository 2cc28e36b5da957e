//! Exploration planning and pointing attitude

use crate::mesh::VertexId;
use crate::reconstruct::ReconstructMesh;
use crate::types::{Attitude, State, Vec3, DIRECTION_EPS};
use log::debug;

/// Below this the projected up vector is treated as parallel to the boresight
const PARALLEL_TOLERANCE: f64 = 1e-9;

/// Attitude whose boresight (column 0) looks from `position` at the body origin.
///
/// Body z is world z projected orthogonal to the boresight, or world y when
/// the two are parallel. A position at the origin yields the identity.
pub fn body_fixed_pointing_attitude(position: &Vec3) -> Attitude {
    let Some(boresight) = (-position).try_normalize(DIRECTION_EPS) else {
        return Attitude::identity();
    };

    let mut up = Vec3::z() - boresight * boresight.z;
    if up.norm() < PARALLEL_TOLERANCE {
        up = Vec3::y() - boresight * boresight.y;
    }
    let up = up.normalize();
    let side = up.cross(&boresight);

    Attitude::from_columns(&[boresight, side, up])
}

/// Kinematic planner: fly to the least explored direction
#[derive(Clone, Debug, PartialEq)]
pub struct ExplorationController {
    standoff_distance: f64,
    min_altitude: f64,
    time_step: f64,
    /// Radius of a sphere about the origin that encloses the whole body
    keep_out_radius: f64,
}

impl Default for ExplorationController {
    fn default() -> Self {
        ExplorationController {
            standoff_distance: 1.5,
            min_altitude: 0.2,
            time_step: 1.0,
            keep_out_radius: 0.0,
        }
    }
}

impl ExplorationController {
    pub fn new(standoff_distance: f64, min_altitude: f64, time_step: f64) -> Self {
        ExplorationController {
            standoff_distance,
            min_altitude,
            time_step,
            keep_out_radius: 0.0,
        }
    }

    /// Never plan a pose closer than `radius + min_altitude` to the origin
    pub fn with_keep_out_radius(mut self, radius: f64) -> Self {
        self.keep_out_radius = radius.max(0.0);
        self
    }

    pub fn keep_out_radius(&self) -> f64 {
        self.keep_out_radius
    }

    /// Smallest range from the origin at which a pose is planned
    pub fn safe_range(&self) -> f64 {
        self.standoff_distance.max(self.keep_out_radius + self.min_altitude)
    }

    /// `position` pushed radially out to [`Self::safe_range`] when it is
    /// closer than `keep_out_radius + min_altitude` to the origin; a
    /// position at the origin is moved along +x.
    pub fn clear_of_body(&self, position: &Vec3) -> Vec3 {
        let floor = self.keep_out_radius + self.min_altitude;
        if position.norm() >= floor {
            return *position;
        }
        let direction = position.try_normalize(DIRECTION_EPS).unwrap_or_else(Vec3::x);
        direction * self.safe_range()
    }

    /// Vertex with the largest remaining weight, lowest index on ties.
    /// Vertices at the origin carry no direction and are skipped.
    pub fn most_uncertain_vertex(&self, rmesh: &ReconstructMesh) -> Option<VertexId> {
        let mut best: Option<(VertexId, f64)> = None;
        for (i, &weight) in rmesh.weights().iter().enumerate() {
            let id = VertexId(i);
            if rmesh.radius(id).map_or(true, |r| r < DIRECTION_EPS) {
                continue;
            }
            if best.map_or(true, |(_, w)| weight > w) {
                best = Some((id, weight));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Next sensing pose.
    ///
    /// Places the spacecraft along the chosen vertex direction, looking back
    /// at the origin, at the largest of the standoff distance, the keep-out
    /// radius plus the altitude margin and the vertex radius plus the margin. Without a usable vertex the
    /// spacecraft holds position and only re-points.
    pub fn explore_asteroid(&self, current: &State, rmesh: &ReconstructMesh) -> State {
        let target = self.most_uncertain_vertex(rmesh).and_then(|id| {
            let vertex = rmesh.mesh().vertex(id)?;
            let radius = vertex.norm();
            Some((id, vertex / radius, radius))
        });

        let pos = match target {
            Some((id, direction, radius)) => {
                let range = self.safe_range().max(radius + self.min_altitude);
                debug!(
                    "Planning toward vertex {} (weight {:.4}) at range {:.3}",
                    id.0,
                    rmesh.weights()[id.0],
                    range
                );
                direction * range
            }
            None => current.pos,
        };

        State::new(
            pos,
            (pos - current.pos) / self.time_step,
            body_fixed_pointing_attitude(&pos),
            Vec3::zeros(),
        )
    }
}
