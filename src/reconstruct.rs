//! Incremental shape reconstruction under a fixed angular parameterization
//!
//! The estimate is a star-shaped mesh about the body origin. Each vertex owns
//! a fixed direction (inclination, azimuth); a lidar sample only changes the
//! radius of the vertices whose direction lies inside the acceptance cone
//! around the sample, and lowers their weight. Faces never change.

use crate::error::{ExploreError, Result};
use crate::mesh::{Mesh, VertexId};
use crate::types::{
    angle_between, cartesian_to_spherical, spherical_to_cartesian, Vec3, DIRECTION_EPS,
};
use log::debug;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Added to the squared chord radius so cone-edge vertices survive rounding
const CHORD_SLACK: f64 = 1e-12;

type Direction = GeomWithData<[f64; 3], VertexId>;

/// How a vertex weight drops when a sample lands in its cone
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightUpdate {
    /// `w ← w · factor`, factor in [0, 1]
    Scale(f64),
    /// `w ← max(w − step, 0)`
    Subtract(f64),
}

impl Default for WeightUpdate {
    fn default() -> Self {
        WeightUpdate::Scale(0.1)
    }
}

impl WeightUpdate {
    pub fn apply(&self, weight: f64) -> f64 {
        match *self {
            WeightUpdate::Scale(factor) => (weight * factor).max(0.0),
            WeightUpdate::Subtract(step) => (weight - step).max(0.0),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            WeightUpdate::Scale(factor) if !(0.0..=1.0).contains(&factor) => {
                Err(ExploreError::InvalidConfiguration(format!(
                    "weight scale factor must lie in [0, 1], got {}",
                    factor
                )))
            }
            WeightUpdate::Subtract(step) if !(step >= 0.0) => {
                Err(ExploreError::InvalidConfiguration(format!(
                    "weight subtract step must be non-negative, got {}",
                    step
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Shape estimate plus per-vertex confidence weights
pub struct ReconstructMesh {
    mesh: Mesh,
    weights: Vec<f64>,
    /// (radius, inclination, azimuth) per vertex; angles are fixed
    spherical: Vec<Vec3>,
    /// Unit direction of every vertex with non-zero radius
    directions: RTree<Direction>,
    weight_update: WeightUpdate,
    radius_gain: f64,
}

impl ReconstructMesh {
    /// Wrap an initial estimate with uniform weights
    pub fn new(mesh: Mesh, initial_weight: f64) -> Self {
        let spherical: Vec<Vec3> = mesh.vertices().iter().map(cartesian_to_spherical).collect();
        let directions = spherical
            .iter()
            .enumerate()
            .filter(|(_, s)| s.x >= DIRECTION_EPS)
            .map(|(i, s)| {
                let unit = spherical_to_cartesian(&Vec3::new(1.0, s.y, s.z));
                GeomWithData::new([unit.x, unit.y, unit.z], VertexId(i))
            })
            .collect();

        ReconstructMesh {
            weights: vec![initial_weight; mesh.vertex_count()],
            spherical,
            directions: RTree::bulk_load(directions),
            mesh,
            weight_update: WeightUpdate::default(),
            radius_gain: 1.0,
        }
    }

    pub fn with_weight_update(mut self, weight_update: WeightUpdate) -> Self {
        self.weight_update = weight_update;
        self
    }

    /// Fraction of the radial error corrected per sample, in (0, 1]
    pub fn with_radius_gain(mut self, radius_gain: f64) -> Self {
        self.radius_gain = radius_gain;
        self
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn is_converged(&self, threshold: f64) -> bool {
        self.total_weight() <= threshold
    }

    /// Radius of a vertex from the body origin
    pub fn radius(&self, id: VertexId) -> Option<f64> {
        self.spherical.get(id.0).map(|s| s.x)
    }

    /// Fold one surface sample into the estimate.
    ///
    /// Every vertex within `max_angle` of the sample direction has its radius
    /// moved toward the sample radius and its weight lowered. Returns the
    /// updated vertices in index order; an empty result means the sample
    /// fell between vertices and changed nothing.
    pub fn single_update(&mut self, point: &Vec3, max_angle: f64) -> Result<Vec<VertexId>> {
        let sample = cartesian_to_spherical(point);
        if sample.x < DIRECTION_EPS {
            debug!("Sample at the body origin has no direction, skipped");
            return Ok(Vec::new());
        }
        let unit = point / sample.x;

        let chord = 2.0 * (max_angle.clamp(0.0, PI) / 2.0).sin();
        let mut in_cone: Vec<VertexId> = self
            .directions
            .locate_within_distance([unit.x, unit.y, unit.z], chord * chord + CHORD_SLACK)
            .filter(|entry| {
                angle_between(&Vec3::from(*entry.geom()), &unit)
                    .map_or(false, |angle| angle <= max_angle)
            })
            .map(|entry| entry.data)
            .collect();
        in_cone.sort();

        for &id in &in_cone {
            let current = self.spherical[id.0];
            let radius = current.x + self.radius_gain * (sample.x - current.x);
            let updated = Vec3::new(radius, current.y, current.z);
            self.mesh.set_vertex(id, spherical_to_cartesian(&updated))?;
            self.spherical[id.0] = updated;
            self.weights[id.0] = self.weight_update.apply(self.weights[id.0]);
        }

        debug!(
            "Sample r={:.4} updated {} vertices, total weight {:.4}",
            sample.x,
            in_cone.len(),
            self.total_weight()
        );
        Ok(in_cone)
    }
}
