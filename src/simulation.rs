//! Exploration loop
//!
//! ```text
//! Initializing ──► Exploring ──► Converged
//!                     │
//!                     └────────► Halted (iteration cap)
//! ```
//!
//! Each iteration runs strictly in order: define targets, cast, update the
//! reconstruction, replan, commit the new pose, record. Nothing in the loop
//! is random, so identical inputs reproduce the same trajectory and mesh.

use crate::config::{ScanMode, SimConfig};
use crate::controller::{body_fixed_pointing_attitude, ExplorationController};
use crate::error::{ExploreError, Result};
use crate::lidar::Lidar;
use crate::mesh::Mesh;
use crate::raycast::RayCaster;
use crate::reconstruct::ReconstructMesh;
use crate::storage::{
    PersistentLog, GROUP_INTERSECTIONS, GROUP_STATE, GROUP_TARGETS, GROUP_VERTICES, GROUP_WEIGHTS,
};
use crate::types::{State, Vec3, DIRECTION_EPS};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Loop state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    Exploring,
    /// Weight sum at or below the threshold
    Converged,
    /// Iteration cap reached first
    Halted,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Converged | Phase::Halted)
    }
}

/// End-of-run report written next to the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub body: String,
    pub started_at: String,
    pub iterations: usize,
    pub phase: Phase,
    pub total_weight: f64,
    pub misses: usize,
    pub max_angle: f64,
    pub final_state: State,
    /// Distance from reconstructed vertices to the true surface
    pub mean_surface_error: f64,
    pub max_surface_error: f64,
}

pub struct Simulation {
    caster: RayCaster,
    rmesh: ReconstructMesh,
    lidar: Lidar,
    controller: ExplorationController,
    scan: ScanMode,
    state: State,
    phase: Phase,
    iteration: usize,
    misses: usize,
    max_angle: f64,
    convergence_threshold: f64,
    max_iterations: usize,
}

impl Simulation {
    /// Validate the configuration, index the true shape and point the
    /// spacecraft at the body from its initial position.
    ///
    /// The simulation starts in [`Phase::Initializing`]; the first
    /// [`Simulation::step`] leaves it.
    pub fn new(truth: Mesh, estimate: Mesh, config: &SimConfig) -> Result<Self> {
        config.validate()?;
        if truth.is_empty() || estimate.is_empty() {
            return Err(ExploreError::EmptyMesh);
        }

        let max_angle = match config.max_angle {
            Some(angle) => angle,
            None => {
                let radius = estimate.mean_radius();
                if radius < DIRECTION_EPS {
                    return Err(ExploreError::InvalidConfiguration(
                        "initial estimate has zero characteristic radius".to_string(),
                    ));
                }
                config.sampling_resolution / radius
            }
        };

        info!(
            "Initializing: truth {} vertices / {} faces, estimate {} vertices, max_angle {:.4} rad",
            truth.vertex_count(),
            truth.face_count(),
            estimate.vertex_count(),
            max_angle
        );

        let controller = config
            .controller()
            .with_keep_out_radius(truth.bounding_radius());
        let caster = RayCaster::new(Arc::new(truth));
        let rmesh = ReconstructMesh::new(estimate, config.initial_weight)
            .with_weight_update(config.weight_update)
            .with_radius_gain(config.radius_gain);

        let requested = config.initial_position();
        let pos = controller.clear_of_body(&requested);
        if pos != requested {
            warn!(
                "Initial position [{:.3}, {:.3}, {:.3}] is within {:.3} of the body origin, raised to [{:.3}, {:.3}, {:.3}]",
                requested.x,
                requested.y,
                requested.z,
                controller.keep_out_radius(),
                pos.x,
                pos.y,
                pos.z
            );
        }
        let state = State::new(
            pos,
            Vec3::zeros(),
            body_fixed_pointing_attitude(&pos),
            Vec3::zeros(),
        );

        Ok(Simulation {
            caster,
            rmesh,
            lidar: config.lidar(),
            controller,
            scan: config.scan,
            state,
            phase: Phase::Initializing,
            iteration: 0,
            misses: 0,
            max_angle,
            convergence_threshold: config.convergence_threshold,
            max_iterations: config.max_iterations,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Completed iterations
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn reconstruction(&self) -> &ReconstructMesh {
        &self.rmesh
    }

    pub fn caster(&self) -> &RayCaster {
        &self.caster
    }

    pub fn max_angle(&self) -> f64 {
        self.max_angle
    }

    /// Rays that missed the body so far
    pub fn misses(&self) -> usize {
        self.misses
    }

    /// Run one iteration. A terminal phase is returned unchanged.
    ///
    /// Leaving `Initializing` goes straight to `Converged`, without a
    /// measurement, when the initial weights already meet the threshold.
    pub fn step(&mut self, log: &mut dyn PersistentLog) -> Result<Phase> {
        if self.phase == Phase::Initializing {
            let next = if self.rmesh.is_converged(self.convergence_threshold) {
                Phase::Converged
            } else {
                Phase::Exploring
            };
            info!("Phase {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
        if self.phase.is_terminal() {
            return Ok(self.phase);
        }

        let sensing = self.state.clone();
        let targets = match self.scan {
            ScanMode::Single => vec![self.lidar.define_target(
                &sensing.pos,
                &sensing.att,
                self.lidar.look_distance(),
            )],
            ScanMode::Grid => self.lidar.define_targets(&sensing.pos, &sensing.att),
        };

        let hits = match self.scan {
            ScanMode::Single => match self.caster.cast_ray(&sensing.pos, &targets[0]) {
                Ok(point) => vec![Some(point)],
                Err(e) if e.is_recoverable() => vec![None],
                Err(e) => return Err(e),
            },
            ScanMode::Grid => self.caster.cast_ray_batch(&sensing.pos, &targets)?,
        };

        let mut intersections = Vec::with_capacity(hits.len());
        for hit in &hits {
            match hit {
                Some(point) => {
                    self.rmesh.single_update(point, self.max_angle)?;
                    intersections.push(*point);
                }
                None => self.misses += 1,
            }
        }
        if intersections.len() < hits.len() {
            warn!(
                "Iteration {}: {} of {} rays missed the body",
                self.iteration,
                hits.len() - intersections.len(),
                hits.len()
            );
        }

        self.state = self.controller.explore_asteroid(&self.state, &self.rmesh);

        self.record(log, &sensing, &targets, &intersections)?;
        self.iteration += 1;

        let total = self.rmesh.total_weight();
        debug!(
            "Iteration {}: {} hits, total weight {:.6}",
            self.iteration,
            intersections.len(),
            total
        );

        if total <= self.convergence_threshold {
            self.phase = Phase::Converged;
            info!(
                "Converged after {} iterations (total weight {:.3e})",
                self.iteration, total
            );
        } else if self.iteration >= self.max_iterations {
            self.phase = Phase::Halted;
            warn!(
                "Halted at the iteration cap {} with total weight {:.4}",
                self.max_iterations, total
            );
        }
        Ok(self.phase)
    }

    /// Step until a terminal phase
    pub fn run(&mut self, log: &mut dyn PersistentLog) -> Result<Phase> {
        while !self.phase.is_terminal() {
            self.step(log)?;
        }
        Ok(self.phase)
    }

    fn record(
        &self,
        log: &mut dyn PersistentLog,
        sensing: &State,
        targets: &[Vec3],
        intersections: &[Vec3],
    ) -> Result<()> {
        let vertices = flatten(self.rmesh.mesh().vertices());
        let state = sensing.to_row();
        let targets = flatten(targets);
        let intersections = flatten(intersections);
        log.append_iteration(
            &self.iteration.to_string(),
            &[
                (GROUP_VERTICES, &vertices[..]),
                (GROUP_WEIGHTS, self.rmesh.weights()),
                (GROUP_STATE, &state[..]),
                (GROUP_TARGETS, &targets[..]),
                (GROUP_INTERSECTIONS, &intersections[..]),
            ],
        )
    }

    /// Summarize the run and measure the reconstruction against the truth
    pub fn summary(&self, body: &str, started_at: DateTime<Utc>) -> Result<RunSummary> {
        let mut errors = Vec::with_capacity(self.rmesh.mesh().vertex_count());
        for vertex in self.rmesh.mesh().vertices() {
            errors.push(self.caster.minimum_distance(vertex)?);
        }
        let mean = if errors.is_empty() {
            0.0
        } else {
            errors.iter().sum::<f64>() / errors.len() as f64
        };
        let max = errors.iter().copied().fold(0.0, f64::max);

        Ok(RunSummary {
            body: body.to_string(),
            started_at: started_at.to_rfc3339(),
            iterations: self.iteration,
            phase: self.phase,
            total_weight: self.rmesh.total_weight(),
            misses: self.misses,
            max_angle: self.max_angle,
            final_state: self.state.clone(),
            mean_surface_error: mean,
            max_surface_error: max,
        })
    }
}

fn flatten(points: &[Vec3]) -> Vec<f64> {
    points.iter().flat_map(|p| [p.x, p.y, p.z]).collect()
}
