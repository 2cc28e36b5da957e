//! Asteroid shape reconstruction from simulated lidar exploration.
//!
//! A spacecraft circles a body whose true shape is known only to the
//! simulator. Each iteration casts lidar rays at the true mesh, folds the
//! hits into a coarse star-shaped estimate and flies toward the direction
//! that is still least certain, until the remaining weight drops below a
//! threshold.

pub mod config;
pub mod controller;
pub mod error;
pub mod lidar;
pub mod mesh;
pub mod raycast;
pub mod reconstruct;
pub mod simulation;
pub mod spatial;
pub mod storage;
pub mod types;

pub use config::{Body, ScanMode, SimConfig};
pub use error::{ExploreError, Result};
pub use mesh::Mesh;
pub use simulation::{Phase, RunSummary, Simulation};
pub use types::{Attitude, State, Vec3};
