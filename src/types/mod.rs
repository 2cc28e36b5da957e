pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// Kinematic state of the spacecraft in the body-fixed frame.
///
/// Owned by the simulation loop; planners return a new value instead of
/// mutating the committed one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub pos: Vec3,
    pub vel: Vec3,
    /// Body to world rotation, boresight in column 0
    pub att: Attitude,
    pub ang_vel: Vec3,
}

impl State {
    pub fn new(pos: Vec3, vel: Vec3, att: Attitude, ang_vel: Vec3) -> Self {
        State {
            pos,
            vel,
            att,
            ang_vel,
        }
    }

    /// Stationary state at `pos` with identity attitude
    pub fn at_rest(pos: Vec3) -> Self {
        State::new(pos, Vec3::zeros(), Attitude::identity(), Vec3::zeros())
    }

    /// Sensor boresight expressed in the world frame
    pub fn boresight(&self) -> Vec3 {
        self.att.column(0).into_owned()
    }

    /// Flatten as `[pos, vel, att (row-major), ang_vel]`
    pub fn to_row(&self) -> [f64; STATE_DIM] {
        let mut row = [0.0; STATE_DIM];
        row[0..3].copy_from_slice(self.pos.as_slice());
        row[3..6].copy_from_slice(self.vel.as_slice());
        for r in 0..3 {
            for c in 0..3 {
                row[6 + 3 * r + c] = self.att[(r, c)];
            }
        }
        row[15..18].copy_from_slice(self.ang_vel.as_slice());
        row
    }

    /// True when every component is finite
    pub fn is_finite(&self) -> bool {
        self.to_row().iter().all(|v| v.is_finite())
    }
}

impl Default for State {
    fn default() -> Self {
        State::at_rest(Vec3::zeros())
    }
}
