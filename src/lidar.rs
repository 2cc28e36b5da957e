//! Lidar sensor model
//!
//! Produces target points for the ray caster. A single boresight ray is the
//! default; `define_targets` spreads an `n × n` grid across the field of view.

use crate::types::{Attitude, Vec3};
use serde::{Deserialize, Serialize};

/// Where the boresight ray is aimed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointingMode {
    /// Target the body-fixed origin regardless of attitude
    #[default]
    BodyOrigin,
    /// Target `distance` along the attitude boresight (column 0)
    Boresight,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Lidar {
    look_distance: f64,
    num_steps: usize,
    field_of_view: f64,
    pointing: PointingMode,
}

impl Default for Lidar {
    fn default() -> Self {
        Lidar {
            look_distance: 5.0,
            num_steps: 1,
            field_of_view: 0.1,
            pointing: PointingMode::BodyOrigin,
        }
    }
}

impl Lidar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_look_distance(mut self, look_distance: f64) -> Self {
        self.look_distance = look_distance;
        self
    }

    pub fn with_num_steps(mut self, num_steps: usize) -> Self {
        self.num_steps = num_steps;
        self
    }

    /// Full cone angle of the scan grid in radians
    pub fn with_field_of_view(mut self, field_of_view: f64) -> Self {
        self.field_of_view = field_of_view;
        self
    }

    pub fn with_pointing(mut self, pointing: PointingMode) -> Self {
        self.pointing = pointing;
        self
    }

    pub fn look_distance(&self) -> f64 {
        self.look_distance
    }

    /// Single boresight target seen from `position` with attitude `attitude`
    pub fn define_target(&self, position: &Vec3, attitude: &Attitude, distance: f64) -> Vec3 {
        match self.pointing {
            PointingMode::BodyOrigin => Vec3::zeros(),
            PointingMode::Boresight => position + attitude.column(0) * distance,
        }
    }

    /// Scan grid of `num_steps²` targets, row-major over (elevation, azimuth).
    ///
    /// Grid directions are built in the sensor frame as `x + tan(a)·y + tan(e)·z`
    /// with `a`, `e` spanning `[-fov/2, fov/2]`, then rotated by `attitude`.
    /// A single step degenerates to [`Lidar::define_target`].
    pub fn define_targets(&self, position: &Vec3, attitude: &Attitude) -> Vec<Vec3> {
        if self.num_steps <= 1 {
            return vec![self.define_target(position, attitude, self.look_distance)];
        }

        let half = self.field_of_view / 2.0;
        let step = self.field_of_view / (self.num_steps - 1) as f64;
        let angles: Vec<f64> = (0..self.num_steps).map(|i| -half + step * i as f64).collect();

        let mut targets = Vec::with_capacity(self.num_steps * self.num_steps);
        for elevation in &angles {
            for azimuth in &angles {
                let sensor_dir = Vec3::new(1.0, azimuth.tan(), elevation.tan()).normalize();
                targets.push(position + attitude * sensor_dir * self.look_distance);
            }
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::angle_between;
    use approx::assert_relative_eq;

    #[test]
    fn test_body_origin_target_ignores_attitude() {
        let lidar = Lidar::new();
        let pos = Vec3::new(1.5, 0.0, 0.0);
        let att = nalgebra::Rotation3::new(Vec3::z() * std::f64::consts::FRAC_PI_2).into_inner();
        assert_eq!(lidar.define_target(&pos, &att, 5.0), Vec3::zeros());
    }

    #[test]
    fn test_boresight_target_along_first_column() {
        let lidar = Lidar::new().with_pointing(PointingMode::Boresight);
        let pos = Vec3::new(2.0, 0.0, 0.0);
        let att = Attitude::from_columns(&[-Vec3::x(), -Vec3::y(), Vec3::z()]);
        let target = lidar.define_target(&pos, &att, 5.0);
        assert_relative_eq!(target, Vec3::new(-3.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_single_step_grid_is_boresight() {
        let lidar = Lidar::new().with_pointing(PointingMode::Boresight);
        let pos = Vec3::new(0.0, 3.0, 0.0);
        let att = Attitude::from_columns(&[-Vec3::y(), Vec3::x(), Vec3::z()]);
        let targets = lidar.define_targets(&pos, &att);
        assert_eq!(targets, vec![lidar.define_target(&pos, &att, 5.0)]);
    }

    #[test]
    fn test_grid_size_and_spread() {
        let lidar = Lidar::new().with_num_steps(5).with_field_of_view(0.2);
        let pos = Vec3::new(4.0, 0.0, 0.0);
        let att = Attitude::from_columns(&[-Vec3::x(), -Vec3::y(), Vec3::z()]);
        let targets = lidar.define_targets(&pos, &att);
        assert_eq!(targets.len(), 25);

        let boresight = -Vec3::x();
        for target in &targets {
            let ray = target - pos;
            assert_relative_eq!(ray.norm(), 5.0, epsilon = 1e-12);
            // corners sit at most fov/2 off-axis in each of two directions
            let off_axis = angle_between(&ray, &boresight).unwrap();
            assert!(off_axis <= 0.1 * std::f64::consts::SQRT_2 + 1e-9);
        }
        // centre of an odd grid is the boresight
        assert_relative_eq!(targets[12], pos + boresight * 5.0, epsilon = 1e-12);
    }
}
