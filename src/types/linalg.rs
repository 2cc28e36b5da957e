//! Linear algebra type system for the exploration harness
//!
//! Every geometric quantity lives in the body-fixed frame of the asteroid,
//! origin at the body reference point.

use nalgebra::{Matrix3, Vector3};

// ===== State Dimensions =====
pub const POSITION_DIM: usize = 3;
pub const ATTITUDE_DIM: usize = 9;
/// pos(3) + vel(3) + attitude(9, row-major) + ang_vel(3)
pub const STATE_DIM: usize = 2 * POSITION_DIM + ATTITUDE_DIM + POSITION_DIM;

/// Point or direction in the body-fixed frame
pub type Vec3 = Vector3<f64>;

/// Rotation taking body-frame vectors into the world frame.
/// Column 0 is the sensor boresight.
pub type Attitude = Matrix3<f64>;

/// Minimum norm treated as a usable direction
pub const DIRECTION_EPS: f64 = 1e-12;

/// Convert cartesian coordinates to (radius, inclination, azimuth)
///
/// Inclination is measured from +z in [0, π], azimuth from +x in (-π, π].
/// The origin maps to (0, 0, 0).
pub fn cartesian_to_spherical(point: &Vec3) -> Vec3 {
    let radius = point.norm();
    if radius < DIRECTION_EPS {
        return Vec3::zeros();
    }
    let inclination = (point.z / radius).clamp(-1.0, 1.0).acos();
    let azimuth = point.y.atan2(point.x);
    Vec3::new(radius, inclination, azimuth)
}

/// Inverse of [`cartesian_to_spherical`]
pub fn spherical_to_cartesian(spherical: &Vec3) -> Vec3 {
    let (radius, inclination, azimuth) = (spherical.x, spherical.y, spherical.z);
    Vec3::new(
        radius * inclination.sin() * azimuth.cos(),
        radius * inclination.sin() * azimuth.sin(),
        radius * inclination.cos(),
    )
}

/// Angle between two directions in [0, π], robust near 0 and π.
/// Returns `None` when either vector is degenerate.
pub fn angle_between(a: &Vec3, b: &Vec3) -> Option<f64> {
    if a.norm() < DIRECTION_EPS || b.norm() < DIRECTION_EPS {
        return None;
    }
    Some(a.cross(b).norm().atan2(a.dot(b)))
}
