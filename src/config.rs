//! Run configuration and the enumerated target bodies

use crate::controller::ExplorationController;
use crate::error::{ExploreError, Result};
use crate::lidar::{Lidar, PointingMode};
use crate::mesh::{ellipsoid_mesh, unit_cube, Mesh, MesherParams};
use crate::reconstruct::WeightUpdate;
use crate::types::Vec3;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Rays cast per iteration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// One boresight ray
    #[default]
    Single,
    /// `num_steps²` rays over the field of view, cast as a batch
    Grid,
}

/// Simulation parameters. Every field has a default, so a partial JSON
/// file only overrides what it names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // Sensor
    pub look_distance: f64,
    pub num_steps: usize,
    /// Radians
    pub field_of_view: f64,
    pub scan: ScanMode,
    pub pointing: PointingMode,

    // Trajectory
    pub initial_position: [f64; 3],
    pub standoff_distance: f64,
    pub min_altitude: f64,
    pub time_step: f64,

    // Reconstruction
    pub initial_weight: f64,
    pub weight_update: WeightUpdate,
    pub radius_gain: f64,
    /// Surface distance between samples, converted to an acceptance cone
    pub sampling_resolution: f64,
    /// Acceptance cone in radians; derived from `sampling_resolution` when unset
    pub max_angle: Option<f64>,

    // Termination
    pub convergence_threshold: f64,
    pub max_iterations: usize,

    // Initial estimate
    /// Length bounds are fractions of the body's largest semi-axis
    pub mesher: MesherParams,
    /// Estimate semi-axes relative to the body semi-axes
    pub estimate_scale: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            look_distance: 5.0,
            num_steps: 1,
            field_of_view: 0.1,
            scan: ScanMode::Single,
            pointing: PointingMode::BodyOrigin,
            initial_position: [1.5, 0.0, 0.0],
            standoff_distance: 1.5,
            min_altitude: 0.2,
            time_step: 1.0,
            initial_weight: 1.0,
            weight_update: WeightUpdate::default(),
            radius_gain: 1.0,
            sampling_resolution: 0.05,
            max_angle: None,
            convergence_threshold: 1e-2,
            max_iterations: 100_000,
            mesher: MesherParams {
                max_radius: 0.25,
                max_distance: 0.05,
                ..MesherParams::default()
            },
            estimate_scale: 0.75,
        }
    }
}

fn invalid(message: String) -> ExploreError {
    ExploreError::InvalidConfiguration(message)
}

fn ensure_positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(invalid(format!("{} must be positive, got {}", name, value)))
    }
}

impl SimConfig {
    /// Read a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExploreError::FileNotFound(path.to_path_buf()),
            _ => ExploreError::Io(e),
        })?;
        let config: SimConfig = serde_json::from_str(&content).map_err(|e| ExploreError::Parse {
            line: e.line(),
            message: e.to_string(),
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject parameter sets the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure_positive("look_distance", self.look_distance)?;
        ensure_positive("convergence_threshold", self.convergence_threshold)?;
        ensure_positive("standoff_distance", self.standoff_distance)?;
        ensure_positive("time_step", self.time_step)?;
        ensure_positive("initial_weight", self.initial_weight)?;
        ensure_positive("sampling_resolution", self.sampling_resolution)?;
        ensure_positive("estimate_scale", self.estimate_scale)?;
        if let Some(max_angle) = self.max_angle {
            ensure_positive("max_angle", max_angle)?;
        }

        if self.num_steps == 0 {
            return Err(invalid("num_steps must be at least 1".to_string()));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations must be at least 1".to_string()));
        }
        if !(self.field_of_view > 0.0 && self.field_of_view < std::f64::consts::PI) {
            return Err(invalid(format!(
                "field_of_view must lie in (0, pi), got {}",
                self.field_of_view
            )));
        }
        if !(self.radius_gain > 0.0 && self.radius_gain <= 1.0) {
            return Err(invalid(format!(
                "radius_gain must lie in (0, 1], got {}",
                self.radius_gain
            )));
        }
        if !(self.min_altitude >= 0.0) {
            return Err(invalid(format!(
                "min_altitude must be non-negative, got {}",
                self.min_altitude
            )));
        }
        if self.initial_position.iter().any(|v| !v.is_finite()) {
            return Err(invalid("initial_position must be finite".to_string()));
        }

        self.weight_update.validate()?;
        self.mesher.validate()?;
        Ok(())
    }

    pub fn initial_position(&self) -> Vec3 {
        Vec3::from(self.initial_position)
    }

    pub fn lidar(&self) -> Lidar {
        Lidar::new()
            .with_look_distance(self.look_distance)
            .with_num_steps(self.num_steps)
            .with_field_of_view(self.field_of_view)
            .with_pointing(self.pointing)
    }

    pub fn controller(&self) -> ExplorationController {
        ExplorationController::new(self.standoff_distance, self.min_altitude, self.time_step)
    }

    /// Coarse ellipsoid the reconstruction starts from, meshed to the same
    /// relative resolution whatever the body size
    pub fn initial_estimate(&self, body_axes: &Vec3) -> Result<Mesh> {
        ellipsoid_mesh(
            &(body_axes * self.estimate_scale),
            &self.mesher.scaled(body_axes.max()),
        )
    }
}

/// Bodies selectable by name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    Castalia,
    Itokawa,
    Eros,
    Sphere,
    Cube,
}

impl Body {
    pub const ALL: [Body; 5] = [
        Body::Castalia,
        Body::Itokawa,
        Body::Eros,
        Body::Sphere,
        Body::Cube,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Body::Castalia => "castalia",
            Body::Itokawa => "itokawa",
            Body::Eros => "eros",
            Body::Sphere => "sphere",
            Body::Cube => "cube",
        }
    }

    /// Semi-axes of the best-fit ellipsoid in km
    pub fn axes(&self) -> Vec3 {
        match self {
            Body::Castalia => Vec3::new(1.6130 / 2.0, 0.9810 / 2.0, 0.8260 / 2.0),
            Body::Itokawa => Vec3::new(0.535 / 2.0, 0.294 / 2.0, 0.209 / 2.0),
            Body::Eros => Vec3::new(34.4 / 2.0, 11.2 / 2.0, 11.2 / 2.0),
            Body::Sphere | Body::Cube => Vec3::new(0.5, 0.5, 0.5),
        }
    }

    /// Synthetic truth model when no shape file is given
    pub fn true_shape(&self) -> Result<Mesh> {
        match self {
            Body::Cube => Ok(unit_cube()),
            _ => {
                let axes = self.axes();
                let params = MesherParams {
                    max_radius: 0.05,
                    max_distance: 0.01,
                    ..MesherParams::default()
                };
                ellipsoid_mesh(&axes, &params.scaled(axes.max()))
            }
        }
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Body {
    type Err = ExploreError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Body::ALL
            .iter()
            .copied()
            .find(|body| body.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Body::ALL.iter().map(|b| b.name()).collect();
                invalid(format!(
                    "unknown body '{}', expected one of {}",
                    s,
                    names.join(", ")
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_position(), Vec3::new(1.5, 0.0, 0.0));
        assert_eq!(config.weight_update, WeightUpdate::Scale(0.1));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "look_distance": 8.0,
            "scan": "grid",
            "num_steps": 3,
            "weight_update": {"subtract": 0.25},
            "mesher": {"max_radius": 0.2}
        }"#;
        let config: SimConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.look_distance, 8.0);
        assert_eq!(config.scan, ScanMode::Grid);
        assert_eq!(config.weight_update, WeightUpdate::Subtract(0.25));
        assert_eq!(config.mesher.max_radius, 0.2);
        assert_eq!(config.mesher.min_angle, MesherParams::default().min_angle);
        assert_eq!(config.convergence_threshold, 1e-2);
        assert!(config.validate().is_ok());
    }

    fn rejects(mutate: impl FnOnce(&mut SimConfig)) -> bool {
        let mut config = SimConfig::default();
        mutate(&mut config);
        matches!(
            config.validate(),
            Err(ExploreError::InvalidConfiguration(_))
        )
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(rejects(|c| c.look_distance = 0.0));
        assert!(rejects(|c| c.look_distance = -1.0));
        assert!(rejects(|c| c.convergence_threshold = 0.0));
        assert!(rejects(|c| c.num_steps = 0));
        assert!(rejects(|c| c.field_of_view = 4.0));
        assert!(rejects(|c| c.radius_gain = 0.0));
        assert!(rejects(|c| c.weight_update = WeightUpdate::Scale(2.0)));
        assert!(rejects(|c| c.max_angle = Some(-0.1)));
        assert!(rejects(|c| c.max_iterations = 0));
        assert!(rejects(|c| c.time_step = 0.0));
        assert!(rejects(|c| c.initial_position = [f64::NAN, 0.0, 0.0]));
        assert!(rejects(|c| c.mesher.min_angle = 45.0));
    }

    #[test]
    fn test_body_names() {
        assert_eq!("castalia".parse::<Body>().unwrap(), Body::Castalia);
        assert_eq!("Itokawa".parse::<Body>().unwrap(), Body::Itokawa);
        assert_eq!(" EROS ".parse::<Body>().unwrap(), Body::Eros);
        for body in Body::ALL {
            assert_eq!(body.to_string().parse::<Body>().unwrap(), body);
        }
        let err = "bennu".parse::<Body>().unwrap_err();
        assert!(matches!(err, ExploreError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("castalia"));
    }

    #[test]
    fn test_true_shapes() {
        let cube = Body::Cube.true_shape().unwrap();
        assert_eq!((cube.vertex_count(), cube.face_count()), (8, 12));

        let itokawa = Body::Itokawa.true_shape().unwrap();
        let axes = Body::Itokawa.axes();
        for v in itokawa.vertices() {
            let level = (v.x / axes.x).powi(2) + (v.y / axes.y).powi(2) + (v.z / axes.z).powi(2);
            assert!((level - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_estimate_resolution_follows_body_size() {
        let config = SimConfig::default();
        let eros = config.initial_estimate(&Body::Eros.axes()).unwrap();
        let doubled = config.initial_estimate(&(Body::Eros.axes() * 2.0)).unwrap();
        assert_eq!(eros.vertex_count(), doubled.vertex_count());
        assert!(eros.vertex_count() > 12 && eros.vertex_count() <= 642);

        let itokawa = config.initial_estimate(&Body::Itokawa.axes()).unwrap();
        assert!(itokawa.vertex_count() <= 642);
        for v in eros.vertices() {
            let level = v
                .component_div(&(Body::Eros.axes() * config.estimate_scale))
                .norm_squared();
            assert!((level - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_missing_config_file() {
        let path = std::env::temp_dir().join("asteroid_explore_missing_config.json");
        assert!(matches!(
            SimConfig::load(&path),
            Err(ExploreError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_load_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "asteroid_explore_config_{}.json",
            std::process::id()
        ));
        let mut config = SimConfig::default();
        config.max_angle = Some(0.2);
        config.pointing = PointingMode::Boresight;
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = SimConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
