//! End-to-end runs of the exploration loop

use asteroid_explore::config::ScanMode;
use asteroid_explore::mesh::{icosahedron, unit_cube, write_obj};
use asteroid_explore::reconstruct::WeightUpdate;
use asteroid_explore::storage::{
    read_log, JsonLinesLog, MemoryLog, GROUP_INTERSECTIONS, GROUP_STATE, GROUP_TARGETS,
    GROUP_VERTICES, GROUP_WEIGHTS,
};
use asteroid_explore::types::STATE_DIM;
use asteroid_explore::{Body, Phase, SimConfig, Simulation, Vec3};
use std::collections::BTreeSet;

/// Samples zero a vertex outright; the cone only reaches the vertex it is aimed at
fn zeroing_config() -> SimConfig {
    SimConfig {
        weight_update: WeightUpdate::Scale(0.0),
        max_angle: Some(0.1),
        convergence_threshold: 1e-9,
        max_iterations: 200,
        ..SimConfig::default()
    }
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("asteroid_explore_it_{}_{}", std::process::id(), name))
}

#[test]
fn test_icosahedron_estimate_converges() {
    let estimate = icosahedron().scaled(0.8);
    let mut sim = Simulation::new(unit_cube(), estimate, &zeroing_config()).unwrap();
    let mut log = MemoryLog::new();

    let phase = sim.run(&mut log).unwrap();

    assert_eq!(phase, Phase::Converged);
    assert_eq!(sim.reconstruction().total_weight(), 0.0);
    // the first look along +x lands between vertices, then one vertex per iteration
    assert_eq!(sim.iteration(), 13);
    assert_eq!(sim.misses(), 0);
    assert_eq!(log.group_len(GROUP_STATE), 13);
}

#[test]
fn test_body_larger_than_standoff_converges() {
    // the cube reaches past both the 1.5 standoff and the unit estimate
    let truth = unit_cube().scaled(3.0);
    let floor = truth.bounding_radius() + SimConfig::default().min_altitude;
    let mut sim = Simulation::new(truth, icosahedron(), &zeroing_config()).unwrap();
    let mut log = MemoryLog::new();

    let phase = sim.run(&mut log).unwrap();

    assert_eq!(phase, Phase::Converged);
    assert_eq!(sim.iteration(), 13);
    assert_eq!(sim.misses(), 0);
    for key in 0..sim.iteration() {
        let row = log.get(GROUP_STATE, &key.to_string()).unwrap();
        let pos = Vec3::new(row[0], row[1], row[2]);
        assert!(pos.norm() >= floor - 1e-9, "iteration {} at {}", key, pos.norm());
    }
    for v in sim.reconstruction().mesh().vertices() {
        assert!(v.norm() >= 1.5 - 1e-9);
        assert!(sim.caster().minimum_distance(v).unwrap() < 1e-9);
    }
}

#[test]
fn test_eros_converges_with_defaults() {
    let config = SimConfig::default();
    let truth = Body::Eros.true_shape().unwrap();
    let estimate = config.initial_estimate(&Body::Eros.axes()).unwrap();
    let floor = truth.bounding_radius() + config.min_altitude;
    let mut sim = Simulation::new(truth, estimate, &config).unwrap();
    // the default start at 1.5 is deep inside the body
    assert!(sim.state().pos.norm() >= floor - 1e-9);

    let mut log = MemoryLog::new();
    let phase = sim.run(&mut log).unwrap();

    assert_eq!(phase, Phase::Converged);
    assert!(sim.reconstruction().total_weight() <= config.convergence_threshold);
    assert_eq!(sim.misses(), 0);
    assert!(sim.state().pos.norm() >= floor - 1e-9);
    let summary = sim.summary(Body::Eros.name(), chrono::Utc::now()).unwrap();
    assert!(summary.max_surface_error < 1e-6, "{}", summary.max_surface_error);
}

#[test]
fn test_runs_are_deterministic() {
    let config = SimConfig {
        scan: ScanMode::Grid,
        num_steps: 3,
        field_of_view: 0.3,
        max_iterations: 25,
        ..SimConfig::default()
    };
    let truth = Body::Sphere.true_shape().unwrap();
    let estimate = config.initial_estimate(&Body::Sphere.axes()).unwrap();

    let run = || {
        let mut sim = Simulation::new(truth.clone(), estimate.clone(), &config).unwrap();
        let mut log = MemoryLog::new();
        let phase = sim.run(&mut log).unwrap();
        (
            phase,
            sim.iteration(),
            sim.state().clone(),
            sim.reconstruction().mesh().clone(),
            sim.reconstruction().weights().to_vec(),
            log,
        )
    };

    let first = run();
    let second = run();
    assert_eq!(first.0, second.0);
    assert_eq!(first.1, second.1);
    assert_eq!(first.2, second.2);
    assert_eq!(first.3, second.3);
    assert_eq!(first.4, second.4);
    assert_eq!(first.5, second.5);
}

#[test]
fn test_loop_terminates_at_iteration_cap() {
    let config = SimConfig {
        weight_update: WeightUpdate::Scale(1.0),
        max_iterations: 7,
        ..SimConfig::default()
    };
    let mut sim = Simulation::new(unit_cube(), icosahedron(), &config).unwrap();
    let phase = sim.run(&mut MemoryLog::new()).unwrap();
    assert_eq!(phase, Phase::Halted);
    assert_eq!(sim.iteration(), 7);
    assert!(sim.state().is_finite());
}

#[test]
fn test_weights_never_increase() {
    let config = SimConfig {
        weight_update: WeightUpdate::Subtract(0.3),
        max_angle: Some(0.6),
        max_iterations: 40,
        ..SimConfig::default()
    };
    let mut sim = Simulation::new(unit_cube(), icosahedron(), &config).unwrap();
    let mut log = MemoryLog::new();
    let mut previous = sim.reconstruction().weights().to_vec();
    while !sim.step(&mut log).unwrap().is_terminal() {
        let current = sim.reconstruction().weights();
        for (before, after) in previous.iter().zip(current) {
            assert!(after <= before);
            assert!(*after >= 0.0);
        }
        previous = current.to_vec();
    }
}

#[test]
fn test_log_is_a_valid_prefix() {
    let path = temp_path("prefix.jsonl");
    let config = SimConfig {
        max_iterations: 6,
        weight_update: WeightUpdate::Scale(0.5),
        ..zeroing_config()
    };
    let mut sim = Simulation::new(unit_cube(), icosahedron(), &config).unwrap();
    {
        let mut log = JsonLinesLog::create(&path).unwrap();
        sim.run(&mut log).unwrap();
    }
    let records = read_log(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let groups = [
        GROUP_VERTICES,
        GROUP_WEIGHTS,
        GROUP_STATE,
        GROUP_TARGETS,
        GROUP_INTERSECTIONS,
    ];
    assert_eq!(records.len(), groups.len() * sim.iteration());

    for group in groups {
        let keys: BTreeSet<usize> = records
            .iter()
            .filter(|r| r.group == group)
            .map(|r| r.key.parse().unwrap())
            .collect();
        assert_eq!(keys, (0..sim.iteration()).collect::<BTreeSet<_>>(), "{}", group);
    }
    for record in &records {
        match record.group.as_str() {
            GROUP_STATE => assert_eq!(record.values.len(), STATE_DIM),
            GROUP_WEIGHTS => assert_eq!(record.values.len(), 12),
            GROUP_VERTICES => assert_eq!(record.values.len(), 36),
            _ => assert_eq!(record.values.len() % 3, 0),
        }
    }
}

#[test]
fn test_loaded_shape_matches_synthesized() {
    let path = temp_path("cube.obj");
    write_obj(&unit_cube(), &path).unwrap();
    let loaded = asteroid_explore::mesh::load_obj(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let mut from_file = Simulation::new(loaded, icosahedron(), &zeroing_config()).unwrap();
    let mut synthesized =
        Simulation::new(Body::Cube.true_shape().unwrap(), icosahedron(), &zeroing_config()).unwrap();
    let mut log_a = MemoryLog::new();
    let mut log_b = MemoryLog::new();
    assert_eq!(from_file.run(&mut log_a).unwrap(), Phase::Converged);
    assert_eq!(synthesized.run(&mut log_b).unwrap(), Phase::Converged);
    assert_eq!(log_a, log_b);
}
