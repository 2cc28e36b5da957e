use anyhow::{bail, Context, Result};
use asteroid_explore::mesh::{load_obj, write_obj};
use asteroid_explore::storage::JsonLinesLog;
use asteroid_explore::{Body, Phase, SimConfig, Simulation};
use chrono::Utc;
use clap::Parser;
use log::info;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "explore")]
#[command(about = "Kinematic asteroid exploration with shape reconstruction", long_about = None)]
struct Args {
    /// Output log path (JSON lines); mesh and summary are written alongside
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Target body: castalia, itokawa, eros, sphere or cube
    #[arg(short = 'n', long = "name")]
    name: Body,

    /// True shape as a Wavefront OBJ file (synthesized from the body when absent)
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// JSON configuration overriding the defaults
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // help and usage errors both exit with status 1
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    let started_at = Utc::now();
    println!("[{}] Asteroid exploration starting", ts_now());
    println!("  Body:   {}", args.name);
    println!("  Output: {}", args.output.display());

    let config = match &args.config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => SimConfig::default(),
    };
    config.validate()?;

    let truth = match &args.input {
        Some(path) => load_obj(path).with_context(|| format!("loading shape {}", path.display()))?,
        None => args.name.true_shape()?,
    };
    let estimate = config.initial_estimate(&args.name.axes())?;

    let mut sim = Simulation::new(truth, estimate, &config)?;
    let mut log = JsonLinesLog::create(&args.output)
        .with_context(|| format!("creating log {}", args.output.display()))?;
    let phase = sim.run(&mut log)?;
    drop(log);

    let mesh_path = with_suffix(&args.output, ".obj");
    write_obj(sim.reconstruction().mesh(), &mesh_path)?;

    let summary = sim.summary(args.name.name(), started_at)?;
    let summary_path = with_suffix(&args.output, ".summary.json");
    std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;
    info!("Wrote {} and {}", mesh_path.display(), summary_path.display());

    println!(
        "[{}] {:?} after {} iterations (total weight {:.4}, {} misses)",
        ts_now(),
        summary.phase,
        summary.iterations,
        summary.total_weight,
        summary.misses
    );
    println!(
        "  Surface error: mean {:.5}, max {:.5}",
        summary.mean_surface_error, summary.max_surface_error
    );

    if phase != Phase::Converged {
        bail!(
            "exploration stopped at {} iterations without converging",
            summary.iterations
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_flags() {
        assert!(Args::try_parse_from(["explore", "-n", "castalia"]).is_err());
        assert!(Args::try_parse_from(["explore", "-o", "run.jsonl"]).is_err());
        assert!(Args::try_parse_from(["explore", "-o", "run.jsonl", "-n", "pluto"]).is_err());

        let args = Args::try_parse_from(["explore", "-o", "run.jsonl", "-n", "Eros"]).unwrap();
        assert_eq!(args.name, Body::Eros);
        assert!(args.input.is_none());
    }

    #[test]
    fn test_help_is_an_error() {
        let err = Args::try_parse_from(["explore", "-h"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_output_suffixes() {
        let base = Path::new("/tmp/run.jsonl");
        assert_eq!(with_suffix(base, ".obj"), PathBuf::from("/tmp/run.jsonl.obj"));
    }
}
