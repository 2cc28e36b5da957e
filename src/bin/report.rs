use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use asteroid_explore::storage::{
    read_log, LogRecord, GROUP_INTERSECTIONS, GROUP_STATE, GROUP_TARGETS, GROUP_WEIGHTS,
};
use clap::Parser;
use serde_json::json;

#[derive(Parser, Debug)]
struct Args {
    /// Path to an exploration log (JSON lines)
    #[arg(long, conflicts_with = "dir")]
    log: Option<PathBuf>,

    /// Directory of logs to summarize (processes *.jsonl)
    #[arg(long)]
    dir: Option<PathBuf>,
}

/// Records of one group keyed by iteration index
fn by_iteration<'a>(records: &'a [LogRecord], group: &str) -> BTreeMap<usize, &'a [f64]> {
    records
        .iter()
        .filter(|r| r.group == group)
        .filter_map(|r| r.key.parse::<usize>().ok().map(|k| (k, r.values.as_slice())))
        .collect()
}

fn summarize(path: &Path) -> anyhow::Result<serde_json::Value> {
    let records = read_log(path)?;

    let states = by_iteration(&records, GROUP_STATE);
    let weights = by_iteration(&records, GROUP_WEIGHTS);
    let targets = by_iteration(&records, GROUP_TARGETS);
    let intersections = by_iteration(&records, GROUP_INTERSECTIONS);

    let total = |values: &[f64]| values.iter().sum::<f64>();
    let first_weight = weights.values().next().map(|w| total(w));
    let last_weight = weights.values().next_back().map(|w| total(w));

    let hits: usize = intersections.values().map(|v| v.len() / 3).sum();
    let rays: usize = targets.values().map(|v| v.len() / 3).sum();
    let iterations_with_misses = targets
        .iter()
        .filter(|(k, t)| intersections.get(k).map_or(0, |v| v.len()) < t.len())
        .count();

    // a gap in the keys means the log is not a clean prefix
    let contiguous = states.keys().copied().eq(0..states.len());
    let final_position = states
        .values()
        .next_back()
        .and_then(|s| s.get(0..3))
        .map(<[f64]>::to_vec);

    Ok(json!({
        "log": path.display().to_string(),
        "iterations": states.len(),
        "contiguous": contiguous,
        "first_total_weight": first_weight,
        "last_total_weight": last_weight,
        "rays": rays,
        "intersections": hits,
        "iterations_with_misses": iterations_with_misses,
        "final_position": final_position,
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let mut results = Vec::new();

    if let Some(dir) = args.dir.as_ref() {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().map_or(false, |e| e == "jsonl"))
            .collect();
        paths.sort();
        for path in paths {
            match summarize(&path) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(summarize(log)?);
    } else {
        anyhow::bail!("Provide --log or --dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use asteroid_explore::storage::{JsonLinesLog, PersistentLog, ITERATION_GROUPS};

    fn write_log(name: &str, state: &[f64]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "asteroid_explore_report_{}_{}.jsonl",
            std::process::id(),
            name
        ));
        let mut log = JsonLinesLog::create(&path).unwrap();
        let entries: Vec<(&str, &[f64])> = ITERATION_GROUPS
            .iter()
            .map(|group| match *group {
                GROUP_STATE => (*group, state),
                GROUP_TARGETS | GROUP_INTERSECTIONS => (*group, &[0.0, 0.0, 0.0][..]),
                _ => (*group, &[1.0][..]),
            })
            .collect();
        log.append_iteration("0", &entries).unwrap();
        path
    }

    #[test]
    fn test_summary_of_single_iteration() {
        let path = write_log("single", &[1.5, -2.0, 0.25, 0.0]);
        let summary = summarize(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(summary["iterations"], 1);
        assert_eq!(summary["contiguous"], true);
        assert_eq!(summary["rays"], 1);
        assert_eq!(summary["iterations_with_misses"], 0);
        assert_eq!(summary["final_position"], json!([1.5, -2.0, 0.25]));
    }

    #[test]
    fn test_short_state_row_has_no_position() {
        let path = write_log("short_state", &[1.5]);
        let summary = summarize(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(summary["iterations"], 1);
        assert!(summary["final_position"].is_null());
    }
}
