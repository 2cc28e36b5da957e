//! Append-only per-iteration records
//!
//! Every record is `(group, key, values)` with the iteration index as key.
//! A key is written at most once per group. One iteration is written as a
//! single buffer and flushed, and [`read_log`] drops a trailing iteration
//! that lacks any of [`ITERATION_GROUPS`], so an interrupted run reads back
//! as a prefix of complete iterations.

use crate::error::{ExploreError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

pub const GROUP_VERTICES: &str = "reconstructed_vertices";
pub const GROUP_WEIGHTS: &str = "reconstructed_weights";
pub const GROUP_STATE: &str = "state";
pub const GROUP_TARGETS: &str = "targets";
pub const GROUP_INTERSECTIONS: &str = "intersections";

/// Groups recorded for every iteration, in write order
pub const ITERATION_GROUPS: [&str; 5] = [
    GROUP_VERTICES,
    GROUP_WEIGHTS,
    GROUP_STATE,
    GROUP_TARGETS,
    GROUP_INTERSECTIONS,
];

/// Keyed numeric storage written once per iteration
pub trait PersistentLog {
    /// Store `values` under `group/key`. Fails if the pair already exists.
    fn append(&mut self, group: &str, key: &str, values: &[f64]) -> Result<()>;

    /// Make everything appended so far durable
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Store every `(group, values)` entry under `key` and flush.
    /// Nothing is stored when any of the pairs already exists.
    fn append_iteration(&mut self, key: &str, entries: &[(&str, &[f64])]) -> Result<()> {
        for (group, values) in entries {
            self.append(group, key, values)?;
        }
        self.flush()
    }
}

/// One line of a JSON-lines log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub group: String,
    pub key: String,
    pub values: Vec<f64>,
}

/// Tracks which `(group, key)` pairs have been written
#[derive(Debug, Default, Clone, PartialEq)]
struct KeyLedger(HashSet<(String, String)>);

impl KeyLedger {
    fn claim(&mut self, group: &str, key: &str) -> Result<()> {
        if self.0.insert((group.to_string(), key.to_string())) {
            Ok(())
        } else {
            Err(ExploreError::DuplicateLogKey {
                group: group.to_string(),
                key: key.to_string(),
            })
        }
    }

    /// Claim `key` in every group, or none of them
    fn claim_all<'a>(
        &mut self,
        groups: impl Iterator<Item = &'a str> + Clone,
        key: &str,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        for group in groups.clone() {
            if !seen.insert(group) || self.0.contains(&(group.to_string(), key.to_string())) {
                return Err(ExploreError::DuplicateLogKey {
                    group: group.to_string(),
                    key: key.to_string(),
                });
            }
        }
        for group in groups {
            self.0.insert((group.to_string(), key.to_string()));
        }
        Ok(())
    }
}

/// Log backed by any writer, one JSON object per line
pub struct JsonLinesLog<W: Write> {
    writer: W,
    keys: KeyLedger,
    records: usize,
}

impl JsonLinesLog<BufWriter<File>> {
    /// Create (or truncate) the log file at `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Ok(JsonLinesLog::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesLog<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesLog {
            writer,
            keys: KeyLedger::default(),
            records: 0,
        }
    }

    /// Records written so far
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> PersistentLog for JsonLinesLog<W> {
    fn append(&mut self, group: &str, key: &str, values: &[f64]) -> Result<()> {
        self.keys.claim(group, key)?;
        let record = LogRecord {
            group: group.to_string(),
            key: key.to_string(),
            values: values.to_vec(),
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn append_iteration(&mut self, key: &str, entries: &[(&str, &[f64])]) -> Result<()> {
        let mut buffer = Vec::new();
        for (group, values) in entries {
            let record = LogRecord {
                group: group.to_string(),
                key: key.to_string(),
                values: values.to_vec(),
            };
            serde_json::to_writer(&mut buffer, &record)?;
            buffer.push(b'\n');
        }
        self.keys.claim_all(entries.iter().map(|(group, _)| *group), key)?;
        self.writer.write_all(&buffer)?;
        self.writer.flush()?;
        self.records += entries.len();
        Ok(())
    }
}

/// In-memory log, ordered by group then key
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemoryLog {
    groups: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
    keys: KeyLedger,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, group: &str, key: &str) -> Option<&[f64]> {
        self.groups.get(group)?.get(key).map(Vec::as_slice)
    }

    /// Number of keys stored in `group`
    pub fn group_len(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, BTreeMap::len)
    }
}

impl PersistentLog for MemoryLog {
    fn append(&mut self, group: &str, key: &str, values: &[f64]) -> Result<()> {
        self.keys.claim(group, key)?;
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(key.to_string(), values.to_vec());
        Ok(())
    }

    fn append_iteration(&mut self, key: &str, entries: &[(&str, &[f64])]) -> Result<()> {
        self.keys.claim_all(entries.iter().map(|(group, _)| *group), key)?;
        for (group, values) in entries {
            self.groups
                .entry(group.to_string())
                .or_default()
                .insert(key.to_string(), values.to_vec());
        }
        Ok(())
    }
}

/// Read an exploration log back as a prefix of complete iterations.
///
/// Records are read as by [`read_records`]. When the final key carries only
/// some of the [`ITERATION_GROUPS`], the run was interrupted mid-iteration
/// and those records are dropped with a warning.
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<LogRecord>> {
    let path = path.as_ref();
    let mut records = read_records(path)?;
    let partial = incomplete_tail(&records);
    if partial > 0 {
        let key = &records[records.len() - 1].key;
        warn!(
            "Dropping {} records of unfinished iteration {} in {}",
            partial,
            key,
            path.display()
        );
        records.truncate(records.len() - partial);
    }
    Ok(records)
}

/// Length of the trailing run of iteration records that share a key but do
/// not cover every iteration group. Records of other groups end the run.
fn incomplete_tail(records: &[LogRecord]) -> usize {
    let Some(last) = records.last() else {
        return 0;
    };
    let tail: Vec<&LogRecord> = records
        .iter()
        .rev()
        .take_while(|r| r.key == last.key && ITERATION_GROUPS.contains(&r.group.as_str()))
        .collect();
    let complete = ITERATION_GROUPS
        .iter()
        .all(|group| tail.iter().any(|r| r.group == *group));
    if complete {
        0
    } else {
        tail.len()
    }
}

/// Read every record of a JSON-lines log.
///
/// A final line without a terminating newline is the trace of an interrupted
/// write and is dropped with a warning; any other malformed line is an error.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<LogRecord>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ExploreError::FileNotFound(path.to_path_buf()),
        _ => ExploreError::Io(e),
    })?;
    let mut reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut line = String::new();
    let mut line_number = 0;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        line_number += 1;
        let complete = line.ends_with('\n');
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str::<LogRecord>(text) {
            Ok(record) => records.push(record),
            Err(e) if !complete => {
                warn!(
                    "Dropping truncated record on line {} of {}: {}",
                    line_number,
                    path.display(),
                    e
                );
            }
            Err(e) => {
                return Err(ExploreError::Parse {
                    line: line_number,
                    message: e.to_string(),
                })
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("asteroid_explore_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut log = MemoryLog::new();
        log.append(GROUP_WEIGHTS, "0", &[1.0, 2.0]).unwrap();
        log.append(GROUP_STATE, "0", &[0.0]).unwrap();
        let err = log.append(GROUP_WEIGHTS, "0", &[3.0]).unwrap_err();
        assert!(matches!(err, ExploreError::DuplicateLogKey { .. }));
        // original value kept
        assert_eq!(log.get(GROUP_WEIGHTS, "0"), Some(&[1.0, 2.0][..]));
        assert_eq!(log.group_len(GROUP_WEIGHTS), 1);
    }

    #[test]
    fn test_json_lines_format() {
        let mut log = JsonLinesLog::new(Vec::new());
        log.append(GROUP_TARGETS, "0", &[0.0, 0.5, -1.25]).unwrap();
        log.append(GROUP_TARGETS, "1", &[]).unwrap();
        assert!(log.append(GROUP_TARGETS, "1", &[]).is_err());
        assert_eq!(log.len(), 2);

        let bytes = log.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: LogRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.group, GROUP_TARGETS);
        assert_eq!(first.values, vec![0.0, 0.5, -1.25]);
    }

    fn iteration_entries<'a>(values: &'a [f64]) -> Vec<(&'static str, &'a [f64])> {
        ITERATION_GROUPS.iter().map(|group| (*group, values)).collect()
    }

    #[test]
    fn test_file_round_trip() {
        let path = temp_path("log_round_trip.jsonl");
        {
            let mut log = JsonLinesLog::create(&path).unwrap();
            log.append_iteration("0", &iteration_entries(&[1.5, 0.0, 0.0]))
                .unwrap();
            log.append_iteration("1", &iteration_entries(&[0.5, 0.0, 0.0]))
                .unwrap();
            assert_eq!(log.len(), 10);
        }
        let records = read_log(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(records.len(), 10);
        assert_eq!(records[4].group, GROUP_INTERSECTIONS);
        assert_eq!(records[5].group, GROUP_VERTICES);
        assert_eq!(records[9].key, "1");
        assert_eq!(records[9].values, vec![0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_iteration_with_taken_key_writes_nothing() {
        let mut log = JsonLinesLog::new(Vec::new());
        log.append(GROUP_STATE, "3", &[0.0]).unwrap();
        let err = log
            .append_iteration("3", &iteration_entries(&[1.0]))
            .unwrap_err();
        assert!(matches!(err, ExploreError::DuplicateLogKey { .. }));
        assert_eq!(log.len(), 1);
        let text = String::from_utf8(log.into_inner().unwrap()).unwrap();
        assert_eq!(text.lines().count(), 1);

        let mut memory = MemoryLog::new();
        memory.append(GROUP_TARGETS, "3", &[]).unwrap();
        assert!(memory.append_iteration("3", &iteration_entries(&[1.0])).is_err());
        assert_eq!(memory.group_len(GROUP_VERTICES), 0);
        // repeated group within one iteration
        assert!(memory
            .append_iteration("4", &[(GROUP_STATE, &[1.0][..]), (GROUP_STATE, &[2.0][..])])
            .is_err());
        assert_eq!(memory.group_len(GROUP_STATE), 0);
    }

    #[test]
    fn test_unfinished_iteration_is_dropped() {
        let path = temp_path("log_unfinished.jsonl");
        {
            let mut log = JsonLinesLog::create(&path).unwrap();
            log.append_iteration("0", &iteration_entries(&[1.0, 2.0, 3.0]))
                .unwrap();
            log.append(GROUP_VERTICES, "1", &[4.0, 5.0, 6.0]).unwrap();
            log.append(GROUP_WEIGHTS, "1", &[1.0]).unwrap();
            log.flush().unwrap();
        }
        let all = read_records(&path).unwrap();
        let complete = read_log(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(all.len(), 7);
        assert_eq!(complete.len(), 5);
        assert!(complete.iter().all(|r| r.key == "0"));
    }

    #[test]
    fn test_crash_after_large_record_leaves_no_partial_iteration() {
        let path = temp_path("log_crash.jsonl");
        let mut log = JsonLinesLog::create(&path).unwrap();
        log.append(GROUP_VERTICES, "0", &vec![0.25; 1926]).unwrap();
        log.append(GROUP_WEIGHTS, "0", &vec![1.0; 4000]).unwrap();
        // the process dies before the buffered tail reaches the file
        std::mem::forget(log);

        assert!(!read_records(&path).unwrap().is_empty());
        let records = read_log(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(records.is_empty());
    }

    #[test]
    fn test_foreign_groups_are_kept() {
        let path = temp_path("log_foreign.jsonl");
        std::fs::write(
            &path,
            "{\"group\":\"state\",\"key\":\"0\",\"values\":[1.0]}\n{\"group\":\"notes\",\"key\":\"0\",\"values\":[]}\n",
        )
        .unwrap();
        let records = read_log(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_truncated_tail_is_dropped() {
        let path = temp_path("log_truncated.jsonl");
        std::fs::write(
            &path,
            "{\"group\":\"state\",\"key\":\"0\",\"values\":[1.0]}\n{\"group\":\"sta",
        )
        .unwrap();
        let records = read_records(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_corrupt_line_is_parse_error() {
        let path = temp_path("log_corrupt.jsonl");
        std::fs::write(&path, "not json\n{\"group\":\"state\",\"key\":\"0\",\"values\":[]}\n").unwrap();
        let result = read_log(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ExploreError::Parse { line: 1, .. })));
    }

    #[test]
    fn test_missing_log() {
        assert!(matches!(
            read_log(temp_path("no_such_log.jsonl")),
            Err(ExploreError::FileNotFound(_))
        ));
    }
}
