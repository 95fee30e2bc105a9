//! Per-sensor shard ingestion.
//!
//! Capture rigs write each sensor's metadata as a run of small JSON shard
//! files (`<sensor><seq>.json`), each holding a map whose `buffer_<k>` keys
//! carry one acquisition record. Reconstructing the arrival-ordered record
//! sequence requires natural (digit-aware) ordering on both the shard
//! filenames and the buffer keys: plain lexical order would put `buffer_10`
//! before `buffer_2`.

use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use crate::traits::SampleSource;

/// One acquisition event with its three clock readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Host wall clock at delivery (seconds).
    pub python_timestamp: f64,
    /// Radio clock at capture (ticks; divide by the radio tick rate for seconds).
    pub global_timestamp: f64,
    /// Device/pipeline clock at capture (seconds).
    pub gstreamer_timestamp: f64,
}

/// Merge every `<prefix>*.json` shard under `dir` into one ordered record
/// sequence.
///
/// Shards are consumed in natural filename order and `buffer_*` keys within
/// each shard in natural key order. Previously written `*_merged.json`
/// outputs in the same directory are skipped.
pub fn merge_shards(dir: &Path, prefix: &str) -> Result<Vec<SampleRecord>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading shard directory {}", dir.display()))?;

    let mut names: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) && name.ends_with(".json") && !name.ends_with("_merged.json") {
            names.push(name);
        }
    }
    if names.is_empty() {
        bail!(
            "no shard files matching {}*.json in {}",
            prefix,
            dir.display()
        );
    }
    names.sort_by(|a, b| natural_cmp(a, b));

    let mut records = Vec::new();
    for name in &names {
        let path = dir.join(name);
        let shard = read_shard(&path)?;
        debug!("{}: {} records", path.display(), shard.len());
        records.extend(shard);
    }
    Ok(records)
}

/// Parse one shard file: a JSON object whose `buffer*` keys hold records.
fn read_shard(path: &Path) -> Result<Vec<SampleRecord>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading shard {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing shard {}", path.display()))?;
    let map = value
        .as_object()
        .ok_or_else(|| anyhow!("shard {} is not a JSON object", path.display()))?;

    let mut keys: Vec<&String> = map.keys().filter(|k| k.starts_with("buffer")).collect();
    keys.sort_by(|a, b| natural_cmp(a, b));

    let mut records = Vec::with_capacity(keys.len());
    for key in keys {
        let record: SampleRecord = serde_json::from_value(map[key.as_str()].clone())
            .with_context(|| format!("record {} in shard {}", key, path.display()))?;
        records.push(record);
    }
    Ok(records)
}

/// Persist a merged record sequence as pretty JSON.
pub fn write_merged(path: &Path, records: &[SampleRecord]) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("creating merged file {}", path.display()))?;
    serde_json::to_writer_pretty(file, records)
        .with_context(|| format!("writing merged file {}", path.display()))
}

/// Read back a merged record sequence.
pub fn load_merged(path: &Path) -> Result<Vec<SampleRecord>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading merged file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing merged file {}", path.display()))
}

/// Filesystem-backed [`SampleSource`] for one sensor's shard directory.
pub struct ShardSource {
    dir: PathBuf,
    prefix: String,
}

impl ShardSource {
    pub fn new(dir: impl AsRef<Path>, prefix: impl Into<String>) -> Self {
        ShardSource {
            dir: dir.as_ref().to_path_buf(),
            prefix: prefix.into(),
        }
    }
}

impl SampleSource for ShardSource {
    fn load(&self) -> Result<Vec<SampleRecord>> {
        merge_shards(&self.dir, &self.prefix)
    }
}

/// Digit-aware string ordering: digit runs compare as numbers, everything
/// else byte-wise (`buffer_2` < `buffer_10`).
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let ra = digit_run(a, i);
            let rb = digit_run(b, j);
            let ord = cmp_digit_runs(&a[i..ra], &b[j..rb]);
            if ord != Ordering::Equal {
                return ord;
            }
            i = ra;
            j = rb;
        } else {
            let ord = a[i].cmp(&b[j]);
            if ord != Ordering::Equal {
                return ord;
            }
            i += 1;
            j += 1;
        }
    }
    (a.len() - i).cmp(&(b.len() - j))
}

fn digit_run(s: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < s.len() && s[end].is_ascii_digit() {
        end += 1;
    }
    end
}

/// Compare two digit runs numerically without parsing (runs may exceed u64).
/// Equal values with different zero-padding order padded-first so the
/// ordering stays total and deterministic.
fn cmp_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let sa = strip_leading_zeros(a);
    let sb = strip_leading_zeros(b);
    sa.len()
        .cmp(&sb.len())
        .then_with(|| sa.cmp(sb))
        .then_with(|| b.len().cmp(&a.len()))
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let nonzero = s.iter().position(|&c| c != b'0').unwrap_or(s.len());
    &s[nonzero..]
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn record(k: f64) -> SampleRecord {
        SampleRecord {
            python_timestamp: 100.0 + k,
            global_timestamp: 1200.0 * k,
            gstreamer_timestamp: k,
        }
    }

    fn shard_json(records: &[(String, SampleRecord)]) -> String {
        let mut map = serde_json::Map::new();
        map.insert("sensor".into(), serde_json::json!("cam0"));
        for (key, rec) in records {
            map.insert(key.clone(), serde_json::to_value(rec).unwrap());
        }
        serde_json::to_string_pretty(&serde_json::Value::Object(map)).unwrap()
    }

    // ========================================================================
    // NATURAL ORDERING
    // ========================================================================

    #[test]
    fn test_natural_order_digit_runs() {
        assert_eq!(natural_cmp("buffer_2", "buffer_10"), Ordering::Less);
        assert_eq!(natural_cmp("t9.json", "t10.json"), Ordering::Less);
        assert_eq!(natural_cmp("a100", "a99"), Ordering::Greater);
        assert_eq!(natural_cmp("buffer_7", "buffer_7"), Ordering::Equal);
    }

    #[test]
    fn test_natural_order_leading_zeros() {
        assert_eq!(natural_cmp("t007", "t7"), Ordering::Less);
        assert_eq!(natural_cmp("t007", "t8"), Ordering::Less);
        assert_eq!(natural_cmp("t010", "t9"), Ordering::Greater);
    }

    #[test]
    fn test_natural_order_prefix_and_mixed() {
        assert_eq!(natural_cmp("buffer", "buffer_1"), Ordering::Less);
        assert_eq!(natural_cmp("a2b", "a2a"), Ordering::Greater);
        assert_eq!(natural_cmp("1abc", "abc"), Ordering::Less);
    }

    // ========================================================================
    // SHARD MERGING
    // ========================================================================

    #[test]
    fn test_merge_orders_shards_and_keys_naturally() {
        let dir = tempfile::tempdir().unwrap();

        // Lexical order would visit 010 before 2 and buffer_10 before buffer_2.
        fs::write(
            dir.path().join("0_010.json"),
            shard_json(&[("buffer_1".into(), record(4.0))]),
        )
        .unwrap();
        fs::write(
            dir.path().join("0_2.json"),
            shard_json(&[
                ("buffer_10".into(), record(3.0)),
                ("buffer_2".into(), record(1.0)),
                ("buffer_9".into(), record(2.0)),
            ]),
        )
        .unwrap();

        let records = merge_shards(dir.path(), "0").unwrap();
        let order: Vec<f64> = records.iter().map(|r| r.gstreamer_timestamp).collect();
        assert_eq!(order, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_merge_filters_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("0_1.json"),
            shard_json(&[("buffer_0".into(), record(1.0))]),
        )
        .unwrap();
        fs::write(
            dir.path().join("1_1.json"),
            shard_json(&[("buffer_0".into(), record(9.0))]),
        )
        .unwrap();

        let records = merge_shards(dir.path(), "0").unwrap();
        assert_eq!(records.len(), 1);
        assert!((records[0].gstreamer_timestamp - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_skips_previous_merged_output() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("0_1.json"),
            shard_json(&[("buffer_0".into(), record(1.0))]),
        )
        .unwrap();
        fs::write(dir.path().join("0_merged.json"), "[]").unwrap();

        let records = merge_shards(dir.path(), "0").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_merge_ignores_non_buffer_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("0_1.json"),
            shard_json(&[("buffer_0".into(), record(1.0))]),
        )
        .unwrap();

        // shard_json always includes a non-buffer "sensor" key.
        let records = merge_shards(dir.path(), "0").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_merge_empty_directory_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = merge_shards(dir.path(), "0").unwrap_err();
        assert!(err.to_string().contains("no shard files"));
    }

    #[test]
    fn test_merge_bad_shard_carries_path_context() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0_1.json"), "not json").unwrap();

        let err = merge_shards(dir.path(), "0").unwrap_err();
        assert!(format!("{err:#}").contains("0_1.json"));
    }

    // ========================================================================
    // MERGED FILE ROUND-TRIP
    // ========================================================================

    #[test]
    fn test_merged_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0_merged.json");
        let records = vec![record(0.0), record(1.0), record(2.0)];

        write_merged(&path, &records).unwrap();
        let restored = load_merged(&path).unwrap();
        assert_eq!(restored, records);
    }

    #[test]
    fn test_shard_source_loads_records() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("0_1.json"),
            shard_json(&[
                ("buffer_0".into(), record(0.0)),
                ("buffer_1".into(), record(1.0)),
            ]),
        )
        .unwrap();

        let source = ShardSource::new(dir.path(), "0");
        let records = source.load().unwrap();
        assert_eq!(records.len(), 2);
    }
}
