//! Batch pipeline: snapshot discovery, per-PR processing, dataset output.

use std::collections::HashMap;
use std::error::Error;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use thiserror::Error;
use walkdir::WalkDir;

use crate::example::{synthesize, Example, Limits};
use crate::snapshot::PrSnapshot;
use crate::timeline::merge;
use crate::{SizeMeasure, SPLIT_BUCKETS};

/// The two file-level abort conditions. Everything below the file level
/// degrades to omission instead of failing.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("failed to read snapshot {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse snapshot {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Read-only lookup from commit oid to diff text.
pub trait DiffSource {
    fn diff_for(&self, oid: &str) -> Option<String>;
}

/// Diff store laid out as `<dir>/<oid>.diff` files.
#[derive(Debug, Clone)]
pub struct DirDiffSource {
    dir: PathBuf,
}

impl DirDiffSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DiffSource for DirDiffSource {
    fn diff_for(&self, oid: &str) -> Option<String> {
        let path = self.dir.join(format!("{}.diff", oid));
        fs::read_to_string(path).ok().map(|s| s.trim().to_string())
    }
}

impl DiffSource for HashMap<String, String> {
    fn diff_for(&self, oid: &str) -> Option<String> {
        self.get(oid).cloned()
    }
}

/// Configuration for the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Repository slug stamped into every example, e.g. "dotnet/runtime".
    pub repo: String,
    pub limits: Limits,
}

/// Result of processing a single PR snapshot.
#[derive(Debug)]
pub struct PrResult {
    pub examples: Vec<Example>,
    pub source_path: String,
}

/// Result of writing the full dataset.
#[derive(Debug, serde::Serialize)]
pub struct PipelineResult {
    pub total_prs: usize,
    pub total_examples: usize,
    pub train_examples: usize,
    pub test_examples: usize,
}

/// Discover all `pr-*.json` snapshot files under a directory.
pub fn discover_snapshot_files(root: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map_or(false, |name| name.starts_with("pr-") && name.ends_with(".json"))
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();
    paths
}

/// Process a single PR snapshot file into examples.
///
/// A snapshot without a PR number yields no examples; the only errors are an
/// unreadable file or unparseable JSON.
pub fn process_pr<D, M>(
    snapshot_path: &Path,
    diffs: &D,
    measure: &M,
    config: &PipelineConfig,
) -> Result<Vec<Example>, SerializeError>
where
    D: DiffSource,
    M: SizeMeasure,
{
    let raw = fs::read_to_string(snapshot_path).map_err(|source| SerializeError::Read {
        path: snapshot_path.to_path_buf(),
        source,
    })?;
    let snapshot: PrSnapshot =
        serde_json::from_str(&raw).map_err(|source| SerializeError::Parse {
            path: snapshot_path.to_path_buf(),
            source,
        })?;

    if snapshot.number.is_none() {
        eprintln!("Warning: snapshot {:?} has no PR number, skipping", snapshot_path);
        return Ok(Vec::new());
    }

    let header = snapshot.header(&config.repo);
    let timeline = merge(
        snapshot.comment_records(),
        snapshot.review_records(),
        snapshot.commit_records(diffs),
    );
    Ok(synthesize(&header, &timeline, config.limits, measure).collect())
}

/// Process all PR snapshots under a directory in parallel.
///
/// Each PR is independent; rayon maps over the snapshot files. The diff
/// source and measure must be `Sync` to be shared across threads.
pub fn process_all_prs<D, M>(
    snapshot_root: &Path,
    diffs: &D,
    measure: &M,
    config: &PipelineConfig,
) -> Result<Vec<PrResult>, Box<dyn Error>>
where
    D: DiffSource + Sync,
    M: SizeMeasure + Sync,
{
    let snapshot_files = discover_snapshot_files(snapshot_root);

    if snapshot_files.is_empty() {
        return Err(format!("No snapshot files found under {:?}", snapshot_root).into());
    }

    let total_files = snapshot_files.len();
    let processed_count = AtomicUsize::new(0);
    let error_count = AtomicUsize::new(0);

    let results: Vec<PrResult> = snapshot_files
        .into_par_iter()
        .filter_map(|snapshot_path| {
            let result = process_pr(&snapshot_path, diffs, measure, config);
            let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;

            match result {
                Ok(examples) => {
                    if count % 100 == 0 || count == total_files {
                        eprintln!("Processed {}/{} snapshots...", count, total_files);
                    }
                    Some(PrResult {
                        examples,
                        source_path: snapshot_path.to_string_lossy().to_string(),
                    })
                }
                Err(e) => {
                    error_count.fetch_add(1, Ordering::Relaxed);
                    eprintln!("Error processing {:?}: {}", snapshot_path, e);
                    None
                }
            }
        })
        .collect();

    let errors = error_count.load(Ordering::Relaxed);
    if errors > 0 {
        eprintln!("Warning: {} snapshots failed to process", errors);
    }

    Ok(results)
}

/// Serialization strategy consumed by the dataset writer.
pub trait RecordWriter {
    fn write(&mut self, example: &Example) -> Result<(), Box<dyn Error>>;
    fn finish(&mut self) -> Result<(), Box<dyn Error>>;
}

/// Line-delimited JSON output.
pub struct JsonlWriter<W: Write> {
    out: W,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> RecordWriter for JsonlWriter<W> {
    fn write(&mut self, example: &Example) -> Result<(), Box<dyn Error>> {
        let line = serde_json::to_string(example)?;
        writeln!(self.out, "{}", line)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Box<dyn Error>> {
        self.out.flush()?;
        Ok(())
    }
}

/// Tabular CSV output with a header row.
pub struct CsvWriter<W: Write> {
    inner: csv::Writer<W>,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            inner: csv::Writer::from_writer(out),
        }
    }
}

impl<W: Write> RecordWriter for CsvWriter<W> {
    fn write(&mut self, example: &Example) -> Result<(), Box<dyn Error>> {
        self.inner.serialize(example)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Box<dyn Error>> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Output serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jsonl,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jsonl => "jsonl",
            OutputFormat::Csv => "csv",
        }
    }
}

fn open_writer(path: &Path, format: OutputFormat) -> Result<Box<dyn RecordWriter>, Box<dyn Error>> {
    let file = BufWriter::new(File::create(path)?);
    Ok(match format {
        OutputFormat::Jsonl => Box::new(JsonlWriter::new(file)),
        OutputFormat::Csv => Box::new(CsvWriter::new(file)),
    })
}

/// FNV-1a over the commit oid: a deterministic train/test router that does
/// not depend on process, platform, or run order.
fn split_bucket(oid: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in oid.as_bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash % SPLIT_BUCKETS
}

/// Write examples to train/test dataset files, routed by commit oid.
pub fn write_dataset_output(
    pr_results: Vec<PrResult>,
    output_dir: &Path,
    format: OutputFormat,
) -> Result<PipelineResult, Box<dyn Error>> {
    fs::create_dir_all(output_dir)?;

    let train_path = output_dir.join(format!("train.{}", format.extension()));
    let test_path = output_dir.join(format!("test.{}", format.extension()));

    let mut train_writer = open_writer(&train_path, format)?;
    let mut test_writer = open_writer(&test_path, format)?;

    let total_prs = pr_results.len();
    let mut train_examples = 0;
    let mut test_examples = 0;

    for pr in pr_results {
        for example in &pr.examples {
            if split_bucket(&example.completion_commit) == 0 {
                test_writer.write(example)?;
                test_examples += 1;
            } else {
                train_writer.write(example)?;
                train_examples += 1;
            }
        }
    }

    train_writer.finish()?;
    test_writer.finish()?;

    Ok(PipelineResult {
        total_prs,
        total_examples: train_examples + test_examples,
        train_examples,
        test_examples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::CharMeasure;
    use tempfile::TempDir;

    const SNAPSHOT: &str = r#"{
        "number": 12,
        "title": "Speed up parser",
        "body": "Twice as fast",
        "createdAt": "2024-05-01T00:00:00Z",
        "comments": {"nodes": [
            {"createdAt": "2024-05-01T10:00:00Z", "author": {"login": "alice"}, "body": "looks good"}
        ]},
        "reviewThreads": {"nodes": []},
        "commits": {"nodes": [
            {"commit": {"oid": "aaa111", "message": "first", "committedDate": "2024-05-01T05:00:00Z", "author": {"login": "bob"}}},
            {"commit": {"oid": "bbb222", "message": "second", "committedDate": "2024-05-01T12:00:00Z", "author": {"login": "bob"}}}
        ]}
    }"#;

    fn write_snapshot(dir: &Path) -> PathBuf {
        let path = dir.join("pr-12.json");
        fs::write(&path, SNAPSHOT).unwrap();
        path
    }

    fn diff_map() -> HashMap<String, String> {
        let mut diffs = HashMap::new();
        diffs.insert("aaa111".to_string(), "+fast".to_string());
        diffs.insert("bbb222".to_string(), "+faster".to_string());
        diffs
    }

    #[test]
    fn test_discover_snapshot_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("subdir")).unwrap();
        fs::write(temp.path().join("pr-1.json"), "{}").unwrap();
        fs::write(temp.path().join("subdir/pr-2.json"), "{}").unwrap();
        fs::write(temp.path().join("notes.json"), "{}").unwrap();
        fs::write(temp.path().join("pr-3.txt"), "").unwrap();

        let files = discover_snapshot_files(temp.path());
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_process_pr() {
        let temp = TempDir::new().unwrap();
        let path = write_snapshot(temp.path());

        let config = PipelineConfig {
            repo: "dotnet/runtime".to_string(),
            ..Default::default()
        };
        let examples = process_pr(&path, &diff_map(), &CharMeasure, &config).unwrap();

        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].completion, "aaa111 / diff: +fast");
        // second commit sees the first commit and the comment in between
        assert!(examples[1].prompt.contains("Last commit: first"));
        assert!(examples[1].prompt.contains("Comment: looks good"));
        assert_eq!(examples[1].repo, "dotnet/runtime");
    }

    #[test]
    fn test_process_pr_without_number_yields_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pr-0.json");
        fs::write(&path, r#"{"title": "no number"}"#).unwrap();

        let config = PipelineConfig::default();
        let examples = process_pr(&path, &diff_map(), &CharMeasure, &config).unwrap();
        assert!(examples.is_empty());
    }

    #[test]
    fn test_process_pr_bad_json_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pr-1.json");
        fs::write(&path, "{not json").unwrap();

        let config = PipelineConfig::default();
        let err = process_pr(&path, &diff_map(), &CharMeasure, &config).unwrap_err();
        assert!(matches!(err, SerializeError::Parse { .. }));
    }

    #[test]
    fn test_dir_diff_source_trims() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("abc.diff"), "+line\n").unwrap();

        let source = DirDiffSource::new(temp.path());
        assert_eq!(source.diff_for("abc").as_deref(), Some("+line"));
        assert_eq!(source.diff_for("missing"), None);
    }

    #[test]
    fn test_process_all_prs_and_write_output() {
        let temp = TempDir::new().unwrap();
        let snapshot_root = temp.path().join("prs");
        fs::create_dir_all(&snapshot_root).unwrap();
        write_snapshot(&snapshot_root);

        let config = PipelineConfig {
            repo: "dotnet/runtime".to_string(),
            ..Default::default()
        };
        let results =
            process_all_prs(&snapshot_root, &diff_map(), &CharMeasure, &config).unwrap();
        assert_eq!(results.len(), 1);

        let output_dir = temp.path().join("dataset");
        let summary =
            write_dataset_output(results, &output_dir, OutputFormat::Jsonl).unwrap();
        assert_eq!(summary.total_prs, 1);
        assert_eq!(summary.total_examples, 2);
        assert_eq!(
            summary.total_examples,
            summary.train_examples + summary.test_examples
        );

        let train = fs::read_to_string(output_dir.join("train.jsonl")).unwrap();
        let test = fs::read_to_string(output_dir.join("test.jsonl")).unwrap();
        let lines = train.lines().count() + test.lines().count();
        assert_eq!(lines, 2);
    }

    #[test]
    fn test_process_all_prs_empty_root_is_an_error() {
        let temp = TempDir::new().unwrap();
        let config = PipelineConfig::default();
        let result = process_all_prs(temp.path(), &diff_map(), &CharMeasure, &config);
        assert!(result.is_err());
    }

    #[test]
    fn test_split_bucket_is_deterministic() {
        let a = split_bucket("aaa111");
        assert_eq!(a, split_bucket("aaa111"));
        assert!(a < SPLIT_BUCKETS);
    }

    #[test]
    fn test_csv_writer_emits_header_and_row() {
        let temp = TempDir::new().unwrap();
        let path = write_snapshot(temp.path());
        let config = PipelineConfig {
            repo: "dotnet/runtime".to_string(),
            ..Default::default()
        };
        let examples = process_pr(&path, &diff_map(), &CharMeasure, &config).unwrap();

        let mut buf = Vec::new();
        {
            let mut writer = CsvWriter::new(&mut buf);
            writer.write(&examples[0]).unwrap();
            writer.finish().unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("prompt,completion,repo"));
        assert!(text.contains("aaa111 / diff: +fast"));
    }

    #[test]
    fn test_pr_isolation() {
        // processing two PRs in either order yields the same per-PR examples
        let temp = TempDir::new().unwrap();
        let path_a = write_snapshot(temp.path());
        let path_b = temp.path().join("pr-13.json");
        fs::write(&path_b, SNAPSHOT.replace("\"number\": 12", "\"number\": 13")).unwrap();

        let config = PipelineConfig {
            repo: "dotnet/runtime".to_string(),
            ..Default::default()
        };
        let diffs = diff_map();

        let a_then_b = (
            process_pr(&path_a, &diffs, &CharMeasure, &config).unwrap(),
            process_pr(&path_b, &diffs, &CharMeasure, &config).unwrap(),
        );
        let b_then_a = (
            process_pr(&path_b, &diffs, &CharMeasure, &config).unwrap(),
            process_pr(&path_a, &diffs, &CharMeasure, &config).unwrap(),
        );
        assert_eq!(a_then_b.0, b_then_a.1);
        assert_eq!(a_then_b.1, b_then_a.0);
    }
}
