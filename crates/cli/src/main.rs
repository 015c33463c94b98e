//! CLI tool for serializing pull-request review history into training data.
//!
//! This tool processes PR snapshot JSON files plus a directory of per-commit
//! diff files and outputs (prompt, completion) examples split into train and
//! test sets, as JSONL or CSV.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use pr_commit_serializer_core::{
    process_all_prs, write_dataset_output, CharMeasure, DirDiffSource, Limits, OutputFormat,
    PipelineConfig, PipelineResult, SizeMeasure, WordMeasure, DEFAULT_MAX_CONTEXT_SIZE,
};

/// Serialize PR snapshot history to supervised training examples.
#[derive(Parser, Debug)]
#[command(name = "pr-commit-serialize")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Root directory containing pr-*.json snapshot files
    #[arg(long)]
    snapshot_root: PathBuf,

    /// Directory containing <oid>.diff files
    #[arg(long)]
    diff_dir: PathBuf,

    /// Output directory for dataset files
    #[arg(long)]
    output_dir: PathBuf,

    /// Repository slug stamped into every example (e.g. dotnet/runtime)
    #[arg(long)]
    repo: String,

    /// Maximum combined prompt + completion size
    #[arg(long, default_value_t = DEFAULT_MAX_CONTEXT_SIZE)]
    max_context_size: usize,

    /// Size measure used for the context budget
    #[arg(long, value_enum, default_value = "characters")]
    size_measure: MeasureKind,

    /// Output serialization format
    #[arg(long, value_enum, default_value = "jsonl")]
    format: FormatKind,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MeasureKind {
    Characters,
    Tokens,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatKind {
    Jsonl,
    Csv,
}

impl From<FormatKind> for OutputFormat {
    fn from(kind: FormatKind) -> Self {
        match kind {
            FormatKind::Jsonl => OutputFormat::Jsonl,
            FormatKind::Csv => OutputFormat::Csv,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.size_measure {
        MeasureKind::Characters => run(&args, CharMeasure),
        MeasureKind::Tokens => run(&args, WordMeasure),
    }
}

fn run<M>(args: &Args, measure: M) -> Result<(), Box<dyn std::error::Error>>
where
    M: SizeMeasure + Sync,
{
    let config = PipelineConfig {
        repo: args.repo.clone(),
        limits: Limits {
            max_context_size: args.max_context_size,
        },
    };
    let diffs = DirDiffSource::new(&args.diff_dir);
    let format: OutputFormat = args.format.into();

    println!("Processing snapshots from {:?}...", args.snapshot_root);
    let pr_results = process_all_prs(&args.snapshot_root, &diffs, &measure, &config)?;
    println!("Processed {} pull requests", pr_results.len());

    println!("Writing output to {:?}...", args.output_dir);
    let result: PipelineResult = write_dataset_output(pr_results, &args.output_dir, format)?;

    let metadata_path = args.output_dir.join("metadata.json");
    let metadata = serde_json::json!({
        "config": {
            "snapshot_root": args.snapshot_root.to_string_lossy(),
            "diff_dir": args.diff_dir.to_string_lossy(),
            "output_dir": args.output_dir.to_string_lossy(),
            "repo": args.repo,
            "max_context_size": args.max_context_size,
            "size_measure": format!("{:?}", args.size_measure).to_lowercase(),
            "format": format.extension(),
        },
        "counts": {
            "total_prs": result.total_prs,
            "total_examples": result.total_examples,
            "train_examples": result.train_examples,
            "test_examples": result.test_examples,
        },
        "stats": {
            "avg_examples_per_pr": if result.total_prs > 0 {
                result.total_examples as f64 / result.total_prs as f64
            } else {
                0.0
            },
        },
        "files": {
            "train_path": args.output_dir.join(format!("train.{}", format.extension())).to_string_lossy(),
            "test_path": args.output_dir.join(format!("test.{}", format.extension())).to_string_lossy(),
        },
    });
    std::fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;

    println!("\n[summary]");
    println!("  Total PRs processed: {}", result.total_prs);
    println!("  Train examples: {}", result.train_examples);
    println!("  Test examples: {}", result.test_examples);
    println!(
        "  Output: {:?}/{{train,test}}.{}",
        args.output_dir,
        format.extension()
    );
    println!("  Metadata: {:?}", metadata_path);

    Ok(())
}
