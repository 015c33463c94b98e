//! Core serialization logic for pull-request review history.
//!
//! This crate converts a PR's recorded history (commits, review comments,
//! general comments) into (prompt, completion) training examples, one per
//! commit: the prompt is everything that happened since the previous commit,
//! the completion is that commit's diff.

/// Trait for measuring and truncating rendered text against a size budget.
///
/// Implementors provide the size measure used to enforce the context limit.
/// Character counting is exact and cheap; a token-based measure approximates
/// a model's context budget.
pub trait SizeMeasure {
    /// Size of the given text under this measure.
    fn measure(&self, text: &str) -> usize;

    /// Truncate text from its *start* so that at most `max` units remain.
    /// The latest content is kept; the earliest is dropped.
    fn truncate_start(&self, text: &str, max: usize) -> String;
}

// Blanket implementation for references to SizeMeasures
impl<M: SizeMeasure + ?Sized> SizeMeasure for &M {
    fn measure(&self, text: &str) -> usize {
        (*self).measure(text)
    }

    fn truncate_start(&self, text: &str, max: usize) -> String {
        (*self).truncate_start(text, max)
    }
}

mod example;
mod measure;
pub mod pipeline;
pub mod snapshot;
mod timeline;

pub use example::{synthesize, Example, Limits, PrHeader, Synthesis};
pub use measure::{CharMeasure, WordMeasure};
pub use pipeline::{
    discover_snapshot_files, process_all_prs, process_pr, write_dataset_output, CsvWriter,
    DiffSource, DirDiffSource, JsonlWriter, OutputFormat, PipelineConfig, PipelineResult,
    PrResult, RecordWriter, SerializeError,
};
pub use snapshot::PrSnapshot;
pub use timeline::{merge, CommentRecord, CommitRecord, Event, ReviewRecord};

/// Default maximum size (under the configured measure) of prompt + completion.
pub const DEFAULT_MAX_CONTEXT_SIZE: usize = 8192;

/// Test-set routing: one bucket in `SPLIT_BUCKETS` goes to the test set.
pub const SPLIT_BUCKETS: u64 = 5;
