//! Example synthesis: walk a merged timeline and, at each commit, pair the
//! context accumulated since the previous commit with that commit's diff.

use serde::Serialize;

use crate::timeline::Event;
use crate::SizeMeasure;

/// PR-level metadata rendered into every prompt header and carried into the
/// emitted examples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrHeader {
    pub repo: String,
    pub number: i64,
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
    pub created_at: String,
    pub closed_at: String,
    pub merged_at: String,
    pub state: String,
    pub additions: i64,
    pub deletions: i64,
    pub changed_files: i64,
    pub head_ref: String,
}

/// Context budget configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum combined prompt + completion size under the injected measure.
    pub max_context_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_context_size: crate::DEFAULT_MAX_CONTEXT_SIZE,
        }
    }
}

/// One supervised training example. Field order matches the dataset schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Example {
    pub prompt: String,
    pub completion: String,
    pub repo: String,
    pub pr_number: i64,
    pub title: String,
    pub body: String,
    pub created_at: String,
    pub closed_at: String,
    pub merged_at: String,
    pub author: String,
    pub state: String,
    pub additions: i64,
    pub deletions: i64,
    pub changed_files: i64,
    pub head_ref: String,
    pub labels: String,
    pub completion_commit: String,
}

/// Lazily synthesize examples from a merged timeline.
///
/// The returned iterator is finite and restartable: calling this again with
/// the same inputs walks the timeline from the start and yields byte-identical
/// examples. No state survives between calls.
pub fn synthesize<'a, M>(
    header: &'a PrHeader,
    timeline: &'a [Event],
    limits: Limits,
    measure: M,
) -> Synthesis<'a, M>
where
    M: SizeMeasure,
{
    Synthesis {
        header,
        timeline,
        limits,
        measure,
        cursor: 0,
    }
}

/// Iterator over the examples of one PR's timeline.
///
/// Owns the walk cursor for exactly one pass; the visited prefix of the
/// timeline is the "history so far" buffer, so commits with empty diffs still
/// become boundaries for later segments even though they emit nothing.
pub struct Synthesis<'a, M>
where
    M: SizeMeasure,
{
    header: &'a PrHeader,
    timeline: &'a [Event],
    limits: Limits,
    measure: M,
    cursor: usize,
}

impl<'a, M> Iterator for Synthesis<'a, M>
where
    M: SizeMeasure,
{
    type Item = Example;

    fn next(&mut self) -> Option<Example> {
        while self.cursor < self.timeline.len() {
            let i = self.cursor;
            self.cursor += 1;

            let Event::Commit {
                timestamp,
                oid,
                message: _,
                diff_text,
                author,
            } = &self.timeline[i]
            else {
                continue;
            };

            // Diff gate: commits without an identity or a diff emit nothing,
            // but the history prefix still includes them.
            if oid.is_empty() || diff_text.trim().is_empty() {
                continue;
            }

            let prompt = self.render_prompt(i, timestamp);
            let completion = format!("{} / diff: {}", oid, diff_text);

            let Some(prompt) = self.enforce_budget(prompt, &completion, oid) else {
                continue;
            };

            return Some(Example {
                prompt,
                completion,
                repo: self.header.repo.clone(),
                pr_number: self.header.number,
                title: self.header.title.clone(),
                body: self.header.description.clone(),
                created_at: self.header.created_at.clone(),
                closed_at: self.header.closed_at.clone(),
                merged_at: self.header.merged_at.clone(),
                author: author.clone(),
                state: self.header.state.clone(),
                additions: self.header.additions,
                deletions: self.header.deletions,
                changed_files: self.header.changed_files,
                head_ref: self.header.head_ref.clone(),
                labels: self.header.labels.join(", "),
                completion_commit: oid.clone(),
            });
        }
        None
    }
}

impl<'a, M> Synthesis<'a, M>
where
    M: SizeMeasure,
{
    /// Render the context window for the commit at index `i`: PR header,
    /// previous-commit block, then every comment/review strictly between the
    /// boundary commit and this one, in timeline order.
    fn render_prompt(&self, i: usize, commit_timestamp: &str) -> String {
        let mut parts = vec![
            format!("Title: {}", self.header.title),
            format!("Body: {}", self.header.description),
        ];
        if !self.header.labels.is_empty() {
            parts.push(format!("Labels: {}", self.header.labels.join(", ")));
        }

        // Boundary search: most recent prior commit, or the timeline start.
        let boundary = self.timeline[..i].iter().rposition(Event::is_commit);

        if let Some(p) = boundary {
            if let Event::Commit {
                timestamp,
                message,
                diff_text,
                ..
            } = &self.timeline[p]
            {
                // Guard against backfilled commit metadata: only show the
                // previous commit when it actually precedes this one.
                if !diff_text.trim().is_empty() && timestamp.as_str() < commit_timestamp {
                    parts.push(format!("Last commit: {}\nDiff:\n{}", message, diff_text));
                }
            }
        }

        let seg_start = boundary.map_or(0, |p| p + 1);
        for event in &self.timeline[seg_start..i] {
            match event {
                Event::Comment { body, .. } => {
                    let body = body.trim();
                    if !body.is_empty() {
                        parts.push(format!("Comment: {}", body));
                    }
                }
                Event::Review {
                    file_path,
                    body,
                    diff_hunk,
                    ..
                } => {
                    let body = body.trim();
                    let hunk = diff_hunk.trim();
                    if !body.is_empty() || !hunk.is_empty() {
                        parts.push(format!("Review on {}: {}\nDiff:\n{}", file_path, body, hunk));
                    }
                }
                Event::Commit { .. } => {}
            }
        }

        parts.join("\n")
    }

    /// Apply the size budget: drop the example when the completion alone is
    /// over budget, otherwise truncate the prompt from its start until the
    /// combined size fits. Returns None when the example must be dropped.
    fn enforce_budget(&self, prompt: String, completion: &str, oid: &str) -> Option<String> {
        let max = self.limits.max_context_size;
        let completion_size = self.measure.measure(completion);
        if completion_size > max {
            eprintln!(
                "Skipping {}: completion size {} exceeds budget {}",
                oid, completion_size, max
            );
            return None;
        }

        let budget = max - completion_size;
        if self.measure.measure(&prompt) <= budget {
            return Some(prompt);
        }
        if budget == 0 {
            eprintln!("Skipping {}: no room left for prompt content", oid);
            return None;
        }
        let truncated = self.measure.truncate_start(&prompt, budget);
        if truncated.is_empty() {
            eprintln!("Skipping {}: no room left for prompt content", oid);
            return None;
        }
        Some(truncated)
    }
}
