//! Size-measure strategies for context budget enforcement.

use crate::SizeMeasure;

/// Exact character-count measure.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharMeasure;

impl SizeMeasure for CharMeasure {
    fn measure(&self, text: &str) -> usize {
        text.chars().count()
    }

    fn truncate_start(&self, text: &str, max: usize) -> String {
        let total = text.chars().count();
        if total <= max {
            return text.to_string();
        }
        text.chars().skip(total - max).collect()
    }
}

/// Whitespace-token measure.
///
/// Counts whitespace-delimited words as a deterministic stand-in for a model
/// tokenizer. Truncation drops the earliest words but preserves the original
/// spacing of everything kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordMeasure;

impl SizeMeasure for WordMeasure {
    fn measure(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn truncate_start(&self, text: &str, max: usize) -> String {
        let starts = word_starts(text);
        if starts.len() <= max {
            return text.to_string();
        }
        if max == 0 {
            return String::new();
        }
        text[starts[starts.len() - max]..].to_string()
    }
}

/// Byte offsets at which whitespace-delimited words begin.
fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            in_word = true;
            starts.push(i);
        }
    }
    starts
}
