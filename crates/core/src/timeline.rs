//! Timeline merging: three independently-timestamped event streams become
//! one causally ordered sequence.

/// Raw general-comment payload, as delivered by the snapshot loader.
#[derive(Debug, Clone, Default)]
pub struct CommentRecord {
    pub timestamp: Option<String>,
    pub author: Option<String>,
    pub body: Option<String>,
}

/// Raw inline review-comment payload.
#[derive(Debug, Clone, Default)]
pub struct ReviewRecord {
    pub timestamp: Option<String>,
    pub author: Option<String>,
    pub file_path: Option<String>,
    pub body: Option<String>,
    pub diff_hunk: Option<String>,
}

/// Raw commit payload with its diff text already resolved by the caller.
#[derive(Debug, Clone, Default)]
pub struct CommitRecord {
    pub timestamp: Option<String>,
    pub oid: Option<String>,
    pub message: Option<String>,
    pub diff_text: Option<String>,
    pub author: Option<String>,
}

/// One event on a pull request's timeline.
///
/// Every variant carries a non-empty ISO-8601 timestamp; records without one
/// never make it onto the timeline. Optional payload text collapses to the
/// empty string here, and rendering decisions key off "blank after trimming".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Comment {
        timestamp: String,
        author: String,
        body: String,
    },
    Review {
        timestamp: String,
        author: String,
        file_path: String,
        body: String,
        diff_hunk: String,
    },
    Commit {
        timestamp: String,
        oid: String,
        message: String,
        diff_text: String,
        author: String,
    },
}

impl Event {
    pub fn timestamp(&self) -> &str {
        match self {
            Event::Comment { timestamp, .. }
            | Event::Review { timestamp, .. }
            | Event::Commit { timestamp, .. } => timestamp,
        }
    }

    pub fn is_commit(&self) -> bool {
        matches!(self, Event::Commit { .. })
    }

    fn from_comment(record: CommentRecord) -> Option<Self> {
        let timestamp = present(record.timestamp)?;
        Some(Event::Comment {
            timestamp,
            author: record.author.unwrap_or_default(),
            body: record.body.unwrap_or_default(),
        })
    }

    fn from_review(record: ReviewRecord) -> Option<Self> {
        let timestamp = present(record.timestamp)?;
        Some(Event::Review {
            timestamp,
            author: record.author.unwrap_or_default(),
            file_path: record.file_path.unwrap_or_default(),
            body: record.body.unwrap_or_default(),
            diff_hunk: record.diff_hunk.unwrap_or_default(),
        })
    }

    fn from_commit(record: CommitRecord) -> Option<Self> {
        let timestamp = present(record.timestamp)?;
        Some(Event::Commit {
            timestamp,
            oid: record.oid.unwrap_or_default(),
            message: record.message.unwrap_or_default(),
            diff_text: record.diff_text.unwrap_or_default(),
            author: record.author.unwrap_or_default(),
        })
    }
}

fn present(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}

/// Merge the three event streams into one timeline, ascending by timestamp.
///
/// Records missing a timestamp are dropped; nothing else is dropped or
/// duplicated. Events sharing a timestamp keep the fixed stream precedence
/// {comment, review, commit} — the sort is stable over the concatenation
/// order, which makes the corpus reproducible regardless of how the input
/// collections were ordered.
pub fn merge(
    comments: Vec<CommentRecord>,
    reviews: Vec<ReviewRecord>,
    commits: Vec<CommitRecord>,
) -> Vec<Event> {
    let mut events: Vec<Event> = Vec::new();
    events.extend(comments.into_iter().filter_map(Event::from_comment));
    events.extend(reviews.into_iter().filter_map(Event::from_review));
    events.extend(commits.into_iter().filter_map(Event::from_commit));
    // Vec::sort_by is stable; ISO-8601 strings compare lexicographically.
    events.sort_by(|a, b| a.timestamp().cmp(b.timestamp()));
    events
}
