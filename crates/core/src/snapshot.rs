//! Serde shapes for PR snapshot files.
//!
//! Snapshots are GraphQL-style JSON dumps fetched by an external tool; every
//! field is tolerated as missing so that one sparse snapshot never aborts a
//! batch. Conversion into timeline records happens here.

use serde::Deserialize;

use crate::example::PrHeader;
use crate::pipeline::DiffSource;
use crate::timeline::{CommentRecord, CommitRecord, ReviewRecord};

/// Wrapper for GraphQL connection objects: `{"nodes": [...]}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Nodes<T> {
    pub nodes: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Actor {
    pub login: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommentNode {
    pub created_at: Option<String>,
    pub author: Option<Actor>,
    pub body: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReviewCommentNode {
    pub created_at: Option<String>,
    pub author: Option<Actor>,
    pub path: Option<String>,
    pub body: Option<String>,
    pub diff_hunk: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReviewThreadNode {
    pub comments: Nodes<ReviewCommentNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommitDetail {
    pub oid: Option<String>,
    pub message: Option<String>,
    pub committed_date: Option<String>,
    pub author: Option<Actor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommitNode {
    pub commit: CommitDetail,
}

/// One PR snapshot file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrSnapshot {
    pub number: Option<i64>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub labels: Option<Vec<String>>,
    pub created_at: Option<String>,
    pub closed_at: Option<String>,
    pub merged_at: Option<String>,
    pub state: Option<String>,
    pub additions: Option<i64>,
    pub deletions: Option<i64>,
    pub changed_files: Option<i64>,
    pub head_ref_name: Option<String>,
    pub comments: Nodes<CommentNode>,
    pub review_threads: Nodes<ReviewThreadNode>,
    pub commits: Nodes<CommitNode>,
}

impl PrSnapshot {
    /// PR header carried into every prompt and example of this PR.
    pub fn header(&self, repo: &str) -> PrHeader {
        PrHeader {
            repo: repo.to_string(),
            number: self.number.unwrap_or_default(),
            title: self.title.clone().unwrap_or_default(),
            description: self.body.clone().unwrap_or_default(),
            labels: self.labels.clone().unwrap_or_default(),
            created_at: self.created_at.clone().unwrap_or_default(),
            closed_at: self.closed_at.clone().unwrap_or_default(),
            merged_at: self.merged_at.clone().unwrap_or_default(),
            state: self.state.clone().unwrap_or_default(),
            additions: self.additions.unwrap_or_default(),
            deletions: self.deletions.unwrap_or_default(),
            changed_files: self.changed_files.unwrap_or_default(),
            head_ref: self.head_ref_name.clone().unwrap_or_default(),
        }
    }

    pub fn comment_records(&self) -> Vec<CommentRecord> {
        self.comments
            .nodes
            .iter()
            .map(|c| CommentRecord {
                timestamp: c.created_at.clone(),
                author: c.author.as_ref().and_then(|a| a.login.clone()),
                body: c.body.clone(),
            })
            .collect()
    }

    /// Review comments, flattened across threads in thread order.
    pub fn review_records(&self) -> Vec<ReviewRecord> {
        self.review_threads
            .nodes
            .iter()
            .flat_map(|t| t.comments.nodes.iter())
            .map(|r| ReviewRecord {
                timestamp: r.created_at.clone(),
                author: r.author.as_ref().and_then(|a| a.login.clone()),
                file_path: r.path.clone(),
                body: r.body.clone(),
                diff_hunk: r.diff_hunk.clone(),
            })
            .collect()
    }

    /// Commit records with their diff text resolved through `diffs`.
    /// The diff source is queried once per commit; commits without a stored
    /// diff get empty diff text and fall out at the synthesizer's diff gate.
    pub fn commit_records<D: DiffSource>(&self, diffs: &D) -> Vec<CommitRecord> {
        self.commits
            .nodes
            .iter()
            .map(|node| {
                let c = &node.commit;
                let diff_text = c.oid.as_deref().and_then(|oid| diffs.diff_for(oid));
                CommitRecord {
                    timestamp: c.committed_date.clone(),
                    oid: c.oid.clone(),
                    message: c.message.clone(),
                    diff_text,
                    author: c.author.as_ref().and_then(|a| a.login.clone()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SNAPSHOT: &str = r#"{
        "number": 7,
        "title": "Add thing",
        "body": "Adds the thing",
        "labels": ["area-System.Text", "enhancement"],
        "createdAt": "2024-03-01T00:00:00Z",
        "state": "MERGED",
        "additions": 10,
        "deletions": 2,
        "changedFiles": 1,
        "headRefName": "feature/thing",
        "comments": {"nodes": [
            {"createdAt": "2024-03-01T01:00:00Z", "author": {"login": "alice"}, "body": "nice"}
        ]},
        "reviewThreads": {"nodes": [
            {"comments": {"nodes": [
                {"createdAt": "2024-03-01T02:00:00Z", "path": "src/thing.cs", "body": "rename", "diffHunk": "@@ -1 +1 @@"}
            ]}}
        ]},
        "commits": {"nodes": [
            {"commit": {"oid": "abc123", "message": "add thing", "committedDate": "2024-03-01T03:00:00Z", "author": {"login": "bob"}}}
        ]}
    }"#;

    #[test]
    fn parses_snapshot_and_builds_records() {
        let snapshot: PrSnapshot = serde_json::from_str(SNAPSHOT).unwrap();
        assert_eq!(snapshot.number, Some(7));

        let header = snapshot.header("dotnet/runtime");
        assert_eq!(header.title, "Add thing");
        assert_eq!(header.labels.len(), 2);
        assert_eq!(header.head_ref, "feature/thing");

        let comments = snapshot.comment_records();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].author.as_deref(), Some("alice"));

        let reviews = snapshot.review_records();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].file_path.as_deref(), Some("src/thing.cs"));

        let mut diffs = HashMap::new();
        diffs.insert("abc123".to_string(), "+thing".to_string());
        let commits = snapshot.commit_records(&diffs);
        assert_eq!(commits[0].diff_text.as_deref(), Some("+thing"));
        assert_eq!(commits[0].timestamp.as_deref(), Some("2024-03-01T03:00:00Z"));
    }

    #[test]
    fn sparse_snapshot_parses_with_defaults() {
        let snapshot: PrSnapshot = serde_json::from_str(r#"{"title": "bare"}"#).unwrap();
        assert_eq!(snapshot.number, None);
        assert!(snapshot.comments.nodes.is_empty());
        assert!(snapshot.commits.nodes.is_empty());

        let diffs: HashMap<String, String> = HashMap::new();
        assert!(snapshot.commit_records(&diffs).is_empty());
    }
}
