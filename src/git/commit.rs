use anyhow::{Result, anyhow};
use chrono::{DateTime, FixedOffset, Utc};
use git2::Repository;

use crate::plan::CivilTimestamp;
use crate::sequencer::CommitRecord;

/// A commit as git recorded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentCommit {
    pub hash: String,
    pub message: String,
    /// Author date as wall-clock time at the recorded offset
    pub author_date: String,
    /// Committer date as wall-clock time at the recorded offset
    pub committer_date: String,
    pub file_paths: Vec<String>,
}

/// Render a git timestamp as `YYYY-MM-DDTHH:MM:SS` in its own offset.
pub fn civil_time(time: git2::Time) -> Result<String> {
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60)
        .ok_or_else(|| anyhow!("Invalid offset: {} minutes", time.offset_minutes()))?;
    let instant = DateTime::<Utc>::from_timestamp(time.seconds(), 0)
        .ok_or_else(|| anyhow!("Invalid timestamp: {}", time.seconds()))?;
    Ok(instant
        .with_timezone(&offset)
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string())
}

/// Collects information about a specific commit
pub fn extract_commit_info(repo: &Repository, commit: &git2::Commit<'_>) -> Result<RecentCommit> {
    Ok(RecentCommit {
        hash: commit.id().to_string(),
        message: commit.message().unwrap_or_default().to_string(),
        author_date: civil_time(commit.author().when())?,
        committer_date: civil_time(commit.committer().when())?,
        file_paths: get_file_paths_for_commit(repo, commit)?,
    })
}

/// Gets just the file paths a commit touched
pub fn get_file_paths_for_commit(
    repo: &Repository,
    commit: &git2::Commit<'_>,
) -> Result<Vec<String>> {
    let commit_tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0)?.tree()?)
    } else {
        None
    };

    let mut file_paths = Vec::new();
    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&commit_tree), None)?;

    diff.foreach(
        &mut |delta, _| {
            let path = delta.new_file().path().or_else(|| delta.old_file().path());
            if let Some(path) = path.and_then(|p| p.to_str()) {
                match delta.status() {
                    git2::Delta::Added | git2::Delta::Modified | git2::Delta::Deleted => {
                        file_paths.push(path.to_string());
                    }
                    _ => {}
                }
            }
            true
        },
        None,
        None,
        None,
    )?;

    Ok(file_paths)
}

/// Compare what git recorded with what a run asked for.
///
/// `recorded` must be in the same (oldest first) order as `records`. A
/// planned date is compared as wall-clock time, since git stores a zone-less
/// date at the offset it resolved locally. Returns one line per mismatch.
pub fn date_mismatches(recorded: &[RecentCommit], records: &[CommitRecord]) -> Vec<String> {
    let mut mismatches = Vec::new();

    for (commit, record) in recorded.iter().zip(records) {
        if commit.hash != record.id {
            mismatches.push(format!(
                "step {}: expected commit {}, found {}",
                record.step, record.id, commit.hash
            ));
            continue;
        }

        let pairs = [
            ("author", &record.author_date, &commit.author_date),
            ("committer", &record.committer_date, &commit.committer_date),
        ];
        for (role, planned, actual) in pairs {
            let expected = planned
                .parse::<CivilTimestamp>()
                .map(|t| t.local().format("%Y-%m-%dT%H:%M:%S").to_string());
            if expected.as_deref() != Ok(actual.as_str()) {
                mismatches.push(format!(
                    "step {}: {role} date is {actual}, plan says {planned}",
                    record.step
                ));
            }
        }
    }

    mismatches
}
