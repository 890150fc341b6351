use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime};
use std::fmt;
use std::str::FromStr;

use crate::sequencer::Authorship;

/// Zone-less layouts accepted for a civil timestamp.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Layouts accepted for a timestamp carrying a fixed numeric offset.
const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%z",
];

/// A civil date-time as written in a plan.
///
/// The original text is kept verbatim and is what gets handed to git, so the
/// recorded value matches the plan byte for byte. Text with leading or
/// trailing whitespace is rejected rather than trimmed. Years git would
/// silently rewrite (before 1970 or after 2099) are rejected too. Parsing
/// only validates the text and exposes the wall-clock reading; no timezone
/// database is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CivilTimestamp {
    raw: String,
    local: NaiveDateTime,
    offset: Option<FixedOffset>,
}

/// Earliest and latest years git can store in a commit date.
const GIT_YEARS: std::ops::RangeInclusive<i32> = 1970..=2099;

/// Error returned when a timestamp string is not a usable civil date-time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampParseError {
    #[error("'{value}' is not a date-time like 2025-01-01T10:00:00 or 2025-01-01T10:00:00+02:00")]
    Malformed { value: String },
    #[error("'{value}' has surrounding whitespace")]
    Padded { value: String },
    #[error("'{value}' is outside the years git can record (1970 to 2099)")]
    OutOfRange { value: String },
}

impl CivilTimestamp {
    /// The timestamp exactly as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Wall-clock reading, without any offset applied.
    pub fn local(&self) -> NaiveDateTime {
        self.local
    }

    /// The explicit offset, if the timestamp carried one.
    pub fn offset(&self) -> Option<FixedOffset> {
        self.offset
    }
}

impl FromStr for CivilTimestamp {
    type Err = TimestampParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() != s {
            return Err(TimestampParseError::Padded {
                value: s.to_string(),
            });
        }

        let (local, offset) = parse_civil(s).ok_or_else(|| TimestampParseError::Malformed {
            value: s.to_string(),
        })?;

        if !GIT_YEARS.contains(&local.year()) {
            return Err(TimestampParseError::OutOfRange {
                value: s.to_string(),
            });
        }

        Ok(Self {
            raw: s.to_string(),
            local,
            offset,
        })
    }
}

fn parse_civil(raw: &str) -> Option<(NaiveDateTime, Option<FixedOffset>)> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some((dt.naive_local(), Some(*dt.offset())));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some((dt.naive_local(), Some(*dt.offset())));
        }
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|local| (local, None))
}

impl fmt::Display for CivilTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One planned commit: the paths to stage, the message, and the dates to
/// record for author and committer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitStep {
    /// 1-based position of this step in its plan
    pub index: usize,
    /// Path patterns handed to `git add`
    pub files: Vec<String>,
    pub message: String,
    pub author_date: CivilTimestamp,
    pub committer_date: CivilTimestamp,
    /// Skip instead of failing when staging produces no changes
    pub optional: bool,
}

impl CommitStep {
    /// Create a step whose author and committer dates are the same.
    ///
    /// The index is assigned when the step is added to a [`super::CommitPlan`].
    pub fn new<I, S>(files: I, message: impl Into<String>, date: CivilTimestamp) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            index: 0,
            files: dedup_paths(files.into_iter().map(Into::into)),
            message: message.into(),
            committer_date: date.clone(),
            author_date: date,
            optional: false,
        }
    }

    pub fn with_committer_date(mut self, date: CivilTimestamp) -> Self {
        self.committer_date = date;
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// The override pair this step commits under.
    pub fn authorship(&self) -> Authorship {
        Authorship {
            author_date: self.author_date.as_str().to_string(),
            committer_date: self.committer_date.as_str().to_string(),
        }
    }

    /// First line of the message, for progress output.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Drop repeated paths, keeping the first occurrence.
pub(crate) fn dedup_paths(paths: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    paths.filter(|p| seen.insert(p.clone())).collect()
}
