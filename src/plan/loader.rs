use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::step::dedup_paths;
use super::{CivilTimestamp, CommitPlan, CommitStep};
use crate::log_debug;

/// Errors raised while reading or validating a plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("failed to read plan file '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse plan{}", path.as_ref().map(|p| format!(" '{}'", p.display())).unwrap_or_default())]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: toml::de::Error,
    },
    #[error("plan contains no steps")]
    Empty,
    #[error("step {step} lists no files to stage")]
    NoFiles { step: usize },
    #[error("step {step} has an empty commit message")]
    BlankMessage { step: usize },
    #[error("step {step} has an invalid {field}")]
    InvalidTimestamp {
        step: usize,
        field: &'static str,
        #[source]
        source: super::TimestampParseError,
    },
    #[error("cannot resume from step {from}: plan has {len} steps")]
    ResumeOutOfRange { from: usize, len: usize },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanFile {
    #[serde(default, rename = "step")]
    steps: Vec<StepEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepEntry {
    files: Vec<String>,
    message: String,
    author_date: String,
    /// Defaults to `author_date`
    committer_date: Option<String>,
    #[serde(default)]
    optional: bool,
}

impl StepEntry {
    fn into_step(self, index: usize) -> Result<CommitStep, PlanError> {
        let author_date: CivilTimestamp =
            self.author_date
                .parse()
                .map_err(|source| PlanError::InvalidTimestamp {
                    step: index,
                    field: "author_date",
                    source,
                })?;

        let committer_date = match self.committer_date {
            Some(raw) => raw.parse().map_err(|source| PlanError::InvalidTimestamp {
                step: index,
                field: "committer_date",
                source,
            })?,
            None => author_date.clone(),
        };

        Ok(CommitStep {
            index,
            files: dedup_paths(self.files.into_iter()),
            message: self.message,
            author_date,
            committer_date,
            optional: self.optional,
        })
    }
}

/// Read a TOML plan from disk.
pub fn load_plan(path: &Path) -> Result<CommitPlan, PlanError> {
    log_debug!("Loading plan from {}", path.display());
    let content = fs::read_to_string(path).map_err(|source| PlanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let plan = parse_plan(&content, Some(path))?;
    log_debug!("Loaded plan with {} steps", plan.len());
    Ok(plan)
}

pub(super) fn parse_plan(content: &str, path: Option<&Path>) -> Result<CommitPlan, PlanError> {
    let file: PlanFile = toml::from_str(content).map_err(|source| PlanError::Parse {
        path: path.map(Path::to_path_buf),
        source,
    })?;

    let steps = file
        .steps
        .into_iter()
        .enumerate()
        .map(|(position, entry)| entry.into_step(position + 1))
        .collect::<Result<Vec<_>, _>>()?;

    CommitPlan::new(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_STEPS: &str = r#"
[[step]]
files = ["a.txt"]
message = "init"
author_date = "2025-01-01T10:00:00"

[[step]]
files = ["b.txt", "b.txt"]
message = "add b"
author_date = "2025-01-01T10:05:00"
committer_date = "2025-01-01T11:00:00"

[[step]]
files = ["a.txt"]
message = "update a"
author_date = "2025-01-01T10:10:00"
optional = true
"#;

    #[test]
    fn test_parse_plan() {
        let plan = CommitPlan::from_toml_str(THREE_STEPS).expect("valid plan");
        let steps = plan.steps();

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].message, "init");
        assert_eq!(steps[0].committer_date.as_str(), "2025-01-01T10:00:00");
        assert_eq!(steps[1].files, vec!["b.txt"]);
        assert_eq!(steps[1].committer_date.as_str(), "2025-01-01T11:00:00");
        assert!(steps[2].optional);
        assert_eq!(steps[2].index, 3);
    }

    #[test]
    fn test_bad_timestamp_names_step_and_field() {
        let content = r#"
[[step]]
files = ["a.txt"]
message = "init"
author_date = "2025-01-01T10:00:00"

[[step]]
files = ["b.txt"]
message = "add b"
author_date = "2025-01-01T10:05:00"
committer_date = "soon"
"#;
        let err = CommitPlan::from_toml_str(content).expect_err("invalid timestamp");
        assert!(matches!(
            err,
            PlanError::InvalidTimestamp {
                step: 2,
                field: "committer_date",
                ..
            }
        ));
    }

    #[test]
    fn test_empty_and_malformed_plans() {
        assert!(matches!(CommitPlan::from_toml_str(""), Err(PlanError::Empty)));
        assert!(matches!(
            CommitPlan::from_toml_str("[[step]]\nfiles = 3"),
            Err(PlanError::Parse { path: None, .. })
        ));
        assert!(matches!(
            CommitPlan::from_toml_str(
                "[[step]]\nfiles = [\"a\"]\nmessage = \"m\"\nauthor_date = \"2025-01-01T10:00:00\"\nextra = 1"
            ),
            Err(PlanError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_plan_missing_file() {
        let err = load_plan(Path::new("/nonexistent/plan.toml")).expect_err("missing");
        assert!(matches!(err, PlanError::Io { .. }));
    }
}
