use std::io;

/// Failure reported by a version-control backend.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("failed to run `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {}: {stderr}", code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error(transparent)]
    Repository(#[from] git2::Error),
}

/// Why a step's files could not be staged.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("git refused to stage the files")]
    Rejected(#[source] VcsError),
    #[error("staging {} produced no changes", patterns.join(", "))]
    NothingStaged { patterns: Vec<String> },
}

/// Everything that can stop a run.
///
/// Each variant names the 1-based step it happened at so the operator can
/// resume from there.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("the index already has staged changes; step {step} ({message:?}) would commit them too")]
    PreStaged { step: usize, message: String },
    #[error("step {step} ({message:?}) could not be staged")]
    Staging {
        step: usize,
        message: String,
        #[source]
        source: StagingError,
    },
    #[error("step {step} ({message:?}) could not be committed")]
    Commit {
        step: usize,
        message: String,
        #[source]
        source: VcsError,
    },
    #[error("authorship overrides were still held by step {step} ({message:?}) after the run")]
    EnvironmentCleanup { step: usize, message: String },
    #[error("run cancelled before step {step} ({message:?})")]
    Cancelled { step: usize, message: String },
    #[error("could not read the current HEAD")]
    Head(#[source] VcsError),
    #[error("{failure}; rolling back to the starting commit also failed")]
    Rollback {
        failure: Box<SequenceError>,
        #[source]
        source: VcsError,
    },
}

impl SequenceError {
    /// The step the run stopped at, if the error belongs to one.
    pub fn step(&self) -> Option<usize> {
        match self {
            Self::PreStaged { step, .. }
            | Self::Staging { step, .. }
            | Self::Commit { step, .. }
            | Self::EnvironmentCleanup { step, .. }
            | Self::Cancelled { step, .. } => Some(*step),
            Self::Head(_) => None,
            Self::Rollback { failure, .. } => failure.step(),
        }
    }
}
