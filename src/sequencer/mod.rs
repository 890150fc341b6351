//! Commit sequencer
//!
//! Replays a [`CommitPlan`] one step at a time: acquire the step's date
//! overrides, stage its files, commit with its message, release the
//! overrides, move on. The version-control tool sits behind the [`Vcs`]
//! trait; `crate::git::GitCli` is the real implementation.

mod authorship;
mod error;

pub use authorship::{
    AUTHOR_DATE_VAR, Authorship, AuthorshipContext, AuthorshipScope, COMMITTER_DATE_VAR,
};
pub use error::{SequenceError, StagingError, VcsError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::plan::{CommitPlan, CommitStep};
use crate::{log_debug, log_error, log_info, log_warn};

/// The version-control operations a run needs.
///
/// Every call is synchronous and returns once the tool is done.
pub trait Vcs {
    /// Stage exactly the given path patterns.
    fn stage(&mut self, paths: &[String]) -> Result<(), VcsError>;

    /// Whether the index differs from HEAD.
    fn has_staged_changes(&mut self) -> Result<bool, VcsError>;

    /// Commit the index, recording the dates held by `scope`.
    ///
    /// Returns the id of the new commit.
    fn commit(&mut self, message: &str, scope: &AuthorshipScope<'_>) -> Result<String, VcsError>;

    /// Current HEAD commit id, `None` on an unborn branch.
    fn head(&mut self) -> Result<Option<String>, VcsError>;

    /// Move the branch and index back to `head`, leaving the working tree
    /// alone. `None` returns the branch to unborn.
    fn reset_to(&mut self, head: Option<&str>) -> Result<(), VcsError>;
}

impl<V: Vcs + ?Sized> Vcs for &mut V {
    fn stage(&mut self, paths: &[String]) -> Result<(), VcsError> {
        (**self).stage(paths)
    }

    fn has_staged_changes(&mut self) -> Result<bool, VcsError> {
        (**self).has_staged_changes()
    }

    fn commit(&mut self, message: &str, scope: &AuthorshipScope<'_>) -> Result<String, VcsError> {
        (**self).commit(message, scope)
    }

    fn head(&mut self) -> Result<Option<String>, VcsError> {
        (**self).head()
    }

    fn reset_to(&mut self, head: Option<&str>) -> Result<(), VcsError> {
        (**self).reset_to(head)
    }
}

/// What to do with a step whose files stage no changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmptyStepPolicy {
    /// Stop the run
    #[default]
    Abort,
    /// Warn and continue with the next step
    Skip,
}

/// What to do with already-created commits when a run fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep them for manual inspection
    #[default]
    Leave,
    /// Reset the branch to where the run started
    Rollback,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub on_empty_step: EmptyStepPolicy,
    pub on_failure: FailurePolicy,
}

/// Where a sequencer is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running { step: usize },
    Completed,
    FailedAt { step: Option<usize> },
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Running { step } => write!(f, "running step {step}"),
            Self::Completed => write!(f, "completed"),
            Self::FailedAt { step: Some(step) } => write!(f, "failed at step {step}"),
            Self::FailedAt { step: None } => write!(f, "failed"),
        }
    }
}

/// A commit created by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub step: usize,
    pub id: String,
    pub message: String,
    pub author_date: String,
    pub committer_date: String,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Created commits, in plan order
    pub commits: Vec<CommitRecord>,
    /// Indices of steps skipped because they staged nothing
    pub skipped: Vec<usize>,
}

/// Progress notifications emitted while a run is under way.
#[derive(Debug)]
pub enum SequenceEvent<'a> {
    StepStarted { step: &'a CommitStep, total: usize },
    StepCommitted { record: &'a CommitRecord },
    StepSkipped { step: &'a CommitStep },
}

type Observer = Box<dyn FnMut(&SequenceEvent<'_>)>;

enum StepOutcome {
    Committed(CommitRecord),
    Skipped,
}

/// Replays commit plans against a [`Vcs`].
pub struct Sequencer<V: Vcs> {
    vcs: V,
    options: RunOptions,
    authorship: AuthorshipContext,
    cancel: Option<Arc<AtomicBool>>,
    observer: Option<Observer>,
    state: RunState,
    committed: Vec<CommitRecord>,
    /// Whether the current run has staged anything yet
    touched: bool,
}

impl<V: Vcs> Sequencer<V> {
    pub fn new(vcs: V, options: RunOptions) -> Self {
        Self {
            vcs,
            options,
            authorship: AuthorshipContext::new(),
            cancel: None,
            observer: None,
            state: RunState::NotStarted,
            committed: Vec::new(),
            touched: false,
        }
    }

    /// Stop before the next step once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_observer(mut self, observer: impl FnMut(&SequenceEvent<'_>) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Commits created by the last run, including one that failed part way.
    pub fn committed(&self) -> &[CommitRecord] {
        &self.committed
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    pub fn into_vcs(self) -> V {
        self.vcs
    }

    /// Replay every step of `plan` in order.
    ///
    /// Stops at the first failing step. Commits made before it stay in place
    /// unless the failure policy is [`FailurePolicy::Rollback`]. Nothing is
    /// retried.
    pub fn run(&mut self, plan: &CommitPlan) -> Result<RunReport, SequenceError> {
        let _run = tracing::info_span!("replay", steps = plan.len()).entered();
        self.committed.clear();
        self.touched = false;
        self.state = RunState::NotStarted;

        let start_head = match self.options.on_failure {
            FailurePolicy::Rollback => match self.vcs.head() {
                Ok(head) => Some(head),
                Err(e) => {
                    self.state = RunState::FailedAt { step: None };
                    return Err(SequenceError::Head(e));
                }
            },
            FailurePolicy::Leave => None,
        };

        log_info!(
            "Replaying {} steps (empty steps: {:?}, on failure: {:?})",
            plan.len(),
            self.options.on_empty_step,
            self.options.on_failure
        );

        let mut report = RunReport::default();
        let outcome = self.run_steps(plan, &mut report);
        let cleanup = self.authorship.ensure_released();

        let error = match (outcome, cleanup) {
            (Ok(()), Ok(())) => {
                self.state = RunState::Completed;
                log_info!(
                    "Run completed: {} commits, {} skipped",
                    report.commits.len(),
                    report.skipped.len()
                );
                return Ok(report);
            }
            (Ok(()), Err(cleanup_error)) => cleanup_error,
            (Err(step_error), Err(cleanup_error)) => {
                log_error!("{}", cleanup_error);
                step_error
            }
            (Err(step_error), Ok(())) => step_error,
        };

        self.state = RunState::FailedAt { step: error.step() };
        log_error!("Run stopped: {}", error);

        match start_head {
            // A run refused before staging anything leaves the index alone
            Some(head) if self.touched => Err(self.roll_back(head.as_deref(), error)),
            _ => {
                if !self.committed.is_empty() {
                    log_warn!(
                        "Leaving {} commits from this run in place",
                        self.committed.len()
                    );
                }
                Err(error)
            }
        }
    }

    fn run_steps(
        &mut self,
        plan: &CommitPlan,
        report: &mut RunReport,
    ) -> Result<(), SequenceError> {
        let total = plan.len();

        if let Some(first) = plan.steps().first() {
            let dirty = self.vcs.has_staged_changes().map_err(|e| SequenceError::Staging {
                step: first.index,
                message: first.message.clone(),
                source: StagingError::Rejected(e),
            })?;
            if dirty {
                return Err(SequenceError::PreStaged {
                    step: first.index,
                    message: first.message.clone(),
                });
            }
        }

        for step in plan.steps() {
            if self.cancel_requested() {
                return Err(SequenceError::Cancelled {
                    step: step.index,
                    message: step.message.clone(),
                });
            }

            self.state = RunState::Running { step: step.index };
            self.notify(&SequenceEvent::StepStarted { step, total });

            match self.run_step(step)? {
                StepOutcome::Committed(record) => {
                    self.notify(&SequenceEvent::StepCommitted { record: &record });
                    self.committed.push(record.clone());
                    report.commits.push(record);
                }
                StepOutcome::Skipped => {
                    self.notify(&SequenceEvent::StepSkipped { step });
                    report.skipped.push(step.index);
                }
            }
        }

        Ok(())
    }

    fn run_step(&mut self, step: &CommitStep) -> Result<StepOutcome, SequenceError> {
        let _span = tracing::debug_span!("step", index = step.index).entered();
        log_debug!(
            "Step {}: staging {:?} (author {}, committer {})",
            step.index,
            step.files,
            step.author_date,
            step.committer_date
        );

        let scope = self
            .authorship
            .acquire(step.index, &step.message, step.authorship());

        let staging_error = |source| SequenceError::Staging {
            step: step.index,
            message: step.message.clone(),
            source,
        };

        self.touched = true;
        self.vcs
            .stage(&step.files)
            .map_err(|e| staging_error(StagingError::Rejected(e)))?;

        let has_changes = self
            .vcs
            .has_staged_changes()
            .map_err(|e| staging_error(StagingError::Rejected(e)))?;

        if !has_changes {
            if step.optional || self.options.on_empty_step == EmptyStepPolicy::Skip {
                log_warn!(
                    "Step {} ({:?}) staged no changes; skipping",
                    step.index,
                    step.summary()
                );
                return Ok(StepOutcome::Skipped);
            }
            return Err(staging_error(StagingError::NothingStaged {
                patterns: step.files.clone(),
            }));
        }

        let id = self
            .vcs
            .commit(&step.message, &scope)
            .map_err(|source| SequenceError::Commit {
                step: step.index,
                message: step.message.clone(),
                source,
            })?;
        drop(scope);

        log_info!("Step {} committed as {}", step.index, short_id(&id));

        let authorship = step.authorship();
        Ok(StepOutcome::Committed(CommitRecord {
            step: step.index,
            id,
            message: step.message.clone(),
            author_date: authorship.author_date,
            committer_date: authorship.committer_date,
        }))
    }

    fn roll_back(&mut self, head: Option<&str>, failure: SequenceError) -> SequenceError {
        log_warn!(
            "Rolling back {} commits to {}",
            self.committed.len(),
            head.map_or("an unborn branch", short_id)
        );
        match self.vcs.reset_to(head) {
            Ok(()) => {
                self.committed.clear();
                failure
            }
            Err(source) => SequenceError::Rollback {
                failure: Box::new(failure),
                source,
            },
        }
    }

    fn cancel_requested(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn notify(&mut self, event: &SequenceEvent<'_>) {
        if let Some(observer) = self.observer.as_mut() {
            observer(event);
        }
    }
}

/// Abbreviated commit id for display.
pub fn short_id(id: &str) -> &str {
    id.get(..7).unwrap_or(id)
}
