//! git-chronicle - replay a planned, timestamped commit history
//!
//! A plan lists commits in order: which paths to stage, the message, and the
//! author and committer dates to record. The [`sequencer::Sequencer`] applies
//! the plan one step at a time through a [`sequencer::Vcs`] backend.

#![allow(clippy::uninlined_format_args)] // Style preference
#![allow(clippy::return_self_not_must_use)] // Builder pattern is clear enough

pub mod cli;
pub mod common;
pub mod config;
pub mod git;
pub mod logger;
pub mod plan;
pub mod sequencer;
pub mod ui;

pub use config::Config;
pub use plan::{CivilTimestamp, CommitPlan, CommitStep, load_plan};
pub use sequencer::{RunOptions, RunReport, SequenceError, Sequencer, Vcs};
