use crate::config::Config;
use crate::sequencer::{EmptyStepPolicy, FailurePolicy};
use clap::Args;

/// Run-behavior flags shared by commands that replay a plan
#[derive(Args, Clone, Default, Debug)]
pub struct RunParams {
    /// Override what happens when a step stages no changes
    #[arg(long = "on-empty", value_enum, help = "What to do when a step stages no changes")]
    pub on_empty_step: Option<EmptyStepPolicy>,

    /// Override what happens to created commits when a step fails
    #[arg(
        long = "on-failure",
        value_enum,
        help = "What to do with commits from this run when a step fails"
    )]
    pub on_failure: Option<FailurePolicy>,

    /// Skip git's pre-commit and commit-msg hooks
    #[arg(long, help = "Skip git's pre-commit and commit-msg hooks")]
    pub no_verify: bool,
}

impl RunParams {
    /// Apply the flags on top of `config`. Returns whether anything changed.
    pub fn apply_to_config(&self, config: &mut Config) -> bool {
        let mut changes_made = false;

        if let Some(policy) = self.on_empty_step
            && config.run.on_empty_step != policy
        {
            config.run.on_empty_step = policy;
            changes_made = true;
        }

        if let Some(policy) = self.on_failure
            && config.run.on_failure != policy
        {
            config.run.on_failure = policy;
            changes_made = true;
        }

        if self.no_verify && config.run.verify {
            config.run.verify = false;
            changes_made = true;
        }

        changes_made
    }
}
