//! Commit plans: the ordered list of steps a run replays.

mod loader;
mod step;

pub use loader::{PlanError, load_plan};
pub use step::{CivilTimestamp, CommitStep, TimestampParseError};

/// An ordered, validated list of [`CommitStep`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPlan {
    steps: Vec<CommitStep>,
}

impl CommitPlan {
    /// Build a plan from steps in the order they should be committed.
    ///
    /// Steps are numbered from 1 in the given order.
    pub fn new(steps: Vec<CommitStep>) -> Result<Self, PlanError> {
        if steps.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut numbered = Vec::with_capacity(steps.len());
        for (position, mut step) in steps.into_iter().enumerate() {
            step.index = position + 1;
            if step.files.iter().all(|f| f.trim().is_empty()) {
                return Err(PlanError::NoFiles { step: step.index });
            }
            if step.message.trim().is_empty() {
                return Err(PlanError::BlankMessage { step: step.index });
            }
            numbered.push(step);
        }

        Ok(Self { steps: numbered })
    }

    /// Parse and validate a TOML plan.
    pub fn from_toml_str(content: &str) -> Result<Self, PlanError> {
        loader::parse_plan(content, None)
    }

    pub fn steps(&self) -> &[CommitStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The same plan with every step before `index` (1-based) removed.
    ///
    /// Steps keep their original numbering so errors and progress still
    /// point at the right line of the plan.
    pub fn starting_at(&self, index: usize) -> Result<Self, PlanError> {
        if index == 0 || index > self.steps.len() {
            return Err(PlanError::ResumeOutOfRange {
                from: index,
                len: self.steps.len(),
            });
        }

        Ok(Self {
            steps: self.steps[index - 1..].to_vec(),
        })
    }
}
