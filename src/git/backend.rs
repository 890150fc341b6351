use crate::git::GitRepo;
use crate::log_debug;
use crate::sequencer::{AuthorshipScope, Vcs, VcsError};

/// [`Vcs`] backed by the `git` binary.
///
/// Staging and committing go through the command line so hooks, signing and
/// the user's git config behave exactly as they would in a shell. Read-only
/// checks and resets use libgit2.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: GitRepo,
    verify: bool,
}

impl GitCli {
    /// * `verify` - Whether git should run pre-commit and commit-msg hooks
    pub fn new(repo: GitRepo, verify: bool) -> Self {
        Self { repo, verify }
    }

    pub fn repo(&self) -> &GitRepo {
        &self.repo
    }
}

impl Vcs for GitCli {
    fn stage(&mut self, paths: &[String]) -> Result<(), VcsError> {
        let mut args = vec!["add", "--all", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.repo.run_git(&args, &[])?;
        Ok(())
    }

    fn has_staged_changes(&mut self) -> Result<bool, VcsError> {
        Ok(self.repo.has_staged_changes()?)
    }

    fn commit(&mut self, message: &str, scope: &AuthorshipScope<'_>) -> Result<String, VcsError> {
        let mut args = vec!["commit", "--quiet", "-m", message];
        if !self.verify {
            args.push("--no-verify");
        }

        let envs = scope.env_vars();
        log_debug!("Committing step {} with {:?}", scope.step(), envs);
        self.repo.run_git(&args, &envs)?;

        self.repo.head_id()?.ok_or_else(|| {
            VcsError::Repository(git2::Error::from_str(
                "HEAD does not point at a commit after committing",
            ))
        })
    }

    fn head(&mut self) -> Result<Option<String>, VcsError> {
        Ok(self.repo.head_id()?)
    }

    fn reset_to(&mut self, head: Option<&str>) -> Result<(), VcsError> {
        Ok(self.repo.reset_to(head)?)
    }
}
