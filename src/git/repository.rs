use crate::git::commit::{self, RecentCommit};
use crate::git::utils::{is_inside_work_tree, run_git_command};
use crate::log_debug;
use crate::sequencer::VcsError;
use anyhow::{Context as AnyhowContext, Result, anyhow};
use git2::{ErrorCode, Repository, ResetType, Tree};
use std::env;
use std::path::{Path, PathBuf};

/// Represents a Git repository and provides methods for interacting with it.
#[derive(Debug, Clone)]
pub struct GitRepo {
    repo_path: PathBuf,
}

impl GitRepo {
    /// Creates a new `GitRepo` instance from the root of a work tree.
    pub fn new(repo_path: &Path) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
        }
    }

    /// Finds the work tree containing `dir`, or the current directory.
    pub fn discover(dir: Option<&Path>) -> Result<Self> {
        let start = match dir {
            Some(dir) => dir.to_path_buf(),
            None => env::current_dir().context("Failed to read current directory")?,
        };
        let root = Self::get_repo_root(&start)?;
        log_debug!("Using repository at {}", root.display());
        Ok(Self::new(&root))
    }

    /// Get the root directory of the git repository containing `dir`
    pub fn get_repo_root(dir: &Path) -> Result<PathBuf> {
        if !is_inside_work_tree(dir) {
            return Err(anyhow!(
                "Not in a Git repository: {}. Run from within a work tree or pass -C <dir>.",
                dir.display()
            ));
        }

        let root = run_git_command(dir, &["rev-parse", "--show-toplevel"], &[])
            .context("Failed to get repository root")?;
        Ok(PathBuf::from(root))
    }

    /// Open the repository at the stored path
    pub fn open_repo(&self) -> Result<Repository, git2::Error> {
        Repository::open(&self.repo_path)
    }

    /// Returns the repository path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Run git in this repository.
    pub fn run_git(&self, args: &[&str], envs: &[(&str, &str)]) -> Result<String, VcsError> {
        run_git_command(&self.repo_path, args, envs)
    }

    /// Retrieves the current branch name.
    pub fn get_current_branch(&self) -> Result<String> {
        let repo = self.open_repo()?;
        let head = repo.find_reference("HEAD")?;
        let branch = match head.symbolic_target() {
            Some(target) => target.trim_start_matches("refs/heads/").to_string(),
            None => "HEAD detached".to_string(),
        };
        log_debug!("Current branch: {}", branch);
        Ok(branch)
    }

    /// Id of the commit HEAD points at, `None` while the branch is unborn.
    pub fn head_id(&self) -> Result<Option<String>, git2::Error> {
        let repo = self.open_repo()?;
        match repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?.id().to_string())),
            Err(e) if is_unborn(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether the index differs from the HEAD tree.
    pub fn has_staged_changes(&self) -> Result<bool, git2::Error> {
        let repo = self.open_repo()?;
        let head_tree = Self::head_tree(&repo)?;
        let index = repo.index()?;
        let diff = repo.diff_tree_to_index(head_tree.as_ref(), Some(&index), None)?;
        let staged = diff.deltas().len();
        log_debug!("{} staged changes", staged);
        Ok(staged > 0)
    }

    /// Paths currently staged relative to HEAD.
    pub fn staged_paths(&self) -> Result<Vec<String>, git2::Error> {
        let repo = self.open_repo()?;
        let head_tree = Self::head_tree(&repo)?;
        let index = repo.index()?;
        let diff = repo.diff_tree_to_index(head_tree.as_ref(), Some(&index), None)?;
        Ok(diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .and_then(|p| p.to_str())
                    .map(str::to_string)
            })
            .collect())
    }

    /// Move the current branch and the index to `target`, keeping the work
    /// tree. `None` deletes the branch so it is unborn again.
    pub fn reset_to(&self, target: Option<&str>) -> Result<(), git2::Error> {
        let repo = self.open_repo()?;

        if let Some(id) = target {
            log_debug!("Resetting (mixed) to {}", id);
            let object = repo.revparse_single(id)?;
            return repo.reset(&object, ResetType::Mixed, None);
        }

        log_debug!("Resetting branch to unborn");
        let branch_ref = repo
            .find_reference("HEAD")?
            .symbolic_target()
            .map(str::to_string);
        if let Some(name) = branch_ref {
            match repo.find_reference(&name) {
                Ok(mut reference) => reference.delete()?,
                Err(e) if e.code() == ErrorCode::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        let mut index = repo.index()?;
        index.clear()?;
        index.write()
    }

    /// Retrieves the most recent commits, newest first.
    ///
    /// # Arguments
    ///
    /// * `count` - The number of recent commits to retrieve.
    pub fn get_recent_commits(&self, count: usize) -> Result<Vec<RecentCommit>> {
        let repo = self.open_repo()?;
        if self.head_id()?.is_none() {
            return Ok(Vec::new());
        }

        log_debug!("Fetching {} recent commits", count);
        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;

        let commits = revwalk
            .take(count)
            .map(|oid| {
                let commit = repo.find_commit(oid?)?;
                commit::extract_commit_info(&repo, &commit)
            })
            .collect::<Result<Vec<_>>>()?;

        log_debug!("Retrieved {} recent commits", commits.len());
        Ok(commits)
    }

    fn head_tree(repo: &Repository) -> Result<Option<Tree<'_>>, git2::Error> {
        match repo.head() {
            Ok(head) => Ok(Some(head.peel_to_tree()?)),
            Err(e) if is_unborn(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn is_unborn(e: &git2::Error) -> bool {
    matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}
