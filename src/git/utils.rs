use std::path::Path;
use std::process::{Command, Stdio};

use crate::log_debug;
use crate::sequencer::VcsError;

/// Checks if `dir` is inside a Git work tree.
pub fn is_inside_work_tree(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|exit| exit.success())
}

/// Executes a git command in `dir` and returns its trimmed stdout.
///
/// `envs` are set on the child process only.
///
/// # Arguments
///
/// * `dir` - Working directory for the command
/// * `args` - The arguments to pass to git
/// * `envs` - Extra environment variables for this invocation
pub fn run_git_command(
    dir: &Path,
    args: &[&str],
    envs: &[(&str, &str)],
) -> Result<String, VcsError> {
    let command_line = format!("git {}", args.join(" "));
    log_debug!("Running `{}` in {}", command_line, dir.display());

    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .envs(envs.iter().copied())
        .stdin(Stdio::null())
        .output()
        .map_err(|source| VcsError::Spawn {
            command: command_line.clone(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        log_debug!("`{}` failed: {}", command_line, stderr);
        return Err(VcsError::CommandFailed {
            command: command_line,
            code: output.status.code(),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
