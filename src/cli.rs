use crate::common::RunParams;
use crate::config::Config;
use crate::git::{GitCli, GitRepo, date_mismatches};
use crate::plan::{CommitPlan, load_plan};
use crate::sequencer::{
    AUTHOR_DATE_VAR, COMMITTER_DATE_VAR, CommitRecord, FailurePolicy, SequenceError,
    SequenceEvent, Sequencer,
};
use crate::{log_debug, ui};
use anyhow::{Context, Result, anyhow};
use clap::builder::{Styles, styling::AnsiColor};
use clap::{Parser, Subcommand, crate_version};
use colored::Colorize;
use std::path::{Path, PathBuf};

const LOG_FILE: &str = "git-chronicle-debug.log";

/// CLI structure defining the available commands and global arguments
#[derive(Parser)]
#[command(
    author,
    version = crate_version!(),
    about = "git-chronicle: replay a planned, timestamped commit history",
    long_about = "git-chronicle stages and commits files step by step from a plan, recording the author and committer dates each step specifies.",
    disable_version_flag = true,
    styles = get_styles(),
)]
pub struct Cli {
    /// Subcommands available for the CLI
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log debug messages to a file
    #[arg(
        short = 'l',
        long = "log",
        global = true,
        help = "Log debug messages to a file"
    )]
    pub log: bool,

    /// Specify a custom log file path
    #[arg(
        long = "log-file",
        global = true,
        help = "Specify a custom log file path"
    )]
    pub log_file: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(
        short = 'q',
        long = "quiet",
        global = true,
        help = "Suppress non-essential output"
    )]
    pub quiet: bool,

    /// Display the version
    #[arg(
        short = 'v',
        long = "version",
        global = true,
        help = "Display the version"
    )]
    pub version: bool,

    /// Repository directory to operate on
    #[arg(
        short = 'C',
        long = "repo-dir",
        global = true,
        help = "Run as if started in this directory"
    )]
    pub repo_dir: Option<PathBuf>,
}

/// Enumeration of available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Replay a plan into the repository
    #[command(
        about = "Replay a plan into the repository",
        long_about = "Stage and commit every step of a plan in order. The run stops at the first failing step; earlier commits are kept unless --on-failure rollback is given. Resume with --from <step>."
    )]
    Run {
        /// Path to the TOML plan
        plan: PathBuf,

        #[command(flatten)]
        params: RunParams,

        /// Start at this step (1-based), skipping the ones before it
        #[arg(long, help = "Start at this step (1-based), skipping the ones before it")]
        from: Option<usize>,

        /// Print the steps that would run and exit
        #[arg(long, help = "Print the steps that would run and exit")]
        dry_run: bool,
    },

    /// Validate a plan and list its steps
    #[command(about = "Validate a plan and list its steps")]
    Check {
        /// Path to the TOML plan
        plan: PathBuf,
    },
}

/// Define custom styles for Clap
fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Magenta.on_default().bold())
        .usage(AnsiColor::Cyan.on_default().bold())
        .literal(AnsiColor::Green.on_default().bold())
        .placeholder(AnsiColor::Yellow.on_default())
        .valid(AnsiColor::Blue.on_default().bold())
        .invalid(AnsiColor::Red.on_default().bold())
        .error(AnsiColor::Red.on_default().bold())
}

/// Parse the command-line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Main function to parse arguments and handle the command
pub fn main() -> Result<()> {
    let cli = parse_args();

    if cli.version {
        ui::print_version(crate_version!());
        return Ok(());
    }

    if cli.log {
        crate::logger::enable_logging();
        let log_file = cli
            .log_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(LOG_FILE));
        crate::logger::set_log_file(&log_file)
            .with_context(|| format!("Failed to open log file {}", log_file.display()))?;
    } else {
        crate::logger::disable_logging();
    }

    if cli.quiet {
        ui::set_quiet_mode(true);
    }

    match cli.command {
        Some(command) => handle_command(command, cli.repo_dir.as_deref()),
        None => {
            ui::print_info("Nothing to do. Try `git-chronicle run <plan.toml>` or --help.");
            Ok(())
        }
    }
}

/// Dispatch a parsed subcommand
pub fn handle_command(command: Commands, repo_dir: Option<&Path>) -> Result<()> {
    match command {
        Commands::Run {
            plan,
            params,
            from,
            dry_run,
        } => handle_run(&plan, &params, from, dry_run, repo_dir),
        Commands::Check { plan } => handle_check(&plan),
    }
}

fn handle_check(plan_path: &Path) -> Result<()> {
    let plan = load_plan(plan_path)?;
    ui::print_message(&ui::create_secondary_gradient_text(&format!(
        "{} steps in {}",
        plan.len(),
        plan_path.display()
    )));
    print_plan(&plan);
    ui::print_success("Plan is valid.");
    Ok(())
}

fn handle_run(
    plan_path: &Path,
    params: &RunParams,
    from: Option<usize>,
    dry_run: bool,
    repo_dir: Option<&Path>,
) -> Result<()> {
    let mut plan = load_plan(plan_path)?;
    if let Some(index) = from {
        plan = plan.starting_at(index)?;
    }

    if dry_run {
        ui::print_info(&format!("Would replay {} steps:", plan.len()));
        print_plan(&plan);
        return Ok(());
    }

    let repo = GitRepo::discover(repo_dir)?;
    let mut config = Config::load(Some(repo.repo_path()))?;
    crate::logger::set_verbose_logging(config.logging.verbose);
    if params.apply_to_config(&mut config) {
        log_debug!("Command-line flags changed the run configuration: {:?}", config.run);
    }

    warn_about_inherited_overrides();

    let spinner = ui::create_spinner("Preparing replay...");
    let progress = spinner.clone();
    let backend = GitCli::new(repo.clone(), config.run.verify);
    let mut sequencer = Sequencer::new(backend, config.run_options()).with_observer(move |event| {
        match event {
            SequenceEvent::StepStarted { step, total } => {
                progress.set_message(format!("[{}/{}] {}", step.index, total, step.summary()));
            }
            SequenceEvent::StepCommitted { record } => {
                progress.println(ui::format_commit_line(record));
            }
            SequenceEvent::StepSkipped { step } => {
                progress.println(format!(
                    "{:>3}. {} {}",
                    step.index,
                    "skipped".yellow(),
                    step.summary()
                ));
            }
        }
    });

    let result = sequencer.run(&plan);
    spinner.finish_and_clear();

    match result {
        Ok(report) => {
            if !report.skipped.is_empty() {
                ui::print_warning(&format!(
                    "Skipped {} steps that staged nothing: {:?}",
                    report.skipped.len(),
                    report.skipped
                ));
            }
            check_recorded_dates(&repo, &report.commits)?;
            ui::print_success(&format!(
                "Replayed {} commits on {}.",
                report.commits.len(),
                repo.get_current_branch()?
            ));
            Ok(())
        }
        Err(error) => {
            // A completed rollback removed this run's commits, so the whole
            // plan has to be replayed again.
            let rolled_back = config.run.on_failure == FailurePolicy::Rollback
                && !matches!(error, SequenceError::Rollback { .. });
            let resume_at = if rolled_back {
                plan.steps().first().map(|step| step.index)
            } else {
                error.step()
            };
            print_failure_hint(resume_at, sequencer.committed().len());
            Err(error.into())
        }
    }
}

/// Read the new commits back and fail if git recorded other dates.
fn check_recorded_dates(repo: &GitRepo, records: &[CommitRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let mut recorded = repo.get_recent_commits(records.len())?;
    recorded.reverse();
    let problems = date_mismatches(&recorded, records);
    if problems.is_empty() {
        return Ok(());
    }

    for problem in &problems {
        ui::print_warning(problem);
    }
    Err(anyhow!(
        "git recorded dates that differ from the plan ({} mismatches)",
        problems.len()
    ))
}

fn print_plan(plan: &CommitPlan) {
    for step in plan.steps() {
        let dates = if step.author_date == step.committer_date {
            step.author_date.to_string()
        } else {
            format!("{} / {}", step.author_date, step.committer_date)
        };
        let optional = if step.optional { " (optional)" } else { "" };
        ui::print_message(&format!(
            "{:>3}. {} {}{} [{}]",
            step.index,
            dates.cyan(),
            step.summary(),
            optional.yellow(),
            step.files.join(", ")
        ));
    }
}

/// Overrides inherited from the shell are replaced per commit, but would
/// still leak into any other git command the user runs from that shell.
fn warn_about_inherited_overrides() {
    for var in [AUTHOR_DATE_VAR, COMMITTER_DATE_VAR] {
        if std::env::var_os(var).is_some() {
            ui::print_warning(&format!(
                "{var} is set in your environment; each step overrides it, but unset it afterwards."
            ));
        }
    }
}

fn print_failure_hint(resume_at: Option<usize>, kept: usize) {
    if kept > 0 {
        ui::print_warning(&format!(
            "{kept} commits from this run were kept; nothing was rolled back."
        ));
    }
    if let Some(step) = resume_at {
        ui::print_warning(&format!(
            "Fix the problem, then resume with `git-chronicle run <plan> --from {step}`."
        ));
    }
}
