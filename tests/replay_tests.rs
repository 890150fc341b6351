// These drive the real git binary
#![cfg(target_os = "linux")]

use anyhow::Result;
use git_chronicle::git::{GitCli, GitRepo};
use git_chronicle::plan::{
    CivilTimestamp, CommitPlan, CommitStep, PlanError, TimestampParseError,
};
use git_chronicle::sequencer::{
    AUTHOR_DATE_VAR, COMMITTER_DATE_VAR, EmptyStepPolicy, FailurePolicy, RunOptions,
    SequenceError, Sequencer, StagingError,
};

use test_utils::{
    create_hook, history_messages, setup_empty_repo, setup_git_repo, write_file,
};

fn ts(s: &str) -> CivilTimestamp {
    s.parse().expect("valid timestamp")
}

fn step(files: &[&str], message: &str, date: &str) -> CommitStep {
    CommitStep::new(files.iter().copied(), message, ts(date))
}

fn backend(repo: &GitRepo) -> GitCli {
    GitCli::new(repo.clone(), true)
}

#[test]
fn test_example_scenario() -> Result<()> {
    let (temp_dir, repo) = setup_empty_repo();
    let dir = temp_dir.path();
    let env_before = (
        std::env::var_os(AUTHOR_DATE_VAR),
        std::env::var_os(COMMITTER_DATE_VAR),
    );

    let plan = CommitPlan::new(vec![
        step(&["a.txt"], "init", "2025-01-01T10:00:00"),
        step(&["b.txt"], "add b", "2025-01-01T10:05:00"),
        step(&["a.txt"], "update a", "2025-01-01T10:10:00"),
    ])?;

    write_file(dir, "a.txt", "one\n");
    write_file(dir, "b.txt", "bee\n");
    let first_two = CommitPlan::new(plan.steps()[..2].to_vec())?;
    let report = Sequencer::new(backend(&repo), RunOptions::default()).run(&first_two)?;
    assert_eq!(report.commits.len(), 2);

    write_file(dir, "a.txt", "two\n");
    let report =
        Sequencer::new(backend(&repo), RunOptions::default()).run(&plan.starting_at(3)?)?;
    assert_eq!(report.commits.len(), 1);
    assert_eq!(report.commits[0].step, 3);

    assert_eq!(history_messages(dir), vec!["init", "add b", "update a"]);

    let mut commits = repo.get_recent_commits(10)?;
    commits.reverse();
    assert_eq!(commits.len(), 3);

    let expected = [
        ("2025-01-01T10:00:00", vec!["a.txt"]),
        ("2025-01-01T10:05:00", vec!["b.txt"]),
        ("2025-01-01T10:10:00", vec!["a.txt"]),
    ];
    for (commit, (date, files)) in commits.iter().zip(expected) {
        assert_eq!(commit.author_date, date);
        assert_eq!(commit.committer_date, date);
        assert_eq!(commit.file_paths, files);
    }

    // Overrides only ever lived on the child processes
    assert_eq!(
        (
            std::env::var_os(AUTHOR_DATE_VAR),
            std::env::var_os(COMMITTER_DATE_VAR)
        ),
        env_before
    );
    Ok(())
}

#[test]
fn test_author_and_committer_dates_are_separate() -> Result<()> {
    let (temp_dir, repo) = setup_git_repo();
    write_file(temp_dir.path(), "src/models.py", "class Employee: ...\n");

    let plan = CommitPlan::new(vec![
        step(&["src/models.py"], "Add employee model", "2025-02-03T09:15:00+01:00")
            .with_committer_date(ts("2025-02-04T18:40:00+01:00")),
    ])?;
    Sequencer::new(backend(&repo), RunOptions::default()).run(&plan)?;

    let head = repo.get_recent_commits(1)?;
    assert_eq!(head[0].author_date, "2025-02-03T09:15:00");
    assert_eq!(head[0].committer_date, "2025-02-04T18:40:00");

    let git_repo = repo.open_repo()?;
    let commit = git_repo.head()?.peel_to_commit()?;
    assert_eq!(commit.author().when().offset_minutes(), 60);
    assert_eq!(commit.author().when().seconds(), 1_738_570_500);
    Ok(())
}

#[test]
fn test_failure_keeps_earlier_commits() -> Result<()> {
    let (temp_dir, repo) = setup_git_repo();
    let dir = temp_dir.path();
    write_file(dir, "a.txt", "one\n");
    write_file(dir, "c.txt", "sea\n");

    let plan = CommitPlan::new(vec![
        step(&["a.txt"], "init", "2025-01-01T10:00:00"),
        step(&["missing.txt"], "add missing", "2025-01-01T10:05:00"),
        step(&["c.txt"], "add c", "2025-01-01T10:10:00"),
    ])?;

    let mut sequencer = Sequencer::new(backend(&repo), RunOptions::default());
    let err = sequencer.run(&plan).expect_err("pathspec matches nothing");

    assert!(matches!(
        err,
        SequenceError::Staging {
            step: 2,
            source: StagingError::Rejected(_),
            ..
        }
    ));
    assert!(err.to_string().contains("add missing"));
    assert_eq!(sequencer.committed().len(), 1);
    assert_eq!(history_messages(dir), vec!["Initial commit", "init"]);
    assert!(!repo.staged_paths()?.contains(&"c.txt".to_string()));
    Ok(())
}

#[test]
fn test_rerun_does_not_duplicate_commits() -> Result<()> {
    let (temp_dir, repo) = setup_git_repo();
    write_file(temp_dir.path(), "a.txt", "one\n");
    let plan = CommitPlan::new(vec![step(&["a.txt"], "init", "2025-01-01T10:00:00")])?;

    Sequencer::new(backend(&repo), RunOptions::default()).run(&plan)?;
    let err = Sequencer::new(backend(&repo), RunOptions::default())
        .run(&plan)
        .expect_err("identical content stages nothing");

    assert!(matches!(
        err,
        SequenceError::Staging {
            step: 1,
            source: StagingError::NothingStaged { .. },
            ..
        }
    ));
    assert_eq!(history_messages(temp_dir.path()), vec!["Initial commit", "init"]);
    Ok(())
}

#[test]
fn test_skip_policy_with_real_git() -> Result<()> {
    let (temp_dir, repo) = setup_git_repo();
    write_file(temp_dir.path(), "b.txt", "bee\n");
    let plan = CommitPlan::new(vec![
        step(&["initial.txt"], "touch initial", "2025-01-01T10:00:00"),
        step(&["b.txt"], "add b", "2025-01-01T10:05:00"),
    ])?;

    let options = RunOptions {
        on_empty_step: EmptyStepPolicy::Skip,
        ..RunOptions::default()
    };
    let report = Sequencer::new(backend(&repo), options).run(&plan)?;
    assert_eq!(report.skipped, vec![1]);
    assert_eq!(history_messages(temp_dir.path()), vec!["Initial commit", "add b"]);
    Ok(())
}

#[test]
fn test_deleted_file_is_staged() -> Result<()> {
    let (temp_dir, repo) = setup_git_repo();
    std::fs::remove_file(temp_dir.path().join("initial.txt"))?;

    let plan = CommitPlan::new(vec![step(
        &["initial.txt"],
        "remove initial",
        "2025-01-01T10:00:00",
    )])?;
    Sequencer::new(backend(&repo), RunOptions::default()).run(&plan)?;

    let head = repo.get_recent_commits(1)?;
    assert_eq!(head[0].file_paths, vec!["initial.txt"]);
    Ok(())
}

#[test]
fn test_pre_staged_changes_are_refused() -> Result<()> {
    let (temp_dir, repo) = setup_git_repo();
    write_file(temp_dir.path(), "stray.txt", "stray\n");
    write_file(temp_dir.path(), "a.txt", "one\n");
    repo.run_git(&["add", "stray.txt"], &[])?;

    let plan = CommitPlan::new(vec![step(&["a.txt"], "init", "2025-01-01T10:00:00")])?;
    let err = Sequencer::new(backend(&repo), RunOptions::default())
        .run(&plan)
        .expect_err("index already dirty");

    assert!(matches!(err, SequenceError::PreStaged { step: 1, .. }));
    assert_eq!(history_messages(temp_dir.path()), vec!["Initial commit"]);
    Ok(())
}

#[test]
fn test_refused_run_keeps_user_index_under_rollback() -> Result<()> {
    let options = RunOptions {
        on_failure: FailurePolicy::Rollback,
        ..RunOptions::default()
    };

    for (temp_dir, repo) in [setup_git_repo(), setup_empty_repo()] {
        let dir = temp_dir.path();
        write_file(dir, "stray.txt", "stray\n");
        write_file(dir, "a.txt", "one\n");
        repo.run_git(&["add", "stray.txt"], &[])?;

        let plan = CommitPlan::new(vec![step(&["a.txt"], "init", "2025-01-01T10:00:00")])?;
        let err = Sequencer::new(backend(&repo), options)
            .run(&plan)
            .expect_err("index already dirty");

        assert!(matches!(err, SequenceError::PreStaged { step: 1, .. }));
        assert_eq!(repo.staged_paths()?, vec!["stray.txt"]);
    }
    Ok(())
}

#[test]
fn test_years_git_would_rewrite_are_rejected_at_load() {
    let (temp_dir, _repo) = setup_git_repo();
    let content = r#"
[[step]]
files = ["a.txt"]
message = "ancient"
author_date = "0099-05-05T10:00:00"
"#;
    write_file(temp_dir.path(), "a.txt", "one\n");

    let err = CommitPlan::from_toml_str(content).expect_err("year 99 is out of range");
    assert!(matches!(
        err,
        PlanError::InvalidTimestamp {
            step: 1,
            field: "author_date",
            source: TimestampParseError::OutOfRange { .. },
        }
    ));
    assert_eq!(history_messages(temp_dir.path()), vec!["Initial commit"]);
}

#[test]
fn test_rollback_to_starting_commit() -> Result<()> {
    let (temp_dir, repo) = setup_git_repo();
    let dir = temp_dir.path();
    let start = repo.head_id()?;
    write_file(dir, "a.txt", "one\n");

    let plan = CommitPlan::new(vec![
        step(&["a.txt"], "init", "2025-01-01T10:00:00"),
        step(&["a.txt"], "again", "2025-01-01T10:05:00"),
    ])?;
    let options = RunOptions {
        on_failure: FailurePolicy::Rollback,
        ..RunOptions::default()
    };
    let mut sequencer = Sequencer::new(backend(&repo), options);
    let err = sequencer.run(&plan).expect_err("second step is empty");

    assert_eq!(err.step(), Some(2));
    assert!(sequencer.committed().is_empty());
    assert_eq!(repo.head_id()?, start);
    assert_eq!(history_messages(dir), vec!["Initial commit"]);
    // Work tree untouched, index back at the starting commit
    assert!(dir.join("a.txt").exists());
    assert!(!repo.has_staged_changes()?);
    Ok(())
}

#[test]
fn test_rollback_on_unborn_branch() -> Result<()> {
    let (temp_dir, repo) = setup_empty_repo();
    write_file(temp_dir.path(), "a.txt", "one\n");

    let plan = CommitPlan::new(vec![
        step(&["a.txt"], "init", "2025-01-01T10:00:00"),
        step(&["nope.txt"], "broken", "2025-01-01T10:05:00"),
    ])?;
    let options = RunOptions {
        on_failure: FailurePolicy::Rollback,
        ..RunOptions::default()
    };
    let err = Sequencer::new(backend(&repo), options)
        .run(&plan)
        .expect_err("second step fails");

    assert_eq!(err.step(), Some(2));
    assert_eq!(repo.head_id()?, None);
    assert!(repo.staged_paths()?.is_empty());
    Ok(())
}

#[test]
fn test_failing_hook_aborts_unless_skipped() -> Result<()> {
    let (temp_dir, repo) = setup_git_repo();
    let dir = temp_dir.path();
    create_hook(dir, "pre-commit", "echo 'lint failed' >&2\nexit 1");
    write_file(dir, "a.txt", "one\n");

    let plan = CommitPlan::new(vec![step(&["a.txt"], "init", "2025-01-01T10:00:00")])?;
    let err = Sequencer::new(backend(&repo), RunOptions::default())
        .run(&plan)
        .expect_err("hook rejects the commit");
    assert!(matches!(err, SequenceError::Commit { step: 1, .. }));
    assert_eq!(history_messages(dir), vec!["Initial commit"]);

    // The failed attempt left a.txt staged; start over from a clean index.
    repo.reset_to(repo.head_id()?.as_deref())?;
    let report = Sequencer::new(GitCli::new(repo.clone(), false), RunOptions::default())
        .run(&plan)?;
    assert_eq!(report.commits.len(), 1);
    assert_eq!(history_messages(dir), vec!["Initial commit", "init"]);
    Ok(())
}
