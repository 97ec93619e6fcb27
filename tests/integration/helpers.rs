//! Test helpers for integration tests

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// A chart repository cloned from a local bare remote
///
/// The bare remote lives at `<tmp>/remote/org/charts.git` and is registered as
/// `origin` with a `file://` URL, so owner and repo resolve to `org/charts`.
pub struct TestRepo {
  _root: TempDir,
  pub path: PathBuf,
  pub remote: PathBuf,
}

impl TestRepo {
  /// Create a repository with a `main` branch pushed to its remote
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let remote = root.path().join("remote/org/charts.git");
    let path = root.path().join("work");
    std::fs::create_dir_all(&remote)?;
    std::fs::create_dir_all(&path)?;

    git(&remote, &["init", "--bare", "--initial-branch=main"])?;

    git(&path, &["init", "--initial-branch=main"])?;
    git(&path, &["config", "user.name", "Test User"])?;
    git(&path, &["config", "user.email", "test@example.com"])?;
    git(&path, &["config", "commit.gpgsign", "false"])?;
    let url = format!("file://{}", remote.display());
    git(&path, &["remote", "add", "origin", &url])?;

    std::fs::write(path.join("README.md"), "# charts\n")?;
    git(&path, &["add", "."])?;
    git(&path, &["commit", "-m", "Initial commit"])?;
    git(&path, &["push", "-u", "origin", "main"])?;

    Ok(Self {
      _root: root,
      path,
      remote,
    })
  }

  /// Create an empty orphan pages branch on the remote, leaving `main` checked out
  pub fn with_pages_branch(self, branch: &str) -> Result<Self> {
    git(&self.path, &["checkout", "--orphan", branch])?;
    git(&self.path, &["rm", "-rf", "--quiet", "."])?;
    git(&self.path, &["commit", "-m", "initial commit", "--allow-empty"])?;
    git(&self.path, &["push", "-u", "origin", branch])?;
    git(&self.path, &["checkout", "main"])?;
    Ok(self)
  }

  /// Write `charts/<name>/` with a minimal chart
  pub fn add_chart(&self, name: &str, version: &str) -> Result<PathBuf> {
    let chart = self.path.join("charts").join(name);
    std::fs::create_dir_all(chart.join("templates"))?;
    std::fs::write(
      chart.join("Chart.yaml"),
      format!("apiVersion: v2\nname: {name}\nversion: {version}\ndescription: A {name} chart\n"),
    )?;
    std::fs::write(chart.join("values.yaml"), "replicaCount: 1\n")?;
    std::fs::write(chart.join("templates/service.yaml"), "kind: Service\n")?;
    Ok(chart)
  }

  /// Content of `file` at the tip of `branch` in the bare remote
  pub fn remote_file(&self, branch: &str, file: &str) -> Result<String> {
    let output = git(&self.remote, &["show", &format!("{}:{}", branch, file)])?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }

  /// Commit id of `branch` in the bare remote
  pub fn remote_head(&self, branch: &str) -> Result<String> {
    let output = git(&self.remote, &["rev-parse", branch])?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  /// Subject of the last commit on `branch` in the bare remote
  pub fn remote_subject(&self, branch: &str) -> Result<String> {
    let output = git(&self.remote, &["log", "-1", "--format=%s", branch])?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  /// Number of worktrees attached to the repository, the main one included
  pub fn worktree_count(&self) -> Result<usize> {
    let output = git(&self.path, &["worktree", "list", "--porcelain"])?;
    Ok(
      String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| l.starts_with("worktree "))
        .count(),
    )
  }

  /// Check if a file exists
  pub fn file_exists(&self, path: &str) -> bool {
    self.path.join(path).exists()
  }
}

/// Run git command in a directory
pub fn git(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = Command::new("git")
    .current_dir(cwd)
    .args(args)
    .output()
    .context("Failed to run git command")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!("Git command failed: git {}\n{}", args.join(" "), stderr);
  }

  Ok(output)
}

/// Run the chart-release binary, returning its output whatever the exit status
pub fn run_chart_release(cwd: &Path, args: &[&str]) -> Result<Output> {
  let bin = env!("CARGO_BIN_EXE_chart-release");

  let mut cmd = Command::new(bin);
  cmd.current_dir(cwd).args(args);
  // keep the caller's environment from leaking into flags
  for (key, _) in std::env::vars() {
    if key.starts_with("CHART_RELEASE_") {
      cmd.env_remove(key);
    }
  }
  cmd.output().context("Failed to run chart-release")
}

/// Run the chart-release binary and fail unless it exits successfully
pub fn run_chart_release_ok(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = run_chart_release(cwd, args)?;
  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    anyhow::bail!(
      "chart-release failed: chart-release {}\nstdout: {}\nstderr: {}",
      args.join(" "),
      stdout,
      stderr
    );
  }
  Ok(output)
}
