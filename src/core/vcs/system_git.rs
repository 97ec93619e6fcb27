//! System git backend
//!
//! Every operation is one or two blocking `git` subprocesses run with an
//! isolated environment. Nothing is retried and nothing is interrupted once
//! started.

use super::{OwnerRepo, SourceControl, parse_owner_and_repo, parse_remote_host, redact_remote_url};
use crate::core::error::{GitError, ReleaseError, ReleaseResult, ResultExt};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info};

/// Environment variables passed through to git
const PASSTHROUGH_ENV: &[&str] = &[
  "PATH",
  "HOME",
  "XDG_CONFIG_HOME",
  // ssh transport
  "SSH_AUTH_SOCK",
  "SSH_ASKPASS",
  "GIT_SSH_COMMAND",
  // https transport
  "GIT_ASKPASS",
  "HTTPS_PROXY",
  "https_proxy",
  "HTTP_PROXY",
  "http_proxy",
  "ALL_PROXY",
  "all_proxy",
  "NO_PROXY",
  "no_proxy",
  "SSL_CERT_FILE",
  "SSL_CERT_DIR",
  "GIT_SSL_CAINFO",
  "GIT_SSL_CAPATH",
];

/// Git backend using system git
pub struct SystemGit {
  /// Repository the worktrees are attached to
  pub(crate) repo_path: PathBuf,
}

impl SystemGit {
  /// Open the git repository containing `path`
  pub fn open(path: &Path) -> ReleaseResult<Self> {
    let output = Command::new("git")
      .arg("-C")
      .arg(path)
      .args(["rev-parse", "--show-toplevel"])
      .output()
      .context("Failed to execute git rev-parse")?;

    if !output.status.success() {
      return Err(ReleaseError::with_help(
        format!("{} is not inside a git repository: {}", path.display(), stderr_of(&output)),
        "Run chart-release from a clone of the chart repository.",
      ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(Self {
      repo_path: PathBuf::from(stdout.trim()),
    })
  }

  /// Create a safe git command running in `dir`
  ///
  /// - Clears environment variables
  /// - Whitelists PATH, HOME, transport credentials, proxies and CA bundles
  /// - Adds safe configuration overrides
  pub(crate) fn git_cmd(&self, dir: &Path) -> Command {
    self.git_cmd_with_env(dir, |key| std::env::var_os(key))
  }

  fn git_cmd_with_env(&self, dir: &Path, lookup: impl Fn(&str) -> Option<OsString>) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(dir);

    cmd.env_clear();
    for key in PASSTHROUGH_ENV {
      if let Some(value) = lookup(key) {
        cmd.env(key, value);
      }
    }
    cmd.env("GIT_TERMINAL_PROMPT", "0");

    cmd.arg("-c").arg("advice.detachedHead=false");
    cmd.arg("-c").arg("core.quotePath=false");

    cmd
  }

  /// Run a git command, logging its arguments unless `silent`
  fn run(&self, dir: &Path, args: &[&str], silent: bool) -> ReleaseResult<Output> {
    let command = format!("git {}", args.join(" "));
    if !silent {
      info!(dir = %dir.display(), "{}", command);
    }

    let output = self
      .git_cmd(dir)
      .args(args)
      .output()
      .with_context(|| format!("Failed to execute {}", if silent { "git" } else { command.as_str() }))?;

    if !silent {
      debug!(status = %output.status, "{} finished", command);
    }
    Ok(output)
  }

  /// Run a git command and fail with CommandFailed on a non-zero exit
  fn run_checked(&self, dir: &Path, args: &[&str]) -> ReleaseResult<String> {
    let output = self.run(dir, args, false)?;
    if !output.status.success() {
      return Err(ReleaseError::Git(GitError::CommandFailed {
        command: format!("git {}", args.join(" ")),
        stderr: stderr_of(&output),
      }));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }

  fn push_url(&self, dir: &Path, remote: &str) -> ReleaseResult<String> {
    let url = self.run_checked(dir, &["remote", "get-url", "--push", remote])?;
    Ok(url.trim().to_string())
  }

  /// URL to push to, embedding the credential when one is given
  ///
  /// The returned string may contain the credential and must never be logged.
  fn authenticated_push_url(&self, dir: &Path, remote: &str, credential: Option<&str>) -> ReleaseResult<String> {
    let remote_url = self.push_url(dir, remote)?;

    match credential {
      Some(token) => credential_push_url(&remote_url, token),
      None => {
        info!("no token supplied, pushing to {} push url", redact_remote_url(&remote_url));
        Ok(remote_url)
      }
    }
  }
}

/// `https://x-access-token:<token>@<host>/<owner>/<repo>.git` for the remote
///
/// The host falls back to github.com when none can be read from the URL.
fn credential_push_url(remote_url: &str, token: &str) -> ReleaseResult<String> {
  let OwnerRepo { owner, repo } = parse_owner_and_repo(remote_url)?;
  let host = parse_remote_host(remote_url).unwrap_or_else(|| "github.com".to_string());
  Ok(format!("https://x-access-token:{}@{}/{}/{}.git", token, host, owner, repo))
}

impl SourceControl for SystemGit {
  fn list_remote_branches(&self, remote: &str) -> ReleaseResult<BTreeSet<String>> {
    let stdout = self.run_checked(&self.repo_path, &["ls-remote", "--heads", remote])?;
    Ok(parse_ls_remote_heads(&stdout))
  }

  fn add_worktree(&self, path: &Path, remote: &str, branch: &str) -> ReleaseResult<()> {
    let output = self.run(&self.repo_path, &["remote", "update", remote, "--prune"], false)?;
    if !output.status.success() {
      return Err(ReleaseError::Git(GitError::RemoteUpdate {
        remote: remote.to_string(),
        stderr: stderr_of(&output),
      }));
    }

    let commitish = format!("{}/{}", remote, branch);
    let path_arg = path.to_string_lossy();
    let output = self.run(
      &self.repo_path,
      &["worktree", "add", "--detach", &path_arg, &commitish],
      false,
    )?;
    if !output.status.success() {
      return Err(ReleaseError::Git(GitError::Checkout {
        path: path.to_path_buf(),
        commitish,
        stderr: stderr_of(&output),
      }));
    }
    Ok(())
  }

  fn remove_worktree(&self, path: &Path) -> ReleaseResult<()> {
    let path_arg = path.to_string_lossy();
    let output = self.run(&self.repo_path, &["worktree", "remove", &path_arg, "--force"], false)?;
    if !output.status.success() {
      return Err(ReleaseError::Git(GitError::WorktreeTeardown {
        path: path.to_path_buf(),
        stderr: stderr_of(&output),
      }));
    }
    Ok(())
  }

  fn add_and_commit(&self, dir: &Path, file: &str, message: &str) -> ReleaseResult<()> {
    self.run_checked(dir, &["add", "--", file])?;
    self.run_checked(dir, &["commit", "-m", message])?;
    Ok(())
  }

  fn push(&self, dir: &Path, remote: &str, branch: &str, credential: Option<&str>) -> ReleaseResult<()> {
    let push_url = self.authenticated_push_url(dir, remote, credential)?;
    let refspec = format!("HEAD:refs/heads/{}", branch);

    // silent: the url may carry the token
    info!(dir = %dir.display(), "git push {} {}", remote, refspec);
    let output = self.run(dir, &["push", &push_url, &refspec], true)?;
    if !output.status.success() {
      let mut reason = stderr_of(&output);
      if let Some(token) = credential {
        reason = reason.replace(token, "*****");
      }
      return Err(ReleaseError::Git(GitError::PushFailed {
        remote: remote.to_string(),
        branch: branch.to_string(),
        reason,
      }));
    }
    Ok(())
  }

  fn get_owner_and_repo(&self, dir: &Path, remote: &str) -> ReleaseResult<OwnerRepo> {
    let url = self.push_url(dir, remote)?;
    parse_owner_and_repo(&url)
  }
}

/// Parse `git ls-remote --heads` output into branch names
///
/// Lines that do not split into exactly two fields are ignored.
pub fn parse_ls_remote_heads(stdout: &str) -> BTreeSet<String> {
  stdout
    .lines()
    .filter_map(|line| {
      let columns: Vec<&str> = line.split_whitespace().collect();
      if columns.len() != 2 {
        return None;
      }
      let name = columns[1].trim();
      Some(name.strip_prefix("refs/heads/").unwrap_or(name).to_string())
    })
    .collect()
}

fn stderr_of(output: &Output) -> String {
  String::from_utf8_lossy(&output.stderr).trim().to_string()
}
