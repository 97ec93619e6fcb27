pub mod system_git;

pub use system_git::SystemGit;

use crate::core::error::{GitError, ReleaseResult};
use std::collections::BTreeSet;
use std::path::Path;

/// GitHub owner and repository derived from a remote URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRepo {
  pub owner: String,
  pub repo: String,
}

/// Version-control operations needed to publish the pages index
///
/// Every call blocks until the underlying command exits; nothing retries.
pub trait SourceControl {
  /// Branch names (without `refs/heads/`) present on the remote
  fn list_remote_branches(&self, remote: &str) -> ReleaseResult<BTreeSet<String>>;

  /// Refresh `remote` and check out `remote/branch` into `path` as a separate worktree
  fn add_worktree(&self, path: &Path, remote: &str, branch: &str) -> ReleaseResult<()>;

  /// Force-remove the worktree at `path`
  fn remove_worktree(&self, path: &Path) -> ReleaseResult<()>;

  /// Stage exactly one file and commit it inside `dir`
  fn add_and_commit(&self, dir: &Path, file: &str, message: &str) -> ReleaseResult<()>;

  /// Push `HEAD` of `dir` to `refs/heads/<branch>` on the remote
  fn push(&self, dir: &Path, remote: &str, branch: &str, credential: Option<&str>) -> ReleaseResult<()>;

  /// Owner and repository of the remote's push URL
  fn get_owner_and_repo(&self, dir: &Path, remote: &str) -> ReleaseResult<OwnerRepo>;
}

/// Parse owner and repo out of `git@host:owner/repo.git` or `https://host/owner/repo.git`
pub fn parse_owner_and_repo(remote_url: &str) -> ReleaseResult<OwnerRepo> {
  let colon_parts: Vec<&str> = remote_url.split(':').collect();
  if colon_parts.len() != 2 {
    return Err(
      GitError::MalformedRemoteUrl {
        url: remote_url.to_string(),
        reason: "expected exactly one ':'".to_string(),
      }
      .into(),
    );
  }

  let path_parts: Vec<&str> = colon_parts[1].split('/').collect();
  if path_parts.len() < 2 {
    return Err(
      GitError::MalformedRemoteUrl {
        url: remote_url.to_string(),
        reason: "min 2 path parts expected".to_string(),
      }
      .into(),
    );
  }

  let owner = path_parts[path_parts.len() - 2];
  let repo = path_parts[path_parts.len() - 1];
  let repo = repo.strip_suffix(".git").unwrap_or(repo);

  Ok(OwnerRepo {
    owner: owner.to_string(),
    repo: repo.to_string(),
  })
}

/// Host part of an SSH shorthand or HTTPS remote URL
pub fn parse_remote_host(remote_url: &str) -> Option<String> {
  let host = if let Some((_, rest)) = remote_url.split_once("://") {
    rest.split('/').next()?
  } else {
    remote_url.split(':').next()?
  };
  // drop user info (git@, x-access-token:...@)
  let host = host.rsplit('@').next()?;
  if host.is_empty() { None } else { Some(host.to_string()) }
}

/// Remote URL safe to log: the userinfo of a `scheme://` URL is masked
pub fn redact_remote_url(remote_url: &str) -> String {
  let Some((scheme, rest)) = remote_url.split_once("://") else {
    return remote_url.to_string();
  };
  let authority_end = rest.find('/').unwrap_or(rest.len());
  match rest[..authority_end].rfind('@') {
    Some(at) => format!("{}://*****@{}", scheme, &rest[at + 1..]),
    None => remote_url.to_string(),
  }
}
