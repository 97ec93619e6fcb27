//! Scoped checkout of the pages branch
//!
//! The checkout lives in a private temporary directory. Dropping the guard
//! force-removes the git worktree and then the directory itself, on every exit
//! path. Teardown failures are logged as warnings and never surface as errors.

use crate::core::error::{ReleaseResult, ResultExt};
use crate::core::vcs::SourceControl;
use std::path::Path;
use tempfile::TempDir;
use tracing::{info, warn};

/// Exclusive handle on one ephemeral worktree
pub struct WorktreeGuard<'a, G: SourceControl + ?Sized> {
  git: &'a G,
  branch: String,
  dir: TempDir,
}

impl<'a, G: SourceControl + ?Sized> WorktreeGuard<'a, G> {
  /// Check out `remote/branch` into a fresh temporary directory
  pub fn acquire(git: &'a G, remote: &str, branch: &str) -> ReleaseResult<Self> {
    let dir = tempfile::Builder::new()
      .prefix("gh-pages-")
      .tempdir()
      .context("create gh-pages tmp dir")?;

    // on failure `dir` is dropped here and the directory removed
    git
      .add_worktree(dir.path(), remote, branch)
      .context("add gh-pages worktree")?;
    info!("added github pages {} worktree to {}", branch, dir.path().display());

    Ok(Self {
      git,
      branch: branch.to_string(),
      dir,
    })
  }

  pub fn path(&self) -> &Path {
    self.dir.path()
  }
}

impl<G: SourceControl + ?Sized> Drop for WorktreeGuard<'_, G> {
  fn drop(&mut self) {
    let path = self.dir.path();
    match self.git.remove_worktree(path) {
      Ok(()) => info!("removed github pages {} worktree {}", self.branch, path.display()),
      Err(e) => warn!("remove github pages {} worktree {}: {}", self.branch, path.display(), e),
    }
    // `TempDir` removes whatever git left behind when it drops after this
  }
}
