//! Release registry abstraction
//!
//! Releases are keyed by (owner, repo, tag). The only implementation talks to
//! the GitHub REST API; the orchestrator only sees [`ReleaseRegistry`].

pub mod github;

pub use github::GitHubClient;

use crate::core::error::ReleaseResult;
use std::path::PathBuf;

/// Everything needed to publish one chart as a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseDescriptor {
  pub owner: String,
  pub repo: String,
  pub tag: String,
  /// Human readable release name, `<chart>-<version>`
  pub name: String,
  pub description: String,
  /// Packaged chart uploaded as the release asset
  pub asset_path: PathBuf,
  /// Provenance file uploaded next to the chart, when signed
  pub provenance_path: Option<PathBuf>,
  pub pre_release: bool,
}

pub trait ReleaseRegistry {
  /// Whether a release exists for `tag`; "not found" is `Ok(false)`, never an error
  fn release_exists(&self, owner: &str, repo: &str, tag: &str) -> ReleaseResult<bool>;

  /// Create the release (or reuse an existing one for the tag), attach the asset
  /// unless an asset of the same name is already there, and return the asset's
  /// public download URL
  fn create_release(&self, descriptor: &ReleaseDescriptor) -> ReleaseResult<String>;
}
