//! Per-chart decisions and the folded result of a run

use crate::core::config::RunConfig;
use crate::package::BundleArtifact;
use serde::Serialize;

/// What happened to one chart during the release loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleStep {
  /// A release already exists for the tag
  AlreadyReleased,
  /// Dry-run: nothing was created
  DryRun,
  /// Release created (or completed); `index_changed` when a new index entry was written
  Released { index_changed: bool },
}

/// A chart published by this run, as printed in the summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleasedBundle {
  #[serde(rename = "chart")]
  pub name: String,
  pub version: String,
  pub tag: String,
}

/// Immutable aggregate of the release loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseOutcome {
  /// At least one chart added an entry to the index
  pub changed: bool,
  pub released: Vec<ReleasedBundle>,
}

impl ReleaseOutcome {
  /// Fold one chart's step into the aggregate
  pub fn merge(mut self, bundle: &BundleArtifact, tag: &str, step: BundleStep) -> Self {
    if let BundleStep::Released { index_changed } = step {
      self.changed |= index_changed;
      self.released.push(ReleasedBundle {
        name: bundle.name().to_string(),
        version: bundle.version().to_string(),
        tag: tag.to_string(),
      });
    }
    self
  }
}

/// Tag of the release for `bundle`: the override when set, else the chart version
///
/// With an override every chart of the run resolves to the same tag.
pub fn resolve_tag(config: &RunConfig, bundle: &BundleArtifact) -> String {
  config
    .tag_override()
    .map(str::to_string)
    .unwrap_or_else(|| bundle.version().to_string())
}
