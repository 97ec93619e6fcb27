//! Chart discovery and packaging
//!
//! A chart is any directory holding a `Chart.yaml`. Each one is packaged as
//! `<name>-<version>.tgz` in the destination directory, optionally with a
//! signed `<name>-<version>.tgz.prov` next to it. All produced files are owned
//! by [`PackagedBundles`] and deleted when it drops.

pub mod archive;
pub mod sign;

use crate::core::config::SigningConfig;
use crate::core::error::{ReleaseError, ReleaseResult, ResultExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Manifest marker identifying a chart root
pub const CHART_MANIFEST: &str = "Chart.yaml";

/// Parsed `Chart.yaml`
///
/// Fields not modelled here are kept in `extra` so they survive into index.yaml.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub api_version: Option<String>,
  pub name: String,
  pub version: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub app_version: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(flatten)]
  pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ChartMetadata {
  /// Minimal metadata for fixtures
  #[cfg(test)]
  pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      api_version: Some("v2".to_string()),
      name: name.into(),
      version: version.into(),
      app_version: None,
      description: None,
      extra: BTreeMap::new(),
    }
  }

  /// Parse and validate a `Chart.yaml` document
  pub fn parse(content: &str) -> ReleaseResult<Self> {
    let metadata: ChartMetadata = serde_yaml::from_str(content).context("parse Chart.yaml")?;
    if metadata.name.trim().is_empty() {
      return Err(ReleaseError::message("chart name is required"));
    }
    if metadata.version.trim().is_empty() {
      return Err(ReleaseError::message("chart version is required"));
    }
    semver::Version::parse(metadata.version.trim_start_matches('v'))
      .map_err(|e| ReleaseError::message(format!("chart version {} is not semver: {}", metadata.version, e)))?;
    Ok(metadata)
  }

  /// `<name>-<version>.tgz`
  pub fn archive_name(&self) -> String {
    format!("{}-{}.tgz", self.name, self.version)
  }
}

/// One packaged chart
#[derive(Debug, Clone)]
pub struct BundleArtifact {
  pub metadata: ChartMetadata,
  /// Absolute path of the `.tgz`
  pub archive_path: PathBuf,
  /// Absolute path of the `.prov`, when signed
  pub provenance_path: Option<PathBuf>,
}

impl BundleArtifact {
  pub fn name(&self) -> &str {
    &self.metadata.name
  }

  pub fn version(&self) -> &str {
    &self.metadata.version
  }
}

/// Every chart packaged in a run
///
/// Dropping it deletes the archives and provenance files.
#[derive(Debug, Default)]
pub struct PackagedBundles {
  bundles: Vec<BundleArtifact>,
}

impl PackagedBundles {
  #[cfg(test)]
  pub fn new(bundles: Vec<BundleArtifact>) -> Self {
    Self { bundles }
  }

  pub fn iter(&self) -> impl Iterator<Item = &BundleArtifact> {
    self.bundles.iter()
  }

  pub fn count(&self) -> usize {
    self.bundles.len()
  }

  fn push(&mut self, bundle: BundleArtifact) {
    self.bundles.push(bundle);
  }
}

impl Drop for PackagedBundles {
  fn drop(&mut self) {
    for bundle in &self.bundles {
      let files = std::iter::once(&bundle.archive_path).chain(bundle.provenance_path.as_ref());
      for file in files {
        match fs::remove_file(file) {
          Ok(()) => info!("removed generated chart {}", file.display()),
          Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
          Err(e) => warn!("remove {} chart: {}", file.display(), e),
        }
      }
    }
  }
}

/// Turns a charts directory into packaged archives
pub trait Packager {
  fn package_all(&self, charts_dir: &Path) -> ReleaseResult<PackagedBundles>;
}

/// Packages charts as gzip'ed tarballs, optionally signing them
pub struct ChartPackager {
  destination: PathBuf,
  signing: SigningConfig,
}

impl ChartPackager {
  /// Archives are written into `destination`
  pub fn new(destination: &Path, signing: SigningConfig) -> ReleaseResult<Self> {
    let destination = std::path::absolute(destination).context("resolve chart package destination")?;
    Ok(Self { destination, signing })
  }

  /// Package a single chart directory
  pub fn package_chart(&self, chart_dir: &Path) -> ReleaseResult<BundleArtifact> {
    info!("start package {} chart", chart_dir.display());

    let manifest = fs::read_to_string(chart_dir.join(CHART_MANIFEST)).context("read Chart.yaml")?;
    let metadata = ChartMetadata::parse(&manifest)?;

    let archive_path = self.destination.join(metadata.archive_name());
    archive::write_chart_archive(chart_dir, &metadata.name, &archive_path)?;
    info!("chart {} packaged as {}", chart_dir.display(), archive_path.display());

    let provenance_path = if self.signing.sign {
      match sign::sign_archive(&self.signing, &manifest, &archive_path) {
        Ok(path) => Some(path),
        Err(e) => {
          // drop the unsigned archive
          let _ = fs::remove_file(&archive_path);
          return Err(e.context(format!("sign {}", archive_path.display())));
        }
      }
    } else {
      None
    };

    Ok(BundleArtifact {
      metadata,
      archive_path,
      provenance_path,
    })
  }
}

impl Packager for ChartPackager {
  fn package_all(&self, charts_dir: &Path) -> ReleaseResult<PackagedBundles> {
    match fs::metadata(charts_dir) {
      Ok(meta) if meta.is_dir() => {}
      Ok(_) => {
        return Err(ReleaseError::Discovery {
          path: charts_dir.to_path_buf(),
          reason: "is not a directory".to_string(),
        });
      }
      Err(_) => {
        return Err(ReleaseError::Discovery {
          path: charts_dir.to_path_buf(),
          reason: "does not exist".to_string(),
        });
      }
    }

    let chart_dirs = discover_chart_dirs(charts_dir)?;
    if chart_dirs.is_empty() {
      warn!("no {} found under {}", CHART_MANIFEST, charts_dir.display());
    }

    // dropping `packaged` on an early return cleans up what was built so far
    let mut packaged = PackagedBundles::default();
    let mut archive_names = BTreeSet::new();
    for chart_dir in chart_dirs {
      let bundle = self.package_chart(&chart_dir).map_err(|e| ReleaseError::Packaging {
        chart: chart_dir.clone(),
        reason: e.to_string(),
      })?;
      if !archive_names.insert(bundle.archive_path.clone()) {
        return Err(ReleaseError::Packaging {
          chart: chart_dir,
          reason: format!("{} {} is packaged twice", bundle.name(), bundle.version()),
        });
      }
      packaged.push(bundle);
    }
    Ok(packaged)
  }
}

/// Directories under `charts_dir` (inclusive) containing a `Chart.yaml`, sorted
pub fn discover_chart_dirs(charts_dir: &Path) -> ReleaseResult<Vec<PathBuf>> {
  let mut dirs = Vec::new();
  for entry in WalkDir::new(charts_dir).sort_by_file_name() {
    let entry = entry.map_err(|e| ReleaseError::Discovery {
      path: charts_dir.to_path_buf(),
      reason: format!("cannot be read: {}", e),
    })?;
    if entry.file_type().is_file()
      && entry.file_name() == CHART_MANIFEST
      && let Some(parent) = entry.path().parent()
    {
      dirs.push(parent.to_path_buf());
    }
  }
  dirs.sort();
  Ok(dirs)
}

pub(crate) fn file_name_of(path: &Path) -> String {
  path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default()
}
