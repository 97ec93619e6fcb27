//! Helm repository index (`index.yaml`) maintenance
//!
//! The index is additive-only: an entry for a given chart name and version is
//! written once and never replaced. Every change rewrites the whole document
//! through a temporary file in the same directory so readers never observe a
//! partial write.

use crate::core::error::{ReleaseError, ReleaseResult};
use crate::package::ChartMetadata;
use crate::utils::{base_url, digest_file};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// File name of the index inside the pages branch
pub const INDEX_FILE: &str = "index.yaml";

/// Schema version written into new indexes
pub const INDEX_API_VERSION: &str = "v1";

/// One chart version listed in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartVersion {
  #[serde(flatten)]
  pub metadata: ChartMetadata,
  #[serde(default)]
  pub urls: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created: Option<DateTime<Utc>>,
  #[serde(default)]
  pub digest: String,
}

/// The whole `index.yaml` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
  #[serde(default)]
  pub api_version: String,
  #[serde(default)]
  pub entries: BTreeMap<String, Vec<ChartVersion>>,
  #[serde(default = "Utc::now")]
  pub generated: DateTime<Utc>,
  #[serde(flatten)]
  pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for IndexFile {
  fn default() -> Self {
    Self {
      api_version: INDEX_API_VERSION.to_string(),
      entries: BTreeMap::new(),
      generated: Utc::now(),
      extra: BTreeMap::new(),
    }
  }
}

impl IndexFile {
  /// Load the index at `path`, or an empty one if the file does not exist
  pub fn load_or_new(path: &Path) -> ReleaseResult<Self> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        info!("creating new index file, {} does not exist", path.display());
        return Ok(Self::default());
      }
      Err(e) => return Err(index_error(path, format!("read: {}", e))),
    };

    let index: IndexFile =
      serde_yaml::from_str(&content).map_err(|e| index_error(path, format!("load index file: {}", e)))?;
    if index.api_version.is_empty() {
      return Err(index_error(path, "no API version specified"));
    }
    info!("loaded {} index file", path.display());
    Ok(index)
  }

  /// The entry for `name` at `version`, if any
  pub fn get(&self, name: &str, version: &str) -> Option<&ChartVersion> {
    self
      .entries
      .get(name)?
      .iter()
      .find(|entry| entry.metadata.version == version)
  }

  pub fn has(&self, name: &str, version: &str) -> bool {
    self.get(name, version).is_some()
  }

  /// Append a new entry; returns false without touching anything if it already exists
  pub fn add(
    &mut self,
    metadata: &ChartMetadata,
    file_name: &str,
    base_url: &str,
    digest: &str,
    created: DateTime<Utc>,
  ) -> bool {
    if self.has(&metadata.name, &metadata.version) {
      return false;
    }
    let url = if base_url.is_empty() {
      file_name.to_string()
    } else {
      format!("{}/{}", base_url.trim_end_matches('/'), file_name)
    };
    self.entries.entry(metadata.name.clone()).or_default().push(ChartVersion {
      metadata: metadata.clone(),
      urls: vec![url],
      created: Some(created),
      digest: digest.to_string(),
    });
    true
  }

  /// Order each chart's versions newest first
  pub fn sort_entries(&mut self) {
    for versions in self.entries.values_mut() {
      versions.sort_by(|a, b| compare_versions_desc(&a.metadata.version, &b.metadata.version));
    }
  }

  pub fn to_yaml(&self) -> ReleaseResult<String> {
    Ok(serde_yaml::to_string(self)?)
  }

  /// Replace `path` with this document in a single rename
  pub fn write_atomic(&self, path: &Path) -> ReleaseResult<()> {
    let yaml = self.to_yaml().map_err(|e| index_error(path, e.to_string()))?;
    let dir = match path.parent() {
      Some(dir) if !dir.as_os_str().is_empty() => dir,
      _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| index_error(path, format!("create temp file: {}", e)))?;
    tmp
      .write_all(yaml.as_bytes())
      .and_then(|_| tmp.as_file().sync_all())
      .map_err(|e| index_error(path, format!("write: {}", e)))?;
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      tmp
        .as_file()
        .set_permissions(fs::Permissions::from_mode(0o644))
        .map_err(|e| index_error(path, format!("set permissions: {}", e)))?;
    }
    tmp
      .persist(path)
      .map_err(|e| index_error(path, format!("replace: {}", e.error)))?;
    Ok(())
  }
}

/// Newest first; versions that are not semver go last, in reverse lexical order
fn compare_versions_desc(a: &str, b: &str) -> Ordering {
  let parse = |v: &str| semver::Version::parse(v.trim_start_matches('v'));
  match (parse(a), parse(b)) {
    (Ok(a), Ok(b)) => b.cmp(&a),
    (Ok(_), Err(_)) => Ordering::Less,
    (Err(_), Ok(_)) => Ordering::Greater,
    (Err(_), Err(_)) => b.cmp(a),
  }
}

fn index_error(path: &Path, reason: impl Into<String>) -> ReleaseError {
  ReleaseError::Index {
    path: path.to_path_buf(),
    reason: reason.into(),
  }
}

/// Adds released charts to the index document
pub trait IndexStore {
  /// Insert `metadata` into the index at `index_path`
  ///
  /// Returns `Ok(false)` when the chart version is already listed, in which case
  /// the file is left untouched.
  fn update_index(
    &self,
    index_path: &Path,
    archive_path: &Path,
    metadata: &ChartMetadata,
    download_url: &str,
  ) -> ReleaseResult<bool>;
}

/// File-backed index store
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexManager;

impl IndexManager {
  pub fn new() -> Self {
    Self
  }
}

impl IndexStore for IndexManager {
  fn update_index(
    &self,
    index_path: &Path,
    archive_path: &Path,
    metadata: &ChartMetadata,
    download_url: &str,
  ) -> ReleaseResult<bool> {
    let mut index = IndexFile::load_or_new(index_path)?;

    if index.has(&metadata.name, &metadata.version) {
      info!("chart {} {} already exists in the helm index", metadata.name, metadata.version);
      return Ok(false);
    }

    let digest = digest_file(archive_path)
      .map_err(|e| index_error(index_path, format!("calculate chart sha256 digest of {}: {}", archive_path.display(), e)))?;

    let file_name = crate::package::file_name_of(archive_path);
    let base = base_url(download_url, &file_name);
    let now = Utc::now();
    index.add(metadata, &file_name, &base, &digest, now);
    index.sort_entries();
    index.generated = now;

    index.write_atomic(index_path)?;
    info!("added {} {} to {}", metadata.name, metadata.version, index_path.display());
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  const URL: &str = "https://github.com/org/repo/releases/download/1.0.0/nginx-1.0.0.tgz";

  fn archive(dir: &Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"chart bytes").unwrap();
    path
  }

  #[test]
  fn test_update_creates_index() {
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join(INDEX_FILE);
    let archive = archive(dir.path(), "nginx-1.0.0.tgz");

    let changed = IndexManager::new()
      .update_index(&index_path, &archive, &ChartMetadata::new("nginx", "1.0.0"), URL)
      .unwrap();
    assert!(changed);

    let index = IndexFile::load_or_new(&index_path).unwrap();
    assert_eq!(index.api_version, "v1");
    let entry = index.get("nginx", "1.0.0").unwrap();
    assert_eq!(entry.urls, vec![URL.to_string()]);
    assert_eq!(entry.digest, digest_file(&archive).unwrap());
    assert!(entry.created.is_some());
  }

  #[test]
  fn test_second_update_is_noop() {
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join(INDEX_FILE);
    let archive = archive(dir.path(), "nginx-1.0.0.tgz");
    let manager = IndexManager::new();
    let meta = ChartMetadata::new("nginx", "1.0.0");

    assert!(manager.update_index(&index_path, &archive, &meta, URL).unwrap());
    let before = fs::read(&index_path).unwrap();

    // different bytes would give a different digest; the entry must not be rewritten
    fs::write(&archive, b"rebuilt chart").unwrap();
    assert!(!manager.update_index(&index_path, &archive, &meta, URL).unwrap());
    assert_eq!(fs::read(&index_path).unwrap(), before);
  }

  #[test]
  fn test_versions_sorted_newest_first() {
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join(INDEX_FILE);
    let manager = IndexManager::new();

    for version in ["1.2.0", "1.10.0", "0.9.1"] {
      let name = format!("nginx-{version}.tgz");
      let archive = archive(dir.path(), &name);
      let url = format!("https://host/o/r/releases/download/{version}/{name}");
      manager
        .update_index(&index_path, &archive, &ChartMetadata::new("nginx", version), &url)
        .unwrap();
    }

    let index = IndexFile::load_or_new(&index_path).unwrap();
    let versions: Vec<&str> = index.entries["nginx"].iter().map(|e| e.metadata.version.as_str()).collect();
    assert_eq!(versions, vec!["1.10.0", "1.2.0", "0.9.1"]);
  }

  #[test]
  fn test_digest_failure_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join(INDEX_FILE);
    let archive = archive(dir.path(), "nginx-1.0.0.tgz");
    let manager = IndexManager::new();
    manager
      .update_index(&index_path, &archive, &ChartMetadata::new("nginx", "1.0.0"), URL)
      .unwrap();
    let before = fs::read(&index_path).unwrap();

    let missing = dir.path().join("nginx-2.0.0.tgz");
    let err = manager
      .update_index(&index_path, &missing, &ChartMetadata::new("nginx", "2.0.0"), URL)
      .unwrap_err();
    assert!(matches!(err, ReleaseError::Index { .. }));
    assert_eq!(fs::read(&index_path).unwrap(), before);
  }

  #[test]
  fn test_foreign_fields_survive_rewrite() {
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join(INDEX_FILE);
    fs::write(
      &index_path,
      "apiVersion: v1\nentries:\n  redis:\n  - apiVersion: v2\n    name: redis\n    version: 7.0.0\n    digest: abc\n    urls:\n    - https://example.com/redis-7.0.0.tgz\n    annotations:\n      category: Database\ngenerated: \"2024-01-01T00:00:00Z\"\nserverInfo:\n  contextPath: /charts\n",
    )
    .unwrap();
    let archive = archive(dir.path(), "nginx-1.0.0.tgz");

    IndexManager::new()
      .update_index(&index_path, &archive, &ChartMetadata::new("nginx", "1.0.0"), URL)
      .unwrap();

    let index = IndexFile::load_or_new(&index_path).unwrap();
    assert!(index.extra.contains_key("serverInfo"));
    let redis = index.get("redis", "7.0.0").unwrap();
    assert!(redis.metadata.extra.contains_key("annotations"));
    assert_eq!(redis.digest, "abc");
    assert!(index.has("nginx", "1.0.0"));
  }

  #[test]
  fn test_missing_api_version_rejected() {
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join(INDEX_FILE);
    fs::write(&index_path, "entries: {}\n").unwrap();
    assert!(matches!(IndexFile::load_or_new(&index_path), Err(ReleaseError::Index { .. })));
  }

  #[test]
  fn test_compare_versions_desc() {
    let mut versions = vec!["0.1.0", "nightly", "v2.0.0", "1.0.0-rc.1", "1.0.0"];
    versions.sort_by(|a, b| compare_versions_desc(a, b));
    assert_eq!(versions, vec!["v2.0.0", "1.0.0", "1.0.0-rc.1", "0.1.0", "nightly"]);
  }
}
