//! Chart tarball writer
//!
//! Entries are rooted at `<chart name>/`, matching `helm package`. Paths listed
//! in the chart's `.helmignore` are left out.

use crate::core::error::{ReleaseError, ReleaseResult, ResultExt};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::path::Path;
use walkdir::WalkDir;

pub const HELMIGNORE: &str = ".helmignore";

/// Always excluded, whatever .helmignore says
const ALWAYS_IGNORED: &[&str] = &[".git", ".hg", ".svn"];

/// Patterns read from `.helmignore`
#[derive(Debug, Default)]
pub struct IgnoreRules {
  rules: Vec<IgnoreRule>,
}

#[derive(Debug)]
struct IgnoreRule {
  pattern: glob::Pattern,
  dir_only: bool,
}

impl IgnoreRules {
  /// Parse `.helmignore` content; blank lines and `#` comments are skipped
  pub fn parse(content: &str) -> ReleaseResult<Self> {
    let mut rules = Vec::new();
    for line in content.lines() {
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }
      // negation is not supported, such lines ignore nothing
      if line.starts_with('!') {
        continue;
      }
      let dir_only = line.ends_with('/');
      let raw = line.trim_end_matches('/').trim_start_matches('/');
      let pattern = glob::Pattern::new(raw)
        .map_err(|e| ReleaseError::message(format!("invalid {} pattern {:?}: {}", HELMIGNORE, line, e)))?;
      rules.push(IgnoreRule { pattern, dir_only });
    }
    Ok(Self { rules })
  }

  /// Load the chart's `.helmignore`, if it has one
  pub fn load(chart_dir: &Path) -> ReleaseResult<Self> {
    let path = chart_dir.join(HELMIGNORE);
    if !path.exists() {
      return Ok(Self::default());
    }
    let content = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    Self::parse(&content)
  }

  /// Whether the `/`-separated relative path should be excluded
  pub fn is_ignored(&self, relative: &str, is_dir: bool) -> bool {
    let base = relative.rsplit('/').next().unwrap_or(relative);
    if is_dir && ALWAYS_IGNORED.contains(&base) {
      return true;
    }
    self.rules.iter().any(|rule| {
      if rule.dir_only && !is_dir {
        return false;
      }
      rule.pattern.matches(relative) || rule.pattern.matches(base)
    })
  }
}

/// Write `chart_dir` as a gzip'ed tarball at `archive_path`
pub fn write_chart_archive(chart_dir: &Path, chart_name: &str, archive_path: &Path) -> ReleaseResult<()> {
  let rules = IgnoreRules::load(chart_dir)?;

  if let Some(parent) = archive_path.parent() {
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
  }
  let file = File::create(archive_path).with_context(|| format!("create {}", archive_path.display()))?;
  let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
  builder.mode(tar::HeaderMode::Deterministic);

  let walker = WalkDir::new(chart_dir)
    .sort_by_file_name()
    .min_depth(1)
    .into_iter()
    .filter_entry(|entry| {
      let relative = relative_git_path(chart_dir, entry.path());
      !rules.is_ignored(&relative, entry.file_type().is_dir())
    });

  for entry in walker {
    let entry = entry?;
    if !entry.file_type().is_file() {
      continue;
    }
    let relative = entry.path().strip_prefix(chart_dir)?;
    let name = Path::new(chart_name).join(relative);
    builder
      .append_path_with_name(entry.path(), &name)
      .with_context(|| format!("add {} to archive", entry.path().display()))?;
  }

  let encoder = builder.into_inner().context("finish chart archive")?;
  encoder.finish().context("finish chart archive compression")?;
  Ok(())
}

fn relative_git_path(root: &Path, path: &Path) -> String {
  let relative = path.strip_prefix(root).unwrap_or(path);
  relative
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}
