use crate::core::error::{ConfigError, ReleaseResult};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_PAGES_BRANCH: &str = "gh-pages";
pub const DEFAULT_CHARTS_DIR: &str = "charts";
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Settings for signing packaged charts with a provenance file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningConfig {
  /// Produce `<archive>.prov` for every chart
  pub sign: bool,
  /// Name (uid or id) of the signing key
  pub key: Option<String>,
  /// Keyring holding the secret key
  pub keyring: Option<PathBuf>,
  /// File containing the key passphrase
  pub passphrase_file: Option<PathBuf>,
}

impl fmt::Display for SigningConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "sign: {}, key: {}, keyring: {}, passphrase-file: {}",
      self.sign,
      secret_value(self.key.as_deref()),
      secret_value(self.keyring.as_ref().map(|p| p.to_string_lossy()).as_deref()),
      secret_value(self.passphrase_file.as_ref().map(|p| p.to_string_lossy()).as_deref()),
    )
  }
}

/// Parameters of one release run
///
/// Built once from flags/environment and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
  /// Remote branch serving index.yaml
  pub pages_branch: String,
  /// Directory searched recursively for charts
  pub charts_dir: PathBuf,
  /// Git remote hosting the pages branch
  pub remote: String,
  /// GitHub token, used for the registry and for pushing
  pub token: Option<String>,
  /// Release tag override; every chart uses its own version when unset
  pub tag: Option<String>,
  pub pre_release: bool,
  pub dry_run: bool,
  pub signing: SigningConfig,
  /// Base URL of the release registry API
  pub api_url: String,
}

impl Default for RunConfig {
  fn default() -> Self {
    Self {
      pages_branch: DEFAULT_PAGES_BRANCH.to_string(),
      charts_dir: PathBuf::from(DEFAULT_CHARTS_DIR),
      remote: DEFAULT_REMOTE.to_string(),
      token: None,
      tag: None,
      pre_release: false,
      dry_run: false,
      signing: SigningConfig::default(),
      api_url: DEFAULT_API_URL.to_string(),
    }
  }
}

impl RunConfig {
  /// Reject parameters that cannot produce a meaningful run
  pub fn validate(&self) -> ReleaseResult<()> {
    if self.pages_branch.trim().is_empty() {
      return Err(empty("pages-branch"));
    }
    if self.charts_dir.as_os_str().is_empty() {
      return Err(empty("charts-dir"));
    }
    if self.remote.trim().is_empty() {
      return Err(empty("remote"));
    }
    if self.signing.sign && self.signing.key.as_deref().is_none_or(str::is_empty) {
      return Err(ConfigError::SigningKeyMissing.into());
    }
    if !(self.api_url.starts_with("https://") || self.api_url.starts_with("http://")) {
      return Err(
        ConfigError::InvalidApiUrl {
          url: self.api_url.clone(),
        }
        .into(),
      );
    }
    Ok(())
  }

  /// The configured tag override, treating an empty string as unset
  pub fn tag_override(&self) -> Option<&str> {
    self.tag.as_deref().filter(|t| !t.is_empty())
  }

  /// Token, treating an empty string as unset
  pub fn credential(&self) -> Option<&str> {
    self.token.as_deref().filter(|t| !t.is_empty())
  }
}

fn empty(field: &str) -> crate::core::error::ReleaseError {
  ConfigError::EmptyValue {
    field: field.to_string(),
  }
  .into()
}

impl fmt::Display for RunConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "pages-branch: {:?}, charts-dir: {:?}, pre-release: {}, tag: {:?}, remote: {:?}, token: {:?}, dry-run: {}, api-url: {:?}, {}",
      self.pages_branch,
      self.charts_dir.display().to_string(),
      self.pre_release,
      self.tag.as_deref().unwrap_or_default(),
      self.remote,
      secret_value(self.credential()),
      self.dry_run,
      self.api_url,
      self.signing,
    )
  }
}

/// Mask a secret for logging
pub fn secret_value(value: Option<&str>) -> &'static str {
  match value {
    Some(v) if !v.is_empty() => "*****",
    _ => "<empty>",
  }
}
