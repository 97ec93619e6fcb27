//! Error types for chart-release with contextual messages and exit codes
//!
//! Every fatal error is categorised so the process can exit with a meaningful
//! code, carries the operation context it was raised in, and may offer a help
//! message describing how to fix it.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Exit codes for chart-release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid args, missing charts dir)
  User = 1,
  /// System error (git, registry, index, I/O)
  System = 2,
  /// Validation failure (pages branch missing, chart failed to package)
  Validation = 3,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for chart-release
#[derive(Debug)]
pub enum ReleaseError {
  /// Invalid run parameters
  Config(ConfigError),

  /// Charts directory missing or unreadable
  Discovery { path: PathBuf, reason: String },

  /// A chart failed to package or sign
  Packaging { chart: PathBuf, reason: String },

  /// The GitHub pages branch does not exist on the remote
  HostingBranchMissing { branch: String, remote: String },

  /// Git operation errors
  Git(GitError),

  /// Release registry errors (anything but "release not found")
  Registry(RegistryError),

  /// index.yaml load, digest or write failure
  Index { path: PathBuf, reason: String },

  /// I/O errors
  Io(io::Error),

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },

  /// Any categorised error wrapped with the operation that produced it
  Context { context: String, source: Box<ReleaseError> },
}

impl ReleaseError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    ReleaseError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    ReleaseError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  /// Add context to an existing error
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      ReleaseError::Message { message, context, help } => ReleaseError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      other => ReleaseError::Context {
        context: ctx_str,
        source: Box::new(other),
      },
    }
  }

  /// The innermost categorised error, skipping context wrappers
  pub fn root(&self) -> &ReleaseError {
    match self {
      ReleaseError::Context { source, .. } => source.root(),
      other => other,
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self.root() {
      ReleaseError::Config(_) => ExitCode::User,
      ReleaseError::Discovery { .. } => ExitCode::User,
      ReleaseError::Packaging { .. } => ExitCode::Validation,
      ReleaseError::HostingBranchMissing { .. } => ExitCode::Validation,
      ReleaseError::Git(_) => ExitCode::System,
      ReleaseError::Registry(_) => ExitCode::System,
      ReleaseError::Index { .. } => ExitCode::System,
      ReleaseError::Io(_) => ExitCode::System,
      ReleaseError::Message { .. } => ExitCode::User,
      ReleaseError::Context { .. } => ExitCode::System,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self.root() {
      ReleaseError::Config(e) => e.help_message(),
      ReleaseError::Discovery { .. } => {
        Some("Point --charts-dir (or CHART_RELEASE_CHARTS_DIR) at a directory containing Chart.yaml files.".to_string())
      }
      ReleaseError::HostingBranchMissing { branch, remote } => Some(create_pages_branch_message(branch, remote)),
      ReleaseError::Git(e) => e.help_message(),
      ReleaseError::Registry(e) => e.help_message(),
      ReleaseError::Message { help, .. } => help.clone(),
      _ => None,
    }
  }
}

/// Remediation steps for a missing pages branch
pub fn create_pages_branch_message(branch: &str, remote: &str) -> String {
  format!(
    "branch {branch} does not exist, run the following to create pages branch:\n\
     git checkout --orphan {branch}\n\
     git rm -rf .\n\
     git commit -m \"initial commit\" --allow-empty\n\
     git push -u {remote} {branch}"
  )
}

impl fmt::Display for ReleaseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReleaseError::Config(e) => write!(f, "{}", e),
      ReleaseError::Discovery { path, reason } => {
        write!(f, "charts dir {} {}", path.display(), reason)
      }
      ReleaseError::Packaging { chart, reason } => {
        write!(f, "package chart at {}: {}", chart.display(), reason)
      }
      ReleaseError::HostingBranchMissing { branch, remote } => {
        write!(f, "github pages remote branch {} does not exist on {}", branch, remote)
      }
      ReleaseError::Git(e) => write!(f, "{}", e),
      ReleaseError::Registry(e) => write!(f, "{}", e),
      ReleaseError::Index { path, reason } => {
        write!(f, "index {}: {}", path.display(), reason)
      }
      ReleaseError::Io(e) => write!(f, "I/O error: {}", e),
      ReleaseError::Message { message, context, .. } => {
        if let Some(ctx) = context {
          write!(f, "{}: ", ctx.replace('\n', ": "))?;
        }
        write!(f, "{}", message)
      }
      ReleaseError::Context { context, source } => write!(f, "{}: {}", context, source),
    }
  }
}

impl std::error::Error for ReleaseError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      ReleaseError::Io(e) => Some(e),
      ReleaseError::Context { source, .. } => Some(source.as_ref()),
      _ => None,
    }
  }
}

impl From<io::Error> for ReleaseError {
  fn from(err: io::Error) -> Self {
    ReleaseError::Io(err)
  }
}

impl From<String> for ReleaseError {
  fn from(msg: String) -> Self {
    ReleaseError::message(msg)
  }
}

impl From<&str> for ReleaseError {
  fn from(msg: &str) -> Self {
    ReleaseError::message(msg)
  }
}

impl From<ConfigError> for ReleaseError {
  fn from(err: ConfigError) -> Self {
    ReleaseError::Config(err)
  }
}

impl From<GitError> for ReleaseError {
  fn from(err: GitError) -> Self {
    ReleaseError::Git(err)
  }
}

impl From<RegistryError> for ReleaseError {
  fn from(err: RegistryError) -> Self {
    ReleaseError::Registry(err)
  }
}

impl From<serde_json::Error> for ReleaseError {
  fn from(err: serde_json::Error) -> Self {
    ReleaseError::message(format!("JSON error: {}", err))
  }
}

impl From<serde_yaml::Error> for ReleaseError {
  fn from(err: serde_yaml::Error) -> Self {
    ReleaseError::message(format!("YAML error: {}", err))
  }
}

impl From<walkdir::Error> for ReleaseError {
  fn from(err: walkdir::Error) -> Self {
    ReleaseError::message(format!("Directory walk error: {}", err))
  }
}

impl From<std::path::StripPrefixError> for ReleaseError {
  fn from(err: std::path::StripPrefixError) -> Self {
    ReleaseError::message(format!("Path strip prefix error: {}", err))
  }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
  /// Required value is empty
  EmptyValue { field: String },

  /// Signing requested without a key
  SigningKeyMissing,

  /// Registry API URL is not usable
  InvalidApiUrl { url: String },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::EmptyValue { field } => Some(format!(
        "Pass --{} or set CHART_RELEASE_{}.",
        field,
        field.replace('-', "_").to_uppercase()
      )),
      ConfigError::SigningKeyMissing => Some("Pass --key with the name of the signing key when --sign is set.".to_string()),
      ConfigError::InvalidApiUrl { .. } => Some("Use an absolute http(s) URL, e.g. https://api.github.com".to_string()),
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::EmptyValue { field } => write!(f, "{} cannot be empty", field),
      ConfigError::SigningKeyMissing => write!(f, "sign is set but no signing key was given"),
      ConfigError::InvalidApiUrl { url } => write!(f, "invalid registry api url {}", url),
    }
  }
}

/// Git operation errors
#[derive(Debug)]
pub enum GitError {
  /// Git command failed
  CommandFailed { command: String, stderr: String },

  /// `git remote update` failed
  RemoteUpdate { remote: String, stderr: String },

  /// `git worktree add` failed
  Checkout { path: PathBuf, commitish: String, stderr: String },

  /// `git worktree remove` failed
  WorktreeTeardown { path: PathBuf, stderr: String },

  /// Push failed
  PushFailed {
    remote: String,
    branch: String,
    reason: String,
  },

  /// Remote URL could not be split into owner and repo
  MalformedRemoteUrl { url: String, reason: String },
}

impl GitError {
  fn help_message(&self) -> Option<String> {
    match self {
      GitError::PushFailed { reason, .. } => {
        if reason.contains("non-fast-forward") || reason.contains("fetch first") {
          Some("The pages branch moved while releasing. Re-run the release; published charts are skipped.".to_string())
        } else if reason.contains("403") || reason.to_lowercase().contains("permission") {
          Some("Check that the token (--token) has contents:write access to the repository.".to_string())
        } else {
          None
        }
      }
      GitError::MalformedRemoteUrl { .. } => Some(
        "The remote push URL must look like git@github.com:<owner>/<repo>.git or https://github.com/<owner>/<repo>.git"
          .to_string(),
      ),
      GitError::RemoteUpdate { remote, .. } => Some(format!("Check that remote '{}' exists: git remote -v", remote)),
      _ => None,
    }
  }
}

impl fmt::Display for GitError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GitError::CommandFailed { command, stderr } => {
        write!(f, "Git command failed: {}\n{}", command, stderr)
      }
      GitError::RemoteUpdate { remote, stderr } => {
        write!(f, "Update of remote {} failed: {}", remote, stderr)
      }
      GitError::Checkout { path, commitish, stderr } => {
        write!(f, "Checkout of {} into {} failed: {}", commitish, path.display(), stderr)
      }
      GitError::WorktreeTeardown { path, stderr } => {
        write!(f, "Removing worktree {} failed: {}", path.display(), stderr)
      }
      GitError::PushFailed { remote, branch, reason } => {
        write!(f, "Push to {}/{} failed: {}", remote, branch, reason)
      }
      GitError::MalformedRemoteUrl { url, reason } => {
        write!(f, "invalid remote url {}, {}", url, reason)
      }
    }
  }
}

/// Release registry errors
#[derive(Debug)]
pub enum RegistryError {
  /// Request could not be sent or timed out
  Transport { operation: String, reason: String },

  /// Registry answered with an unexpected status
  Status { operation: String, status: u16, body: String },

  /// Registry answered with a body we could not use
  InvalidResponse { operation: String, reason: String },
}

impl RegistryError {
  fn help_message(&self) -> Option<String> {
    match self {
      RegistryError::Status { status: 401, .. } | RegistryError::Status { status: 403, .. } => {
        Some("Check that the token (--token) is valid and may create releases.".to_string())
      }
      RegistryError::Transport { .. } => Some("Check network access to the registry api url (--api-url).".to_string()),
      _ => None,
    }
  }
}

impl fmt::Display for RegistryError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RegistryError::Transport { operation, reason } => write!(f, "{}: {}", operation, reason),
      RegistryError::Status { operation, status, body } => {
        write!(f, "{}: registry responded {}", operation, status)?;
        if !body.is_empty() {
          write!(f, ": {}", body)?;
        }
        Ok(())
      }
      RegistryError::InvalidResponse { operation, reason } => {
        write!(f, "{}: invalid response: {}", operation, reason)
      }
    }
  }
}

/// Result type alias for chart-release
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> ReleaseResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> ReleaseResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<ReleaseError>,
{
  fn context(self, ctx: impl Into<String>) -> ReleaseResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> ReleaseResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &ReleaseError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}
