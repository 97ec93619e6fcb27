//! Provenance files for packaged charts
//!
//! The `.prov` file is a clear-signed document holding the chart's
//! `Chart.yaml`, a `...` separator and the archive digest, as consumed by
//! `helm verify`. Signing shells out to `gpg`.
//!
//! A configured keyring is usually an exported `secring.gpg`. gpg only reads
//! secret keys from its home directory, so the keyring is imported into a
//! scratch home that lives for one signature.

use crate::core::config::SigningConfig;
use crate::core::error::{ReleaseError, ReleaseResult, ResultExt};
use crate::package::file_name_of;
use crate::utils::digest_file;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;
use tracing::{debug, info};

/// Unsigned provenance document
pub fn provenance_body(manifest: &str, archive_name: &str, digest: &str) -> String {
  let mut body = manifest.trim_end().to_string();
  body.push_str("\n\n...\nfiles:\n");
  body.push_str(&format!("  {}: sha256:{}\n", archive_name, digest));
  body
}

/// Temporary gpg home holding an imported keyring
struct ScratchHome {
  dir: TempDir,
}

impl ScratchHome {
  fn import(keyring: &Path, passphrase_file: Option<&Path>) -> ReleaseResult<Self> {
    let dir = tempfile::Builder::new()
      .prefix("chart-release-gnupg")
      .tempdir()
      .context("create gpg home")?;
    let home = Self { dir };

    let output = gpg_command(Some(home.path()), passphrase_file)
      .arg("--import")
      .arg(keyring)
      .output()
      .context("Failed to execute gpg")?;
    if !output.status.success() {
      return Err(ReleaseError::message(format!(
        "gpg --import {} failed: {}",
        keyring.display(),
        stderr_of(&output)
      )));
    }
    debug!("imported {} into {}", keyring.display(), home.path().display());
    Ok(home)
  }

  fn path(&self) -> &Path {
    self.dir.path()
  }
}

impl Drop for ScratchHome {
  fn drop(&mut self) {
    // gpg leaves an agent running per home
    let _ = Command::new("gpgconf")
      .arg("--homedir")
      .arg(self.dir.path())
      .args(["--kill", "gpg-agent"])
      .output();
  }
}

/// `gpg --batch`, optionally in `homedir` and reading the passphrase from a file
fn gpg_command(homedir: Option<&Path>, passphrase_file: Option<&Path>) -> Command {
  let mut cmd = Command::new("gpg");
  cmd.arg("--batch");
  if let Some(homedir) = homedir {
    cmd.arg("--homedir").arg(homedir);
  }
  if let Some(passphrase_file) = passphrase_file {
    cmd.args(["--pinentry-mode", "loopback", "--passphrase-file"]).arg(passphrase_file);
  }
  cmd
}

fn stderr_of(output: &Output) -> String {
  String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Sign `archive_path`, writing `<archive_path>.prov`
pub fn sign_archive(signing: &SigningConfig, manifest: &str, archive_path: &Path) -> ReleaseResult<PathBuf> {
  let key = signing
    .key
    .as_deref()
    .filter(|k| !k.is_empty())
    .ok_or_else(|| ReleaseError::message("no signing key configured"))?;

  let digest = digest_file(archive_path).with_context(|| format!("digest {}", archive_path.display()))?;
  let body = provenance_body(manifest, &file_name_of(archive_path), &digest);

  let mut unsigned = tempfile::NamedTempFile::new().context("create provenance scratch file")?;
  unsigned.write_all(body.as_bytes())?;
  unsigned.flush()?;

  let mut prov_name = archive_path.as_os_str().to_owned();
  prov_name.push(".prov");
  let prov_path = PathBuf::from(prov_name);

  let passphrase_file = signing.passphrase_file.as_deref();
  let home = signing
    .keyring
    .as_deref()
    .map(|keyring| ScratchHome::import(keyring, passphrase_file))
    .transpose()?;

  let output = gpg_command(home.as_ref().map(ScratchHome::path), passphrase_file)
    .args(["--yes", "--armor", "--clearsign", "--local-user", key])
    .arg("--output")
    .arg(&prov_path)
    .arg(unsigned.path())
    .output()
    .context("Failed to execute gpg")?;
  if !output.status.success() {
    let _ = std::fs::remove_file(&prov_path);
    return Err(ReleaseError::message(format!(
      "gpg --clearsign failed: {}",
      stderr_of(&output)
    )));
  }

  info!("signed {} as {}", archive_path.display(), prov_path.display());
  Ok(prov_path)
}
