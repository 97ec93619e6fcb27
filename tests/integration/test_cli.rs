//! Command line surface

use crate::helpers::{TestRepo, run_chart_release, run_chart_release_ok};
use anyhow::Result;

#[test]
fn test_version_flag() -> Result<()> {
  let repo = TestRepo::new()?;
  let output = run_chart_release_ok(&repo.path, &["--version"])?;
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.starts_with("chart-release "), "{stdout}");
  assert!(stdout.contains(env!("CARGO_PKG_VERSION")), "{stdout}");
  Ok(())
}

#[test]
fn test_signing_without_key_is_rejected() -> Result<()> {
  let repo = TestRepo::new()?;
  let output = run_chart_release(&repo.path, &["--sign"])?;
  assert_eq!(output.status.code(), Some(1));
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("--key"), "{stderr}");
  Ok(())
}

#[test]
fn test_flags_fall_back_to_environment() -> Result<()> {
  let repo = TestRepo::new()?;
  let output = std::process::Command::new(env!("CARGO_BIN_EXE_chart-release"))
    .current_dir(&repo.path)
    .env("CHART_RELEASE_PAGES_BRANCH", "charts-site")
    .env("CHART_RELEASE_API_URL", "http://127.0.0.1:9")
    .output()?;

  // the branch from the environment is the one reported missing
  assert_eq!(output.status.code(), Some(3));
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("git checkout --orphan charts-site"), "{stderr}");
  Ok(())
}
