//! End-to-end release runs against a local bare remote and a mocked GitHub API

use crate::helpers::{TestRepo, run_chart_release, run_chart_release_ok};
use anyhow::Result;
use mockito::{Matcher, Mock, Server};

const DOWNLOAD_URL: &str = "https://github.com/org/charts/releases/download/1.0.0/nginx-1.0.0.tgz";

fn release_json(server: &Server) -> String {
  format!(
    r#"{{"id": 42, "upload_url": "{}/uploads/repos/org/charts/releases/42/assets{{?name,label}}", "assets": []}}"#,
    server.url()
  )
}

/// Mocks for a chart that has never been released
struct NewRelease {
  _lookup: Mock,
  create: Mock,
  _refetch: Mock,
  upload: Mock,
}

fn mock_new_release(server: &mut Server) -> NewRelease {
  let release = release_json(server);
  let lookup = server
    .mock("GET", "/repos/org/charts/releases/tags/1.0.0")
    .with_status(404)
    .with_body(r#"{"message": "Not Found"}"#)
    .create();
  let create = server
    .mock("POST", "/repos/org/charts/releases")
    .match_body(Matcher::PartialJsonString(
      r#"{"tag_name": "1.0.0", "name": "nginx-1.0.0", "body": "Kubernetes nginx Helm chart"}"#.to_string(),
    ))
    .with_status(201)
    .with_body(release.clone())
    .create();
  let refetch = server
    .mock("GET", "/repos/org/charts/releases/42")
    .with_status(200)
    .with_body(release)
    .create();
  let upload = server
    .mock(
      "POST",
      Matcher::Regex(r"^/uploads/repos/org/charts/releases/42/assets".to_string()),
    )
    .match_query(Matcher::UrlEncoded("name".to_string(), "nginx-1.0.0.tgz".to_string()))
    .with_status(201)
    .with_body(format!(
      r#"{{"name": "nginx-1.0.0.tgz", "browser_download_url": "{}"}}"#,
      DOWNLOAD_URL
    ))
    .create();
  NewRelease {
    _lookup: lookup,
    create,
    _refetch: refetch,
    upload,
  }
}

#[test]
fn test_release_publishes_chart_and_pushes_index() -> Result<()> {
  let repo = TestRepo::new()?.with_pages_branch("gh-pages")?;
  repo.add_chart("nginx", "1.0.0")?;
  let mut server = Server::new();
  let mocks = mock_new_release(&mut server);

  let output = run_chart_release_ok(&repo.path, &["--api-url", &server.url()])?;

  let stdout = String::from_utf8_lossy(&output.stdout);
  assert_eq!(stdout.trim(), r#"[{"chart":"nginx","version":"1.0.0","tag":"1.0.0"}]"#);
  mocks.create.assert();
  mocks.upload.assert();

  let index = repo.remote_file("gh-pages", "index.yaml")?;
  assert!(index.contains("apiVersion: v1"), "{index}");
  assert!(index.contains("name: nginx"), "{index}");
  assert!(
    index.contains("https://github.com/org/charts/releases/download/1.0.0/nginx-1.0.0.tgz"),
    "{index}"
  );
  assert_eq!(repo.remote_subject("gh-pages")?, "update index.yaml");

  // archives and the pages worktree are cleaned up
  assert!(!repo.file_exists("nginx-1.0.0.tgz"));
  assert_eq!(repo.worktree_count()?, 1);
  Ok(())
}

#[test]
fn test_existing_release_is_skipped() -> Result<()> {
  let repo = TestRepo::new()?.with_pages_branch("gh-pages")?;
  repo.add_chart("nginx", "1.0.0")?;
  let head = repo.remote_head("gh-pages")?;

  let mut server = Server::new();
  let release = release_json(&server);
  let _mock = server
    .mock("GET", "/repos/org/charts/releases/tags/1.0.0")
    .with_status(200)
    .with_body(release)
    .create();
  let create = server.mock("POST", Matcher::Any).expect(0).create();

  let output = run_chart_release_ok(&repo.path, &["--api-url", &server.url()])?;

  assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "[]");
  create.assert();
  assert_eq!(repo.remote_head("gh-pages")?, head);
  assert_eq!(repo.worktree_count()?, 1);
  Ok(())
}

#[test]
fn test_dry_run_creates_nothing() -> Result<()> {
  let repo = TestRepo::new()?.with_pages_branch("gh-pages")?;
  repo.add_chart("nginx", "1.0.0")?;
  let head = repo.remote_head("gh-pages")?;

  let mut server = Server::new();
  let _mock = server
    .mock("GET", "/repos/org/charts/releases/tags/1.0.0")
    .with_status(404)
    .create();
  let create = server.mock("POST", Matcher::Any).expect(0).create();

  let output = run_chart_release_ok(&repo.path, &["--dry-run", "--api-url", &server.url()])?;

  assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "[]");
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("dry-run"), "{stderr}");
  create.assert();
  assert_eq!(repo.remote_head("gh-pages")?, head);
  assert!(!repo.file_exists("nginx-1.0.0.tgz"));
  assert_eq!(repo.worktree_count()?, 1);
  Ok(())
}

#[test]
fn test_missing_pages_branch_fails_with_remediation() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.add_chart("nginx", "1.0.0")?;

  let output = run_chart_release(&repo.path, &["--api-url", "http://127.0.0.1:9"])?;

  assert_eq!(output.status.code(), Some(3));
  assert!(output.stdout.is_empty());
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("git checkout --orphan gh-pages"), "{stderr}");
  assert!(stderr.contains("git push -u origin gh-pages"), "{stderr}");
  Ok(())
}

#[test]
fn test_registry_failure_leaves_pages_untouched() -> Result<()> {
  let repo = TestRepo::new()?.with_pages_branch("gh-pages")?;
  repo.add_chart("nginx", "1.0.0")?;
  let head = repo.remote_head("gh-pages")?;

  let mut server = Server::new();
  let _mock = server
    .mock("GET", "/repos/org/charts/releases/tags/1.0.0")
    .with_status(500)
    .with_body(r#"{"message": "Server Error"}"#)
    .create();

  let output = run_chart_release(&repo.path, &["--api-url", &server.url()])?;

  assert_eq!(output.status.code(), Some(2));
  assert!(output.stdout.is_empty());
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("Server Error"), "{stderr}");
  assert_eq!(repo.remote_head("gh-pages")?, head);
  assert!(!repo.file_exists("nginx-1.0.0.tgz"));
  assert_eq!(repo.worktree_count()?, 1);
  Ok(())
}

#[test]
fn test_invalid_chart_fails_before_checkout() -> Result<()> {
  let repo = TestRepo::new()?.with_pages_branch("gh-pages")?;
  let chart = repo.add_chart("broken", "1.0.0")?;
  std::fs::write(chart.join("Chart.yaml"), "apiVersion: v2\nname: broken\nversion: not-a-version\n")?;

  let output = run_chart_release(&repo.path, &["--api-url", "http://127.0.0.1:9"])?;

  assert_eq!(output.status.code(), Some(3));
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("not semver"), "{stderr}");
  assert_eq!(repo.worktree_count()?, 1);
  Ok(())
}

#[test]
fn test_missing_charts_dir_is_user_error() -> Result<()> {
  let repo = TestRepo::new()?.with_pages_branch("gh-pages")?;

  let output = run_chart_release(
    &repo.path,
    &["--charts-dir", "deploy/charts", "--api-url", "http://127.0.0.1:9"],
  )?;

  assert_eq!(output.status.code(), Some(1));
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("deploy/charts"), "{stderr}");
  Ok(())
}
