//! GitHub Releases client (blocking)

use super::{ReleaseDescriptor, ReleaseRegistry};
use crate::core::error::{ReleaseError, ReleaseResult, RegistryError, ResultExt};
use crate::package::file_name_of;
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Upper bound for every registry call, uploads included
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("chart-release/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Deserialize)]
struct Release {
  id: u64,
  upload_url: String,
  #[serde(default)]
  assets: Vec<Asset>,
}

#[derive(Debug, Clone, Deserialize)]
struct Asset {
  name: String,
  browser_download_url: String,
}

#[derive(Debug, Serialize)]
struct CreateReleaseRequest<'a> {
  tag_name: &'a str,
  name: &'a str,
  body: &'a str,
  prerelease: bool,
}

/// GitHub REST client, authenticated when a token is supplied
pub struct GitHubClient {
  http: Client,
  api_url: Url,
  token: Option<String>,
}

impl GitHubClient {
  pub fn new(api_url: &str, token: Option<&str>) -> ReleaseResult<Self> {
    let api_url =
      Url::parse(api_url).map_err(|e| ReleaseError::message(format!("parse registry api url {}: {}", api_url, e)))?;
    let http = Client::builder()
      .timeout(HTTP_TIMEOUT)
      .user_agent(USER_AGENT)
      .build()
      .map_err(|e| transport("build http client", e))?;
    Ok(Self {
      http,
      api_url,
      token: token.filter(|t| !t.is_empty()).map(str::to_string),
    })
  }

  /// `<api_url>/<segments...>`, each segment percent-encoded
  fn endpoint(&self, segments: &[&str]) -> ReleaseResult<Url> {
    let mut url = self.api_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| ReleaseError::message(format!("registry api url {} cannot be a base", self.api_url)))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  fn request(&self, method: reqwest::Method, url: Url) -> RequestBuilder {
    let builder = self
      .http
      .request(method, url)
      .header(ACCEPT, "application/vnd.github+json")
      .header("X-GitHub-Api-Version", "2022-11-28");
    match &self.token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    }
  }

  fn get_release_by_tag(&self, owner: &str, repo: &str, tag: &str) -> ReleaseResult<Option<Release>> {
    let operation = format!("get release by {} tag", tag);
    let url = self.endpoint(&["repos", owner, repo, "releases", "tags", tag])?;
    let response = self.request(reqwest::Method::GET, url).send().map_err(|e| transport(&operation, e))?;
    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    json_of(&operation, response).map(Some)
  }

  fn get_release(&self, owner: &str, repo: &str, id: u64) -> ReleaseResult<Release> {
    let operation = format!("get release by {} id", id);
    let url = self.endpoint(&["repos", owner, repo, "releases", &id.to_string()])?;
    let response = self.request(reqwest::Method::GET, url).send().map_err(|e| transport(&operation, e))?;
    json_of(&operation, response)
  }

  fn post_release(&self, descriptor: &ReleaseDescriptor) -> ReleaseResult<Release> {
    let operation = format!("{} create release {}", descriptor.name, descriptor.tag);
    let url = self.endpoint(&["repos", &descriptor.owner, &descriptor.repo, "releases"])?;
    let body = CreateReleaseRequest {
      tag_name: &descriptor.tag,
      name: &descriptor.name,
      body: &descriptor.description,
      prerelease: descriptor.pre_release,
    };
    let response = self
      .request(reqwest::Method::POST, url)
      .json(&body)
      .send()
      .map_err(|e| transport(&operation, e))?;
    let release: Release = json_of(&operation, response)?;
    info!("{} release {} with id {} created", descriptor.name, descriptor.tag, release.id);
    Ok(release)
  }

  /// Upload `path` unless the release already carries an asset with its name
  fn ensure_asset(&self, descriptor: &ReleaseDescriptor, release: &Release, path: &Path) -> ReleaseResult<String> {
    let file_name = file_name_of(path);
    if let Some(existing) = release.assets.iter().find(|a| a.name == file_name) {
      info!(
        "{} release {} asset {} already exists, skipping create asset",
        descriptor.name, descriptor.tag, existing.browser_download_url
      );
      return Ok(existing.browser_download_url.clone());
    }

    let operation = format!("{} release {} upload {}", descriptor.name, descriptor.tag, file_name);
    let template = release.upload_url.split('{').next().unwrap_or_default();
    let mut url = Url::parse(template).map_err(|e| RegistryError::InvalidResponse {
      operation: operation.clone(),
      reason: format!("upload_url {}: {}", release.upload_url, e),
    })?;
    url.query_pairs_mut().append_pair("name", &file_name);

    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let response = self
      .request(reqwest::Method::POST, url)
      .header(CONTENT_TYPE, content_type_of(&file_name))
      .body(bytes)
      .send()
      .map_err(|e| transport(&operation, e))?;
    let asset: Asset = json_of(&operation, response)?;
    info!("{} release {} asset {} uploaded", descriptor.name, descriptor.tag, asset.browser_download_url);
    Ok(asset.browser_download_url)
  }
}

impl ReleaseRegistry for GitHubClient {
  fn release_exists(&self, owner: &str, repo: &str, tag: &str) -> ReleaseResult<bool> {
    Ok(self.get_release_by_tag(owner, repo, tag)?.is_some())
  }

  fn create_release(&self, descriptor: &ReleaseDescriptor) -> ReleaseResult<String> {
    let (owner, repo) = (descriptor.owner.as_str(), descriptor.repo.as_str());

    let release = match self.get_release_by_tag(owner, repo, &descriptor.tag)? {
      Some(existing) => {
        info!(
          "{} release {} already exists, skipping create release",
          descriptor.name, descriptor.tag
        );
        existing
      }
      None => self.post_release(descriptor)?,
    };

    // re-fetch so assets attached by an earlier, interrupted run are seen
    let release = self.get_release(owner, repo, release.id)?;

    let download_url = self.ensure_asset(descriptor, &release, &descriptor.asset_path)?;
    if let Some(provenance) = &descriptor.provenance_path {
      self.ensure_asset(descriptor, &release, provenance)?;
    }
    Ok(download_url)
  }
}

fn json_of<T: DeserializeOwned>(operation: &str, response: Response) -> ReleaseResult<T> {
  let status = response.status();
  if !status.is_success() {
    let body = response.text().unwrap_or_default();
    return Err(
      RegistryError::Status {
        operation: operation.to_string(),
        status: status.as_u16(),
        body: error_message(&body),
      }
      .into(),
    );
  }
  response.json::<T>().map_err(|e| {
    RegistryError::InvalidResponse {
      operation: operation.to_string(),
      reason: e.to_string(),
    }
    .into()
  })
}

/// GitHub error bodies carry a `message` field; fall back to the raw text
fn error_message(body: &str) -> String {
  serde_json::from_str::<serde_json::Value>(body)
    .ok()
    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
    .unwrap_or_else(|| body.trim().chars().take(512).collect())
}

fn transport(operation: &str, err: reqwest::Error) -> ReleaseError {
  let reason = if err.is_timeout() {
    format!("timed out after {}s", HTTP_TIMEOUT.as_secs())
  } else {
    err.to_string()
  };
  RegistryError::Transport {
    operation: operation.to_string(),
    reason,
  }
  .into()
}

fn content_type_of(file_name: &str) -> &'static str {
  if file_name.ends_with(".tgz") || file_name.ends_with(".tar.gz") {
    "application/gzip"
  } else if file_name.ends_with(".prov") {
    "application/pgp-signature"
  } else {
    "application/octet-stream"
  }
}
