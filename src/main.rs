mod core;
mod index;
mod package;
mod registry;
mod release;
mod utils;

use clap::Parser;
use crate::core::config::{
  DEFAULT_API_URL, DEFAULT_CHARTS_DIR, DEFAULT_PAGES_BRANCH, DEFAULT_REMOTE, RunConfig, SigningConfig,
};
use crate::core::error::{ReleaseError, ReleaseResult, ResultExt, print_error};
use crate::core::vcs::SystemGit;
use crate::index::IndexManager;
use crate::package::ChartPackager;
use crate::registry::GitHubClient;
use crate::release::Releaser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Package Helm charts, publish them as GitHub releases and update the gh-pages index
#[derive(Parser)]
#[command(name = "chart-release")]
#[command(version, about, long_about = None)]
#[command(styles = get_styles())]
struct Cli {
  /// Remote branch serving index.yaml
  #[arg(long, env = "CHART_RELEASE_PAGES_BRANCH", default_value = DEFAULT_PAGES_BRANCH)]
  pages_branch: String,

  /// Directory searched for charts
  #[arg(long, env = "CHART_RELEASE_CHARTS_DIR", default_value = DEFAULT_CHARTS_DIR)]
  charts_dir: PathBuf,

  /// Git remote hosting the pages branch
  #[arg(long, env = "CHART_RELEASE_REMOTE", default_value = DEFAULT_REMOTE)]
  remote: String,

  /// GitHub token for the release API and for pushing
  #[arg(long, env = "CHART_RELEASE_TOKEN", hide_env_values = true)]
  token: Option<String>,

  /// Release tag for every chart (defaults to each chart's version)
  #[arg(long, env = "CHART_RELEASE_TAG")]
  tag: Option<String>,

  /// Mark releases as pre-releases
  #[arg(long, env = "CHART_RELEASE_PRE_RELEASE")]
  pre_release: bool,

  /// Report what would be released without creating anything
  #[arg(long, env = "CHART_RELEASE_DRY_RUN")]
  dry_run: bool,

  /// Sign packaged charts with a provenance file
  #[arg(long, env = "CHART_RELEASE_SIGN")]
  sign: bool,

  /// Name of the signing key
  #[arg(long, env = "CHART_RELEASE_KEY")]
  key: Option<String>,

  /// Keyring holding the signing key
  #[arg(long, env = "CHART_RELEASE_KEYRING")]
  keyring: Option<PathBuf>,

  /// File containing the signing key passphrase
  #[arg(long, env = "CHART_RELEASE_PASSPHRASE_FILE")]
  passphrase_file: Option<PathBuf>,

  /// Base URL of the GitHub API
  #[arg(long, env = "CHART_RELEASE_API_URL", default_value = DEFAULT_API_URL)]
  api_url: String,
}

impl Cli {
  fn into_config(self) -> RunConfig {
    RunConfig {
      pages_branch: self.pages_branch,
      charts_dir: self.charts_dir,
      remote: self.remote,
      token: self.token,
      tag: self.tag,
      pre_release: self.pre_release,
      dry_run: self.dry_run,
      signing: SigningConfig {
        sign: self.sign,
        key: self.key,
        keyring: self.keyring,
        passphrase_file: self.passphrase_file,
      },
      api_url: self.api_url,
    }
  }
}

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .usage(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
    .invalid(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .error(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .valid(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

fn init_logging() {
  // stdout carries the JSON summary only
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .with_target(false)
    .init();
}

fn main() {
  let cli = Cli::parse();
  init_logging();

  if let Err(err) = run(cli.into_config()) {
    handle_error(err);
  }
}

fn run(config: RunConfig) -> ReleaseResult<()> {
  config.validate()?;
  info!("chart-release {} starting with {}", env!("CARGO_PKG_VERSION"), config);

  let cwd = std::env::current_dir().context("get current directory")?;
  let git = SystemGit::open(&cwd)?;
  let packager = ChartPackager::new(&cwd, config.signing.clone())?;
  let registry = GitHubClient::new(&config.api_url, config.credential())?;

  let releaser = Releaser::new(config, packager, git, registry, IndexManager::new());
  let outcome = releaser.release()?;

  let summary = serde_json::to_string(&outcome.released)?;
  println!("{}", summary);
  Ok(())
}

fn handle_error(err: ReleaseError) -> ! {
  print_error(&err);
  std::process::exit(err.exit_code().as_i32());
}
