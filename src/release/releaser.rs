use crate::core::config::RunConfig;
use crate::core::error::{ReleaseError, ReleaseResult, ResultExt, create_pages_branch_message};
use crate::core::vcs::{OwnerRepo, SourceControl};
use crate::core::worktree::WorktreeGuard;
use crate::index::{INDEX_FILE, IndexStore};
use crate::package::{BundleArtifact, PackagedBundles, Packager};
use crate::registry::{ReleaseDescriptor, ReleaseRegistry};
use crate::release::outcome::{BundleStep, ReleaseOutcome, resolve_tag};
use std::path::Path;
use tracing::{info, warn};

const COMMIT_MESSAGE: &str = "update index.yaml";

/// Drives one release run over its four collaborators
pub struct Releaser<P, G, R, I> {
  config: RunConfig,
  packager: P,
  git: G,
  registry: R,
  index: I,
}

impl<P, G, R, I> Releaser<P, G, R, I>
where
  P: Packager,
  G: SourceControl,
  R: ReleaseRegistry,
  I: IndexStore,
{
  pub fn new(config: RunConfig, packager: P, git: G, registry: R, index: I) -> Self {
    Self {
      config,
      packager,
      git,
      registry,
      index,
    }
  }

  /// Run the whole release sequence
  pub fn release(&self) -> ReleaseResult<ReleaseOutcome> {
    self.verify_pages_branch()?;

    let packaged = self
      .packager
      .package_all(&self.config.charts_dir)
      .context("package charts")?;
    info!("{} charts packaged", packaged.count());
    self.warn_on_shared_tag(&packaged);

    let worktree = WorktreeGuard::acquire(&self.git, &self.config.remote, &self.config.pages_branch)?;
    let index_path = worktree.path().join(INDEX_FILE);

    let repo = self
      .git
      .get_owner_and_repo(worktree.path(), &self.config.remote)
      .context("get github owner and repo")?;

    let mut bundles: Vec<&BundleArtifact> = packaged.iter().collect();
    bundles.sort_by(|a, b| a.archive_path.cmp(&b.archive_path));

    let outcome = bundles.into_iter().try_fold(ReleaseOutcome::default(), |outcome, bundle| {
      let tag = resolve_tag(&self.config, bundle);
      let step = self
        .release_bundle(&repo, &index_path, bundle, &tag)
        .with_context(|| format!("release chart {} {} as {}", bundle.name(), bundle.version(), tag))?;
      Ok::<_, ReleaseError>(outcome.merge(bundle, &tag, step))
    })?;

    if !outcome.changed {
      info!("no chart changes");
      return Ok(outcome);
    }

    self
      .git
      .add_and_commit(worktree.path(), INDEX_FILE, COMMIT_MESSAGE)
      .context("git commit helm index")?;
    self
      .git
      .push(
        worktree.path(),
        &self.config.remote,
        &self.config.pages_branch,
        self.config.credential(),
      )
      .context("git push github pages")?;
    info!("{} pushed to {} {}", INDEX_FILE, self.config.remote, self.config.pages_branch);

    Ok(outcome)
  }

  fn verify_pages_branch(&self) -> ReleaseResult<()> {
    let branches = self
      .git
      .list_remote_branches(&self.config.remote)
      .context("list remote branches")?;

    if !branches.contains(&self.config.pages_branch) {
      warn!(
        "{}",
        create_pages_branch_message(&self.config.pages_branch, &self.config.remote)
      );
      return Err(ReleaseError::HostingBranchMissing {
        branch: self.config.pages_branch.clone(),
        remote: self.config.remote.clone(),
      });
    }

    info!("github pages remote branch {} exists", self.config.pages_branch);
    Ok(())
  }

  fn warn_on_shared_tag(&self, packaged: &PackagedBundles) {
    if let Some(tag) = self.config.tag_override()
      && packaged.count() > 1
    {
      warn!(
        "tag {} is used for all {} charts, only the first chart without an existing release will be published",
        tag,
        packaged.count()
      );
    }
  }

  fn release_bundle(
    &self,
    repo: &OwnerRepo,
    index_path: &Path,
    bundle: &BundleArtifact,
    tag: &str,
  ) -> ReleaseResult<BundleStep> {
    if self.registry.release_exists(&repo.owner, &repo.repo, tag)? {
      info!("release {} already exists, skipping chart {}", tag, bundle.name());
      return Ok(BundleStep::AlreadyReleased);
    }

    if self.config.dry_run {
      info!(
        "create release {} for {} {} skipping, dry-run set to true",
        tag,
        bundle.name(),
        bundle.version()
      );
      info!("update {} skipping, dry-run set to true", index_path.display());
      return Ok(BundleStep::DryRun);
    }

    let descriptor = ReleaseDescriptor {
      owner: repo.owner.clone(),
      repo: repo.repo.clone(),
      tag: tag.to_string(),
      name: format!("{}-{}", bundle.name(), bundle.version()),
      description: format!("Kubernetes {} Helm chart", bundle.name()),
      asset_path: bundle.archive_path.clone(),
      provenance_path: bundle.provenance_path.clone(),
      pre_release: self.config.pre_release,
    };
    let download_url = self.registry.create_release(&descriptor)?;
    info!("release {} created for chart {}", tag, bundle.name());

    let index_changed = self
      .index
      .update_index(index_path, &bundle.archive_path, &bundle.metadata, &download_url)?;

    Ok(BundleStep::Released { index_changed })
  }
}
