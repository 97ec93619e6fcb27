//! Release orchestration
//!
//! One run walks a fixed sequence:
//!
//! 1. Verify the pages branch exists on the remote
//! 2. Package every chart under the charts directory
//! 3. Check out the pages branch into a temporary worktree
//! 4. For each chart: skip when its release exists, otherwise create the
//!    release, upload the archive and add it to `index.yaml`
//! 5. Commit and push `index.yaml` when at least one entry was added
//!
//! Packaged archives and the worktree are released on every exit path by
//! their guards. Nothing here retries; the first failure aborts the run and
//! the next invocation picks up where this one stopped.

pub mod outcome;
pub mod releaser;

pub use releaser::Releaser;
