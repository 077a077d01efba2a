//! Version-control abstraction layer
//!
//! Every release step talks to its repositories through the
//! [`VersionControl`] trait. Each call names the repository by an explicit
//! path; the process working directory is never changed.
//!
//! - [`repository::Git2VersionControl`]: libgit2 implementation via `git2`
//! - [`mock::MockVersionControl`]: in-memory implementation for tests
//!
//! ```rust
//! # use release_train::git::VersionControl;
//! # use std::path::Path;
//! # fn example<V: VersionControl>(vcs: &V) -> release_train::Result<()> {
//! let repo = Path::new("/work/commcare-core");
//! if !vcs.branch_exists(repo, "commcare_2.44")? {
//!     vcs.create_branch(repo, "commcare_2.44")?;
//!     vcs.push(repo, "commcare_2.44")?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod mock;
pub mod repository;

pub use mock::{MockVersionControl, VcsCall};
pub use repository::Git2VersionControl;

use std::path::Path;

use crate::error::Result;

/// Git operations needed by the release workflows.
///
/// Remote operations use the remote configured when the implementation is
/// built (normally `origin`).
pub trait VersionControl: Send + Sync {
    /// True when tracked files have modifications. Untracked files are ignored.
    fn has_uncommitted_changes(&self, repo: &Path) -> Result<bool>;

    /// Fetch from the remote and fast-forward the local `branch`.
    fn pull(&self, repo: &Path, branch: &str) -> Result<()>;

    /// Check out a local branch or a tag (detached).
    fn checkout(&self, repo: &Path, reference: &str) -> Result<()>;

    /// Create `name` from HEAD and check it out.
    fn create_branch(&self, repo: &Path, name: &str) -> Result<()>;

    /// True when the remote has a `refs/heads/<name>` head.
    fn branch_exists(&self, repo: &Path, name: &str) -> Result<bool>;

    /// Remote tag names (without `refs/tags/`) starting with `prefix`.
    fn remote_tag_names(&self, repo: &Path, prefix: &str) -> Result<Vec<String>>;

    /// Create a lightweight tag on HEAD.
    fn create_tag(&self, repo: &Path, name: &str) -> Result<()>;

    /// Push a branch or tag of the same name to the remote.
    fn push(&self, repo: &Path, refname: &str) -> Result<()>;

    /// Stage modifications of tracked files and commit them on HEAD.
    fn commit_all(&self, repo: &Path, message: &str) -> Result<()>;

    fn delete_local_branch(&self, repo: &Path, name: &str) -> Result<()>;

    /// Fetch every tag from the remote.
    fn fetch_tags(&self, repo: &Path) -> Result<()>;

    /// Clone `url` into `dest`.
    fn clone_repository(&self, url: &str, dest: &Path) -> Result<()>;
}
