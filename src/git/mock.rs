use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{ReleaseError, Result};
use crate::git::VersionControl;

/// A mutating call recorded by [`MockVersionControl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcsCall {
    Pull { repo: PathBuf, branch: String },
    Checkout { repo: PathBuf, reference: String },
    CreateBranch { repo: PathBuf, name: String },
    CreateTag { repo: PathBuf, name: String },
    Push { repo: PathBuf, refname: String },
    Commit { repo: PathBuf, message: String },
    DeleteLocalBranch { repo: PathBuf, name: String },
    FetchTags { repo: PathBuf },
    Clone { url: String, dest: PathBuf },
}

#[derive(Debug, Default)]
struct RepoState {
    dirty: bool,
    head: Option<String>,
    local_branches: BTreeSet<String>,
    local_tags: BTreeSet<String>,
    remote_branches: BTreeSet<String>,
    remote_tags: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct MockState {
    repos: HashMap<PathBuf, RepoState>,
    calls: Vec<VcsCall>,
}

/// In-memory version control for tests.
///
/// Pushing a local branch or tag makes it visible to later remote lookups.
#[derive(Debug, Default)]
pub struct MockVersionControl {
    state: Mutex<MockState>,
}

impl MockVersionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a branch that exists both locally and on the remote.
    pub fn with_branch(self, repo: impl AsRef<Path>, name: &str) -> Self {
        self.seed(repo.as_ref(), |state| {
            state.local_branches.insert(name.to_string());
            state.remote_branches.insert(name.to_string());
        });
        self
    }

    /// Seed a tag that exists both locally and on the remote.
    pub fn with_tag(self, repo: impl AsRef<Path>, name: &str) -> Self {
        self.seed(repo.as_ref(), |state| {
            state.local_tags.insert(name.to_string());
            state.remote_tags.insert(name.to_string());
        });
        self
    }

    /// Mark a repository as having uncommitted changes.
    pub fn with_uncommitted_changes(self, repo: impl AsRef<Path>) -> Self {
        self.seed(repo.as_ref(), |state| state.dirty = true);
        self
    }

    /// Every mutating call, in order.
    pub fn calls(&self) -> Vec<VcsCall> {
        self.lock().calls.clone()
    }

    /// Commit messages recorded for `repo`.
    pub fn commits(&self, repo: impl AsRef<Path>) -> Vec<String> {
        let repo = repo.as_ref();
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                VcsCall::Commit { repo: r, message } if r == repo => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Refs pushed from `repo`.
    pub fn pushed(&self, repo: impl AsRef<Path>) -> Vec<String> {
        let repo = repo.as_ref();
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                VcsCall::Push { repo: r, refname } if r == repo => Some(refname.clone()),
                _ => None,
            })
            .collect()
    }

    /// Currently checked-out reference of `repo`.
    pub fn head(&self, repo: impl AsRef<Path>) -> Option<String> {
        self.lock()
            .repos
            .get(repo.as_ref())
            .and_then(|state| state.head.clone())
    }

    fn seed(&self, repo: &Path, f: impl FnOnce(&mut RepoState)) {
        let mut state = self.lock();
        f(state.repos.entry(repo.to_path_buf()).or_default());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record<T>(
        &self,
        repo: &Path,
        call: VcsCall,
        f: impl FnOnce(&mut RepoState) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.lock();
        let result = f(state.repos.entry(repo.to_path_buf()).or_default())?;
        state.calls.push(call);
        Ok(result)
    }
}

impl VersionControl for MockVersionControl {
    fn has_uncommitted_changes(&self, repo: &Path) -> Result<bool> {
        Ok(self
            .lock()
            .repos
            .get(repo)
            .map(|state| state.dirty)
            .unwrap_or(false))
    }

    fn pull(&self, repo: &Path, branch: &str) -> Result<()> {
        let call = VcsCall::Pull {
            repo: repo.to_path_buf(),
            branch: branch.to_string(),
        };
        self.record(repo, call, |state| {
            state.local_branches.insert(branch.to_string());
            state.head = Some(branch.to_string());
            Ok(())
        })
    }

    fn checkout(&self, repo: &Path, reference: &str) -> Result<()> {
        let call = VcsCall::Checkout {
            repo: repo.to_path_buf(),
            reference: reference.to_string(),
        };
        self.record(repo, call, |state| {
            let known = state.local_branches.contains(reference)
                || state.remote_branches.contains(reference)
                || state.local_tags.contains(reference)
                || state.remote_tags.contains(reference);
            if !known {
                return Err(ReleaseError::precondition(format!(
                    "'{}' is neither a branch nor a tag in {}",
                    reference,
                    repo.display()
                )));
            }
            state.head = Some(reference.to_string());
            Ok(())
        })
    }

    fn create_branch(&self, repo: &Path, name: &str) -> Result<()> {
        let call = VcsCall::CreateBranch {
            repo: repo.to_path_buf(),
            name: name.to_string(),
        };
        self.record(repo, call, |state| {
            if !state.local_branches.insert(name.to_string()) {
                return Err(ReleaseError::precondition(format!(
                    "Branch '{}' already exists in {}",
                    name,
                    repo.display()
                )));
            }
            state.head = Some(name.to_string());
            Ok(())
        })
    }

    fn branch_exists(&self, repo: &Path, name: &str) -> Result<bool> {
        Ok(self
            .lock()
            .repos
            .get(repo)
            .map(|state| state.remote_branches.contains(name))
            .unwrap_or(false))
    }

    fn remote_tag_names(&self, repo: &Path, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .repos
            .get(repo)
            .map(|state| {
                state
                    .remote_tags
                    .iter()
                    .filter(|tag| tag.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn create_tag(&self, repo: &Path, name: &str) -> Result<()> {
        let call = VcsCall::CreateTag {
            repo: repo.to_path_buf(),
            name: name.to_string(),
        };
        self.record(repo, call, |state| {
            if !state.local_tags.insert(name.to_string()) {
                return Err(ReleaseError::precondition(format!(
                    "Cannot create tag '{}': already exists",
                    name
                )));
            }
            Ok(())
        })
    }

    fn push(&self, repo: &Path, refname: &str) -> Result<()> {
        let call = VcsCall::Push {
            repo: repo.to_path_buf(),
            refname: refname.to_string(),
        };
        self.record(repo, call, |state| {
            if state.local_branches.contains(refname) {
                state.remote_branches.insert(refname.to_string());
            } else if state.local_tags.contains(refname) {
                state.remote_tags.insert(refname.to_string());
            } else {
                return Err(ReleaseError::precondition(format!(
                    "Nothing named '{}' to push in {}",
                    refname,
                    repo.display()
                )));
            }
            Ok(())
        })
    }

    fn commit_all(&self, repo: &Path, message: &str) -> Result<()> {
        let call = VcsCall::Commit {
            repo: repo.to_path_buf(),
            message: message.to_string(),
        };
        self.record(repo, call, |state| {
            state.dirty = false;
            Ok(())
        })
    }

    fn delete_local_branch(&self, repo: &Path, name: &str) -> Result<()> {
        let call = VcsCall::DeleteLocalBranch {
            repo: repo.to_path_buf(),
            name: name.to_string(),
        };
        self.record(repo, call, |state| {
            if !state.local_branches.remove(name) {
                return Err(ReleaseError::precondition(format!(
                    "No local branch '{}' in {}",
                    name,
                    repo.display()
                )));
            }
            Ok(())
        })
    }

    fn fetch_tags(&self, repo: &Path) -> Result<()> {
        let call = VcsCall::FetchTags {
            repo: repo.to_path_buf(),
        };
        self.record(repo, call, |state| {
            let remote = state.remote_tags.clone();
            state.local_tags.extend(remote);
            Ok(())
        })
    }

    fn clone_repository(&self, url: &str, dest: &Path) -> Result<()> {
        let call = VcsCall::Clone {
            url: url.to_string(),
            dest: dest.to_path_buf(),
        };
        self.record(dest, call, |state| {
            state.head = Some("master".to_string());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pushed_branch_becomes_remote() {
        let vcs = MockVersionControl::new();
        let repo = Path::new("/work/commcare-core");
        assert!(!vcs.branch_exists(repo, "commcare_2.4").unwrap());

        vcs.create_branch(repo, "commcare_2.4").unwrap();
        vcs.push(repo, "commcare_2.4").unwrap();

        assert!(vcs.branch_exists(repo, "commcare_2.4").unwrap());
        assert_eq!(vcs.pushed(repo), vec!["commcare_2.4".to_string()]);
    }

    #[test]
    fn test_remote_tag_names_filter_by_prefix() {
        let repo = Path::new("/work/commcare-android");
        let vcs = MockVersionControl::new()
            .with_tag(repo, "commcare_2.4.0")
            .with_tag(repo, "commcare_2.4.1")
            .with_tag(repo, "commcare_2.40.0");
        let tags = vcs.remote_tag_names(repo, "commcare_2.4.").unwrap();
        assert_eq!(tags, vec!["commcare_2.4.0", "commcare_2.4.1"]);
    }

    #[test]
    fn test_failed_calls_are_not_recorded() {
        let vcs = MockVersionControl::new();
        let repo = Path::new("/work/commcare-core");
        assert!(vcs.push(repo, "missing").is_err());
        assert!(vcs.checkout(repo, "missing").is_err());
        assert!(vcs.calls().is_empty());
    }

    #[test]
    fn test_commit_clears_dirty_flag() {
        let repo = Path::new("/work/commcare-core");
        let vcs = MockVersionControl::new().with_uncommitted_changes(repo);
        assert!(vcs.has_uncommitted_changes(repo).unwrap());
        vcs.commit_all(repo, "Automated version bump").unwrap();
        assert!(!vcs.has_uncommitted_changes(repo).unwrap());
        assert_eq!(vcs.commits(repo), vec!["Automated version bump"]);
    }
}
