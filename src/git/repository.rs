use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Cred, CredentialType, Direction, FetchOptions, PushOptions, RemoteCallbacks,
    Repository, Status, StatusOptions,
};
use tracing::{debug, info, warn};

use crate::error::{ReleaseError, Result};

/// [`super::VersionControl`] backed by libgit2.
///
/// Authenticates with SSH keys from `~/.ssh`, then the SSH agent, then the
/// default credential helper.
pub struct Git2VersionControl {
    remote: String,
}

impl Git2VersionControl {
    pub fn new(remote: impl Into<String>) -> Self {
        Git2VersionControl {
            remote: remote.into(),
        }
    }

    fn open(&self, repo: &Path) -> Result<Repository> {
        Repository::open(repo).map_err(|e| {
            ReleaseError::precondition(format!(
                "'{}' is not a git repository: {}",
                repo.display(),
                e.message()
            ))
        })
    }

    /// Names of every ref advertised by the remote.
    fn remote_refs(&self, repo: &Path) -> Result<Vec<String>> {
        let repository = self.open(repo)?;
        let mut remote = repository.find_remote(&self.remote).map_err(|e| {
            ReleaseError::remote(format!("Remote '{}' not found: {}", self.remote, e.message()))
        })?;
        let connection = remote
            .connect_auth(Direction::Fetch, Some(remote_callbacks()), None)
            .map_err(|e| {
                ReleaseError::remote(format!(
                    "Failed to connect to '{}' from {}: {}",
                    self.remote,
                    repo.display(),
                    e.message()
                ))
            })?;
        let names = connection
            .list()?
            .iter()
            .map(|head| head.name().to_string())
            .collect();
        Ok(names)
    }

    fn fetch(&self, repository: &Repository, refspecs: &[&str]) -> Result<()> {
        let mut remote = repository.find_remote(&self.remote).map_err(|e| {
            ReleaseError::remote(format!("Remote '{}' not found: {}", self.remote, e.message()))
        })?;
        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(remote_callbacks());
        remote
            .fetch(refspecs, Some(&mut fetch_options), None)
            .map_err(|e| {
                ReleaseError::remote(format!(
                    "Failed to fetch from remote '{}': {}",
                    self.remote,
                    e.message()
                ))
            })
    }

    /// Point HEAD at `refname` and update the working tree to match.
    fn switch_to(repository: &Repository, refname: &str) -> Result<()> {
        let target = repository.revparse_single(refname)?;
        repository.checkout_tree(&target, Some(CheckoutBuilder::new().safe()))?;
        repository.set_head(refname)?;
        Ok(())
    }
}

/// Credential callbacks shared by fetch, push, ls-remote and clone.
fn remote_callbacks<'a>() -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|_url, username_from_url, allowed_types| {
        let username = username_from_url.unwrap_or("git");
        if allowed_types.contains(CredentialType::SSH_KEY) {
            if let Some(home) = dirs::home_dir() {
                for key in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                    let path: PathBuf = home.join(".ssh").join(key);
                    if path.exists() {
                        if let Ok(cred) = Cred::ssh_key(username, None, &path, None) {
                            return Ok(cred);
                        }
                    }
                }
            }
            if let Ok(cred) = Cred::ssh_key_from_agent(username) {
                return Ok(cred);
            }
        }
        Cred::default()
    });
    callbacks
}

impl super::VersionControl for Git2VersionControl {
    fn has_uncommitted_changes(&self, repo: &Path) -> Result<bool> {
        let repository = self.open(repo)?;
        let mut options = StatusOptions::new();
        options.include_untracked(false).include_ignored(false);
        let statuses = repository.statuses(Some(&mut options))?;
        let dirty = statuses
            .iter()
            .any(|entry| entry.status() != Status::CURRENT);
        debug!(repo = %repo.display(), dirty, "checked working copy");
        Ok(dirty)
    }

    fn pull(&self, repo: &Path, branch: &str) -> Result<()> {
        let repository = self.open(repo)?;
        let heads = format!("+refs/heads/*:refs/remotes/{}/*", self.remote);
        self.fetch(&repository, &[heads.as_str(), "+refs/tags/*:refs/tags/*"])?;

        let tracking = format!("refs/remotes/{}/{}", self.remote, branch);
        let remote_oid = match repository.find_reference(&tracking) {
            Ok(reference) => reference.target().ok_or_else(|| {
                ReleaseError::remote(format!("Remote reference {} is invalid", tracking))
            })?,
            Err(_) => {
                return Err(ReleaseError::precondition(format!(
                    "Branch '{}' does not exist on '{}'",
                    branch, self.remote
                )))
            }
        };

        let local_ref = format!("refs/heads/{}", branch);
        let local_oid = match repository.find_branch(branch, BranchType::Local) {
            Ok(local) => local.get().target(),
            Err(_) => {
                let commit = repository.find_commit(remote_oid)?;
                repository.branch(branch, &commit, false)?;
                info!(repo = %repo.display(), branch, "created local branch from remote");
                return Self::switch_to(&repository, &local_ref);
            }
        };

        if local_oid == Some(remote_oid) {
            return Self::switch_to(&repository, &local_ref);
        }

        let fast_forward = match local_oid {
            Some(oid) => repository.graph_descendant_of(remote_oid, oid)?,
            None => true,
        };
        if !fast_forward {
            warn!(repo = %repo.display(), branch, "local branch diverged from remote; not updated");
            return Self::switch_to(&repository, &local_ref);
        }

        let target = repository.find_object(remote_oid, None)?;
        repository.checkout_tree(&target, Some(CheckoutBuilder::new().force()))?;
        repository
            .find_reference(&local_ref)?
            .set_target(remote_oid, &format!("fast-forward from {}", tracking))?;
        repository.set_head(&local_ref)?;
        info!(repo = %repo.display(), branch, "fast-forwarded");
        Ok(())
    }

    fn checkout(&self, repo: &Path, reference: &str) -> Result<()> {
        let repository = self.open(repo)?;

        if repository.find_branch(reference, BranchType::Local).is_ok() {
            return Self::switch_to(&repository, &format!("refs/heads/{}", reference));
        }

        let tracking = format!("{}/{}", self.remote, reference);
        if let Ok(remote_branch) = repository.find_branch(&tracking, BranchType::Remote) {
            let commit = remote_branch.get().peel_to_commit()?;
            let mut local = repository.branch(reference, &commit, false)?;
            local.set_upstream(Some(&tracking))?;
            return Self::switch_to(&repository, &format!("refs/heads/{}", reference));
        }

        let tag_ref = format!("refs/tags/{}", reference);
        if let Ok(tag) = repository.find_reference(&tag_ref) {
            let commit = tag.peel_to_commit()?;
            repository.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))?;
            repository.set_head_detached(commit.id())?;
            return Ok(());
        }

        Err(ReleaseError::precondition(format!(
            "'{}' is neither a branch nor a tag in {}",
            reference,
            repo.display()
        )))
    }

    fn create_branch(&self, repo: &Path, name: &str) -> Result<()> {
        let repository = self.open(repo)?;
        let head = repository.head()?.peel_to_commit()?;
        repository.branch(name, &head, false)?;
        repository.set_head(&format!("refs/heads/{}", name))?;
        info!(repo = %repo.display(), branch = name, "created branch");
        Ok(())
    }

    fn branch_exists(&self, repo: &Path, name: &str) -> Result<bool> {
        let wanted = format!("refs/heads/{}", name);
        Ok(self.remote_refs(repo)?.iter().any(|r| *r == wanted))
    }

    fn remote_tag_names(&self, repo: &Path, prefix: &str) -> Result<Vec<String>> {
        let wanted = format!("refs/tags/{}", prefix);
        let mut tags: Vec<String> = self
            .remote_refs(repo)?
            .into_iter()
            .filter(|r| r.starts_with(&wanted) && !r.ends_with("^{}"))
            .filter_map(|r| r.strip_prefix("refs/tags/").map(str::to_string))
            .collect();
        tags.sort();
        tags.dedup();
        Ok(tags)
    }

    fn create_tag(&self, repo: &Path, name: &str) -> Result<()> {
        let repository = self.open(repo)?;
        let head = repository.head()?.peel_to_commit()?;
        repository
            .tag_lightweight(name, head.as_object(), false)
            .map_err(|e| {
                ReleaseError::precondition(format!("Cannot create tag '{}': {}", name, e.message()))
            })?;
        info!(repo = %repo.display(), tag = name, "created tag");
        Ok(())
    }

    fn push(&self, repo: &Path, refname: &str) -> Result<()> {
        let repository = self.open(repo)?;
        let full = if repository
            .find_reference(&format!("refs/heads/{}", refname))
            .is_ok()
        {
            format!("refs/heads/{}", refname)
        } else if repository
            .find_reference(&format!("refs/tags/{}", refname))
            .is_ok()
        {
            format!("refs/tags/{}", refname)
        } else {
            return Err(ReleaseError::precondition(format!(
                "Nothing named '{}' to push in {}",
                refname,
                repo.display()
            )));
        };

        let mut remote = repository.find_remote(&self.remote).map_err(|e| {
            ReleaseError::remote(format!("Remote '{}' not found: {}", self.remote, e.message()))
        })?;

        let mut callbacks = remote_callbacks();
        callbacks.push_update_reference(|reference, status| match status {
            Some(status) => Err(git2::Error::from_str(&format!(
                "Push rejected for {}: {}",
                reference, status
            ))),
            None => Ok(()),
        });
        let mut push_options = PushOptions::new();
        push_options.remote_callbacks(callbacks);

        let refspec = format!("{0}:{0}", full);
        remote
            .push(&[refspec.as_str()], Some(&mut push_options))
            .map_err(|e| {
                if e.class() == git2::ErrorClass::Net {
                    ReleaseError::remote(format!("Network error pushing '{}': {}", refname, e))
                } else {
                    ReleaseError::remote(format!("Failed to push '{}': {}", refname, e))
                }
            })?;
        info!(repo = %repo.display(), refspec = %refspec, "pushed");
        Ok(())
    }

    fn commit_all(&self, repo: &Path, message: &str) -> Result<()> {
        let repository = self.open(repo)?;
        let mut index = repository.index()?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree = repository.find_tree(index.write_tree()?)?;
        let signature = repository.signature()?;
        let parent = repository.head()?.peel_to_commit()?;
        let oid = repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&parent],
        )?;
        info!(repo = %repo.display(), commit = %oid, "committed");
        Ok(())
    }

    fn delete_local_branch(&self, repo: &Path, name: &str) -> Result<()> {
        let repository = self.open(repo)?;
        let mut branch = repository.find_branch(name, BranchType::Local).map_err(|_| {
            ReleaseError::precondition(format!(
                "No local branch '{}' in {}",
                name,
                repo.display()
            ))
        })?;
        branch.delete()?;
        info!(repo = %repo.display(), branch = name, "deleted local branch");
        Ok(())
    }

    fn fetch_tags(&self, repo: &Path) -> Result<()> {
        let repository = self.open(repo)?;
        self.fetch(&repository, &["+refs/tags/*:refs/tags/*"])
    }

    fn clone_repository(&self, url: &str, dest: &Path) -> Result<()> {
        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(remote_callbacks());
        RepoBuilder::new()
            .fetch_options(fetch_options)
            .clone(url, dest)
            .map_err(|e| {
                ReleaseError::remote(format!("Failed to clone {}: {}", url, e.message()))
            })?;
        info!(url, dest = %dest.display(), "cloned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::VersionControl;
    use std::fs;
    use tempfile::TempDir;

    fn init_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Release Bot").unwrap();
            config.set_str("user.email", "release@example.com").unwrap();
        }
        fs::write(dir.path().join("build.properties"), "app.version=2.4.0\n").unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_path(Path::new("build.properties"))
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        {
            let tree = repo.find_tree(tree_id).unwrap();
            let sig = repo.signature().unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
                .unwrap();
        }
        (dir, repo)
    }

    #[test]
    fn test_untracked_files_are_not_uncommitted_changes() {
        let (dir, _repo) = init_repo();
        let vcs = Git2VersionControl::new("origin");
        fs::write(dir.path().join("scratch.txt"), "notes").unwrap();
        assert!(!vcs.has_uncommitted_changes(dir.path()).unwrap());

        fs::write(dir.path().join("build.properties"), "app.version=2.5.0\n").unwrap();
        assert!(vcs.has_uncommitted_changes(dir.path()).unwrap());
    }

    #[test]
    fn test_commit_all_stages_tracked_modifications() {
        let (dir, repo) = init_repo();
        let vcs = Git2VersionControl::new("origin");
        fs::write(dir.path().join("build.properties"), "app.version=2.5.0\n").unwrap();

        vcs.commit_all(dir.path(), "Automated version bump").unwrap();

        assert!(!vcs.has_uncommitted_changes(dir.path()).unwrap());
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.message(), Some("Automated version bump"));
    }

    #[test]
    fn test_branch_tag_and_checkout() {
        let (dir, repo) = init_repo();
        let vcs = Git2VersionControl::new("origin");
        let default_branch = repo
            .head()
            .unwrap()
            .shorthand()
            .unwrap()
            .to_string();

        vcs.create_branch(dir.path(), "commcare_2.4").unwrap();
        assert_eq!(repo.head().unwrap().shorthand(), Some("commcare_2.4"));

        vcs.create_tag(dir.path(), "commcare_2.4.0").unwrap();
        assert!(repo.find_reference("refs/tags/commcare_2.4.0").is_ok());

        vcs.checkout(dir.path(), &default_branch).unwrap();
        vcs.delete_local_branch(dir.path(), "commcare_2.4").unwrap();
        assert!(repo.find_branch("commcare_2.4", BranchType::Local).is_err());

        vcs.checkout(dir.path(), "commcare_2.4.0").unwrap();
        assert!(repo.head_detached().unwrap());
    }

    #[test]
    fn test_checkout_unknown_reference_is_precondition_error() {
        let (dir, _repo) = init_repo();
        let vcs = Git2VersionControl::new("origin");
        let err = vcs.checkout(dir.path(), "nope").unwrap_err();
        assert!(matches!(err, ReleaseError::Precondition(_)));
    }

    #[test]
    fn test_open_non_repository() {
        let dir = TempDir::new().unwrap();
        let vcs = Git2VersionControl::new("origin");
        assert!(vcs.has_uncommitted_changes(dir.path()).is_err());
    }
}
