//! Release workflows
//!
//! Each operator command is a linear sequence of steps over the tracked
//! repositories and the CI server. Preconditions are checked before the first
//! mutation; a failure or a declined confirmation stops the sequence and
//! nothing already done is undone.

pub mod branches;
pub mod hotfix;
pub mod jobs;
pub mod tags;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ci::CiJobStore;
use crate::config::Config;
use crate::domain::{parameter_switch, ref_switch, ReleaseNaming, SourceRef, Version};
use crate::error::{ReleaseError, Result};
use crate::gate::{PendingChange, ReviewGate};
use crate::git::VersionControl;
use crate::patch;
use crate::ui;

/// Printed when the operator declines a source change.
pub const SOURCE_ABORT_MESSAGE: &str = "Exiting during code level version updates due to incorrect \
     diff. You'll need to manually complete the deploy.";

/// Directory holding one checkout per tracked repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Workspace { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo_path(&self, repo: &str) -> PathBuf {
        self.root.join(repo)
    }

    /// Load a file of `repo` for editing.
    pub fn edit(&self, repo: &str, relative: &Path) -> Result<FileEdit> {
        let path = self.repo_path(repo).join(relative);
        let original = fs::read_to_string(&path).map_err(|e| {
            ReleaseError::precondition(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Ok(FileEdit {
            description: format!("{}: {}", repo, relative.display()),
            path,
            updated: original.clone(),
            original,
        })
    }
}

/// A file change held in memory until the operator approves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    pub description: String,
    pub path: PathBuf,
    pub original: String,
    pub updated: String,
}

impl FileEdit {
    /// Replace the pending content through a text transformation.
    pub fn apply<F>(&mut self, transform: F) -> Result<()>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        self.updated = transform(&self.updated)?;
        Ok(())
    }

    pub fn pending_change(&self) -> PendingChange {
        PendingChange::new(&self.description, &self.original, &self.updated)
    }

    /// Write through `<file>.new` and rename over the original.
    pub fn write(&self) -> Result<()> {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".new");
        let staging = PathBuf::from(staging);
        fs::write(&staging, &self.updated)?;
        fs::rename(&staging, &self.path)?;
        debug!(path = %self.path.display(), "wrote file");
        Ok(())
    }
}

/// Everything a release workflow works against.
pub struct ReleaseContext<'a> {
    pub config: &'a Config,
    pub vcs: &'a dyn VersionControl,
    pub ci: &'a dyn CiJobStore,
    pub gate: ReviewGate,
    pub workspace: Workspace,
    pub naming: ReleaseNaming,
}

impl<'a> ReleaseContext<'a> {
    pub fn new(
        config: &'a Config,
        vcs: &'a dyn VersionControl,
        ci: &'a dyn CiJobStore,
        gate: ReviewGate,
    ) -> Self {
        ReleaseContext {
            workspace: Workspace::new(&config.local.projects_dir),
            naming: ReleaseNaming::new(&config.git.branch_prefix),
            config,
            vcs,
            ci,
            gate,
        }
    }

    pub fn repo_path(&self, repo: &str) -> PathBuf {
        self.workspace.repo_path(repo)
    }

    /// Cut a new minor release: CI jobs first, then branches and the
    /// version bump on the default branches.
    pub fn stage(&mut self) -> Result<Version> {
        let version = self.next_release_version()?;
        self.verify_release_versions(&version)?;
        self.ensure_jobs_absent(&version)?;
        let branch = self.check_branch_available(&version)?;

        self.create_release_jobs(&version)?;
        self.set_build_numbers(&version)?;
        self.bump_release_job_versions(&version)?;

        self.create_release_branches(&branch)?;
        self.bump_default_branch_versions()?;
        if self.config.patch.mark_prerelease {
            self.mark_prerelease(&branch)?;
        }
        ui::display_success(&format!("Staged release {}", version.short()));
        Ok(version)
    }

    /// Tag the release branch of `version`, move its jobs to the tag and
    /// trigger the release build.
    pub fn release(&mut self, version: &Version) -> Result<String> {
        let version = version.with_hotfix(0);
        let tag = self.create_release_tags(&version)?;
        self.point_release_jobs_at_tag(&version)?;
        self.build_release(&version)?;
        Ok(tag)
    }

    /// Fail when any tracked repository has uncommitted changes.
    pub fn ensure_clean(&self) -> Result<()> {
        for repo in &self.config.git.repos {
            if self.vcs.has_uncommitted_changes(&self.repo_path(repo))? {
                return Err(ReleaseError::precondition(format!(
                    "{} has uncommitted changes, please stash and try again",
                    repo
                )));
            }
        }
        Ok(())
    }

    /// Repositories (of `repos`) where `branch` exists on the remote.
    pub fn repos_with_branch<'r>(
        &self,
        repos: &'r [String],
        branch: &str,
    ) -> Result<Vec<&'r str>> {
        let mut found = Vec::new();
        for repo in repos {
            if self.vcs.branch_exists(&self.repo_path(repo), branch)? {
                found.push(repo.as_str());
            }
        }
        Ok(found)
    }

    /// Fail unless every name in `repos` is a tracked repository.
    pub fn ensure_tracked(&self, repos: &[String]) -> Result<()> {
        if repos.is_empty() {
            return Err(ReleaseError::precondition("No repositories given"));
        }
        for repo in repos {
            if !self.config.git.repos.contains(repo) {
                return Err(ReleaseError::precondition(format!(
                    "'{}' is not a tracked repository (expected one of: {})",
                    repo,
                    self.config.git.repos.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Show `edits`, and on approval write them, commit and push `branch`.
    pub fn review_and_commit(
        &mut self,
        repo: &str,
        branch: &str,
        edits: Vec<FileEdit>,
        message: &str,
    ) -> Result<()> {
        let path = self.repo_path(repo);
        let vcs = self.vcs;
        let changes: Vec<PendingChange> = edits.iter().map(FileEdit::pending_change).collect();
        let question = format!("Proceed by pushing diff to {}?", branch);
        self.gate
            .publish(&question, &changes, SOURCE_ABORT_MESSAGE, || {
                for edit in &edits {
                    edit.write()?;
                }
                vcs.commit_all(&path, message)?;
                vcs.push(&path, branch)
            })?;
        ui::display_success(&format!("Pushed '{}' to {} of {}", message, branch, repo));
        Ok(())
    }

    /// Show a job configuration change and upload it on approval.
    pub fn review_job_update(&mut self, job: &str, original: &str, updated: &str) -> Result<()> {
        let ci = self.ci;
        let change = PendingChange::new(format!("CI job {}", job), original, updated);
        let question = format!("Update CI job '{}'?", job);
        let abort = format!(
            "Exiting before updating CI job '{}'. You'll need to manually complete the deploy.",
            job
        );
        self.gate
            .publish(&question, &[change], &abort, || ci.set_config(job, updated))?;
        ui::display_success(&format!("Updated CI job {}", job));
        Ok(())
    }

    /// Move `<root>-<short>` from one source ref to another.
    ///
    /// `core_ref` also moves the job's core reference parameter, which may
    /// start from a different ref than the job's own checkout.
    pub fn switch_job_source(
        &mut self,
        job_root: &str,
        short_version: &str,
        from: &SourceRef,
        to: &SourceRef,
        core_ref: Option<(&SourceRef, &SourceRef)>,
    ) -> Result<()> {
        let job = ReleaseNaming::job_name(job_root, short_version);
        let mut replacements = vec![ref_switch(from, to)];
        if let Some((core_from, core_to)) = core_ref {
            replacements.push(parameter_switch(
                &self.config.ci.core_ref_parameter,
                core_from,
                core_to,
            ));
        }
        ui::display_status(&format!(
            "Changing CI job {} to build {} instead of {}",
            job,
            to.full_name(),
            from.full_name()
        ));

        let original = self.ci.get_config(&job)?;
        if !original.contains(&from.full_name()) {
            return Err(ReleaseError::parse(format!(
                "CI job {} does not build {}",
                job,
                from.full_name()
            )));
        }
        let updated = patch::replace_literals(&original, &replacements);
        self.review_job_update(&job, &original, &updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_edit_writes_only_on_request() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path());
        fs::create_dir_all(dir.path().join("commcare-core")).unwrap();
        fs::write(
            dir.path().join("commcare-core/build.properties"),
            "app.version=2.4.0\n",
        )
        .unwrap();

        let mut edit = workspace
            .edit("commcare-core", Path::new("build.properties"))
            .unwrap();
        edit.apply(|text| Ok(text.replace("2.4.0", "2.5.0"))).unwrap();
        assert_eq!(
            fs::read_to_string(&edit.path).unwrap(),
            "app.version=2.4.0\n"
        );

        edit.write().unwrap();
        assert_eq!(
            fs::read_to_string(&edit.path).unwrap(),
            "app.version=2.5.0\n"
        );
        assert!(!dir.path().join("commcare-core/build.properties.new").exists());
    }

    #[test]
    fn test_missing_file_is_precondition_error() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path());
        let err = workspace
            .edit("commcare-core", Path::new("build.properties"))
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Precondition(_)));
    }

    #[test]
    fn test_pending_change_description() {
        let edit = FileEdit {
            description: "commcare-core: build.properties".to_string(),
            path: PathBuf::from("/tmp/x"),
            original: "a".to_string(),
            updated: "b".to_string(),
        };
        let change = edit.pending_change();
        assert_eq!(change.description, "commcare-core: build.properties");
        assert!(!change.is_noop());
    }
}
