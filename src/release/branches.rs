//! Release branches: creation, version bumps on the default branch, the
//! pre-release marker and cleanup.

use tracing::{info, warn};

use super::{FileEdit, ReleaseContext};
use crate::domain::{Version, VersionBump};
use crate::error::{ReleaseError, Result};
use crate::patch::{self, VersionTemplate};
use crate::ui;

impl ReleaseContext<'_> {
    /// Check that a branch for `version` can be cut: clean working copies,
    /// default branches up to date, and the branch name free everywhere.
    pub fn check_branch_available(&self, version: &Version) -> Result<String> {
        self.ensure_clean()?;
        let default_branch = &self.config.git.default_branch;
        for repo in &self.config.git.repos {
            let path = self.repo_path(repo);
            self.vcs.checkout(&path, default_branch)?;
            self.vcs.pull(&path, default_branch)?;
        }

        let branch = self.naming.branch_name(version);
        let taken = self.repos_with_branch(&self.config.git.repos, &branch)?;
        if !taken.is_empty() {
            return Err(ReleaseError::precondition(format!(
                "{} branch already exists in {}",
                branch,
                taken.join(", ")
            )));
        }
        Ok(branch)
    }

    /// Create and push `branch` from the default branch of every repository.
    pub fn create_release_branches(&mut self, branch: &str) -> Result<()> {
        let default_branch = &self.config.git.default_branch;
        for repo in &self.config.git.repos {
            let path = self.repo_path(repo);
            ui::display_status(&format!("Creating {} in {}", branch, repo));
            self.vcs.create_branch(&path, branch)?;
            self.vcs.push(&path, branch)?;
            self.vcs.checkout(&path, default_branch)?;
            info!(repo = %repo, branch, "created release branch");
        }
        Ok(())
    }

    /// Move the default branches of core and Android to the next minor.
    pub fn bump_default_branch_versions(&mut self) -> Result<()> {
        let default_branch = self.config.git.default_branch.clone();
        let core = self.config.git.core_repo.clone();
        let android = self.config.git.android_repo.clone();

        let edits = self.core_version_edits()?;
        self.review_and_commit(&core, &default_branch, edits, "Automated version bump")?;

        let edits = self.android_version_edits()?;
        self.review_and_commit(&android, &default_branch, edits, "Automated version bump")
    }

    fn core_version_edits(&self) -> Result<Vec<FileEdit>> {
        let files = &self.config.files;
        let mode = self.config.patch.replace;
        let core = &self.config.git.core_repo;

        let mut properties = self.workspace.edit(core, &files.build_properties)?;
        properties.apply(|text| {
            let outcome = patch::bump_token(
                text,
                &VersionTemplate::build_properties(),
                VersionBump::Minor,
                mode,
            )?;
            ui::display_status(&format!(
                "{}: replacing {} with {}",
                properties_name(files),
                outcome.from,
                outcome.to
            ));
            Ok(outcome.text)
        })?;

        let mut platform = self.workspace.edit(core, &files.platform_source)?;
        platform.apply(|text| {
            let outcome = patch::bump_token(
                text,
                &VersionTemplate::platform_literal(),
                VersionBump::Minor,
                mode,
            )?;
            Ok(outcome.text)
        })?;

        Ok(vec![properties, platform])
    }

    fn android_version_edits(&self) -> Result<Vec<FileEdit>> {
        let files = &self.config.files;
        let mode = self.config.patch.replace;
        let android = &self.config.git.android_repo;

        let mut manifest = self.workspace.edit(android, &files.android_manifest)?;
        manifest.apply(|text| {
            let outcome = patch::bump_token(
                text,
                &VersionTemplate::manifest_short(),
                VersionBump::Minor,
                mode,
            )?;
            ui::display_status(&format!(
                "AndroidManifest: replacing {} with {}",
                outcome.old_token, outcome.new_token
            ));
            Ok(outcome.text)
        })?;
        let mut edits = vec![manifest];

        if files.bump_version_array {
            let mut strings = self.workspace.edit(android, &files.android_strings)?;
            strings.apply(|text| {
                let (patched, previous) =
                    patch::bump_version_array(text, &files.version_array_marker)?;
                ui::display_status(&format!(
                    "strings.xml: replacing {} with {}",
                    previous.short(),
                    previous.next_minor()?.short()
                ));
                Ok(patched)
            })?;
            edits.push(strings);
        }
        Ok(edits)
    }

    /// Tag the core version on `branch` as a pre-release (`dev` to `alpha`).
    pub fn mark_prerelease(&mut self, branch: &str) -> Result<()> {
        let patch_config = &self.config.patch;
        let (dev, alpha) = (patch_config.dev_marker.clone(), patch_config.alpha_marker.clone());
        self.swap_core_marker(
            branch,
            &dev,
            &alpha,
            "Automated commit adding alpha tag to commcare version",
        )
    }

    /// Swap a `commcare.version` marker in core's build properties on `branch`.
    pub(crate) fn swap_core_marker(
        &mut self,
        branch: &str,
        existing: &str,
        replacement: &str,
        message: &str,
    ) -> Result<()> {
        let core = self.config.git.core_repo.clone();
        let path = self.repo_path(&core);
        self.vcs.checkout(&path, branch)?;
        self.vcs.pull(&path, branch)?;

        let mut edit = self.workspace.edit(&core, &self.config.files.build_properties)?;
        edit.apply(|text| patch::replace_marker(text, existing, replacement))?;
        self.review_and_commit(&core, branch, vec![edit], message)?;
        self.vcs.checkout(&path, &self.config.git.default_branch)
    }

    /// Delete the local release branch of `version` in every repository.
    pub fn close_branches(&mut self, version: &Version) -> Result<()> {
        let branch = self.naming.branch_name(version);
        let repos = &self.config.git.repos;
        if self.repos_with_branch(repos, &branch)?.is_empty() {
            return Err(ReleaseError::precondition(format!(
                "{} branch doesn't exist in any of {}",
                branch,
                repos.join(", ")
            )));
        }

        let default_branch = &self.config.git.default_branch;
        for repo in repos {
            let path = self.repo_path(repo);
            self.vcs.checkout(&path, default_branch)?;
            match self.vcs.delete_local_branch(&path, &branch) {
                Ok(()) => ui::display_success(&format!("Deleted {} in {}", branch, repo)),
                Err(ReleaseError::Precondition(reason)) => {
                    warn!(repo = %repo, %reason, "local branch not deleted");
                    ui::display_warning(&format!("{}: {}", repo, reason));
                }
                Err(e) => return Err(e),
            }
        }
        ui::display_manual_instruction(&format!(
            "Remember to close the remote {} branches on the hosting service",
            branch
        ));
        Ok(())
    }
}

fn properties_name(files: &crate::config::FilesConfig) -> String {
    files
        .build_properties
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| files.build_properties.display().to_string())
}
