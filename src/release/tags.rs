//! Promoting a release branch to a tagged release.

use tracing::info;

use super::ReleaseContext;
use crate::domain::{Version, VersionBump};
use crate::error::{ReleaseError, Result};
use crate::patch::{self, VersionTemplate};
use crate::ui;

impl ReleaseContext<'_> {
    /// Fail unless `branch` exists in every repository of `repos`.
    pub fn ensure_branch_everywhere(&self, repos: &[String], branch: &str) -> Result<()> {
        let present = self.repos_with_branch(repos, branch)?;
        let missing: Vec<&str> = repos
            .iter()
            .map(String::as_str)
            .filter(|repo| !present.contains(repo))
            .collect();
        if !missing.is_empty() {
            return Err(ReleaseError::precondition(format!(
                "{} branch doesn't exist in {}",
                branch,
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Strip the pre-release marker from core's version on `branch`.
    pub fn mark_as_release(&mut self, branch: &str) -> Result<()> {
        let patch_config = &self.config.patch;
        let (alpha, release) = (
            patch_config.alpha_marker.clone(),
            patch_config.release_marker.clone(),
        );
        self.swap_core_marker(branch, &alpha, &release, "Automated: removing 'alpha' from version")
    }

    /// Give the Android manifest on `branch` its hotfix component (`X.Y` to `X.Y.0`).
    pub fn add_hotfix_baseline(&mut self, branch: &str) -> Result<()> {
        let android = self.config.git.android_repo.clone();
        let path = self.repo_path(&android);
        self.vcs.checkout(&path, branch)?;
        self.vcs.pull(&path, branch)?;

        let mode = self.config.patch.replace;
        let mut manifest = self
            .workspace
            .edit(&android, &self.config.files.android_manifest)?;
        manifest.apply(|text| {
            let outcome = patch::patch_version(
                text,
                &VersionTemplate::manifest_short(),
                &VersionTemplate::manifest_full(),
                VersionBump::Keep,
                mode,
            )?;
            ui::display_status(&format!(
                "AndroidManifest: replacing {} with {}",
                outcome.old_token, outcome.new_token
            ));
            Ok(outcome.text)
        })?;
        self.review_and_commit(
            &android,
            branch,
            vec![manifest],
            "Automated: adding hotfix version to AndroidManifest",
        )
    }

    /// Tag the tip of `branch` as `tag` in each of `repos` and push the tag.
    pub fn tag_branch(&mut self, repos: &[String], branch: &str, tag: &str) -> Result<()> {
        for repo in repos {
            let path = self.repo_path(repo);
            self.vcs.checkout(&path, branch)?;
            self.vcs.pull(&path, branch)?;
            self.vcs.create_tag(&path, tag)?;
            self.vcs.push(&path, tag)?;
            info!(repo = %repo, tag, "pushed release tag");
            ui::display_success(&format!("Tagged {} in {}", tag, repo));
        }
        Ok(())
    }

    /// Promote the release branch of `version` and tag it everywhere.
    pub fn create_release_tags(&mut self, version: &Version) -> Result<String> {
        let release = version.with_hotfix(0);
        let repos = self.config.git.repos.clone();
        let branch = self.naming.branch_name(&release);
        let tag = self.naming.tag_name(&release);

        self.ensure_clean()?;
        self.ensure_branch_everywhere(&repos, &branch)?;

        if self.config.patch.mark_prerelease {
            self.mark_as_release(&branch)?;
        }
        self.add_hotfix_baseline(&branch)?;
        self.tag_branch(&repos, &branch, &tag)?;
        Ok(tag)
    }
}
