//! Hotfix lifecycle: branch from the latest hotfix tag, then tag the fix.

use tracing::{debug, info};

use super::ReleaseContext;
use crate::domain::{ReleaseNaming, SourceRef, Version, VersionBump, NO_HOTFIX};
use crate::error::{ReleaseError, Result};
use crate::patch::{self, VersionTemplate};
use crate::ui;

impl ReleaseContext<'_> {
    /// Highest hotfix number tagged for `version` in `repo`, or `NO_HOTFIX`.
    pub fn last_hotfix_in_repo(&self, repo: &str, version: &Version) -> Result<i32> {
        let prefix = self.naming.hotfix_tag_prefix(version);
        let tags = self.vcs.remote_tag_names(&self.repo_path(repo), &prefix)?;
        let last = self.naming.last_hotfix_number(version, &tags);
        debug!(repo, %version, last, "scanned hotfix tags");
        Ok(last)
    }

    /// Staged release with the highest hotfix tagged in core or Android.
    pub fn current_hotfix_version(&self) -> Result<Version> {
        let staged = self.staged_release_version()?;
        let core = self.last_hotfix_in_repo(&self.config.git.core_repo, &staged)?;
        let android = self.last_hotfix_in_repo(&self.config.git.android_repo, &staged)?;
        Ok(staged.with_hotfix(core.max(android)))
    }

    pub fn next_hotfix_version(&self) -> Result<Version> {
        self.current_hotfix_version()?.next_hotfix()
    }

    /// Staged release and the hotfix that would follow it.
    pub fn show_version(&self) -> Result<(Version, Version)> {
        let staged = self.staged_release_version()?;
        let next = self.next_hotfix_version()?;
        ui::display_versions(&staged, &next);
        Ok((staged, next))
    }

    /// Tag of the latest hotfix of `version` in `repo`.
    fn latest_hotfix_tag(&self, repo: &str, version: &Version) -> Result<SourceRef> {
        let last = self.last_hotfix_in_repo(repo, version)?;
        if last == NO_HOTFIX {
            return Err(ReleaseError::precondition(format!(
                "No {}* tags in {}; release {} was never tagged",
                self.naming.hotfix_tag_prefix(version),
                repo,
                version.short()
            )));
        }
        Ok(SourceRef::Tag(self.naming.tag_name(&version.with_hotfix(last))))
    }

    /// Open a hotfix branch for the staged release in `repos`.
    pub fn hotfix_start(&mut self, repos: &[String]) -> Result<Version> {
        self.ensure_tracked(repos)?;
        self.ensure_clean()?;
        let version = self.staged_release_version()?;
        let branch = self.naming.branch_name(&version);
        let taken = self.repos_with_branch(repos, &branch)?;
        if !taken.is_empty() {
            return Err(ReleaseError::precondition(format!(
                "{} branch still exists in {}; close it before starting a hotfix",
                branch,
                taken.join(", ")
            )));
        }

        let mut latest_tags = Vec::new();
        for repo in &self.config.git.repos {
            latest_tags.push((repo.clone(), self.latest_hotfix_tag(repo, &version)?));
        }
        let tag_of = |repo: &str| -> Result<SourceRef> {
            latest_tags
                .iter()
                .find(|(name, _)| name == repo)
                .map(|(_, tag)| tag.clone())
                .ok_or_else(|| ReleaseError::precondition(format!("'{}' is not tracked", repo)))
        };

        for (repo, tag) in &latest_tags {
            let path = self.repo_path(repo);
            ui::display_status(&format!("Checking out {} in {}", tag.name(), repo));
            self.vcs.fetch_tags(&path)?;
            self.vcs.checkout(&path, tag.name())?;
        }

        for repo in repos {
            let path = self.repo_path(repo);
            self.vcs.create_branch(&path, &branch)?;
            self.vcs.push(&path, &branch)?;
            info!(repo = %repo, branch = %branch, "created hotfix branch");
        }

        let android = self.config.git.android_repo.clone();
        if repos.contains(&android) {
            self.bump_manifest_hotfix(&android, &branch)?;
        }

        let core = self.config.git.core_repo.clone();
        let hotfix_branch = SourceRef::Branch(branch.clone());
        let core_tag = tag_of(&core)?;
        let short = version.short();
        for repo in repos {
            let root = self.config.ci.job_for_repo(repo).to_string();
            let core_ref = (root == self.config.ci.core_ref_job && repos.contains(&core))
                .then_some((&core_tag, &hotfix_branch));
            self.switch_job_source(&root, &short, &tag_of(repo)?, &hotfix_branch, core_ref)?;
        }

        let release_job = ReleaseNaming::job_name(&self.config.ci.version_job, &short);
        self.bump_job_version(&release_job, VersionBump::Hotfix)?;
        ui::display_success(&format!("Hotfix branch {} is ready", branch));
        Ok(version)
    }

    fn bump_manifest_hotfix(&mut self, android: &str, branch: &str) -> Result<()> {
        let mode = self.config.patch.replace;
        let mut manifest = self
            .workspace
            .edit(android, &self.config.files.android_manifest)?;
        manifest.apply(|text| {
            let outcome = patch::bump_token(
                text,
                &VersionTemplate::manifest_full(),
                VersionBump::Hotfix,
                mode,
            )?;
            ui::display_status(&format!(
                "AndroidManifest: replacing {} with {}",
                outcome.old_token, outcome.new_token
            ));
            Ok(outcome.text)
        })?;
        self.review_and_commit(android, branch, vec![manifest], "Automated hotfix version bump")
    }

    /// Tag the hotfix branch in `repos` and point their jobs at the new tag.
    pub fn hotfix_finish(&mut self, repos: &[String]) -> Result<Version> {
        self.ensure_tracked(repos)?;
        self.ensure_clean()?;
        let version = self.next_hotfix_version()?;
        let branch = self.naming.branch_name(&version);
        let tag = self.naming.tag_name(&version);
        self.ensure_branch_everywhere(repos, &branch)?;

        self.tag_branch(repos, &branch, &tag)?;

        let config = self.config;
        let core = &config.git.core_repo;
        let hotfix_branch = SourceRef::Branch(branch);
        let hotfix_tag = SourceRef::Tag(tag);
        let short = version.short();
        for repo in repos {
            let root = config.ci.job_for_repo(repo);
            let core_ref = (root == config.ci.core_ref_job && repos.contains(core))
                .then_some((&hotfix_branch, &hotfix_tag));
            self.switch_job_source(root, &short, &hotfix_branch, &hotfix_tag, core_ref)?;
        }
        ui::display_success(&format!("Hotfix {} is tagged", version));
        Ok(version)
    }
}
