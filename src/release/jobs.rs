//! Release jobs on the CI server: reading the staged version, cloning the
//! previous release's jobs, build numbers and source switching.

use tracing::{debug, info, warn};

use super::ReleaseContext;
use crate::ci::view;
use crate::domain::{
    parameter_switch, ref_switch, ReleaseNaming, SourceRef, Version, VersionBump,
};
use crate::error::{ReleaseError, Result};
use crate::gate::PendingChange;
use crate::patch::{self, VersionTemplate};
use crate::ui;

/// Printed when the operator rejects the versions read from CI.
pub const VERSION_MISMATCH_MESSAGE: &str = "Release versions from jenkins are incorrect, exiting.";

/// The single `VERSION=X.Y.Z` value in a job configuration.
fn read_version_parameter(job: &str, xml: &str) -> Result<Version> {
    let tokens = VersionTemplate::ci_version_parameter().find_all(xml);
    let Some(first) = tokens.first() else {
        return Err(ReleaseError::parse(format!(
            "Couldn't find a 'VERSION=X.Y.Z' parameter in CI job {}",
            job
        )));
    };
    if let Some(other) = tokens.iter().find(|t| t.version != first.version) {
        return Err(ReleaseError::parse(format!(
            "CI job {} has conflicting versions '{}' and '{}'",
            job, first.literal, other.literal
        )));
    }
    Ok(first.version)
}

/// Point every reference to a `<root>-<from>` job at `<root>-<to>`.
fn retarget_job_references(xml: &str, roots: &[String], from: &str, to: &str) -> String {
    let replacements: Vec<(String, String)> = roots
        .iter()
        .map(|root| {
            (
                ReleaseNaming::job_name(root, from),
                ReleaseNaming::job_name(root, to),
            )
        })
        .collect();
    patch::replace_literals(xml, &replacements)
}

impl ReleaseContext<'_> {
    /// Version the next release will get, from the version job.
    pub fn next_release_version(&self) -> Result<Version> {
        let job = &self.config.ci.version_job;
        let xml = self.ci.get_config(job)?;
        let version = read_version_parameter(job, &xml)?;
        debug!(%version, job = %job, "read next release version");
        Ok(version)
    }

    /// Version of the release currently in the field, from its release job.
    pub fn staged_release_version(&self) -> Result<Version> {
        let upcoming = self.next_release_version()?;
        let job = ReleaseNaming::job_name(
            &self.config.ci.version_job,
            &upcoming.last_version_short(),
        );
        let xml = self.ci.get_config(&job)?;
        let version = read_version_parameter(&job, &xml)?;
        debug!(%version, job = %job, "read staged release version");
        Ok(version)
    }

    /// Ask the operator to confirm the previous and new release versions.
    pub fn verify_release_versions(&mut self, version: &Version) -> Result<()> {
        let question = format!(
            "Are these values correct?: last release: {}, this release {}",
            version.last_version_short(),
            version.short()
        );
        self.gate.verify(&question, VERSION_MISMATCH_MESSAGE)
    }

    /// Fail when any `<root>-<short>` release job already exists.
    pub fn ensure_jobs_absent(&self, version: &Version) -> Result<()> {
        let short = version.short();
        for root in &self.config.ci.job_roots {
            let job = ReleaseNaming::job_name(root, &short);
            if self.ci.job_exists(&job)? {
                return Err(ReleaseError::precondition(format!(
                    "CI job {} already exists",
                    job
                )));
            }
        }
        Ok(())
    }

    /// Create the release jobs for `version` and archive old ones.
    pub fn create_release_jobs(&mut self, version: &Version) -> Result<()> {
        let roots = self.config.ci.job_roots.clone();
        for root in &roots {
            self.create_release_job(root, version)?;
            self.archive_old_release_job(root, version)?;
        }
        Ok(())
    }

    /// Clone `<root>-<last>` into `<root>-<short>` building the release branch.
    pub fn create_release_job(&mut self, root: &str, version: &Version) -> Result<()> {
        let last = version.last_version_short();
        let short = version.short();
        let last_job = ReleaseNaming::job_name(root, &last);
        let new_job = ReleaseNaming::job_name(root, &short);
        ui::display_status(&format!(
            "Creating job '{}' from old job '{}'",
            new_job, last_job
        ));

        let original = self.ci.get_config(&last_job)?;
        let retargeted =
            retarget_job_references(&original, &self.config.ci.job_roots, &last, &short);

        let tag_ref = VersionTemplate::release_tag_ref(&self.naming.prefix)?;
        let Some(old_source) = tag_ref.find_all(&retargeted).into_iter().next() else {
            return Err(ReleaseError::parse(format!(
                "Couldn't find a git reference like '{}' in CI job {}",
                tag_ref.pattern(),
                last_job
            )));
        };
        let old_tag = SourceRef::Tag(self.naming.tag_name(&old_source.version));
        let branch = SourceRef::Branch(self.naming.branch_name(version));
        let updated = patch::replace_literals(
            &retargeted,
            &[
                ref_switch(&old_tag, &branch),
                parameter_switch(&self.config.ci.core_ref_parameter, &old_tag, &branch),
            ],
        );

        let ci = self.ci;
        let change = PendingChange::new(
            format!("CI job {} -> {}", last_job, new_job),
            &original,
            &updated,
        );
        let abort = format!(
            "Exiting before creating CI job '{}'. You'll need to manually complete the deploy.",
            new_job
        );
        self.gate.publish(
            &format!("Create CI job '{}'?", new_job),
            &[change],
            &abort,
            || ci.create_job(&new_job, &updated),
        )?;
        info!(job = %new_job, "created release job");

        view::add_job_to_view(self.ci, &new_job, &self.config.ci.active_view)?;
        ui::display_success(&format!(
            "Created {} and added it to '{}'",
            new_job, self.config.ci.active_view
        ));
        Ok(())
    }

    /// Move the release job from two minors back into the archive view.
    pub fn archive_old_release_job(&mut self, root: &str, version: &Version) -> Result<()> {
        if version.minor < 2 {
            debug!(%version, "no release two minors back to archive");
            return Ok(());
        }
        let old = Version::new(version.major, version.minor - 2, 0).short();
        let job = ReleaseNaming::job_name(root, &old);
        if !self.ci.job_exists(&job)? {
            warn!(job = %job, "old release job not found, nothing to archive");
            return Ok(());
        }

        ui::display_status(&format!(
            "Moving {} to the '{}' view",
            job, self.config.ci.archive_view
        ));
        view::remove_job_from_view(self.ci, &job, &self.config.ci.active_view)?;
        view::add_job_to_view(self.ci, &job, &self.config.ci.archive_view)
    }

    /// Give each new release job a build number above its root job's, then
    /// advance the root jobs past them.
    pub fn set_build_numbers(&mut self, version: &Version) -> Result<()> {
        let short = version.short();
        let ci = &self.config.ci;
        for root in &ci.job_roots {
            let next = self.ci.get_build_number(root)? + ci.release_build_increment;
            self.upload_build_number(&ReleaseNaming::job_name(root, &short), next)?;
        }
        for root in &ci.job_roots {
            let next = self.ci.get_build_number(root)? + ci.root_build_increment;
            self.upload_build_number(root, next)?;
        }
        Ok(())
    }

    fn upload_build_number(&self, job: &str, number: u64) -> Result<()> {
        ui::display_status(&format!("Setting {}'s nextBuildNumber to {}", job, number));
        match self.ci.set_build_number(job, number) {
            Ok(()) => Ok(()),
            Err(ReleaseError::Remote(reason)) => {
                warn!(job = %job, %reason, "build number upload failed");
                let url = self.config.ci.next_build_number_url(job);
                ui::display_manual_build_number(job, number, &url);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Bump the `VERSION` parameter of `job` through the gate.
    pub fn bump_job_version(&mut self, job: &str, bump: VersionBump) -> Result<Version> {
        let original = self.ci.get_config(job)?;
        let outcome = patch::bump_token(
            &original,
            &VersionTemplate::ci_version_parameter(),
            bump,
            self.config.patch.replace,
        )?;
        ui::display_status(&format!(
            "Changing {} version reference {} to {}",
            job, outcome.from, outcome.to
        ));
        self.review_job_update(job, &original, &outcome.text)?;
        Ok(outcome.to)
    }

    /// Move the minor `VERSION` on the version job and on the new release job.
    pub fn bump_release_job_versions(&mut self, version: &Version) -> Result<()> {
        let version_job = self.config.ci.version_job.clone();
        let release_job = ReleaseNaming::job_name(&version_job, &version.short());
        self.bump_job_version(&version_job, VersionBump::Minor)?;
        self.bump_job_version(&release_job, VersionBump::Minor)?;
        Ok(())
    }

    /// Switch every release job from the release branch to its tag.
    pub fn point_release_jobs_at_tag(&mut self, version: &Version) -> Result<()> {
        let branch = SourceRef::Branch(self.naming.branch_name(version));
        let tag = SourceRef::Tag(self.naming.tag_name(version));
        let short = version.short();
        let roots = self.config.ci.job_roots.clone();
        for root in &roots {
            let core_ref = (*root == self.config.ci.core_ref_job).then_some((&branch, &tag));
            self.switch_job_source(root, &short, &branch, &tag, core_ref)?;
        }
        Ok(())
    }

    /// Trigger the release build.
    pub fn build_release(&mut self, version: &Version) -> Result<()> {
        let job = ReleaseNaming::job_name(&self.config.ci.build_trigger_job, &version.short());
        self.ci.build_job(&job)?;
        info!(job = %job, "queued release build");
        ui::display_manual_instruction(&format!(
            "Release builds have been triggered. When they finish (~10 minutes) \
             name them {} and mark 'keep this build forever'",
            version.short()
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_version_parameter() {
        let xml = "<defaultValue>VERSION=2.44.0</defaultValue>";
        assert_eq!(
            read_version_parameter("commcare-android", xml).unwrap(),
            Version::new(2, 44, 0)
        );
    }

    #[test]
    fn test_read_version_parameter_rejects_conflicts() {
        let xml = "VERSION=2.44.0 VERSION=2.43.1";
        let err = read_version_parameter("commcare-android", xml).unwrap_err();
        assert!(matches!(err, ReleaseError::Parse(_)));
    }

    #[test]
    fn test_read_version_parameter_missing() {
        assert!(read_version_parameter("commcare-android", "<project/>").is_err());
    }

    #[test]
    fn test_retarget_job_references_covers_every_root() {
        let roots = vec!["commcare-core".to_string(), "commcare-android".to_string()];
        let xml = "<upstream>commcare-core-2.43</upstream><child>commcare-android-2.43</child>";
        let out = retarget_job_references(xml, &roots, "2.43", "2.44");
        assert_eq!(
            out,
            "<upstream>commcare-core-2.44</upstream><child>commcare-android-2.44</child>"
        );
    }
}
