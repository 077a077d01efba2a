use std::io::Write;
use std::process::Command;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{ReleaseError, Result};

/// Copies a job's `nextBuildNumber` file onto the build server with `scp`.
///
/// The CI server keeps the next build number in
/// `<jobs_dir>/<job>/nextBuildNumber` and only exposes it through a web form,
/// so the file is written directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpUploader {
    pub user: String,
    pub host: String,
    pub jobs_dir: String,
}

impl ScpUploader {
    pub fn new(
        user: impl Into<String>,
        host: impl Into<String>,
        jobs_dir: impl Into<String>,
    ) -> Self {
        ScpUploader {
            user: user.into(),
            host: host.into(),
            jobs_dir: jobs_dir.into(),
        }
    }

    /// `user@host:<jobs_dir>/<job>/nextBuildNumber`
    pub fn destination(&self, job: &str) -> String {
        let target = format!(
            "{}/{}/nextBuildNumber",
            self.jobs_dir.trim_end_matches('/'),
            job
        );
        if self.user.is_empty() {
            format!("{}:{}", self.host, target)
        } else {
            format!("{}@{}:{}", self.user, self.host, target)
        }
    }

    /// Write `number` to a temporary file and copy it to the server.
    pub fn upload(&self, job: &str, number: u64) -> Result<()> {
        if self.host.is_empty() {
            return Err(ReleaseError::remote(
                "ci.build_server is not set; cannot upload nextBuildNumber",
            ));
        }

        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", number)?;
        file.flush()?;

        let destination = self.destination(job);
        debug!(job, number, destination = %destination, "uploading nextBuildNumber");
        let output = Command::new("scp")
            .arg(file.path())
            .arg(&destination)
            .output()
            .map_err(|e| ReleaseError::remote(format!("Failed to run scp: {}", e)))?;

        if !output.status.success() {
            return Err(ReleaseError::remote(format!(
                "scp to {} failed: {}",
                destination,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        info!(job, number, "uploaded nextBuildNumber");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_path() {
        let uploader = ScpUploader::new("jenkins", "build.example.com", "/var/lib/jenkins/jobs/");
        assert_eq!(
            uploader.destination("commcare-core-2.44"),
            "jenkins@build.example.com:/var/lib/jenkins/jobs/commcare-core-2.44/nextBuildNumber"
        );
    }

    #[test]
    fn test_destination_without_user() {
        let uploader = ScpUploader::new("", "build", "/jobs");
        assert_eq!(uploader.destination("a"), "build:/jobs/a/nextBuildNumber");
    }

    #[test]
    fn test_upload_without_host_is_remote_error() {
        let uploader = ScpUploader::new("jenkins", "", "/jobs");
        let err = uploader.upload("commcare-core", 10).unwrap_err();
        assert!(matches!(err, ReleaseError::Remote(_)));
    }
}
