//! CI server abstraction
//!
//! Release jobs live on a Jenkins server. Workflows reach it only through
//! [`CiJobStore`]; [`JenkinsClient`] talks to the real server and
//! [`InMemoryJobStore`] stands in for it in tests.

pub mod build_number;
pub mod jenkins;
pub mod mock;
pub mod view;

pub use build_number::ScpUploader;
pub use jenkins::JenkinsClient;
pub use mock::InMemoryJobStore;

use crate::error::Result;

/// Job configuration, build counters and views on the CI server.
pub trait CiJobStore {
    fn job_exists(&self, job: &str) -> Result<bool>;

    /// Job configuration XML.
    fn get_config(&self, job: &str) -> Result<String>;

    /// Replace a job's configuration XML.
    fn set_config(&self, job: &str, xml: &str) -> Result<()>;

    fn create_job(&self, job: &str, xml: &str) -> Result<()>;

    /// Number the next build of `job` will get.
    fn get_build_number(&self, job: &str) -> Result<u64>;

    /// Set the next build number and make the server pick it up.
    fn set_build_number(&self, job: &str, number: u64) -> Result<()>;

    /// Queue a build.
    fn build_job(&self, job: &str) -> Result<()>;

    fn get_view_config(&self, view: &str) -> Result<String>;

    fn set_view_config(&self, view: &str, xml: &str) -> Result<()>;
}
