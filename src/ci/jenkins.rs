use std::sync::OnceLock;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::ci::{CiJobStore, ScpUploader};
use crate::config::CiConfig;
use crate::error::{ReleaseError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// CSRF protection token issued by the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Crumb {
    crumb: String,
    crumb_request_field: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobInfo {
    next_build_number: u64,
}

/// Jenkins REST client.
pub struct JenkinsClient {
    base: Url,
    authorization: Option<String>,
    agent: ureq::Agent,
    uploader: ScpUploader,
    crumb: OnceLock<Option<Crumb>>,
}

impl JenkinsClient {
    pub fn new(
        base_url: &str,
        user: &str,
        password: &str,
        uploader: ScpUploader,
    ) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| ReleaseError::config(format!("Invalid CI url '{}': {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ReleaseError::config(format!(
                "CI url '{}' cannot carry a path",
                base_url
            )));
        }
        let authorization = (!user.is_empty())
            .then(|| format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password))));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout_write(WRITE_TIMEOUT)
            .build();

        Ok(JenkinsClient {
            base,
            authorization,
            agent,
            uploader,
            crumb: OnceLock::new(),
        })
    }

    pub fn from_config(ci: &CiConfig) -> Result<Self> {
        let uploader = ScpUploader::new(
            ci.build_server_user.clone(),
            ci.build_server.clone(),
            ci.jobs_dir.clone(),
        );
        Self::new(&ci.url, &ci.user, &ci.password, uploader)
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: &str, url: &Url) -> ureq::Request {
        let request = self.agent.request_url(method, url);
        match &self.authorization {
            Some(value) => request.set("Authorization", value),
            None => request,
        }
    }

    fn crumb(&self) -> Result<Option<&Crumb>> {
        if let Some(cached) = self.crumb.get() {
            return Ok(cached.as_ref());
        }
        let url = self.url(&["crumbIssuer", "api", "json"]);
        let fetched = match self.request("GET", &url).call() {
            Ok(response) => Some(response.into_json::<Crumb>().map_err(|e| {
                ReleaseError::remote(format!("Unreadable crumb from {}: {}", url, e))
            })?),
            // CSRF protection disabled
            Err(ureq::Error::Status(404, _)) => None,
            Err(err) => return Err(ReleaseError::http("Fetching CSRF crumb", err)),
        };
        let _ = self.crumb.set(fetched);
        Ok(self.crumb.get().and_then(Option::as_ref))
    }

    fn get_text(&self, url: &Url, context: &str) -> Result<String> {
        debug!(%url, "GET");
        let response = self
            .request("GET", url)
            .call()
            .map_err(|e| ReleaseError::http(context, e))?;
        response
            .into_string()
            .map_err(|e| ReleaseError::remote(format!("{}: unreadable response: {}", context, e)))
    }

    fn post(&self, url: &Url, xml: Option<&str>, context: &str) -> Result<()> {
        debug!(%url, "POST");
        let mut request = self.request("POST", url);
        if let Some(crumb) = self.crumb()? {
            request = request.set(&crumb.crumb_request_field, &crumb.crumb);
        }
        let sent = match xml {
            Some(body) => request
                .set("Content-Type", "application/xml; charset=utf-8")
                .send_string(body),
            None => request.call(),
        };
        sent.map_err(|e| ReleaseError::http(context, e))?;
        Ok(())
    }
}

impl CiJobStore for JenkinsClient {
    fn job_exists(&self, job: &str) -> Result<bool> {
        let mut url = self.url(&["job", job, "api", "json"]);
        url.query_pairs_mut().append_pair("tree", "name");
        match self.request("GET", &url).call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(404, _)) => Ok(false),
            Err(err) => Err(ReleaseError::http(&format!("Looking up job '{}'", job), err)),
        }
    }

    fn get_config(&self, job: &str) -> Result<String> {
        let url = self.url(&["job", job, "config.xml"]);
        self.get_text(&url, &format!("Reading config of job '{}'", job))
    }

    fn set_config(&self, job: &str, xml: &str) -> Result<()> {
        let url = self.url(&["job", job, "config.xml"]);
        self.post(&url, Some(xml), &format!("Updating config of job '{}'", job))?;
        info!(job, "job reconfigured");
        Ok(())
    }

    fn create_job(&self, job: &str, xml: &str) -> Result<()> {
        let mut url = self.url(&["createItem"]);
        url.query_pairs_mut().append_pair("name", job);
        self.post(&url, Some(xml), &format!("Creating job '{}'", job))?;
        info!(job, "job created");
        Ok(())
    }

    fn get_build_number(&self, job: &str) -> Result<u64> {
        let mut url = self.url(&["job", job, "api", "json"]);
        url.query_pairs_mut().append_pair("tree", "nextBuildNumber");
        let body = self.get_text(&url, &format!("Reading build number of job '{}'", job))?;
        let info: JobInfo = serde_json::from_str(&body).map_err(|e| {
            ReleaseError::remote(format!("Unreadable job info for '{}': {}", job, e))
        })?;
        Ok(info.next_build_number)
    }

    fn set_build_number(&self, job: &str, number: u64) -> Result<()> {
        self.uploader.upload(job, number)?;
        // The server only rereads nextBuildNumber when the job is reloaded.
        let xml = self.get_config(job)?;
        self.set_config(job, &xml)
    }

    fn build_job(&self, job: &str) -> Result<()> {
        let url = self.url(&["job", job, "build"]);
        self.post(&url, None, &format!("Triggering build of '{}'", job))?;
        info!(job, "build queued");
        Ok(())
    }

    fn get_view_config(&self, view: &str) -> Result<String> {
        let url = self.url(&["view", view, "config.xml"]);
        self.get_text(&url, &format!("Reading view '{}'", view))
    }

    fn set_view_config(&self, view: &str, xml: &str) -> Result<()> {
        let url = self.url(&["view", view, "config.xml"]);
        self.post(&url, Some(xml), &format!("Updating view '{}'", view))
    }
}
