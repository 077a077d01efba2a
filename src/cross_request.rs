//! Cross-request checkout
//!
//! A pull request can declare that it depends on a pull request in another
//! repository with a line such as
//! `cross-request: https://github.com/dimagi/commcare-core/pull/812`.
//! CI uses this to build the source PR against the matching branch of the
//! target repository.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::config::GithubConfig;
use crate::error::{ReleaseError, Result};
use crate::git::VersionControl;
use crate::ui;

const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryInfo {
    pub name: String,
    pub html_url: String,
    pub clone_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestHead {
    #[serde(rename = "ref")]
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub body: Option<String>,
    pub head: PullRequestHead,
}

/// Read access to repositories and pull requests on the hosting service.
pub trait CodeHost {
    fn repository(&self, repo: &str) -> Result<RepositoryInfo>;

    fn pull_request(&self, repo: &str, number: u64) -> Result<PullRequest>;
}

/// GitHub REST API client for one organization.
pub struct GithubClient {
    api: Url,
    owner: String,
    token: Option<String>,
    agent: ureq::Agent,
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let api = Url::parse(&config.api_url).map_err(|e| {
            ReleaseError::config(format!("Invalid GitHub API url '{}': {}", config.api_url, e))
        })?;
        Ok(GithubClient {
            api,
            owner: config.owner.clone(),
            token: (!config.token.is_empty()).then(|| config.token.clone()),
            agent: ureq::AgentBuilder::new().timeout(TIMEOUT).build(),
        })
    }

    fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        segments: &[&str],
        context: &str,
    ) -> Result<T> {
        let mut url = self.api.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        debug!(%url, "GET");
        let mut request = self
            .agent
            .request_url("GET", &url)
            .set("User-Agent", "release-train")
            .set("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {}", token));
        }
        let response = request.call().map_err(|e| ReleaseError::http(context, e))?;
        response
            .into_json::<T>()
            .map_err(|e| ReleaseError::remote(format!("{}: unreadable response: {}", context, e)))
    }
}

impl CodeHost for GithubClient {
    fn repository(&self, repo: &str) -> Result<RepositoryInfo> {
        self.get_json(
            &["repos", &self.owner, repo],
            &format!("Looking up repository {}/{}", self.owner, repo),
        )
    }

    fn pull_request(&self, repo: &str, number: u64) -> Result<PullRequest> {
        let number = number.to_string();
        self.get_json(
            &["repos", &self.owner, repo, "pulls", &number],
            &format!("Looking up {}/{} pull request #{}", self.owner, repo, number),
        )
    }
}

/// Number of the target pull request named in `body`, if any.
pub fn find_cross_request_number(body: &str, target_html_url: &str) -> Result<Option<u64>> {
    let pattern = format!(
        r"[Cc]ross-?(request)?:?(\s?){}/pull/(\d+)",
        regex::escape(target_html_url.trim_end_matches('/'))
    );
    let re = Regex::new(&pattern)
        .map_err(|e| ReleaseError::parse(format!("Invalid cross-request pattern: {}", e)))?;
    Ok(re
        .captures(body)
        .and_then(|caps| caps.get(3))
        .and_then(|m| m.as_str().parse().ok()))
}

/// Target branch the source pull request asks to be built against.
pub fn cross_request_branch(
    host: &dyn CodeHost,
    source_repo: &str,
    pr_number: u64,
    target: &RepositoryInfo,
    fallback: &str,
) -> Result<String> {
    let source_pr = host.pull_request(source_repo, pr_number)?;
    let body = source_pr.body.as_deref().unwrap_or_default();
    match find_cross_request_number(body, &target.html_url)? {
        Some(number) => {
            info!(target = %target.name, number, "found cross-request");
            Ok(host.pull_request(&target.name, number)?.head.branch)
        }
        None => Ok(fallback.to_string()),
    }
}

/// Clone `target_repo` into `workdir` and check out the branch the source
/// pull request depends on. Returns the clone path and the branch.
pub fn checkout_cross_request(
    host: &dyn CodeHost,
    vcs: &dyn VersionControl,
    workdir: &Path,
    source_repo: &str,
    pr_number: u64,
    target_repo: &str,
    fallback: &str,
) -> Result<(PathBuf, String)> {
    let target = host.repository(target_repo)?;
    let branch = cross_request_branch(host, source_repo, pr_number, &target, fallback)?;

    let dest = workdir.join(&target.name);
    ui::display_status(&format!("Cloning {} into {}", target.clone_url, dest.display()));
    vcs.clone_repository(&target.clone_url, &dest)?;
    vcs.checkout(&dest, &branch)?;
    ui::display_success(&format!("Checked out {} of {}", branch, target.name));
    Ok((dest, branch))
}
