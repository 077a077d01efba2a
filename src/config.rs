use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ReleaseError, Result};
use crate::patch::ReplaceMode;

/// Environment variable that overrides `ci.password`.
pub const CI_PASSWORD_ENV: &str = "RELEASE_TRAIN_CI_PASSWORD";
/// Environment variable that overrides `github.token`.
pub const GITHUB_TOKEN_ENV: &str = "RELEASE_TRAIN_GITHUB_TOKEN";

const CONFIG_FILE_NAME: &str = "release-train.toml";

/// Complete configuration for release-train.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub git: GitConfig,

    #[serde(default)]
    pub files: FilesConfig,

    #[serde(default)]
    pub patch: PatchConfig,

    #[serde(default)]
    pub ci: CiConfig,

    #[serde(default)]
    pub translations: TranslationsConfig,

    #[serde(default)]
    pub github: GithubConfig,
}

/// Where the tracked repositories live on this machine.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct LocalConfig {
    /// Directory holding one checkout per tracked repository.
    #[serde(default)]
    pub projects_dir: PathBuf,
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_branch_prefix() -> String {
    "commcare_".to_string()
}

fn default_core_repo() -> String {
    "commcare-core".to_string()
}

fn default_android_repo() -> String {
    "commcare-android".to_string()
}

fn default_repos() -> Vec<String> {
    vec![default_core_repo(), default_android_repo()]
}

/// Repository layout and naming.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GitConfig {
    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Prefix of release branches and tags, e.g. `commcare_` for `commcare_2.44`.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,

    /// Repositories that are branched and tagged together.
    #[serde(default = "default_repos")]
    pub repos: Vec<String>,

    /// Repository holding `build.properties` and the platform literal.
    #[serde(default = "default_core_repo")]
    pub core_repo: String,

    /// Repository holding the Android manifest.
    #[serde(default = "default_android_repo")]
    pub android_repo: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        GitConfig {
            remote: default_remote(),
            default_branch: default_branch(),
            branch_prefix: default_branch_prefix(),
            repos: default_repos(),
            core_repo: default_core_repo(),
            android_repo: default_android_repo(),
        }
    }
}

fn default_platform_source() -> PathBuf {
    PathBuf::from("src/cli/java/org/commcare/util/engine/CommCareConfigEngine.java")
}

fn default_build_properties() -> PathBuf {
    PathBuf::from("application/build.properties")
}

fn default_android_manifest() -> PathBuf {
    PathBuf::from("app/AndroidManifest.xml")
}

fn default_android_strings() -> PathBuf {
    PathBuf::from("app/res/values/strings.xml")
}

fn default_version_array_marker() -> String {
    "commcare_version".to_string()
}

/// Version-bearing files, relative to their repository root.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FilesConfig {
    #[serde(default = "default_platform_source")]
    pub platform_source: PathBuf,

    #[serde(default = "default_build_properties")]
    pub build_properties: PathBuf,

    #[serde(default = "default_android_manifest")]
    pub android_manifest: PathBuf,

    #[serde(default = "default_android_strings")]
    pub android_strings: PathBuf,

    /// Line marking the version integer array in `android_strings`.
    #[serde(default = "default_version_array_marker")]
    pub version_array_marker: String,

    /// Also bump the integer array in `android_strings` on a new release.
    #[serde(default)]
    pub bump_version_array: bool,
}

impl Default for FilesConfig {
    fn default() -> Self {
        FilesConfig {
            platform_source: default_platform_source(),
            build_properties: default_build_properties(),
            android_manifest: default_android_manifest(),
            android_strings: default_android_strings(),
            version_array_marker: default_version_array_marker(),
            bump_version_array: false,
        }
    }
}

fn default_dev_marker() -> String {
    "commcare.version=v${app.version}dev".to_string()
}

fn default_alpha_marker() -> String {
    "commcare.version=v${app.version}alpha".to_string()
}

fn default_release_marker() -> String {
    "commcare.version=v${app.version}".to_string()
}

/// Text-patch behaviour.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PatchConfig {
    #[serde(default)]
    pub replace: ReplaceMode,

    /// Mark a new release branch `alpha` and strip the tag on promotion.
    #[serde(default)]
    pub mark_prerelease: bool,

    #[serde(default = "default_dev_marker")]
    pub dev_marker: String,

    #[serde(default = "default_alpha_marker")]
    pub alpha_marker: String,

    #[serde(default = "default_release_marker")]
    pub release_marker: String,
}

impl Default for PatchConfig {
    fn default() -> Self {
        PatchConfig {
            replace: ReplaceMode::default(),
            mark_prerelease: false,
            dev_marker: default_dev_marker(),
            alpha_marker: default_alpha_marker(),
            release_marker: default_release_marker(),
        }
    }
}

fn default_ci_url() -> String {
    "https://jenkins.dimagi.com".to_string()
}

fn default_jobs_dir() -> String {
    "/var/lib/jenkins/jobs".to_string()
}

fn default_active_view() -> String {
    "CommCare Mobile".to_string()
}

fn default_archive_view() -> String {
    "CommCare Mobile Archive".to_string()
}

fn default_core_ref_parameter() -> String {
    "CCCORE_BRANCH".to_string()
}

fn default_release_build_increment() -> u64 {
    1
}

fn default_root_build_increment() -> u64 {
    2000
}

fn default_repo_jobs() -> HashMap<String, String> {
    default_repos().into_iter().map(|r| (r.clone(), r)).collect()
}

/// CI server and build-server access, and the job layout.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CiConfig {
    #[serde(default = "default_ci_url")]
    pub url: String,

    #[serde(default)]
    pub user: String,

    /// May be left empty and supplied through `RELEASE_TRAIN_CI_PASSWORD`.
    #[serde(default)]
    pub password: String,

    /// SSH login on the build server for the `nextBuildNumber` upload.
    #[serde(default)]
    pub build_server_user: String,

    #[serde(default)]
    pub build_server: String,

    #[serde(default = "default_jobs_dir")]
    pub jobs_dir: String,

    /// Job roots; each release gets a `<root>-<short>` job.
    #[serde(default = "default_repos")]
    pub job_roots: Vec<String>,

    /// Root job whose `VERSION` parameter holds the next release version.
    #[serde(default = "default_android_repo")]
    pub version_job: String,

    /// Root whose release job is triggered on promotion.
    #[serde(default = "default_core_repo")]
    pub build_trigger_job: String,

    /// Root whose release job selects the core checkout through a parameter.
    #[serde(default = "default_android_repo")]
    pub core_ref_job: String,

    #[serde(default = "default_core_ref_parameter")]
    pub core_ref_parameter: String,

    #[serde(default = "default_release_build_increment")]
    pub release_build_increment: u64,

    #[serde(default = "default_root_build_increment")]
    pub root_build_increment: u64,

    #[serde(default = "default_active_view")]
    pub active_view: String,

    #[serde(default = "default_archive_view")]
    pub archive_view: String,

    /// Repository name to job root.
    #[serde(default = "default_repo_jobs")]
    pub repo_jobs: HashMap<String, String>,
}

impl Default for CiConfig {
    fn default() -> Self {
        CiConfig {
            url: default_ci_url(),
            user: String::new(),
            password: String::new(),
            build_server_user: String::new(),
            build_server: String::new(),
            jobs_dir: default_jobs_dir(),
            job_roots: default_repos(),
            version_job: default_android_repo(),
            build_trigger_job: default_core_repo(),
            core_ref_job: default_android_repo(),
            core_ref_parameter: default_core_ref_parameter(),
            release_build_increment: default_release_build_increment(),
            root_build_increment: default_root_build_increment(),
            active_view: default_active_view(),
            archive_view: default_archive_view(),
            repo_jobs: default_repo_jobs(),
        }
    }
}

impl CiConfig {
    /// Job root for a repository; repositories without a mapping use their own name.
    pub fn job_for_repo<'a>(&'a self, repo: &'a str) -> &'a str {
        self.repo_jobs.get(repo).map(String::as_str).unwrap_or(repo)
    }

    /// Page where a job's next build number can be set by hand.
    pub fn next_build_number_url(&self, job: &str) -> String {
        format!("{}/job/{}/nextbuildnumber/", self.url.trim_end_matches('/'), job)
    }
}

/// How a translation source is read.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// `key=value` messages file, copied verbatim.
    Messages,
    /// Android `strings.xml`; translatable entries only.
    AndroidStrings,
}

/// One file that feeds the aggregated translations file.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TranslationSource {
    pub repo: String,
    pub path: PathBuf,
    pub kind: SourceKind,
}

fn default_translations_repo() -> String {
    "commcare-translations".to_string()
}

fn default_translations_output() -> PathBuf {
    PathBuf::from("messages_en-2.txt")
}

fn default_translation_sources() -> Vec<TranslationSource> {
    vec![
        TranslationSource {
            repo: default_core_repo(),
            path: PathBuf::from("src/main/resources/messages_default.txt"),
            kind: SourceKind::Messages,
        },
        TranslationSource {
            repo: default_core_repo(),
            path: PathBuf::from("src/main/resources/messages_cc_default.txt"),
            kind: SourceKind::Messages,
        },
        TranslationSource {
            repo: default_android_repo(),
            path: PathBuf::from("app/assets/locales/messages_ccodk_default.txt"),
            kind: SourceKind::Messages,
        },
        TranslationSource {
            repo: default_android_repo(),
            path: default_android_strings(),
            kind: SourceKind::AndroidStrings,
        },
    ]
}

/// Aggregated translations file.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TranslationsConfig {
    #[serde(default = "default_translations_repo")]
    pub repo: String,

    /// Output file, relative to the translations repository.
    #[serde(default = "default_translations_output")]
    pub output: PathBuf,

    #[serde(default = "default_translation_sources")]
    pub sources: Vec<TranslationSource>,
}

impl Default for TranslationsConfig {
    fn default() -> Self {
        TranslationsConfig {
            repo: default_translations_repo(),
            output: default_translations_output(),
            sources: default_translation_sources(),
        }
    }
}

fn default_github_owner() -> String {
    "dimagi".to_string()
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

/// Hosting API used by cross-request checkout.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GithubConfig {
    #[serde(default = "default_github_owner")]
    pub owner: String,

    #[serde(default = "default_github_api")]
    pub api_url: String,

    /// Optional; may be supplied through `RELEASE_TRAIN_GITHUB_TOKEN`.
    #[serde(default)]
    pub token: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        GithubConfig {
            owner: default_github_owner(),
            api_url: default_github_api(),
            token: String::new(),
        }
    }
}

impl Config {
    /// Fill secrets from the environment; a set variable wins over the file.
    pub fn apply_env(&mut self) {
        if let Ok(password) = std::env::var(CI_PASSWORD_ENV) {
            if !password.is_empty() {
                self.ci.password = password;
            }
        }
        if let Ok(token) = std::env::var(GITHUB_TOKEN_ENV) {
            if !token.is_empty() {
                self.github.token = token;
            }
        }
    }

    /// Check the values every repository-bound command needs.
    pub fn validate(&self) -> Result<()> {
        if self.local.projects_dir.as_os_str().is_empty() {
            return Err(ReleaseError::config(
                "local.projects_dir is not set; point it at the directory holding the repositories",
            ));
        }
        if self.git.repos.is_empty() {
            return Err(ReleaseError::config("git.repos lists no repositories"));
        }
        for repo in [&self.git.core_repo, &self.git.android_repo] {
            if !self.git.repos.contains(repo) {
                return Err(ReleaseError::config(format!(
                    "'{}' is not listed in git.repos",
                    repo
                )));
            }
        }
        if self.git.branch_prefix.contains(['{', '}']) {
            return Err(ReleaseError::config(format!(
                "git.branch_prefix '{}' may not contain braces",
                self.git.branch_prefix
            )));
        }
        if self.ci.job_roots.is_empty() {
            return Err(ReleaseError::config("ci.job_roots lists no jobs"));
        }
        Ok(())
    }
}

/// Loads configuration from file or returns defaults.
///
/// Lookup order:
/// 1. Custom path provided as parameter
/// 2. `release-train.toml` in the current directory
/// 3. `.release-train.toml` in the user config directory
/// 4. Built-in defaults
///
/// Secrets from the environment are applied in every case.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config_str = if let Some(path) = config_path {
        Some(fs::read_to_string(path).map_err(|e| {
            ReleaseError::config(format!("Cannot read {}: {}", path.display(), e))
        })?)
    } else if Path::new(CONFIG_FILE_NAME).exists() {
        Some(fs::read_to_string(CONFIG_FILE_NAME)?)
    } else {
        match dirs::config_dir().map(|dir| dir.join(format!(".{}", CONFIG_FILE_NAME))) {
            Some(path) if path.exists() => Some(fs::read_to_string(path)?),
            _ => None,
        }
    };

    let mut config: Config = match config_str {
        Some(text) => toml::from_str(&text)?,
        None => Config::default(),
    };
    config.apply_env();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_describe_the_two_repo_layout() {
        let config = Config::default();
        assert_eq!(config.git.repos, vec!["commcare-core", "commcare-android"]);
        assert_eq!(config.git.branch_prefix, "commcare_");
        assert_eq!(config.ci.root_build_increment, 2000);
        assert_eq!(config.patch.replace, ReplaceMode::All);
        assert_eq!(config.translations.sources.len(), 4);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [ci]
            user = "release-bot"
            "#,
        )
        .unwrap();
        assert_eq!(config.ci.user, "release-bot");
        assert_eq!(config.ci.url, "https://jenkins.dimagi.com");
        assert_eq!(config.ci.core_ref_parameter, "CCCORE_BRANCH");
    }

    #[test]
    fn test_replace_mode_parses() {
        let config: Config = toml::from_str("[patch]\nreplace = \"located\"\n").unwrap();
        assert_eq!(config.patch.replace, ReplaceMode::Located);
    }

    #[test]
    fn test_validate_requires_projects_dir() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("projects_dir"));

        let mut config = Config::default();
        config.local.projects_dir = PathBuf::from("/work");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unlisted_core_repo() {
        let mut config = Config::default();
        config.local.projects_dir = PathBuf::from("/work");
        config.git.repos = vec!["commcare-android".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_job_for_repo_falls_back_to_repo_name() {
        let mut ci = CiConfig::default();
        ci.repo_jobs
            .insert("commcare-core".to_string(), "core-build".to_string());
        assert_eq!(ci.job_for_repo("commcare-core"), "core-build");
        assert_eq!(ci.job_for_repo("formplayer"), "formplayer");
    }

    #[test]
    fn test_next_build_number_url() {
        let ci = CiConfig::default();
        assert_eq!(
            ci.next_build_number_url("commcare-android-2.44"),
            "https://jenkins.dimagi.com/job/commcare-android-2.44/nextbuildnumber/"
        );
    }
}
