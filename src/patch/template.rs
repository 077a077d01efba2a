use std::ops::Range;

use regex::Regex;

use crate::domain::{parse_component, Version};
use crate::error::{ReleaseError, Result};

/// Shape of a version token inside a text blob.
///
/// Patterns are literal text with `{major}`, `{minor}` and optional
/// `{hotfix}` placeholders, e.g. `app.version={major}.{minor}.{hotfix}`.
#[derive(Debug, Clone)]
pub struct VersionTemplate {
    name: String,
    pattern: String,
    regex: Regex,
    has_hotfix: bool,
}

/// A located occurrence of a template in a text blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionToken {
    pub span: Range<usize>,
    pub literal: String,
    pub version: Version,
}

impl VersionTemplate {
    /// Build a template; `name` is used in error messages.
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let pattern = pattern.into();

        let placeholder = Regex::new(r"\{(major|minor|hotfix)\}")
            .map_err(|e| ReleaseError::config(format!("Invalid placeholder regex: {}", e)))?;

        let mut source = String::new();
        let mut seen: Vec<&str> = Vec::new();
        let mut last = 0;
        for caps in placeholder.captures_iter(&pattern) {
            let (Some(whole), Some(component)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if seen.contains(&component.as_str()) {
                return Err(ReleaseError::config(format!(
                    "Template '{}' repeats {{{}}}",
                    pattern,
                    component.as_str()
                )));
            }
            seen.push(component.as_str());
            source.push_str(&regex::escape(&pattern[last..whole.start()]));
            source.push_str(&format!(r"(?P<{}>\d+)", component.as_str()));
            last = whole.end();
        }
        source.push_str(&regex::escape(&pattern[last..]));

        if !seen.contains(&"major") || !seen.contains(&"minor") {
            return Err(ReleaseError::config(format!(
                "Template '{}' needs both {{major}} and {{minor}}",
                pattern
            )));
        }

        let regex = Regex::new(&source)
            .map_err(|e| ReleaseError::config(format!("Invalid template '{}': {}", pattern, e)))?;

        Ok(VersionTemplate {
            name,
            has_hotfix: seen.contains(&"hotfix"),
            pattern,
            regex,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the token carries a hotfix component (3-tuple vs 2-tuple).
    pub fn has_hotfix(&self) -> bool {
        self.has_hotfix
    }

    /// Render the literal token for `version`.
    pub fn render(&self, version: &Version) -> String {
        self.pattern
            .replace("{major}", &version.major.to_string())
            .replace("{minor}", &version.minor.to_string())
            .replace("{hotfix}", &version.hotfix.to_string())
    }

    /// All occurrences of the token, in text order.
    pub fn find_all(&self, text: &str) -> Vec<VersionToken> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let component = |name: &str| -> Option<i32> {
                    parse_component(caps.name(name)?.as_str())
                };
                let hotfix = if self.has_hotfix {
                    component("hotfix")?
                } else {
                    0
                };
                Some(VersionToken {
                    span: whole.range(),
                    literal: whole.as_str().to_string(),
                    version: Version::new(component("major")?, component("minor")?, hotfix),
                })
            })
            .collect()
    }

    /// `app.version=X.Y.Z` in `build.properties`
    pub fn build_properties() -> Self {
        Self::known("build.properties", "app.version={major}.{minor}.{hotfix}")
    }

    /// Platform descriptor literal in the config engine source
    pub fn platform_literal() -> Self {
        Self::known("CommCareConfigEngine", "CommCarePlatform({major}, {minor})")
    }

    /// `android:versionName="X.Y"` before a release is promoted
    pub fn manifest_short() -> Self {
        Self::known(
            "AndroidManifest.xml",
            "android:versionName=\"{major}.{minor}\"",
        )
    }

    /// `android:versionName="X.Y.Z"` once the hotfix baseline exists
    pub fn manifest_full() -> Self {
        Self::known(
            "AndroidManifest.xml",
            "android:versionName=\"{major}.{minor}.{hotfix}\"",
        )
    }

    /// `VERSION=X.Y.Z` build parameter default in a CI job
    pub fn ci_version_parameter() -> Self {
        Self::known("job VERSION parameter", "VERSION={major}.{minor}.{hotfix}")
    }

    /// `refs/tags/<prefix>X.Y.Z` source reference in a CI job
    pub fn release_tag_ref(prefix: &str) -> Result<Self> {
        if prefix.contains(['{', '}']) {
            return Err(ReleaseError::config(format!(
                "Branch prefix '{}' may not contain braces",
                prefix
            )));
        }
        Self::new(
            "job git tag reference",
            format!("refs/tags/{}{{major}}.{{minor}}.{{hotfix}}", prefix),
        )
    }

    fn known(name: &str, pattern: &str) -> Self {
        match Self::new(name, pattern) {
            Ok(template) => template,
            Err(e) => unreachable!("built-in template '{}' is invalid: {}", pattern, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_three_components() {
        let t = VersionTemplate::build_properties();
        assert_eq!(t.render(&Version::new(2, 4, 1)), "app.version=2.4.1");
        assert!(t.has_hotfix());
    }

    #[test]
    fn test_render_two_components() {
        let t = VersionTemplate::platform_literal();
        assert_eq!(t.render(&Version::new(5, 12, 9)), "CommCarePlatform(5, 12)");
        assert!(!t.has_hotfix());
    }

    #[test]
    fn test_find_all_reports_spans_and_versions() {
        let t = VersionTemplate::ci_version_parameter();
        let text = "<default>VERSION=2.44.0</default>";
        let tokens = t.find_all(text);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].version, Version::new(2, 44, 0));
        assert_eq!(&text[tokens[0].span.clone()], "VERSION=2.44.0");
    }

    #[test]
    fn test_literal_dots_are_not_wildcards() {
        let t = VersionTemplate::build_properties();
        assert!(t.find_all("app_version=2x4x1").is_empty());
    }

    #[test]
    fn test_manifest_short_does_not_match_full() {
        let t = VersionTemplate::manifest_short();
        assert!(t.find_all("android:versionName=\"2.4.0\"").is_empty());
    }

    #[test]
    fn test_template_requires_major_and_minor() {
        assert!(VersionTemplate::new("bad", "VERSION={major}").is_err());
        assert!(VersionTemplate::new("bad", "{major}.{major}.{minor}").is_err());
    }

    #[test]
    fn test_release_tag_ref_uses_prefix() {
        let t = VersionTemplate::release_tag_ref("commcare_").unwrap();
        let tokens = t.find_all("<name>refs/tags/commcare_2.43.2</name>");
        assert_eq!(tokens[0].version, Version::new(2, 43, 2));
    }

    #[test]
    fn test_oversized_component_is_not_a_token() {
        let t = VersionTemplate::ci_version_parameter();
        assert!(t.find_all("VERSION=2.44.4294967295").is_empty());
    }
}
