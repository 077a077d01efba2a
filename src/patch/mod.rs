//! Text-patch engine
//!
//! Locates a version token in a text blob, derives the replacement version
//! with a pure [`VersionBump`], and returns the patched text. Nothing here
//! touches the filesystem; callers persist the result after review.

pub mod resource_array;
pub mod template;

pub use resource_array::bump_version_array;
pub use template::{VersionTemplate, VersionToken};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Version, VersionBump};
use crate::error::{ReleaseError, Result};

/// How the old token literal is substituted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplaceMode {
    /// Replace every occurrence of the old literal anywhere in the text.
    #[default]
    All,
    /// Replace only the first located token.
    Located,
}

/// Result of a successful version patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub text: String,
    pub from: Version,
    pub to: Version,
    pub old_token: String,
    pub new_token: String,
    pub replacements: usize,
}

/// Bump the version token described by `template` in place.
pub fn bump_token(
    text: &str,
    template: &VersionTemplate,
    bump: VersionBump,
    mode: ReplaceMode,
) -> Result<PatchOutcome> {
    patch_version(text, template, template, bump, mode)
}

/// Find the `from` token, apply `bump`, and write it back in the `to` shape.
///
/// `from` and `to` differ when the token changes arity, e.g. adding the
/// hotfix component to a two-part manifest version.
pub fn patch_version(
    text: &str,
    from: &VersionTemplate,
    to: &VersionTemplate,
    bump: VersionBump,
    mode: ReplaceMode,
) -> Result<PatchOutcome> {
    if bump.needs_hotfix() && !(from.has_hotfix() && to.has_hotfix()) {
        return Err(ReleaseError::parse(format!(
            "{:?} needs a hotfix component but '{}' has only major and minor",
            bump,
            if from.has_hotfix() {
                to.pattern()
            } else {
                from.pattern()
            }
        )));
    }

    let tokens = from.find_all(text);
    let Some(first) = tokens.first() else {
        return Err(ReleaseError::parse(format!(
            "Couldn't parse version in {}: expected a token like '{}'",
            from.name(),
            from.pattern()
        )));
    };

    if let Some(other) = tokens.iter().find(|t| t.version != first.version) {
        return Err(ReleaseError::parse(format!(
            "Ambiguous version in {}: found both '{}' and '{}'",
            from.name(),
            first.literal,
            other.literal
        )));
    }

    let current = first.version;
    let next = current.bump(bump)?;
    let old_token = first.literal.clone();
    let new_token = to.render(&next);

    let (patched, replacements) = match mode {
        ReplaceMode::All => (
            text.replace(&old_token, &new_token),
            text.matches(old_token.as_str()).count(),
        ),
        ReplaceMode::Located => {
            let mut patched = String::with_capacity(text.len());
            patched.push_str(&text[..first.span.start]);
            patched.push_str(&new_token);
            patched.push_str(&text[first.span.end..]);
            (patched, 1)
        }
    };

    debug!(
        template = from.name(),
        %current,
        %next,
        replacements,
        "patched version token"
    );

    Ok(PatchOutcome {
        text: patched,
        from: current,
        to: next,
        old_token,
        new_token,
        replacements,
    })
}

/// Swap a fixed marker literal, failing when it is absent.
pub fn replace_marker(text: &str, existing: &str, replacement: &str) -> Result<String> {
    if !text.contains(existing) {
        return Err(ReleaseError::parse(format!(
            "Unable to find '{}' in text",
            existing
        )));
    }
    Ok(text.replace(existing, replacement))
}

/// Apply literal replacements in order; absent literals are left alone.
pub fn replace_literals(text: &str, replacements: &[(String, String)]) -> String {
    replacements
        .iter()
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_properties_next_minor() {
        let text = "app.name=CommCare\napp.version=2.4.1\n";
        let outcome = bump_token(
            text,
            &VersionTemplate::build_properties(),
            VersionBump::Minor,
            ReplaceMode::All,
        )
        .unwrap();
        assert!(outcome.text.contains("app.version=2.5.0"));
        assert!(!outcome.text.contains("app.version=2.4.1"));
        assert_eq!(outcome.from, Version::new(2, 4, 1));
        assert_eq!(outcome.to, Version::new(2, 5, 0));
    }

    #[test]
    fn test_platform_literal_bump() {
        let text = "return new CommCarePlatform(5, 12);";
        let outcome = bump_token(
            text,
            &VersionTemplate::platform_literal(),
            VersionBump::Minor,
            ReplaceMode::All,
        )
        .unwrap();
        assert_eq!(outcome.text, "return new CommCarePlatform(5, 13);");
    }

    #[test]
    fn test_manifest_minor_bump() {
        let text = "<manifest android:versionCode=\"106\" android:versionName=\"2.4\">";
        let outcome = bump_token(
            text,
            &VersionTemplate::manifest_short(),
            VersionBump::Minor,
            ReplaceMode::All,
        )
        .unwrap();
        assert!(outcome.text.contains("android:versionName=\"2.5\""));
    }

    #[test]
    fn test_manifest_hotfix_bump() {
        let text = "android:versionName=\"2.4.3\"";
        let outcome = bump_token(
            text,
            &VersionTemplate::manifest_full(),
            VersionBump::Hotfix,
            ReplaceMode::All,
        )
        .unwrap();
        assert_eq!(outcome.text, "android:versionName=\"2.4.4\"");
    }

    #[test]
    fn test_add_hotfix_component() {
        let text = "android:versionName=\"2.4\"";
        let outcome = patch_version(
            text,
            &VersionTemplate::manifest_short(),
            &VersionTemplate::manifest_full(),
            VersionBump::Keep,
            ReplaceMode::All,
        )
        .unwrap();
        assert_eq!(outcome.text, "android:versionName=\"2.4.0\"");
    }

    #[test]
    fn test_missing_token_is_parse_error() {
        let err = bump_token(
            "app.name=CommCare",
            &VersionTemplate::build_properties(),
            VersionBump::Minor,
            ReplaceMode::All,
        )
        .unwrap_err();
        assert!(matches!(err, ReleaseError::Parse(_)));
        assert!(err.to_string().contains("build.properties"));
    }

    #[test]
    fn test_hotfix_bump_on_two_part_token_is_parse_error() {
        let err = bump_token(
            "CommCarePlatform(5, 12)",
            &VersionTemplate::platform_literal(),
            VersionBump::Hotfix,
            ReplaceMode::All,
        )
        .unwrap_err();
        assert!(matches!(err, ReleaseError::Parse(_)));
    }

    #[test]
    fn test_conflicting_tokens_are_ambiguous() {
        let text = "VERSION=2.4.0\nVERSION=2.5.0\n";
        let err = bump_token(
            text,
            &VersionTemplate::ci_version_parameter(),
            VersionBump::Minor,
            ReplaceMode::All,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Ambiguous"));
    }

    #[test]
    fn test_all_mode_rewrites_every_duplicate_literal() {
        // The old literal is also the tail of another key.
        let text = "VERSION=2.4.0\nOLD_VERSION=2.4.0\n";
        let outcome = bump_token(
            text,
            &VersionTemplate::ci_version_parameter(),
            VersionBump::Minor,
            ReplaceMode::All,
        )
        .unwrap();
        assert_eq!(outcome.text, "VERSION=2.5.0\nOLD_VERSION=2.5.0\n");
        assert_eq!(outcome.replacements, 2);
    }

    #[test]
    fn test_located_mode_only_touches_first_span() {
        let text = "VERSION=2.4.0\nOLD_VERSION=2.4.0\n";
        let outcome = bump_token(
            text,
            &VersionTemplate::ci_version_parameter(),
            VersionBump::Minor,
            ReplaceMode::Located,
        )
        .unwrap();
        assert_eq!(outcome.text, "VERSION=2.5.0\nOLD_VERSION=2.4.0\n");
        assert_eq!(outcome.replacements, 1);
    }

    #[test]
    fn test_replace_marker_requires_presence() {
        let text = "commcare.version=v${app.version}dev";
        let patched = replace_marker(
            text,
            "commcare.version=v${app.version}dev",
            "commcare.version=v${app.version}alpha",
        )
        .unwrap();
        assert_eq!(patched, "commcare.version=v${app.version}alpha");
        assert!(replace_marker(text, "alpha", "release").is_err());
    }

    #[test]
    fn test_replace_literals_in_order() {
        let text = "refs/heads/commcare_2.4 CCCORE_BRANCH=commcare_2.4";
        let patched = replace_literals(
            text,
            &[
                (
                    "refs/heads/commcare_2.4".to_string(),
                    "refs/tags/commcare_2.4.0".to_string(),
                ),
                (
                    "CCCORE_BRANCH=commcare_2.4".to_string(),
                    "CCCORE_BRANCH=commcare_2.4.0".to_string(),
                ),
            ],
        );
        assert_eq!(
            patched,
            "refs/tags/commcare_2.4.0 CCCORE_BRANCH=commcare_2.4.0"
        );
    }
}
