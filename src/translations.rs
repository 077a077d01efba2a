//! Aggregated translations file
//!
//! Collects the default-locale strings of every source repository into the
//! single `key=value` file the translations repository serves, one section
//! per source:
//!
//! ```text
//! # *** messages_default.txt ***
//!
//! home.title=Home
//!
//! # *** strings.xml ***
//!
//! odk_sync_now=Sync ${0} forms
//! ```

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::config::SourceKind;
use crate::domain::Version;
use crate::error::{ReleaseError, Result};
use crate::gate::PendingChange;
use crate::release::{ReleaseContext, SOURCE_ABORT_MESSAGE};
use crate::ui;

/// Name prefix for keys taken from Android `strings.xml`.
pub const ANDROID_KEY_PREFIX: &str = "odk_";

/// One section of the aggregated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationBlock {
    pub source_name: String,
    pub body: String,
}

fn string_element() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<string(\s[^>]*?)?(?:/>|>(.*?)</string>)"#)
            .unwrap_or_else(|e| unreachable!("string element pattern: {}", e))
    })
}

fn attribute() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([\w:.-]+)\s*=\s*"([^"]*)""#)
            .unwrap_or_else(|e| unreachable!("attribute pattern: {}", e))
    })
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"%(?:(\d+)\$)?s").unwrap_or_else(|e| unreachable!("placeholder pattern: {}", e))
    })
}

/// A messages file contributes its content minus surrounding whitespace.
pub fn messages_block(text: &str) -> String {
    text.trim().to_string()
}

/// `name=value` lines for every translatable `<string>` in `xml`.
///
/// An entry counts as translatable when an attribute whose local name is
/// `translatable` equals `"true"`, whatever its namespace prefix.
pub fn strings_block(xml: &str) -> String {
    let mut block = String::new();
    for element in string_element().captures_iter(xml) {
        let attrs = element.get(1).map_or("", |m| m.as_str());
        let mut name = None;
        let mut translatable = false;
        for attr in attribute().captures_iter(attrs) {
            let local = attr[1].rsplit(':').next().unwrap_or(&attr[1]);
            match local {
                "name" => name = Some(attr[2].to_string()),
                "translatable" => translatable = &attr[2] == "true",
                _ => {}
            }
        }

        let Some(name) = name else { continue };
        if !translatable {
            continue;
        }
        let value = element.get(2).map_or("", |m| m.as_str());
        let value = rewrite_placeholders(&unescape_value(value));
        if value.is_empty() {
            debug!(name = %name, "skipping empty string resource");
            continue;
        }
        block.push_str(&format!("{}{}={}\n", ANDROID_KEY_PREFIX, name, value));
    }
    block
}

/// Turn Android format arguments into `${i}` placeholders.
///
/// Positional `%n$s` becomes `${n-1}`; bare `%s` is numbered in order of
/// appearance from `${0}`.
pub fn rewrite_placeholders(value: &str) -> String {
    let mut next = 0usize;
    placeholder()
        .replace_all(value, |caps: &regex::Captures| {
            let index = match caps.get(1).and_then(|m| m.as_str().parse::<usize>().ok()) {
                Some(position) => position.saturating_sub(1),
                None => {
                    let index = next;
                    next += 1;
                    index
                }
            };
            format!("${{{}}}", index)
        })
        .into_owned()
}

/// Undo resource escaping: backslash quotes and XML entities.
pub fn unescape_value(value: &str) -> String {
    value
        .replace("\\'", "'")
        .replace("\\\"", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Concatenate the sections, each under a `# *** <source> ***` header.
pub fn render_translations(blocks: &[TranslationBlock]) -> String {
    blocks
        .iter()
        .map(|block| format!("# *** {} ***\n\n{}", block.source_name, block.body))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Branch in the translations repository for a release's additions.
pub fn additions_branch(version: &Version) -> String {
    format!("{}_release_additions", version.short())
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        ReleaseError::precondition(format!("Cannot read {}: {}", path.display(), e))
    })
}

impl ReleaseContext<'_> {
    /// Build the aggregated file from the default branches.
    pub fn collect_translations(&self) -> Result<String> {
        let config = self.config;
        let default_branch = &config.git.default_branch;
        let mut blocks = Vec::new();
        for source in &config.translations.sources {
            let repo = self.repo_path(&source.repo);
            self.vcs.checkout(&repo, default_branch)?;
            let text = read_source(&repo.join(&source.path))?;
            let body = match source.kind {
                SourceKind::Messages => messages_block(&text),
                SourceKind::AndroidStrings => strings_block(&text),
            };
            blocks.push(TranslationBlock {
                source_name: source_name(&source.path),
                body,
            });
        }
        Ok(render_translations(&blocks))
    }

    /// Publish the aggregated translations for `version` on a new branch of
    /// the translations repository.
    pub fn update_translations(&mut self, version: &Version) -> Result<String> {
        let config = self.config;
        let translations = &config.translations;
        let repo = self.repo_path(&translations.repo);
        if self.vcs.has_uncommitted_changes(&repo)? {
            return Err(ReleaseError::precondition(format!(
                "{} has uncommitted changes, please stash and try again",
                translations.repo
            )));
        }

        let content = self.collect_translations()?;

        let default_branch = &config.git.default_branch;
        self.vcs.checkout(&repo, default_branch)?;
        self.vcs.pull(&repo, default_branch)?;
        let branch = additions_branch(version);
        self.vcs.create_branch(&repo, &branch)?;
        info!(branch = %branch, "created translations branch");

        let output = repo.join(&translations.output);
        let original = read_source(&output)?;
        let change = PendingChange::new(
            format!("{}: {}", translations.repo, translations.output.display()),
            &original,
            &content,
        );

        let vcs = self.vcs;
        let message = format!(
            "Auto-commit: Update translations file for CommCare release {}",
            version.short()
        );
        self.gate.publish(
            &format!("Proceed by pushing diff to {}?", branch),
            &[change],
            SOURCE_ABORT_MESSAGE,
            || {
                let mut backup = output.clone().into_os_string();
                backup.push(".bak");
                fs::rename(&output, &backup)?;
                fs::write(&output, &content)?;
                vcs.commit_all(&repo, &message)?;
                vcs.push(&repo, &branch)
            },
        )?;
        ui::display_success(&format!(
            "Pushed updated translations to {} of {}",
            branch, translations.repo
        ));
        Ok(branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRINGS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<resources xmlns:cc="http://commcarehq.org/xforms">
    <string name="app_name">CommCare</string>
    <string-array name="languages"><item>en</item></string-array>
    <string name="sync_now" cc:translatable="true">Sync %s forms</string>
    <string name="progress" cc:translatable="true">%1$s of %2$s</string>
    <string name="quote" cc:translatable="true">Don\'t say \"hi\" &amp; leave</string>
    <string name="skip" cc:translatable="false">Hidden</string>
    <string name="blank" cc:translatable="true"></string>
</resources>
"#;

    #[test]
    fn test_strings_block_keeps_translatable_entries() {
        let block = strings_block(STRINGS);
        assert_eq!(
            block,
            "odk_sync_now=Sync ${0} forms\n\
             odk_progress=${0} of ${1}\n\
             odk_quote=Don't say \"hi\" & leave\n"
        );
        assert!(!block.contains("app_name"));
        assert!(!block.contains("Hidden"));
    }

    #[test]
    fn test_unprefixed_translatable_attribute() {
        let xml = r#"<string translatable="true" name="ok">OK</string>"#;
        assert_eq!(strings_block(xml), "odk_ok=OK\n");
    }

    #[test]
    fn test_rewrite_placeholders() {
        assert_eq!(rewrite_placeholders("%s"), "${0}");
        assert_eq!(rewrite_placeholders("%2$s"), "${1}");
        assert_eq!(rewrite_placeholders("%s and %s"), "${0} and ${1}");
        assert_eq!(rewrite_placeholders("100%"), "100%");
    }

    #[test]
    fn test_render_translations_headers_and_separators() {
        let blocks = vec![
            TranslationBlock {
                source_name: "messages_default.txt".into(),
                body: "a=1".into(),
            },
            TranslationBlock {
                source_name: "strings.xml".into(),
                body: "odk_b=2\n".into(),
            },
        ];
        assert_eq!(
            render_translations(&blocks),
            "# *** messages_default.txt ***\n\na=1\n\n# *** strings.xml ***\n\nodk_b=2\n"
        );
    }

    #[test]
    fn test_messages_block_trims() {
        assert_eq!(messages_block("\n\na=1\nb=2\n\n"), "a=1\nb=2");
    }

    #[test]
    fn test_additions_branch() {
        assert_eq!(additions_branch(&Version::new(2, 44, 0)), "2.44_release_additions");
    }
}
