use regex::Regex;

use crate::domain::{parse_component, Version};
use crate::error::{ReleaseError, Result};

/// Bump the minor version stored in a multi-line integer array.
///
/// The array is found by the line containing `marker`; the next two lines
/// hold the major and minor items:
///
/// ```text
/// <integer-array name="commcare_version">
///     <item>2</item>
///     <item>22</item>
/// </integer-array>
/// ```
///
/// Returns the patched text and the version before the bump. Indentation and
/// line endings are preserved.
pub fn bump_version_array(text: &str, marker: &str) -> Result<(String, Version)> {
    let item = Regex::new(r"<item>(\d+)<")
        .map_err(|e| ReleaseError::parse(format!("Invalid item pattern: {}", e)))?;

    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let Some(marker_index) = lines.iter().position(|line| line.contains(marker)) else {
        return Err(ReleaseError::parse(format!(
            "Couldn't find '{}' version array",
            marker
        )));
    };

    let read_item = |index: usize, component: &str| -> Result<i32> {
        lines
            .get(index)
            .and_then(|line| item.captures(line))
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_component(m.as_str()))
            .ok_or_else(|| {
                ReleaseError::parse(format!(
                    "Couldn't parse {} version item after '{}'",
                    component, marker
                ))
            })
    };

    let major = read_item(marker_index + 1, "major")?;
    let minor_index = marker_index + 2;
    let minor = read_item(minor_index, "minor")?;
    let previous = Version::new(major, minor, 0);
    let next = previous.next_minor()?;

    let minor_line = lines[minor_index];
    let indent_len = minor_line.find('<').unwrap_or(0);
    let ending = if minor_line.ends_with("\r\n") {
        "\r\n"
    } else if minor_line.ends_with('\n') {
        "\n"
    } else {
        ""
    };
    let replacement = format!(
        "{}<item>{}</item>{}",
        &minor_line[..indent_len],
        next.minor,
        ending
    );

    let mut patched = String::with_capacity(text.len());
    for (index, line) in lines.iter().enumerate() {
        if index == minor_index {
            patched.push_str(&replacement);
        } else {
            patched.push_str(line);
        }
    }

    Ok((patched, previous))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRINGS: &str = "<resources>\n    <string name=\"app_name\">CommCare</string>\n    <integer-array name=\"commcare_version\">\n        <item>2</item>\n        <item>22</item>\n    </integer-array>\n</resources>\n";

    #[test]
    fn test_bumps_minor_item() {
        let (patched, before) = bump_version_array(STRINGS, "commcare_version").unwrap();
        assert_eq!(before, Version::new(2, 22, 0));
        assert!(patched.contains("        <item>2</item>\n        <item>23</item>\n"));
        assert_eq!(patched.lines().count(), STRINGS.lines().count());
    }

    #[test]
    fn test_preserves_crlf() {
        let text = STRINGS.replace('\n', "\r\n");
        let (patched, _) = bump_version_array(&text, "commcare_version").unwrap();
        assert!(patched.contains("<item>23</item>\r\n"));
    }

    #[test]
    fn test_missing_marker_is_parse_error() {
        let err = bump_version_array("<resources/>", "commcare_version").unwrap_err();
        assert!(matches!(err, ReleaseError::Parse(_)));
    }

    #[test]
    fn test_malformed_items_are_parse_error() {
        let text = "<integer-array name=\"commcare_version\">\n<item>2</item>\n</integer-array>\n";
        assert!(bump_version_array(text, "commcare_version").is_err());
    }

    #[test]
    fn test_oversized_item_is_parse_error() {
        let text = STRINGS.replace("<item>22</item>", "<item>4294967295</item>");
        let err = bump_version_array(&text, "commcare_version").unwrap_err();
        assert!(matches!(err, ReleaseError::Parse(_)));
    }

    #[test]
    fn test_minor_at_limit_is_parse_error() {
        let text = STRINGS.replace("<item>22</item>", &format!("<item>{}</item>", i32::MAX));
        assert!(bump_version_array(&text, "commcare_version").is_err());
    }
}
