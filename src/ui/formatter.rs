//! Formatting for operator-facing output.
//!
//! Everything the operator reads goes through here; diagnostics go through
//! `tracing` instead.

use console::style;

use crate::domain::Version;
use crate::gate::PendingChange;

/// Format and print an error message in red.
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red().bold(), message);
}

/// Format and print a success message with green checkmark.
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Format and print a status message with yellow arrow.
pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

pub fn display_warning(message: &str) {
    eprintln!("{} {}", style("⚠ WARNING:").yellow(), message);
}

/// Styled lines of a pending change: a header, then the diff.
pub fn render_pending_change(change: &PendingChange) -> Vec<String> {
    let mut lines = vec![format!("{}", style(&change.description).bold())];
    if change.is_noop() {
        lines.push(format!("{}", style("  (no changes)").dim()));
        return lines;
    }
    for line in change.diff_lines() {
        let styled = if line.starts_with("@@") {
            style(line).cyan()
        } else if line.starts_with('-') {
            style(line).red()
        } else if line.starts_with('+') {
            style(line).green()
        } else {
            style(line).dim()
        };
        lines.push(format!("{}", styled));
    }
    lines
}

/// Show a change awaiting confirmation.
pub fn display_pending_change(change: &PendingChange) {
    println!();
    for line in render_pending_change(change) {
        println!("{}", line);
    }
}

/// Tell the operator how to finish a step the tool could not complete.
pub fn display_manual_instruction(message: &str) {
    println!("{} {}", style("→").yellow(), style(message).yellow());
}

/// Fallback when the build-number upload failed.
pub fn display_manual_build_number(job: &str, number: u64, url: &str) {
    display_warning(&format!("Failed setting nextBuildNumber for {}", job));
    println!(
        "  Please manually set {}'s nextBuildNumber to {} at\n  {}",
        job,
        style(number).bold(),
        style(url).cyan()
    );
}

/// Staged release and next hotfix, for `show-version`.
pub fn display_versions(staged: &Version, next_hotfix: &Version) {
    println!("{} {}", style("Staged release:").bold(), staged);
    println!("{} {}", style("Next hotfix:   ").bold(), next_hotfix);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_error() {
        // Visual verification test - output is printed to stderr
        display_error("test error");
    }

    #[test]
    fn test_display_status() {
        // Visual verification test - output is printed to stdout
        display_status("test status");
    }

    #[test]
    fn test_render_pending_change_plain() {
        console::set_colors_enabled(false);
        let change = PendingChange::new(
            "commcare-android: AndroidManifest.xml",
            "android:versionName=\"2.4\"\n",
            "android:versionName=\"2.5\"\n",
        );
        let lines = render_pending_change(&change);
        assert_eq!(lines[0], "commcare-android: AndroidManifest.xml");
        assert!(lines.contains(&"-android:versionName=\"2.4\"".to_string()));
        assert!(lines.contains(&"+android:versionName=\"2.5\"".to_string()));
    }

    #[test]
    fn test_render_noop_change() {
        console::set_colors_enabled(false);
        let change = PendingChange::new("job", "same", "same");
        assert_eq!(render_pending_change(&change)[1], "  (no changes)");
    }
}
