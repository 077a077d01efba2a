//! Job membership of list views.
//!
//! A list view's configuration keeps its members in a `<jobNames>` element:
//!
//! ```xml
//! <jobNames>
//!   <comparator class="hudson.util.CaseInsensitiveComparator"/>
//!   <string>commcare-android-2.43</string>
//! </jobNames>
//! ```

use tracing::debug;

use crate::ci::CiJobStore;
use crate::error::{ReleaseError, Result};

const OPEN: &str = "<jobNames>";
const CLOSE: &str = "</jobNames>";
const EMPTY: &str = "<jobNames/>";

fn entry(job: &str) -> String {
    let escaped = job
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!("<string>{}</string>", escaped)
}

fn job_names_block(xml: &str) -> Result<(usize, usize)> {
    let start = xml
        .find(OPEN)
        .ok_or_else(|| ReleaseError::parse("View configuration has no <jobNames> list"))?;
    let end = xml[start..]
        .find(CLOSE)
        .map(|offset| start + offset)
        .ok_or_else(|| ReleaseError::parse("View configuration has an unterminated <jobNames>"))?;
    Ok((start + OPEN.len(), end))
}

/// True when `job` is listed in the view configuration.
pub fn view_contains(xml: &str, job: &str) -> bool {
    match job_names_block(xml) {
        Ok((start, end)) => xml[start..end].contains(&entry(job)),
        Err(_) => false,
    }
}

/// Add `job` to the view's job list. Already-listed jobs are left alone.
pub fn add_job(xml: &str, job: &str) -> Result<String> {
    if let Some(position) = xml.find(EMPTY) {
        let mut updated = String::with_capacity(xml.len() + job.len() + 32);
        updated.push_str(&xml[..position]);
        updated.push_str(OPEN);
        updated.push_str(&entry(job));
        updated.push_str(CLOSE);
        updated.push_str(&xml[position + EMPTY.len()..]);
        return Ok(updated);
    }

    if view_contains(xml, job) {
        return Ok(xml.to_string());
    }

    let (_, end) = job_names_block(xml)?;
    let line_start = xml[..end].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let indent = &xml[line_start..end];

    let mut updated = String::with_capacity(xml.len() + job.len() + 32);
    if indent.chars().all(|c| c == ' ' || c == '\t') {
        updated.push_str(&xml[..line_start]);
        updated.push_str(indent);
        updated.push_str("  ");
        updated.push_str(&entry(job));
        updated.push('\n');
        updated.push_str(&xml[line_start..]);
    } else {
        updated.push_str(&xml[..end]);
        updated.push_str(&entry(job));
        updated.push_str(&xml[end..]);
    }
    Ok(updated)
}

/// Remove `job` from the view's job list. Unlisted jobs are left alone.
pub fn remove_job(xml: &str, job: &str) -> Result<String> {
    if xml.contains(EMPTY) {
        return Ok(xml.to_string());
    }
    let (start, end) = job_names_block(xml)?;
    let needle = entry(job);
    let Some(offset) = xml[start..end].find(&needle) else {
        return Ok(xml.to_string());
    };
    let mut from = start + offset;
    let mut to = from + needle.len();

    // Drop the whole line when the entry sits on its own.
    let line_start = xml[..from].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let rest = &xml[to..];
    let line_end = rest.find('\n').map(|i| to + i + 1);
    if let Some(line_end) = line_end {
        let before_blank = xml[line_start..from].trim().is_empty();
        let after_blank = xml[to..line_end].trim().is_empty();
        if before_blank && after_blank {
            from = line_start;
            to = line_end;
        }
    }

    let mut updated = String::with_capacity(xml.len());
    updated.push_str(&xml[..from]);
    updated.push_str(&xml[to..]);
    Ok(updated)
}

/// Add `job` to `view` on the server.
pub fn add_job_to_view(store: &dyn CiJobStore, job: &str, view: &str) -> Result<()> {
    let xml = store.get_view_config(view)?;
    let updated = add_job(&xml, job)?;
    if updated != xml {
        store.set_view_config(view, &updated)?;
    }
    debug!(job, view, "job listed in view");
    Ok(())
}

/// Remove `job` from `view` on the server.
pub fn remove_job_from_view(store: &dyn CiJobStore, job: &str, view: &str) -> Result<()> {
    let xml = store.get_view_config(view)?;
    let updated = remove_job(&xml, job)?;
    if updated != xml {
        store.set_view_config(view, &updated)?;
    }
    debug!(job, view, "job removed from view");
    Ok(())
}
