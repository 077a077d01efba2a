use crate::domain::version::{parse_component, Version, NO_HOTFIX};

/// Naming conventions shared by branches, tags and CI jobs.
///
/// Branches are `<prefix><short>`, tags `<prefix><full>`, release jobs
/// `<root>-<short>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseNaming {
    pub prefix: String,
}

impl ReleaseNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        ReleaseNaming {
            prefix: prefix.into(),
        }
    }

    /// Release branch, e.g. `commcare_2.44`
    pub fn branch_name(&self, version: &Version) -> String {
        format!("{}{}", self.prefix, version.short())
    }

    /// Release tag, e.g. `commcare_2.44.1`
    pub fn tag_name(&self, version: &Version) -> String {
        format!("{}{}", self.prefix, version.full())
    }

    /// Release job for a job root, e.g. `commcare-android-2.44`
    pub fn job_name(root: &str, short_version: &str) -> String {
        format!("{}-{}", root, short_version)
    }

    /// Tag-name prefix shared by every hotfix of a release line.
    pub fn hotfix_tag_prefix(&self, version: &Version) -> String {
        format!("{}{}.", self.prefix, version.short())
    }

    /// Hotfix number encoded in `tag`, if it belongs to `version`'s line.
    pub fn hotfix_number(&self, version: &Version, tag: &str) -> Option<i32> {
        let rest = tag.strip_prefix(&self.hotfix_tag_prefix(version))?;
        parse_component(rest)
    }

    /// Highest hotfix number among `tags`, or `NO_HOTFIX` when none match.
    pub fn last_hotfix_number<'a, I>(&self, version: &Version, tags: I) -> i32
    where
        I: IntoIterator<Item = &'a String>,
    {
        tags.into_iter()
            .filter_map(|tag| self.hotfix_number(version, tag))
            .max()
            .unwrap_or(NO_HOTFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_and_tag_names() {
        let naming = ReleaseNaming::new("commcare_");
        let v = Version::new(2, 44, 1);
        assert_eq!(naming.branch_name(&v), "commcare_2.44");
        assert_eq!(naming.tag_name(&v), "commcare_2.44.1");
    }

    #[test]
    fn test_job_name() {
        assert_eq!(
            ReleaseNaming::job_name("commcare-android", "2.44"),
            "commcare-android-2.44"
        );
    }

    #[test]
    fn test_hotfix_number_ignores_other_lines() {
        let naming = ReleaseNaming::new("commcare_");
        let v = Version::new(2, 4, 0);
        assert_eq!(naming.hotfix_number(&v, "commcare_2.4.3"), Some(3));
        assert_eq!(naming.hotfix_number(&v, "commcare_2.40.1"), None);
        assert_eq!(naming.hotfix_number(&v, "commcare_2.4.x"), None);
        assert_eq!(naming.hotfix_number(&v, "other_2.4.1"), None);
    }

    #[test]
    fn test_last_hotfix_number_picks_numeric_max() {
        let naming = ReleaseNaming::new("commcare_");
        let v = Version::new(2, 4, 0);
        let tags = vec![
            "commcare_2.4.0".to_string(),
            "commcare_2.4.10".to_string(),
            "commcare_2.4.9".to_string(),
        ];
        assert_eq!(naming.last_hotfix_number(&v, &tags), 10);
    }

    #[test]
    fn test_last_hotfix_number_sentinel_when_missing() {
        let naming = ReleaseNaming::new("commcare_");
        let tags: Vec<String> = Vec::new();
        assert_eq!(
            naming.last_hotfix_number(&Version::new(2, 4, 0), &tags),
            NO_HOTFIX
        );
    }

    #[test]
    fn test_oversized_hotfix_tag_is_ignored() {
        let naming = ReleaseNaming::new("commcare_");
        let v = Version::new(2, 4, 0);
        assert_eq!(naming.hotfix_number(&v, "commcare_2.4.4294967295"), None);
        let tags = vec!["commcare_2.4.4294967295".to_string()];
        assert_eq!(naming.last_hotfix_number(&v, &tags), NO_HOTFIX);
    }
}
