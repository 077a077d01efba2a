use crate::error::{ReleaseError, Result};
use std::fmt;
use std::str::FromStr;

/// Release version as `major.minor.hotfix`.
///
/// Components are signed because lookup helpers report "no hotfix yet" as a
/// hotfix of `-1`, and `last_version_short` may step below zero on a `0.0`
/// release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub hotfix: i32,
}

/// Sentinel hotfix number meaning no hotfix tag was found.
pub const NO_HOTFIX: i32 = -1;

impl Version {
    /// Create a new version
    pub fn new(major: i32, minor: i32, hotfix: i32) -> Self {
        Version {
            major,
            minor,
            hotfix,
        }
    }

    /// Parse `X.Y` or `X.Y.Z`. A missing hotfix component is 0.
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.trim().split('.').collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(ReleaseError::parse(format!(
                "Invalid version format: '{}' - expected X.Y or X.Y.Z",
                text
            )));
        }

        let component = |raw: &str, name: &str| {
            parse_component(raw)
                .ok_or_else(|| ReleaseError::parse(format!("Invalid {} version: '{}'", name, raw)))
        };

        let major = component(parts[0], "major")?;
        let minor = component(parts[1], "minor")?;
        let hotfix = match parts.get(2) {
            Some(raw) => component(raw, "hotfix")?,
            None => 0,
        };

        Ok(Version::new(major, minor, hotfix))
    }

    /// `major.minor`
    pub fn short(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    /// `major.minor.hotfix`
    pub fn full(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.hotfix)
    }

    pub fn next_minor(&self) -> Result<Self> {
        Ok(Version::new(self.major, step(self.minor, 1, "minor")?, 0))
    }

    pub fn next_major(&self) -> Result<Self> {
        Ok(Version::new(step(self.major, 1, "major")?, 0, 0))
    }

    pub fn next_hotfix(&self) -> Result<Self> {
        Ok(Version::new(self.major, self.minor, step(self.hotfix, 1, "hotfix")?))
    }

    pub fn last_hotfix(&self) -> Result<Self> {
        Ok(Version::new(self.major, self.minor, step(self.hotfix, -1, "hotfix")?))
    }

    /// Short version of the previous release.
    ///
    /// A `.0` release steps back to the previous major's `.0`; the previous
    /// major's last minor is not looked up.
    pub fn last_version_short(&self) -> String {
        if self.minor == 0 {
            Version::new(self.major.saturating_sub(1), 0, 0).short()
        } else {
            Version::new(self.major, self.minor.saturating_sub(1), 0).short()
        }
    }

    /// Same release line with a different hotfix number.
    pub fn with_hotfix(&self, hotfix: i32) -> Self {
        Version::new(self.major, self.minor, hotfix)
    }

    /// Apply a version bump decision
    pub fn bump(&self, bump: VersionBump) -> Result<Self> {
        match bump {
            VersionBump::Major => self.next_major(),
            VersionBump::Minor => self.next_minor(),
            VersionBump::Hotfix => self.next_hotfix(),
            VersionBump::PreviousHotfix => self.last_hotfix(),
            VersionBump::Keep => Ok(*self),
        }
    }
}

/// A non-negative decimal version component; `None` when it does not fit.
pub fn parse_component(raw: &str) -> Option<i32> {
    raw.parse::<i32>().ok().filter(|n| *n >= 0)
}

fn step(value: i32, delta: i32, component: &str) -> Result<i32> {
    value.checked_add(delta).ok_or_else(|| {
        ReleaseError::parse(format!("{} version {} cannot be moved by {}", component, value, delta))
    })
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.hotfix)
    }
}

impl FromStr for Version {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

/// Pure version transformation applied by the patch engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionBump {
    Major,
    Minor,
    Hotfix,
    PreviousHotfix,
    /// Re-render the captured version unchanged (used to change token shape).
    Keep,
}

impl VersionBump {
    /// Whether the transformation reads the hotfix component.
    pub fn needs_hotfix(&self) -> bool {
        matches!(self, VersionBump::Hotfix | VersionBump::PreviousHotfix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderings() {
        let v = Version::new(2, 4, 1);
        assert_eq!(v.short(), "2.4");
        assert_eq!(v.full(), "2.4.1");
        assert_eq!(v.to_string(), "2.4.1");
    }

    #[test]
    fn test_next_minor_resets_hotfix() {
        let v = Version::new(2, 4, 7).next_minor().unwrap();
        assert_eq!(v, Version::new(2, 5, 0));
    }

    #[test]
    fn test_next_major() {
        assert_eq!(Version::new(2, 4, 7).next_major().unwrap(), Version::new(3, 0, 0));
    }

    #[test]
    fn test_hotfix_round_trip() {
        for (major, minor, hotfix) in [(0, 0, 0), (2, 4, 1), (10, 0, 31)] {
            let v = Version::new(major, minor, hotfix);
            assert_eq!(v.next_hotfix().unwrap().last_hotfix().unwrap(), v);
        }
    }

    #[test]
    fn test_last_version_short_rolls_back_major_on_zero_minor() {
        assert_eq!(Version::new(3, 0, 0).last_version_short(), "2.0");
        assert_eq!(Version::new(3, 4, 0).last_version_short(), "3.3");
        assert_eq!(Version::new(3, 4, 9).last_version_short(), "3.3");
    }

    #[test]
    fn test_last_hotfix_reaches_sentinel() {
        assert_eq!(Version::new(2, 4, 0).last_hotfix().unwrap().hotfix, NO_HOTFIX);
    }

    #[test]
    fn test_parse_short_and_full() {
        assert_eq!(Version::parse("2.44").unwrap(), Version::new(2, 44, 0));
        assert_eq!(Version::parse("2.44.3").unwrap(), Version::new(2, 44, 3));
        assert_eq!("1.2.3".parse::<Version>().unwrap(), Version::new(1, 2, 3));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Version::parse("2").is_err());
        assert!(Version::parse("2.4.1.0").is_err());
        assert!(Version::parse("2.x").is_err());
        assert!(Version::parse("-1.2").is_err());
    }

    #[test]
    fn test_bump_dispatch() {
        let v = Version::new(2, 4, 1);
        assert_eq!(v.bump(VersionBump::Minor).unwrap(), Version::new(2, 5, 0));
        assert_eq!(v.bump(VersionBump::Hotfix).unwrap(), Version::new(2, 4, 2));
        assert_eq!(v.bump(VersionBump::Keep).unwrap(), v);
        assert!(VersionBump::Hotfix.needs_hotfix());
        assert!(!VersionBump::Minor.needs_hotfix());
    }

    #[test]
    fn test_parse_rejects_components_beyond_i32() {
        let err = Version::parse("2.4294967295").unwrap_err();
        assert!(matches!(err, ReleaseError::Parse(_)));
        assert!(Version::parse("2147483648.0").is_err());
        assert_eq!(
            Version::parse("2147483647.0").unwrap(),
            Version::new(i32::MAX, 0, 0)
        );
    }

    #[test]
    fn test_parse_component() {
        assert_eq!(parse_component("44"), Some(44));
        assert_eq!(parse_component("-1"), None);
        assert_eq!(parse_component("4294967295"), None);
    }

    #[test]
    fn test_bump_past_i32_max_is_parse_error() {
        let v = Version::parse("2147483647.0").unwrap();
        assert!(matches!(v.next_major(), Err(ReleaseError::Parse(_))));
        assert!(Version::new(2, i32::MAX, 0).next_minor().is_err());
        assert!(Version::new(2, 4, i32::MAX).bump(VersionBump::Hotfix).is_err());
    }
}
