//! Domain logic - pure release rules independent of git and CI access

pub mod naming;
pub mod refs;
pub mod version;

pub use naming::ReleaseNaming;
pub use refs::{parameter_switch, ref_switch, SourceRef};
pub use version::{parse_component, Version, VersionBump, NO_HOTFIX};
