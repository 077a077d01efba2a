/// A git reference a CI job can build from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Branch(String),
    Tag(String),
}

impl SourceRef {
    /// Short name without the `refs/...` namespace
    pub fn name(&self) -> &str {
        match self {
            SourceRef::Branch(name) | SourceRef::Tag(name) => name,
        }
    }

    /// Fully qualified ref as it appears in job configuration
    pub fn full_name(&self) -> String {
        match self {
            SourceRef::Branch(name) => format!("refs/heads/{}", name),
            SourceRef::Tag(name) => format!("refs/tags/{}", name),
        }
    }

    /// Build parameter literal selecting this ref, e.g. `CCCORE_BRANCH=commcare_2.44`
    pub fn parameter(&self, parameter: &str) -> String {
        format!("{}={}", parameter, self.name())
    }
}

/// Literal replacement moving a job's checkout from one ref to another.
pub fn ref_switch(from: &SourceRef, to: &SourceRef) -> (String, String) {
    (from.full_name(), to.full_name())
}

/// Literal replacement moving a ref-selecting build parameter.
pub fn parameter_switch(parameter: &str, from: &SourceRef, to: &SourceRef) -> (String, String) {
    (from.parameter(parameter), to.parameter(parameter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_names() {
        assert_eq!(
            SourceRef::Branch("commcare_2.4".into()).full_name(),
            "refs/heads/commcare_2.4"
        );
        assert_eq!(
            SourceRef::Tag("commcare_2.4.0".into()).full_name(),
            "refs/tags/commcare_2.4.0"
        );
    }

    #[test]
    fn test_ref_switch_branch_to_tag() {
        let branch = SourceRef::Branch("commcare_2.4".into());
        let tag = SourceRef::Tag("commcare_2.4.1".into());
        assert_eq!(
            ref_switch(&branch, &tag),
            (
                "refs/heads/commcare_2.4".to_string(),
                "refs/tags/commcare_2.4.1".to_string()
            )
        );
    }

    #[test]
    fn test_parameter_switch_uses_short_names() {
        let tag = SourceRef::Tag("commcare_2.4.1".into());
        let branch = SourceRef::Branch("commcare_2.4".into());
        assert_eq!(
            parameter_switch("CCCORE_BRANCH", &tag, &branch),
            (
                "CCCORE_BRANCH=commcare_2.4.1".to_string(),
                "CCCORE_BRANCH=commcare_2.4".to_string()
            )
        );
    }
}
