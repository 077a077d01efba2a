use thiserror::Error;

/// Unified error type for release-train operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Aborted by operator: {0}")]
    OperatorAbort(String),

    #[error("Remote operation failed: {0}")]
    Remote(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results in release-train
pub type Result<T> = std::result::Result<T, ReleaseError>;

impl ReleaseError {
    /// Create a parse error for a version token that did not match
    pub fn parse(msg: impl Into<String>) -> Self {
        ReleaseError::Parse(msg.into())
    }

    /// Create a precondition error raised before any mutation
    pub fn precondition(msg: impl Into<String>) -> Self {
        ReleaseError::Precondition(msg.into())
    }

    /// Create an abort carrying the manual follow-up instruction
    pub fn operator_abort(msg: impl Into<String>) -> Self {
        ReleaseError::OperatorAbort(msg.into())
    }

    /// Create a remote error (CI server, build server, hosting API)
    pub fn remote(msg: impl Into<String>) -> Self {
        ReleaseError::Remote(msg.into())
    }

    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        ReleaseError::Config(msg.into())
    }

    /// Map a failed HTTP call to a remote error naming what was attempted
    pub fn http(context: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, response) => ReleaseError::Remote(format!(
                "{}: HTTP {} from {}",
                context,
                code,
                response.get_url()
            )),
            ureq::Error::Transport(transport) => {
                ReleaseError::Remote(format!("{}: {}", context, transport))
            }
        }
    }

    /// True when the operator declined at the confirmation gate.
    pub fn is_operator_abort(&self) -> bool {
        matches!(self, ReleaseError::OperatorAbort(_))
    }
}

impl From<toml::de::Error> for ReleaseError {
    fn from(err: toml::de::Error) -> Self {
        ReleaseError::Config(err.to_string())
    }
}
