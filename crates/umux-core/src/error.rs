use thiserror::Error;

/// Errors surfaced to callers of the session engine.
///
/// Wait timeouts and `not`-pattern rejections are not errors: they are
/// wait outcomes. Transient failures (engine swap, hook spawn, probe,
/// JSONL write) are logged and swallowed inside the session boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown session or hook id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed regex, invalid wait request, or a bad selector.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown key name or unsupported key/modifier combination.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Operation on a session in the wrong lifecycle state, or an
    /// unrecognized kill signal.
    #[error("{0}")]
    Lifecycle(String),

    /// PTY failure at the OS boundary.
    #[error(transparent)]
    Pty(#[from] umux_pty::PtyError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid_regex(pattern: &str, err: &regex::Error) -> Self {
        Error::InvalidInput(format!("invalid pattern {pattern:?}: {err}"))
    }
}
