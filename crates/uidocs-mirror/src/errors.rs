use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git executable not found on PATH")]
    GitUnavailable,

    #[error("`{command}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("Documentation directory not found: {0}")]
    MissingDirectory(String),

    #[error("Invalid mirror configuration: {0}")]
    InvalidConfig(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl MirrorError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            MirrorError::GitUnavailable
                | MirrorError::InvalidConfig(_)
                | MirrorError::MissingDirectory(_)
        )
    }
}
