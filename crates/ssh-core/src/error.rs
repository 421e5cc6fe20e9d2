use thiserror::Error;

/// Errors that can occur in SSH core operations
#[derive(Error, Debug)]
pub enum SshCoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH protocol error
    #[error("SSH protocol error: {0}")]
    Ssh(#[from] russh::Error),

    /// Private key could not be decoded
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// Malformed known_hosts entry
    #[error("known_hosts line {line}: {message}")]
    KnownHosts { line: usize, message: String },

    /// Server host key was not accepted
    #[error("host key verification failed: {0}")]
    HostKeyRejected(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Connection attempt did not complete in time
    #[error("timed out connecting to {addr}")]
    Timeout { addr: String },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for SSH core operations
pub type SshResult<T> = Result<T, SshCoreError>;

impl SshCoreError {
    /// Create a known_hosts parse error for a 1-based line number
    pub fn known_hosts(line: usize, message: impl Into<String>) -> Self {
        Self::KnownHosts {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid key error
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }
}
