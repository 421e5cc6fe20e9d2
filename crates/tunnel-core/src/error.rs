use std::{path::PathBuf, sync::Arc};

use ssh_core::SshCoreError;
use thiserror::Error;
use tunnel_types::Direction;

/// Invalid or unusable tunnel configuration.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// A required field is empty
    #[error("{field} is required")]
    Missing { field: &'static str },

    /// Neither a password nor a key file was given
    #[error("password or keyFile is required")]
    MissingCredentials,

    /// The private key file could not be read
    #[error("failed to read keyFile: {source}")]
    ReadKeyFile {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The private key file could not be decoded
    #[error("failed to parse keyFile: {0}")]
    ParseKeyFile(#[source] Arc<SshCoreError>),

    /// The known_hosts file could not be read or parsed
    #[error("failed to load known_hosts: {0}")]
    KnownHosts(#[source] Arc<SshCoreError>),

    /// Remote port 0
    #[error("remotePort must be greater than 0")]
    RemotePort,
}

impl ConfigError {
    pub(crate) fn missing(field: &'static str) -> Self {
        Self::Missing { field }
    }

    pub(crate) fn parse_key_file(err: SshCoreError) -> Self {
        Self::ParseKeyFile(Arc::new(err))
    }

    pub(crate) fn known_hosts(err: SshCoreError) -> Self {
        Self::KnownHosts(Arc::new(err))
    }
}

/// Errors reported by tunnel lifecycle operations and forwarding.
///
/// Sources are shared so that the error returned to a caller can also be
/// kept as the tunnel's last error.
#[derive(Error, Debug, Clone)]
pub enum TunnelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("tunnel is already running")]
    AlreadyRunning,

    #[error("tunnel is already starting")]
    AlreadyStarting,

    /// Dialing or authenticating to the bastion failed
    #[error("failed to connect to ssh server: {0}")]
    Connect(#[source] Arc<SshCoreError>),

    /// Binding the local listener failed
    #[error("failed to create local listener: {0}")]
    Listen(#[source] Arc<std::io::Error>),

    /// `stop` ran while a start was still dialing
    #[error("tunnel was stopped while starting")]
    Interrupted,

    /// One or more resources failed to close
    #[error("errors stopping tunnel: {}", .0.join("; "))]
    Cleanup(Vec<String>),

    /// The stop half of a restart failed
    #[error("failed to stop: {0}")]
    Restart(#[source] Box<TunnelError>),

    /// A direct-tcpip channel for one client could not be opened
    #[error("failed to open channel to {target}: {source}")]
    Channel {
        target: String,
        #[source]
        source: Arc<SshCoreError>,
    },

    /// A forwarded stream ended with an I/O error
    #[error("{direction} copy failed: {source}")]
    Copy {
        direction: Direction,
        #[source]
        source: Arc<std::io::Error>,
    },
}

/// Result type alias for tunnel operations
pub type TunnelResult<T> = Result<T, TunnelError>;

impl TunnelError {
    pub(crate) fn connect(err: SshCoreError) -> Self {
        Self::Connect(Arc::new(err))
    }

    pub(crate) fn listen(err: std::io::Error) -> Self {
        Self::Listen(Arc::new(err))
    }

    pub(crate) fn channel(target: impl Into<String>, err: SshCoreError) -> Self {
        Self::Channel {
            target: target.into(),
            source: Arc::new(err),
        }
    }

    pub(crate) fn copy(direction: Direction, err: std::io::Error) -> Self {
        Self::Copy {
            direction,
            source: Arc::new(err),
        }
    }
}
