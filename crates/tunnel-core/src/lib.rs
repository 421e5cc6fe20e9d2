//! SSH tunnel lifecycle manager.
//!
//! A [`Tunnel`] authenticates to a bastion host, listens on
//! `127.0.0.1:<local port>` and forwards every accepted TCP connection through
//! the SSH session to a remote `host:port`.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use tunnel_core::{SshConfig, Tunnel};
//!
//! let config = SshConfig::new("deploy", "", "/home/deploy/.ssh/id_ed25519", "bastion.example.com", "/home/deploy/.ssh/known_hosts", 22).await?;
//! let tunnel = Tunnel::new(config, "db.internal", 5432, 0);
//! tunnel.start().await?;
//! println!("connect to {}", tunnel.local_addr().await);
//! tunnel.stop().await?;
//! # Ok(())
//! # }
//! ```

mod auth;
pub mod config;
mod dial;
pub mod error;
mod forward;
mod hostkeys;
mod report;
pub mod tunnel;

pub use auth::AuthMethod;
pub use config::{DEFAULT_CONNECT_TIMEOUT, SshConfig};
pub use error::{ConfigError, TunnelError, TunnelResult};
pub use hostkeys::HostKeyPolicy;
pub use tunnel::{LOCAL_BIND_HOST, Tunnel};
pub use tunnel_types::{Direction, SshSettings, TunnelSettings, TunnelStats, TunnelStatus};
