//! Serde-friendly tunnel settings for applications that keep them in their
//! own configuration files.
//!
//! Field names follow the camelCase keys used by existing tunnel
//! configurations (`keyFile`, `knownHostsFile`, `remoteHost`, ...). Missing
//! fields take their defaults, so a partial document deserializes and the
//! resolver decides what is actually required.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Port used for the bastion when none is configured.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Raw SSH connection settings as written by a user.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SshSettings {
    /// Login name on the bastion.
    pub user: String,
    /// Password; also answers keyboard-interactive prompts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Private key file. Takes precedence over the password when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    /// Passphrase for an encrypted private key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_passphrase: Option<String>,
    /// Bastion host name or address.
    pub host: String,
    /// OpenSSH known_hosts file. Host keys are not verified when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_hosts_file: Option<PathBuf>,
    /// Bastion port; `0` means [`DEFAULT_SSH_PORT`].
    pub port: u16,
}

impl SshSettings {
    /// The configured port, with `0` mapped to the SSH default.
    pub fn effective_port(&self) -> u16 {
        if self.port == 0 { DEFAULT_SSH_PORT } else { self.port }
    }
}

impl fmt::Debug for SshSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshSettings")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_file", &self.key_file)
            .field("key_passphrase", &self.key_passphrase.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("known_hosts_file", &self.known_hosts_file)
            .field("port", &self.port)
            .finish()
    }
}

/// Settings for one tunnel: the bastion plus the endpoint reached through it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TunnelSettings {
    pub ssh: SshSettings,
    /// Host to reach from the bastion's network.
    pub remote_host: String,
    /// Port on `remote_host`. Must be non-zero.
    pub remote_port: u16,
    /// Local port to listen on; `0` picks an ephemeral port.
    pub local_port: u16,
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
