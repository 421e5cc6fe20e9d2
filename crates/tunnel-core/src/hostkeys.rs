use std::sync::Arc;

use russh::keys::{HashAlg, PublicKey};
use ssh_core::{
    SshCoreError,
    known_hosts::{HostKeyStatus, KnownHosts},
};
use tracing::debug;

/// How the bastion's host key is checked.
#[derive(Clone, Debug)]
pub enum HostKeyPolicy {
    /// Accept any key. Used when no known_hosts file is configured.
    Insecure,
    /// Accept only keys recorded for the host in the database.
    KnownHosts(Arc<KnownHosts>),
}

impl HostKeyPolicy {
    pub fn is_insecure(&self) -> bool {
        matches!(self, HostKeyPolicy::Insecure)
    }

    /// Decide whether `key` presented by `host:port` is acceptable.
    pub fn check(&self, host: &str, port: u16, key: &PublicKey) -> Result<(), SshCoreError> {
        let fingerprint = key.fingerprint(HashAlg::Sha256);
        let db = match self {
            HostKeyPolicy::Insecure => {
                debug!(host, port, %fingerprint, "accepting host key without verification");
                return Ok(());
            }
            HostKeyPolicy::KnownHosts(db) => db,
        };

        match db.verify(host, port, key) {
            HostKeyStatus::Trusted => {
                debug!(host, port, %fingerprint, "host key verified against known_hosts");
                Ok(())
            }
            HostKeyStatus::Unknown => Err(SshCoreError::HostKeyRejected(format!(
                "no known_hosts entry for {host}:{port} (received SHA256 {fingerprint})"
            ))),
            HostKeyStatus::Mismatch => Err(SshCoreError::HostKeyRejected(format!(
                "host key mismatch for {host}:{port} (received SHA256 {fingerprint})"
            ))),
            HostKeyStatus::Revoked => Err(SshCoreError::HostKeyRejected(format!(
                "host key for {host}:{port} is revoked ({fingerprint})"
            ))),
        }
    }
}

/// russh client handler carrying the host-key policy for one bastion.
#[derive(Clone)]
pub struct ClientHandler {
    host: Arc<str>,
    port: u16,
    policy: HostKeyPolicy,
}

impl ClientHandler {
    pub fn new(host: &str, port: u16, policy: HostKeyPolicy) -> Self {
        Self {
            host: Arc::from(host),
            port,
            policy,
        }
    }
}

impl russh::client::Handler for ClientHandler {
    type Error = SshCoreError;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl std::future::Future<Output = std::result::Result<bool, Self::Error>> + Send {
        let verdict = self.policy.check(&self.host, self.port, server_public_key);
        async move { verdict.map(|()| true) }
    }
}
