//! Resolution of raw SSH settings into a ready-to-dial configuration.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use secrecy::SecretString;
use ssh_core::{SshCoreError, keys::load_private_key_from_str, known_hosts::KnownHosts};
use tracing::debug;
use tunnel_types::SshSettings;

use crate::{
    auth::AuthMethod,
    error::ConfigError,
    hostkeys::HostKeyPolicy,
};

/// How long dialing plus the SSH handshake may take.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable, validated SSH connection settings.
///
/// Construction reads the key file and the known_hosts file once, so a
/// config that exists can always be dialed without touching the filesystem.
#[derive(Clone)]
pub struct SshConfig {
    user: String,
    host: String,
    port: u16,
    key_file: Option<PathBuf>,
    known_hosts_file: Option<PathBuf>,
    auth_methods: Vec<AuthMethod>,
    host_key_policy: HostKeyPolicy,
    connect_timeout: Duration,
}

impl SshConfig {
    /// Resolve positional settings. Empty strings mean "not set" and a port
    /// of `0` means 22.
    pub async fn new(
        user: &str,
        password: &str,
        key_file: &str,
        host: &str,
        known_hosts_file: &str,
        port: u16,
    ) -> Result<Self, ConfigError> {
        Self::resolve(SshSettings {
            user: user.to_string(),
            password: Some(password.to_string()),
            key_file: Some(PathBuf::from(key_file)),
            key_passphrase: None,
            host: host.to_string(),
            known_hosts_file: Some(PathBuf::from(known_hosts_file)),
            port,
        })
        .await
    }

    /// Validate settings, load credentials and build the host-key policy.
    pub async fn resolve(settings: SshSettings) -> Result<Self, ConfigError> {
        if settings.host.is_empty() {
            return Err(ConfigError::missing("host"));
        }
        if settings.user.is_empty() {
            return Err(ConfigError::missing("user"));
        }
        let port = settings.effective_port();

        let password = settings.password.filter(|p| !p.is_empty());
        let key_file = settings.key_file.filter(|p| !p.as_os_str().is_empty());
        let known_hosts_file = settings.known_hosts_file.filter(|p| !p.as_os_str().is_empty());
        let passphrase = settings.key_passphrase.filter(|p| !p.is_empty());

        let auth_methods = match (&key_file, password) {
            (Some(path), _) => vec![AuthMethod::PublicKey(load_key(path, passphrase.as_deref()).await?)],
            (None, Some(password)) => {
                let secret = SecretString::new(password.into_boxed_str());
                vec![AuthMethod::Password(secret.clone()), AuthMethod::KeyboardInteractive(secret)]
            }
            (None, None) => return Err(ConfigError::MissingCredentials),
        };

        let host_key_policy = match &known_hosts_file {
            Some(path) => {
                let db = KnownHosts::from_file(path).await.map_err(ConfigError::known_hosts)?;
                HostKeyPolicy::KnownHosts(Arc::new(db))
            }
            None => HostKeyPolicy::Insecure,
        };

        debug!(
            user = %settings.user,
            host = %settings.host,
            port,
            methods = auth_methods.len(),
            insecure = host_key_policy.is_insecure(),
            "resolved ssh config"
        );

        Ok(Self {
            user: settings.user,
            host: settings.host,
            port,
            key_file,
            known_hosts_file,
            auth_methods,
            host_key_policy,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` of the bastion.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    pub fn known_hosts_file(&self) -> Option<&Path> {
        self.known_hosts_file.as_deref()
    }

    /// Authentication methods in the order they are attempted.
    pub fn auth_methods(&self) -> &[AuthMethod] {
        &self.auth_methods
    }

    pub fn host_key_policy(&self) -> &HostKeyPolicy {
        &self.host_key_policy
    }

    /// True when host keys are accepted without verification.
    pub fn is_insecure(&self) -> bool {
        self.host_key_policy.is_insecure()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<&str> = self.auth_methods.iter().map(AuthMethod::label).collect();
        f.debug_struct("SshConfig")
            .field("user", &self.user)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("key_file", &self.key_file)
            .field("known_hosts_file", &self.known_hosts_file)
            .field("auth_methods", &methods)
            .field("insecure", &self.is_insecure())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

async fn load_key(path: &Path, passphrase: Option<&str>) -> Result<Arc<russh::keys::PrivateKey>, ConfigError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ConfigError::ReadKeyFile {
        path: path.to_path_buf(),
        source: Arc::new(source),
    })?;
    let data = String::from_utf8(bytes)
        .map_err(|e| ConfigError::parse_key_file(SshCoreError::invalid_key(format!("key file is not text: {e}"))))?;
    let key = load_private_key_from_str(&data, passphrase).map_err(ConfigError::parse_key_file)?;
    Ok(Arc::new(key))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
