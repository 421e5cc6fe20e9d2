use std::{sync::Arc, time::Duration};

use russh::client;
use ssh_core::{SshCoreError, SshResult, crypto::tunnel_preferred, session::SharedSessionHandle};
use tracing::{info, warn};

use crate::{auth::authenticate, config::SshConfig, hostkeys::ClientHandler};

/// Authenticated session to a bastion.
pub type BastionSession = SharedSessionHandle<ClientHandler>;

fn client_config() -> client::Config {
    client::Config {
        preferred: tunnel_preferred(),
        nodelay: true,
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    }
}

/// Dial the bastion, verify its host key and authenticate.
pub async fn connect(config: &SshConfig) -> SshResult<BastionSession> {
    if config.is_insecure() {
        warn!(bastion = %config.addr(), "no known_hosts configured; host key will not be verified");
    }

    let handler = ClientHandler::new(config.host(), config.port(), config.host_key_policy().clone());
    let addr = config.addr();
    info!(bastion = %addr, user = config.user(), "connecting to ssh server");

    let handshake = async {
        let mut session = client::connect(Arc::new(client_config()), (config.host(), config.port()), handler).await?;
        authenticate(&mut session, config.user(), config.auth_methods()).await?;
        Ok::<_, SshCoreError>(session)
    };

    let session = tokio::time::timeout(config.connect_timeout(), handshake)
        .await
        .map_err(|_| SshCoreError::Timeout { addr: addr.clone() })??;

    info!(bastion = %addr, "ssh session established");
    Ok(Arc::new(session))
}
