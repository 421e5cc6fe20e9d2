//! Tunnel lifecycle: start, stop, restart and state inspection.

use std::sync::Arc;

use chrono::Utc;
use ssh_core::session;
use tokio::{net::TcpListener, sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tunnel_types::{TunnelSettings, TunnelStats, TunnelStatus};

use crate::{
    config::SshConfig,
    dial::{self, BastionSession},
    error::{ConfigError, TunnelError, TunnelResult},
    forward::{ForwardTarget, run_accept_loop},
    report::ConnectionLedger,
};

/// Local clients are only ever accepted on the loopback interface.
pub const LOCAL_BIND_HOST: &str = "127.0.0.1";

/// Handles owned by a running tunnel. Only the state machine closes them.
struct RunningTunnel {
    session: BastionSession,
    cancel: CancellationToken,
    accept_task: JoinHandle<()>,
}

pub(crate) struct TunnelState {
    pub(crate) config: Arc<SshConfig>,
    pub(crate) target: Arc<ForwardTarget>,
    pub(crate) local_port: u16,
    pub(crate) status: TunnelStatus,
    pub(crate) last_error: Option<TunnelError>,
    pub(crate) bound_port: u16,
    pub(crate) stats: TunnelStats,
    /// Bumped when a start begins and on every stop.
    pub(crate) epoch: u64,
    running: Option<RunningTunnel>,
}

impl TunnelState {
    pub(crate) fn new(config: SshConfig, target: ForwardTarget, local_port: u16) -> Self {
        Self {
            config: Arc::new(config),
            target: Arc::new(target),
            local_port,
            status: TunnelStatus::Stopped,
            last_error: None,
            bound_port: 0,
            stats: TunnelStats::default(),
            epoch: 0,
            running: None,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.target.host.is_empty() {
            return Err(ConfigError::missing("remoteHost"));
        }
        if self.target.port == 0 {
            return Err(ConfigError::RemotePort);
        }
        Ok(())
    }

    fn local_port(&self) -> u16 {
        if self.bound_port != 0 { self.bound_port } else { self.local_port }
    }
}

/// An SSH tunnel forwarding `127.0.0.1:<local port>` to a remote endpoint
/// through a bastion.
///
/// All methods take `&self` and may be called concurrently. Dropping the
/// tunnel stops its accept loop; call [`Tunnel::stop`] to also disconnect
/// the SSH session deterministically.
pub struct Tunnel {
    shared: Arc<RwLock<TunnelState>>,
    lifetime: CancellationToken,
}

impl Tunnel {
    /// Create a stopped tunnel. Nothing is validated or dialed until
    /// [`Tunnel::start`].
    pub fn new(config: SshConfig, remote_host: impl Into<String>, remote_port: u16, local_port: u16) -> Self {
        let target = ForwardTarget {
            host: remote_host.into(),
            port: remote_port,
        };
        Self {
            shared: Arc::new(RwLock::new(TunnelState::new(config, target, local_port))),
            lifetime: CancellationToken::new(),
        }
    }

    /// Resolve `settings.ssh` and create a stopped tunnel.
    pub async fn from_settings(settings: TunnelSettings) -> Result<Self, ConfigError> {
        let config = SshConfig::resolve(settings.ssh).await?;
        Ok(Self::new(config, settings.remote_host, settings.remote_port, settings.local_port))
    }

    /// Check the tunnel parameters without touching any state.
    pub async fn validate(&self) -> Result<(), ConfigError> {
        self.shared.read().await.validate()
    }

    /// Dial the bastion, bind the local listener and start forwarding.
    pub async fn start(&self) -> TunnelResult<()> {
        let (attempt, config, target, local_port) = {
            let mut state = self.shared.write().await;
            match state.status {
                TunnelStatus::Running => return Err(TunnelError::AlreadyRunning),
                TunnelStatus::Starting => return Err(TunnelError::AlreadyStarting),
                TunnelStatus::Stopped | TunnelStatus::Error => {}
            }
            state.epoch += 1;
            state.status = TunnelStatus::Starting;
            state.last_error = None;
            if let Err(err) = state.validate() {
                let err = TunnelError::from(err);
                state.status = TunnelStatus::Error;
                state.last_error = Some(err.clone());
                return Err(err);
            }
            (state.epoch, Arc::clone(&state.config), Arc::clone(&state.target), state.local_port)
        };

        info!(bastion = %config.addr(), remote = %target, local_port, "starting tunnel");

        let session = match dial::connect(&config).await {
            Ok(session) => session,
            Err(err) => return Err(self.fail_start(attempt, TunnelError::connect(err)).await),
        };

        let (listener, bound_port) = match bind_local(local_port).await {
            Ok(bound) => bound,
            Err(err) => {
                if let Err(close_err) = session::disconnect(&session).await {
                    debug!(error = %close_err, "disconnect after failed bind");
                }
                return Err(self.fail_start(attempt, TunnelError::listen(err)).await);
            }
        };

        let mut state = self.shared.write().await;
        if state.epoch != attempt || state.status != TunnelStatus::Starting {
            drop(state);
            drop(listener);
            if let Err(err) = session::disconnect(&session).await {
                debug!(error = %err, "disconnect of interrupted start");
            }
            info!("tunnel stopped while starting");
            return Err(TunnelError::Interrupted);
        }

        let cancel = self.lifetime.child_token();
        let ledger = ConnectionLedger::new(Arc::clone(&self.shared), attempt);
        let accept_task = tokio::spawn(run_accept_loop(
            listener,
            Arc::clone(&session),
            Arc::clone(&target),
            ledger,
            cancel.clone(),
        ));

        state.running = Some(RunningTunnel {
            session,
            cancel,
            accept_task,
        });
        state.bound_port = bound_port;
        state.stats = TunnelStats::started(Utc::now());
        state.status = TunnelStatus::Running;
        info!(
            local = %format!("{LOCAL_BIND_HOST}:{bound_port}"),
            remote = %target,
            bastion = %config.addr(),
            "tunnel running"
        );
        Ok(())
    }

    async fn fail_start(&self, attempt: u64, err: TunnelError) -> TunnelError {
        warn!(error = %err, "tunnel failed to start");
        let mut state = self.shared.write().await;
        if state.epoch == attempt {
            state.status = TunnelStatus::Error;
            state.last_error = Some(err.clone());
        }
        err
    }

    /// Close the listener and the SSH session. Stopping a stopped tunnel is
    /// a no-op. The tunnel is `Stopped` afterwards even if cleanup failed.
    pub async fn stop(&self) -> TunnelResult<()> {
        let running = {
            let mut state = self.shared.write().await;
            if state.status == TunnelStatus::Stopped {
                return Ok(());
            }
            state.epoch += 1;
            state.status = TunnelStatus::Stopped;
            state.bound_port = 0;
            state.stats = TunnelStats::default();
            state.running.take()
        };

        let Some(running) = running else {
            return Ok(());
        };
        info!("stopping tunnel");

        let mut failures = Vec::new();
        running.cancel.cancel();
        if let Err(err) = running.accept_task.await {
            failures.push(format!("failed to close listener: {err}"));
        }
        if let Err(err) = session::disconnect(&running.session).await {
            failures.push(format!("failed to close ssh client: {err}"));
        }

        if failures.is_empty() {
            info!("tunnel stopped");
            Ok(())
        } else {
            let err = TunnelError::Cleanup(failures);
            warn!(error = %err, "tunnel stopped with errors");
            Err(err)
        }
    }

    /// Stop, then start again.
    pub async fn restart(&self) -> TunnelResult<()> {
        self.stop().await.map_err(|err| TunnelError::Restart(Box::new(err)))?;
        self.start().await
    }

    /// Replace the SSH settings used by the next start or restart.
    pub async fn update_config(&self, config: SshConfig) {
        let mut state = self.shared.write().await;
        debug!(bastion = %config.addr(), "ssh config updated");
        state.config = Arc::new(config);
    }

    /// Alias for [`Tunnel::stop`].
    pub async fn close(&self) -> TunnelResult<()> {
        self.stop().await
    }

    pub async fn status(&self) -> TunnelStatus {
        self.shared.read().await.status
    }

    /// Last failure recorded by a start or by forwarding, if any.
    pub async fn last_error(&self) -> Option<TunnelError> {
        self.shared.read().await.last_error.clone()
    }

    /// Bound port while running, otherwise the requested port.
    pub async fn local_port(&self) -> u16 {
        self.shared.read().await.local_port()
    }

    pub async fn local_addr(&self) -> String {
        format!("{LOCAL_BIND_HOST}:{}", self.local_port().await)
    }

    pub async fn remote_addr(&self) -> String {
        self.shared.read().await.target.to_string()
    }

    pub async fn stats(&self) -> TunnelStats {
        self.shared.read().await.stats.clone()
    }

    pub async fn config(&self) -> Arc<SshConfig> {
        Arc::clone(&self.shared.read().await.config)
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

async fn bind_local(port: u16) -> std::io::Result<(TcpListener, u16)> {
    let listener = TcpListener::bind((LOCAL_BIND_HOST, port)).await?;
    let bound = listener.local_addr()?.port();
    Ok((listener, bound))
}
