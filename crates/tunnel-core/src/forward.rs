//! Local accept loop and per-connection byte pipes.

use std::{fmt, future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use ssh_core::forwarding::{ForwardSession, ForwardStream};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tunnel_types::Direction;

use crate::{error::TunnelError, report::ConnectionLedger};

/// Pause after a failed accept so a persistent error cannot spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Endpoint reached from the bastion side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ForwardTarget {
    pub(crate) host: String,
    pub(crate) port: u16,
}

impl fmt::Display for ForwardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Source of local client connections for the accept loop.
pub(crate) trait LocalAcceptor: Send + 'static {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl LocalAcceptor for TcpListener {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// Accept local clients until `cancel` fires, forwarding each one through
/// its own `direct-tcpip` channel. The listener is closed on return.
pub(crate) async fn run_accept_loop<A, S>(
    listener: A,
    session: S,
    target: Arc<ForwardTarget>,
    ledger: ConnectionLedger,
    cancel: CancellationToken,
) where
    A: LocalAcceptor,
    S: ForwardSession,
{
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            res = listener.accept() => res,
        };

        match accepted {
            Ok((stream, origin)) => {
                ledger.connection_accepted().await;
                debug!(%origin, target = %target, "accepted local connection");
                tokio::spawn(forward_connection(
                    stream,
                    origin,
                    session.clone(),
                    Arc::clone(&target),
                    ledger.clone(),
                ));
            }
            Err(err) => {
                if cancel.is_cancelled() {
                    break;
                }
                warn!(?err, "local accept failed; retrying");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                }
            }
        }
    }
    debug!(target = %target, "accept loop finished");
}

async fn forward_connection<S>(stream: TcpStream, origin: SocketAddr, session: S, target: Arc<ForwardTarget>, ledger: ConnectionLedger)
where
    S: ForwardSession,
{
    stream.set_nodelay(true).ok();
    let remote = match session
        .open_direct_tcpip(target.host.clone(), target.port, origin.ip().to_string(), origin.port())
        .await
    {
        Ok(remote) => remote,
        Err(err) => {
            warn!(%origin, target = %target, error = %err, "failed to open forwarding channel");
            drop(stream);
            ledger.connection_failed(TunnelError::channel(target.to_string(), err)).await;
            return;
        }
    };

    pipe(stream, remote, &ledger).await;
    ledger.connection_closed().await;
    debug!(%origin, "forwarded connection closed");
}

/// Move bytes both ways until either side finishes. Both streams are
/// dropped, and therefore closed, before this returns.
pub(crate) async fn pipe<L>(local: L, remote: ForwardStream, ledger: &ConnectionLedger)
where
    L: AsyncRead + AsyncWrite + Send + Unpin,
{
    let (local_rd, local_wr) = tokio::io::split(local);
    let (remote_rd, remote_wr) = tokio::io::split(remote);
    let teardown = CancellationToken::new();

    tokio::join!(
        DirectionCopy::new(Direction::Outbound).run(local_rd, remote_wr, &teardown, ledger),
        DirectionCopy::new(Direction::Inbound).run(remote_rd, local_wr, &teardown, ledger),
    );
}

/// Copy state for one direction of a pipe.
struct DirectionCopy {
    direction: Direction,
    transferred: u64,
}

impl DirectionCopy {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            transferred: 0,
        }
    }

    async fn run<R, W>(mut self, mut reader: R, mut writer: W, teardown: &CancellationToken, ledger: &ConnectionLedger)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let outcome = self.copy(&mut reader, &mut writer, teardown).await;
        let _ = writer.shutdown().await;
        teardown.cancel();

        let err = match outcome {
            Ok(()) => None,
            Err(err) => {
                debug!(direction = %self.direction, error = %err, "forwarded stream failed");
                Some(TunnelError::copy(self.direction, err))
            }
        };
        ledger.record_transfer(self.direction, self.transferred, err).await;
    }

    /// Returns `Ok` on EOF or when the other direction tears the pipe down.
    async fn copy<R, W>(&mut self, reader: &mut R, writer: &mut W, teardown: &CancellationToken) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let read = tokio::select! {
                _ = teardown.cancelled() => return Ok(()),
                res = reader.read(&mut buf) => res?,
            };
            if read == 0 {
                return Ok(());
            }
            tokio::select! {
                _ = teardown.cancelled() => return Ok(()),
                res = writer.write_all(&buf[..read]) => res?,
            }
            self.transferred += read as u64;
        }
    }
}

#[cfg(test)]
#[path = "forward_tests.rs"]
mod tests;
