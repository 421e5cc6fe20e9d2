use async_trait::async_trait;
use russh::client;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::session::SharedSessionHandle;

// Internal Result type alias for convenience
type Result<T> = crate::SshResult<T>;

/// Trait for streams that can be used for forwarding.
pub trait ForwardStreamIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ForwardStreamIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Type alias for boxed forward streams.
pub type ForwardStream = Box<dyn ForwardStreamIo>;

/// Trait for sessions that can open forwarding connections.
#[async_trait]
pub trait ForwardSession: Clone + Send + Sync + 'static {
    /// Ask the server to connect to `target_host:target_port` on behalf of
    /// the client at `origin_host:origin_port`.
    async fn open_direct_tcpip(
        &self,
        target_host: String,
        target_port: u16,
        origin_host: String,
        origin_port: u16,
    ) -> Result<ForwardStream>;
}

#[async_trait]
impl<H> ForwardSession for SharedSessionHandle<H>
where
    H: client::Handler + Send + Sync + 'static,
{
    async fn open_direct_tcpip(
        &self,
        target_host: String,
        target_port: u16,
        origin_host: String,
        origin_port: u16,
    ) -> Result<ForwardStream> {
        let channel = self
            .as_ref()
            .channel_open_direct_tcpip(target_host, target_port.into(), origin_host, origin_port.into())
            .await?;
        Ok(Box::new(channel.into_stream()))
    }
}
