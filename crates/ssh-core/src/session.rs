use russh::{
    Disconnect,
    client::{self, Handle},
};
use std::sync::Arc;

pub type SessionHandle<H> = Handle<H>;
pub type SharedSessionHandle<H> = Arc<Handle<H>>;

/// Politely close the session unless the transport is already gone.
pub async fn disconnect<H>(session: &SharedSessionHandle<H>) -> crate::SshResult<()>
where
    H: client::Handler + Send,
{
    if session.is_closed() {
        return Ok(());
    }
    session.disconnect(Disconnect::ByApplication, "", "English").await?;
    Ok(())
}
