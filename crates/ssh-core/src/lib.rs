pub mod crypto;
pub mod error;
pub mod forwarding;
pub mod keys;
pub mod known_hosts;
pub mod session;

pub use error::{SshCoreError, SshResult};
