//! Channel-opening seam used by local port forwarders.
//!
//! Forwarders only need to open `direct-tcpip` channels, so they are written
//! against [`ForwardSession`] rather than a concrete russh handle. This keeps
//! them testable with in-memory sessions.

mod traits;

pub use traits::{ForwardSession, ForwardStream, ForwardStreamIo};
