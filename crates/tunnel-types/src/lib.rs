//! Shared type definitions for the SSH tunnel manager.
//!
//! This crate holds the lightweight status, statistics and settings types
//! that are passed between the tunnel runtime and the applications embedding
//! it, without pulling in any protocol implementation.

pub mod settings;
pub mod tunnel;

pub use settings::{SshSettings, TunnelSettings};
pub use tunnel::{Direction, TunnelStats, TunnelStatus};
