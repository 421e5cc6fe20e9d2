//! Runtime status and traffic statistics of a tunnel.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a tunnel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelStatus {
    /// No session and no listener. Initial state.
    #[default]
    Stopped,
    /// A start is in progress (validating, dialing, binding).
    Starting,
    /// Session established and the local listener is accepting.
    Running,
    /// The last start failed; see the tunnel's last error.
    Error,
}

impl TunnelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TunnelStatus::Stopped => "stopped",
            TunnelStatus::Starting => "starting",
            TunnelStatus::Running => "running",
            TunnelStatus::Error => "error",
        }
    }
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a forwarded byte stream, seen from the local client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local client to remote endpoint (counted as bytes out).
    Outbound,
    /// Remote endpoint to local client (counted as bytes in).
    Inbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outbound => f.write_str("local->remote"),
            Direction::Inbound => f.write_str("remote->local"),
        }
    }
}

/// Traffic counters for one start/stop cycle of a tunnel.
///
/// The zero value (`Default`) is what a stopped tunnel reports.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelStats {
    /// Bytes received from the remote endpoint and written to local clients.
    pub bytes_in: u64,
    /// Bytes read from local clients and sent to the remote endpoint.
    pub bytes_out: u64,
    /// Connections accepted on the local listener since the tunnel started.
    pub connections: u64,
    /// Connections currently being forwarded.
    pub active_connections: u64,
    /// When a forwarded stream last finished moving data.
    pub last_activity: Option<DateTime<Utc>>,
    /// When the tunnel last transitioned to running.
    pub started_at: Option<DateTime<Utc>>,
}

impl TunnelStats {
    /// Fresh counters for a run starting at `now`.
    pub fn started(now: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(now),
            ..Self::default()
        }
    }

    /// Account bytes moved in `direction` and stamp the activity time.
    pub fn record_transfer(&mut self, direction: Direction, bytes: u64, now: DateTime<Utc>) {
        match direction {
            Direction::Outbound => self.bytes_out = self.bytes_out.saturating_add(bytes),
            Direction::Inbound => self.bytes_in = self.bytes_in.saturating_add(bytes),
        }
        self.last_activity = Some(now);
    }

    /// Whether no traffic or connection has been recorded.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
#[path = "tunnel_tests.rs"]
mod tests;
