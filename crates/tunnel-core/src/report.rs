//! Statistics bookkeeping for forwarded connections.
//!
//! Every accept loop and pipe task carries a [`ConnectionLedger`] stamped
//! with the run epoch it was started under. Updates are dropped once the
//! tunnel has moved on to another run, so a connection that outlives a stop
//! never leaks into the counters of a later run or of a stopped tunnel.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use tunnel_types::Direction;

use crate::{error::TunnelError, tunnel::TunnelState};

pub(crate) type SharedState = Arc<RwLock<TunnelState>>;

#[derive(Clone)]
pub(crate) struct ConnectionLedger {
    state: SharedState,
    epoch: u64,
}

impl ConnectionLedger {
    pub(crate) fn new(state: SharedState, epoch: u64) -> Self {
        Self { state, epoch }
    }

    async fn update(&self, apply: impl FnOnce(&mut TunnelState)) {
        let mut state = self.state.write().await;
        if state.epoch != self.epoch {
            debug!(epoch = self.epoch, current = state.epoch, "dropping update from a finished run");
            return;
        }
        apply(&mut state);
    }

    pub(crate) async fn connection_accepted(&self) {
        self.update(|state| {
            state.stats.connections = state.stats.connections.saturating_add(1);
            state.stats.active_connections = state.stats.active_connections.saturating_add(1);
        })
        .await;
    }

    /// The connection never got a channel; it is no longer active.
    pub(crate) async fn connection_failed(&self, err: TunnelError) {
        self.update(|state| {
            state.stats.active_connections = state.stats.active_connections.saturating_sub(1);
            state.last_error = Some(err);
        })
        .await;
    }

    /// Account one finished direction of a pipe.
    pub(crate) async fn record_transfer(&self, direction: Direction, bytes: u64, err: Option<TunnelError>) {
        self.update(|state| {
            state.stats.record_transfer(direction, bytes, Utc::now());
            if let Some(err) = err {
                state.last_error = Some(err);
            }
        })
        .await;
    }

    pub(crate) async fn connection_closed(&self) {
        self.update(|state| {
            state.stats.active_connections = state.stats.active_connections.saturating_sub(1);
        })
        .await;
    }
}
