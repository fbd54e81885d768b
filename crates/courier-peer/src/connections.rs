//! # Connection Table
//!
//! Latest known status of every live connection the transport reported, with
//! a watch channel per connection so `Peer::connect` can wait for approval
//! without polling.
//!
//! Closed connections leave the live map as soon as they are reported. The
//! last [`CLOSED_HISTORY`] of them are remembered so a caller that starts
//! waiting after a fast refusal still learns the reason.

use crate::ports::ConnectionStatus;
use courier_types::ConnectionId;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::watch;
use tracing::trace;

/// How many closed connections stay queryable after they leave the table.
pub const CLOSED_HISTORY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Why the connection was refused or dropped, when the transport said.
    pub reason: Option<String>,
}

impl ConnectionState {
    fn connecting() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            reason: None,
        }
    }
}

#[derive(Default)]
pub struct ConnectionTable {
    states: DashMap<ConnectionId, watch::Sender<ConnectionState>>,
    closed: Mutex<VecDeque<(ConnectionId, ConnectionState)>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a status change and wake anyone waiting on it.
    ///
    /// A `Disconnected` status retires the connection from the live table.
    pub fn update(&self, id: ConnectionId, status: ConnectionStatus, reason: Option<String>) {
        let state = ConnectionState { status, reason };
        if status == ConnectionStatus::Disconnected {
            self.retire(id, state);
            return;
        }
        self.states
            .entry(id)
            .or_insert_with(|| watch::channel(ConnectionState::connecting()).0)
            .send_replace(state);
    }

    pub fn status(&self, id: ConnectionId) -> Option<ConnectionStatus> {
        match self.states.get(&id) {
            Some(sender) => Some(sender.borrow().status),
            None => self.closed_state(id).map(|state| state.status),
        }
    }

    /// Connections currently established.
    pub fn connected(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .states
            .iter()
            .filter(|entry| entry.value().borrow().status == ConnectionStatus::Connected)
            .map(|entry| *entry.key())
            .collect();
        ids.sort();
        ids
    }

    /// Number of connections that are connecting or connected.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Wait until `id` is connected or refused, for at most `timeout`.
    ///
    /// Returns `None` on timeout.
    pub async fn wait_settled(
        &self,
        id: ConnectionId,
        timeout: Duration,
    ) -> Option<ConnectionState> {
        if let Some(state) = self.closed_state(id) {
            return Some(state);
        }
        let mut receiver = self
            .states
            .entry(id)
            .or_insert_with(|| watch::channel(ConnectionState::connecting()).0)
            .subscribe();
        // Retired between the history check and the subscription.
        if let Some(state) = self.closed_state(id) {
            drop(receiver);
            self.drop_if_unwatched(id);
            return Some(state);
        }

        let waited = tokio::time::timeout(
            timeout,
            receiver.wait_for(|state| state.status.is_settled()),
        )
        .await
        .map(|settled| settled.map(|state| (*state).clone()));

        match waited {
            Ok(Ok(state)) => Some(state),
            // Sender dropped: the connection was retired while we waited.
            Ok(Err(_)) => self.closed_state(id),
            Err(_) => {
                drop(receiver);
                self.drop_if_unwatched(id);
                None
            }
        }
    }

    fn retire(&self, id: ConnectionId, state: ConnectionState) {
        if let Some((_, sender)) = self.states.remove(&id) {
            sender.send_replace(state.clone());
        }
        let mut closed = self.closed.lock();
        if closed.len() == CLOSED_HISTORY {
            closed.pop_front();
        }
        closed.push_back((id, state));
        trace!(connection = %id, live = self.states.len(), "Connection retired");
    }

    fn closed_state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.closed
            .lock()
            .iter()
            .rev()
            .find(|(closed, _)| *closed == id)
            .map(|(_, state)| state.clone())
    }

    /// Forget an attempt nobody reported on and nobody waits for anymore.
    fn drop_if_unwatched(&self, id: ConnectionId) {
        self.states.remove_if(&id, |_, sender| {
            sender.receiver_count() == 0 && !sender.borrow().status.is_settled()
        });
    }
}
