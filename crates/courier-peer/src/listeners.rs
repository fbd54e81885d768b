//! Listener lists the dispatcher fans out to, besides the per-kind registry.

use crate::ports::ConnectionStatus;
use courier_bus::ListenerList;
use courier_types::{
    ConnectPacket, ConnectionId, DataPacket, Packet, RequestPacket, ResponsePacket,
};

/// A connection status transition, as delivered to status listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub connection: ConnectionId,
    pub status: ConnectionStatus,
    pub reason: Option<String>,
}

/// Every listener list of one peer.
///
/// Fields are public so callers can add and remove callbacks directly:
///
/// ```ignore
/// let cb = callback(|data: &DataPacket, origin| { ... });
/// peer.listeners().data.add(Arc::clone(&cb));
/// peer.listeners().data.remove(&cb);
/// ```
pub struct PeerListeners {
    /// Every successfully deserialized packet, before kind dispatch.
    pub packet: ListenerList<Packet>,
    pub data: ListenerList<DataPacket>,
    pub request: ListenerList<RequestPacket>,
    /// Runs before the request registry sees the response.
    pub response: ListenerList<ResponsePacket>,
    /// Remotes whose hail was accepted.
    pub authenticated: ListenerList<ConnectPacket>,
    pub status: ListenerList<StatusChange>,
}

impl PeerListeners {
    pub fn new() -> Self {
        Self {
            packet: ListenerList::new("listeners.packet"),
            data: ListenerList::new("listeners.data"),
            request: ListenerList::new("listeners.request"),
            response: ListenerList::new("listeners.response"),
            authenticated: ListenerList::new("listeners.authenticated"),
            status: ListenerList::new("listeners.status"),
        }
    }
}

impl Default for PeerListeners {
    fn default() -> Self {
        Self::new()
    }
}
