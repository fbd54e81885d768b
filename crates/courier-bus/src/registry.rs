//! # Callback Registry
//!
//! Maps each [`PacketKind`] to its own ordered [`ListenerList`].

use crate::callback::Callback;
use crate::listeners::{DispatchReport, ListenerList};
use courier_types::{Origin, Packet, PacketKind};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Per-kind multicast table of packet callbacks.
///
/// The table for every kind exists from construction, so lookups never take a
/// registry-wide lock; each kind's list is locked independently.
pub struct CallbackRegistry {
    data: ListenerList<Packet>,
    request: ListenerList<Packet>,
    response: ListenerList<Packet>,
    connect: ListenerList<Packet>,
    dispatched: AtomicU64,
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: ListenerList::new("callbacks.data"),
            request: ListenerList::new("callbacks.request"),
            response: ListenerList::new("callbacks.response"),
            connect: ListenerList::new("callbacks.connect"),
            dispatched: AtomicU64::new(0),
        }
    }

    fn table(&self, kind: PacketKind) -> &ListenerList<Packet> {
        match kind {
            PacketKind::Data => &self.data,
            PacketKind::Request => &self.request,
            PacketKind::Response => &self.response,
            PacketKind::Connect => &self.connect,
        }
    }

    /// Append `callback` to the list for `kind`.
    pub fn register(&self, kind: PacketKind, callback: Callback<Packet>) {
        self.table(kind).add(callback);
        debug!(kind = %kind, "Packet callback registered");
    }

    /// Remove the first registration of `callback` for `kind`.
    ///
    /// Unknown callbacks are ignored; returns whether one was removed.
    pub fn unregister(&self, kind: PacketKind, callback: &Callback<Packet>) -> bool {
        let removed = self.table(kind).remove(callback);
        debug!(kind = %kind, removed, "Packet callback unregistered");
        removed
    }

    /// Invoke every callback registered for the packet's kind, in order.
    pub fn dispatch(&self, packet: &Packet, origin: &Origin) -> DispatchReport {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.table(packet.kind()).invoke(packet, origin)
    }

    pub fn callback_count(&self, kind: PacketKind) -> usize {
        self.table(kind).len()
    }

    /// Drop every callback for `kind`.
    pub fn clear(&self, kind: PacketKind) {
        self.table(kind).clear();
    }

    /// Packets dispatched since construction.
    pub fn packets_dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}
