//! # In-Memory Transport
//!
//! A [`MemoryHub`] connects any number of endpoints bound to fake socket
//! addresses inside one process. Delivery is reliable and ordered whatever
//! the requested method, which makes it suitable for tests and demos.
//!
//! Both ends of a link share one [`ConnectionId`].
//!
//! ```text
//!  client.connect(server) ──→ server: ConnectionApproval
//!  server approves        ──→ both:   StatusChanged(Connected)
//!  server denies(reason)  ──→ client: StatusChanged(Disconnected, reason)
//! ```

use crate::config::DeliveryOptions;
use crate::ports::{
    Connection, ConnectionStatus, Destination, InboundMessage, Transport, TransportError,
    TransportEvent,
};
use courier_types::{ConnectionId, Origin};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace};

/// Reason sent to the remote ends when an endpoint closes.
pub const CLOSED_REASON: &str = "Transport closed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Pending,
    Established,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    initiator: SocketAddr,
    acceptor: SocketAddr,
    state: LinkState,
}

impl Link {
    fn other_end(&self, address: SocketAddr) -> Option<SocketAddr> {
        if address == self.initiator {
            Some(self.acceptor)
        } else if address == self.acceptor {
            Some(self.initiator)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct HubInner {
    endpoints: DashMap<SocketAddr, mpsc::UnboundedSender<TransportEvent>>,
    links: DashMap<ConnectionId, Link>,
    next_connection: AtomicU64,
}

impl HubInner {
    fn deliver(&self, address: SocketAddr, event: TransportEvent) -> bool {
        let delivered = self
            .endpoints
            .get(&address)
            .map(|sender| sender.send(event).is_ok())
            .unwrap_or(false);
        if !delivered {
            trace!(address = %address, "Dropping event for vanished endpoint");
        }
        delivered
    }

    fn notify(
        &self,
        address: SocketAddr,
        connection: ConnectionId,
        status: ConnectionStatus,
        reason: Option<&str>,
    ) {
        self.deliver(
            address,
            TransportEvent::StatusChanged {
                connection,
                status,
                reason: reason.map(str::to_string),
            },
        );
    }

    /// Tear down `id`, telling every end that was told about it.
    fn close_link(&self, id: ConnectionId, reason: &str) -> Result<(), TransportError> {
        let (_, link) = self
            .links
            .remove(&id)
            .ok_or(TransportError::UnknownConnection(id))?;

        debug!(connection = %id, reason, "Closing in-memory link");
        self.notify(link.initiator, id, ConnectionStatus::Disconnected, Some(reason));
        if link.state == LinkState::Established {
            self.notify(link.acceptor, id, ConnectionStatus::Disconnected, Some(reason));
        }
        Ok(())
    }
}

/// Shared switchboard for in-memory endpoints.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an endpoint at `address`, returning its transport and event stream.
    pub fn bind(
        &self,
        address: SocketAddr,
    ) -> Result<(MemoryTransport, UnboundedReceiverStream<TransportEvent>), TransportError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        match self.inner.endpoints.entry(address) {
            Entry::Occupied(_) => return Err(TransportError::AddressInUse(address)),
            Entry::Vacant(slot) => {
                slot.insert(sender);
            }
        }

        debug!(address = %address, "Bound in-memory endpoint");
        let transport = MemoryTransport {
            hub: Arc::clone(&self.inner),
            address,
        };
        Ok((transport, UnboundedReceiverStream::new(receiver)))
    }

    /// Number of links, pending or established.
    pub fn link_count(&self) -> usize {
        self.inner.links.len()
    }
}

/// One endpoint of a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryTransport {
    hub: Arc<HubInner>,
    address: SocketAddr,
}

impl MemoryTransport {
    /// Unbind this endpoint and drop every link it takes part in.
    pub fn close(&self) {
        let ids: Vec<ConnectionId> = self
            .hub
            .links
            .iter()
            .filter(|entry| entry.value().other_end(self.address).is_some())
            .map(|entry| *entry.key())
            .collect();
        for id in ids {
            if let Err(error) = self.hub.close_link(id, CLOSED_REASON) {
                debug!(connection = %id, error = %error, "Link already closed by the other end");
            }
        }
        self.hub.endpoints.remove(&self.address);
        debug!(address = %self.address, "Closed in-memory endpoint");
    }

    fn link(&self, id: ConnectionId) -> Result<Link, TransportError> {
        let link = *self
            .hub
            .links
            .get(&id)
            .ok_or(TransportError::UnknownConnection(id))?;
        if link.other_end(self.address).is_none() {
            return Err(TransportError::UnknownConnection(id));
        }
        Ok(link)
    }
}

impl Transport for MemoryTransport {
    fn local_address(&self) -> SocketAddr {
        self.address
    }

    fn send(
        &self,
        frame: Vec<u8>,
        destination: Destination,
        options: DeliveryOptions,
    ) -> Result<(), TransportError> {
        trace!(
            from = %self.address,
            to = %destination,
            method = %options.method,
            channel = options.channel,
            len = frame.len(),
            "Sending frame"
        );

        let (target, message) = match destination {
            Destination::Connection(id) => {
                let link = self.link(id)?;
                if link.state != LinkState::Established {
                    return Err(TransportError::NotConnected(id));
                }
                let remote = link
                    .other_end(self.address)
                    .ok_or(TransportError::UnknownConnection(id))?;
                let handle = MemoryConnection {
                    hub: Arc::clone(&self.hub),
                    id,
                    remote: self.address,
                };
                let message = InboundMessage {
                    origin: Origin::Connection(id),
                    connection: Some(Arc::new(handle)),
                    payload: frame,
                };
                (remote, message)
            }
            Destination::Unconnected(address) => {
                if !self.hub.endpoints.contains_key(&address) {
                    return Err(TransportError::UnknownAddress(address));
                }
                let message = InboundMessage {
                    origin: Origin::Unconnected(self.address),
                    connection: None,
                    payload: frame,
                };
                (address, message)
            }
        };

        if self.hub.deliver(target, TransportEvent::Message(message)) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }

    fn connect(&self, address: SocketAddr, hail: Vec<u8>) -> Result<ConnectionId, TransportError> {
        if !self.hub.endpoints.contains_key(&address) {
            return Err(TransportError::UnknownAddress(address));
        }

        let id = ConnectionId::new(self.hub.next_connection.fetch_add(1, Ordering::Relaxed) + 1);
        self.hub.links.insert(
            id,
            Link {
                initiator: self.address,
                acceptor: address,
                state: LinkState::Pending,
            },
        );
        self.hub
            .notify(self.address, id, ConnectionStatus::Connecting, None);

        let handle = MemoryConnection {
            hub: Arc::clone(&self.hub),
            id,
            remote: self.address,
        };
        let request = TransportEvent::ConnectionApproval {
            connection: Arc::new(handle),
            payload: hail,
        };
        if !self.hub.deliver(address, request) {
            self.hub.links.remove(&id);
            return Err(TransportError::UnknownAddress(address));
        }

        debug!(connection = %id, from = %self.address, to = %address, "Connection requested");
        Ok(id)
    }

    fn disconnect(&self, connection: ConnectionId, reason: &str) -> Result<(), TransportError> {
        self.link(connection)?;
        self.hub.close_link(connection, reason)
    }
}

/// The receiving end's handle on a link.
pub struct MemoryConnection {
    hub: Arc<HubInner>,
    id: ConnectionId,
    remote: SocketAddr,
}

impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    fn approve(&self) -> Result<(), TransportError> {
        let link = {
            let mut link = self
                .hub
                .links
                .get_mut(&self.id)
                .ok_or(TransportError::UnknownConnection(self.id))?;
            if link.state != LinkState::Pending {
                return Err(TransportError::AlreadyAnswered(self.id));
            }
            link.state = LinkState::Established;
            *link
        };

        self.hub
            .notify(link.initiator, self.id, ConnectionStatus::Connected, None);
        self.hub
            .notify(link.acceptor, self.id, ConnectionStatus::Connected, None);
        Ok(())
    }

    fn deny(&self, reason: &str) -> Result<(), TransportError> {
        self.hub.close_link(self.id, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    async fn next_status(
        events: &mut UnboundedReceiverStream<TransportEvent>,
    ) -> (ConnectionId, ConnectionStatus, Option<String>) {
        match events.next().await {
            Some(TransportEvent::StatusChanged {
                connection,
                status,
                reason,
            }) => (connection, status, reason),
            other => panic!("expected status change, got {other:?}"),
        }
    }

    async fn next_approval(
        events: &mut UnboundedReceiverStream<TransportEvent>,
    ) -> (Arc<dyn Connection>, Vec<u8>) {
        match events.next().await {
            Some(TransportEvent::ConnectionApproval {
                connection,
                payload,
            }) => (connection, payload),
            other => panic!("expected approval request, got {other:?}"),
        }
    }

    #[test]
    fn test_bind_rejects_duplicate_address() {
        let hub = MemoryHub::new();
        let _first = hub.bind(addr(1)).unwrap();
        assert!(matches!(
            hub.bind(addr(1)),
            Err(TransportError::AddressInUse(a)) if a == addr(1)
        ));
    }

    #[tokio::test]
    async fn test_approve_connects_both_ends() {
        let hub = MemoryHub::new();
        let (server, mut server_events) = hub.bind(addr(1)).unwrap();
        let (client, mut client_events) = hub.bind(addr(2)).unwrap();

        let id = client.connect(server.local_address(), vec![7]).unwrap();
        assert_eq!(
            next_status(&mut client_events).await,
            (id, ConnectionStatus::Connecting, None)
        );

        let (connection, hail) = next_approval(&mut server_events).await;
        assert_eq!(connection.id(), id);
        assert_eq!(connection.remote_address(), addr(2));
        assert_eq!(hail, vec![7]);

        connection.approve().unwrap();
        assert_eq!(
            connection.approve(),
            Err(TransportError::AlreadyAnswered(id))
        );

        assert_eq!(
            next_status(&mut client_events).await,
            (id, ConnectionStatus::Connected, None)
        );
        assert_eq!(
            next_status(&mut server_events).await,
            (id, ConnectionStatus::Connected, None)
        );
    }

    #[tokio::test]
    async fn test_deny_tells_initiator_why() {
        let hub = MemoryHub::new();
        let (server, mut server_events) = hub.bind(addr(1)).unwrap();
        let (client, mut client_events) = hub.bind(addr(2)).unwrap();

        let id = client.connect(server.local_address(), vec![]).unwrap();
        next_status(&mut client_events).await;
        let (connection, _) = next_approval(&mut server_events).await;

        connection.deny("go away").unwrap();

        assert_eq!(
            next_status(&mut client_events).await,
            (id, ConnectionStatus::Disconnected, Some("go away".into()))
        );
        assert_eq!(hub.link_count(), 0);
        assert_eq!(
            client.send(vec![1], Destination::Connection(id), DeliveryOptions::default()),
            Err(TransportError::UnknownConnection(id))
        );
    }

    #[tokio::test]
    async fn test_send_over_connection() {
        let hub = MemoryHub::new();
        let (server, mut server_events) = hub.bind(addr(1)).unwrap();
        let (client, mut client_events) = hub.bind(addr(2)).unwrap();

        let id = client.connect(server.local_address(), vec![]).unwrap();
        assert_eq!(
            client.send(vec![1], id.into(), DeliveryOptions::default()),
            Err(TransportError::NotConnected(id))
        );

        next_status(&mut client_events).await;
        let (connection, _) = next_approval(&mut server_events).await;
        connection.approve().unwrap();
        next_status(&mut client_events).await;
        next_status(&mut server_events).await;

        client
            .send(vec![1, 2, 3], id.into(), DeliveryOptions::default())
            .unwrap();
        match server_events.next().await {
            Some(TransportEvent::Message(message)) => {
                assert_eq!(message.origin, Origin::Connection(id));
                assert_eq!(message.payload, vec![1, 2, 3]);
                let handle = message.connection.unwrap();
                assert_eq!(handle.remote_address(), addr(2));
            }
            other => panic!("expected message, got {other:?}"),
        }

        server.send(vec![9], id.into(), DeliveryOptions::default()).unwrap();
        match client_events.next().await {
            Some(TransportEvent::Message(message)) => assert_eq!(message.payload, vec![9]),
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unconnected_send() {
        let hub = MemoryHub::new();
        let (a, _a_events) = hub.bind(addr(1)).unwrap();
        let (_b, mut b_events) = hub.bind(addr(2)).unwrap();

        a.send(vec![5], Destination::Unconnected(addr(2)), DeliveryOptions::default())
            .unwrap();
        match b_events.next().await {
            Some(TransportEvent::Message(message)) => {
                assert_eq!(message.origin, Origin::Unconnected(addr(1)));
                assert!(message.connection.is_none());
            }
            other => panic!("expected message, got {other:?}"),
        }

        assert_eq!(
            a.send(vec![5], Destination::Unconnected(addr(3)), DeliveryOptions::default()),
            Err(TransportError::UnknownAddress(addr(3)))
        );
    }

    #[tokio::test]
    async fn test_close_disconnects_links() {
        let hub = MemoryHub::new();
        let (server, mut server_events) = hub.bind(addr(1)).unwrap();
        let (client, mut client_events) = hub.bind(addr(2)).unwrap();

        let id = client.connect(server.local_address(), vec![]).unwrap();
        next_status(&mut client_events).await;
        next_approval(&mut server_events).await.0.approve().unwrap();
        next_status(&mut client_events).await;

        server.close();

        assert_eq!(
            next_status(&mut client_events).await,
            (id, ConnectionStatus::Disconnected, Some(CLOSED_REASON.into()))
        );
        assert!(matches!(
            client.connect(addr(1), vec![]),
            Err(TransportError::UnknownAddress(_))
        ));
    }
}
