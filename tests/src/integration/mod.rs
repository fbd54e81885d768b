//! # Integration Scenarios
//!
//! Every scenario binds real peers on a fresh [`MemoryHub`], so the full
//! path is exercised: encode → transport → deserialize → dispatch → registry.

pub mod authentication;
pub mod dispatch;
pub mod request_response;

#[cfg(test)]
pub(crate) mod support {
    use courier_peer::{
        ConnectionStatus, MemoryHub, MemoryTransport, Peer, PeerBuilder, PeerConfig,
        TransportEvent,
    };
    use courier_types::{ConnectionId, Message, RequestMessage};
    use serde::{Deserialize, Serialize};
    use std::future::IntoFuture;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_stream::wrappers::UnboundedReceiverStream;
    use tokio_stream::StreamExt;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Ping {
        pub seq: u32,
    }

    impl Message for Ping {
        const TYPE: &'static str = "ping";
    }

    impl RequestMessage for Ping {
        type Response = Pong;
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Pong {
        pub seq: u32,
    }

    impl Message for Pong {
        const TYPE: &'static str = "pong";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Chat {
        pub text: String,
    }

    impl Message for Chat {
        const TYPE: &'static str = "chat";
    }

    pub fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    pub fn config() -> PeerConfig {
        PeerConfig {
            request_timeout: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(2),
            sweep_interval: Duration::from_millis(10),
            ..PeerConfig::default()
        }
    }

    /// Bind, build, start and spawn the event loop of one peer.
    pub fn spawn_peer(
        hub: &MemoryHub,
        port: u16,
        customize: impl FnOnce(PeerBuilder) -> PeerBuilder,
    ) -> Arc<Peer> {
        let (transport, events) = hub.bind(addr(port)).unwrap();
        let peer = Arc::new(customize(Peer::builder(config(), transport)).build().unwrap());
        peer.start().unwrap();

        let runner = Arc::clone(&peer);
        tokio::spawn(async move { runner.run(events).await });
        peer
    }

    /// A server on port 1 and a client on port 2, already connected.
    pub async fn connected_pair(hub: &MemoryHub) -> (Arc<Peer>, Arc<Peer>, ConnectionId) {
        let server = spawn_peer(hub, 1, |b| b);
        let client = spawn_peer(hub, 2, |b| b);
        let conn = client.connect(addr(1), &client.hail()).await.unwrap();
        (server, client, conn)
    }

    /// Bind a bare transport endpoint, with no peer reading its events.
    pub fn raw_endpoint(
        hub: &MemoryHub,
        port: u16,
    ) -> (MemoryTransport, UnboundedReceiverStream<TransportEvent>) {
        hub.bind(addr(port)).unwrap()
    }

    /// Next settled status of a raw endpoint's connection, skipping
    /// `Connecting` and non-status events.
    pub async fn settled_status(
        events: &mut UnboundedReceiverStream<TransportEvent>,
    ) -> (ConnectionStatus, Option<String>) {
        loop {
            match within(events.next()).await {
                Some(TransportEvent::StatusChanged { status, reason, .. })
                    if status.is_settled() =>
                {
                    return (status, reason)
                }
                Some(_) => continue,
                None => panic!("event stream ended"),
            }
        }
    }

    /// Poll `condition` until it holds, failing after one second.
    pub async fn eventually(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
    }

    /// Await `future`, failing after one second.
    pub async fn within<F: IntoFuture>(future: F) -> F::Output {
        tokio::time::timeout(Duration::from_secs(1), future.into_future())
            .await
            .unwrap()
    }
}
