//! # Request/Response Scenarios
//!
//! Round trips between two peers, the timeout race, and responses that have
//! nowhere to go.

#[cfg(test)]
mod tests {
    use super::super::support::{
        addr, connected_pair, eventually, spawn_peer, within, Chat, Ping, Pong,
    };
    use courier_bus::{callback, CallbackError};
    use courier_peer::{Destination, MemoryHub, PeerError};
    use courier_requests::RequestError;
    use courier_types::{
        Message, Origin, PacketError, RequestId, RequestPacket, ResponsePacket,
    };
    use futures::future::join_all;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_get_their_own_responses() {
        let hub = MemoryHub::new();
        let (server, client, conn) = connected_pair(&hub).await;
        server.serve(|ping: Ping, _| Ok(Pong { seq: ping.seq * 10 }));

        let pending: Vec<_> = (0..64u32)
            .map(|seq| client.request_message(&Ping { seq }, conn).unwrap())
            .collect();
        let ids: HashSet<RequestId> = pending.iter().map(|p| p.id()).collect();
        assert_eq!(ids.len(), 64);

        let pongs = within(join_all(pending.into_iter().map(|p| p.wait()))).await;
        for (seq, pong) in pongs.into_iter().enumerate() {
            assert_eq!(pong.unwrap(), Pong { seq: seq as u32 * 10 });
        }

        let stats = client.stats();
        assert_eq!(stats.requests.completed, 64);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_request_over_unconnected_datagrams() {
        let hub = MemoryHub::new();
        let server = spawn_peer(&hub, 1, |b| b);
        let client = spawn_peer(&hub, 2, |b| b);

        let origins = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&origins);
        server.serve(move |ping: Ping, origin| {
            seen.lock().push(*origin);
            Ok(Pong { seq: ping.seq })
        });

        let pong = within(
            client
                .request_message(&Ping { seq: 5 }, Destination::Unconnected(addr(1)))
                .unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(pong, Pong { seq: 5 });
        assert_eq!(*origins.lock(), vec![Origin::Unconnected(addr(2))]);
    }

    #[tokio::test]
    async fn test_late_response_is_dropped_after_timeout() {
        let hub = MemoryHub::new();
        let (server, client, conn) = connected_pair(&hub).await;

        // Hold requests instead of answering them.
        let held = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&held);
        server
            .listeners()
            .request
            .add(callback(move |request: &RequestPacket, origin| {
                store.lock().push((request.clone(), *origin));
                Ok(())
            }));

        let request = RequestPacket::from_message(&Ping { seq: 1 }).unwrap();
        let pending = client
            .request_with_timeout::<Pong>(request, conn, Duration::from_millis(30))
            .unwrap();
        let id = pending.id();

        match within(pending).await {
            Err(RequestError::TimedOut { id: expired, waited }) => {
                assert_eq!(expired, id);
                assert!(waited >= Duration::from_millis(30));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(!client.requests().is_pending(id));

        let (request, origin) = held.lock().pop().unwrap();
        let late = request.respond_with(&Pong { seq: 1 }).unwrap();
        server.send(late, origin).unwrap();

        eventually(|| client.stats().requests.unroutable == 1).await;
        let stats = client.stats().requests;
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.completed, 0);
    }

    #[tokio::test]
    async fn test_stray_response_is_ignored() {
        let hub = MemoryHub::new();
        let (server, client, conn) = connected_pair(&hub).await;
        let mut errors = client.subscribe_errors();

        server
            .send(ResponsePacket::new(RequestId::new(9_999), "pong", vec![]), conn)
            .unwrap();

        eventually(|| client.stats().requests.unroutable == 1).await;
        assert!(errors.try_recv().is_err());
        assert_eq!(client.connected(), vec![conn]);
    }

    #[tokio::test]
    async fn test_response_of_another_type_fails_the_await() {
        let hub = MemoryHub::new();
        let (server, client, conn) = connected_pair(&hub).await;

        let responder = Arc::downgrade(&server);
        server
            .listeners()
            .request
            .add(callback(move |request: &RequestPacket, origin| {
                let id = request
                    .identifier()
                    .ok_or_else(|| CallbackError::failed("unidentified request"))?;
                let payload = Chat { text: "not a pong".into() }
                    .encode()
                    .map_err(CallbackError::failed)?;
                if let Some(server) = responder.upgrade() {
                    server
                        .send(ResponsePacket::new(id, Chat::TYPE, payload), *origin)
                        .map_err(CallbackError::failed)?;
                }
                Ok(())
            }));

        let result = within(client.request_message(&Ping { seq: 1 }, conn).unwrap()).await;

        assert!(matches!(
            result,
            Err(RequestError::Packet(PacketError::UnexpectedType { .. }))
        ));
        assert_eq!(client.stats().requests.completed, 1);
    }

    #[tokio::test]
    async fn test_mismatched_response_type_fails_before_sending() {
        let hub = MemoryHub::new();
        let (server, client, conn) = connected_pair(&hub).await;
        let received = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&received);
        server
            .listeners()
            .request
            .add(callback(move |_: &RequestPacket, _| {
                *counter.lock() += 1;
                Ok(())
            }));

        let request = RequestPacket::new("ping", "pong", vec![]);
        let result = client.request::<Chat>(request, conn);

        assert!(matches!(
            result,
            Err(PeerError::Request(RequestError::ResponseTypeMismatch { .. }))
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*received.lock(), 0);
        assert_eq!(client.stats().requests.registered, 0);
    }
}
