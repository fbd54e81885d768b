//! # Authentication Scenarios
//!
//! Every connection request ends approved or denied, and the remote learns
//! why it was denied.

#[cfg(test)]
mod tests {
    use super::super::support::{
        addr, config, raw_endpoint, settled_status, spawn_peer, within,
    };
    use courier_bus::callback;
    use courier_peer::dispatcher::{DESERIALIZATION_DENY_PREFIX, EXPECTED_CONNECT_REASON};
    use courier_peer::ports::AUTH_REJECTED_REASON;
    use courier_peer::{
        AuthDecision, AuthError, ConnectionStatus, CredentialAuthenticator, LocalError, MemoryHub,
        Peer, PeerConfig, PeerError, Transport,
    };
    use courier_types::{
        encode_packet, ConnectPacket, DataPacket, Origin, Packet, PacketError,
    };
    use parking_lot::Mutex;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_credential_authenticator_admits_matching_hail() {
        let hub = MemoryHub::new();
        let server = spawn_peer(&hub, 1, |b| {
            b.authenticator(CredentialAuthenticator::new("open sesame"))
        });
        let client = spawn_peer(&hub, 2, |b| b);

        let admitted = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&admitted);
        server
            .listeners()
            .authenticated
            .add(callback(move |hail: &ConnectPacket, origin| {
                seen.lock().push((hail.payload().to_vec(), *origin));
                Ok(())
            }));

        let refused = client.connect(addr(1), &client.hail()).await;
        assert!(matches!(
            refused,
            Err(PeerError::ConnectionRefused { ref reason, .. }) if reason == AUTH_REJECTED_REASON
        ));

        let hail = ConnectPacket::new("open sesame").with_payload(vec![1, 2]);
        let conn = client.connect(addr(1), &hail).await.unwrap();

        assert_eq!(client.connection_status(conn), Some(ConnectionStatus::Connected));
        assert_eq!(*admitted.lock(), vec![(vec![1, 2], Origin::Connection(conn))]);
        let stats = server.stats().dispatch;
        assert_eq!(stats.connections_approved, 1);
        assert_eq!(stats.connections_denied, 1);
    }

    #[tokio::test]
    async fn test_hail_that_is_not_a_connect_packet_is_denied() {
        let hub = MemoryHub::new();
        let _server = spawn_peer(&hub, 1, |b| b);
        let (probe, mut events) = raw_endpoint(&hub, 7);

        let frame = encode_packet(&Packet::Data(DataPacket::new("chat", vec![]))).unwrap();
        probe.connect(addr(1), frame).unwrap();

        assert_eq!(
            settled_status(&mut events).await,
            (
                ConnectionStatus::Disconnected,
                Some(EXPECTED_CONNECT_REASON.to_string())
            )
        );
    }

    #[tokio::test]
    async fn test_undecodable_hail_reason_differs_from_auth_rejection() {
        let hub = MemoryHub::new();
        let server = spawn_peer(&hub, 1, |b| b);
        let mut errors = server.subscribe_errors();
        let (probe, mut events) = raw_endpoint(&hub, 7);

        probe.connect(addr(1), vec![0xff; 3]).unwrap();

        let (status, reason) = settled_status(&mut events).await;
        assert_eq!(status, ConnectionStatus::Disconnected);
        let reason = reason.unwrap();
        assert!(reason.starts_with(DESERIALIZATION_DENY_PREFIX));
        assert_ne!(reason, AUTH_REJECTED_REASON);
        assert!(matches!(
            within(errors.recv()).await.unwrap(),
            LocalError::Deserialization { .. }
        ));
    }

    #[tokio::test]
    async fn test_custom_deserializer_is_used_for_hails() {
        let hub = MemoryHub::new();
        let strict = |_: &[u8]| -> Result<Packet, PacketError> {
            Err(PacketError::Decode("frames are not accepted today".into()))
        };
        let _server = spawn_peer(&hub, 1, |b| b.deserializer(strict));
        let client = spawn_peer(&hub, 2, |b| b);

        let result = client.connect(addr(1), &client.hail()).await;
        match result {
            Err(PeerError::ConnectionRefused { reason, .. }) => {
                assert!(reason.contains("frames are not accepted today"));
            }
            other => panic!("expected refusal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failing_authenticator_denies_and_reports() {
        let hub = MemoryHub::new();
        let backend = |_: &ConnectPacket, _: SocketAddr| -> Result<AuthDecision, AuthError> {
            Err(AuthError::Unavailable("directory offline".into()))
        };
        let server = spawn_peer(&hub, 1, |b| b.authenticator(backend));
        let mut errors = server.subscribe_errors();
        let client = spawn_peer(&hub, 2, |b| b);

        let result = client.connect(addr(1), &client.hail()).await;
        assert!(matches!(result, Err(PeerError::ConnectionRefused { .. })));

        match within(errors.recv()).await.unwrap() {
            LocalError::Authentication { remote, reason, .. } => {
                assert_eq!(remote, addr(2));
                assert!(reason.contains("directory offline"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(server.connected().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_times_out_when_nobody_answers() {
        let hub = MemoryHub::new();
        // An endpoint that never judges its connection requests.
        let (_silent, _silent_events) = raw_endpoint(&hub, 1);

        let (transport, events) = hub.bind(addr(2)).unwrap();
        let client_config = PeerConfig {
            connect_timeout: Duration::from_millis(300),
            ..config()
        };
        let client = Arc::new(Peer::new(client_config, transport).unwrap());
        client.start().unwrap();
        let runner = Arc::clone(&client);
        tokio::spawn(async move { runner.run(events).await });

        let result = client.connect(addr(1), &client.hail()).await;

        match result {
            Err(PeerError::ConnectTimeout { waited, .. }) => {
                assert_eq!(waited, Duration::from_millis(300));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(hub.link_count(), 0);
    }
}
