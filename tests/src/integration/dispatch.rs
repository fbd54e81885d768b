//! # Dispatch Scenarios
//!
//! Inbound fan-out as seen from a live peer: ordering, isolation of failing
//! callbacks, re-entrant registration and malformed frames.

#[cfg(test)]
mod tests {
    use super::super::support::{
        addr, connected_pair, eventually, raw_endpoint, settled_status, within, Chat,
    };
    use courier_bus::{callback, Callback, CallbackError};
    use courier_peer::dispatcher::DESERIALIZATION_DENY_PREFIX;
    use courier_peer::{ConnectionStatus, DeliveryOptions, LocalError, MemoryHub, Transport};
    use courier_types::{encode_packet, ConnectPacket, DataPacket, Packet, PacketKind};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_generic_then_kind_then_branch_listeners() {
        let hub = MemoryHub::new();
        let (server, client, conn) = connected_pair(&hub).await;
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = Arc::clone(&log);
        server.listeners().data.add(callback(move |_: &DataPacket, _| {
            l.lock().push("data");
            Ok(())
        }));
        let l = Arc::clone(&log);
        server.register_callback(
            PacketKind::Data,
            callback(move |_, _| {
                l.lock().push("kind");
                Ok(())
            }),
        );
        let l = Arc::clone(&log);
        server.listeners().packet.add(callback(move |_: &Packet, _| {
            l.lock().push("packet");
            Ok(())
        }));

        client.send_message(&Chat { text: "hi".into() }, conn).unwrap();

        eventually(|| log.lock().len() == 3).await;
        assert_eq!(*log.lock(), vec!["packet", "kind", "data"]);
    }

    #[tokio::test]
    async fn test_failing_callbacks_do_not_stop_siblings() {
        let hub = MemoryHub::new();
        let (server, client, conn) = connected_pair(&hub).await;
        let mut errors = server.subscribe_errors();

        server.register_callback(
            PacketKind::Data,
            callback(|_, _| Err(CallbackError::failed("rejected"))),
        );
        server.register_callback(PacketKind::Data, callback(|_, _| panic!("kaboom")));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        server.on_data_message(move |chat: Chat, _| {
            tx.send(chat.text).map_err(CallbackError::failed)
        });

        client.send_message(&Chat { text: "still here".into() }, conn).unwrap();

        assert_eq!(within(rx.recv()).await.unwrap(), "still here");
        let mut failures = Vec::new();
        for _ in 0..2 {
            match within(errors.recv()).await.unwrap() {
                LocalError::Callback { failure, .. } => failures.push(failure.error),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(
            failures,
            vec![
                CallbackError::Failed("rejected".into()),
                CallbackError::Panicked("kaboom".into()),
            ]
        );
        assert_eq!(server.stats().dispatch.callback_failures, 2);
        assert_eq!(server.connected(), vec![conn]);
    }

    #[tokio::test]
    async fn test_unregistered_callback_stops_receiving() {
        let hub = MemoryHub::new();
        let (server, client, conn) = connected_pair(&hub).await;
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        let cb_first: Callback<Packet> = callback(move |_, _| {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let s = Arc::clone(&second);
        let cb_second: Callback<Packet> = callback(move |_, _| {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        server.register_callback(PacketKind::Data, Arc::clone(&cb_first));
        server.register_callback(PacketKind::Data, Arc::clone(&cb_second));

        client.send_message(&Chat { text: "1".into() }, conn).unwrap();
        eventually(|| second.load(Ordering::SeqCst) == 1).await;

        assert!(server.unregister_callback(PacketKind::Data, &cb_first));
        assert!(!server.unregister_callback(PacketKind::Request, &cb_second));

        client.send_message(&Chat { text: "2".into() }, conn).unwrap();
        eventually(|| second.load(Ordering::SeqCst) == 2).await;
        assert_eq!(first.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_callback_may_register_during_dispatch() {
        let hub = MemoryHub::new();
        let (server, client, conn) = connected_pair(&hub).await;
        let late_hits = Arc::new(AtomicUsize::new(0));

        let registry = Arc::clone(server.callbacks());
        let hits = Arc::clone(&late_hits);
        let armed = Arc::new(AtomicUsize::new(0));
        let arm = Arc::clone(&armed);
        server.register_callback(
            PacketKind::Data,
            callback(move |_, _| {
                if arm.fetch_add(1, Ordering::SeqCst) == 0 {
                    let hits = Arc::clone(&hits);
                    registry.register(
                        PacketKind::Data,
                        callback(move |_, _| {
                            hits.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }),
                    );
                }
                Ok(())
            }),
        );

        client.send_message(&Chat { text: "a".into() }, conn).unwrap();
        eventually(|| armed.load(Ordering::SeqCst) == 1).await;
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);

        client.send_message(&Chat { text: "b".into() }, conn).unwrap();
        eventually(|| late_hits.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn test_connect_packet_on_open_connection_has_no_branch() {
        let hub = MemoryHub::new();
        let (server, client, conn) = connected_pair(&hub).await;
        let kinds = Arc::new(Mutex::new(Vec::new()));

        let k = Arc::clone(&kinds);
        server.listeners().packet.add(callback(move |packet: &Packet, _| {
            k.lock().push(packet.kind());
            Ok(())
        }));
        let branch_hits = Arc::new(AtomicUsize::new(0));
        let b = Arc::clone(&branch_hits);
        server.listeners().data.add(callback(move |_: &DataPacket, _| {
            b.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        client.send(ConnectPacket::new("again"), conn).unwrap();

        eventually(|| !kinds.lock().is_empty()).await;
        assert_eq!(*kinds.lock(), vec![PacketKind::Connect]);
        assert_eq!(branch_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_frame_denies_connection_without_dispatch() {
        let hub = MemoryHub::new();
        let (server, _client, _conn) = connected_pair(&hub).await;
        let mut errors = server.subscribe_errors();
        let dispatched = Arc::new(AtomicUsize::new(0));
        for kind in PacketKind::ALL {
            let d = Arc::clone(&dispatched);
            server.register_callback(
                kind,
                callback(move |_, _| {
                    d.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
        }

        let (probe, mut events) = raw_endpoint(&hub, 7);
        let hail = encode_packet(&Packet::Connect(server.hail())).unwrap();
        let conn = probe.connect(addr(1), hail).unwrap();
        assert_eq!(settled_status(&mut events).await.0, ConnectionStatus::Connected);

        probe
            .send(vec![0x00, 0x01, 0xff], conn.into(), DeliveryOptions::default())
            .unwrap();

        let (status, reason) = settled_status(&mut events).await;
        assert_eq!(status, ConnectionStatus::Disconnected);
        let reason = reason.unwrap();
        assert!(reason.starts_with(DESERIALIZATION_DENY_PREFIX));
        assert!(reason.len() > DESERIALIZATION_DENY_PREFIX.len());

        assert!(matches!(
            within(errors.recv()).await.unwrap(),
            LocalError::Deserialization { .. }
        ));
        assert_eq!(dispatched.load(Ordering::SeqCst), 0);
        assert_eq!(server.stats().dispatch.deserialization_failures, 1);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let hub = MemoryHub::new();
        let (server, client, conn) = connected_pair(&hub).await;
        let limit = server.config().max_packet_size as usize;

        client
            .send(DataPacket::new("blob", vec![0u8; limit + 1]), conn)
            .unwrap();

        eventually(|| server.stats().dispatch.deserialization_failures == 1).await;
        eventually(|| client.connected().is_empty()).await;
    }
}
