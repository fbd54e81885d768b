//! # Courier Demo Node
//!
//! Runs a server and a client peer on one in-memory hub and walks through the
//! request/response lifecycle:
//!
//! 1. The client connects with the configured app identifier as credential.
//! 2. Ping requests are answered by a typed `serve` handler.
//! 3. A request nobody answers times out.
//! 4. A hail with the wrong credential is refused with a reason.
//! 5. A raw endpoint sends a garbage frame and gets its connection dropped.
//!
//! Configuration comes from `COURIER_*` environment variables, logging from
//! `RUST_LOG` (default `info`).

mod protocol;

use anyhow::{bail, Context, Result};
use courier_bus::callback;
use courier_peer::{
    ConnectionStatus, CredentialAuthenticator, MemoryHub, Peer, PeerBuilder, PeerConfig,
    PeerError, StatusChange, Transport, TransportEvent,
};
use courier_requests::RequestError;
use courier_types::{encode_packet, ConnectPacket, ConnectionId, Packet, RequestPacket};
use protocol::{Chat, Ping, Pong, Uptime, UptimeReport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_stream::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SERVER_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 9050);
const CLIENT_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 9051);
const INTRUDER_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 9052);
const PROBE_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 9053);

const PING_COUNT: u32 = 3;

fn init_logging() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install subscriber: {e}"))
}

/// Bind `address`, build the peer and spawn its event loop.
fn spawn_peer(
    hub: &MemoryHub,
    address: SocketAddr,
    config: PeerConfig,
    customize: impl FnOnce(PeerBuilder) -> PeerBuilder,
) -> Result<Arc<Peer>> {
    let (transport, events) = hub
        .bind(address)
        .with_context(|| format!("Failed to bind {address}"))?;
    let peer = Arc::new(customize(Peer::builder(config, transport)).build()?);
    peer.start()?;

    let runner = Arc::clone(&peer);
    tokio::spawn(async move { runner.run(events).await });
    Ok(peer)
}

fn start_server(hub: &MemoryHub, config: &PeerConfig) -> Result<Arc<Peer>> {
    let secret = config.app_identifier.clone();
    let server = spawn_peer(hub, SERVER_ADDR.into(), config.clone(), |builder| {
        builder.authenticator(CredentialAuthenticator::new(secret))
    })?;

    server.serve(|ping: Ping, origin| {
        info!(seq = ping.seq, from = %origin, "[server] ping");
        Ok(Pong { seq: ping.seq })
    });

    server.on_data_message(|chat: Chat, origin| {
        info!(from = %chat.from, via = %origin, text = %chat.text, "[server] chat");
        Ok(())
    });

    let errors = server.error_stream();
    tokio::spawn(async move {
        tokio::pin!(errors);
        while let Some(error) = errors.next().await {
            info!(error = %error, "[server] local error observed");
        }
    });

    Ok(server)
}

async fn ping_pong(client: &Peer, connection: ConnectionId) -> Result<()> {
    for seq in 1..=PING_COUNT {
        let started = Instant::now();
        let pong: Pong = client.request_message(&Ping { seq }, connection)?.await?;
        info!(
            seq = pong.seq,
            rtt_us = started.elapsed().as_micros() as u64,
            "[client] pong"
        );
    }
    Ok(())
}

async fn unanswered_request(client: &Peer, connection: ConnectionId) -> Result<()> {
    let request = RequestPacket::from_message(&Uptime)?;
    let timeout = Duration::from_millis(250);
    let pending = client.request_with_timeout::<UptimeReport>(request, connection, timeout)?;

    match pending.await {
        Err(RequestError::TimedOut { id, waited }) => {
            info!(
                request_id = %id,
                waited_ms = waited.as_millis() as u64,
                "[client] request timed out"
            );
            Ok(())
        }
        Ok(report) => bail!("unexpected uptime answer: {report:?}"),
        Err(other) => Err(other.into()),
    }
}

async fn refused_intruder(hub: &MemoryHub, config: &PeerConfig) -> Result<()> {
    let intruder = spawn_peer(hub, INTRUDER_ADDR.into(), config.clone(), |builder| builder)?;
    match intruder
        .connect(SERVER_ADDR.into(), &ConnectPacket::new("guessed-secret"))
        .await
    {
        Err(PeerError::ConnectionRefused { reason, .. }) => {
            info!(reason = %reason, "[intruder] connection refused");
            Ok(())
        }
        Ok(connection) => bail!("intruder was let in on {connection}"),
        Err(other) => Err(other.into()),
    }
}

/// Connect with a raw endpoint and send a frame that does not deserialize.
async fn malformed_frame(hub: &MemoryHub, config: &PeerConfig) -> Result<()> {
    let (probe, mut events) = hub.bind(PROBE_ADDR.into())?;
    let hail = encode_packet(&Packet::Connect(ConnectPacket::new(
        config.app_identifier.clone(),
    )))?;
    let connection = probe.connect(SERVER_ADDR.into(), hail)?;

    let mut sent = false;
    while let Some(event) = events.next().await {
        if let TransportEvent::StatusChanged { status, reason, .. } = event {
            match status {
                ConnectionStatus::Connected if !sent => {
                    probe.send(vec![0xba, 0xad], connection.into(), config.delivery_options())?;
                    sent = true;
                }
                ConnectionStatus::Disconnected => {
                    info!(
                        reason = reason.as_deref().unwrap_or("-"),
                        "[probe] dropped after garbage frame"
                    );
                    probe.close();
                    return Ok(());
                }
                _ => {}
            }
        }
    }
    bail!("probe event stream ended before the connection was dropped")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config = PeerConfig::from_env();
    config.validate().context("Invalid COURIER_* configuration")?;
    info!(
        app = %config.app_identifier,
        request_timeout_ms = config.request_timeout.as_millis() as u64,
        delivery = %config.delivery_method,
        "Starting Courier demo"
    );

    let hub = MemoryHub::new();
    let server = start_server(&hub, &config)?;
    let client = spawn_peer(&hub, CLIENT_ADDR.into(), config.clone(), |builder| builder)?;

    client
        .listeners()
        .status
        .add(callback(|change: &StatusChange, _| {
            info!(
                connection = %change.connection,
                status = %change.status,
                reason = change.reason.as_deref().unwrap_or("-"),
                "[client] status"
            );
            Ok(())
        }));

    let connection = client
        .connect(SERVER_ADDR.into(), &client.hail())
        .await
        .context("Client could not connect")?;

    ping_pong(&client, connection).await?;
    client.send_message(
        &Chat {
            from: "client".into(),
            text: "hello from the demo".into(),
        },
        connection,
    )?;
    unanswered_request(&client, connection).await?;
    refused_intruder(&hub, &config).await?;
    malformed_frame(&hub, &config).await?;

    for (name, peer) in [("server", &server), ("client", &client)] {
        let stats = peer.stats();
        info!(
            peer = name,
            received = stats.dispatch.messages_received,
            dispatched = stats.dispatch.packets_dispatched,
            completed = stats.requests.completed,
            timed_out = stats.requests.timed_out,
            denied = stats.dispatch.connections_denied,
            connections = stats.connections,
            "Stats"
        );
    }

    if let Err(e) = client.disconnect(connection, "demo finished") {
        warn!(error = %e, "Disconnect failed");
    }

    info!("Demo complete; press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;
    server.stop();
    client.stop();
    Ok(())
}
