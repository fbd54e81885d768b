//! # Peer
//!
//! The application-facing side of one endpoint: owns the dispatcher, the
//! request registry and the transport handle.
//!
//! ```ignore
//! let (transport, events) = hub.bind(addr)?;
//! let peer = Arc::new(Peer::new(PeerConfig::default(), transport)?);
//! peer.start()?;
//! tokio::spawn({ let peer = Arc::clone(&peer); async move { peer.run(events).await } });
//!
//! let conn = peer.connect(server_addr, &peer.hail()).await?;
//! let pong: Pong = peer.request_message(&Ping { seq: 1 }, conn)?.await?;
//! ```

use crate::config::{DeliveryOptions, PeerConfig};
use crate::connections::ConnectionState;
use crate::dispatcher::Dispatcher;
use crate::error::{PeerError, Result};
use crate::events::{ErrorChannel, LocalError};
use crate::listeners::PeerListeners;
use crate::metrics::DispatchStats;
use crate::ports::{
    Authenticator, BincodeDeserializer, ConnectionStatus, Destination, PacketDeserializer,
    StaticAuthenticator, Transport, TransportEvent,
};
use courier_bus::{callback, Callback, CallbackError, CallbackRegistry};
use courier_requests::{Clock, PendingResponse, RequestRegistry, RequestStatsSnapshot, TokioClock};
use courier_types::{
    encode_packet, ConnectPacket, ConnectionId, DataPacket, Message, Origin, Packet, PacketKind,
    RequestMessage, RequestPacket,
};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reason given to the remote when a connect attempt is abandoned.
pub const CONNECT_TIMEOUT_REASON: &str = "Connect timed out";

/// Combined counters of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerStats {
    pub dispatch: DispatchStats,
    pub requests: RequestStatsSnapshot,
    pub pending: usize,
    /// Connections connecting or connected right now.
    pub connections: usize,
}

pub struct PeerBuilder {
    config: PeerConfig,
    transport: Arc<dyn Transport>,
    deserializer: Option<Arc<dyn PacketDeserializer>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    clock: Option<Arc<dyn Clock>>,
}

impl PeerBuilder {
    pub fn new(config: PeerConfig, transport: impl Transport) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            deserializer: None,
            authenticator: None,
            clock: None,
        }
    }

    /// Replace the bincode deserializer.
    pub fn deserializer(mut self, deserializer: impl PacketDeserializer) -> Self {
        self.deserializer = Some(Arc::new(deserializer));
        self
    }

    /// Replace the accept-or-reject-all authenticator.
    pub fn authenticator(mut self, authenticator: impl Authenticator) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Time source for request deadlines.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Peer> {
        self.config.validate()?;

        let deserializer = self
            .deserializer
            .unwrap_or_else(|| Arc::new(BincodeDeserializer::new(self.config.max_packet_size)));
        let authenticator = self
            .authenticator
            .unwrap_or_else(|| Arc::new(StaticAuthenticator::new(self.config.accept_by_default)));
        let clock = self.clock.unwrap_or_else(|| Arc::new(TokioClock));

        let requests = Arc::new(RequestRegistry::with_clock(
            self.config.request_timeout,
            clock,
        ));
        let errors = ErrorChannel::new(self.config.error_channel_capacity);
        let dispatcher = Dispatcher::new(deserializer, authenticator, requests, errors);

        Ok(Peer {
            config: self.config,
            transport: self.transport,
            dispatcher: Arc::new(dispatcher),
            sweeper: Mutex::new(None),
        })
    }
}

pub struct Peer {
    config: PeerConfig,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Peer {
    /// Peer with the default deserializer, authenticator and clock.
    pub fn new(config: PeerConfig, transport: impl Transport) -> Result<Self> {
        PeerBuilder::new(config, transport).build()
    }

    pub fn builder(config: PeerConfig, transport: impl Transport) -> PeerBuilder {
        PeerBuilder::new(config, transport)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Start the timeout sweeper. Idempotent.
    pub fn start(&self) -> Result<()> {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return Ok(());
        }
        tokio::runtime::Handle::try_current().map_err(|_| PeerError::NoRuntime)?;

        *sweeper = Some(
            self.dispatcher
                .requests()
                .spawn_sweeper(self.config.sweep_interval),
        );
        info!(
            address = %self.transport.local_address(),
            app = %self.config.app_identifier,
            "Peer started"
        );
        Ok(())
    }

    /// Stop the sweeper. Pending requests stay pending until started again.
    pub fn stop(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
            info!(address = %self.transport.local_address(), "Peer stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Dispatch every event of `events` until the stream ends.
    pub async fn run<S>(&self, events: S)
    where
        S: Stream<Item = TransportEvent>,
    {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            self.dispatcher.handle_event(event);
        }
        debug!(address = %self.transport.local_address(), "Transport event stream ended");
    }

    /// Dispatch one event.
    pub fn handle_event(&self, event: TransportEvent) {
        self.dispatcher.handle_event(event);
    }

    // =========================================================================
    // SENDING
    // =========================================================================

    /// Send with the configured delivery options.
    pub fn send(&self, packet: impl Into<Packet>, destination: impl Into<Destination>) -> Result<()> {
        self.send_with(packet, destination, self.config.delivery_options())
    }

    pub fn send_with(
        &self,
        packet: impl Into<Packet>,
        destination: impl Into<Destination>,
        options: DeliveryOptions,
    ) -> Result<()> {
        let packet = packet.into();
        let frame = encode_packet(&packet)?;
        self.transport
            .send(frame, destination.into(), options)
            .map_err(PeerError::from)
    }

    /// Wrap `message` in a data packet and send it.
    pub fn send_message<M: Message>(
        &self,
        message: &M,
        destination: impl Into<Destination>,
    ) -> Result<()> {
        self.send(DataPacket::from_message(message)?, destination)
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    /// Register `request` and send it. Await the result for the `R` response.
    ///
    /// If the send fails the error is returned and the registered request is
    /// left to expire.
    pub fn request<R: Message>(
        &self,
        request: RequestPacket,
        destination: impl Into<Destination>,
    ) -> Result<PendingResponse<R>> {
        self.send_request(request, destination.into(), None)
    }

    pub fn request_with_timeout<R: Message>(
        &self,
        request: RequestPacket,
        destination: impl Into<Destination>,
        timeout: Duration,
    ) -> Result<PendingResponse<R>> {
        self.send_request(request, destination.into(), Some(timeout))
    }

    /// Send a typed request; the response type comes from `Q::Response`.
    pub fn request_message<Q: RequestMessage>(
        &self,
        message: &Q,
        destination: impl Into<Destination>,
    ) -> Result<PendingResponse<Q::Response>> {
        let request = RequestPacket::from_message(message)?;
        self.send_request(request, destination.into(), None)
    }

    fn send_request<R: Message>(
        &self,
        request: RequestPacket,
        destination: Destination,
        timeout: Option<Duration>,
    ) -> Result<PendingResponse<R>> {
        let (pending, packet) = self
            .dispatcher
            .requests()
            .register_pending::<R>(request, timeout)?;
        let frame = encode_packet(&Packet::Request(packet))?;

        if let Err(error) = self
            .transport
            .send(frame, destination, self.config.delivery_options())
        {
            warn!(
                request_id = %pending.id(),
                destination = %destination,
                error = %error,
                "Request send failed; it will time out"
            );
            return Err(error.into());
        }

        debug!(request_id = %pending.id(), destination = %destination, "Request sent");
        Ok(pending)
    }

    // =========================================================================
    // CONNECTIONS
    // =========================================================================

    /// The connect packet built from the configured application identifier.
    pub fn hail(&self) -> ConnectPacket {
        ConnectPacket::new(self.config.app_identifier.clone())
    }

    /// Connect to `address` and wait for the remote's verdict.
    ///
    /// Requires [`run`](Self::run) to be processing this peer's events.
    pub async fn connect(&self, address: SocketAddr, hail: &ConnectPacket) -> Result<ConnectionId> {
        let frame = encode_packet(&Packet::Connect(hail.clone()))?;
        let id = self.transport.connect(address, frame)?;
        debug!(connection = %id, remote = %address, "Connecting");
        self.await_connection(id, self.config.connect_timeout).await
    }

    /// Wait up to `timeout` for `id` to be approved.
    ///
    /// On timeout the attempt is abandoned.
    pub async fn await_connection(&self, id: ConnectionId, timeout: Duration) -> Result<ConnectionId> {
        match self.dispatcher.connections().wait_settled(id, timeout).await {
            Some(ConnectionState {
                status: ConnectionStatus::Connected,
                ..
            }) => {
                info!(connection = %id, "Connected");
                Ok(id)
            }
            Some(state) => Err(PeerError::ConnectionRefused {
                connection: id,
                reason: state
                    .reason
                    .unwrap_or_else(|| "connection closed".to_string()),
            }),
            None => {
                if let Err(error) = self.transport.disconnect(id, CONNECT_TIMEOUT_REASON) {
                    debug!(connection = %id, error = %error, "Abandoned attempt already gone");
                }
                Err(PeerError::ConnectTimeout {
                    connection: id,
                    waited: timeout,
                })
            }
        }
    }

    pub fn disconnect(&self, connection: ConnectionId, reason: &str) -> Result<()> {
        self.transport
            .disconnect(connection, reason)
            .map_err(PeerError::from)
    }

    pub fn connection_status(&self, connection: ConnectionId) -> Option<ConnectionStatus> {
        self.dispatcher.connections().status(connection)
    }

    pub fn connected(&self) -> Vec<ConnectionId> {
        self.dispatcher.connections().connected()
    }

    // =========================================================================
    // CALLBACKS
    // =========================================================================

    /// Register `callback` for every packet of `kind`.
    pub fn register_callback(&self, kind: PacketKind, callback: Callback<Packet>) {
        self.dispatcher.callbacks().register(kind, callback);
    }

    pub fn unregister_callback(&self, kind: PacketKind, callback: &Callback<Packet>) -> bool {
        self.dispatcher.callbacks().unregister(kind, callback)
    }

    /// Call `handler` with every data packet carrying an `M`.
    ///
    /// Returns the registered callback so it can be removed from
    /// `listeners().data`.
    pub fn on_data_message<M, F>(&self, handler: F) -> Callback<DataPacket>
    where
        M: Message,
        F: Fn(M, &Origin) -> std::result::Result<(), CallbackError> + Send + Sync + 'static,
    {
        let cb = callback(move |data: &DataPacket, origin: &Origin| {
            if !data.packet_type().is::<M>() {
                return Ok(());
            }
            let message = data.decode::<M>().map_err(CallbackError::failed)?;
            handler(message, origin)
        });
        self.dispatcher.listeners().data.add(Arc::clone(&cb));
        cb
    }

    /// Answer every `Q` request with whatever `handler` returns.
    ///
    /// The reply goes back to the request's origin with the configured
    /// delivery options.
    pub fn serve<Q, F>(&self, handler: F) -> Callback<RequestPacket>
    where
        Q: RequestMessage,
        F: Fn(Q, &Origin) -> std::result::Result<Q::Response, CallbackError>
            + Send
            + Sync
            + 'static,
    {
        let transport = Arc::clone(&self.transport);
        let options = self.config.delivery_options();

        let cb = callback(move |request: &RequestPacket, origin: &Origin| {
            if !request.packet_type().is::<Q>() {
                return Ok(());
            }
            let message = request.decode::<Q>().map_err(CallbackError::failed)?;
            let reply = handler(message, origin)?;
            let response = request.respond_with(&reply).map_err(CallbackError::failed)?;
            let frame = encode_packet(&Packet::Response(response)).map_err(CallbackError::failed)?;
            transport
                .send(frame, Destination::from(*origin), options)
                .map_err(CallbackError::failed)
        });
        self.dispatcher.listeners().request.add(Arc::clone(&cb));
        cb
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn local_address(&self) -> SocketAddr {
        self.transport.local_address()
    }

    pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
        self.dispatcher.callbacks()
    }

    pub fn listeners(&self) -> &Arc<PeerListeners> {
        self.dispatcher.listeners()
    }

    pub fn requests(&self) -> &Arc<RequestRegistry> {
        self.dispatcher.requests()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn errors(&self) -> &ErrorChannel {
        self.dispatcher.errors()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<LocalError> {
        self.dispatcher.errors().subscribe()
    }

    pub fn error_stream(&self) -> impl Stream<Item = LocalError> + Send + 'static {
        self.dispatcher.errors().stream()
    }

    pub fn stats(&self) -> PeerStats {
        PeerStats {
            dispatch: self.dispatcher.metrics().snapshot(),
            requests: self.dispatcher.requests().stats(),
            pending: self.dispatcher.requests().pending_count(),
            connections: self.dispatcher.connections().len(),
        }
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.abort();
        }
    }
}
