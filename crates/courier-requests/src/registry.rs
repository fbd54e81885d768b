//! # Request Registry
//!
//! Maps request identifiers to pending handles.
//!
//! Flow:
//! 1. Caller registers a request and gets back the identified packet.
//! 2. Caller sends the packet.
//! 3. The dispatcher feeds inbound responses to [`RequestRegistry::handle_response`].
//! 4. The sweeper expires whatever is still pending past its deadline.

use crate::clock::{Clock, TokioClock};
use crate::completion::CompletionCell;
use crate::error::RequestError;
use crate::handle::{Callbacks, ExpiredRequest, RequestHandle, RequestState};
use crate::pending::{PendingResponse, RequestOutcome};
use crate::stats::{RequestStats, RequestStatsSnapshot};
use courier_types::{Message, RequestId, RequestIdGenerator, RequestPacket, ResponsePacket};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// What happened to an inbound response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseRouting {
    /// Matched a pending request; its success callback ran.
    Delivered,
    /// No pending request matched; the response was dropped.
    Unroutable,
}

pub struct RequestRegistry {
    pending: DashMap<RequestId, Arc<RequestHandle>>,
    ids: RequestIdGenerator,
    default_timeout: Duration,
    clock: Arc<dyn Clock>,
    stats: RequestStats,
}

impl RequestRegistry {
    /// Registry on tokio's clock.
    pub fn new(default_timeout: Duration) -> Self {
        Self::with_clock(default_timeout, Arc::new(TokioClock))
    }

    pub fn with_clock(default_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: DashMap::new(),
            ids: RequestIdGenerator::new(),
            default_timeout,
            clock,
            stats: RequestStats::default(),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Register `request` with the default timeout.
    ///
    /// See [`register_with_timeout`](Self::register_with_timeout).
    pub fn register<S, T>(
        &self,
        request: RequestPacket,
        on_response: S,
        on_timeout: T,
    ) -> Result<(RequestId, RequestPacket), RequestError>
    where
        S: FnOnce(ResponsePacket) + Send + 'static,
        T: FnOnce(ExpiredRequest) + Send + 'static,
    {
        self.register_with_timeout(request, self.default_timeout, on_response, on_timeout)
    }

    /// Register `request`, expiring `timeout` from now.
    ///
    /// A timeout too large to place on the clock never expires.
    ///
    /// An unidentified request gets the next free identifier. A caller-assigned
    /// identifier is kept, and rejected if it is still pending. Returns the
    /// identifier and the packet to send.
    pub fn register_with_timeout<S, T>(
        &self,
        request: RequestPacket,
        timeout: Duration,
        on_response: S,
        on_timeout: T,
    ) -> Result<(RequestId, RequestPacket), RequestError>
    where
        S: FnOnce(ResponsePacket) + Send + 'static,
        T: FnOnce(ExpiredRequest) + Send + 'static,
    {
        let assigned = request.identifier();
        let registered_at = self.clock.now();
        let mut callbacks = Some(Callbacks {
            on_response: Box::new(on_response),
            on_timeout: Box::new(on_timeout),
        });

        let id = loop {
            let id = assigned.unwrap_or_else(|| self.ids.next_id());
            match self.pending.entry(id) {
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(RequestHandle::new(
                        id,
                        request.response_type().clone(),
                        registered_at,
                        timeout,
                        callbacks.take(),
                    )));
                    break id;
                }
                Entry::Occupied(_) if assigned.is_some() => {
                    return Err(RequestError::DuplicateIdentifier { id });
                }
                Entry::Occupied(_) => continue,
            }
        };

        self.stats.record_registered();
        debug!(
            request_id = %id,
            packet_type = %request.packet_type(),
            response_type = %request.response_type(),
            timeout_ms = timeout.as_millis() as u64,
            "Registered pending request"
        );

        Ok((id, request.with_identifier(id)))
    }

    /// Register `request` and get an awaitable for its `R` response.
    ///
    /// Fails before registering anything if `R` is not the response type the
    /// request declares.
    pub fn register_pending<R: Message>(
        &self,
        request: RequestPacket,
        timeout: Option<Duration>,
    ) -> Result<(PendingResponse<R>, RequestPacket), RequestError> {
        if !request.response_type().is::<R>() {
            return Err(RequestError::ResponseTypeMismatch {
                requested: R::packet_type(),
                declared: request.response_type().clone(),
            });
        }

        let cell = Arc::new(CompletionCell::new());
        let on_response = {
            let cell = Arc::clone(&cell);
            move |response| {
                cell.complete(RequestOutcome::Response(response));
            }
        };
        let on_timeout = {
            let cell = Arc::clone(&cell);
            move |expired| {
                cell.complete(RequestOutcome::TimedOut(expired));
            }
        };

        let timeout = timeout.unwrap_or(self.default_timeout);
        let (id, packet) = self.register_with_timeout(request, timeout, on_response, on_timeout)?;
        Ok((PendingResponse::new(id, cell), packet))
    }

    /// Route an inbound response to its pending request.
    pub fn handle_response(&self, response: ResponsePacket) -> ResponseRouting {
        let id = response.correlation_id();
        let handle = self.pending.get(&id).map(|entry| Arc::clone(entry.value()));

        let Some(handle) = handle else {
            self.stats.record_unroutable();
            warn!(request_id = %id, "Response for unknown or expired request");
            return ResponseRouting::Unroutable;
        };

        if !handle.finish(RequestState::Completed) {
            self.stats.record_unroutable();
            debug!(
                request_id = %id,
                state = ?handle.state(),
                "Response lost the race to a terminal state"
            );
            return ResponseRouting::Unroutable;
        }

        self.remove_handle(&handle);
        self.stats.record_completed();
        debug!(request_id = %id, packet_type = %response.packet_type(), "Completed pending request");

        if let Some(callbacks) = handle.take_callbacks() {
            run_isolated(id, "response", || (callbacks.on_response)(response));
        }
        ResponseRouting::Delivered
    }

    /// Expire every pending request whose deadline has passed.
    ///
    /// Returns the number of requests this call timed out.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let candidates: Vec<Arc<RequestHandle>> = self
            .pending
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut expired = 0;
        for handle in candidates {
            if !handle.finish(RequestState::TimedOut) {
                continue;
            }

            self.remove_handle(&handle);
            self.stats.record_timed_out();
            expired += 1;

            let record = handle.expired(now);
            warn!(
                request_id = %record.id,
                response_type = %record.response_type,
                waited_ms = record.waited.as_millis() as u64,
                "Request timed out"
            );

            if let Some(callbacks) = handle.take_callbacks() {
                run_isolated(record.id, "timeout", || (callbacks.on_timeout)(record));
            }
        }

        expired
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval` on the
    /// current tokio runtime. The task ends once the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(sweep_task(registry, interval))
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> RequestStatsSnapshot {
        self.stats.snapshot()
    }

    fn remove_handle(&self, handle: &Arc<RequestHandle>) {
        self.pending
            .remove_if(&handle.id(), |_, current| Arc::ptr_eq(current, handle));
    }
}

async fn sweep_task(registry: Weak<RequestRegistry>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(registry) = registry.upgrade() else {
            debug!("Request registry dropped, sweeper stopping");
            break;
        };
        let expired = registry.sweep_expired();
        if expired > 0 {
            debug!(expired, "Swept expired requests");
        }
    }
}

fn run_isolated(id: RequestId, which: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(request_id = %id, callback = which, "Request callback panicked");
    }
}
