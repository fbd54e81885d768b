//! # Request Handles
//!
//! One handle per outstanding request. The state byte is the single point of
//! truth for who finishes the request: whichever side wins the
//! `Pending → terminal` compare-and-swap owns the callbacks.

use courier_types::{PacketType, RequestId, ResponsePacket};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Runs once with the matching response.
pub type OnResponse = Box<dyn FnOnce(ResponsePacket) + Send + 'static>;

/// Runs once when the deadline passes first.
pub type OnTimeout = Box<dyn FnOnce(ExpiredRequest) + Send + 'static>;

/// Lifecycle of a request. Both non-pending states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestState {
    Pending = 0,
    Completed = 1,
    TimedOut = 2,
}

impl RequestState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => RequestState::Pending,
            1 => RequestState::Completed,
            _ => RequestState::TimedOut,
        }
    }
}

/// Handed to the timeout callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredRequest {
    pub id: RequestId,
    /// The response type the request was waiting for.
    pub response_type: PacketType,
    /// Time between registration and expiry.
    pub waited: Duration,
}

pub(crate) struct Callbacks {
    pub(crate) on_response: OnResponse,
    pub(crate) on_timeout: OnTimeout,
}

pub(crate) struct RequestHandle {
    id: RequestId,
    response_type: PacketType,
    registered_at: Instant,
    /// `None` when the timeout reaches past what `Instant` can represent.
    deadline: Option<Instant>,
    state: AtomicU8,
    callbacks: Mutex<Option<Callbacks>>,
}

impl RequestHandle {
    pub(crate) fn new(
        id: RequestId,
        response_type: PacketType,
        registered_at: Instant,
        timeout: Duration,
        callbacks: Option<Callbacks>,
    ) -> Self {
        Self {
            id,
            response_type,
            registered_at,
            deadline: registered_at.checked_add(timeout),
            state: AtomicU8::new(RequestState::Pending as u8),
            callbacks: Mutex::new(callbacks),
        }
    }

    pub(crate) fn id(&self) -> RequestId {
        self.id
    }

    pub(crate) fn state(&self) -> RequestState {
        RequestState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Move from `Pending` to `to`. Returns `false` if another side already
    /// finished the request.
    pub(crate) fn finish(&self, to: RequestState) -> bool {
        debug_assert_ne!(to, RequestState::Pending);
        self.state
            .compare_exchange(
                RequestState::Pending as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Take the callbacks; only the winner of [`finish`](Self::finish) calls this.
    pub(crate) fn take_callbacks(&self) -> Option<Callbacks> {
        self.callbacks.lock().take()
    }

    pub(crate) fn expired(&self, now: Instant) -> ExpiredRequest {
        ExpiredRequest {
            id: self.id,
            response_type: self.response_type.clone(),
            waited: now.saturating_duration_since(self.registered_at),
        }
    }
}
