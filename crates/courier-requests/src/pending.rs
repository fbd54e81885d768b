//! # Pending Responses
//!
//! Typed, awaitable view of one registered request.

use crate::completion::CompletionCell;
use crate::error::RequestError;
use crate::handle::ExpiredRequest;
use courier_types::{Message, RequestId, ResponsePacket};
use futures::future::BoxFuture;
use std::future::IntoFuture;
use std::marker::PhantomData;
use std::sync::Arc;

/// How a registered request finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Response(ResponsePacket),
    TimedOut(ExpiredRequest),
}

/// Resolves to the decoded response `R`, or why there is none.
///
/// Dropping it abandons the wait only; the registry still finishes and removes
/// the request on its own.
#[must_use = "a pending response does nothing unless awaited"]
pub struct PendingResponse<R> {
    id: RequestId,
    cell: Arc<CompletionCell<RequestOutcome>>,
    _response: PhantomData<fn() -> R>,
}

impl<R: Message> PendingResponse<R> {
    pub(crate) fn new(id: RequestId, cell: Arc<CompletionCell<RequestOutcome>>) -> Self {
        Self {
            id,
            cell,
            _response: PhantomData,
        }
    }

    /// Identifier the request was sent with.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Whether the request already reached a terminal state.
    pub fn is_resolved(&self) -> bool {
        self.cell.is_complete()
    }

    /// The raw outcome, if already available.
    pub fn outcome(&self) -> Option<&RequestOutcome> {
        self.cell.get()
    }

    /// Wait for the outcome and decode it.
    pub async fn wait(self) -> Result<R, RequestError> {
        match self.cell.wait().await {
            RequestOutcome::Response(response) => Ok(response.decode::<R>()?),
            RequestOutcome::TimedOut(expired) => Err(RequestError::TimedOut {
                id: expired.id,
                waited: expired.waited,
            }),
        }
    }
}

impl<R: Message> IntoFuture for PendingResponse<R> {
    type Output = Result<R, RequestError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl<R> std::fmt::Debug for PendingResponse<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("id", &self.id)
            .field("resolved", &self.cell.is_complete())
            .finish()
    }
}
