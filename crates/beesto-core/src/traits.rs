use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::agent::PhaseRequest;
use crate::streaming::EventStream;

/// A model-backed endpoint that answers one agent phase with an event stream.
#[async_trait]
pub trait PhaseEndpoint: Send + Sync {
    /// Returns the unique identifier for this endpoint.
    fn name(&self) -> &'static str;

    /// Sends a phase request and returns its decoded event stream.
    ///
    /// The stream ends early with [`crate::Error::Cancelled`] once `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Endpoint`] when the endpoint answers with a
    /// non-success status, or a transport error if the request cannot be sent.
    async fn request(
        &self,
        request: &PhaseRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream>;
}
