use async_trait::async_trait;
use reqwest::Client;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use beesto_core::config::EndpointConfig;
use beesto_core::{Error, EventStream, PhaseEndpoint, PhaseRequest, Result, decode_stream};

/// Longest slice of an error body written to the log.
const MAX_REASON_LEN: usize = 200;

/// Phase endpoint reached over HTTP.
///
/// Each phase is a `POST` of the JSON request body; the response is a `data:` event
/// stream decoded lazily as chunks arrive.
#[derive(Debug, Clone)]
pub struct HttpPhaseEndpoint {
    /// HTTP client for endpoint requests.
    client: Client,
    /// Endpoint URL.
    url: String,
}

impl HttpPhaseEndpoint {
    /// Creates an endpoint for `url` with a default client.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::default(),
            url: url.into(),
        }
    }

    /// Creates an endpoint from configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &EndpointConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PhaseEndpoint for HttpPhaseEndpoint {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn request(
        &self,
        request: &PhaseRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream> {
        debug!("POST {} phase={}", self.url, request.phase.as_str());
        let send = self.client.post(&self.url).json(request).send();
        let response = select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            response = send => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                body = response.text() => body.unwrap_or_default(),
            };
            let excerpt: String = body.trim().chars().take(MAX_REASON_LEN).collect();
            warn!("{} request returned {}: {}", request.phase, status, excerpt);
            return Err(Error::Endpoint {
                phase: request.phase,
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_owned(),
            });
        }

        Ok(decode_stream(response.bytes_stream(), cancel))
    }
}
