//! HTTP push of the sampler history to the collector

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::models::Sample;

/// Default request timeout for a push
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Path of the collector's receive endpoint, relative to its base URL
const RECEIVE_PATH: &str = "receive_data";

/// Failures of a single push; never fatal to the sampler
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid collector URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to collector failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("collector answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Delivers a snapshot of the sampler history
#[async_trait]
pub trait SampleTransport: Send + Sync {
    /// Push the full newest-first history
    async fn push(&self, samples: &[Sample]) -> Result<(), TransportError>;
}

#[derive(Serialize)]
struct PushBody<'a> {
    pc_data: &'a [Sample],
}

/// `reqwest` client posting `{pc_data: [...]}` to `<base>/receive_data`
pub struct HttpPushClient {
    client: Client,
    receive_url: Url,
}

impl HttpPushClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;

        let receive_url = parse_base(base_url)?.join(RECEIVE_PATH).map_err(|source| {
            TransportError::InvalidUrl {
                url: base_url.to_string(),
                source,
            }
        })?;

        Ok(Self {
            client,
            receive_url,
        })
    }

    pub fn receive_url(&self) -> &Url {
        &self.receive_url
    }

    /// One-off POST to a dashboard so it is warm before the first push.
    /// Failures are logged and ignored.
    pub async fn warm_up(&self, dashboard_url: &str) {
        let url = match parse_base(dashboard_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Skipping dashboard warm-up");
                return;
            }
        };

        match self.client.post(url).send().await {
            Ok(response) => info!(
                url = %dashboard_url,
                status = response.status().as_u16(),
                "Dashboard warm-up sent"
            ),
            Err(e) => warn!(url = %dashboard_url, error = %e, "Dashboard warm-up failed"),
        }
    }
}

#[async_trait]
impl SampleTransport for HttpPushClient {
    async fn push(&self, samples: &[Sample]) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.receive_url.clone())
            .json(&PushBody { pc_data: samples })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(samples = samples.len(), "Pushed samples to collector");
        Ok(())
    }
}

/// Parse a base URL, adding the trailing slash `Url::join` needs to keep
/// the last path segment.
fn parse_base(raw: &str) -> Result<Url, TransportError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized).map_err(|source| TransportError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}
