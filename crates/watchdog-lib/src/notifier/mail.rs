//! Mail transport through an HTTP mail relay

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors raised while handing a message to the relay
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid mail relay endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("mail relay request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mail relay answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound mail delivery
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// JSON document posted to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Posts [`MailMessage`] documents to a relay endpoint
pub struct HttpMailRelay {
    client: Client,
    endpoint: Url,
    from: String,
    to: String,
}

impl HttpMailRelay {
    pub fn new(
        endpoint: &str,
        from: impl Into<String>,
        to: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let endpoint = Url::parse(endpoint).map_err(|source| NotifyError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            source,
        })?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            from: from.into(),
            to: to.into(),
        })
    }
}

#[async_trait]
impl MailTransport for HttpMailRelay {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let message = MailMessage {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: subject.to_string(),
            body: body.to_string(),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
