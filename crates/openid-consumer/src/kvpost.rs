//! Direct requests to the OP
//!
//! Requests are form-encoded POSTs; responses are key-value form bodies.
//! A `400` response carries an OP error message, any other non-`200` status
//! is a transport failure. Targets are checked against the configured
//! [`SsrfPolicy`] and bodies larger than `max_response_size` are refused.

use crate::config::HttpConfig;
use crate::ssrf::SsrfPolicy;
use async_trait::async_trait;
use openid_message::{Field, Message};
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::{debug, warn};

/// Transport errors of a direct request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request could not be sent or the response not read
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The OP answered with a status other than 200 or 400
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The OP answered 400 with an error message
    #[error("OP error: {error}")]
    Server {
        /// `error` field of the response
        error: String,
        /// `error_code` field of the response, if any
        error_code: Option<String>,
    },

    /// The response body is not key-value form, or is too large
    #[error("invalid response body: {0}")]
    InvalidResponse(String),

    /// The target URL is refused by the outbound policy
    #[error("direct request target refused: {0}")]
    BlockedTarget(String),
}

/// Sends a message to an OP and returns its direct response
#[async_trait]
pub trait KvPoster: Send + Sync {
    /// POST `request` to `server_url`
    async fn post(&self, request: &Message, server_url: &str) -> Result<Message, TransportError>;
}

/// [`KvPoster`] over HTTP
#[derive(Clone)]
pub struct HttpKvPoster {
    client: reqwest::Client,
    max_response_size: usize,
    ssrf: SsrfPolicy,
}

impl std::fmt::Debug for HttpKvPoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpKvPoster")
            .field("client", &"<reqwest::Client>")
            .field("max_response_size", &self.max_response_size)
            .field("ssrf", &self.ssrf)
            .finish()
    }
}

impl HttpKvPoster {
    /// Create a poster from HTTP settings
    ///
    /// Redirects are not followed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the client cannot be built.
    pub fn new(config: &HttpConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_response_size: config.max_response_size,
            ssrf: config.ssrf.clone(),
        })
    }

    /// Wrap an existing client, applying the limits of `config`
    ///
    /// The client should not follow redirects.
    pub fn from_client(client: reqwest::Client, config: &HttpConfig) -> Self {
        Self {
            client,
            max_response_size: config.max_response_size,
            ssrf: config.ssrf.clone(),
        }
    }

    async fn read_body(&self, mut response: reqwest::Response) -> Result<String, TransportError> {
        let limit = self.max_response_size;
        if let Some(content_length) = response.content_length()
            && content_length > limit as u64
        {
            return Err(TransportError::InvalidResponse(format!(
                "response of {content_length} bytes exceeds limit of {limit} bytes"
            )));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TransportError::Http(format!("Failed to read response: {e}")))?
        {
            if body.len() + chunk.len() > limit {
                return Err(TransportError::InvalidResponse(format!(
                    "response exceeds limit of {limit} bytes"
                )));
            }
            body.extend_from_slice(&chunk);
        }

        String::from_utf8(body)
            .map_err(|_| TransportError::InvalidResponse("response is not UTF-8".to_string()))
    }
}

#[async_trait]
impl KvPoster for HttpKvPoster {
    async fn post(&self, request: &Message, server_url: &str) -> Result<Message, TransportError> {
        self.ssrf
            .validate_url(server_url)
            .await
            .map_err(|e| TransportError::BlockedTarget(e.to_string()))?;
        debug!(server_url = server_url, "Sending direct request");

        let response = self
            .client
            .post(server_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(request.to_url_encoded())
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let body = self.read_body(response).await?;

        match status {
            200 => Message::from_kv_form(&body)
                .map_err(|e| TransportError::InvalidResponse(e.to_string())),
            400 => {
                let message = Message::from_kv_form(&body)
                    .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
                let error = message.get(Field::Error).unwrap_or("").to_string();
                warn!(server_url = server_url, error = %error, "OP returned an error response");
                Err(TransportError::Server {
                    error,
                    error_code: message.get(Field::ErrorCode).map(str::to_string),
                })
            }
            other => Err(TransportError::Status(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(HttpKvPoster::new(&HttpConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_internal_target_refused_before_sending() {
        let poster = HttpKvPoster::new(&HttpConfig::default()).unwrap();
        let err = poster
            .post(&Message::new(openid_message::ProtocolVersion::OpenId2), "http://169.254.169.254/")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::BlockedTarget(ref reason) if reason.contains("169.254.169.254")));
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::Server {
            error: "bad handle".to_string(),
            error_code: None,
        };
        assert_eq!(err.to_string(), "OP error: bad handle");
        assert_eq!(TransportError::Status(503).to_string(), "unexpected HTTP status 503");
    }
}
