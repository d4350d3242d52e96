//! Access tokens for the Compute API
//!
//! Either a fixed bearer token (handy for local runs and tests) or a token
//! fetched from the GCE metadata server, cached until shortly before it
//! expires.

use crate::error::GcpError;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before their advertised expiry.
const EXPIRY_SLACK_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: i64,
}

/// Token fetched from the metadata server
#[derive(Debug, Clone)]
pub struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Source of bearer tokens
pub enum TokenSource {
    Static(String),
    Metadata {
        client: Client,
        cached: Mutex<Option<CachedToken>>,
    },
}

impl TokenSource {
    pub fn fixed(token: impl Into<String>) -> Self {
        TokenSource::Static(token.into())
    }

    pub fn metadata(client: Client) -> Self {
        TokenSource::Metadata {
            client,
            cached: Mutex::new(None),
        }
    }

    /// Return a valid bearer token, refreshing from the metadata server if needed.
    pub async fn token(&self) -> Result<String, GcpError> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Metadata { client, cached } => {
                let mut guard = cached.lock().await;
                if let Some(token) = guard.as_ref() {
                    if token.expires_at > Utc::now() {
                        return Ok(token.value.clone());
                    }
                }

                debug!("Fetching access token from metadata server");
                let response = client
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(GcpError::Authentication(format!(
                        "metadata server returned {}: {}",
                        status, body
                    )));
                }
                let fetched: MetadataToken = response.json().await?;
                let lifetime = (fetched.expires_in - EXPIRY_SLACK_SECS).max(0);
                let token = CachedToken {
                    value: fetched.access_token,
                    expires_at: Utc::now() + Duration::seconds(lifetime),
                };
                let value = token.value.clone();
                *guard = Some(token);
                Ok(value)
            }
        }
    }
}
