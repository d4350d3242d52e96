//! Common utilities for the Compute API client
//!
//! Shared request plumbing: bearer auth, status-to-error mapping and
//! long-running operation waits.

use crate::auth::TokenSource;
use crate::error::GcpError;
use crate::models::{GoogleErrorResponse, Operation};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Upper bound on `wait` round-trips for a single operation.
const MAX_OPERATION_WAITS: usize = 30;

/// Per-request timeout of `operations/.../wait`.
///
/// The API holds the call open for up to two minutes, longer than the
/// client's default timeout.
pub const OPERATION_WAIT_TIMEOUT: Duration = Duration::from_secs(150);

/// HTTP client wrapper with authentication
pub struct HttpClient {
    client: Client,
    base_url: String,
    tokens: TokenSource,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, tokens: TokenSource) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    async fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, GcpError> {
        let token = self.tokens.token().await?;
        Ok(builder
            .bearer_auth(token)
            .header("Accept", "application/json"))
    }

    /// Make a GET request
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, GcpError> {
        let url = self.build_url(path);
        debug!("GET {}", url);

        let response = self.authorized(self.client.get(&url)).await?.send().await?;
        Self::decode(path, response).await
    }

    /// Make a POST request
    pub async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, GcpError> {
        let url = self.build_url(path);
        debug!("POST {} with body: {}", url, body);

        let response = self
            .authorized(self.client.post(&url))
            .await?
            .json(body)
            .send()
            .await?;
        Self::decode(path, response).await
    }

    /// Make a PATCH request
    pub async fn patch<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, GcpError> {
        let url = self.build_url(path);
        debug!("PATCH {} with body: {}", url, body);

        let response = self
            .authorized(self.client.patch(&url))
            .await?
            .json(body)
            .send()
            .await?;
        Self::decode(path, response).await
    }

    /// Make a DELETE request
    pub async fn delete<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, GcpError> {
        let url = self.build_url(path);
        debug!("DELETE {}", url);

        let response = self.authorized(self.client.delete(&url)).await?.send().await?;
        Self::decode(path, response).await
    }

    /// Block until `operation` is DONE, surfacing any operation error.
    pub async fn wait_for_operation(&self, mut operation: Operation) -> Result<(), GcpError> {
        let mut waits = 0;
        while !operation.is_done() {
            if waits >= MAX_OPERATION_WAITS {
                return Err(GcpError::Operation {
                    operation: operation.name,
                    message: "gave up waiting for completion".to_string(),
                });
            }
            waits += 1;
            let self_link = operation.self_link.clone().ok_or_else(|| GcpError::Operation {
                operation: operation.name.clone(),
                message: "operation has no selfLink".to_string(),
            })?;
            debug!("Waiting on operation {}", operation.name);
            let path = format!("{}/wait", self_link);
            let response = self
                .authorized(self.wait_request(&path))
                .await?
                .send()
                .await?;
            operation = Self::decode(&path, response).await?;
        }

        operation_result(operation)
    }

    fn wait_request(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.build_url(path))
            .timeout(OPERATION_WAIT_TIMEOUT)
            .json(&serde_json::json!({}))
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, GcpError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(path, status, &body));
        }
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(GcpError::Serialization)
    }
}

/// Map a failed HTTP response to an error, preferring the Google error message.
pub fn error_for_status(path: &str, status: StatusCode, body: &str) -> GcpError {
    let message = serde_json::from_str::<GoogleErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());
    match status.as_u16() {
        404 => GcpError::NotFound(format!("{}: {}", path, message)),
        409 => GcpError::AlreadyExists(format!("{}: {}", path, message)),
        401 | 403 => GcpError::Authentication(format!("{}: {}", path, message)),
        code => GcpError::Api {
            status: code,
            message: format!("{}: {}", path, message),
        },
    }
}

/// Turn a finished operation into a result, keeping NotFound/AlreadyExists distinguishable.
pub fn operation_result(operation: Operation) -> Result<(), GcpError> {
    let Some(error) = operation.error else {
        return Ok(());
    };
    let message = error
        .errors
        .iter()
        .filter_map(|e| e.message.as_deref())
        .collect::<Vec<_>>()
        .join("; ");
    let first_code = error.errors.first().and_then(|e| e.code.as_deref());
    match (operation.http_error_status_code, first_code) {
        (Some(404), _) | (_, Some("RESOURCE_NOT_FOUND")) => Err(GcpError::NotFound(message)),
        (Some(409), _) | (_, Some("RESOURCE_ALREADY_EXISTS")) => {
            Err(GcpError::AlreadyExists(message))
        }
        _ => Err(GcpError::Operation {
            operation: operation.name,
            message,
        }),
    }
}
