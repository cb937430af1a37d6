//! HTTP client for the dashboard backend
//!
//! Wraps reqwest::Client with the backend base URL and attaches the stored
//! eBay token to inventory calls.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionContext;

/// Envelope every backend endpoint answers with.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

impl<T> ApiResponse<T> {
    /// Payload of a successful response.
    pub fn into_data(self) -> Option<T> {
        if self.success {
            self.data
        } else {
            None
        }
    }

    /// Best human-readable description of a failed response.
    pub fn failure_message(&self) -> Option<String> {
        self.errors
            .iter()
            .find_map(|e| e.message.clone())
            .or_else(|| self.message.clone())
    }

    pub fn has_error_id(&self, error_id: i64) -> bool {
        self.errors.iter().any(|e| e.error_id == error_id)
    }
}

#[cfg(test)]
impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: Vec::new(),
        }
    }

    pub fn failed(message: &str) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.to_string()),
            errors: Vec::new(),
        }
    }

    pub fn with_error_id(error_id: i64) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            errors: vec![ErrorDetail {
                error_id,
                message: None,
            }],
        }
    }
}

/// One entry of the upstream `errors` array.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "errorId")]
    pub error_id: i64,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("401 Unauthorized for {url}")]
    Unauthorized { url: String },
    #[error("HTTP {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("invalid response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Authenticated client for the dashboard backend.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base: String,
    session: SessionContext,
}

impl BackendClient {
    pub fn new(base: &str, session: SessionContext) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Stored eBay token, attached to every inventory request as-is. Expiry
    /// is the server's call.
    fn ebay_bearer(&self) -> Option<String> {
        self.session.tokens().read().map(|record| record.value)
    }

    /// GET without credentials.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);
        let resp = self.http.get(&url).send().await;
        decode(resp, &url).await
    }

    /// POST a JSON body without credentials.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        tracing::debug!("POST {}", url);
        let resp = self.http.post(&url).json(body).send().await;
        decode(resp, &url).await
    }

    /// GET with the stored eBay token as bearer credential.
    pub async fn ebay_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        tracing::debug!("eBay GET {}", url);
        let mut req = self.http.get(&url);
        if let Some(token) = self.ebay_bearer() {
            req = req.bearer_auth(token);
        }
        decode(req.send().await, &url).await
    }
}

/// Check the HTTP status and decode the JSON body.
async fn decode<T: DeserializeOwned>(
    resp: Result<reqwest::Response, reqwest::Error>,
    url: &str,
) -> Result<T, ApiError> {
    let resp = resp.map_err(|e| ApiError::Transport {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized {
            url: url.to_string(),
        });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        });
    }

    resp.json().await.map_err(|e| ApiError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}
