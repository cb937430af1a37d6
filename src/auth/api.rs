//! Backend endpoints for the eBay token lifecycle

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, ApiResponse, BackendClient};
use crate::session::SessionSignal;

/// Result of exchanging an authorization code.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangedTokens {
    #[serde(default)]
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

/// Token the backend already holds for a user.
#[derive(Debug, Clone, Deserialize)]
pub struct UserToken {
    #[serde(default)]
    pub access_token: String,
    pub expires_in_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedToken {
    #[serde(default)]
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn exchange_code(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<ApiResponse<ExchangedTokens>, ApiError>;

    async fn get_ebay_user_token(&self, user_id: &str)
        -> Result<ApiResponse<UserToken>, ApiError>;

    async fn refresh_ebay_user_token(
        &self,
        user_id: &str,
    ) -> Result<ApiResponse<RefreshedToken>, ApiError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeRequest<'a> {
    code: &'a str,
    user_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    user_id: &'a str,
}

pub struct HttpAuthApi {
    client: BackendClient,
}

impl HttpAuthApi {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    /// A 401 from an auth endpoint means the seller's own session is gone.
    fn observe<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(ApiError::Unauthorized { url }) = &result {
            tracing::warn!("Session rejected by {}", url);
            self.client
                .session()
                .broadcast(SessionSignal::AuthenticationFailed);
        }
        result
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn exchange_code(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<ApiResponse<ExchangedTokens>, ApiError> {
        let body = ExchangeRequest { code, user_id };
        let result = self.client.post("/auth/ebay/exchange-code", &body).await;
        self.observe(result)
    }

    async fn get_ebay_user_token(
        &self,
        user_id: &str,
    ) -> Result<ApiResponse<UserToken>, ApiError> {
        let path = format!("/auth/ebay/user-token/{}", user_id);
        let result = self.client.get(&path).await;
        self.observe(result)
    }

    async fn refresh_ebay_user_token(
        &self,
        user_id: &str,
    ) -> Result<ApiResponse<RefreshedToken>, ApiError> {
        let body = RefreshRequest { user_id };
        let result = self.client.post("/auth/ebay/refresh-token", &body).await;
        self.observe(result)
    }
}
