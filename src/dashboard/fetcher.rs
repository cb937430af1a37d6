//! Active listings fetch with refresh-on-token-invalid.

use std::sync::Arc;

use crate::api::{ApiError, ApiResponse, InventoryApi, ListingsPage};
use crate::auth::tokens::{AccessTokenRecord, DEFAULT_EXPIRES_IN_SECS};
use crate::auth::AuthApi;
use crate::session::{SessionContext, SessionSignal};

/// Upstream error id for an expired eBay user token.
pub const TOKEN_EXPIRED_ERROR_ID: i64 = 932;

const GENERIC_FAILURE: &str = "Failed to load listings";

/// How a fetch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Loaded(ListingsPage),
    /// The token was rejected and a refresh produced this new token. The
    /// caller retries by adopting it.
    Refreshed(String),
    /// The token was rejected and could not be refreshed. Stored tokens have
    /// been cleared unless a newer token replaced them meanwhile.
    Disconnected,
    Failed(String),
}

/// Response classification. A coded 932 and a transport 401 both mean the
/// token is no longer good.
#[derive(Debug)]
enum Classified {
    Loaded(ListingsPage),
    TokenInvalid,
    Failed(String),
}

fn classify(result: Result<ApiResponse<ListingsPage>, ApiError>) -> Classified {
    match result {
        Ok(resp) if resp.success => Classified::Loaded(resp.data.unwrap_or_default()),
        Ok(resp) if resp.has_error_id(TOKEN_EXPIRED_ERROR_ID) => Classified::TokenInvalid,
        Ok(resp) => Classified::Failed(
            resp.failure_message()
                .unwrap_or_else(|| GENERIC_FAILURE.to_string()),
        ),
        Err(ApiError::Unauthorized { .. }) => Classified::TokenInvalid,
        Err(e) => Classified::Failed(e.to_string()),
    }
}

#[derive(Clone)]
pub struct ListingsFetcher {
    session: SessionContext,
    auth: Arc<dyn AuthApi>,
    inventory: Arc<dyn InventoryApi>,
    page_size: u32,
}

impl ListingsFetcher {
    pub fn new(
        session: SessionContext,
        auth: Arc<dyn AuthApi>,
        inventory: Arc<dyn InventoryApi>,
        page_size: u32,
    ) -> Self {
        Self {
            session,
            auth,
            inventory,
            page_size,
        }
    }

    /// Fetch one page of active listings with `token` current.
    ///
    /// With `allow_refresh` unset a rejected token tears the connection
    /// down directly; the controller clears it for the fetch that follows a
    /// refresh so a token that keeps being rejected cannot loop. Stored
    /// tokens are only replaced or cleared while they still hold `token`.
    pub async fn fetch(
        &self,
        user_id: &str,
        token: &str,
        page: u32,
        allow_refresh: bool,
    ) -> FetchOutcome {
        let result = self
            .inventory
            .get_active_listings(page, self.page_size)
            .await;

        match classify(result) {
            Classified::Loaded(mut listings) => {
                if listings.page_size == 0 {
                    listings.page_size = self.page_size;
                }
                tracing::debug!("Loaded {} listings", listings.listings.len());
                FetchOutcome::Loaded(listings)
            }
            Classified::Failed(message) => {
                tracing::warn!("Listings fetch failed: {}", message);
                FetchOutcome::Failed(message)
            }
            Classified::TokenInvalid if allow_refresh => {
                tracing::info!("eBay token rejected, refreshing");
                match self.refresh(user_id, token).await {
                    Some(token) => FetchOutcome::Refreshed(token),
                    None => FetchOutcome::Disconnected,
                }
            }
            Classified::TokenInvalid => {
                tracing::warn!("Refreshed eBay token rejected as well");
                self.teardown(token);
                FetchOutcome::Disconnected
            }
        }
    }

    /// Mint a new access token from the stored refresh credential.
    ///
    /// On success the new record is persisted and the token returned. On any
    /// failure the stored tokens are cleared. Either only happens while the
    /// store still holds `stale`, the token that was rejected.
    pub async fn refresh(&self, user_id: &str, stale: &str) -> Option<String> {
        let data = match self.auth.refresh_ebay_user_token(user_id).await {
            Ok(resp) => resp.into_data().filter(|d| !d.access_token.is_empty()),
            Err(e) => {
                tracing::warn!("eBay token refresh failed: {}", e);
                None
            }
        };

        let Some(data) = data else {
            tracing::info!("eBay token could not be refreshed, reconnection required");
            self.teardown(stale);
            return None;
        };

        let tokens = self.session.tokens();
        if !tokens.holds(stale) {
            tracing::debug!("eBay token replaced during refresh, not persisting");
            return Some(data.access_token);
        }
        let record = AccessTokenRecord::new(
            data.access_token,
            data.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            self.session.now_millis(),
        );
        if let Err(e) = tokens.write(&record) {
            tracing::warn!("Failed to persist refreshed eBay token: {}", e);
        }
        if let Some(refresh) = data.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            if let Err(e) = tokens.write_refresh(refresh) {
                tracing::warn!("Failed to persist eBay refresh token: {}", e);
            }
        }

        tracing::info!("eBay token refreshed");
        Some(record.value)
    }

    fn teardown(&self, token: &str) {
        match self.session.tokens().clear_if_current(token) {
            Ok(true) => self.session.broadcast(SessionSignal::EbayTokenExpired),
            Ok(false) => tracing::debug!("eBay token replaced meanwhile, keeping it"),
            Err(e) => tracing::warn!("Failed to clear eBay tokens: {}", e),
        }
    }
}
