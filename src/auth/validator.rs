//! Resolve a usable eBay access token for a user.

use std::sync::Arc;

use super::api::AuthApi;
use super::tokens::AccessTokenRecord;
use crate::session::SessionContext;

#[derive(Clone)]
pub struct TokenValidator {
    session: SessionContext,
    api: Arc<dyn AuthApi>,
}

impl TokenValidator {
    pub fn new(session: SessionContext, api: Arc<dyn AuthApi>) -> Self {
        Self { session, api }
    }

    /// Return a currently valid access token, or `None` if the user has no
    /// eBay connection.
    ///
    /// A valid stored record wins without touching the network. Otherwise
    /// the backend is asked for the token it holds; any failure there reads
    /// as "not connected".
    pub async fn get_valid_token(&self, user_id: &str) -> Option<String> {
        let tokens = self.session.tokens();
        if let Some(record) = tokens.read() {
            if record.is_valid_at(self.session.now_millis()) {
                return Some(record.value);
            }
            tracing::debug!("Stored eBay token expired, asking backend");
        }

        let resp = match self.api.get_ebay_user_token(user_id).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("eBay token status check failed: {}", e);
                return None;
            }
        };

        let data = match resp.into_data() {
            Some(data) if !data.access_token.is_empty() => data,
            _ => {
                tracing::info!("No eBay connection for user {}", user_id);
                return None;
            }
        };

        let record = AccessTokenRecord::new(
            data.access_token,
            data.expires_in_seconds,
            self.session.now_millis(),
        );
        if let Err(e) = tokens.write(&record) {
            tracing::warn!("Failed to persist eBay token: {}", e);
        }
        Some(record.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, ApiResponse};
    use crate::auth::api::UserToken;
    use crate::testing::{test_session, MockAuthApi, NOW};

    fn validator() -> (TokenValidator, SessionContext, Arc<MockAuthApi>) {
        let (session, _clock) = test_session();
        let api = Arc::new(MockAuthApi::new());
        (
            TokenValidator::new(session.clone(), api.clone()),
            session,
            api,
        )
    }

    #[tokio::test]
    async fn test_stored_valid_token_skips_network() {
        let (validator, session, api) = validator();
        session
            .tokens()
            .write(&AccessTokenRecord {
                value: "abc".to_string(),
                expiry: NOW + 1_000_000,
            })
            .unwrap();

        assert_eq!(validator.get_valid_token("seller-1").await.as_deref(), Some("abc"));
        assert_eq!(validator.get_valid_token("seller-1").await.as_deref(), Some("abc"));
        assert_eq!(api.user_token_calls(), 0);
    }

    #[tokio::test]
    async fn test_fetches_and_persists_when_absent() {
        let (validator, session, api) = validator();
        api.push_user_token(Ok(ApiResponse::ok(UserToken {
            access_token: "xyz".to_string(),
            expires_in_seconds: 3600,
        })));

        assert_eq!(validator.get_valid_token("seller-1").await.as_deref(), Some("xyz"));

        let record = session.tokens().read().unwrap();
        assert_eq!(record.value, "xyz");
        assert_eq!(record.expiry, NOW + 3_600_000);
        assert_eq!(api.user_token_calls(), 1);

        // Second call is served locally.
        assert_eq!(validator.get_valid_token("seller-1").await.as_deref(), Some("xyz"));
        assert_eq!(api.user_token_calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_record_goes_to_backend() {
        let (validator, session, api) = validator();
        session
            .tokens()
            .write(&AccessTokenRecord {
                value: "old".to_string(),
                expiry: NOW - 1,
            })
            .unwrap();
        api.push_user_token(Ok(ApiResponse::ok(UserToken {
            access_token: "new".to_string(),
            expires_in_seconds: 60,
        })));

        assert_eq!(validator.get_valid_token("seller-1").await.as_deref(), Some("new"));
        assert_eq!(api.user_token_calls(), 1);
    }

    #[tokio::test]
    async fn test_record_stops_being_served_at_expiry() {
        let (session, clock) = test_session();
        let api = Arc::new(MockAuthApi::new());
        let validator = TokenValidator::new(session.clone(), api.clone());
        session
            .tokens()
            .write(&AccessTokenRecord::new("abc".to_string(), 1, NOW))
            .unwrap();

        clock.advance(999);
        assert_eq!(validator.get_valid_token("seller-1").await.as_deref(), Some("abc"));

        clock.advance(1);
        assert!(validator.get_valid_token("seller-1").await.is_none());
        assert_eq!(api.user_token_calls(), 1);
    }

    #[tokio::test]
    async fn test_backend_failures_read_as_absent() {
        let (validator, session, api) = validator();
        api.push_user_token(Err(ApiError::Transport {
            url: "http://localhost".to_string(),
            message: "connection refused".to_string(),
        }));
        api.push_user_token(Ok(ApiResponse::failed("not connected")));
        api.push_user_token(Ok(ApiResponse::ok(UserToken {
            access_token: String::new(),
            expires_in_seconds: 60,
        })));

        for _ in 0..3 {
            assert!(validator.get_valid_token("seller-1").await.is_none());
        }
        assert!(session.tokens().read().is_none());
    }
}
