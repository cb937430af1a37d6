//! Token storage and management

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::session::store::{KeyValueStore, StoreError, EBAY_REFRESH_TOKEN, EBAY_USER_TOKEN};

/// Lifetime assumed when the backend does not say how long a token lives.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 7200;

/// Stored eBay access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    pub value: String,
    /// Absolute expiry, epoch milliseconds.
    pub expiry: i64,
}

impl AccessTokenRecord {
    pub fn new(value: String, expires_in_secs: u64, now_millis: i64) -> Self {
        let lifetime = i64::try_from(expires_in_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        Self {
            value,
            expiry: now_millis.saturating_add(lifetime),
        }
    }

    pub fn is_valid_at(&self, now_millis: i64) -> bool {
        !self.value.is_empty() && now_millis < self.expiry
    }
}

/// Typed access to the persisted access token and refresh token.
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Read the access token record. Malformed data reads as absent.
    pub fn read(&self) -> Option<AccessTokenRecord> {
        let raw = self.store.get(EBAY_USER_TOKEN)?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Stored eBay token is malformed, ignoring: {}", e);
                None
            }
        }
    }

    pub fn write(&self, record: &AccessTokenRecord) -> Result<(), StoreError> {
        let raw = serde_json::to_string(record)?;
        self.store.set(EBAY_USER_TOKEN, &raw)
    }

    pub fn read_refresh(&self) -> Option<String> {
        self.store
            .get(EBAY_REFRESH_TOKEN)
            .filter(|token| !token.is_empty())
    }

    pub fn write_refresh(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(EBAY_REFRESH_TOKEN, token)
    }

    /// Remove both the access token record and the refresh token.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove_many(&[EBAY_USER_TOKEN, EBAY_REFRESH_TOKEN])
    }

    /// Whether the stored access token is `token`.
    pub fn holds(&self, token: &str) -> bool {
        self.read().is_some_and(|record| record.value == token)
    }

    /// Clear both tokens unless a different access token has been stored
    /// since `token` was read. Returns whether anything was cleared.
    pub fn clear_if_current(&self, token: &str) -> Result<bool, StoreError> {
        if self.read().is_some_and(|record| record.value != token) {
            return Ok(false);
        }
        self.clear()?;
        Ok(true)
    }
}
