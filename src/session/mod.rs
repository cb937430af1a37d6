//! Session context: persistence, clock and the application-wide signal bus.
//!
//! Everything that would otherwise be ambient global state (stored tokens,
//! the signed-in user, broadcast invalidation events) goes through a
//! `SessionContext`, so each flow can be handed its own instance in tests.

pub mod store;

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::auth::TokenStore;
use store::{KeyValueStore, StoreError, SESSION_KEYS};

/// Capacity of the signal bus. Signals are rare; lagging receivers only
/// lose duplicates.
const SIGNAL_CAPACITY: usize = 16;

/// Application-wide invalidation signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// The eBay token is no longer usable. Soft reset: reconnect eBay.
    EbayTokenExpired,
    /// The seller's own session is gone. Hard reset: purge and log in again.
    AuthenticationFailed,
}

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Clone)]
pub struct SessionContext {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    signals: broadcast::Sender<SessionSignal>,
}

impl SessionContext {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            store,
            clock,
            signals,
        }
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn tokens(&self) -> TokenStore {
        TokenStore::new(Arc::clone(&self.store))
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionSignal> {
        self.signals.subscribe()
    }

    /// Publish a signal to every subscriber. No subscribers is not an error.
    pub fn broadcast(&self, signal: SessionSignal) {
        tracing::debug!("Broadcasting {:?}", signal);
        let _ = self.signals.send(signal);
    }

    /// Purge every persisted identity and token key.
    pub fn hard_reset(&self) -> Result<(), StoreError> {
        tracing::info!("Purging stored session and eBay tokens");
        self.store.remove_many(&SESSION_KEYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_session;
    use store::{EBAY_REFRESH_TOKEN, EBAY_USER_TOKEN, USER_ID, USER_ID_LEGACY, USER_STORE};

    #[test]
    fn test_hard_reset_clears_all_five_keys() {
        let (session, _clock) = test_session();
        let store = session.store();
        store.set(EBAY_USER_TOKEN, r#"{"value":"abc","expiry":1}"#).unwrap();
        store.set(EBAY_REFRESH_TOKEN, "rt").unwrap();
        store.set(USER_ID, "seller-1").unwrap();
        store.set(USER_ID_LEGACY, "seller-1").unwrap();
        store.set(USER_STORE, r#"{"user":{"id":"seller-1"}}"#).unwrap();

        session.hard_reset().unwrap();

        for key in SESSION_KEYS {
            assert!(store.get(key).is_none(), "{} survived hard reset", key);
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let (session, _clock) = test_session();
        let mut first = session.subscribe();
        let mut second = session.clone().subscribe();

        session.broadcast(SessionSignal::EbayTokenExpired);

        assert_eq!(first.recv().await.unwrap(), SessionSignal::EbayTokenExpired);
        assert_eq!(second.recv().await.unwrap(), SessionSignal::EbayTokenExpired);
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let (session, _clock) = test_session();
        session.broadcast(SessionSignal::AuthenticationFailed);
    }
}
