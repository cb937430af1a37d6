//! Test doubles shared by the module tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::api::inventory::Price;
use crate::api::{ApiError, ApiResponse, InventoryApi, Listing, ListingsPage};
use crate::auth::api::{AuthApi, ExchangedTokens, RefreshedToken, UserToken};
use crate::auth::popup::{PopupGeometry, PopupSettings, WindowLauncher};
use crate::dashboard::{Dashboard, DashboardServices};
use crate::session::store::MemoryStore;
use crate::session::{Clock, SessionContext};

pub const NOW: i64 = 1_700_000_000_000;
pub const APP_ORIGIN: &str = "http://localhost:3000";

type Script<T> = Mutex<VecDeque<Result<ApiResponse<T>, ApiError>>>;

fn next<T>(script: &Script<T>, what: &str) -> Result<ApiResponse<T>, ApiError> {
    script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| {
            Err(ApiError::Transport {
                url: format!("mock://{}", what),
                message: "no scripted response".to_string(),
            })
        })
}

pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn advance(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// In-memory session pinned at `NOW`.
pub fn test_session() -> (SessionContext, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock(AtomicI64::new(NOW)));
    let session = SessionContext::new(Arc::new(MemoryStore::new()), clock.clone());
    (session, clock)
}

#[derive(Default)]
pub struct MockAuthApi {
    exchange: Script<ExchangedTokens>,
    user_token: Script<UserToken>,
    refresh: Script<RefreshedToken>,
    codes: Mutex<Vec<(String, String)>>,
    user_token_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl MockAuthApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_exchange(&self, resp: Result<ApiResponse<ExchangedTokens>, ApiError>) {
        self.exchange.lock().unwrap().push_back(resp);
    }

    pub fn push_user_token(&self, resp: Result<ApiResponse<UserToken>, ApiError>) {
        self.user_token.lock().unwrap().push_back(resp);
    }

    pub fn push_refresh(&self, resp: Result<ApiResponse<RefreshedToken>, ApiError>) {
        self.refresh.lock().unwrap().push_back(resp);
    }

    /// `(code, user_id)` pairs passed to `exchange_code`.
    pub fn exchanged_codes(&self) -> Vec<(String, String)> {
        self.codes.lock().unwrap().clone()
    }

    pub fn user_token_calls(&self) -> usize {
        self.user_token_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn exchange_code(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<ApiResponse<ExchangedTokens>, ApiError> {
        self.codes
            .lock()
            .unwrap()
            .push((code.to_string(), user_id.to_string()));
        next(&self.exchange, "exchange-code")
    }

    async fn get_ebay_user_token(
        &self,
        _user_id: &str,
    ) -> Result<ApiResponse<UserToken>, ApiError> {
        self.user_token_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.user_token, "user-token")
    }

    async fn refresh_ebay_user_token(
        &self,
        _user_id: &str,
    ) -> Result<ApiResponse<RefreshedToken>, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.refresh, "refresh-token")
    }
}

/// Inventory double that records the token attached to each call, the way
/// the HTTP client would read it from the store.
pub struct MockInventoryApi {
    session: SessionContext,
    responses: Script<ListingsPage>,
    calls: Mutex<Vec<(u32, u32, Option<String>)>>,
}

impl MockInventoryApi {
    pub fn new(session: SessionContext) -> Self {
        Self {
            session,
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, resp: Result<ApiResponse<ListingsPage>, ApiError>) {
        self.responses.lock().unwrap().push_back(resp);
    }

    /// `(page, page_size, token)` per call.
    pub fn calls(&self) -> Vec<(u32, u32, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InventoryApi for MockInventoryApi {
    async fn get_active_listings(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<ApiResponse<ListingsPage>, ApiError> {
        let token = self.session.tokens().read().map(|r| r.value);
        self.calls.lock().unwrap().push((page, page_size, token));
        next(&self.responses, "active-listings")
    }
}

#[derive(Default)]
pub struct RecordingLauncher {
    opened: Mutex<Vec<(String, PopupGeometry)>>,
}

impl RecordingLauncher {
    pub fn opened(&self) -> Vec<(String, PopupGeometry)> {
        self.opened.lock().unwrap().clone()
    }
}

impl WindowLauncher for RecordingLauncher {
    fn open(&self, url: &Url, geometry: &PopupGeometry) -> anyhow::Result<()> {
        self.opened
            .lock()
            .unwrap()
            .push((url.to_string(), *geometry));
        Ok(())
    }
}

/// First page holding `count` listings out of `total`, 20 per page.
pub fn listings_page(count: u32, total: u32) -> ListingsPage {
    ListingsPage {
        listings: (0..count)
            .map(|i| Listing {
                item_id: format!("item-{}", i),
                title: format!("Listing {}", i),
                price: Some(Price {
                    value: "9.99".to_string(),
                    currency: "USD".to_string(),
                }),
                quantity_available: Some(1),
                listing_url: None,
            })
            .collect(),
        total,
        page: 1,
        page_size: 20,
    }
}

pub fn services() -> (
    DashboardServices,
    Arc<MockAuthApi>,
    Arc<MockInventoryApi>,
    Arc<RecordingLauncher>,
) {
    let (session, _clock) = test_session();
    let auth = Arc::new(MockAuthApi::new());
    let inventory = Arc::new(MockInventoryApi::new(session.clone()));
    let launcher = Arc::new(RecordingLauncher::default());
    let services = DashboardServices {
        session,
        auth: auth.clone(),
        inventory: inventory.clone(),
        launcher: launcher.clone(),
        popup: PopupSettings {
            backend_base: "http://localhost:3001".to_string(),
            app_origin: APP_ORIGIN.to_string(),
            geometry: PopupGeometry::centered(1920, 1080),
        },
        page_size: 20,
    };
    (services, auth, inventory, launcher)
}

/// Step the dashboard until `done` holds. Panics after two seconds.
pub async fn settle(dashboard: &mut Dashboard, done: impl Fn(&Dashboard) -> bool) {
    let wait = async {
        while !done(dashboard) {
            assert!(dashboard.step().await, "dashboard unmounted while settling");
        }
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .expect("dashboard did not settle");
}
