//! Seller dashboard: token-aware listings view
//!
//! `Dashboard` is the page-level controller. The functions here wire it to
//! real services and run it headless for the `connect` and `listings`
//! commands.

pub mod controller;
pub mod fetcher;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use unicode_width::UnicodeWidthChar;

use crate::api::{BackendClient, HttpInventoryApi, ListingsPage};
use crate::auth::popup::{PopupState, SystemBrowser};
use crate::auth::{callback, Authenticator, HttpAuthApi, SessionAuthenticator};
use crate::config::Config;
use crate::session::store::FileStore;
use crate::session::{SessionContext, SystemClock};

pub use controller::{Dashboard, DashboardServices};
pub use state::{DashboardState, View};

/// How long `connect` waits for the authorization window.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(300);
/// How long `listings` waits for the backend.
const LOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Open the on-disk session.
pub fn open_session() -> Result<SessionContext> {
    let path = Config::session_path()?;
    let store = FileStore::open(path);
    Ok(SessionContext::new(Arc::new(store), Arc::new(SystemClock)))
}

impl DashboardServices {
    /// HTTP-backed services for `config`.
    pub fn from_config(config: &Config, session: SessionContext) -> Self {
        let client = BackendClient::new(&config.backend_base, session.clone());
        Self {
            session,
            auth: Arc::new(HttpAuthApi::new(client.clone())),
            inventory: Arc::new(HttpInventoryApi::new(client)),
            launcher: Arc::new(SystemBrowser),
            popup: config.popup_settings(),
            page_size: config.page_size.max(1),
        }
    }
}

/// Build and mount a dashboard for the signed-in seller, with the
/// authorization callback listener running until `cancel` fires.
pub fn start(config: &Config, session: SessionContext, cancel: &CancellationToken) -> Dashboard {
    let user = SessionAuthenticator::new(session.clone()).current_user();
    let mut dashboard = Dashboard::new(DashboardServices::from_config(config, session), user);

    let addr = config.callback_addr.clone();
    let messages = dashboard.message_sender();
    let cancel = cancel.child_token();
    tokio::spawn(async move {
        if let Err(e) = callback::serve(&addr, messages, cancel).await {
            tracing::error!("Callback listener stopped: {:#}", e);
        }
    });

    dashboard.mount();
    dashboard
}

/// Connect the seller's eBay account through the authorization window.
pub async fn connect(config: &Config) -> Result<()> {
    let session = open_session()?;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let mut dashboard = start(config, session, &cancel);

    let result = tokio::time::timeout(CONNECT_TIMEOUT, await_connection(&mut dashboard)).await;

    match result {
        Ok(Ok(())) => {
            println!("eBay account connected.");
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => bail!("Timed out waiting for eBay authorization"),
    }
}

/// Step `dashboard` until the eBay account is connected, opening the
/// authorization window once the connect prompt is up.
async fn await_connection(dashboard: &mut Dashboard) -> Result<()> {
    let mut window_opened = false;
    loop {
        if dashboard.reload_required() {
            bail!("Not signed in. Run 'ebay-dashboard login'.");
        }
        if dashboard.state().ebay_token.is_some() {
            return Ok(());
        }
        if dashboard.state().needs_connection && !window_opened {
            dashboard
                .connect()
                .context("Failed to open authorization window")?;
            window_opened = true;
            println!("Complete the eBay authorization in your browser.");
        }
        if dashboard.popup_state() == PopupState::ExchangeFailed {
            bail!("eBay authorization failed. Run 'ebay-dashboard connect' to try again.");
        }
        if !dashboard.step().await {
            if dashboard.reload_required() {
                bail!("Session expired. Run 'ebay-dashboard login'.");
            }
            bail!("Dashboard stopped before the account was connected");
        }
    }
}

/// Print one page of active listings.
pub async fn listings(config: &Config, page: u32) -> Result<()> {
    let session = open_session()?;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let mut dashboard = start(config, session, &cancel);
    dashboard.go_to_page(page);

    let settled = tokio::time::timeout(LOAD_TIMEOUT, async {
        loop {
            if dashboard.reload_required() {
                break;
            }
            match dashboard.view() {
                View::ConnectPrompt | View::Error => break,
                View::Listings if dashboard.state().listings.is_some() => break,
                _ => {}
            }
            if !dashboard.step().await {
                break;
            }
        }
    })
    .await;
    if settled.is_err() {
        bail!("Timed out loading listings");
    }

    if dashboard.reload_required() {
        bail!("Not signed in. Run 'ebay-dashboard login'.");
    }
    let state = dashboard.state();
    match state.view() {
        View::ConnectPrompt => {
            bail!("No eBay account connected. Run 'ebay-dashboard connect'.")
        }
        View::Error => bail!(
            "Failed to load listings: {}",
            state.listings_error.as_deref().unwrap_or("unknown error")
        ),
        _ => {}
    }

    if let Some(listings) = &state.listings {
        print_listings(listings, state.page);
    }
    Ok(())
}

fn print_listings(listings: &ListingsPage, page: u32) {
    println!("\nActive Listings:");
    println!("{:-<72}", "");

    for listing in &listings.listings {
        let price = listing
            .price
            .as_ref()
            .map(|p| format!("{} {}", p.value, p.currency))
            .unwrap_or_else(|| "-".to_string());
        let quantity = listing
            .quantity_available
            .map(|q| q.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<44} {:>16} {:>6}",
            fit_width(&listing.title, 44),
            price,
            quantity
        );
        println!("  ID: {}", listing.item_id);
    }

    if listings.listings.is_empty() {
        println!("  (no active listings)");
    }

    println!(
        "\nPage {} of {} ({} listings)",
        page,
        listings.page_count(),
        listings.total
    );
}

/// Cut `text` to at most `width` terminal columns, marking the cut with "...".
pub fn fit_width(text: &str, width: usize) -> String {
    let total: usize = text.chars().map(|c| c.width().unwrap_or(0)).sum();
    if total <= width {
        return text.to_string();
    }

    let budget = width.saturating_sub(3);
    let mut used = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push_str("...");
    out
}
