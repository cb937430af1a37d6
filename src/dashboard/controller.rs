//! Dashboard controller: owns `DashboardState` and drives it from
//! token checks, popup messages, session signals and fetch completions.
//!
//! Network work runs in spawned tasks that report back over an mpsc channel;
//! the controller applies the results one at a time in `step`. Fetches are
//! numbered, and a completion whose number is not the latest is dropped, so
//! a superseded fetch can never overwrite newer state.

use std::future::Future;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::fetcher::{FetchOutcome, ListingsFetcher};
use super::state::{DashboardState, View};
use crate::api::{InventoryApi, ListingsPage};
use crate::auth::popup::{exchange_code, PopupState};
use crate::auth::{
    AuthApi, PopupFlow, PopupSettings, PopupSubscription, TokenValidator, User, WindowLauncher,
    WindowMessage,
};
use crate::session::{SessionContext, SessionSignal};

/// Collaborators the dashboard runs against.
#[derive(Clone)]
pub struct DashboardServices {
    pub session: SessionContext,
    pub auth: Arc<dyn AuthApi>,
    pub inventory: Arc<dyn InventoryApi>,
    pub launcher: Arc<dyn WindowLauncher>,
    pub popup: PopupSettings,
    pub page_size: u32,
}

/// Result of a spawned task.
#[derive(Debug)]
enum Completion {
    TokenChecked(Option<String>),
    Exchanged(Option<String>),
    Listings { seq: u64, outcome: FetchOutcome },
}

enum Event {
    Completion(Completion),
    Signal(SessionSignal),
    Message(WindowMessage),
}

pub struct Dashboard {
    state: DashboardState,
    user: Option<User>,
    session: SessionContext,
    auth: Arc<dyn AuthApi>,
    validator: TokenValidator,
    fetcher: ListingsFetcher,
    popup: PopupFlow,
    subscription: Option<PopupSubscription>,
    signals: broadcast::Receiver<SessionSignal>,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
    /// Number of the latest fetch; only its completion is applied.
    fetch_seq: u64,
    /// The pending fetch retries a refreshed token and must not refresh again.
    retrying_after_refresh: bool,
    reload_required: bool,
    cancel: CancellationToken,
}

impl Dashboard {
    pub fn new(services: DashboardServices, user: Option<User>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let DashboardServices {
            session,
            auth,
            inventory,
            launcher,
            popup,
            page_size,
        } = services;

        Self {
            state: DashboardState::default(),
            user,
            signals: session.subscribe(),
            validator: TokenValidator::new(session.clone(), Arc::clone(&auth)),
            fetcher: ListingsFetcher::new(session.clone(), Arc::clone(&auth), inventory, page_size),
            popup: PopupFlow::new(popup, launcher),
            subscription: None,
            session,
            auth,
            tx,
            rx,
            fetch_seq: 0,
            retrying_after_refresh: false,
            reload_required: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn view(&self) -> View {
        self.state.view()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[cfg(test)]
    pub fn state_mut(&mut self) -> &mut DashboardState {
        &mut self.state
    }

    pub fn popup_state(&self) -> PopupState {
        self.popup.state()
    }

    /// The seller session is gone; the caller must send the user back to
    /// the login entry point.
    pub fn reload_required(&self) -> bool {
        self.reload_required
    }

    /// Where posted window messages should be delivered.
    pub fn message_sender(&self) -> broadcast::Sender<WindowMessage> {
        self.popup.message_sender()
    }

    /// Register listeners and start the token check.
    pub fn mount(&mut self) {
        let Some(user) = self.user.clone() else {
            tracing::warn!("No signed-in seller, login required");
            self.reload_required = true;
            return;
        };

        self.subscription = Some(self.popup.listen());
        let validator = self.validator.clone();
        self.spawn(async move {
            Completion::TokenChecked(validator.get_valid_token(&user.id).await)
        });
    }

    /// Deregister listeners. Results of tasks still in flight are dropped.
    pub fn unmount(&mut self) {
        self.cancel.cancel();
        if let Some(sub) = self.subscription.take() {
            sub.dispose();
        }
    }

    /// Wait for the next event and apply it. Returns `false` once the
    /// dashboard is unmounted.
    pub async fn step(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        let event = tokio::select! {
            Some(completion) = self.rx.recv() => Event::Completion(completion),
            signal = self.signals.recv() => match signal {
                Ok(signal) => Event::Signal(signal),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Missed {} session signals", n);
                    return true;
                }
                Err(broadcast::error::RecvError::Closed) => return false,
            },
            Some(msg) = next_message(&mut self.subscription) => Event::Message(msg),
            _ = self.cancel.cancelled() => return false,
        };

        match event {
            Event::Completion(completion) => self.apply(completion),
            Event::Signal(signal) => self.handle_signal(signal),
            Event::Message(msg) => self.handle_window_message(msg),
        }
        !self.cancel.is_cancelled()
    }

    /// Open the eBay authorization window.
    pub fn connect(&mut self) -> Result<()> {
        let Some(user) = self.user.clone() else {
            bail!("Not signed in. Run 'ebay-dashboard login'.");
        };
        if !self.state.needs_connection {
            return Ok(());
        }

        if self
            .subscription
            .as_ref()
            .map_or(true, PopupSubscription::is_disposed)
        {
            self.subscription = Some(self.popup.listen());
        }
        self.popup.open(&user.id)?;
        Ok(())
    }

    /// Jump to `page` (1-based), fetching it if a token is in hand. Before
    /// any page has loaded the upper bound is left to the backend.
    pub fn go_to_page(&mut self, page: u32) {
        let last = self
            .state
            .listings
            .as_ref()
            .map_or(u32::MAX, ListingsPage::page_count);
        self.state.page = page.clamp(1, last);
        self.enqueue_fetch();
    }

    pub fn next_page(&mut self) {
        if self.state.page < self.state.page_count() {
            self.state.page += 1;
            self.enqueue_fetch();
        }
    }

    pub fn prev_page(&mut self) {
        if self.state.page > 1 {
            self.state.page -= 1;
            self.enqueue_fetch();
        }
    }

    /// Fetch the current page again.
    pub fn reload(&mut self) {
        self.enqueue_fetch();
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let completion = task.await;
            if cancel.is_cancelled() {
                tracing::debug!("Dashboard unmounted, dropping {:?}", completion);
                return;
            }
            let _ = tx.send(completion);
        });
    }

    fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::TokenChecked(Some(token)) => {
                self.state.needs_connection = false;
                self.adopt_token(token, false);
            }
            Completion::TokenChecked(None) => {
                tracing::info!("No eBay connection, prompting to connect");
                self.state.disconnect();
            }
            Completion::Exchanged(Some(token)) => {
                self.popup.finish(true);
                if let Some(sub) = self.subscription.take() {
                    sub.dispose();
                }
                self.state.needs_connection = false;
                self.adopt_token(token, false);
            }
            Completion::Exchanged(None) => {
                self.popup.finish(false);
                self.state.needs_connection = true;
            }
            Completion::Listings { seq, outcome } => self.apply_listings(seq, outcome),
        }
    }

    fn apply_listings(&mut self, seq: u64, outcome: FetchOutcome) {
        if seq != self.fetch_seq {
            tracing::debug!("Discarding stale fetch #{} (latest #{})", seq, self.fetch_seq);
            return;
        }

        self.state.loading_listings = false;
        match outcome {
            FetchOutcome::Loaded(page) => {
                self.retrying_after_refresh = false;
                self.state.listings_error = None;
                self.state.listings = Some(page);
            }
            FetchOutcome::Refreshed(token) => self.adopt_token(token, true),
            FetchOutcome::Disconnected => {
                self.retrying_after_refresh = false;
                self.state.disconnect();
            }
            FetchOutcome::Failed(message) => {
                self.retrying_after_refresh = false;
                self.state.listings_error = Some(message);
            }
        }
    }

    /// Take a token as current. A changed token triggers exactly one fetch;
    /// the same token again triggers nothing.
    fn adopt_token(&mut self, token: String, after_refresh: bool) {
        if self.state.ebay_token.as_deref() == Some(token.as_str()) {
            tracing::debug!("eBay token unchanged, not refetching");
            return;
        }
        self.state.ebay_token = Some(token);
        self.retrying_after_refresh = after_refresh;
        self.enqueue_fetch();
    }

    fn enqueue_fetch(&mut self) {
        let (Some(user), Some(token)) = (&self.user, &self.state.ebay_token) else {
            return;
        };

        self.fetch_seq += 1;
        self.state.loading_listings = true;
        self.state.listings_error = None;

        let seq = self.fetch_seq;
        let page = self.state.page;
        let allow_refresh = !self.retrying_after_refresh;
        let user_id = user.id.clone();
        let token = token.clone();
        let fetcher = self.fetcher.clone();
        self.spawn(async move {
            let outcome = fetcher.fetch(&user_id, &token, page, allow_refresh).await;
            Completion::Listings { seq, outcome }
        });
    }

    fn handle_signal(&mut self, signal: SessionSignal) {
        // Any fetch in flight belongs to the old session.
        self.fetch_seq += 1;
        self.retrying_after_refresh = false;

        match signal {
            SessionSignal::EbayTokenExpired => {
                tracing::info!("eBay token expired, reconnection required");
                if let Err(e) = self.session.tokens().clear() {
                    tracing::warn!("Failed to clear eBay tokens: {}", e);
                }
                self.state.disconnect();
            }
            SessionSignal::AuthenticationFailed => {
                tracing::warn!("Authentication failed, signing out");
                if let Err(e) = self.session.hard_reset() {
                    tracing::error!("Failed to purge session: {}", e);
                }
                self.state.disconnect();
                self.reload_required = true;
                self.unmount();
            }
        }
    }

    fn handle_window_message(&mut self, msg: WindowMessage) {
        let Some(payload) = self.popup.accept(&msg) else {
            return;
        };
        let (Some(user), Some(code)) = (self.user.as_ref(), payload.code) else {
            self.popup.reset();
            return;
        };

        tracing::info!("Authorization code received, exchanging");
        let session = self.session.clone();
        let auth = Arc::clone(&self.auth);
        let user_id = user.id.clone();
        self.spawn(async move {
            Completion::Exchanged(exchange_code(&session, auth.as_ref(), &code, &user_id).await)
        });
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn next_message(sub: &mut Option<PopupSubscription>) -> Option<WindowMessage> {
    match sub {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}
