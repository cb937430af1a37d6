//! eBay OAuth popup flow
//!
//! Opens the backend's authorization page in a separate window, waits for
//! the window to post the authorization code back, and exchanges the code
//! through the backend. Only messages from the hosting page's own origin
//! are trusted.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::api::AuthApi;
use super::tokens::{AccessTokenRecord, DEFAULT_EXPIRES_IN_SECS};
use crate::session::SessionContext;

pub const POPUP_WIDTH: u32 = 600;
pub const POPUP_HEIGHT: u32 = 700;

/// Capacity of the window message channel.
const MESSAGE_CAPACITY: usize = 32;

/// Window placement for the authorization popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupGeometry {
    pub width: u32,
    pub height: u32,
    pub left: u32,
    pub top: u32,
}

impl PopupGeometry {
    /// Fixed-size window centered on a screen of the given size.
    pub fn centered(screen_width: u32, screen_height: u32) -> Self {
        Self {
            width: POPUP_WIDTH,
            height: POPUP_HEIGHT,
            left: screen_width.saturating_sub(POPUP_WIDTH) / 2,
            top: screen_height.saturating_sub(POPUP_HEIGHT) / 2,
        }
    }

    /// Window feature string, `width=..,height=..,left=..,top=..`.
    pub fn features(&self) -> String {
        format!(
            "width={},height={},left={},top={}",
            self.width, self.height, self.left, self.top
        )
    }
}

/// Opens the authorization window.
pub trait WindowLauncher: Send + Sync {
    fn open(&self, url: &Url, geometry: &PopupGeometry) -> Result<()>;
}

/// Launch the platform browser.
pub struct SystemBrowser;

impl WindowLauncher for SystemBrowser {
    fn open(&self, url: &Url, geometry: &PopupGeometry) -> Result<()> {
        // On macOS use `open`, on Linux use `xdg-open`, on Windows use `start`.
        let cmd = if cfg!(target_os = "macos") {
            "open"
        } else if cfg!(target_os = "windows") {
            "start"
        } else {
            "xdg-open"
        };

        tracing::debug!("Opening {} ({})", url, geometry.features());
        std::process::Command::new(cmd)
            .arg(url.as_str())
            .spawn()
            .with_context(|| format!("Failed to open browser, visit {} manually", url))?;
        Ok(())
    }
}

/// A message posted to the hosting page by another window.
#[derive(Debug, Clone)]
pub struct WindowMessage {
    pub origin: String,
    pub data: serde_json::Value,
}

/// Payload the authorization window posts on completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthorizationMessage {
    pub code: Option<String>,
    pub state: Option<String>,
    pub expires_in: Option<u64>,
}

/// Receiving end of the window message channel.
///
/// Cancelled on drop; a cancelled subscription never yields another message.
pub struct PopupSubscription {
    rx: broadcast::Receiver<WindowMessage>,
    cancel: CancellationToken,
}

impl PopupSubscription {
    /// Next message, or `None` once disposed.
    pub async fn recv(&mut self) -> Option<WindowMessage> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                msg = self.rx.recv() => match msg {
                    Ok(msg) => return Some(msg),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Dropped {} window messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    }

    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for PopupSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupState {
    WaitingForCode,
    Exchanging,
    Connected,
    ExchangeFailed,
}

/// Popup flow settings.
#[derive(Debug, Clone)]
pub struct PopupSettings {
    pub backend_base: String,
    /// Origin of the hosting page; the only origin whose messages count.
    pub app_origin: String,
    pub geometry: PopupGeometry,
}

pub struct PopupFlow {
    settings: PopupSettings,
    launcher: Arc<dyn WindowLauncher>,
    messages: broadcast::Sender<WindowMessage>,
    state: PopupState,
}

impl PopupFlow {
    pub fn new(settings: PopupSettings, launcher: Arc<dyn WindowLauncher>) -> Self {
        let (messages, _) = broadcast::channel(MESSAGE_CAPACITY);
        Self {
            settings,
            launcher,
            messages,
            state: PopupState::WaitingForCode,
        }
    }

    pub fn state(&self) -> PopupState {
        self.state
    }

    /// Sender side of the window message channel, for whatever delivers
    /// posted messages (the callback listener, tests).
    pub fn message_sender(&self) -> broadcast::Sender<WindowMessage> {
        self.messages.clone()
    }

    /// Register a listener for posted window messages.
    pub fn listen(&self) -> PopupSubscription {
        PopupSubscription {
            rx: self.messages.subscribe(),
            cancel: CancellationToken::new(),
        }
    }

    /// `<backendBase>/auth/ebay-login?userId=<id>`
    pub fn authorization_url(&self, user_id: &str) -> Result<Url> {
        let base = format!(
            "{}/auth/ebay-login",
            self.settings.backend_base.trim_end_matches('/')
        );
        Url::parse_with_params(&base, &[("userId", user_id)])
            .with_context(|| format!("Invalid backend base URL: {}", self.settings.backend_base))
    }

    /// Open a fresh authorization window.
    pub fn open(&mut self, user_id: &str) -> Result<Url> {
        let url = self.authorization_url(user_id)?;
        self.launcher.open(&url, &self.settings.geometry)?;
        self.state = PopupState::WaitingForCode;
        tracing::info!("Opened eBay authorization window");
        Ok(url)
    }

    fn is_trusted(&self, origin: &str) -> bool {
        match (Url::parse(origin), Url::parse(&self.settings.app_origin)) {
            (Ok(theirs), Ok(ours)) => theirs.origin() == ours.origin(),
            _ => false,
        }
    }

    /// Vet a posted message. Returns the authorization payload when the
    /// message is trusted, carries a code, and no exchange is running.
    pub fn accept(&mut self, msg: &WindowMessage) -> Option<AuthorizationMessage> {
        if !self.is_trusted(&msg.origin) {
            tracing::debug!("Ignoring window message from {:?}", msg.origin);
            return None;
        }
        if self.state != PopupState::WaitingForCode {
            tracing::debug!("Ignoring window message while {:?}", self.state);
            return None;
        }

        let payload: AuthorizationMessage = serde_json::from_value(msg.data.clone()).ok()?;
        if payload.code.as_deref().map_or(true, str::is_empty) {
            return None;
        }

        self.state = PopupState::Exchanging;
        Some(payload)
    }

    /// Record the outcome of an exchange started by `accept`.
    pub fn finish(&mut self, connected: bool) {
        self.state = if connected {
            PopupState::Connected
        } else {
            PopupState::ExchangeFailed
        };
    }

    /// Back to waiting, e.g. before the user retries with a new window.
    pub fn reset(&mut self) {
        self.state = PopupState::WaitingForCode;
    }
}

/// Exchange an authorization code and persist the resulting tokens.
///
/// Returns the new access token, or `None` if the exchange failed for any
/// reason.
pub async fn exchange_code(
    session: &SessionContext,
    api: &dyn AuthApi,
    code: &str,
    user_id: &str,
) -> Option<String> {
    let resp = match api.exchange_code(code, user_id).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!("eBay code exchange failed: {}", e);
            return None;
        }
    };

    let failure = resp.failure_message();
    let data = match resp.into_data() {
        Some(data) if !data.access_token.is_empty() => data,
        _ => {
            tracing::warn!(
                "eBay code exchange rejected: {}",
                failure.as_deref().unwrap_or("no access token")
            );
            return None;
        }
    };

    let tokens = session.tokens();
    let record = AccessTokenRecord::new(
        data.access_token,
        data.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
        session.now_millis(),
    );
    if let Err(e) = tokens.write(&record) {
        tracing::warn!("Failed to persist eBay token: {}", e);
    }
    if let Some(refresh) = data.refresh_token.as_deref().filter(|t| !t.is_empty()) {
        if let Err(e) = tokens.write_refresh(refresh) {
            tracing::warn!("Failed to persist eBay refresh token: {}", e);
        }
    }

    tracing::info!("eBay account connected");
    Some(record.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, ApiResponse};
    use crate::auth::api::ExchangedTokens;
    use crate::testing::{test_session, MockAuthApi, RecordingLauncher, APP_ORIGIN, NOW};
    use serde_json::json;

    fn flow() -> (PopupFlow, Arc<RecordingLauncher>) {
        let launcher = Arc::new(RecordingLauncher::default());
        let settings = PopupSettings {
            backend_base: "http://localhost:3001/".to_string(),
            app_origin: APP_ORIGIN.to_string(),
            geometry: PopupGeometry::centered(1920, 1080),
        };
        (PopupFlow::new(settings, launcher.clone()), launcher)
    }

    fn message(origin: &str) -> WindowMessage {
        WindowMessage {
            origin: origin.to_string(),
            data: json!({"code": "auth-code", "state": "s1", "expires_in": 7200}),
        }
    }

    #[test]
    fn test_geometry_centered() {
        let g = PopupGeometry::centered(1920, 1080);
        assert_eq!((g.width, g.height, g.left, g.top), (600, 700, 660, 190));
        assert_eq!(g.features(), "width=600,height=700,left=660,top=190");

        let tiny = PopupGeometry::centered(400, 300);
        assert_eq!((tiny.left, tiny.top), (0, 0));
    }

    #[test]
    fn test_authorization_url_encodes_user_id() {
        let (flow, _) = flow();
        let url = flow.authorization_url("seller 1&x").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3001/auth/ebay-login?userId=seller+1%26x"
        );
    }

    #[test]
    fn test_open_launches_window() {
        let (mut flow, launcher) = flow();
        flow.open("seller-1").unwrap();

        let opened = launcher.opened();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].0.contains("userId=seller-1"));
        assert_eq!(opened[0].1, PopupGeometry::centered(1920, 1080));
        assert_eq!(flow.state(), PopupState::WaitingForCode);
    }

    #[test]
    fn test_foreign_origin_rejected() {
        let (mut flow, _) = flow();
        assert!(flow.accept(&message("https://evil.example.com")).is_none());
        assert!(flow.accept(&message("")).is_none());
        assert!(flow.accept(&message("http://localhost:3001")).is_none());
        assert_eq!(flow.state(), PopupState::WaitingForCode);
    }

    #[test]
    fn test_trusted_message_starts_exchange_once() {
        let (mut flow, _) = flow();
        let payload = flow.accept(&message(APP_ORIGIN)).unwrap();
        assert_eq!(payload.code.as_deref(), Some("auth-code"));
        assert_eq!(payload.expires_in, Some(7200));
        assert_eq!(flow.state(), PopupState::Exchanging);

        // A duplicate post during the exchange is ignored.
        assert!(flow.accept(&message(APP_ORIGIN)).is_none());

        flow.finish(false);
        assert_eq!(flow.state(), PopupState::ExchangeFailed);
        flow.reset();
        assert!(flow.accept(&message(APP_ORIGIN)).is_some());
    }

    #[test]
    fn test_message_without_code_ignored() {
        let (mut flow, _) = flow();
        let msg = WindowMessage {
            origin: APP_ORIGIN.to_string(),
            data: json!({"type": "resize"}),
        };
        assert!(flow.accept(&msg).is_none());
        assert_eq!(flow.state(), PopupState::WaitingForCode);
    }

    #[tokio::test]
    async fn test_subscription_receives_until_disposed() {
        let (flow, _) = flow();
        let mut sub = flow.listen();
        let tx = flow.message_sender();

        tx.send(message(APP_ORIGIN)).unwrap();
        assert!(sub.recv().await.is_some());

        sub.dispose();
        tx.send(message(APP_ORIGIN)).unwrap();
        assert!(sub.recv().await.is_none());
        assert!(sub.is_disposed());
    }

    #[tokio::test]
    async fn test_exchange_persists_tokens_with_default_expiry() {
        let (session, _clock) = test_session();
        let api = MockAuthApi::new();
        api.push_exchange(Ok(ApiResponse::ok(ExchangedTokens {
            access_token: "at-1".to_string(),
            refresh_token: Some("rt-1".to_string()),
            expires_in: None,
        })));

        let token = exchange_code(&session, &api, "auth-code", "seller-1").await;

        assert_eq!(token.as_deref(), Some("at-1"));
        let record = session.tokens().read().unwrap();
        assert_eq!(record.expiry, NOW + 7_200_000);
        assert_eq!(session.tokens().read_refresh().as_deref(), Some("rt-1"));
        assert_eq!(api.exchanged_codes(), vec![("auth-code".to_string(), "seller-1".to_string())]);
    }

    #[tokio::test]
    async fn test_exchange_failure_leaves_store_untouched() {
        let (session, _clock) = test_session();
        let api = MockAuthApi::new();
        api.push_exchange(Ok(ApiResponse::failed("invalid_grant")));
        api.push_exchange(Err(ApiError::Transport {
            url: "http://localhost".to_string(),
            message: "timeout".to_string(),
        }));

        assert!(exchange_code(&session, &api, "c", "seller-1").await.is_none());
        assert!(exchange_code(&session, &api, "c", "seller-1").await.is_none());
        assert!(session.tokens().read().is_none());
        assert!(session.tokens().read_refresh().is_none());
    }
}
