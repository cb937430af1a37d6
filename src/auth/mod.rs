//! Seller session and eBay token lifecycle
//!
//! The seller's own sign-in is recorded in the session store; the eBay
//! account is connected through an OAuth popup flow and its tokens are
//! validated, refreshed and torn down here.

pub mod api;
pub mod callback;
pub mod popup;
pub mod tokens;
pub mod validator;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::session::store::{USER_ID, USER_ID_LEGACY, USER_STORE};
use crate::session::SessionContext;

pub use api::{AuthApi, HttpAuthApi};
pub use popup::{PopupFlow, PopupSettings, PopupSubscription, WindowLauncher, WindowMessage};
pub use tokens::TokenStore;
pub use validator::TokenValidator;

/// The signed-in seller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Persisted sign-in blob kept under `user-store`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserSession {
    user: User,
    signed_in_at: i64,
}

/// Supplies the current user for token operations.
pub trait Authenticator: Send + Sync {
    fn current_user(&self) -> Option<User>;
}

/// Reads the signed-in user from the session store.
pub struct SessionAuthenticator {
    session: SessionContext,
}

impl SessionAuthenticator {
    pub fn new(session: SessionContext) -> Self {
        Self { session }
    }
}

impl Authenticator for SessionAuthenticator {
    fn current_user(&self) -> Option<User> {
        let store = self.session.store();
        if let Some(raw) = store.get(USER_STORE) {
            match serde_json::from_str::<UserSession>(&raw) {
                Ok(blob) if !blob.user.id.is_empty() => return Some(blob.user),
                Ok(_) => {}
                Err(e) => tracing::warn!("Stored user session is malformed: {}", e),
            }
        }

        // Bare id keys from older sessions.
        store
            .get(USER_ID)
            .or_else(|| store.get(USER_ID_LEGACY))
            .filter(|id| !id.is_empty())
            .map(|id| User {
                id,
                email: None,
                name: None,
            })
    }
}

/// Record the seller's sign-in.
pub fn login(session: &SessionContext, user: User) -> Result<()> {
    let blob = UserSession {
        user,
        signed_in_at: session.now_millis(),
    };
    let raw = serde_json::to_string(&blob).context("Failed to encode user session")?;

    let store = session.store();
    store.set(USER_STORE, &raw).context("Failed to save user session")?;
    store.set(USER_ID, &blob.user.id)?;
    store.set(USER_ID_LEGACY, &blob.user.id)?;

    tracing::info!("Signed in as {}", blob.user.id);
    Ok(())
}

/// Clear the seller session and every stored eBay credential.
pub fn logout(session: &SessionContext) -> Result<()> {
    session.hard_reset().context("Failed to clear session")?;
    println!("Logged out.");
    Ok(())
}

/// Display current session and eBay token status
pub fn status(session: &SessionContext) -> Result<()> {
    match SessionAuthenticator::new(session.clone()).current_user() {
        Some(user) => {
            println!("Seller:      {}", user.id);
            if let Some(email) = user.email {
                println!("  email:     {}", email);
            }
        }
        None => println!("Seller:      not signed in"),
    }

    let tokens = session.tokens();
    match tokens.read() {
        Some(record) if record.is_valid_at(session.now_millis()) => {
            println!("eBay token:  valid");
            if let Some(at) = chrono::DateTime::from_timestamp_millis(record.expiry) {
                println!("  expires:   {}", at.to_rfc3339());
            }
        }
        Some(_) => println!("eBay token:  expired"),
        None => println!("eBay token:  none"),
    }

    match tokens.read_refresh() {
        Some(_) => println!("Refresh tok: present"),
        None => println!("Refresh tok: none"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_session;

    fn seller() -> User {
        User {
            id: "seller-1".to_string(),
            email: Some("seller@example.com".to_string()),
            name: None,
        }
    }

    #[test]
    fn test_login_then_current_user() {
        let (session, _clock) = test_session();
        login(&session, seller()).unwrap();

        let auth = SessionAuthenticator::new(session.clone());
        assert_eq!(auth.current_user(), Some(seller()));
        assert_eq!(session.store().get(USER_ID).as_deref(), Some("seller-1"));
        assert_eq!(session.store().get(USER_ID_LEGACY).as_deref(), Some("seller-1"));
    }

    #[test]
    fn test_falls_back_to_legacy_id_key() {
        let (session, _clock) = test_session();
        session.store().set(USER_STORE, "garbage").unwrap();
        session.store().set(USER_ID_LEGACY, "seller-9").unwrap();

        let user = SessionAuthenticator::new(session).current_user().unwrap();
        assert_eq!(user.id, "seller-9");
    }

    #[test]
    fn test_logout_forgets_user() {
        let (session, _clock) = test_session();
        login(&session, seller()).unwrap();
        logout(&session).unwrap();

        assert!(SessionAuthenticator::new(session).current_user().is_none());
    }
}
