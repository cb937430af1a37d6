//! Page-level dashboard state and the view derived from it.

use crate::api::ListingsPage;

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    pub ebay_token: Option<String>,
    pub needs_connection: bool,
    pub loading_listings: bool,
    pub listings_error: Option<String>,
    /// 1-based page index.
    pub page: u32,
    /// Last page successfully loaded.
    pub listings: Option<ListingsPage>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            ebay_token: None,
            needs_connection: false,
            loading_listings: false,
            listings_error: None,
            page: 1,
            listings: None,
        }
    }
}

/// What the dashboard shows. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Before the mount-time token check has answered.
    Idle,
    ConnectPrompt,
    Loading,
    Error,
    Listings,
}

impl DashboardState {
    pub fn view(&self) -> View {
        if self.needs_connection {
            View::ConnectPrompt
        } else if self.loading_listings {
            View::Loading
        } else if self.listings_error.is_some() {
            View::Error
        } else if self.ebay_token.is_some() {
            View::Listings
        } else {
            View::Idle
        }
    }

    /// Number of pages known from the last load.
    pub fn page_count(&self) -> u32 {
        self.listings.as_ref().map_or(1, ListingsPage::page_count)
    }

    /// Drop every trace of the eBay connection and ask for a new one.
    pub fn disconnect(&mut self) {
        self.ebay_token = None;
        self.needs_connection = true;
        self.loading_listings = false;
        self.listings_error = None;
        self.listings = None;
    }
}
