//! Active listings endpoint

use async_trait::async_trait;
use serde::Deserialize;

use super::client::{ApiError, ApiResponse, BackendClient};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Price {
    pub value: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub item_id: String,
    #[serde(default)]
    pub title: String,
    pub price: Option<Price>,
    pub quantity_available: Option<u32>,
    pub listing_url: Option<String>,
}

/// One page of active listings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingsPage {
    #[serde(default)]
    pub listings: Vec<Listing>,
    #[serde(default)]
    pub total: u32,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

fn first_page() -> u32 {
    1
}

impl Default for ListingsPage {
    fn default() -> Self {
        Self {
            listings: Vec::new(),
            total: 0,
            page: first_page(),
            page_size: 0,
        }
    }
}

impl ListingsPage {
    /// Number of pages, never less than one.
    pub fn page_count(&self) -> u32 {
        if self.page_size == 0 {
            return 1;
        }
        self.total.div_ceil(self.page_size).max(1)
    }
}

/// Inventory API. The eBay token travels out-of-band with each request.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn get_active_listings(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<ApiResponse<ListingsPage>, ApiError>;
}

pub struct HttpInventoryApi {
    client: BackendClient,
}

impl HttpInventoryApi {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InventoryApi for HttpInventoryApi {
    async fn get_active_listings(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<ApiResponse<ListingsPage>, ApiError> {
        let path = format!(
            "/ebay/inventory/active-listings?page={}&limit={}",
            page, page_size
        );
        self.client.ebay_get(&path).await
    }
}
