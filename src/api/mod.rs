//! Backend API clients

pub mod client;
pub mod inventory;

pub use client::{ApiError, ApiResponse, BackendClient};
pub use inventory::{HttpInventoryApi, InventoryApi, Listing, ListingsPage};
