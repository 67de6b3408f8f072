//! # Purchase History Feature
//!
//! Cached lookup of recent purchases per item, project and company.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: true

pub mod api;
pub mod cache;

pub use api::{DeliveryStatus, PurchaseHistoryApi, PurchaseHistoryEntry};
pub use cache::{HistoryCache, HistoryKey};
