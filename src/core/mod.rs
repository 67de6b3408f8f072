//! # Core Module
//!
//! Configuration, date handling and the purchase documents shared by every feature.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Add dates module with stored date and timestamp formats
//! - 1.0.0: Initial creation with config and documents modules

pub mod config;
pub mod dates;
pub mod documents;

// Re-export commonly used items
pub use config::Config;
pub use documents::{
    DocStatus, PurchaseOrder, PurchaseOrderItem, PurchaseReceipt, PurchaseReceiptItem,
};
