//! # Host Documents
//!
//! Purchase Order and Purchase Receipt records as the host application sends them.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const PURCHASE_ORDER: &str = "Purchase Order";
pub const PURCHASE_RECEIPT: &str = "Purchase Receipt";

/// Document lifecycle state (0 = draft, 1 = submitted, 2 = cancelled)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DocStatus {
    #[default]
    Draft,
    Submitted,
    Cancelled,
}

impl DocStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            DocStatus::Draft => 0,
            DocStatus::Submitted => 1,
            DocStatus::Cancelled => 2,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(DocStatus::Draft),
            1 => Ok(DocStatus::Submitted),
            2 => Ok(DocStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid docstatus: {}", value)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub name: String,
    pub supplier: String,
    pub company: String,
    /// User notified about reminders raised against this order
    pub owner: String,
    #[serde(default)]
    pub schedule_date: Option<NaiveDate>,
    #[serde(default)]
    pub docstatus: DocStatus,
    /// Set by the store on insert
    #[serde(default)]
    pub creation: Option<String>,
    #[serde(default)]
    pub items: Vec<PurchaseOrderItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    /// Row identifier, unique across all orders
    pub name: String,
    pub item_code: String,
    #[serde(default)]
    pub project: Option<String>,
    pub qty: f64,
    #[serde(default)]
    pub rate: f64,
    #[serde(default)]
    pub amount: f64,
    /// Maintained from submitted receipts; ignored on input
    #[serde(default)]
    pub received_qty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub name: String,
    #[serde(default)]
    pub supplier: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub docstatus: DocStatus,
    #[serde(default)]
    pub items: Vec<PurchaseReceiptItem>,
}

impl PurchaseReceipt {
    pub fn doctype(&self) -> &'static str {
        PURCHASE_RECEIPT
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseReceiptItem {
    pub name: String,
    pub item_code: String,
    pub qty: f64,
    #[serde(default)]
    pub purchase_order: Option<String>,
    #[serde(default)]
    pub purchase_order_item: Option<String>,
}
