//! # Delivery Reminder Records
//!
//! Status, priority and escalation level of a reminder, plus the stored record itself.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Added `archived` flag for non-destructive cleanup
//! - 1.0.0: Initial release

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DELIVERY_REMINDER: &str = "Delivery Reminder";

/// Lifecycle status. `Open -> Closed` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderStatus {
    Open,
    Closed,
}

impl std::fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderStatus::Open => write!(f, "Open"),
            ReminderStatus::Closed => write!(f, "Closed"),
        }
    }
}

impl std::str::FromStr for ReminderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "open" => Ok(ReminderStatus::Open),
            "closed" => Ok(ReminderStatus::Closed),
            _ => Err(anyhow::anyhow!("Invalid reminder status: {}", s)),
        }
    }
}

/// Severity tier derived from the pending percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "Low"),
            Priority::Medium => write!(f, "Medium"),
            Priority::High => write!(f, "High"),
            Priority::Critical => write!(f, "Critical"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(anyhow::anyhow!("Invalid priority: {}", s)),
        }
    }
}

/// Escalation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReminderLevel {
    First,
    Second,
    Final,
}

impl ReminderLevel {
    /// Next stage after a missed follow-up. `Final` is terminal.
    pub fn escalated(self) -> Self {
        match self {
            ReminderLevel::First => ReminderLevel::Second,
            ReminderLevel::Second | ReminderLevel::Final => ReminderLevel::Final,
        }
    }
}

impl std::fmt::Display for ReminderLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderLevel::First => write!(f, "First"),
            ReminderLevel::Second => write!(f, "Second"),
            ReminderLevel::Final => write!(f, "Final"),
        }
    }
}

impl std::str::FromStr for ReminderLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "first" => Ok(ReminderLevel::First),
            "second" => Ok(ReminderLevel::Second),
            "final" => Ok(ReminderLevel::Final),
            _ => Err(anyhow::anyhow!("Invalid reminder level: {}", s)),
        }
    }
}

/// A stored delivery reminder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReminder {
    /// Naming series value, e.g. `DR-00042`
    pub name: String,
    pub purchase_order: String,
    pub purchase_order_item: String,
    pub supplier: String,
    pub item_code: String,
    pub pending_qty: f64,
    pub status: ReminderStatus,
    pub auto_created: bool,
    pub triggering_receipt: Option<String>,
    pub expected_delivery_date: NaiveDate,
    pub priority: Priority,
    pub reminder_level: ReminderLevel,
    pub next_follow_up_date: NaiveDate,
    pub archived: bool,
    pub creation: String,
    pub modified: String,
}

impl DeliveryReminder {
    pub fn is_open(&self) -> bool {
        self.status == ReminderStatus::Open
    }
}

/// Fields supplied when inserting a reminder; the store assigns name and timestamps
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub purchase_order: String,
    pub purchase_order_item: String,
    pub supplier: String,
    pub item_code: String,
    pub pending_qty: f64,
    pub triggering_receipt: Option<String>,
    pub expected_delivery_date: NaiveDate,
    pub priority: Priority,
    pub next_follow_up_date: NaiveDate,
}

/// Timeline entry attached to a reminder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderComment {
    pub reminder: String,
    pub comment_type: String,
    pub text: String,
    pub creation: String,
}

/// Comment types written by the lifecycle engine
pub mod comment_type {
    pub const UPDATED: &str = "Updated";
    pub const AUTO_CLOSED: &str = "Auto-Closed";
    pub const ESCALATED: &str = "Escalated";
    pub const ARCHIVED: &str = "Archived";
}
