//! # Reminders Feature
//!
//! Delivery reminders for purchase order rows that are still short after a receipt.
//!
//! - **Version**: 1.2.0
//! - **Since**: 1.0.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 1.2.0: Archival cleanup and on-demand jobs
//! - 1.1.0: Escalation levels and daily digest
//! - 1.0.0: Initial release

pub mod manager;
pub mod model;
pub mod priority;
pub mod scheduler;

pub use manager::{CleanupOutcome, DigestSummary, ReceiptOutcome, ReminderManager};
pub use model::{
    comment_type, DeliveryReminder, NewReminder, Priority, ReminderComment, ReminderLevel,
    ReminderStatus, DELIVERY_REMINDER,
};
pub use priority::{classify, pending_percentage, PriorityThresholds};
pub use scheduler::{run_job, Job, JobIntervals, ReminderScheduler};
