//! # Features
//!
//! - `settings`: the settings document and its cached store
//! - `reminders`: delivery reminder lifecycle, priority and scheduled jobs
//! - `history`: cached purchase history lookups
//! - `notifications`: owner notifications and outgoing mail
//! - `hooks`: document events from the host

pub mod history;
pub mod hooks;
pub mod notifications;
pub mod reminders;
pub mod settings;

pub use history::{HistoryCache, PurchaseHistoryApi, PurchaseHistoryEntry};
pub use hooks::{DocumentEvent, HookDispatcher, HookOutcome};
pub use notifications::{Mailer, OutboxMailer};
pub use reminders::{DeliveryReminder, Job, ReminderManager, ReminderScheduler};
pub use settings::{Settings, SettingsStore};
