//! # Notifications Feature
//!
//! In-app notification logs for new reminders and queued digest mail.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Mailer trait with database outbox
//! - 1.0.0: Consolidated per-owner notifications

pub mod format;
pub mod mailer;

pub use format::{
    consolidated_notifications, digest_body, digest_subject, format_qty, NotificationLog,
    NEW_REMINDERS_SUBJECT,
};
pub use mailer::{Mailer, OutboxMailer, OutgoingEmail, QueuedEmail};

#[cfg(test)]
pub(crate) use mailer::RecordingMailer;
