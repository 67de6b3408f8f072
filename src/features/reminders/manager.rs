//! # Reminder Manager
//!
//! Delivery reminder lifecycle: create on first shortfall, update on partial receipt,
//! close on full receipt or order cancellation, escalate overdue follow-ups, and
//! archive or delete old closed reminders.
//!
//! - **Version**: 1.3.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.3.0: Receipt lines are all checked before any reminder is written
//! - 1.2.0: Archival branch for cleanup, lifecycle lock around receipt processing
//! - 1.1.0: Daily digest through the `Mailer` trait
//! - 1.0.0: Initial release

use crate::core::dates::{add_days, today};
use crate::core::documents::{PurchaseOrder, PurchaseReceipt, PurchaseReceiptItem};
use crate::database::Database;
use crate::features::history::PurchaseHistoryApi;
use crate::features::notifications::{
    consolidated_notifications, digest_body, digest_subject, format_qty, Mailer, OutgoingEmail,
    NEW_REMINDERS_SUBJECT,
};
use crate::features::reminders::model::{
    comment_type, DeliveryReminder, NewReminder, Priority, ReminderStatus,
};
use crate::features::reminders::priority::classify;
use crate::features::settings::{Settings, SettingsStore};
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Reminders touched by one receiving event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptOutcome {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub closed: Vec<String>,
    /// Notification log entries written for new reminders
    pub notifications: usize,
    /// True when `enable_auto_reminders` is off and nothing was evaluated
    pub skipped: bool,
}

/// Counts reported in a digest that was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestSummary {
    pub open: i64,
    pub critical: i64,
    pub recipients: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupOutcome {
    pub archived: usize,
    pub deleted: usize,
}

enum LineAction {
    Close(String),
    Update(String),
    Create(PurchaseOrder),
    Nothing,
}

struct PlannedLine<'a> {
    item: &'a PurchaseReceiptItem,
    po_item: &'a str,
    ordered: f64,
    pending: f64,
    action: LineAction,
}

#[derive(Clone)]
pub struct ReminderManager {
    database: Database,
    settings: SettingsStore,
    history: PurchaseHistoryApi,
    mailer: Arc<dyn Mailer>,
    /// Base URL for links in digest mail
    site_url: String,
    /// Serializes lifecycle transitions so a PO row never gets two open reminders
    lifecycle: Arc<Mutex<()>>,
}

impl ReminderManager {
    pub fn new(
        database: Database,
        settings: SettingsStore,
        history: PurchaseHistoryApi,
        mailer: Arc<dyn Mailer>,
        site_url: &str,
    ) -> Self {
        Self {
            database,
            settings,
            history,
            mailer,
            site_url: site_url.trim_end_matches('/').to_string(),
            lifecycle: Arc::new(Mutex::new(())),
        }
    }

    // --- Entry points ---

    /// Recompute reminders for every order row a receipt touches.
    /// Called when a receipt is submitted or cancelled.
    pub async fn update_reminders_for_receipt(
        &self,
        receipt: &PurchaseReceipt,
    ) -> Result<ReceiptOutcome> {
        self.update_reminders_for_receipt_on(receipt, today()).await
    }

    pub async fn update_reminders_for_receipt_on(
        &self,
        receipt: &PurchaseReceipt,
        today: NaiveDate,
    ) -> Result<ReceiptOutcome> {
        let settings = self.settings.get().await?;
        if !settings.enable_auto_reminders {
            debug!("Auto reminders disabled, ignoring {}", receipt.name);
            return Ok(ReceiptOutcome {
                skipped: true,
                ..ReceiptOutcome::default()
            });
        }

        let _guard = self.lifecycle.lock().await;
        self.process_receipt(receipt, &settings, today).await
    }

    /// Close every open reminder raised against a cancelled order
    pub async fn handle_po_cancellation(&self, order: &PurchaseOrder) -> Result<Vec<String>> {
        let _guard = self.lifecycle.lock().await;
        let reason = format!("PO {} was cancelled.", order.name);

        let mut closed = Vec::new();
        for name in self.database.open_reminders_for_order(&order.name).await? {
            if self.close_reminder(&name, &reason).await? {
                closed.push(name);
            }
        }

        if !closed.is_empty() {
            info!("Closed {} reminder(s) for cancelled PO {}", closed.len(), order.name);
        }
        Ok(closed)
    }

    /// Drop cached purchase history for every row of an order
    pub fn clear_item_history_cache(&self, order: &PurchaseOrder) -> usize {
        self.history.clear_for_order(order)
    }

    pub async fn escalate_overdue_reminders(&self) -> Result<usize> {
        self.escalate_overdue_reminders_on(today()).await
    }

    /// Escalate open reminders whose follow-up date is before `today`
    pub async fn escalate_overdue_reminders_on(&self, today: NaiveDate) -> Result<usize> {
        let settings = self.settings.get().await?;
        if !settings.auto_escalate_enabled {
            return Ok(0);
        }

        let _guard = self.lifecycle.lock().await;
        let overdue = self.database.get_overdue_reminders(today).await?;
        let next_follow_up = add_days(today, settings.default_follow_up_days)?;

        for reminder in &overdue {
            let new_level = reminder.reminder_level.escalated();
            self.database
                .save_escalation(&reminder.name, new_level, Priority::Critical, next_follow_up)
                .await?;
            self.database
                .add_reminder_comment(
                    &reminder.name,
                    comment_type::ESCALATED,
                    &format!("Reminder level escalated to {new_level}."),
                )
                .await?;
            debug!(
                "Escalated {} from {} to {}",
                reminder.name, reminder.reminder_level, new_level
            );
        }

        if !overdue.is_empty() {
            info!("⏫ Escalated {} reminders.", overdue.len());
        }
        Ok(overdue.len())
    }

    /// Mail a summary of open and critical reminders. `None` when nothing was sent.
    pub async fn send_daily_reminder_digest(&self) -> Result<Option<DigestSummary>> {
        let settings = self.settings.get().await?;
        if !settings.send_daily_digest {
            return Ok(None);
        }

        let recipients = settings.digest_recipient_list();
        if recipients.is_empty() {
            debug!("Digest enabled but no recipients configured");
            return Ok(None);
        }

        let open = self
            .database
            .count_reminders(ReminderStatus::Open, None)
            .await?;
        let critical = self
            .database
            .count_reminders(ReminderStatus::Open, Some(Priority::Critical))
            .await?;

        if open == 0 {
            debug!("No open reminders, skipping digest");
            return Ok(None);
        }

        let link = format!("{}/app/delivery-reminder", self.site_url);
        let summary = DigestSummary {
            open,
            critical,
            recipients: recipients.len(),
        };
        self.mailer
            .send(OutgoingEmail {
                recipients,
                subject: digest_subject(open, critical),
                message: digest_body(open, critical, &link),
            })
            .await?;

        info!("📬 Daily digest sent ({open} open, {critical} critical)");
        Ok(Some(summary))
    }

    pub async fn cleanup_closed_reminders(&self) -> Result<CleanupOutcome> {
        self.cleanup_closed_reminders_on(today()).await
    }

    /// Archive or delete closed reminders not modified within the retention window
    pub async fn cleanup_closed_reminders_on(&self, today: NaiveDate) -> Result<CleanupOutcome> {
        let settings = self.settings.get().await?;
        if !settings.auto_cleanup_enabled {
            return Ok(CleanupOutcome::default());
        }

        let _guard = self.lifecycle.lock().await;
        let cutoff = add_days(today, 0i64.saturating_sub(settings.cleanup_after_days))?;
        let old = self.database.get_closed_reminders_before(cutoff).await?;

        let mut outcome = CleanupOutcome::default();
        for name in &old {
            if settings.archive_closed_reminders {
                self.database.archive_reminder(name).await?;
                self.database
                    .add_reminder_comment(
                        name,
                        comment_type::ARCHIVED,
                        &format!("Archived after {} days closed.", settings.cleanup_after_days),
                    )
                    .await?;
                outcome.archived += 1;
            } else {
                self.database.delete_reminder(name).await?;
                outcome.deleted += 1;
            }
        }

        if !old.is_empty() {
            info!(
                "🧹 Cleaned up {} old reminders ({} archived, {} deleted).",
                old.len(),
                outcome.archived,
                outcome.deleted
            );
        }
        Ok(outcome)
    }

    pub async fn list_reminders(
        &self,
        status: Option<ReminderStatus>,
        purchase_order: Option<&str>,
    ) -> Result<Vec<DeliveryReminder>> {
        self.database.list_reminders(status, purchase_order).await
    }

    // --- Lifecycle ---

    /// Works out every line's action first and only then writes, so a receipt that
    /// fails validation part way through leaves no reminder behind.
    async fn process_receipt(
        &self,
        receipt: &PurchaseReceipt,
        settings: &Settings,
        today: NaiveDate,
    ) -> Result<ReceiptOutcome> {
        let mut planned = Vec::new();
        let mut seen = HashSet::new();
        for item in &receipt.items {
            let Some(po_item) = item.purchase_order_item.as_deref() else {
                continue;
            };
            // Totals are per order row, so a repeated row needs no second pass
            if !seen.insert(po_item) {
                continue;
            }
            planned.push(self.plan_line(receipt, item, po_item).await?);
        }

        let mut outcome = ReceiptOutcome::default();
        let mut created = Vec::new();
        for line in &planned {
            match &line.action {
                LineAction::Close(name) => {
                    let reason = format!("Fulfilled by {} {}", receipt.doctype(), receipt.name);
                    if self.close_reminder(name, &reason).await? {
                        outcome.closed.push(name.clone());
                    }
                }
                LineAction::Update(name) => {
                    self.update_reminder(name, line.pending, receipt).await?;
                    outcome.updated.push(name.clone());
                }
                LineAction::Create(order) => {
                    let reminder = self
                        .create_reminder(line, order, receipt, settings, today)
                        .await?;
                    outcome.created.push(reminder.name.clone());
                    created.push(reminder);
                }
                LineAction::Nothing => {}
            }
        }

        if !created.is_empty() {
            outcome.notifications = self
                .send_consolidated_notifications(created, NEW_REMINDERS_SUBJECT)
                .await?;
        }

        Ok(outcome)
    }

    /// Read-only pass over one receipt line
    async fn plan_line<'a>(
        &self,
        receipt: &PurchaseReceipt,
        item: &'a PurchaseReceiptItem,
        po_item: &'a str,
    ) -> Result<PlannedLine<'a>> {
        let ordered = self
            .database
            .get_purchase_order_item(po_item)
            .await?
            .map(|row| row.qty)
            .unwrap_or(0.0);
        let received = self.database.get_total_received_qty(po_item).await?;
        let pending = ordered - received;
        let existing = self.database.find_open_reminder(po_item).await?;

        debug!(
            "{} row {}: ordered {}, received {}, pending {}",
            receipt.name, po_item, ordered, received, pending
        );

        let action = match existing {
            Some(name) if pending <= 0.0 => LineAction::Close(name),
            Some(name) => LineAction::Update(name),
            None if pending > 0.0 => LineAction::Create(self.order_for_line(item, po_item).await?),
            None => LineAction::Nothing,
        };

        Ok(PlannedLine {
            item,
            po_item,
            ordered,
            pending,
            action,
        })
    }

    /// Order header a receipt line points at. Missing links are errors.
    async fn order_for_line(&self, item: &PurchaseReceiptItem, po_item: &str) -> Result<PurchaseOrder> {
        let po_name = item.purchase_order.as_deref().ok_or_else(|| {
            anyhow!(
                "Receipt row {} links order row {} without a purchase order",
                item.name,
                po_item
            )
        })?;
        self.database
            .get_purchase_order(po_name)
            .await?
            .ok_or_else(|| anyhow!("Purchase Order {} not found", po_name))
    }

    async fn create_reminder(
        &self,
        line: &PlannedLine<'_>,
        order: &PurchaseOrder,
        receipt: &PurchaseReceipt,
        settings: &Settings,
        today: NaiveDate,
    ) -> Result<DeliveryReminder> {
        let expected_delivery_date = match order.schedule_date {
            Some(date) => date,
            None => add_days(today, settings.default_delivery_days)?,
        };
        let new = NewReminder {
            purchase_order: order.name.clone(),
            purchase_order_item: line.po_item.to_string(),
            supplier: order.supplier.clone(),
            item_code: line.item.item_code.clone(),
            pending_qty: line.pending,
            triggering_receipt: Some(receipt.name.clone()),
            expected_delivery_date,
            priority: classify(line.pending, line.ordered, &settings.priority_thresholds()),
            next_follow_up_date: add_days(today, settings.default_follow_up_days)?,
        };

        let reminder = self.database.insert_reminder(&new).await?;
        info!(
            "🔔 Created {} for {} on {} ({} pending, {})",
            reminder.name,
            reminder.item_code,
            reminder.purchase_order,
            format_qty(line.pending),
            reminder.priority
        );
        Ok(reminder)
    }

    async fn update_reminder(
        &self,
        name: &str,
        pending: f64,
        receipt: &PurchaseReceipt,
    ) -> Result<()> {
        self.database.set_reminder_pending_qty(name, pending).await?;
        self.database
            .add_reminder_comment(
                name,
                comment_type::UPDATED,
                &format!(
                    "Pending qty set to {} by {} {}",
                    format_qty(pending),
                    receipt.doctype(),
                    receipt.name
                ),
            )
            .await?;
        debug!("Updated {name}: pending {pending}");
        Ok(())
    }

    async fn close_reminder(&self, name: &str, reason: &str) -> Result<bool> {
        if !self.database.close_reminder(name).await? {
            return Ok(false);
        }
        self.database
            .add_reminder_comment(name, comment_type::AUTO_CLOSED, reason)
            .await?;
        info!("✅ Closed {name}: {reason}");
        Ok(true)
    }

    /// One notification per order owner covering all of their new reminders
    async fn send_consolidated_notifications(
        &self,
        reminders: Vec<DeliveryReminder>,
        subject: &str,
    ) -> Result<usize> {
        let mut entries = Vec::with_capacity(reminders.len());
        for reminder in reminders {
            match self.database.get_purchase_order(&reminder.purchase_order).await? {
                Some(order) => entries.push((order.owner, reminder)),
                None => warn!(
                    "No owner for {} (PO {} missing), skipping notification",
                    reminder.name, reminder.purchase_order
                ),
            }
        }

        let logs = consolidated_notifications(entries, subject);
        for log in &logs {
            self.database.insert_notification_log(log).await?;
        }
        Ok(logs.len())
    }
}
