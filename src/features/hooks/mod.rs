//! # Document Hooks
//!
//! Applies purchase order and receipt state changes from the host, then runs the
//! reminder and history-cache hooks bound to each change.
//!
//! - **Version**: 1.2.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.0: Failed receipt hooks undo the stored change; updates keep the stored docstatus
//! - 1.1.0: Receipt cancellation recomputes reminders
//! - 1.0.0: Initial release

use crate::core::documents::{DocStatus, PurchaseOrder, PurchaseReceipt};
use crate::database::Database;
use crate::features::reminders::{ReceiptOutcome, ReminderManager};
use anyhow::{anyhow, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub enum DocumentEvent {
    PurchaseOrderSubmitted(PurchaseOrder),
    PurchaseOrderUpdated(PurchaseOrder),
    PurchaseOrderCancelled(String),
    PurchaseReceiptSubmitted(PurchaseReceipt),
    PurchaseReceiptCancelled(String),
}

impl DocumentEvent {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentEvent::PurchaseOrderSubmitted(_) => "purchase order submitted",
            DocumentEvent::PurchaseOrderUpdated(_) => "purchase order updated",
            DocumentEvent::PurchaseOrderCancelled(_) => "purchase order cancelled",
            DocumentEvent::PurchaseReceiptSubmitted(_) => "purchase receipt submitted",
            DocumentEvent::PurchaseReceiptCancelled(_) => "purchase receipt cancelled",
        }
    }
}

/// What the hooks did for one event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookOutcome {
    pub document: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminders: Option<ReceiptOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub closed_reminders: Vec<String>,
    pub cache_entries_cleared: usize,
}

#[derive(Clone)]
pub struct HookDispatcher {
    database: Database,
    reminders: ReminderManager,
}

impl HookDispatcher {
    pub fn new(database: Database, reminders: ReminderManager) -> Self {
        Self {
            database,
            reminders,
        }
    }

    pub async fn dispatch(&self, event: DocumentEvent) -> Result<HookOutcome> {
        let label = event.label();
        let outcome = match event {
            DocumentEvent::PurchaseOrderSubmitted(mut order) => {
                order.docstatus = DocStatus::Submitted;
                self.database.insert_purchase_order(&order).await?;
                HookOutcome {
                    cache_entries_cleared: self.reminders.clear_item_history_cache(&order),
                    document: order.name,
                    ..HookOutcome::default()
                }
            }
            DocumentEvent::PurchaseOrderUpdated(mut order) => {
                let previous = self
                    .database
                    .get_purchase_order(&order.name)
                    .await?
                    .ok_or_else(|| anyhow!("Purchase Order {} not found", order.name))?;
                // Status only moves through the submit and cancel events
                if order.docstatus != previous.docstatus {
                    warn!(
                        "Ignoring docstatus {:?} on update of {} (stays {:?})",
                        order.docstatus, order.name, previous.docstatus
                    );
                    order.docstatus = previous.docstatus;
                }
                self.database.update_purchase_order(&order).await?;

                // Rows may have moved to another item or project
                let cleared = self.reminders.clear_item_history_cache(&previous)
                    + self.reminders.clear_item_history_cache(&order);
                HookOutcome {
                    document: order.name,
                    cache_entries_cleared: cleared,
                    ..HookOutcome::default()
                }
            }
            DocumentEvent::PurchaseOrderCancelled(name) => {
                let order = self
                    .database
                    .get_purchase_order(&name)
                    .await?
                    .ok_or_else(|| anyhow!("Purchase Order {} not found", name))?;
                self.database
                    .set_purchase_order_status(&name, DocStatus::Cancelled)
                    .await?;

                let closed = self.reminders.handle_po_cancellation(&order).await?;
                HookOutcome {
                    document: name,
                    closed_reminders: closed,
                    cache_entries_cleared: self.reminders.clear_item_history_cache(&order),
                    ..HookOutcome::default()
                }
            }
            DocumentEvent::PurchaseReceiptSubmitted(mut receipt) => {
                receipt.docstatus = DocStatus::Submitted;
                self.database.insert_purchase_receipt(&receipt).await?;
                let reminders = match self.reminders.update_reminders_for_receipt(&receipt).await {
                    Ok(reminders) => reminders,
                    Err(e) => {
                        // Undo the insert so the host can fix the receipt and resend it
                        if let Err(undo) = self.database.delete_purchase_receipt(&receipt.name).await {
                            error!("Could not remove {} after failure: {}", receipt.name, undo);
                        }
                        return Err(e);
                    }
                };
                HookOutcome {
                    document: receipt.name,
                    reminders: Some(reminders),
                    ..HookOutcome::default()
                }
            }
            DocumentEvent::PurchaseReceiptCancelled(name) => {
                let receipt = self
                    .database
                    .get_purchase_receipt(&name)
                    .await?
                    .ok_or_else(|| anyhow!("Purchase Receipt {} not found", name))?;
                self.database
                    .set_purchase_receipt_status(&name, DocStatus::Cancelled)
                    .await?;
                let reminders = match self.reminders.update_reminders_for_receipt(&receipt).await {
                    Ok(reminders) => reminders,
                    Err(e) => {
                        if let Err(undo) = self
                            .database
                            .set_purchase_receipt_status(&name, receipt.docstatus)
                            .await
                        {
                            error!("Could not restore {} after failure: {}", name, undo);
                        }
                        return Err(e);
                    }
                };
                HookOutcome {
                    document: name,
                    reminders: Some(reminders),
                    ..HookOutcome::default()
                }
            }
        };

        info!("🪝 Handled {} for {}", label, outcome.document);
        Ok(outcome)
    }
}
