//! # Reminder Service
//!
//! Wires the database, settings, history API, reminder engine and hooks together
//! and answers host requests.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: On-demand job requests
//! - 1.0.0: Initial release

use crate::database::Database;
use crate::features::history::{HistoryCache, PurchaseHistoryApi};
use crate::features::hooks::{DocumentEvent, HookDispatcher};
use crate::features::notifications::Mailer;
use crate::features::reminders::{run_job, ReminderManager};
use crate::features::settings::SettingsStore;
use crate::ipc::protocol::HostRequest;
use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Clone)]
pub struct ReminderService {
    pub database: Database,
    pub settings: SettingsStore,
    pub history: PurchaseHistoryApi,
    pub reminders: ReminderManager,
    pub hooks: HookDispatcher,
}

impl ReminderService {
    pub fn new(database: Database, mailer: Arc<dyn Mailer>, site_url: &str) -> Self {
        let settings = SettingsStore::new(database.clone());
        let history = PurchaseHistoryApi::new(database.clone(), settings.clone(), HistoryCache::new());
        let reminders = ReminderManager::new(
            database.clone(),
            settings.clone(),
            history.clone(),
            mailer,
            site_url,
        );
        let hooks = HookDispatcher::new(database.clone(), reminders.clone());

        ReminderService {
            database,
            settings,
            history,
            reminders,
            hooks,
        }
    }

    /// Run one host request. The returned value becomes the response `data`.
    pub async fn handle(&self, request: HostRequest) -> Result<Value> {
        match request {
            HostRequest::Ping { .. } => Ok(json!({ "pong": true })),
            HostRequest::SubmitPurchaseOrder { order, .. } => {
                self.dispatch(DocumentEvent::PurchaseOrderSubmitted(order)).await
            }
            HostRequest::UpdatePurchaseOrder { order, .. } => {
                self.dispatch(DocumentEvent::PurchaseOrderUpdated(order)).await
            }
            HostRequest::CancelPurchaseOrder { name, .. } => {
                self.dispatch(DocumentEvent::PurchaseOrderCancelled(name)).await
            }
            HostRequest::SubmitPurchaseReceipt { receipt, .. } => {
                self.dispatch(DocumentEvent::PurchaseReceiptSubmitted(receipt)).await
            }
            HostRequest::CancelPurchaseReceipt { name, .. } => {
                self.dispatch(DocumentEvent::PurchaseReceiptCancelled(name)).await
            }
            HostRequest::GetItemProjectHistory {
                item_code,
                project,
                company,
                limit,
                ..
            } => {
                let history = self
                    .history
                    .get_item_project_history(&item_code, &project, &company, limit)
                    .await?;
                Ok(serde_json::to_value(history)?)
            }
            HostRequest::GetSettings { .. } => Ok(serde_json::to_value(self.settings.get().await?)?),
            HostRequest::UpdateSettings { settings, .. } => {
                self.settings.save(settings).await?;
                Ok(serde_json::to_value(self.settings.get().await?)?)
            }
            HostRequest::ListReminders {
                status,
                purchase_order,
                ..
            } => {
                let reminders = self
                    .reminders
                    .list_reminders(status, purchase_order.as_deref())
                    .await?;
                Ok(serde_json::to_value(reminders)?)
            }
            HostRequest::RunJob { job, .. } => run_job(&self.reminders, job).await,
        }
    }

    async fn dispatch(&self, event: DocumentEvent) -> Result<Value> {
        let outcome = self.hooks.dispatch(event).await?;
        Ok(serde_json::to_value(outcome)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::documents::{
        DocStatus, PurchaseOrder, PurchaseOrderItem, PurchaseReceipt, PurchaseReceiptItem,
    };
    use crate::features::notifications::RecordingMailer;
    use crate::features::reminders::{Job, ReminderStatus};
    use crate::features::settings::Settings;

    async fn service() -> ReminderService {
        let db = Database::in_memory().await.unwrap();
        ReminderService::new(db, Arc::new(RecordingMailer::default()), "http://localhost:8000")
    }

    fn rid() -> String {
        "req-1".to_string()
    }

    fn order() -> PurchaseOrder {
        PurchaseOrder {
            name: "PO-1".to_string(),
            supplier: "Acme Fasteners".to_string(),
            company: "Northwind".to_string(),
            owner: "buyer@northwind.test".to_string(),
            schedule_date: None,
            docstatus: DocStatus::Draft,
            creation: None,
            items: vec![PurchaseOrderItem {
                name: "PO-1-1".to_string(),
                item_code: "BOLT-M8".to_string(),
                project: Some("PROJ-A".to_string()),
                qty: 10.0,
                rate: 2.0,
                amount: 20.0,
                received_qty: 0.0,
            }],
        }
    }

    fn receipt(qty: f64) -> PurchaseReceipt {
        PurchaseReceipt {
            name: "PR-1".to_string(),
            supplier: "Acme Fasteners".to_string(),
            company: "Northwind".to_string(),
            docstatus: DocStatus::Draft,
            items: vec![PurchaseReceiptItem {
                name: "PR-1-1".to_string(),
                item_code: "BOLT-M8".to_string(),
                qty,
                purchase_order: Some("PO-1".to_string()),
                purchase_order_item: Some("PO-1-1".to_string()),
            }],
        }
    }

    #[tokio::test]
    async fn test_requests_end_to_end() {
        let service = service().await;
        service
            .handle(HostRequest::SubmitPurchaseOrder {
                request_id: rid(),
                order: order(),
            })
            .await
            .unwrap();

        let data = service
            .handle(HostRequest::SubmitPurchaseReceipt {
                request_id: rid(),
                receipt: receipt(3.0),
            })
            .await
            .unwrap();
        assert_eq!(data["document"], "PR-1");
        assert_eq!(data["reminders"]["created"][0], "DR-00001");

        let listed = service
            .handle(HostRequest::ListReminders {
                request_id: rid(),
                status: Some(ReminderStatus::Open),
                purchase_order: None,
            })
            .await
            .unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["pending_qty"], 7.0);

        let history = service
            .handle(HostRequest::GetItemProjectHistory {
                request_id: rid(),
                item_code: "BOLT-M8".to_string(),
                project: "PROJ-A".to_string(),
                company: "Northwind".to_string(),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(history[0]["parent"], "PO-1");
        assert_eq!(history[0]["received_qty"], 3.0);
        assert_eq!(history[0]["delivery_status"], "Pending");
    }

    #[tokio::test]
    async fn test_settings_requests() {
        let service = service().await;
        let current = service
            .handle(HostRequest::GetSettings { request_id: rid() })
            .await
            .unwrap();
        assert_eq!(current["default_follow_up_days"], 3);

        let updated = service
            .handle(HostRequest::UpdateSettings {
                request_id: rid(),
                settings: Settings {
                    default_follow_up_days: 5,
                    ..Settings::default()
                },
            })
            .await
            .unwrap();
        assert_eq!(updated["default_follow_up_days"], 5);

        // Invalid settings are rejected and the stored copy is unchanged
        let rejected = service
            .handle(HostRequest::UpdateSettings {
                request_id: rid(),
                settings: Settings {
                    default_follow_up_days: 0,
                    ..Settings::default()
                },
            })
            .await;
        assert!(rejected.is_err());
        assert_eq!(service.settings.get().await.unwrap().default_follow_up_days, 5);
    }

    #[tokio::test]
    async fn test_ping_and_jobs() {
        let service = service().await;
        let pong = service
            .handle(HostRequest::Ping { request_id: rid() })
            .await
            .unwrap();
        assert_eq!(pong["pong"], true);

        let job = service
            .handle(HostRequest::RunJob {
                request_id: rid(),
                job: Job::Escalate,
            })
            .await
            .unwrap();
        assert_eq!(job["escalated"], 0);
    }
}
