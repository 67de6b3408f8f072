//! # Purchase History API
//!
//! Recent submitted order rows for an item within a project and company, with pending
//! quantity and delivery status, cached per the settings document.
//!
//! - **Version**: 1.1.1
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.1: Caller limits capped at `MAX_HISTORY_ITEMS`
//! - 1.1.0: Order-level invalidation clears every cached limit
//! - 1.0.0: Initial release

use crate::core::documents::PurchaseOrder;
use crate::database::Database;
use crate::features::history::cache::{HistoryCache, HistoryKey};
use crate::features::settings::document::MAX_HISTORY_ITEMS;
use crate::features::settings::SettingsStore;
use anyhow::Result;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fallback row limit when neither the caller nor the settings give one
const DEFAULT_HISTORY_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Completed,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseHistoryEntry {
    /// Purchase order name
    pub parent: String,
    pub creation: String,
    pub qty: f64,
    pub rate: f64,
    pub amount: f64,
    pub supplier: String,
    pub received_qty: f64,
    pub pending_qty: f64,
    pub delivery_status: DeliveryStatus,
}

impl PurchaseHistoryEntry {
    pub fn new(
        parent: String,
        creation: String,
        qty: f64,
        rate: f64,
        amount: f64,
        supplier: String,
        received_qty: f64,
    ) -> Self {
        let pending_qty = qty - received_qty;
        let delivery_status = if pending_qty <= 0.0 {
            DeliveryStatus::Completed
        } else {
            DeliveryStatus::Pending
        };

        PurchaseHistoryEntry {
            parent,
            creation,
            qty,
            rate,
            amount,
            supplier,
            received_qty,
            pending_qty,
            delivery_status,
        }
    }
}

#[derive(Clone)]
pub struct PurchaseHistoryApi {
    database: Database,
    settings: SettingsStore,
    cache: HistoryCache,
}

impl PurchaseHistoryApi {
    pub fn new(database: Database, settings: SettingsStore, cache: HistoryCache) -> Self {
        Self {
            database,
            settings,
            cache,
        }
    }

    pub fn cache(&self) -> &HistoryCache {
        &self.cache
    }

    /// Purchase history for an item in a project and company.
    ///
    /// Returns an empty list when any key is blank or the feature is switched off.
    /// A `limit` of `None` or `0` falls back to `max_history_items`. Any limit is
    /// capped at [`MAX_HISTORY_ITEMS`].
    pub async fn get_item_project_history(
        &self,
        item_code: &str,
        project: &str,
        company: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PurchaseHistoryEntry>> {
        if item_code.is_empty() || project.is_empty() || company.is_empty() {
            return Ok(vec![]);
        }

        let settings = self.settings.get().await?;
        if !settings.enable_purchase_history {
            return Ok(vec![]);
        }

        let limit = match limit {
            Some(n) if n > 0 => n,
            _ if settings.max_history_items > 0 => settings.max_history_items,
            _ => DEFAULT_HISTORY_LIMIT,
        }
        .min(MAX_HISTORY_ITEMS);

        let key = HistoryKey::new(item_code, project, company, limit);
        if let Some(cached) = self.cache.get(&key) {
            // Empty results are never treated as a hit
            if !cached.is_empty() {
                debug!("History cache hit for {item_code}/{project}/{company} (limit {limit})");
                return Ok(cached);
            }
        }

        let history = self
            .database
            .get_item_project_history(item_code, project, company, limit)
            .await
            .map_err(|e| {
                error!("Error fetching purchase history: {e}");
                e
            })?;

        self.cache.set(
            key,
            history.clone(),
            Duration::from_secs(settings.history_ttl_secs()),
        );
        Ok(history)
    }

    /// Forget cached history for every row of an order
    pub fn clear_for_order(&self, order: &PurchaseOrder) -> usize {
        order
            .items
            .iter()
            .map(|item| {
                self.cache.invalidate(
                    &item.item_code,
                    item.project.as_deref().unwrap_or_default(),
                    &order.company,
                )
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::documents::{
        DocStatus, PurchaseOrderItem, PurchaseReceipt, PurchaseReceiptItem,
    };
    use crate::features::settings::Settings;

    async fn setup() -> (Database, SettingsStore, PurchaseHistoryApi) {
        let db = Database::in_memory().await.unwrap();
        let settings = SettingsStore::new(db.clone());
        let api = PurchaseHistoryApi::new(db.clone(), settings.clone(), HistoryCache::new());
        (db, settings, api)
    }

    fn order(name: &str, creation: &str, qty: f64, docstatus: DocStatus) -> PurchaseOrder {
        PurchaseOrder {
            name: name.to_string(),
            supplier: "Acme Fasteners".to_string(),
            company: "Northwind".to_string(),
            owner: "buyer@northwind.test".to_string(),
            schedule_date: None,
            docstatus,
            creation: Some(creation.to_string()),
            items: vec![PurchaseOrderItem {
                name: format!("{name}-1"),
                item_code: "BOLT-M8".to_string(),
                project: Some("PROJ-A".to_string()),
                qty,
                rate: 2.0,
                amount: qty * 2.0,
                received_qty: 0.0,
            }],
        }
    }

    #[test]
    fn test_entry_status() {
        let pending = PurchaseHistoryEntry::new(
            "PO-1".into(), "t".into(), 10.0, 1.0, 10.0, "S".into(), 4.0,
        );
        assert_eq!(pending.pending_qty, 6.0);
        assert_eq!(pending.delivery_status, DeliveryStatus::Pending);

        let done = PurchaseHistoryEntry::new(
            "PO-1".into(), "t".into(), 10.0, 1.0, 10.0, "S".into(), 12.0,
        );
        assert_eq!(done.pending_qty, -2.0);
        assert_eq!(done.delivery_status, DeliveryStatus::Completed);
    }

    #[tokio::test]
    async fn test_blank_keys_return_empty() {
        let (_db, _settings, api) = setup().await;
        assert!(api
            .get_item_project_history("", "PROJ-A", "Northwind", None)
            .await
            .unwrap()
            .is_empty());
        assert!(api
            .get_item_project_history("BOLT-M8", "PROJ-A", "", None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_disabled_returns_empty() {
        let (db, settings, api) = setup().await;
        db.insert_purchase_order(&order("PO-1", "2026-10-01 10:00:00", 10.0, DocStatus::Submitted))
            .await
            .unwrap();
        settings
            .save(Settings {
                enable_purchase_history: false,
                ..Settings::default()
            })
            .await
            .unwrap();

        assert!(api
            .get_item_project_history("BOLT-M8", "PROJ-A", "Northwind", None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_history_newest_first_and_submitted_only() {
        let (db, _settings, api) = setup().await;
        db.insert_purchase_order(&order("PO-1", "2026-10-01 10:00:00", 10.0, DocStatus::Submitted))
            .await
            .unwrap();
        db.insert_purchase_order(&order("PO-2", "2026-10-05 10:00:00", 4.0, DocStatus::Submitted))
            .await
            .unwrap();
        db.insert_purchase_order(&order("PO-3", "2026-10-06 10:00:00", 8.0, DocStatus::Draft))
            .await
            .unwrap();
        db.insert_purchase_receipt(&PurchaseReceipt {
            name: "PR-1".to_string(),
            supplier: "Acme Fasteners".to_string(),
            company: "Northwind".to_string(),
            docstatus: DocStatus::Submitted,
            items: vec![PurchaseReceiptItem {
                name: "PR-1-1".to_string(),
                item_code: "BOLT-M8".to_string(),
                qty: 4.0,
                purchase_order: Some("PO-2".to_string()),
                purchase_order_item: Some("PO-2-1".to_string()),
            }],
        })
        .await
        .unwrap();

        let history = api
            .get_item_project_history("BOLT-M8", "PROJ-A", "Northwind", None)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].parent, "PO-2");
        assert_eq!(history[0].delivery_status, DeliveryStatus::Completed);
        assert_eq!(history[1].parent, "PO-1");
        assert_eq!(history[1].pending_qty, 10.0);

        let limited = api
            .get_item_project_history("BOLT-M8", "PROJ-A", "Northwind", Some(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_cached_until_order_invalidated() {
        let (db, _settings, api) = setup().await;
        let first = order("PO-1", "2026-10-01 10:00:00", 10.0, DocStatus::Submitted);
        db.insert_purchase_order(&first).await.unwrap();

        let before = api
            .get_item_project_history("BOLT-M8", "PROJ-A", "Northwind", None)
            .await
            .unwrap();
        assert_eq!(before.len(), 1);

        let second = order("PO-2", "2026-10-05 10:00:00", 4.0, DocStatus::Submitted);
        db.insert_purchase_order(&second).await.unwrap();

        // Served from cache
        let cached = api
            .get_item_project_history("BOLT-M8", "PROJ-A", "Northwind", None)
            .await
            .unwrap();
        assert_eq!(cached.len(), 1);

        assert_eq!(api.clear_for_order(&second), 1);
        let fresh = api
            .get_item_project_history("BOLT-M8", "PROJ-A", "Northwind", None)
            .await
            .unwrap();
        assert_eq!(fresh.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_result_is_not_served_from_cache() {
        let (db, _settings, api) = setup().await;
        assert!(api
            .get_item_project_history("BOLT-M8", "PROJ-A", "Northwind", None)
            .await
            .unwrap()
            .is_empty());

        db.insert_purchase_order(&order("PO-1", "2026-10-01 10:00:00", 10.0, DocStatus::Submitted))
            .await
            .unwrap();
        assert_eq!(
            api.get_item_project_history("BOLT-M8", "PROJ-A", "Northwind", None)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_oversized_limit_is_capped() {
        let (db, _settings, api) = setup().await;
        db.insert_purchase_order(&order("PO-1", "2026-10-01 10:00:00", 10.0, DocStatus::Submitted))
            .await
            .unwrap();
        db.insert_purchase_order(&order("PO-2", "2026-10-02 10:00:00", 4.0, DocStatus::Submitted))
            .await
            .unwrap();

        let history = api
            .get_item_project_history("BOLT-M8", "PROJ-A", "Northwind", Some(usize::MAX))
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].parent, "PO-2");

        // The capped limit is the one that got cached
        let capped = HistoryKey::new("BOLT-M8", "PROJ-A", "Northwind", MAX_HISTORY_ITEMS);
        assert!(api.cache.get(&capped).is_some());
    }
}
