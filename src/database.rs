//! # Database
//!
//! SQLite document store for purchase documents, delivery reminders and their side tables
//! (comments, notification log, email outbox, settings, naming series).
//!
//! - **Version**: 1.4.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.4.0: Multi-statement writes run in one transaction; receipt removal
//! - 1.3.0: Email outbox table for queued digest mail
//! - 1.2.0: `archived` column on reminders
//! - 1.1.0: Received quantity maintained on receipt submit/cancel
//! - 1.0.0: Initial schema

use crate::core::dates::{format_date, now_timestamp, parse_date};
use crate::core::documents::{
    DocStatus, PurchaseOrder, PurchaseOrderItem, PurchaseReceipt, PurchaseReceiptItem,
};
use crate::features::history::PurchaseHistoryEntry;
use crate::features::notifications::{NotificationLog, OutgoingEmail, QueuedEmail};
use crate::features::reminders::{
    DeliveryReminder, NewReminder, Priority, ReminderComment, ReminderLevel, ReminderStatus,
};
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use log::{debug, info, warn};
use sqlite::{Connection, State, Statement};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Naming series prefix for delivery reminders
pub const REMINDER_SERIES: &str = "DR-";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS purchase_orders (
        name TEXT PRIMARY KEY,
        supplier TEXT NOT NULL,
        company TEXT NOT NULL,
        owner TEXT NOT NULL,
        schedule_date TEXT,
        docstatus INTEGER NOT NULL DEFAULT 0,
        creation TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS purchase_order_items (
        name TEXT PRIMARY KEY,
        parent TEXT NOT NULL,
        idx INTEGER NOT NULL,
        item_code TEXT NOT NULL,
        project TEXT,
        qty REAL NOT NULL DEFAULT 0,
        rate REAL NOT NULL DEFAULT 0,
        amount REAL NOT NULL DEFAULT 0,
        received_qty REAL NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_poi_parent ON purchase_order_items(parent);
    CREATE INDEX IF NOT EXISTS idx_poi_item_project ON purchase_order_items(item_code, project);

    CREATE TABLE IF NOT EXISTS purchase_receipts (
        name TEXT PRIMARY KEY,
        supplier TEXT NOT NULL DEFAULT '',
        company TEXT NOT NULL DEFAULT '',
        docstatus INTEGER NOT NULL DEFAULT 0,
        creation TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS purchase_receipt_items (
        name TEXT PRIMARY KEY,
        parent TEXT NOT NULL,
        idx INTEGER NOT NULL,
        item_code TEXT NOT NULL,
        qty REAL NOT NULL DEFAULT 0,
        purchase_order TEXT,
        purchase_order_item TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_pri_parent ON purchase_receipt_items(parent);
    CREATE INDEX IF NOT EXISTS idx_pri_po_item ON purchase_receipt_items(purchase_order_item);

    CREATE TABLE IF NOT EXISTS delivery_reminders (
        name TEXT PRIMARY KEY,
        purchase_order TEXT NOT NULL,
        purchase_order_item TEXT NOT NULL,
        supplier TEXT NOT NULL,
        item_code TEXT NOT NULL,
        pending_qty REAL NOT NULL,
        status TEXT NOT NULL DEFAULT 'Open',
        auto_created INTEGER NOT NULL DEFAULT 0,
        triggering_receipt TEXT,
        expected_delivery_date TEXT NOT NULL,
        priority TEXT NOT NULL,
        reminder_level TEXT NOT NULL DEFAULT 'First',
        next_follow_up_date TEXT NOT NULL,
        archived INTEGER NOT NULL DEFAULT 0,
        creation TEXT NOT NULL,
        modified TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_dr_po_item_status ON delivery_reminders(purchase_order_item, status);
    CREATE INDEX IF NOT EXISTS idx_dr_status_follow_up ON delivery_reminders(status, next_follow_up_date);

    CREATE TABLE IF NOT EXISTS reminder_comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        reminder TEXT NOT NULL,
        comment_type TEXT NOT NULL,
        text TEXT NOT NULL,
        creation TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_comments_reminder ON reminder_comments(reminder);

    CREATE TABLE IF NOT EXISTS notification_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        subject TEXT NOT NULL,
        document_type TEXT NOT NULL,
        document_name TEXT NOT NULL,
        for_user TEXT NOT NULL,
        email_content TEXT NOT NULL,
        creation TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS email_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        recipients TEXT NOT NULL,
        subject TEXT NOT NULL,
        message TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'Not Sent',
        creation TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS naming_series (
        series TEXT PRIMARY KEY,
        current INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS settings (
        doctype TEXT PRIMARY KEY,
        data TEXT NOT NULL,
        modified TEXT NOT NULL
    );
";

const REMINDER_COLUMNS: &str = "name, purchase_order, purchase_order_item, supplier, item_code, \
     pending_qty, status, auto_created, triggering_receipt, expected_delivery_date, priority, \
     reminder_level, next_follow_up_date, archived, creation, modified";

#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and apply the schema
    pub async fn new(path: &str) -> Result<Self> {
        let connection = sqlite::open(path)?;
        connection.execute("PRAGMA journal_mode = WAL;")?;
        connection.execute(SCHEMA)?;
        info!("Database ready at {path}");

        Ok(Database {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Private in-memory database, used by tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        let connection = sqlite::open(":memory:")?;
        connection.execute(SCHEMA)?;

        Ok(Database {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    // ------------------------------------------------------------------
    // Purchase orders
    // ------------------------------------------------------------------

    pub async fn insert_purchase_order(&self, order: &PurchaseOrder) -> Result<()> {
        let conn = self.connection.lock().await;
        in_transaction(&conn, |conn| {
            if exists(conn, "purchase_orders", &order.name)? {
                return Err(anyhow!("Purchase Order {} already exists", order.name));
            }

            let creation = order.creation.clone().unwrap_or_else(now_timestamp);
            let schedule_date = order.schedule_date.map(format_date);

            let mut statement = conn.prepare(
                "INSERT INTO purchase_orders (name, supplier, company, owner, schedule_date, docstatus, creation)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;
            statement.bind((1, order.name.as_str()))?;
            statement.bind((2, order.supplier.as_str()))?;
            statement.bind((3, order.company.as_str()))?;
            statement.bind((4, order.owner.as_str()))?;
            statement.bind((5, schedule_date.as_deref()))?;
            statement.bind((6, order.docstatus.as_i64()))?;
            statement.bind((7, creation.as_str()))?;
            statement.next()?;

            insert_order_items(conn, &order.name, &order.items)?;
            debug!("Inserted purchase order {} ({} items)", order.name, order.items.len());
            Ok(())
        })
    }

    /// Replace header and rows of an existing order. Received quantities are recomputed.
    pub async fn update_purchase_order(&self, order: &PurchaseOrder) -> Result<()> {
        let conn = self.connection.lock().await;
        in_transaction(&conn, |conn| {
            if !exists(conn, "purchase_orders", &order.name)? {
                return Err(anyhow!("Purchase Order {} not found", order.name));
            }

            let schedule_date = order.schedule_date.map(format_date);
            let mut statement = conn.prepare(
                "UPDATE purchase_orders
                 SET supplier = ?, company = ?, owner = ?, schedule_date = ?, docstatus = ?
                 WHERE name = ?",
            )?;
            statement.bind((1, order.supplier.as_str()))?;
            statement.bind((2, order.company.as_str()))?;
            statement.bind((3, order.owner.as_str()))?;
            statement.bind((4, schedule_date.as_deref()))?;
            statement.bind((5, order.docstatus.as_i64()))?;
            statement.bind((6, order.name.as_str()))?;
            statement.next()?;

            let mut delete = conn.prepare("DELETE FROM purchase_order_items WHERE parent = ?")?;
            delete.bind((1, order.name.as_str()))?;
            delete.next()?;

            insert_order_items(conn, &order.name, &order.items)?;
            for item in &order.items {
                refresh_received_qty(conn, &item.name)?;
            }
            Ok(())
        })
    }

    pub async fn set_purchase_order_status(&self, name: &str, status: DocStatus) -> Result<()> {
        let conn = self.connection.lock().await;
        if !exists(&conn, "purchase_orders", name)? {
            return Err(anyhow!("Purchase Order {} not found", name));
        }
        let mut statement = conn.prepare("UPDATE purchase_orders SET docstatus = ? WHERE name = ?")?;
        statement.bind((1, status.as_i64()))?;
        statement.bind((2, name))?;
        statement.next()?;
        Ok(())
    }

    pub async fn get_purchase_order(&self, name: &str) -> Result<Option<PurchaseOrder>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT name, supplier, company, owner, schedule_date, docstatus, creation
             FROM purchase_orders WHERE name = ?",
        )?;
        statement.bind((1, name))?;

        if statement.next()? != State::Row {
            return Ok(None);
        }

        let schedule_date = statement
            .read::<Option<String>, _>("schedule_date")?
            .map(|d| parse_date(&d))
            .transpose()?;
        let mut order = PurchaseOrder {
            name: statement.read::<String, _>("name")?,
            supplier: statement.read::<String, _>("supplier")?,
            company: statement.read::<String, _>("company")?,
            owner: statement.read::<String, _>("owner")?,
            schedule_date,
            docstatus: DocStatus::from_i64(statement.read::<i64, _>("docstatus")?)?,
            creation: Some(statement.read::<String, _>("creation")?),
            items: vec![],
        };

        let mut items = conn.prepare(
            "SELECT name, item_code, project, qty, rate, amount, received_qty
             FROM purchase_order_items WHERE parent = ? ORDER BY idx",
        )?;
        items.bind((1, name))?;
        while let State::Row = items.next()? {
            order.items.push(read_order_item(&items)?);
        }

        Ok(Some(order))
    }

    pub async fn get_purchase_order_item(&self, name: &str) -> Result<Option<PurchaseOrderItem>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT name, item_code, project, qty, rate, amount, received_qty
             FROM purchase_order_items WHERE name = ?",
        )?;
        statement.bind((1, name))?;
        if statement.next()? == State::Row {
            Ok(Some(read_order_item(&statement)?))
        } else {
            Ok(None)
        }
    }

    /// Submitted order rows for an item/project/company, newest first
    pub async fn get_item_project_history(
        &self,
        item_code: &str,
        project: &str,
        company: &str,
        limit: usize,
    ) -> Result<Vec<PurchaseHistoryEntry>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT po.name AS parent, po.creation AS creation, po.supplier AS supplier,
                    poi.qty AS qty, poi.rate AS rate, poi.amount AS amount,
                    poi.received_qty AS received_qty
             FROM purchase_order_items poi
             JOIN purchase_orders po ON po.name = poi.parent
             WHERE poi.item_code = ? AND poi.project = ? AND po.company = ? AND po.docstatus = 1
             ORDER BY po.creation DESC, po.name DESC, poi.idx ASC
             LIMIT ?",
        )?;
        statement.bind((1, item_code))?;
        statement.bind((2, project))?;
        statement.bind((3, company))?;
        statement.bind((4, i64::try_from(limit).unwrap_or(i64::MAX)))?;

        let mut history = Vec::new();
        while let State::Row = statement.next()? {
            history.push(PurchaseHistoryEntry::new(
                statement.read::<String, _>("parent")?,
                statement.read::<String, _>("creation")?,
                statement.read::<f64, _>("qty")?,
                statement.read::<f64, _>("rate")?,
                statement.read::<f64, _>("amount")?,
                statement.read::<String, _>("supplier")?,
                statement.read::<f64, _>("received_qty")?,
            ));
        }
        Ok(history)
    }

    // ------------------------------------------------------------------
    // Purchase receipts
    // ------------------------------------------------------------------

    pub async fn insert_purchase_receipt(&self, receipt: &PurchaseReceipt) -> Result<()> {
        let conn = self.connection.lock().await;
        in_transaction(&conn, |conn| {
            if exists(conn, "purchase_receipts", &receipt.name)? {
                return Err(anyhow!("Purchase Receipt {} already exists", receipt.name));
            }

            let creation = now_timestamp();
            let mut statement = conn.prepare(
                "INSERT INTO purchase_receipts (name, supplier, company, docstatus, creation)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            statement.bind((1, receipt.name.as_str()))?;
            statement.bind((2, receipt.supplier.as_str()))?;
            statement.bind((3, receipt.company.as_str()))?;
            statement.bind((4, receipt.docstatus.as_i64()))?;
            statement.bind((5, creation.as_str()))?;
            statement.next()?;

            for (idx, item) in receipt.items.iter().enumerate() {
                let mut row = conn.prepare(
                    "INSERT INTO purchase_receipt_items
                        (name, parent, idx, item_code, qty, purchase_order, purchase_order_item)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )?;
                row.bind((1, item.name.as_str()))?;
                row.bind((2, receipt.name.as_str()))?;
                row.bind((3, idx as i64 + 1))?;
                row.bind((4, item.item_code.as_str()))?;
                row.bind((5, item.qty))?;
                row.bind((6, item.purchase_order.as_deref()))?;
                row.bind((7, item.purchase_order_item.as_deref()))?;
                row.next()?;
            }

            if receipt.docstatus == DocStatus::Submitted {
                refresh_receipt_items(conn, &receipt.name)?;
            }
            Ok(())
        })
    }

    /// Move a receipt to a new docstatus and recompute received quantities it touches
    pub async fn set_purchase_receipt_status(&self, name: &str, status: DocStatus) -> Result<()> {
        let conn = self.connection.lock().await;
        in_transaction(&conn, |conn| {
            if !exists(conn, "purchase_receipts", name)? {
                return Err(anyhow!("Purchase Receipt {} not found", name));
            }
            let mut statement =
                conn.prepare("UPDATE purchase_receipts SET docstatus = ? WHERE name = ?")?;
            statement.bind((1, status.as_i64()))?;
            statement.bind((2, name))?;
            statement.next()?;

            refresh_receipt_items(conn, name)?;
            Ok(())
        })
    }

    /// Remove a receipt and its rows, then recompute received quantities of the order
    /// rows it pointed at. Returns false when no such receipt was stored.
    pub async fn delete_purchase_receipt(&self, name: &str) -> Result<bool> {
        let conn = self.connection.lock().await;
        in_transaction(&conn, |conn| {
            if !exists(conn, "purchase_receipts", name)? {
                return Ok(false);
            }

            let mut rows = conn.prepare(
                "SELECT DISTINCT purchase_order_item FROM purchase_receipt_items
                 WHERE parent = ? AND purchase_order_item IS NOT NULL",
            )?;
            rows.bind((1, name))?;
            let po_items = read_names(&mut rows)?;

            let mut items = conn.prepare("DELETE FROM purchase_receipt_items WHERE parent = ?")?;
            items.bind((1, name))?;
            items.next()?;

            let mut header = conn.prepare("DELETE FROM purchase_receipts WHERE name = ?")?;
            header.bind((1, name))?;
            header.next()?;

            for po_item in &po_items {
                refresh_received_qty(conn, po_item)?;
            }
            Ok(true)
        })
    }

    pub async fn get_purchase_receipt(&self, name: &str) -> Result<Option<PurchaseReceipt>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT name, supplier, company, docstatus FROM purchase_receipts WHERE name = ?",
        )?;
        statement.bind((1, name))?;
        if statement.next()? != State::Row {
            return Ok(None);
        }

        let mut receipt = PurchaseReceipt {
            name: statement.read::<String, _>("name")?,
            supplier: statement.read::<String, _>("supplier")?,
            company: statement.read::<String, _>("company")?,
            docstatus: DocStatus::from_i64(statement.read::<i64, _>("docstatus")?)?,
            items: vec![],
        };

        let mut items = conn.prepare(
            "SELECT name, item_code, qty, purchase_order, purchase_order_item
             FROM purchase_receipt_items WHERE parent = ? ORDER BY idx",
        )?;
        items.bind((1, name))?;
        while let State::Row = items.next()? {
            receipt.items.push(PurchaseReceiptItem {
                name: items.read::<String, _>("name")?,
                item_code: items.read::<String, _>("item_code")?,
                qty: items.read::<f64, _>("qty")?,
                purchase_order: items.read::<Option<String>, _>("purchase_order")?,
                purchase_order_item: items.read::<Option<String>, _>("purchase_order_item")?,
            });
        }

        Ok(Some(receipt))
    }

    /// Sum of received quantity across submitted receipts for an order row
    pub async fn get_total_received_qty(&self, po_item: &str) -> Result<f64> {
        let conn = self.connection.lock().await;
        total_received_qty(&conn, po_item)
    }

    // ------------------------------------------------------------------
    // Delivery reminders
    // ------------------------------------------------------------------

    pub async fn insert_reminder(&self, reminder: &NewReminder) -> Result<DeliveryReminder> {
        let conn = self.connection.lock().await;
        in_transaction(&conn, |conn| {
            let name = next_series_name(conn, REMINDER_SERIES)?;
            let now = now_timestamp();
            let expected = format_date(reminder.expected_delivery_date);
            let follow_up = format_date(reminder.next_follow_up_date);
            let priority = reminder.priority.to_string();
            let status = ReminderStatus::Open.to_string();
            let level = ReminderLevel::First.to_string();

            let mut statement = conn.prepare(
                "INSERT INTO delivery_reminders
                    (name, purchase_order, purchase_order_item, supplier, item_code, pending_qty,
                     status, auto_created, triggering_receipt, expected_delivery_date, priority,
                     reminder_level, next_follow_up_date, archived, creation, modified)
                 VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?, 0, ?, ?)",
            )?;
            statement.bind((1, name.as_str()))?;
            statement.bind((2, reminder.purchase_order.as_str()))?;
            statement.bind((3, reminder.purchase_order_item.as_str()))?;
            statement.bind((4, reminder.supplier.as_str()))?;
            statement.bind((5, reminder.item_code.as_str()))?;
            statement.bind((6, reminder.pending_qty))?;
            statement.bind((7, status.as_str()))?;
            statement.bind((8, reminder.triggering_receipt.as_deref()))?;
            statement.bind((9, expected.as_str()))?;
            statement.bind((10, priority.as_str()))?;
            statement.bind((11, level.as_str()))?;
            statement.bind((12, follow_up.as_str()))?;
            statement.bind((13, now.as_str()))?;
            statement.bind((14, now.as_str()))?;
            statement.next()?;

            Ok(DeliveryReminder {
                name,
                purchase_order: reminder.purchase_order.clone(),
                purchase_order_item: reminder.purchase_order_item.clone(),
                supplier: reminder.supplier.clone(),
                item_code: reminder.item_code.clone(),
                pending_qty: reminder.pending_qty,
                status: ReminderStatus::Open,
                auto_created: true,
                triggering_receipt: reminder.triggering_receipt.clone(),
                expected_delivery_date: reminder.expected_delivery_date,
                priority: reminder.priority,
                reminder_level: ReminderLevel::First,
                next_follow_up_date: reminder.next_follow_up_date,
                archived: false,
                creation: now.clone(),
                modified: now,
            })
        })
    }

    pub async fn get_reminder(&self, name: &str) -> Result<Option<DeliveryReminder>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(format!(
            "SELECT {REMINDER_COLUMNS} FROM delivery_reminders WHERE name = ?"
        ))?;
        statement.bind((1, name))?;
        if statement.next()? == State::Row {
            Ok(Some(read_reminder(&statement)?))
        } else {
            Ok(None)
        }
    }

    /// Name of the open reminder tracking an order row, if any
    pub async fn find_open_reminder(&self, po_item: &str) -> Result<Option<String>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT name FROM delivery_reminders
             WHERE purchase_order_item = ? AND status = 'Open'
             ORDER BY creation ASC, name ASC LIMIT 1",
        )?;
        statement.bind((1, po_item))?;
        if statement.next()? == State::Row {
            Ok(Some(statement.read::<String, _>(0)?))
        } else {
            Ok(None)
        }
    }

    pub async fn list_reminders(
        &self,
        status: Option<ReminderStatus>,
        purchase_order: Option<&str>,
    ) -> Result<Vec<DeliveryReminder>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(format!(
            "SELECT {REMINDER_COLUMNS} FROM delivery_reminders
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR purchase_order = ?2)
             ORDER BY name ASC"
        ))?;
        let status = status.map(|s| s.to_string());
        statement.bind((1, status.as_deref()))?;
        statement.bind((2, purchase_order))?;
        read_reminders(&mut statement)
    }

    pub async fn set_reminder_pending_qty(&self, name: &str, pending_qty: f64) -> Result<()> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "UPDATE delivery_reminders SET pending_qty = ?, modified = ? WHERE name = ?",
        )?;
        statement.bind((1, pending_qty))?;
        statement.bind((2, now_timestamp().as_str()))?;
        statement.bind((3, name))?;
        statement.next()?;
        Ok(())
    }

    /// Close an open reminder. Returns false when it was already closed or missing.
    pub async fn close_reminder(&self, name: &str) -> Result<bool> {
        let conn = self.connection.lock().await;
        let mut check =
            conn.prepare("SELECT status FROM delivery_reminders WHERE name = ?")?;
        check.bind((1, name))?;
        if check.next()? != State::Row {
            return Ok(false);
        }
        let status: ReminderStatus = check.read::<String, _>(0)?.parse()?;
        if status != ReminderStatus::Open {
            return Ok(false);
        }

        let mut statement = conn.prepare(
            "UPDATE delivery_reminders SET status = 'Closed', modified = ? WHERE name = ?",
        )?;
        statement.bind((1, now_timestamp().as_str()))?;
        statement.bind((2, name))?;
        statement.next()?;
        Ok(true)
    }

    pub async fn open_reminders_for_order(&self, purchase_order: &str) -> Result<Vec<String>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT name FROM delivery_reminders
             WHERE purchase_order = ? AND status = 'Open' ORDER BY name ASC",
        )?;
        statement.bind((1, purchase_order))?;
        read_names(&mut statement)
    }

    /// Open reminders whose follow-up date is strictly before `today`
    pub async fn get_overdue_reminders(&self, today: NaiveDate) -> Result<Vec<DeliveryReminder>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(format!(
            "SELECT {REMINDER_COLUMNS} FROM delivery_reminders
             WHERE status = 'Open' AND next_follow_up_date < ? ORDER BY name ASC"
        ))?;
        let today = format_date(today);
        statement.bind((1, today.as_str()))?;
        read_reminders(&mut statement)
    }

    pub async fn save_escalation(
        &self,
        name: &str,
        level: ReminderLevel,
        priority: Priority,
        next_follow_up_date: NaiveDate,
    ) -> Result<()> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "UPDATE delivery_reminders
             SET reminder_level = ?, priority = ?, next_follow_up_date = ?, modified = ?
             WHERE name = ?",
        )?;
        let level = level.to_string();
        let priority = priority.to_string();
        let follow_up = format_date(next_follow_up_date);
        statement.bind((1, level.as_str()))?;
        statement.bind((2, priority.as_str()))?;
        statement.bind((3, follow_up.as_str()))?;
        statement.bind((4, now_timestamp().as_str()))?;
        statement.bind((5, name))?;
        statement.next()?;
        Ok(())
    }

    pub async fn count_reminders(
        &self,
        status: ReminderStatus,
        priority: Option<Priority>,
    ) -> Result<i64> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT COUNT(*) FROM delivery_reminders
             WHERE status = ? AND (?2 IS NULL OR priority = ?2)",
        )?;
        let status = status.to_string();
        let priority = priority.map(|p| p.to_string());
        statement.bind((1, status.as_str()))?;
        statement.bind((2, priority.as_deref()))?;
        statement.next()?;
        Ok(statement.read::<i64, _>(0)?)
    }

    /// Closed, not yet archived reminders last modified before `cutoff`
    pub async fn get_closed_reminders_before(&self, cutoff: NaiveDate) -> Result<Vec<String>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT name FROM delivery_reminders
             WHERE status = 'Closed' AND archived = 0 AND modified < ? ORDER BY name ASC",
        )?;
        let cutoff = format_date(cutoff);
        statement.bind((1, cutoff.as_str()))?;
        read_names(&mut statement)
    }

    /// Flag a reminder as archived. Leaves `modified` alone so the retention clock is kept.
    pub async fn archive_reminder(&self, name: &str) -> Result<()> {
        let conn = self.connection.lock().await;
        let mut statement =
            conn.prepare("UPDATE delivery_reminders SET archived = 1 WHERE name = ?")?;
        statement.bind((1, name))?;
        statement.next()?;
        Ok(())
    }

    /// Delete a reminder and its timeline
    pub async fn delete_reminder(&self, name: &str) -> Result<()> {
        let conn = self.connection.lock().await;
        in_transaction(&conn, |conn| {
            let mut comments = conn.prepare("DELETE FROM reminder_comments WHERE reminder = ?")?;
            comments.bind((1, name))?;
            comments.next()?;

            let mut statement = conn.prepare("DELETE FROM delivery_reminders WHERE name = ?")?;
            statement.bind((1, name))?;
            statement.next()?;
            Ok(())
        })
    }

    pub async fn add_reminder_comment(
        &self,
        reminder: &str,
        comment_type: &str,
        text: &str,
    ) -> Result<()> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "INSERT INTO reminder_comments (reminder, comment_type, text, creation)
             VALUES (?, ?, ?, ?)",
        )?;
        statement.bind((1, reminder))?;
        statement.bind((2, comment_type))?;
        statement.bind((3, text))?;
        statement.bind((4, now_timestamp().as_str()))?;
        statement.next()?;
        Ok(())
    }

    pub async fn get_reminder_comments(&self, reminder: &str) -> Result<Vec<ReminderComment>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT reminder, comment_type, text, creation FROM reminder_comments
             WHERE reminder = ? ORDER BY id ASC",
        )?;
        statement.bind((1, reminder))?;

        let mut comments = Vec::new();
        while let State::Row = statement.next()? {
            comments.push(ReminderComment {
                reminder: statement.read::<String, _>("reminder")?,
                comment_type: statement.read::<String, _>("comment_type")?,
                text: statement.read::<String, _>("text")?,
                creation: statement.read::<String, _>("creation")?,
            });
        }
        Ok(comments)
    }

    // ------------------------------------------------------------------
    // Notification log and email outbox
    // ------------------------------------------------------------------

    pub async fn insert_notification_log(&self, log: &NotificationLog) -> Result<()> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "INSERT INTO notification_log
                (subject, document_type, document_name, for_user, email_content, creation)
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;
        statement.bind((1, log.subject.as_str()))?;
        statement.bind((2, log.document_type.as_str()))?;
        statement.bind((3, log.document_name.as_str()))?;
        statement.bind((4, log.for_user.as_str()))?;
        statement.bind((5, log.email_content.as_str()))?;
        statement.bind((6, now_timestamp().as_str()))?;
        statement.next()?;
        Ok(())
    }

    pub async fn get_notification_logs(&self, for_user: Option<&str>) -> Result<Vec<NotificationLog>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT subject, document_type, document_name, for_user, email_content
             FROM notification_log WHERE (?1 IS NULL OR for_user = ?1) ORDER BY id ASC",
        )?;
        statement.bind((1, for_user))?;

        let mut logs = Vec::new();
        while let State::Row = statement.next()? {
            logs.push(NotificationLog {
                subject: statement.read::<String, _>("subject")?,
                document_type: statement.read::<String, _>("document_type")?,
                document_name: statement.read::<String, _>("document_name")?,
                for_user: statement.read::<String, _>("for_user")?,
                email_content: statement.read::<String, _>("email_content")?,
            });
        }
        Ok(logs)
    }

    pub async fn enqueue_email(&self, email: &OutgoingEmail) -> Result<i64> {
        let conn = self.connection.lock().await;
        let recipients = email.recipients.join(",");
        let mut statement = conn.prepare(
            "INSERT INTO email_queue (recipients, subject, message, creation) VALUES (?, ?, ?, ?)",
        )?;
        statement.bind((1, recipients.as_str()))?;
        statement.bind((2, email.subject.as_str()))?;
        statement.bind((3, email.message.as_str()))?;
        statement.bind((4, now_timestamp().as_str()))?;
        statement.next()?;

        let mut id = conn.prepare("SELECT last_insert_rowid()")?;
        id.next()?;
        Ok(id.read::<i64, _>(0)?)
    }

    pub async fn get_queued_emails(&self) -> Result<Vec<QueuedEmail>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT id, recipients, subject, message, status, creation
             FROM email_queue ORDER BY id ASC",
        )?;

        let mut emails = Vec::new();
        while let State::Row = statement.next()? {
            emails.push(QueuedEmail {
                id: statement.read::<i64, _>("id")?,
                email: OutgoingEmail {
                    recipients: statement
                        .read::<String, _>("recipients")?
                        .split(',')
                        .map(String::from)
                        .collect(),
                    subject: statement.read::<String, _>("subject")?,
                    message: statement.read::<String, _>("message")?,
                },
                status: statement.read::<String, _>("status")?,
                creation: statement.read::<String, _>("creation")?,
            });
        }
        Ok(emails)
    }

    // ------------------------------------------------------------------
    // Settings documents
    // ------------------------------------------------------------------

    pub async fn get_settings_document(&self, doctype: &str) -> Result<Option<String>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare("SELECT data FROM settings WHERE doctype = ?")?;
        statement.bind((1, doctype))?;
        if statement.next()? == State::Row {
            Ok(Some(statement.read::<String, _>(0)?))
        } else {
            Ok(None)
        }
    }

    pub async fn save_settings_document(&self, doctype: &str, data: &str) -> Result<()> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "INSERT OR REPLACE INTO settings (doctype, data, modified) VALUES (?, ?, ?)",
        )?;
        statement.bind((1, doctype))?;
        statement.bind((2, data))?;
        statement.bind((3, now_timestamp().as_str()))?;
        statement.next()?;
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Helpers that run under an already held connection lock
// ----------------------------------------------------------------------

/// Run `work` inside one write transaction. Rolls back when it fails.
fn in_transaction<T>(conn: &Connection, work: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    conn.execute("BEGIN IMMEDIATE")?;
    match work(conn) {
        Ok(value) => {
            conn.execute("COMMIT")?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute("ROLLBACK") {
                warn!("Rollback failed: {rollback}");
            }
            Err(e)
        }
    }
}

fn exists(conn: &Connection, table: &str, name: &str) -> Result<bool> {
    let mut statement = conn.prepare(format!("SELECT 1 FROM {table} WHERE name = ?"))?;
    statement.bind((1, name))?;
    Ok(statement.next()? == State::Row)
}

fn insert_order_items(conn: &Connection, parent: &str, items: &[PurchaseOrderItem]) -> Result<()> {
    for (idx, item) in items.iter().enumerate() {
        let mut statement = conn.prepare(
            "INSERT INTO purchase_order_items
                (name, parent, idx, item_code, project, qty, rate, amount, received_qty)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)",
        )?;
        statement.bind((1, item.name.as_str()))?;
        statement.bind((2, parent))?;
        statement.bind((3, idx as i64 + 1))?;
        statement.bind((4, item.item_code.as_str()))?;
        statement.bind((5, item.project.as_deref()))?;
        statement.bind((6, item.qty))?;
        statement.bind((7, item.rate))?;
        statement.bind((8, item.amount))?;
        statement.next()?;
    }
    Ok(())
}

fn total_received_qty(conn: &Connection, po_item: &str) -> Result<f64> {
    let mut statement = conn.prepare(
        "SELECT SUM(pri.qty) FROM purchase_receipt_items pri
         JOIN purchase_receipts pr ON pr.name = pri.parent
         WHERE pri.purchase_order_item = ? AND pr.docstatus = 1",
    )?;
    statement.bind((1, po_item))?;
    statement.next()?;
    Ok(statement.read::<Option<f64>, _>(0)?.unwrap_or(0.0))
}

fn refresh_received_qty(conn: &Connection, po_item: &str) -> Result<f64> {
    let received = total_received_qty(conn, po_item)?;
    let mut statement =
        conn.prepare("UPDATE purchase_order_items SET received_qty = ? WHERE name = ?")?;
    statement.bind((1, received))?;
    statement.bind((2, po_item))?;
    statement.next()?;
    Ok(received)
}

fn refresh_receipt_items(conn: &Connection, receipt: &str) -> Result<()> {
    let mut statement = conn.prepare(
        "SELECT DISTINCT purchase_order_item FROM purchase_receipt_items
         WHERE parent = ? AND purchase_order_item IS NOT NULL",
    )?;
    statement.bind((1, receipt))?;

    let mut po_items = Vec::new();
    while let State::Row = statement.next()? {
        po_items.push(statement.read::<String, _>(0)?);
    }

    for po_item in po_items {
        let received = refresh_received_qty(conn, &po_item)?;
        debug!("Order row {po_item} received qty now {received}");
    }
    Ok(())
}

fn next_series_name(conn: &Connection, series: &str) -> Result<String> {
    let mut seed =
        conn.prepare("INSERT OR IGNORE INTO naming_series (series, current) VALUES (?, 0)")?;
    seed.bind((1, series))?;
    seed.next()?;

    let mut bump =
        conn.prepare("UPDATE naming_series SET current = current + 1 WHERE series = ?")?;
    bump.bind((1, series))?;
    bump.next()?;

    let mut current = conn.prepare("SELECT current FROM naming_series WHERE series = ?")?;
    current.bind((1, series))?;
    current.next()?;
    let value = current.read::<i64, _>(0)?;
    Ok(format!("{series}{value:05}"))
}

fn read_order_item(statement: &Statement) -> Result<PurchaseOrderItem> {
    Ok(PurchaseOrderItem {
        name: statement.read::<String, _>("name")?,
        item_code: statement.read::<String, _>("item_code")?,
        project: statement.read::<Option<String>, _>("project")?,
        qty: statement.read::<f64, _>("qty")?,
        rate: statement.read::<f64, _>("rate")?,
        amount: statement.read::<f64, _>("amount")?,
        received_qty: statement.read::<f64, _>("received_qty")?,
    })
}

fn read_reminder(statement: &Statement) -> Result<DeliveryReminder> {
    Ok(DeliveryReminder {
        name: statement.read::<String, _>("name")?,
        purchase_order: statement.read::<String, _>("purchase_order")?,
        purchase_order_item: statement.read::<String, _>("purchase_order_item")?,
        supplier: statement.read::<String, _>("supplier")?,
        item_code: statement.read::<String, _>("item_code")?,
        pending_qty: statement.read::<f64, _>("pending_qty")?,
        status: statement.read::<String, _>("status")?.parse()?,
        auto_created: statement.read::<i64, _>("auto_created")? != 0,
        triggering_receipt: statement.read::<Option<String>, _>("triggering_receipt")?,
        expected_delivery_date: parse_date(&statement.read::<String, _>("expected_delivery_date")?)?,
        priority: statement.read::<String, _>("priority")?.parse()?,
        reminder_level: statement.read::<String, _>("reminder_level")?.parse()?,
        next_follow_up_date: parse_date(&statement.read::<String, _>("next_follow_up_date")?)?,
        archived: statement.read::<i64, _>("archived")? != 0,
        creation: statement.read::<String, _>("creation")?,
        modified: statement.read::<String, _>("modified")?,
    })
}

fn read_reminders(statement: &mut Statement) -> Result<Vec<DeliveryReminder>> {
    let mut reminders = Vec::new();
    while let State::Row = statement.next()? {
        reminders.push(read_reminder(statement)?);
    }
    Ok(reminders)
}

fn read_names(statement: &mut Statement) -> Result<Vec<String>> {
    let mut names = Vec::new();
    while let State::Row = statement.next()? {
        names.push(statement.read::<String, _>(0)?);
    }
    Ok(names)
}

/// Overwrite a reminder's `modified` stamp. Lets tests age records without waiting.
#[cfg(test)]
impl Database {
    pub(crate) async fn backdate_reminder(&self, name: &str, modified: chrono::NaiveDateTime) -> Result<()> {
        let conn = self.connection.lock().await;
        let mut statement =
            conn.prepare("UPDATE delivery_reminders SET modified = ? WHERE name = ?")?;
        let modified = modified
            .format(crate::core::dates::TIMESTAMP_FORMAT)
            .to_string();
        statement.bind((1, modified.as_str()))?;
        statement.bind((2, name))?;
        statement.next()?;
        Ok(())
    }
}
