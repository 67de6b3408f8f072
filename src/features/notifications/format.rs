//! # Notification Formatting
//!
//! HTML bodies for the consolidated "new reminders" notification and the daily digest.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use crate::features::reminders::{DeliveryReminder, DELIVERY_REMINDER};
use serde::{Deserialize, Serialize};

pub const NEW_REMINDERS_SUBJECT: &str = "New Delivery Reminders Created";

/// In-app notification addressed to one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationLog {
    pub subject: String,
    pub document_type: String,
    /// First reminder of the group; the notification links to it
    pub document_name: String,
    pub for_user: String,
    pub email_content: String,
}

/// Render a quantity without a trailing `.0` for whole numbers
pub fn format_qty(qty: f64) -> String {
    if qty.fract() == 0.0 && qty.abs() < 1e15 {
        format!("{}", qty as i64)
    } else {
        format!("{qty}")
    }
}

/// Group reminders by recipient, keeping first-seen order for both owners and reminders
pub fn group_by_owner(
    entries: Vec<(String, DeliveryReminder)>,
) -> Vec<(String, Vec<DeliveryReminder>)> {
    let mut groups: Vec<(String, Vec<DeliveryReminder>)> = Vec::new();
    for (owner, reminder) in entries {
        match groups.iter_mut().find(|(o, _)| *o == owner) {
            Some((_, list)) => list.push(reminder),
            None => groups.push((owner, vec![reminder])),
        }
    }
    groups
}

/// One notification per owner listing every new reminder raised on their orders
pub fn consolidated_notifications(
    entries: Vec<(String, DeliveryReminder)>,
    subject: &str,
) -> Vec<NotificationLog> {
    group_by_owner(entries)
        .into_iter()
        .filter_map(|(owner, reminders)| {
            let first = reminders.first()?.name.clone();
            let mut content = format!("<h3>{subject}</h3><ul>");
            for r in &reminders {
                content.push_str(&format!(
                    "<li><b>{}</b>: {} units pending for PO <a href='/app/purchase-order/{}'>{}</a></li>",
                    r.item_code,
                    format_qty(r.pending_qty),
                    r.purchase_order,
                    r.purchase_order
                ));
            }
            content.push_str("</ul>");

            Some(NotificationLog {
                subject: subject.to_string(),
                document_type: DELIVERY_REMINDER.to_string(),
                document_name: first,
                for_user: owner,
                email_content: content,
            })
        })
        .collect()
}

pub fn digest_subject(open_count: i64, critical_count: i64) -> String {
    format!("Daily Delivery Reminder Digest: {open_count} Open, {critical_count} Critical")
}

pub fn digest_body(open_count: i64, critical_count: i64, reminders_link: &str) -> String {
    format!(
        "<h3>Daily Purchase Delivery Summary</h3>\
         <p>Here is a summary of the current delivery statuses:</p>\
         <ul>\
         <li><strong>Total Open Reminders:</strong> {open_count}</li>\
         <li><strong>Critical Priority Reminders:</strong> {critical_count}</li>\
         </ul>\
         <p><a href=\"{reminders_link}\">Click here to view all reminders</a></p>"
    )
}
