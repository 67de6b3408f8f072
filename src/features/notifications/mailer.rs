//! # Outbound Mail
//!
//! Mail is handed to a `Mailer`. The default implementation queues it in the
//! database outbox; delivery is somebody else's job.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.1.0

use crate::database::Database;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub recipients: Vec<String>,
    pub subject: String,
    /// HTML body
    pub message: String,
}

/// An outbox row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEmail {
    pub id: i64,
    pub email: OutgoingEmail,
    pub status: String,
    pub creation: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

/// Queues mail in the `email_queue` table
#[derive(Clone)]
pub struct OutboxMailer {
    database: Database,
}

impl OutboxMailer {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        if email.recipients.is_empty() {
            return Err(anyhow!("Refusing to queue mail without recipients"));
        }
        let id = self.database.enqueue_email(&email).await?;
        info!(
            "📧 Queued email #{} '{}' for {} recipient(s)",
            id,
            email.subject,
            email.recipients.len()
        );
        Ok(())
    }
}

/// Keeps sent mail in memory for assertions
#[cfg(test)]
#[derive(Default, Clone)]
pub(crate) struct RecordingMailer {
    pub sent: std::sync::Arc<std::sync::Mutex<Vec<OutgoingEmail>>>,
}

#[cfg(test)]
impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outbox_mailer_queues() {
        let db = Database::in_memory().await.unwrap();
        let mailer = OutboxMailer::new(db.clone());

        mailer
            .send(OutgoingEmail {
                recipients: vec!["stores@example.com".to_string()],
                subject: "Digest".to_string(),
                message: "<h3>Summary</h3>".to_string(),
            })
            .await
            .unwrap();

        let queued = db.get_queued_emails().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].email.subject, "Digest");
    }

    #[tokio::test]
    async fn test_outbox_mailer_rejects_empty_recipients() {
        let db = Database::in_memory().await.unwrap();
        let mailer = OutboxMailer::new(db.clone());

        let result = mailer
            .send(OutgoingEmail {
                recipients: vec![],
                subject: "Digest".to_string(),
                message: String::new(),
            })
            .await;
        assert!(result.is_err());
        assert!(db.get_queued_emails().await.unwrap().is_empty());
    }
}
