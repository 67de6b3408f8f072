//! # IPC Protocol
//!
//! Message types for host <-> reminder service communication over Unix socket.
//!
//! Uses length-prefixed JSON framing:
//! - 4 bytes: message length (big-endian u32)
//! - N bytes: JSON payload

use crate::core::documents::{PurchaseOrder, PurchaseReceipt};
use crate::features::reminders::{Job, ReminderStatus};
use crate::features::settings::Settings;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest frame either side will accept
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

// ============================================================================
// Host -> Service Requests
// ============================================================================

/// Requests sent from the host application to the service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostRequest {
    Ping {
        request_id: String,
    },
    /// A purchase order was submitted
    SubmitPurchaseOrder {
        request_id: String,
        order: PurchaseOrder,
    },
    /// A submitted purchase order changed
    UpdatePurchaseOrder {
        request_id: String,
        order: PurchaseOrder,
    },
    CancelPurchaseOrder {
        request_id: String,
        name: String,
    },
    /// A purchase receipt was submitted
    SubmitPurchaseReceipt {
        request_id: String,
        receipt: PurchaseReceipt,
    },
    CancelPurchaseReceipt {
        request_id: String,
        name: String,
    },
    /// Recent purchases of an item within a project and company
    GetItemProjectHistory {
        request_id: String,
        item_code: String,
        project: String,
        company: String,
        #[serde(default)]
        limit: Option<usize>,
    },
    GetSettings {
        request_id: String,
    },
    UpdateSettings {
        request_id: String,
        settings: Settings,
    },
    ListReminders {
        request_id: String,
        #[serde(default)]
        status: Option<ReminderStatus>,
        #[serde(default)]
        purchase_order: Option<String>,
    },
    /// Run a scheduled job now
    RunJob {
        request_id: String,
        job: Job,
    },
}

impl HostRequest {
    pub fn request_id(&self) -> &str {
        match self {
            HostRequest::Ping { request_id }
            | HostRequest::SubmitPurchaseOrder { request_id, .. }
            | HostRequest::UpdatePurchaseOrder { request_id, .. }
            | HostRequest::CancelPurchaseOrder { request_id, .. }
            | HostRequest::SubmitPurchaseReceipt { request_id, .. }
            | HostRequest::CancelPurchaseReceipt { request_id, .. }
            | HostRequest::GetItemProjectHistory { request_id, .. }
            | HostRequest::GetSettings { request_id }
            | HostRequest::UpdateSettings { request_id, .. }
            | HostRequest::ListReminders { request_id, .. }
            | HostRequest::RunJob { request_id, .. } => request_id,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            HostRequest::Ping { .. } => "Ping",
            HostRequest::SubmitPurchaseOrder { .. } => "SubmitPurchaseOrder",
            HostRequest::UpdatePurchaseOrder { .. } => "UpdatePurchaseOrder",
            HostRequest::CancelPurchaseOrder { .. } => "CancelPurchaseOrder",
            HostRequest::SubmitPurchaseReceipt { .. } => "SubmitPurchaseReceipt",
            HostRequest::CancelPurchaseReceipt { .. } => "CancelPurchaseReceipt",
            HostRequest::GetItemProjectHistory { .. } => "GetItemProjectHistory",
            HostRequest::GetSettings { .. } => "GetSettings",
            HostRequest::UpdateSettings { .. } => "UpdateSettings",
            HostRequest::ListReminders { .. } => "ListReminders",
            HostRequest::RunJob { .. } => "RunJob",
        }
    }
}

// ============================================================================
// Service -> Host Events
// ============================================================================

/// Events sent from the service to connected clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServiceEvent {
    /// Answer to one request, sent only to the client that asked
    Response {
        request_id: String,
        success: bool,
        message: Option<String>,
        data: Option<serde_json::Value>,
    },
    /// Broadcast to every client
    Heartbeat {
        timestamp: i64,
        uptime_seconds: u64,
    },
}

impl ServiceEvent {
    pub fn ok(request_id: &str, data: serde_json::Value) -> Self {
        ServiceEvent::Response {
            request_id: request_id.to_string(),
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn failed(request_id: &str, message: String) -> Self {
        ServiceEvent::Response {
            request_id: request_id.to_string(),
            success: false,
            message: Some(message),
            data: None,
        }
    }
}

// ============================================================================
// Framing - Length-prefixed JSON messages
// ============================================================================

/// Encode a message with length prefix
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes", json.len()));
    }
    let len = json.len() as u32;
    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Read a length-prefixed message from a reader
pub fn decode_message<T: for<'de> Deserialize<'de>, R: Read>(reader: &mut R) -> Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes", len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    Ok(serde_json::from_slice(&buf)?)
}

/// Write a framed message to a writer
pub fn write_message<T: Serialize, W: Write>(writer: &mut W, msg: &T) -> Result<()> {
    let encoded = encode_message(msg)?;
    writer.write_all(&encoded)?;
    writer.flush()?;
    Ok(())
}

/// Read one raw frame body from an async stream. `None` on clean end of stream.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes", len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}
