//! # IPC Client
//!
//! Unix socket client the host application (or `pe-ctl`) uses to talk to the service.

use crate::core::documents::{PurchaseOrder, PurchaseReceipt};
use crate::features::reminders::{Job, ReminderStatus};
use crate::features::settings::Settings;
use crate::ipc::get_socket_path;
use crate::ipc::protocol::{encode_message, read_frame, HostRequest, ServiceEvent};
use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{timeout, Duration};

/// Connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `request` waits for the matching response
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// IPC Client for the host side
pub struct IpcClient {
    /// Event receiver channel
    event_rx: mpsc::Receiver<ServiceEvent>,
    /// Request sender channel
    request_tx: mpsc::Sender<HostRequest>,
    /// Connection status
    connected: Arc<RwLock<bool>>,
}

impl IpcClient {
    /// Connect to the service at the configured socket path
    pub async fn connect() -> Result<Self> {
        Self::connect_to(&get_socket_path()).await
    }

    pub async fn connect_to(socket_path: &str) -> Result<Self> {
        info!("Connecting to IPC server at {}", socket_path);

        let stream = timeout(CONNECT_TIMEOUT, UnixStream::connect(socket_path))
            .await
            .map_err(|_| anyhow!("Connection timeout"))?
            .map_err(|e| anyhow!("Failed to connect: {}", e))?;

        info!("Connected to IPC server");

        let (event_tx, event_rx) = mpsc::channel(256);
        let (request_tx, request_rx) = mpsc::channel(64);
        let connected = Arc::new(RwLock::new(true));

        // Start the connection handler
        let connected_clone = connected.clone();
        tokio::spawn(async move {
            Self::connection_loop(stream, event_tx, request_rx, connected_clone).await;
        });

        Ok(IpcClient {
            event_rx,
            request_tx,
            connected,
        })
    }

    /// Main connection loop - handles reading events and writing requests
    async fn connection_loop(
        stream: UnixStream,
        event_tx: mpsc::Sender<ServiceEvent>,
        mut request_rx: mpsc::Receiver<HostRequest>,
        connected: Arc<RwLock<bool>>,
    ) {
        let (mut reader, mut writer) = stream.into_split();

        // Spawn request writer task
        let write_connected = connected.clone();
        let write_handle = tokio::spawn(async move {
            while let Some(request) = request_rx.recv().await {
                match encode_message(&request) {
                    Ok(data) => {
                        if let Err(e) = writer.write_all(&data).await {
                            error!("Failed to write request: {}", e);
                            *write_connected.write().await = false;
                            break;
                        }
                        if let Err(e) = writer.flush().await {
                            error!("Failed to flush request: {}", e);
                            *write_connected.write().await = false;
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to encode request: {}", e);
                    }
                }
            }
        });

        // Event reader loop
        loop {
            let buf = match read_frame(&mut reader).await {
                Ok(Some(buf)) => buf,
                Ok(None) => break,
                Err(e) => {
                    error!("Read error: {}", e);
                    break;
                }
            };

            match serde_json::from_slice::<ServiceEvent>(&buf) {
                Ok(event) => {
                    if let ServiceEvent::Heartbeat { timestamp, .. } = &event {
                        debug!("Received heartbeat: {}", timestamp);
                    }

                    if event_tx.send(event).await.is_err() {
                        debug!("Event receiver closed");
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to parse event: {}", e);
                }
            }
        }

        *connected.write().await = false;
        write_handle.abort();
        info!("IPC connection closed");
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&mut self) -> Option<ServiceEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive an event (blocking)
    pub async fn recv(&mut self) -> Option<ServiceEvent> {
        self.event_rx.recv().await
    }

    /// Send a request without waiting for its response
    pub async fn send(&self, request: HostRequest) -> Result<()> {
        self.request_tx
            .send(request)
            .await
            .map_err(|e| anyhow!("Failed to send request: {}", e))
    }

    /// Check if connected
    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Send a request built around a fresh request id and wait for its response.
    /// Heartbeats and unrelated responses that arrive meanwhile are dropped.
    pub async fn request<F>(&mut self, build: F) -> Result<Value>
    where
        F: FnOnce(String) -> HostRequest,
    {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.send(build(request_id.clone())).await?;

        timeout(RESPONSE_TIMEOUT, async {
            while let Some(event) = self.event_rx.recv().await {
                match event {
                    ServiceEvent::Response {
                        request_id: id,
                        success,
                        message,
                        data,
                    } if id == request_id => {
                        return if success {
                            Ok(data.unwrap_or(Value::Null))
                        } else {
                            Err(anyhow!(message.unwrap_or_else(|| "Request failed".to_string())))
                        };
                    }
                    other => debug!("Skipping event while waiting for {}: {:?}", request_id, other),
                }
            }
            Err(anyhow!("Connection closed before response to {}", request_id))
        })
        .await
        .map_err(|_| anyhow!("Timed out waiting for response to {}", request_id))?
    }

    pub async fn ping(&mut self) -> Result<Value> {
        self.request(|request_id| HostRequest::Ping { request_id }).await
    }

    pub async fn submit_purchase_order(&mut self, order: PurchaseOrder) -> Result<Value> {
        self.request(|request_id| HostRequest::SubmitPurchaseOrder { request_id, order })
            .await
    }

    pub async fn update_purchase_order(&mut self, order: PurchaseOrder) -> Result<Value> {
        self.request(|request_id| HostRequest::UpdatePurchaseOrder { request_id, order })
            .await
    }

    pub async fn cancel_purchase_order(&mut self, name: String) -> Result<Value> {
        self.request(|request_id| HostRequest::CancelPurchaseOrder { request_id, name })
            .await
    }

    pub async fn submit_purchase_receipt(&mut self, receipt: PurchaseReceipt) -> Result<Value> {
        self.request(|request_id| HostRequest::SubmitPurchaseReceipt { request_id, receipt })
            .await
    }

    pub async fn cancel_purchase_receipt(&mut self, name: String) -> Result<Value> {
        self.request(|request_id| HostRequest::CancelPurchaseReceipt { request_id, name })
            .await
    }

    pub async fn get_item_project_history(
        &mut self,
        item_code: String,
        project: String,
        company: String,
        limit: Option<usize>,
    ) -> Result<Value> {
        self.request(|request_id| HostRequest::GetItemProjectHistory {
            request_id,
            item_code,
            project,
            company,
            limit,
        })
        .await
    }

    pub async fn get_settings(&mut self) -> Result<Value> {
        self.request(|request_id| HostRequest::GetSettings { request_id })
            .await
    }

    pub async fn update_settings(&mut self, settings: Settings) -> Result<Value> {
        self.request(|request_id| HostRequest::UpdateSettings { request_id, settings })
            .await
    }

    pub async fn list_reminders(
        &mut self,
        status: Option<ReminderStatus>,
        purchase_order: Option<String>,
    ) -> Result<Value> {
        self.request(|request_id| HostRequest::ListReminders {
            request_id,
            status,
            purchase_order,
        })
        .await
    }

    pub async fn run_job(&mut self, job: Job) -> Result<Value> {
        self.request(|request_id| HostRequest::RunJob { request_id, job })
            .await
    }
}

/// Try to connect with retries
pub async fn connect_with_retry(max_attempts: u32, delay: Duration) -> Result<IpcClient> {
    let mut last_error = anyhow!("No connection attempts made");
    for attempt in 1..=max_attempts {
        match IpcClient::connect().await {
            Ok(client) => return Ok(client),
            Err(e) => {
                if attempt < max_attempts {
                    warn!(
                        "Connection attempt {} failed: {}. Retrying in {:?}...",
                        attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = e;
            }
        }
    }
    Err(anyhow!(
        "Failed to connect after {} attempts: {}",
        max_attempts,
        last_error
    ))
}
