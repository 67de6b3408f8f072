//! # IPC Server
//!
//! Unix socket server through which the host application drives the reminder service.
//!
//! - **Version**: 1.2.1
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.1: Client slot released even when a handler panics
//! - 1.2.0: Responses go to the requesting client only; heartbeat carries uptime
//! - 1.1.0: Request processing through `ReminderService`
//! - 1.0.0: Initial IPC implementation with Unix socket protocol

use crate::ipc::protocol::{encode_message, read_frame, HostRequest, ServiceEvent};
use crate::service::ReminderService;
use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};

/// Maximum number of connected clients
const MAX_CLIENTS: usize = 10;

/// Broadcast channel capacity for events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Response channel capacity per client
const RESPONSE_CHANNEL_CAPACITY: usize = 64;

/// IPC Server handle for the reminder service
#[derive(Clone)]
pub struct IpcServer {
    /// Broadcast sender for events to all clients
    event_tx: broadcast::Sender<ServiceEvent>,
    /// Connected client count
    client_count: Arc<RwLock<usize>>,
    /// Server start time for uptime calculation
    start_time: Instant,
    service: ReminderService,
    socket_path: String,
}

/// Give back one connection slot
async fn release_client_slot(client_count: &RwLock<usize>) {
    let mut count = client_count.write().await;
    *count = count.saturating_sub(1);
}

impl IpcServer {
    /// Create a new IPC server (does not start listening yet)
    pub fn new(service: ReminderService, socket_path: &str) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        IpcServer {
            event_tx,
            client_count: Arc::new(RwLock::new(0)),
            start_time: Instant::now(),
            service,
            socket_path: socket_path.to_string(),
        }
    }

    /// Start the IPC server in a background task
    pub async fn start(self: Arc<Self>) -> Result<()> {
        // Remove existing socket file if it exists
        if std::path::Path::new(&self.socket_path).exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {}", self.socket_path);

        // Spawn the accept loop
        let server = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let client_count = *server.client_count.read().await;
                        if client_count >= MAX_CLIENTS {
                            warn!("Maximum IPC clients reached ({}), rejecting connection", MAX_CLIENTS);
                            continue;
                        }

                        *server.client_count.write().await += 1;
                        info!("IPC client connected (total: {})", client_count + 1);

                        let server_clone = server.clone();
                        let client_count_ref = server.client_count.clone();
                        tokio::spawn(async move {
                            // The handler runs in its own task so a panic surfaces here
                            // as a join error and the slot is still released
                            match tokio::spawn(server_clone.handle_client(stream)).await {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => debug!("Client handler ended: {}", e),
                                Err(e) => error!("Client handler aborted: {}", e),
                            }
                            release_client_slot(&client_count_ref).await;
                            info!("IPC client disconnected");
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept IPC connection: {}", e);
                    }
                }
            }
        });

        Ok(())
    }

    /// Handle a connected client
    async fn handle_client(self: Arc<Self>, stream: UnixStream) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        let mut event_rx = self.event_tx.subscribe();
        let (response_tx, mut response_rx) = mpsc::channel::<ServiceEvent>(RESPONSE_CHANNEL_CAPACITY);

        // Writer task: this client's responses plus broadcast events
        let write_handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    response = response_rx.recv() => match response {
                        Some(event) => event,
                        None => break,
                    },
                    broadcast = event_rx.recv() => match broadcast {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Client lagged behind by {} events", n);
                            continue;
                        }
                    },
                };

                match encode_message(&event) {
                    Ok(data) => {
                        if let Err(e) = writer.write_all(&data).await {
                            debug!("Failed to write to client: {}", e);
                            break;
                        }
                        if let Err(e) = writer.flush().await {
                            debug!("Failed to flush to client: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to encode event: {}", e);
                    }
                }
            }
        });

        // Requests are answered in the order they arrive
        loop {
            let buf = match read_frame(&mut reader).await {
                Ok(Some(buf)) => buf,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read from client: {}", e);
                    break;
                }
            };

            let response = match serde_json::from_slice::<HostRequest>(&buf) {
                Ok(request) => self.process_request(request).await,
                Err(e) => {
                    warn!("Failed to parse request from client: {}", e);
                    ServiceEvent::failed("", format!("Invalid request: {e}"))
                }
            };

            if response_tx.send(response).await.is_err() {
                break;
            }
        }

        drop(response_tx);
        write_handle.abort();
        Ok(())
    }

    /// Run a request against the service and build its response
    pub async fn process_request(&self, request: HostRequest) -> ServiceEvent {
        let request_id = request.request_id().to_string();
        let kind = request.kind();
        debug!("Processing {} request {}", kind, request_id);

        match self.service.handle(request).await {
            Ok(data) => ServiceEvent::ok(&request_id, data),
            Err(e) => {
                warn!("{} request {} failed: {}", kind, request_id, e);
                ServiceEvent::failed(&request_id, e.to_string())
            }
        }
    }

    /// Broadcast an event to all connected clients
    pub fn broadcast(&self, event: ServiceEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Get connected client count
    pub async fn client_count(&self) -> usize {
        *self.client_count.read().await
    }

    /// Get uptime in seconds
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Send a heartbeat to all clients
    pub fn send_heartbeat(&self) {
        let timestamp = chrono::Utc::now().timestamp();
        self.broadcast(ServiceEvent::Heartbeat {
            timestamp,
            uptime_seconds: self.get_uptime_seconds(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::features::notifications::RecordingMailer;
    use crate::ipc::client::IpcClient;
    use std::time::Duration;

    async fn server(socket_path: &str) -> Arc<IpcServer> {
        let db = Database::in_memory().await.unwrap();
        let service =
            ReminderService::new(db, Arc::new(RecordingMailer::default()), "http://localhost:8000");
        Arc::new(IpcServer::new(service, socket_path))
    }

    fn socket_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("pe-{}-{}.sock", name, uuid::Uuid::new_v4()))
            .to_string_lossy()
            .to_string()
    }

    #[tokio::test]
    async fn test_process_request_failure_response() {
        let server = server(&socket_path("unused")).await;
        let response = server
            .process_request(HostRequest::CancelPurchaseOrder {
                request_id: "r1".to_string(),
                name: "PO-404".to_string(),
            })
            .await;

        match response {
            ServiceEvent::Response {
                request_id,
                success,
                message,
                data,
            } => {
                assert_eq!(request_id, "r1");
                assert!(!success);
                assert!(message.unwrap().contains("PO-404"));
                assert!(data.is_none());
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_over_socket() {
        let path = socket_path("roundtrip");
        let server = server(&path).await;
        server.clone().start().await.unwrap();

        let mut client = IpcClient::connect_to(&path).await.unwrap();
        let data = client
            .request(|request_id| HostRequest::Ping { request_id })
            .await
            .unwrap();
        assert_eq!(data["pong"], true);

        let err = client
            .request(|request_id| HostRequest::CancelPurchaseReceipt {
                request_id,
                name: "PR-404".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("PR-404"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(server.client_count().await, 1);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_slot_released_after_handler_panic() {
        let client_count = Arc::new(RwLock::new(1usize));
        let count_ref = client_count.clone();

        let supervisor = tokio::spawn(async move {
            let handler = tokio::spawn(async {
                panic!("handler blew up");
            });
            assert!(handler.await.unwrap_err().is_panic());
            release_client_slot(&count_ref).await;
        });
        supervisor.await.unwrap();

        assert_eq!(*client_count.read().await, 0);
        release_client_slot(&client_count).await;
        assert_eq!(*client_count.read().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_releases_slot() {
        let path = socket_path("disconnect");
        let server = server(&path).await;
        server.clone().start().await.unwrap();

        let mut client = IpcClient::connect_to(&path).await.unwrap();
        client
            .request(|request_id| HostRequest::Ping { request_id })
            .await
            .unwrap();
        assert_eq!(server.client_count().await, 1);

        drop(client);
        let mut released = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if server.client_count().await == 0 {
                released = true;
                break;
            }
        }
        assert!(released);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_heartbeat_reaches_clients() {
        let path = socket_path("heartbeat");
        let server = server(&path).await;
        server.clone().start().await.unwrap();

        let mut client = IpcClient::connect_to(&path).await.unwrap();
        // Let the server subscribe the new client before broadcasting
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.send_heartbeat();

        let event = tokio::time::timeout(Duration::from_secs(2), client.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, ServiceEvent::Heartbeat { .. }));
        let _ = std::fs::remove_file(&path);
    }
}
