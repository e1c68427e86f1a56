use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};

use crate::hub::{LogHub, LogLevel, LogRecord};
use crate::ports::PortAllocator;
use crate::process::{self, DevServerHandle};
use crate::protocol::{Event, LogEventParams, EVENT_LOG};
use crate::registry::{Project, ProjectRegistry, ProjectStatus};

/// Unique client identifier
pub type ClientId = u64;

/// Channel for sending serialized frames to a client connection
pub type ClientSender = mpsc::UnboundedSender<String>;

/// Daemon-wide shared state.
///
/// Every shared map lives behind this one component's locks; operations go
/// through its methods rather than touching the maps directly, and no lock
/// is held across child-process I/O.
pub struct DaemonState {
    /// Root directory holding one subdirectory per project
    pub workspace_root: PathBuf,

    /// Known projects (id → Project)
    pub registry: RwLock<ProjectRegistry>,

    /// Dev-server port range
    pub ports: Mutex<PortAllocator>,

    /// Per-project log fan-out
    hub: Mutex<LogHub>,

    /// Active dev servers (project id → handle)
    pub servers: RwLock<HashMap<String, Arc<DevServerHandle>>>,

    /// Client event senders (ClientId → sender)
    clients: RwLock<HashMap<ClientId, ClientSender>>,

    /// Next client ID counter
    next_client_id: Mutex<ClientId>,
}

impl DaemonState {
    pub fn new(
        workspace_root: PathBuf,
        port_start: u16,
        port_end: u16,
        registry: ProjectRegistry,
    ) -> Self {
        Self {
            workspace_root,
            registry: RwLock::new(registry),
            ports: Mutex::new(PortAllocator::new(port_start, port_end)),
            hub: Mutex::new(LogHub::new()),
            servers: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            next_client_id: Mutex::new(1),
        }
    }

    /// Register a new client, returning its ID and event receiver
    pub async fn register_client(&self) -> (ClientId, mpsc::UnboundedReceiver<String>) {
        let mut id = self.next_client_id.lock().await;
        let client_id = *id;
        *id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.write().await.insert(client_id, tx);

        (client_id, rx)
    }

    /// Unregister a client and drop its log subscription
    pub async fn unregister_client(&self, client_id: ClientId) {
        self.clients.write().await.remove(&client_id);
        self.hub.lock().await.unsubscribe(client_id);
    }

    /// Send a serialized frame to a specific client
    pub async fn send_to_client(&self, client_id: ClientId, msg: String) {
        if let Some(tx) = self.clients.read().await.get(&client_id) {
            let _ = tx.send(msg);
        }
    }

    /// Bind a client to a project's log stream, replacing any previous
    /// binding, and start forwarding records to its connection.
    pub async fn subscribe_client(self: &Arc<Self>, client_id: ClientId, project_id: &str) {
        let mut rx = self.hub.lock().await.subscribe(project_id, client_id);

        let state = self.clone();
        tokio::spawn(async move {
            // Ends when the hub drops the sender: unsubscribe, re-subscribe
            // or disconnect.
            while let Some(record) = rx.recv().await {
                let event = Event::new(EVENT_LOG, LogEventParams { record });
                match serde_json::to_string(&event) {
                    Ok(json) => state.send_to_client(client_id, json).await,
                    Err(e) => debug!("Failed to serialize log event: {e}"),
                }
            }
        });
    }

    /// Drop a client's log subscription, if any
    pub async fn unsubscribe_client(&self, client_id: ClientId) {
        self.hub.lock().await.unsubscribe(client_id);
    }

    /// Publish a record to every subscriber of its project
    pub async fn publish_log(&self, record: LogRecord) {
        self.hub.lock().await.publish(&record);
    }

    /// Publish a daemon-originated record on a project's stream
    pub async fn publish_message(&self, project_id: &str, level: LogLevel, message: impl Into<String>) {
        self.publish_log(LogRecord::new(project_id, level, message.into()))
            .await;
    }

    /// Get a project by id
    pub async fn get_project(&self, project_id: &str) -> Option<Project> {
        self.registry.read().await.get(project_id)
    }

    /// Update a project's lifecycle status
    pub async fn set_project_status(&self, project_id: &str, status: ProjectStatus) {
        self.registry.write().await.set_status(project_id, status);
    }

    /// Store a dev-server handle
    pub async fn store_server(&self, handle: Arc<DevServerHandle>) {
        self.servers
            .write()
            .await
            .insert(handle.project_id.clone(), handle);
    }

    /// Get the dev-server handle for a project
    pub async fn get_server(&self, project_id: &str) -> Option<Arc<DevServerHandle>> {
        self.servers.read().await.get(project_id).cloned()
    }

    /// Stop a project's dev server: graceful-then-forced termination, an
    /// OS-level kill of anything still bound to its port, and port release.
    /// The port is released even when the termination signals error.
    /// Idempotent — returns false when nothing was running.
    pub async fn stop_dev_server(&self, project_id: &str) -> bool {
        let handle = self.servers.write().await.remove(project_id);
        let Some(handle) = handle else {
            return false;
        };

        process::terminate(&handle).await;
        process::kill_port_owners(handle.port).await;
        self.ports.lock().await.release(handle.port);
        info!("Stopped dev server for {project_id} (port {} released)", handle.port);
        true
    }

    /// Called by the stdout reader when a dev server's output ends. Cleans
    /// up the handle and port if the exit was not initiated by a stop.
    pub async fn on_dev_server_exit(&self, project_id: &str, port: u16) {
        let removed = {
            let mut servers = self.servers.write().await;
            let same_port = servers
                .get(project_id)
                .is_some_and(|handle| handle.port == port);
            if same_port {
                servers.remove(project_id)
            } else {
                None
            }
        };
        let Some(handle) = removed else {
            return;
        };

        process::terminate(&handle).await; // reaps; the process is already gone
        self.ports.lock().await.release(port);
        info!("Dev server for {project_id} exited on its own (port {port} released)");
        self.publish_message(project_id, LogLevel::Info, "Dev server exited")
            .await;
    }

    /// Stop every tracked dev server; used on daemon shutdown.
    pub async fn cleanup(&self) {
        let project_ids: Vec<String> = self.servers.read().await.keys().cloned().collect();
        for project_id in project_ids {
            self.stop_dev_server(&project_id).await;
        }
    }
}
