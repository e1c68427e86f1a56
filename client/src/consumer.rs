//! Reconnecting consumer
//!
//! Maintains one logical connection to the daemon through a
//! connecting → open → closed → backoff cycle, re-subscribing to the active
//! project on every open. Received log records land in a bounded ring with
//! a persisted mirror; project status is polled on a fixed interval until
//! it reaches a terminal value or the project disappears.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::{ClientError, Connection, ServerEvent};
use crate::protocol::{ProjectStatusView, METHOD_GET_STATUS, METHOD_SUBSCRIBE, NOT_FOUND};
use crate::ring::{LogRing, DEFAULT_CAPACITY};
use crate::store::LogStore;

pub const BASE_DELAY: Duration = Duration::from_secs(1);
pub const CAP_DELAY: Duration = Duration::from_secs(10);
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Reconnect delay for the given attempt: `min(base * 2^attempt, cap)`.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}

/// Consumer configuration
pub struct ConsumerConfig {
    /// Daemon address, host:port
    pub addr: String,
    pub base_delay: Duration,
    pub cap_delay: Duration,
    pub poll_interval: Duration,
    pub ring_capacity: usize,
    /// Path for the persisted log mirror; `None` disables persistence
    pub store_path: Option<PathBuf>,
}

impl ConsumerConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            base_delay: BASE_DELAY,
            cap_delay: CAP_DELAY,
            poll_interval: POLL_INTERVAL,
            ring_capacity: DEFAULT_CAPACITY,
            store_path: None,
        }
    }
}

/// Events surfaced to the embedding application
#[derive(Debug, Clone)]
pub enum ConsumerEvent {
    Connected,
    Disconnected,
    Subscribed { project_id: String },
    Log(crate::protocol::LogRecord),
    Status(ProjectStatusView),
    ProjectGone { project_id: String },
}

struct ActiveProject {
    id: String,
    status: Option<ProjectStatusView>,
    polling: bool,
}

/// Reconnecting consumer of the daemon's log stream and status endpoint
pub struct Consumer {
    config: ConsumerConfig,
    ring: LogRing,
    store: Option<LogStore>,
    active: Arc<RwLock<Option<ActiveProject>>>,
    events_out: mpsc::UnboundedSender<ConsumerEvent>,
}

impl Consumer {
    /// Build a consumer; the returned receiver yields consumer events for
    /// the embedding application.
    pub fn new(config: ConsumerConfig) -> (Self, mpsc::UnboundedReceiver<ConsumerEvent>) {
        let (events_out, events_rx) = mpsc::unbounded_channel();
        let ring = LogRing::new(config.ring_capacity);
        let store = config.store_path.clone().map(LogStore::new);

        // Seed the ring from the persisted mirror.
        if let Some(store) = &store {
            let persisted = store.load();
            if !persisted.is_empty() {
                ring.replace(persisted);
            }
        }

        let consumer = Self {
            config,
            ring,
            store,
            active: Arc::new(RwLock::new(None)),
            events_out,
        };
        (consumer, events_rx)
    }

    /// Make a project the active one: its logs are subscribed to on the
    /// next open and its status polled until terminal.
    pub fn set_active_project(&self, project_id: impl Into<String>) {
        *self.active.write() = Some(ActiveProject {
            id: project_id.into(),
            status: None,
            polling: true,
        });
    }

    pub fn active_project_id(&self) -> Option<String> {
        self.active.read().as_ref().map(|active| active.id.clone())
    }

    pub fn active_status(&self) -> Option<ProjectStatusView> {
        self.active
            .read()
            .as_ref()
            .and_then(|active| active.status.clone())
    }

    /// Received log records, oldest first.
    pub fn logs(&self) -> Vec<crate::protocol::LogRecord> {
        self.ring.snapshot()
    }

    /// Drive the connection forever. Each failed or dropped connection is
    /// followed by an exponentially backed-off reconnect; the attempt
    /// counter resets only on a successful open.
    pub async fn run(&self) {
        let mut attempt: u32 = 0;

        loop {
            let (event_tx, event_rx) = mpsc::unbounded_channel();
            match Connection::connect(&self.config.addr, event_tx).await {
                Ok(conn) => {
                    attempt = 0;
                    info!("Connected to daemon at {}", self.config.addr);
                    self.emit(ConsumerEvent::Connected);

                    self.resubscribe(&conn).await;
                    self.pump(&conn, event_rx).await;

                    info!("Connection to daemon lost");
                    self.emit(ConsumerEvent::Disconnected);
                }
                Err(e) => {
                    debug!("Connect attempt {attempt} failed: {e}");
                }
            }

            let delay = backoff_delay(attempt, self.config.base_delay, self.config.cap_delay);
            attempt = attempt.saturating_add(1);
            tokio::time::sleep(delay).await;
        }
    }

    /// Subscribe to the active project's log stream, if any.
    async fn resubscribe(&self, conn: &Connection) {
        let Some(project_id) = self.active_project_id() else {
            return;
        };
        let result: Result<serde_json::Value, ClientError> = conn
            .call(METHOD_SUBSCRIBE, Some(json!({"project_id": project_id})))
            .await;
        if let Err(e) = result {
            warn!("Subscribe failed: {e}");
        }
    }

    /// Process events and poll status until the connection closes.
    async fn pump(&self, conn: &Connection, mut events: mpsc::UnboundedReceiver<ServerEvent>) {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_server_event(event),
                        None => break, // reader task ended
                    }
                }
                _ = poll.tick() => {
                    self.poll_status(conn).await;
                }
                _ = conn.wait_closed() => break,
            }
        }
    }

    fn handle_server_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::Connected => {}
            ServerEvent::Subscribed { project_id } => {
                self.emit(ConsumerEvent::Subscribed { project_id });
            }
            ServerEvent::Log(record) => self.handle_log(record),
        }
    }

    fn handle_log(&self, record: crate::protocol::LogRecord) {
        self.ring.push(record.clone());
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.ring.snapshot()) {
                warn!("Log mirror write failed twice, giving up on this batch: {e}");
            }
        }
        self.emit(ConsumerEvent::Log(record));
    }

    /// Poll the active project's status. Terminal statuses stop the
    /// polling; a not-found response clears the active project entirely.
    async fn poll_status(&self, conn: &Connection) {
        let project_id = {
            let active = self.active.read();
            match active.as_ref() {
                Some(active) if active.polling => active.id.clone(),
                _ => return,
            }
        };

        let result: Result<ProjectStatusView, ClientError> = conn
            .call(METHOD_GET_STATUS, Some(json!({"project_id": project_id})))
            .await;

        match result {
            Ok(status) => {
                let terminal = status.status.is_terminal();
                {
                    let mut active = self.active.write();
                    if let Some(active) = active.as_mut() {
                        if active.id == status.id {
                            active.status = Some(status.clone());
                            if terminal {
                                active.polling = false;
                            }
                        }
                    }
                }
                if terminal {
                    debug!("Project {} reached terminal status, polling stopped", status.id);
                }
                self.emit(ConsumerEvent::Status(status));
            }
            Err(ClientError::Rpc { code, .. }) if code == NOT_FOUND => {
                info!("Project {project_id} no longer exists, clearing active project");
                *self.active.write() = None;
                self.emit(ConsumerEvent::ProjectGone { project_id });
            }
            Err(e) => {
                // Transient; the connection loop deals with real failures.
                debug!("Status poll failed: {e}");
            }
        }
    }

    fn emit(&self, event: ConsumerEvent) {
        let _ = self.events_out.send(event);
    }
}
