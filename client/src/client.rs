//! Connection to the daemon: request/response multiplexing over a single
//! newline-delimited JSON stream, with server-push events surfaced on a
//! channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::timeout;
use tracing::debug;

use crate::protocol::{
    LogRecord, Request, EVENT_CONNECTED, EVENT_LOG, EVENT_SUBSCRIBED,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection timed out")]
    ConnectTimeout,

    #[error("request timed out")]
    RequestTimeout,

    #[error("connection closed")]
    Disconnected,

    #[error("{code}: {message}")]
    Rpc { code: String, message: String },
}

/// Server-push events delivered by the reader task
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Connected,
    Subscribed { project_id: String },
    Log(LogRecord),
}

type PendingRequests = HashMap<u64, oneshot::Sender<Result<Value, ClientError>>>;

/// One live connection to the daemon
pub struct Connection {
    writer: Mutex<BufWriter<OwnedWriteHalf>>,
    pending: Arc<Mutex<PendingRequests>>,
    next_id: AtomicU64,
    closed: watch::Receiver<bool>,
}

impl Connection {
    /// Connect to the daemon. Server events are forwarded to `events` until
    /// the connection closes.
    pub async fn connect(
        addr: &str,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<Self, ClientError> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout)??;

        let (reader, writer) = stream.into_split();
        let pending: Arc<Mutex<PendingRequests>> = Arc::new(Mutex::new(HashMap::new()));
        let (closed_tx, closed_rx) = watch::channel(false);

        Self::spawn_reader(BufReader::new(reader), pending.clone(), closed_tx, events);

        Ok(Self {
            writer: Mutex::new(BufWriter::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            closed: closed_rx,
        })
    }

    /// Resolves when the connection closes (EOF, network failure).
    pub async fn wait_closed(&self) {
        let mut closed = self.closed.clone();
        while !*closed.borrow() {
            if closed.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn spawn_reader(
        mut reader: BufReader<OwnedReadHalf>,
        pending: Arc<Mutex<PendingRequests>>,
        closed: watch::Sender<bool>,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) {
        tokio::spawn(async move {
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break, // EOF
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }

                        // Responses carry an "id"; events carry a "method".
                        if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
                            if parsed.get("id").is_some() {
                                Self::handle_response(&pending, &parsed).await;
                            } else if parsed.get("method").is_some() {
                                Self::handle_event(&events, &parsed);
                            }
                        }
                    }
                    Err(e) => {
                        debug!("Read error: {e}");
                        break;
                    }
                }
            }

            let _ = closed.send(true);

            // Fail all pending requests
            let mut pending = pending.lock().await;
            for (_, sender) in pending.drain() {
                let _ = sender.send(Err(ClientError::Disconnected));
            }
        });
    }

    async fn handle_response(pending: &Mutex<PendingRequests>, parsed: &Value) {
        let id = match parsed.get("id").and_then(|v| v.as_u64()) {
            Some(id) => id,
            None => return,
        };

        let mut pending = pending.lock().await;
        if let Some(sender) = pending.remove(&id) {
            let result = if let Some(result) = parsed.get("result") {
                Ok(result.clone())
            } else if let Some(error) = parsed.get("error") {
                Err(ClientError::Rpc {
                    code: error
                        .get("code")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    message: error
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                })
            } else {
                Err(ClientError::Disconnected)
            };
            let _ = sender.send(result);
        }
    }

    fn handle_event(events: &mpsc::UnboundedSender<ServerEvent>, parsed: &Value) {
        let method = match parsed.get("method").and_then(|v| v.as_str()) {
            Some(m) => m,
            None => return,
        };
        let params = parsed.get("params").cloned().unwrap_or(Value::Null);

        let event = match method {
            EVENT_CONNECTED => Some(ServerEvent::Connected),
            EVENT_SUBSCRIBED => params
                .get("project_id")
                .and_then(|v| v.as_str())
                .map(|project_id| ServerEvent::Subscribed {
                    project_id: project_id.to_string(),
                }),
            EVENT_LOG => params
                .get("record")
                .cloned()
                .and_then(|record| serde_json::from_value::<LogRecord>(record).ok())
                .map(ServerEvent::Log),
            _ => None,
        };

        if let Some(event) = event {
            let _ = events.send(event);
        }
    }

    /// Send a request and wait for its response
    pub async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Option<P>,
    ) -> Result<R, ClientError> {
        if self.is_closed() {
            return Err(ClientError::Disconnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request {
            id,
            method,
            params: match params {
                Some(p) => Some(serde_json::to_value(p)?),
                None => None,
            },
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        {
            let mut writer = self.writer.lock().await;
            let json = serde_json::to_string(&request)?;
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        let result = timeout(REQUEST_TIMEOUT, rx)
            .await
            .map_err(|_| ClientError::RequestTimeout)?
            .map_err(|_| ClientError::Disconnected)?;

        let value = result?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn events_are_decoded_by_method() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        Connection::handle_event(&tx, &json!({"method": "connected", "params": {}}));
        assert!(matches!(rx.try_recv().unwrap(), ServerEvent::Connected));

        Connection::handle_event(
            &tx,
            &json!({"method": "subscribed", "params": {"project_id": "1a2b3c4d"}}),
        );
        match rx.try_recv().unwrap() {
            ServerEvent::Subscribed { project_id } => assert_eq!(project_id, "1a2b3c4d"),
            other => panic!("unexpected event {other:?}"),
        }

        Connection::handle_event(
            &tx,
            &json!({"method": "log", "params": {"record": {
                "timestamp": "2025-06-01T12:00:00Z",
                "level": "info",
                "message": "hello",
                "project_id": "1a2b3c4d"
            }}}),
        );
        match rx.try_recv().unwrap() {
            ServerEvent::Log(record) => assert_eq!(record.message, "hello"),
            other => panic!("unexpected event {other:?}"),
        }

        // Unknown events are dropped silently.
        Connection::handle_event(&tx, &json!({"method": "mystery", "params": {}}));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn error_responses_resolve_pending_calls_with_rpc_error() {
        let pending: Arc<Mutex<PendingRequests>> = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(5, tx);

        Connection::handle_response(
            &pending,
            &json!({"id": 5, "error": {"code": "not_found", "message": "gone"}}),
        )
        .await;

        match rx.await.unwrap() {
            Err(ClientError::Rpc { code, message }) => {
                assert_eq!(code, "not_found");
                assert_eq!(message, "gone");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
