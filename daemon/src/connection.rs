use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::handlers;
use crate::protocol::{ErrorResponse, Event, Request, EVENT_CONNECTED, INVALID_PARAMS};
use crate::state::{ClientId, DaemonState};

/// Handle a single client connection
pub async fn handle_client(stream: TcpStream, state: Arc<DaemonState>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    info!("Client connected: {peer}");

    let (client_id, event_rx) = state.register_client().await;
    debug!("Assigned client_id={client_id} to {peer}");

    // Greet the client before anything else reaches its event channel.
    let connected = Event::new(EVENT_CONNECTED, json!({}));
    if let Ok(frame) = serde_json::to_string(&connected) {
        state.send_to_client(client_id, frame).await;
    }

    let result = handle_client_inner(stream, state.clone(), client_id, event_rx).await;

    if let Err(e) = result {
        debug!("Client {peer} error: {e}");
    }

    info!("Client disconnected: {peer}");
    state.unregister_client(client_id).await;
}

async fn handle_client_inner(
    stream: TcpStream,
    state: Arc<DaemonState>,
    client_id: ClientId,
    mut event_rx: mpsc::UnboundedReceiver<String>,
) -> Result<(), String> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    // Main loop: read requests and forward events
    loop {
        tokio::select! {
            // Read request from client
            result = reader.read_line(&mut line) => {
                match result {
                    Ok(0) => break, // EOF
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            if let Some(response) = process_request(trimmed, state.clone(), client_id).await {
                                if let Err(e) = writer.write_all(response.as_bytes()).await {
                                    error!("Failed to write response: {e}");
                                    break;
                                }
                                if let Err(e) = writer.write_all(b"\n").await {
                                    error!("Failed to write newline: {e}");
                                    break;
                                }
                            }
                        }
                        line.clear();
                    }
                    Err(e) => {
                        debug!("Read error: {e}");
                        break;
                    }
                }
            }

            // Forward events to client
            Some(event) = event_rx.recv() => {
                if let Err(e) = writer.write_all(event.as_bytes()).await {
                    error!("Failed to write event: {e}");
                    break;
                }
                if let Err(e) = writer.write_all(b"\n").await {
                    error!("Failed to write newline: {e}");
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Process a single request and return JSON response
async fn process_request(
    line: &str,
    state: Arc<DaemonState>,
    client_id: ClientId,
) -> Option<String> {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            let resp = ErrorResponse::new(0, INVALID_PARAMS, format!("Invalid JSON: {e}"));
            return Some(serde_json::to_string(&resp).unwrap());
        }
    };

    Some(handlers::dispatch(&request, state, client_id).await)
}
