//! Subscribe handler: binds a connection to a project's log stream

use std::sync::Arc;

use tracing::debug;

use crate::protocol::*;
use crate::state::{ClientId, DaemonState};

pub async fn handle_subscribe(
    request: &Request,
    state: &Arc<DaemonState>,
    client_id: ClientId,
) -> String {
    let params: SubscribeParams = match serde_json::from_value(request.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            let resp = ErrorResponse::new(request.id, INVALID_PARAMS, format!("Invalid params: {e}"));
            return serde_json::to_string(&resp).unwrap();
        }
    };

    if state.get_project(&params.project_id).await.is_none() {
        let resp = ErrorResponse::new(
            request.id,
            NOT_FOUND,
            format!("Project not found: {}", params.project_id),
        );
        return serde_json::to_string(&resp).unwrap();
    }

    // Re-subscribing implicitly drops any previous binding.
    state.subscribe_client(client_id, &params.project_id).await;
    debug!("Client {client_id} subscribed to {}", params.project_id);

    let ack = Event::new(
        EVENT_SUBSCRIBED,
        SubscribedParams {
            project_id: params.project_id.clone(),
        },
    );
    if let Ok(frame) = serde_json::to_string(&ack) {
        state.send_to_client(client_id, frame).await;
    }

    let resp = SuccessResponse::new(
        request.id,
        SubscribeResult {
            project_id: params.project_id,
        },
    );
    serde_json::to_string(&resp).unwrap()
}
