pub mod dev_server;
pub mod files;
pub mod projects;
pub mod subscribe;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::protocol::*;
use crate::state::{ClientId, DaemonState};

/// Dispatch a request to the appropriate handler
pub async fn dispatch(
    request: &Request,
    state: Arc<DaemonState>,
    client_id: ClientId,
) -> String {
    let start = Instant::now();
    let method = request.method.as_str();
    let id = request.id;

    debug!("[dispatch] → id={} method={} client={}", id, method, client_id);

    let response = match method {
        METHOD_CREATE_PROJECT => projects::handle_create(request, &state).await,
        METHOD_WRITE_FILE => files::handle_write_file(request, &state).await,
        METHOD_INSTALL_DEPENDENCIES => dev_server::handle_install(request, state.clone()).await,
        METHOD_START_DEV_SERVER => dev_server::handle_start(request, state.clone()).await,
        METHOD_STOP_DEV_SERVER => dev_server::handle_stop(request, &state).await,
        METHOD_GET_STATUS => projects::handle_status(request, &state).await,
        METHOD_LIST_PROJECTS => projects::handle_list(request, &state).await,
        METHOD_CONFIGURE_MONITORING => projects::handle_configure_monitoring(request, &state).await,
        METHOD_DELETE_PROJECT => projects::handle_delete(request, &state).await,
        METHOD_DELETE_ALL_PROJECTS => projects::handle_delete_all(request, &state).await,
        METHOD_SUBSCRIBE => subscribe::handle_subscribe(request, &state, client_id).await,
        _ => {
            warn!("[dispatch] Unknown method: {}", method);
            let resp = ErrorResponse::new(
                request.id,
                INVALID_PARAMS,
                format!("Unknown method: {}", request.method),
            );
            serde_json::to_string(&resp).unwrap()
        }
    };

    let elapsed = start.elapsed();
    let is_error = response.contains("\"error\"");

    if is_error {
        info!("[dispatch] ← id={} method={} error elapsed={:?}", id, method, elapsed);
    } else {
        debug!("[dispatch] ← id={} method={} ok elapsed={:?}", id, method, elapsed);
    }

    response
}
