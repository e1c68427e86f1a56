use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use atelier_daemon::config::Args;
use atelier_daemon::state::DaemonState;
use atelier_daemon::{connection, process, registry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI arguments
    let args = Args::parse();

    let workspace_root = args.workspace_root();
    info!("Workspace root: {}", workspace_root.display());

    if !workspace_root.exists() {
        std::fs::create_dir_all(&workspace_root)?;
        info!("Created workspace root: {}", workspace_root.display());
    }

    // Rebuild the project catalog from disk
    let recovered = registry::scan_workspace(&workspace_root);
    info!("Recovered {} project(s)", recovered.len());

    // The allocator starts all-free, so anything still bound inside the
    // managed range is an orphan from a previous run and must go first.
    if args.no_orphan_sweep {
        info!("Skipping orphan sweep (--no-orphan-sweep)");
    } else {
        process::sweep_port_range(args.port_range_start, args.port_range_end).await;
    }

    // Create shared state
    let state = Arc::new(DaemonState::new(
        workspace_root,
        args.port_range_start,
        args.port_range_end,
        recovered,
    ));

    // Bind TCP listener
    let listener = TcpListener::bind(&args.listen).await?;
    info!("Listening on {}", args.listen);

    // Accept loop; ctrl-c stops every tracked dev server before exit
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let state = state.clone();
                        tokio::spawn(async move {
                            connection::handle_client(stream, state).await;
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {e}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down, stopping dev servers");
                state.cleanup().await;
                break;
            }
        }
    }

    Ok(())
}
