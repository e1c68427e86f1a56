//! Child-process supervision
//!
//! Spawns install and dev-server processes for projects, pumps their output
//! through the classifier into the fan-out hub, and owns termination:
//! graceful signal, bounded grace period, forced kill, then an OS-level
//! sweep of anything still bound to the port (dev commands fork children
//! that outlive the tracked handle).

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::classify;
use crate::error::DaemonError;
use crate::registry::Framework;
use crate::state::DaemonState;

/// Delay after spawning a dev server before reporting its URL, long enough
/// for the server to bind its listener.
pub const DEV_SERVER_SETTLE: Duration = Duration::from_millis(1500);

/// How long a dev server gets to exit after SIGTERM before SIGKILL.
pub const STOP_GRACE: Duration = Duration::from_secs(3);

/// The running dev-server child for a project. At most one per project;
/// exists only while the server is active.
pub struct DevServerHandle {
    pub project_id: String,
    pub port: u16,
    pub pid: u32,
    child: Mutex<Option<Child>>,
}

/// Dev-server command for a framework. The port is injected through the
/// `PORT` environment variable, which the scaffolded vite config reads.
pub fn dev_server_command(framework: Framework) -> (&'static str, &'static [&'static str]) {
    match framework {
        Framework::React | Framework::Vue => ("npm", &["run", "dev"]),
    }
}

/// Install command for a package manager. Unrecognized names are run as
/// `<name> install`; the daemon is a single-operator local tool and the
/// caller already controls the machine.
pub fn install_command(package_manager: &str) -> (String, Vec<String>) {
    match package_manager {
        "npm" => (
            "npm".to_string(),
            vec!["install".into(), "--no-audit".into(), "--no-fund".into()],
        ),
        "pnpm" | "yarn" | "bun" => (package_manager.to_string(), vec!["install".into()]),
        other => (other.to_string(), vec!["install".into()]),
    }
}

/// Spawn a dev-server process in its own process group with streaming log
/// capture attached. The caller has already reserved `port`.
pub fn spawn_dev_server(
    state: Arc<DaemonState>,
    project_id: &str,
    dir: &Path,
    program: &str,
    args: &[&str],
    port: u16,
) -> Result<Arc<DevServerHandle>, DaemonError> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .env("PORT", port.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DaemonError::SpawnFailed {
            command: program.to_string(),
            source,
        })?;

    let pid = child.id().unwrap_or_default();
    info!("Spawned dev server for {project_id} (pid {pid}, port {port})");

    if let Some(stderr) = child.stderr.take() {
        spawn_stream_reader(state.clone(), project_id.to_string(), stderr, None);
    }
    if let Some(stdout) = child.stdout.take() {
        // The stdout reader doubles as the exit monitor: EOF means the
        // process is gone (or no longer talking, which we treat the same).
        spawn_stream_reader(state, project_id.to_string(), stdout, Some(port));
    }

    Ok(Arc::new(DevServerHandle {
        project_id: project_id.to_string(),
        port,
        pid,
        child: Mutex::new(Some(child)),
    }))
}

fn spawn_stream_reader<R>(
    state: Arc<DaemonState>,
    project_id: String,
    stream: R,
    exit_port: Option<u16>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(record) = classify::classify(&project_id, &line) {
                state.publish_log(record).await;
            }
        }
        if let Some(port) = exit_port {
            state.on_dev_server_exit(&project_id, port).await;
        }
    });
}

/// Run a package-manager install to completion, streaming each output line
/// into the hub and capturing it for diagnosis. Resolves with the captured
/// output on exit code 0, `InstallFailed` otherwise.
pub async fn run_install(
    state: Arc<DaemonState>,
    project_id: &str,
    dir: &Path,
    package_manager: &str,
) -> Result<String, DaemonError> {
    let (program, args) = install_command(package_manager);
    info!("Running {program} install for {project_id}");

    let mut child = Command::new(&program)
        .args(&args)
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| DaemonError::SpawnFailed {
            command: program.clone(),
            source,
        })?;

    let captured: Arc<std::sync::Mutex<Vec<String>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut readers: Vec<JoinHandle<()>> = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_capture_reader(
            state.clone(),
            project_id.to_string(),
            stdout,
            captured.clone(),
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_capture_reader(
            state.clone(),
            project_id.to_string(),
            stderr,
            captured.clone(),
        ));
    }

    let status = child.wait().await?;
    for reader in readers {
        let _ = reader.await;
    }

    let output = captured.lock().expect("capture lock").join("\n");
    if status.success() {
        Ok(output)
    } else {
        Err(DaemonError::InstallFailed {
            exit_code: status.code().unwrap_or(-1),
            output,
        })
    }
}

fn spawn_capture_reader<R>(
    state: Arc<DaemonState>,
    project_id: String,
    stream: R,
    captured: Arc<std::sync::Mutex<Vec<String>>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(record) = classify::classify(&project_id, &line) {
                captured
                    .lock()
                    .expect("capture lock")
                    .push(record.message.clone());
                state.publish_log(record).await;
            }
        }
    })
}

/// Terminate a dev-server process: SIGTERM to its process group, a bounded
/// grace period, then SIGKILL. Idempotent; signal errors are ignored (the
/// process may already be gone).
pub async fn terminate(handle: &DevServerHandle) {
    let child = handle.child.lock().await.take();
    let Some(mut child) = child else {
        return;
    };

    let pgid = Pid::from_raw(handle.pid as i32);
    if let Err(e) = killpg(pgid, Signal::SIGTERM) {
        debug!("SIGTERM to group {pgid} failed: {e}");
    }

    match timeout(STOP_GRACE, child.wait()).await {
        Ok(status) => {
            debug!(
                "Dev server for {} exited after SIGTERM: {:?}",
                handle.project_id, status
            );
        }
        Err(_) => {
            warn!(
                "Dev server for {} ignored SIGTERM, escalating to SIGKILL",
                handle.project_id
            );
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                debug!("SIGKILL to group {pgid} failed: {e}");
            }
            let _ = child.wait().await;
        }
    }
}

/// Force-kill any OS process still listening on `port`. Covers children the
/// dev command forked outside the tracked process group.
pub async fn kill_port_owners(port: u16) {
    for pid in port_listeners(&format!(":{port}")).await {
        warn!("Killing process {pid} still bound to port {port}");
        let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
    }
}

/// Startup orphan cleanup: force-kill every process listening inside the
/// managed dev-server range. The allocator resets to all-free on restart,
/// so stray dev servers from a previous run must die before it is trusted.
pub async fn sweep_port_range(start: u16, end: u16) {
    let pids = port_listeners(&format!(":{start}-{end}")).await;
    if pids.is_empty() {
        debug!("No orphan processes in port range {start}-{end}");
        return;
    }
    for pid in pids {
        warn!("Killing orphan process {pid} in managed port range");
        let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
    }
}

/// PIDs of processes listening on the given lsof port spec (`:3101` or
/// `:3101-3200`). Returns nothing when lsof is unavailable or finds no
/// listeners.
async fn port_listeners(port_spec: &str) -> Vec<i32> {
    let output = Command::new("lsof")
        .args(["-ti", port_spec, "-sTCP:LISTEN"])
        .output()
        .await;

    match output {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse::<i32>().ok())
            .collect(),
        Err(e) => {
            debug!("lsof unavailable: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProjectRegistry;
    use std::time::Instant;

    fn test_state() -> (Arc<DaemonState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(DaemonState::new(
            dir.path().to_path_buf(),
            3101,
            3200,
            ProjectRegistry::new(),
        ));
        (state, dir)
    }

    #[test]
    fn install_command_maps_known_package_managers() {
        let (program, args) = install_command("npm");
        assert_eq!(program, "npm");
        assert_eq!(args[0], "install");

        let (program, args) = install_command("pnpm");
        assert_eq!(program, "pnpm");
        assert_eq!(args, vec!["install"]);

        let (program, _) = install_command("bun");
        assert_eq!(program, "bun");
    }

    #[test]
    fn dev_server_command_uses_npm_scripts() {
        let (program, args) = dev_server_command(Framework::React);
        assert_eq!(program, "npm");
        assert_eq!(args, ["run", "dev"]);
    }

    #[tokio::test]
    async fn run_install_succeeds_on_exit_zero() {
        let (state, dir) = test_state();
        let result = run_install(state, "p1", dir.path(), "true").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn run_install_fails_with_exit_code() {
        let (state, dir) = test_state();
        let result = run_install(state, "p1", dir.path(), "false").await;
        match result {
            Err(DaemonError::InstallFailed { exit_code, .. }) => assert_eq!(exit_code, 1),
            other => panic!("expected InstallFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminate_stops_a_cooperative_process() {
        let (state, dir) = test_state();
        let handle = spawn_dev_server(
            state,
            "p1",
            dir.path(),
            "sh",
            &["-c", "sleep 30"],
            3150,
        )
        .unwrap();

        let started = Instant::now();
        terminate(&handle).await;
        assert!(started.elapsed() < STOP_GRACE);
    }

    #[tokio::test]
    async fn terminate_escalates_when_sigterm_is_ignored() {
        let (state, dir) = test_state();
        // The group SIGTERM kills the current `sleep`, but the trap keeps
        // the shell alive and respawning; only SIGKILL ends it.
        let handle = spawn_dev_server(
            state,
            "p1",
            dir.path(),
            "sh",
            &["-c", "trap '' TERM; while true; do sleep 1; done"],
            3151,
        )
        .unwrap();

        // Give the shell a moment to install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        terminate(&handle).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= STOP_GRACE);
        assert!(elapsed < STOP_GRACE + Duration::from_secs(2));
    }

    #[tokio::test]
    async fn terminate_twice_is_a_noop() {
        let (state, dir) = test_state();
        let handle = spawn_dev_server(state, "p1", dir.path(), "sh", &["-c", "sleep 30"], 3152)
            .unwrap();

        terminate(&handle).await;
        terminate(&handle).await;
    }

    #[tokio::test]
    async fn spawn_failure_surfaces_as_spawn_failed() {
        let (state, dir) = test_state();
        let result = spawn_dev_server(
            state,
            "p1",
            dir.path(),
            "definitely-not-a-real-binary",
            &[],
            3153,
        );
        assert!(matches!(result, Err(DaemonError::SpawnFailed { .. })));
    }
}
