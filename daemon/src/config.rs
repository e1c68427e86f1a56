use clap::Parser;
use std::path::PathBuf;

/// Atelier daemon - project scaffolding, dev-server supervision and log streaming
#[derive(Parser, Debug)]
#[command(name = "atelier-daemon")]
pub struct Args {
    /// Bind address for the control socket
    #[arg(long, default_value = "127.0.0.1:4750")]
    pub listen: String,

    /// Root directory for project workspaces
    #[arg(long, env = "ATELIER_WORKSPACE_ROOT")]
    pub workspace_root: Option<PathBuf>,

    /// First port of the dev-server range
    #[arg(long, default_value_t = 3101)]
    pub port_range_start: u16,

    /// Last port of the dev-server range (inclusive)
    #[arg(long, default_value_t = 3200)]
    pub port_range_end: u16,

    /// Skip the startup sweep that kills orphan processes in the port range
    #[arg(long)]
    pub no_orphan_sweep: bool,
}

impl Args {
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| dirs_data_dir().join("atelier").join("projects"))
    }
}

fn dirs_data_dir() -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(".local/share"))
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_dev_range_disjoint_from_listen_port() {
        let args = Args::parse_from(["atelier-daemon"]);
        let listen_port: u16 = args.listen.rsplit(':').next().unwrap().parse().unwrap();
        assert!(listen_port < args.port_range_start || listen_port > args.port_range_end);
    }

    #[test]
    fn workspace_root_flag_overrides_default() {
        let args = Args::parse_from(["atelier-daemon", "--workspace-root", "/tmp/projects"]);
        assert_eq!(args.workspace_root(), PathBuf::from("/tmp/projects"));
    }
}
