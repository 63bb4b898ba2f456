//! SSH-based launcher: spawns one worker process per rank on the
//! configured remote hosts. Grounded on the original `launcher.py`'s
//! `_ssh_prefix`/subprocess construction, restyled with the
//! `Command`-building idiom this codebase uses elsewhere for spawning
//! child processes.

use crate::config::InfraConfig;
use anyhow::{bail, Context, Result};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Build the `ssh [-p port] [-i identity] user@host` prefix for one host.
fn ssh_prefix(cfg: &InfraConfig, host: &str) -> Vec<String> {
    let user_host = match &cfg.ssh_user {
        Some(user) => format!("{}@{}", user, host),
        None => host.to_string(),
    };
    let mut prefix = vec!["ssh".to_string()];
    prefix.push("-p".to_string());
    prefix.push(cfg.ssh_port.to_string());
    if let Some(identity) = &cfg.ssh_identity_file {
        prefix.push("-i".to_string());
        prefix.push(identity.clone());
    }
    prefix.push(user_host);
    prefix
}

/// Spawn `cfg.num_worker_nodes * cfg.per_node_cores` worker processes over
/// SSH, one per rank starting at 1, assigned densely per host. Each remote
/// command sets the seven `MPI_*` environment variables and runs
/// `cfg.worker_executable`. Returns the resulting world size (worker
/// count plus the master at rank 0).
pub fn launch_workers(
    cfg: &InfraConfig,
    master_host: &str,
    master_port: u16,
    entry_namespace: &str,
    entry_function: &str,
    args_blob: &str,
) -> Result<u32> {
    if cfg.hosts.is_empty() {
        bail!("hosts list is required for SSH launch");
    }

    let ranks_per_node = cfg.per_node_cores;
    let world_size = cfg.num_worker_nodes * ranks_per_node + 1;

    let mut rank = 1u32;
    for host in &cfg.hosts {
        for local_rank in 0..ranks_per_node {
            let remote_cmd = build_remote_command(
                cfg,
                master_host,
                master_port,
                world_size,
                rank,
                entry_namespace,
                entry_function,
                args_blob,
            );

            let mut prefix = ssh_prefix(cfg, host);
            prefix.push(remote_cmd);
            let program = prefix.remove(0);

            let child = Command::new(&program)
                .args(&prefix)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .with_context(|| format!("failed to launch rank {} on {}", rank, host))?;

            debug!("launched rank {} on {} with pid {}", rank, host, child.id());
            if cfg.progress_to_terminal {
                info!("launched rank {} on {} (local {})", rank, host, local_rank);
            }
            rank += 1;
        }
    }
    Ok(world_size)
}

fn build_remote_command(
    cfg: &InfraConfig,
    master_host: &str,
    master_port: u16,
    world_size: u32,
    rank: u32,
    entry_namespace: &str,
    entry_function: &str,
    args_blob: &str,
) -> String {
    let env = [
        ("MPI_MASTER_HOST", master_host.to_string()),
        ("MPI_MASTER_PORT", master_port.to_string()),
        ("MPI_WORLD_SIZE", world_size.to_string()),
        ("MPI_RANK", rank.to_string()),
        ("MPI_RUN_MODULE", entry_namespace.to_string()),
        ("MPI_RUN_FUNCTION", entry_function.to_string()),
        ("MPI_RUN_ARGS", args_blob.to_string()),
    ];
    let export = env
        .iter()
        .map(|(k, v)| format!("{}='{}'", k, v))
        .collect::<Vec<_>>()
        .join(" ");
    let workdir = match &cfg.working_dir {
        Some(dir) => format!("cd '{}' && ", dir),
        None => String::new(),
    };
    format!("{}{} {}", workdir, export, cfg.worker_executable)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cfg() -> InfraConfig {
        crate::config::ConfigBuilder::new("master.local", 2)
            .hosts(["node-a", "node-b"])
            .build()
            .unwrap()
    }

    #[test]
    fn ssh_prefix_includes_port_and_user_host() {
        let mut cfg = base_cfg();
        cfg.ssh_user = Some("alice".to_string());
        cfg.ssh_port = 2222;
        let prefix = ssh_prefix(&cfg, "node-a");
        assert_eq!(prefix, vec!["ssh", "-p", "2222", "alice@node-a"]);
    }

    #[test]
    fn remote_command_embeds_all_seven_env_vars() {
        let cfg = base_cfg();
        let cmd = build_remote_command(&cfg, "10.0.0.1", 9000, 5, 3, "demos", "prime", "QUJD");
        for var in [
            "MPI_MASTER_HOST",
            "MPI_MASTER_PORT",
            "MPI_WORLD_SIZE",
            "MPI_RANK",
            "MPI_RUN_MODULE",
            "MPI_RUN_FUNCTION",
            "MPI_RUN_ARGS",
        ] {
            assert!(cmd.contains(var), "missing {var} in {cmd}");
        }
        assert!(cmd.ends_with("mpi-worker"));
    }

    #[test]
    fn world_size_accounts_for_master_rank() {
        let cfg = base_cfg();
        assert_eq!(cfg.num_worker_nodes * cfg.per_node_cores + 1, 5);
    }
}
