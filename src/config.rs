//! Cluster/runtime configuration. Grounded on the original
//! `mpipy.config.InfraConfig` dataclass and `configure_infra` validation
//! function, restyled as a serde-derived struct with a builder. There is
//! no sensible all-defaults instance: `master_node`/`per_node_cores`/
//! worker count are always caller-supplied, so the constructor is the
//! only way to get one.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Validated cluster configuration for launching worker processes over SSH.
///
/// Construct via [`ConfigBuilder`]; there is no `Default` impl because
/// `master_node` and `per_node_cores` have no meaningful default value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfraConfig {
    pub master_node: String,
    pub per_node_cores: u32,
    pub num_worker_nodes: u32,
    pub hosts: Vec<String>,
    pub ssh_user: Option<String>,
    pub ssh_port: u16,
    pub ssh_identity_file: Option<String>,
    /// Path to this crate's own `mpi-worker` binary on remote hosts (the
    /// original's `python_executable` has no interpreter to stand in for
    /// once compiled — see REDESIGN FLAGS).
    pub worker_executable: String,
    pub working_dir: Option<String>,
    pub connect_timeout_s: f64,
    pub time_job: bool,
    pub progress_to_terminal: bool,
}

/// Builder mirroring `configure_infra`'s keyword-argument surface.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    master_node: String,
    per_node_cores: u32,
    num_worker_nodes: Option<u32>,
    hosts: Vec<String>,
    hostfile: Option<String>,
    ssh_user: Option<String>,
    ssh_port: u16,
    ssh_identity_file: Option<String>,
    worker_executable: String,
    working_dir: Option<String>,
    connect_timeout_s: f64,
    time_job: bool,
    progress_to_terminal: bool,
}

impl ConfigBuilder {
    pub fn new(master_node: impl Into<String>, per_node_cores: u32) -> Self {
        Self {
            master_node: master_node.into(),
            per_node_cores,
            num_worker_nodes: None,
            hosts: Vec::new(),
            hostfile: None,
            ssh_user: None,
            ssh_port: 22,
            ssh_identity_file: None,
            worker_executable: "mpi-worker".to_string(),
            working_dir: None,
            connect_timeout_s: 10.0,
            time_job: false,
            progress_to_terminal: false,
        }
    }

    pub fn num_worker_nodes(mut self, n: u32) -> Self {
        self.num_worker_nodes = Some(n);
        self
    }

    pub fn hosts(mut self, hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.hosts.extend(hosts.into_iter().map(Into::into));
        self
    }

    pub fn hostfile(mut self, path: impl Into<String>) -> Self {
        self.hostfile = Some(path.into());
        self
    }

    pub fn ssh_user(mut self, user: impl Into<String>) -> Self {
        self.ssh_user = Some(user.into());
        self
    }

    pub fn ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    pub fn ssh_identity_file(mut self, path: impl Into<String>) -> Self {
        self.ssh_identity_file = Some(path.into());
        self
    }

    pub fn worker_executable(mut self, path: impl Into<String>) -> Self {
        self.worker_executable = path.into();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn connect_timeout_s(mut self, secs: f64) -> Self {
        self.connect_timeout_s = secs;
        self
    }

    pub fn time_job(mut self, yes: bool) -> Self {
        self.time_job = yes;
        self
    }

    pub fn progress_to_terminal(mut self, yes: bool) -> Self {
        self.progress_to_terminal = yes;
        self
    }

    /// Validate and produce the final `InfraConfig`, matching
    /// `configure_infra`'s checks verbatim.
    pub fn build(self) -> Result<InfraConfig, ConfigError> {
        if self.master_node.is_empty() {
            return Err(ConfigError::EmptyMasterNode);
        }
        if self.per_node_cores == 0 {
            return Err(ConfigError::NonPositiveCores);
        }

        let mut host_list = self.hosts;
        if let Some(path) = &self.hostfile {
            host_list.extend(read_hostfile(path)?);
        }

        let num_worker_nodes = match self.num_worker_nodes {
            Some(n) => n,
            None => {
                if host_list.is_empty() {
                    return Err(ConfigError::MissingWorkerNodeCount);
                }
                host_list.len() as u32
            }
        };

        if num_worker_nodes == 0 {
            return Err(ConfigError::NonPositiveWorkerNodes);
        }
        if !host_list.is_empty() && host_list.len() as u32 != num_worker_nodes {
            return Err(ConfigError::HostCountMismatch);
        }

        Ok(InfraConfig {
            master_node: self.master_node,
            per_node_cores: self.per_node_cores,
            num_worker_nodes,
            hosts: host_list,
            ssh_user: self.ssh_user,
            ssh_port: self.ssh_port,
            ssh_identity_file: self.ssh_identity_file,
            worker_executable: self.worker_executable,
            working_dir: self.working_dir,
            connect_timeout_s: self.connect_timeout_s,
            time_job: self.time_job,
            progress_to_terminal: self.progress_to_terminal,
        })
    }
}

fn read_hostfile(path: &str) -> Result<Vec<String>, ConfigError> {
    let contents = fs::read_to_string(Path::new(path)).map_err(|source| {
        ConfigError::HostfileUnreadable {
            path: path.to_string(),
            source,
        }
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_with_explicit_worker_count_succeeds() {
        let cfg = ConfigBuilder::new("master.local", 4)
            .num_worker_nodes(3)
            .build()
            .unwrap();
        assert_eq!(cfg.num_worker_nodes, 3);
        assert!(cfg.hosts.is_empty());
        assert_eq!(cfg.ssh_port, 22);
    }

    #[test]
    fn worker_count_derived_from_hosts_when_omitted() {
        let cfg = ConfigBuilder::new("master.local", 4)
            .hosts(["a", "b"])
            .build()
            .unwrap();
        assert_eq!(cfg.num_worker_nodes, 2);
    }

    #[test]
    fn empty_master_node_is_rejected() {
        let err = ConfigBuilder::new("", 4).num_worker_nodes(1).build();
        assert!(matches!(err, Err(ConfigError::EmptyMasterNode)));
    }

    #[test]
    fn zero_cores_is_rejected() {
        let err = ConfigBuilder::new("master.local", 0)
            .num_worker_nodes(1)
            .build();
        assert!(matches!(err, Err(ConfigError::NonPositiveCores)));
    }

    #[test]
    fn missing_worker_count_without_hosts_is_rejected() {
        let err = ConfigBuilder::new("master.local", 4).build();
        assert!(matches!(err, Err(ConfigError::MissingWorkerNodeCount)));
    }

    #[test]
    fn mismatched_host_count_is_rejected() {
        let err = ConfigBuilder::new("master.local", 4)
            .hosts(["a", "b"])
            .num_worker_nodes(3)
            .build();
        assert!(matches!(err, Err(ConfigError::HostCountMismatch)));
    }

    #[test]
    fn hostfile_entries_are_merged_and_comments_skipped() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "node-a").unwrap();
        writeln!(file, "  ").unwrap();
        writeln!(file, "node-b").unwrap();
        let cfg = ConfigBuilder::new("master.local", 4)
            .hostfile(file.path().to_str().unwrap())
            .build()
            .unwrap();
        assert_eq!(cfg.hosts, vec!["node-a", "node-b"]);
        assert_eq!(cfg.num_worker_nodes, 2);
    }

    #[test]
    fn missing_hostfile_is_reported() {
        let err = ConfigBuilder::new("master.local", 4)
            .hostfile("/nonexistent/path/to/hostfile")
            .build();
        assert!(matches!(err, Err(ConfigError::HostfileUnreadable { .. })));
    }
}
