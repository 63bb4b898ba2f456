//! Typed error enums for each failure category in the runtime.
//!
//! Small `thiserror` enums at each subsystem boundary, converted into
//! `anyhow::Error` via `?` at call sites that return `anyhow::Result`.

use thiserror::Error;

/// Configuration validation failures (`configure_infra`).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("master_node cannot be empty")]
    EmptyMasterNode,
    #[error("per_node_cores must be positive")]
    NonPositiveCores,
    #[error("num_worker_nodes cannot be null when hosts are not provided")]
    MissingWorkerNodeCount,
    #[error("num_worker_nodes must be positive")]
    NonPositiveWorkerNodes,
    #[error("num_worker_nodes must match number of hosts")]
    HostCountMismatch,
    #[error("MPI_RANK not set; use run() or the mpi-worker binary")]
    NotAWorker,
    #[error("failed to read hostfile {path}: {source}")]
    HostfileUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Job-lifecycle state violations.
#[derive(Debug, Error)]
pub enum JobStateError {
    #[error("a job is already running; wait for it to finish before starting a new one")]
    AlreadyActive,
    #[error("no active job to cancel")]
    NoActiveJob,
}

/// Wire-level and routing violations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid handshake from worker")]
    InvalidHandshake,
    #[error("duplicate rank connected: {0}")]
    DuplicateRank(u32),
    #[error("timed out waiting for workers to connect")]
    AcceptTimeout,
    #[error("unknown destination rank {0}")]
    UnknownDestination(u32),
    #[error("send to rank 0 is not legal on the master router")]
    SendToSelf,
    #[error("serialization failure: {0}")]
    Codec(#[from] bincode::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Malformed frame headers.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid frame type byte: {0}")]
    InvalidType(u8),
}

/// `recv` deadline exceeded.
#[derive(Debug, Error)]
#[error("recv timed out")]
pub struct RecvTimeout;

/// Raised by `raise_if_cancelled` once the cancel signal is observed.
#[derive(Debug, Error)]
#[error("job was cancelled")]
pub struct JobCancelled;
