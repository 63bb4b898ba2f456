//! Command-line surface for the `mpi-run-demos` binary: runs one of the
//! supplemented example workloads (matmul, monte carlo, prime) against a
//! configured cluster or in single-process mode.

use clap::{Parser, ValueEnum};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demo {
    Matmul,
    MonteCarlo,
    Prime,
}

/// Run a demo workload across a configured cluster, or locally with
/// `--local` for a quick single-process sanity check.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Which demo workload to run.
    #[arg(value_enum)]
    pub demo: Demo,

    /// Skip cluster launch entirely and run against `Comm::local()`.
    #[arg(long)]
    pub local: bool,

    /// Host this process's router listens/launches from. Required unless `--local`.
    #[arg(long)]
    pub master_node: Option<String>,

    /// Worker hosts to SSH into (space-separated, repeatable).
    #[arg(long, num_args = 0..)]
    pub hosts: Vec<String>,

    /// Worker ranks to start per host.
    #[arg(long, default_value_t = 1)]
    pub per_node_cores: u32,

    #[arg(long)]
    pub ssh_user: Option<String>,

    #[arg(long, default_value_t = 22)]
    pub ssh_port: u16,

    #[arg(long)]
    pub ssh_identity_file: Option<String>,

    /// Path to the `mpi-worker` binary on remote hosts.
    #[arg(long, default_value = "mpi-worker")]
    pub worker_executable: String,

    /// `prime` demo: the number to test.
    #[arg(long, default_value_t = 104_729)]
    pub prime_n: u64,

    /// `monte-carlo` demo: number of samples.
    #[arg(long, default_value_t = 20_000)]
    pub mc_samples: u64,

    /// `monte-carlo` demo: RNG seed (per-rank offset is `seed + rank`).
    #[arg(long)]
    pub mc_seed: Option<u64>,

    /// `matmul` demo: size of the square matrices to multiply.
    #[arg(long, default_value_t = 4)]
    pub matmul_size: usize,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log file path, or "stderr" to skip file logging entirely.
    #[arg(long)]
    pub log_file: Option<String>,

    #[arg(long)]
    pub quiet: bool,
}
