//! Worker process entrypoint. Reads the `MPI_*` environment variables a
//! launched worker is started with, connects to the master, resolves the
//! requested entrypoint from the process-wide registry, and runs it.
//! Grounded on the original `worker.py::worker_main`, with dynamic
//! `importlib` dispatch replaced by [`mpi_run::registry::dispatch`].

use anyhow::{Context, Result};
use mpi_run::{registry, runtime};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = mpi_run::logging::init_tracing(0, Some("stderr"), false, "mpi-worker.log");

    if let Err(e) = run_worker().await {
        error!("worker failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run_worker() -> Result<()> {
    mpi_run::demos::register_entrypoints();

    let comm = runtime::init().await.context("failed to connect to master")?;
    info!(rank = comm.rank(), size = comm.size(), "worker connected");

    let namespace = std::env::var("MPI_RUN_MODULE").context("MPI_RUN_MODULE not set")?;
    let function = std::env::var("MPI_RUN_FUNCTION").context("MPI_RUN_FUNCTION not set")?;
    let args_env = std::env::var("MPI_RUN_ARGS").unwrap_or_default();

    let args_bytes = if args_env.is_empty() {
        Vec::new()
    } else {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(&args_env)
            .context("MPI_RUN_ARGS is not valid base64")?
    };

    registry::dispatch(&namespace, &function, args_bytes)
        .await
        .with_context(|| format!("entrypoint {namespace}::{function} failed"))?;

    info!("worker finished");
    Ok(())
}
