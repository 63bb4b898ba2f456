//! Demo-runner binary: exercises one of the three supplemented example
//! workloads (matmul, monte carlo, prime) against a configured cluster,
//! or locally with `--local` for a quick sanity check. The Rust-native
//! stand-in for the original's `examples/*_demo.py` scripts.

use anyhow::{Context, Result};
use clap::Parser;
use mpi_run::cli::{Args, Demo};
use mpi_run::demos::{matmul, monte_carlo, prime, MatmulArgs, MonteCarloArgs};
use mpi_run::{demos, runtime, ConfigBuilder};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard =
        mpi_run::logging::init_tracing(args.verbose, args.log_file.as_deref(), args.quiet, "mpi-run-demos.log");

    demos::register_entrypoints();

    if args.local {
        run_local(&args).await
    } else {
        run_cluster(args).await
    }
}

async fn run_local(args: &Args) -> Result<()> {
    let comm = mpi_run::Comm::local();
    match args.demo {
        Demo::Prime => {
            let result = prime::is_prime(args.prime_n, &comm).await?;
            info!(n = args.prime_n, is_prime = result, "prime result");
        }
        Demo::MonteCarlo => {
            let result = monte_carlo::monte_carlo(
                args.mc_samples,
                args.mc_seed,
                1024,
                &comm,
                |rng| {
                    use rand::Rng;
                    let x: f64 = rng.gen_range(-1.0..1.0);
                    let y: f64 = rng.gen_range(-1.0..1.0);
                    if x * x + y * y <= 1.0 {
                        4.0
                    } else {
                        0.0
                    }
                },
            )
            .await?;
            info!(?result, "monte carlo result");
        }
        Demo::Matmul => {
            let (a, b) = sample_matrices(args.matmul_size);
            let result = matmul::mat_mul(Some(a), Some(b), &comm).await?;
            let rows = result.as_ref().map(|m| m.rows);
            info!(?rows, "matmul result");
        }
    }
    Ok(())
}

async fn run_cluster(args: Args) -> Result<()> {
    let mut builder = ConfigBuilder::new(
        args.master_node
            .clone()
            .context("--master-node is required unless --local is set")?,
        args.per_node_cores,
    )
    .ssh_port(args.ssh_port)
    .worker_executable(args.worker_executable.clone());

    if !args.hosts.is_empty() {
        builder = builder.hosts(args.hosts.clone());
    }
    if let Some(user) = &args.ssh_user {
        builder = builder.ssh_user(user.clone());
    }
    if let Some(identity) = &args.ssh_identity_file {
        builder = builder.ssh_identity_file(identity.clone());
    }
    let cfg = builder.build()?;

    match args.demo {
        Demo::Prime => {
            let outcome = runtime::run(cfg, "demos", "prime", args.prime_n, move |comm| async move {
                prime::is_prime(args.prime_n, &comm).await
            })
            .await?;
            info!(n = args.prime_n, is_prime = outcome.result, "prime result");
        }
        Demo::MonteCarlo => {
            let mc_args = MonteCarloArgs {
                num_samples: args.mc_samples,
                seed: args.mc_seed,
            };
            let outcome = runtime::run(cfg, "demos", "monte_carlo", mc_args, move |comm| async move {
                monte_carlo::monte_carlo(mc_args.num_samples, mc_args.seed, 1024, &comm, |rng| {
                    use rand::Rng;
                    let x: f64 = rng.gen_range(-1.0..1.0);
                    let y: f64 = rng.gen_range(-1.0..1.0);
                    if x * x + y * y <= 1.0 {
                        4.0
                    } else {
                        0.0
                    }
                })
                .await
            })
            .await?;
            let result = outcome.result;
            info!(?result, "monte carlo result");
        }
        Demo::Matmul => {
            let (a, b) = sample_matrices(args.matmul_size);
            let matmul_args = MatmulArgs { a: a.clone(), b: b.clone() };
            let outcome = runtime::run(cfg, "demos", "matmul", matmul_args, move |comm| async move {
                matmul::mat_mul(Some(a), Some(b), &comm).await
            })
            .await?;
            let rows = outcome.result.as_ref().map(|m| m.rows);
            info!(?rows, "matmul result");
        }
    }
    Ok(())
}

fn sample_matrices(size: usize) -> (matmul::Matrix, matmul::Matrix) {
    let mut a = matmul::Matrix::zeros(size, size);
    let mut b = matmul::Matrix::zeros(size, size);
    for r in 0..size {
        for c in 0..size {
            a.data[r * size + c] = (r + c) as f64;
            b.data[r * size + c] = if r == c { 1.0 } else { 0.0 };
        }
    }
    (a, b)
}
