//! Supplemented example workloads built on top of [`crate::comm::Comm`],
//! grounded on `original_source/src/mpipy/{matmul,monte_carlo,prime}.py`.
//! Not part of the audited core (transport/comm/runtime); these exist as
//! demonstration and correctness-test workloads, exercised through
//! [`crate::comm::Comm::local`] in tests and over a real cluster via the
//! `mpi-run-demos` binary.

pub mod matmul;
pub mod monte_carlo;
pub mod prime;

use crate::registry;
use crate::runtime;
use serde::{Deserialize, Serialize};

/// Arguments shipped to every rank for the `matmul` demo; only rank 0
/// actually multiplies, but the encoded blob is identical for every
/// worker (matching the original's single shared `MPI_RUN_ARGS`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatmulArgs {
    pub a: matmul::Matrix,
    pub b: matmul::Matrix,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonteCarloArgs {
    pub num_samples: u64,
    pub seed: Option<u64>,
}

/// Register the three demo workloads under the `demos` namespace so both
/// `mpi-worker` and `mpi-run-demos` resolve the same entrypoint names.
pub fn register_entrypoints() {
    registry::register::<u64, bool, _, _>("demos", "prime", |n: u64| async move {
        let comm = runtime::current_comm().expect("comm installed before dispatch");
        prime::is_prime(n, &comm).await
    });

    registry::register::<MatmulArgs, Option<matmul::Matrix>, _, _>(
        "demos",
        "matmul",
        |args: MatmulArgs| async move {
            let comm = runtime::current_comm().expect("comm installed before dispatch");
            let (a, b) = if comm.rank() == 0 {
                (Some(args.a), Some(args.b))
            } else {
                (None, None)
            };
            matmul::mat_mul(a, b, &comm).await
        },
    );

    registry::register::<MonteCarloArgs, Option<monte_carlo::MonteCarloResult>, _, _>(
        "demos",
        "monte_carlo",
        |args: MonteCarloArgs| async move {
            let comm = runtime::current_comm().expect("comm installed before dispatch");
            monte_carlo::monte_carlo(args.num_samples, args.seed, 1024, &comm, pi_sampler).await
        },
    );
}

fn pi_sampler(rng: &mut rand::rngs::StdRng) -> f64 {
    use rand::Rng;
    let x: f64 = rng.gen_range(-1.0..1.0);
    let y: f64 = rng.gen_range(-1.0..1.0);
    if x * x + y * y <= 1.0 {
        4.0
    } else {
        0.0
    }
}

