//! Partitioned Monte Carlo estimation with a default sum/sumsq/count
//! reducer and an optional user-supplied reduce/combine/finalize set.
//! Grounded on
//! `original_source/src/mpipy/monte_carlo.py::_monte_carlo_impl`.

use crate::comm::Comm;
use crate::runtime::cancel_requested;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const ROOT: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub mean: f64,
    pub variance: f64,
    pub stderr: f64,
    pub samples: u64,
}

/// User-pluggable accumulation strategy, matching the original's
/// `init_fn`/`reduce_fn`/`combine_fn`/`finalize_fn` keyword arguments.
/// `Acc` must cross the wire for the gather in [`monte_carlo_with_reducer`].
pub trait Reducer<S> {
    type Acc: Serialize + DeserializeOwned;
    type Output;

    fn init(&self) -> Self::Acc;
    fn reduce(&self, acc: Self::Acc, sample: S) -> Self::Acc;
    fn combine(&self, left: Self::Acc, right: Self::Acc) -> Self::Acc;
    fn finalize(&self, acc: Self::Acc, total_samples: u64) -> Self::Output;
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SumAccumulator {
    pub sum: f64,
    pub sumsq: f64,
    pub count: f64,
}

/// The default reducer: accumulates sum, sum-of-squares, and count for a
/// plain scalar sampler, finalized into mean/variance/stderr.
pub struct DefaultReducer;

impl Reducer<f64> for DefaultReducer {
    type Acc = SumAccumulator;
    type Output = MonteCarloResult;

    fn init(&self) -> SumAccumulator {
        SumAccumulator::default()
    }

    fn reduce(&self, mut acc: SumAccumulator, value: f64) -> SumAccumulator {
        acc.sum += value;
        acc.sumsq += value * value;
        acc.count += 1.0;
        acc
    }

    fn combine(&self, mut left: SumAccumulator, right: SumAccumulator) -> SumAccumulator {
        left.sum += right.sum;
        left.sumsq += right.sumsq;
        left.count += right.count;
        left
    }

    fn finalize(&self, acc: SumAccumulator, total_samples: u64) -> MonteCarloResult {
        if total_samples == 0 {
            return MonteCarloResult {
                mean: f64::NAN,
                variance: f64::NAN,
                stderr: f64::NAN,
                samples: 0,
            };
        }
        let n = total_samples as f64;
        let mean = acc.sum / n;
        let variance = (acc.sumsq / n - mean * mean).max(0.0);
        let stderr = (variance / n).sqrt();
        MonteCarloResult {
            mean,
            variance,
            stderr,
            samples: total_samples,
        }
    }
}

fn partition_counts(total: u64, parts: u64) -> Vec<u64> {
    let base = total / parts;
    let remainder = total % parts;
    (0..parts)
        .map(|i| base + if i < remainder { 1 } else { 0 })
        .collect()
}

/// Run `num_samples` trials of `sample_fn` across `comm`'s ranks, driving
/// them through `reducer`'s init/reduce/combine/finalize pipeline. Seeded
/// `seed + rank` per the original (Open Question: exact seeding — resolved
/// to match). Returns `None` on non-root ranks and whenever cancellation
/// is observed on any rank before all partials are gathered.
pub async fn monte_carlo_with_reducer<S, R, F>(
    num_samples: u64,
    seed: Option<u64>,
    cancel_check_every: u64,
    comm: &Comm,
    reducer: R,
    mut sample_fn: F,
) -> Result<Option<R::Output>>
where
    R: Reducer<S>,
    F: FnMut(&mut StdRng) -> S,
{
    let counts = partition_counts(num_samples, comm.size() as u64);
    let local_samples = counts[comm.rank() as usize];
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s.wrapping_add(comm.rank() as u64)),
        None => StdRng::from_entropy(),
    };

    let mut acc = reducer.init();
    let mut cancelled = false;
    for i in 0..local_samples {
        if cancel_check_every != 0 && i % cancel_check_every == 0 && cancel_requested() {
            cancelled = true;
            break;
        }
        let value = sample_fn(&mut rng);
        acc = reducer.reduce(acc, value);
    }

    let partials = comm.gather((cancelled, acc), ROOT).await?;
    let partials = match partials {
        Some(p) => p,
        None => return Ok(None),
    };

    if partials.iter().any(|(flag, _)| *flag) {
        return Ok(None);
    }

    let mut partials = partials.into_iter();
    let (_, mut combined) = partials.next().expect("gather returns at least one partial");
    for (_, partial) in partials {
        combined = reducer.combine(combined, partial);
    }
    Ok(Some(reducer.finalize(combined, num_samples)))
}

/// Convenience wrapper over [`monte_carlo_with_reducer`] using the default
/// sum/sumsq/count reducer, finalized into mean/variance/stderr.
pub async fn monte_carlo<F>(
    num_samples: u64,
    seed: Option<u64>,
    cancel_check_every: u64,
    comm: &Comm,
    sample_fn: F,
) -> Result<Option<MonteCarloResult>>
where
    F: FnMut(&mut StdRng) -> f64,
{
    monte_carlo_with_reducer(num_samples, seed, cancel_check_every, comm, DefaultReducer, sample_fn).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn estimates_pi_within_tolerance_single_process() {
        let comm = Comm::local();
        let result = monte_carlo(20_000, Some(42), 1024, &comm, |rng| {
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
        .unwrap()
        .unwrap();
        assert_eq!(result.samples, 20_000);
        assert!((result.mean - std::f64::consts::PI).abs() < 0.15);
    }

    #[tokio::test]
    async fn same_seed_is_reproducible() {
        let comm = Comm::local();
        let sampler = |rng: &mut StdRng| {
            use rand::Rng;
            rng.gen_range(0.0..1.0)
        };
        let a = monte_carlo(500, Some(7), 1024, &comm, sampler)
            .await
            .unwrap()
            .unwrap();
        let b = monte_carlo(500, Some(7), 1024, &comm, sampler)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.mean, b.mean);
    }

    #[test]
    fn partition_counts_splits_remainder_across_leading_ranks() {
        assert_eq!(partition_counts(10, 3), vec![4, 3, 3]);
        assert_eq!(partition_counts(9, 3), vec![3, 3, 3]);
    }

    struct SumThenMean;

    impl Reducer<f64> for SumThenMean {
        type Acc = f64;
        type Output = f64;

        fn init(&self) -> f64 {
            0.0
        }
        fn reduce(&self, acc: f64, value: f64) -> f64 {
            acc + value
        }
        fn combine(&self, left: f64, right: f64) -> f64 {
            left + right
        }
        fn finalize(&self, acc: f64, total_samples: u64) -> f64 {
            if total_samples == 0 {
                f64::NAN
            } else {
                acc / total_samples as f64
            }
        }
    }

    #[tokio::test]
    async fn custom_reducer_sum_then_mean_matches_expected_range() {
        use rand::Rng;
        let comm = Comm::local();
        let result = monte_carlo_with_reducer(
            10_000,
            Some(5),
            1024,
            &comm,
            SumThenMean,
            |rng| rng.gen_range(0.0..1.0),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(result > 0.48 && result < 0.52);
    }
}
