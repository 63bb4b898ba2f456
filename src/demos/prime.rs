//! Segmented trial-division primality test, partitioned evenly across
//! ranks. Grounded on `original_source/src/mpipy/prime.py::_is_prime_impl`.

use crate::comm::Comm;
use crate::runtime::cancel_requested;
use anyhow::Result;

const ROOT: u32 = 0;

/// Test whether `n` is prime, splitting the `2..=sqrt(n)` divisor range
/// evenly across `comm`'s ranks and gathering partial results at rank 0.
/// Returns `false` on every non-root rank, matching the original's
/// "only the root sees the answer" shape.
pub async fn is_prime(n: u64, comm: &Comm) -> Result<bool> {
    if n < 2 {
        return Ok(false);
    }
    if n % 2 == 0 {
        return Ok(n == 2);
    }

    let limit = (n as f64).sqrt() as u64;
    if limit < 2 {
        return Ok(true);
    }

    let size = comm.size() as u64;
    let span = limit.saturating_sub(1);
    let chunk = (span + size - 1) / size;
    let start = 2 + comm.rank() as u64 * chunk;
    let end = (limit).min(start.saturating_add(chunk).saturating_sub(1));

    let mut local_is_composite = false;
    if start <= end {
        let mut d = if start % 2 == 0 { start + 1 } else { start };
        let mut checked = 0u64;
        while d <= end {
            if checked % 1024 == 0 && cancel_requested() {
                return Ok(false);
            }
            if n % d == 0 {
                local_is_composite = true;
                break;
            }
            d += 2;
            checked += 1;
        }
    }

    let results = comm.gather(local_is_composite, ROOT).await?;
    match results {
        Some(flags) => Ok(!flags.into_iter().any(|composite| composite)),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn small_primes_and_composites_single_process() {
        let comm = Comm::local();
        assert!(!is_prime(0, &comm).await.unwrap());
        assert!(!is_prime(1, &comm).await.unwrap());
        assert!(is_prime(2, &comm).await.unwrap());
        assert!(is_prime(3, &comm).await.unwrap());
        assert!(!is_prime(4, &comm).await.unwrap());
        assert!(is_prime(97, &comm).await.unwrap());
        assert!(!is_prime(100, &comm).await.unwrap());
    }

    #[tokio::test]
    async fn large_prime_single_process() {
        let comm = Comm::local();
        assert!(is_prime(104_729, &comm).await.unwrap());
    }
}
