//! 2D block-distributed matrix multiply. Grounded on
//! `original_source/src/mpipy/matmul.py` (`_grid_dims`, `_partition_ranges`,
//! `_matmul_distributed`). Matrices are plain row-major `Vec<f64>` rather
//! than an `ndarray`/numpy array, since nothing else in this crate's
//! dependency stack needs an n-dimensional array type.

use crate::comm::Comm;
use crate::runtime::cancel_requested;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

const TAG_A_BASE: u32 = 1000;
const TAG_B_BASE: u32 = 2000;
const TAG_A_STEP_BASE: u32 = 3000;
const TAG_B_STEP_BASE: u32 = 4000;
const ROOT: u32 = 0;

/// A dense row-major matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        if rows.is_empty() {
            bail!("matrix must have at least one row");
        }
        let cols = rows[0].len();
        if rows.iter().any(|r| r.len() != cols) {
            bail!("matrix rows must all have the same length");
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    fn set(&mut self, r: usize, c: usize, value: f64) {
        self.data[r * self.cols + c] = value;
    }

    /// Extract the sub-block `[row_start, row_end) x [col_start, col_end)`.
    fn block(&self, row_start: usize, row_end: usize, col_start: usize, col_end: usize) -> Matrix {
        let mut out = Matrix::zeros(row_end - row_start, col_end - col_start);
        for r in row_start..row_end {
            for c in col_start..col_end {
                out.set(r - row_start, c - col_start, self.get(r, c));
            }
        }
        out
    }

    fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Plain dense multiply, used for the single-process fallback and for
    /// each rank's local panel-product accumulation.
    fn mul(&self, other: &Matrix) -> Matrix {
        assert_eq!(self.cols, other.rows);
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a_ik = self.get(i, k);
                if a_ik == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    let prev = out.get(i, j);
                    out.set(i, j, prev + a_ik * other.get(k, j));
                }
            }
        }
        out
    }

    fn add_assign_block(&mut self, row_start: usize, col_start: usize, block: &Matrix) {
        for r in 0..block.rows {
            for c in 0..block.cols {
                self.set(row_start + r, col_start + c, block.get(r, c));
            }
        }
    }
}

fn partition_ranges(n: usize, parts: usize) -> Vec<(usize, usize)> {
    let base = n / parts;
    let remainder = n % parts;
    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let size = base + if i < remainder { 1 } else { 0 };
        ranges.push((start, start + size));
        start += size;
    }
    ranges
}

/// Factor `size` into a process grid `(pr, pc)` as close to square as
/// possible, preferring more rows.
fn grid_dims(size: usize) -> (usize, usize) {
    let root = (size as f64).sqrt() as usize;
    for pr in (1..=root.max(1)).rev() {
        if size % pr == 0 {
            return (pr, size / pr);
        }
    }
    (1, size)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Meta {
    m: usize,
    k: usize,
    n: usize,
}

/// Multiply `a` (m x k) by `b` (k x n) across `comm`'s ranks, returning
/// the full product on rank 0 and `None` elsewhere (and everywhere, if
/// cancellation is observed mid-computation).
pub async fn mat_mul(a: Option<Matrix>, b: Option<Matrix>, comm: &Comm) -> Result<Option<Matrix>> {
    if comm.size() == 1 {
        let (a, b) = match (a, b) {
            (Some(a), Some(b)) => (a, b),
            _ => bail!("root rank requires input matrices"),
        };
        if a.cols != b.rows {
            bail!("incompatible matrix dimensions");
        }
        return Ok(Some(a.mul(&b)));
    }

    let (pr, pc) = grid_dims(comm.size() as usize);

    let meta = if comm.rank() == ROOT {
        let a = a.as_ref().ok_or_else(|| anyhow::anyhow!("root rank requires input matrices"))?;
        let b = b.as_ref().ok_or_else(|| anyhow::anyhow!("root rank requires input matrices"))?;
        if a.cols != b.rows {
            bail!("incompatible matrix dimensions");
        }
        Some(Meta {
            m: a.rows,
            k: a.cols,
            n: b.cols,
        })
    } else {
        None
    };
    let Meta { m, k, n } = comm.bcast(meta, ROOT).await?.expect("root always provides meta");

    let row_ranges = partition_ranges(m, pr);
    let k_ranges = partition_ranges(k, pc);
    let col_ranges = partition_ranges(n, pc);

    let r = comm.rank() as usize / pc;
    let c = comm.rank() as usize % pc;
    let (row_start, row_end) = row_ranges[r];
    let (col_start, col_end) = col_ranges[c];

    let mut local_c = Matrix::zeros(row_end - row_start, col_end - col_start);

    let mut local_a: Option<Matrix> = None;
    let mut local_b_blocks: std::collections::HashMap<usize, Matrix> = std::collections::HashMap::new();

    if comm.rank() == ROOT {
        let a = a.expect("checked above");
        let b = b.expect("checked above");
        for rr in 0..pr {
            let (rs, re) = row_ranges[rr];
            for cc in 0..pc {
                let (ks, ke) = k_ranges[cc];
                let a_block = a.block(rs, re, ks, ke);
                let dest = (rr * pc + cc) as u32;
                if dest == 0 {
                    local_a = Some(a_block);
                } else {
                    comm.send(&a_block, dest, TAG_A_BASE + dest).await?;
                }
            }
        }
        for q in 0..pc {
            let (ks, ke) = k_ranges[q];
            let owner_row = q % pr;
            for cc in 0..pc {
                let (cs, ce) = col_ranges[cc];
                let b_block = b.block(ks, ke, cs, ce);
                let dest = (owner_row * pc + cc) as u32;
                if dest == 0 {
                    local_b_blocks.insert(q, b_block);
                } else {
                    comm.send(&b_block, dest, TAG_B_BASE + q as u32).await?;
                }
            }
        }
    } else {
        let a_block: Matrix = comm.recv(Some(ROOT), Some(TAG_A_BASE + comm.rank()), None).await?;
        local_a = Some(a_block);
        for q in 0..pc {
            let owner_row = q % pr;
            if r == owner_row {
                let b_block: Matrix = comm.recv(Some(ROOT), Some(TAG_B_BASE + q as u32), None).await?;
                local_b_blocks.insert(q, b_block);
            }
        }
    }
    let local_a = local_a.expect("every rank receives or keeps its A block");

    for q in 0..pc {
        if cancel_requested() {
            return Ok(None);
        }

        let a_panel = if c == q {
            for dest_c in 0..pc {
                if dest_c == c {
                    continue;
                }
                let dest_rank = (r * pc + dest_c) as u32;
                comm.send(&local_a, dest_rank, TAG_A_STEP_BASE + q as u32).await?;
            }
            local_a.clone()
        } else {
            let owner_rank = (r * pc + q) as u32;
            comm.recv(Some(owner_rank), Some(TAG_A_STEP_BASE + q as u32), None).await?
        };

        let owner_row = q % pr;
        let b_panel = if r == owner_row {
            let b_panel = local_b_blocks.get(&q).expect("owner row holds this B block").clone();
            for dest_r in 0..pr {
                if dest_r == r {
                    continue;
                }
                let dest_rank = (dest_r * pc + c) as u32;
                comm.send(&b_panel, dest_rank, TAG_B_STEP_BASE + q as u32).await?;
            }
            b_panel
        } else {
            let owner_rank = (owner_row * pc + c) as u32;
            comm.recv(Some(owner_rank), Some(TAG_B_STEP_BASE + q as u32), None).await?
        };

        if !a_panel.is_empty() && !b_panel.is_empty() {
            let product = a_panel.mul(&b_panel);
            for rr in 0..product.rows {
                for cc in 0..product.cols {
                    let prev = local_c.get(rr, cc);
                    local_c.set(rr, cc, prev + product.get(rr, cc));
                }
            }
        }
    }

    let gathered = comm.gather(local_c, ROOT).await?;
    let gathered = match gathered {
        Some(blocks) => blocks,
        None => return Ok(None),
    };

    let mut result = Matrix::zeros(m, n);
    for (rank, block) in gathered.into_iter().enumerate() {
        let rr = rank / pc;
        let cc = rank % pc;
        let (rs, re) = row_ranges[rr];
        let (cs, ce) = col_ranges[cc];
        if rs == re || cs == ce {
            continue;
        }
        result.add_assign_block(rs, cs, &block);
    }
    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_process_matches_plain_multiply() {
        let comm = Comm::local();
        let a = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let b = Matrix::from_rows(vec![vec![5.0, 6.0], vec![7.0, 8.0]]).unwrap();
        let result = mat_mul(Some(a), Some(b), &comm).await.unwrap().unwrap();
        assert_eq!(result.data, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn grid_dims_prefers_square_grids() {
        assert_eq!(grid_dims(4), (2, 2));
        assert_eq!(grid_dims(6), (2, 3));
        assert_eq!(grid_dims(1), (1, 1));
        assert_eq!(grid_dims(7), (1, 7));
    }

    #[test]
    fn partition_ranges_spreads_remainder_across_leading_parts() {
        assert_eq!(partition_ranges(7, 3), vec![(0, 3), (3, 5), (5, 7)]);
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 2);
        assert_ne!(a.cols, b.rows);
    }
}
