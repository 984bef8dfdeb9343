//! PageRank over the cosine similarity graph of window embeddings.
//!
//! The transition matrix is built from the pairwise similarity matrix with
//! its diagonal zeroed, normalized column-wise with a softmax, and mixed with
//! a uniform teleport term. Scores are the power-iteration fixed point,
//! started from the uniform distribution.

use candle_core::{D, DType, Tensor};

use crate::error::{Error, Result};

pub const DEFAULT_DAMPING: f64 = 0.85;
pub const DEFAULT_ITERATIONS: usize = 10;

// `numpy.allclose` defaults.
const RELATIVE_TOLERANCE: f32 = 1e-5;
const ABSOLUTE_TOLERANCE: f32 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankParams {
    /// Probability of following a similarity edge instead of teleporting.
    pub damping: f64,
    /// Upper bound on power-iteration steps.
    pub iterations: usize,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            damping: DEFAULT_DAMPING,
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Score every row of a `[N, D]` unit-normalized embedding matrix.
///
/// Returns one score per row, in row order.
pub fn page_rank(embeddings: &Tensor, params: RankParams) -> Result<Vec<f32>> {
    let embeddings = embeddings.to_dtype(DType::F32)?;
    let similarities = embeddings.matmul(&embeddings.t()?)?;
    let transition = transition_matrix(&similarities, params.damping)?;
    power_iteration(&transition, params.iterations)
}

/// Build the damped, column-stochastic transition matrix from an `[N, N]`
/// similarity matrix. The diagonal of `similarities` is ignored.
pub fn transition_matrix(similarities: &Tensor, damping: f64) -> Result<Tensor> {
    let (rows, cols) = similarities.dims2()?;
    if rows != cols {
        return Err(Error::InvalidInput(format!(
            "similarity matrix must be square, got {rows}x{cols}"
        )));
    }
    if rows == 0 {
        return Err(Error::InvalidInput("nothing to rank".into()));
    }
    if !(0.0..=1.0).contains(&damping) {
        return Err(Error::Config(format!(
            "damping factor must be within [0, 1], got {damping}"
        )));
    }

    let n = rows;
    let device = similarities.device();

    // No self-loops.
    let idx = Tensor::arange(0u32, n as u32, device)?;
    let diagonal = idx
        .unsqueeze(1)?
        .broadcast_as((n, n))?
        .eq(&idx.unsqueeze(0)?.broadcast_as((n, n))?)?;
    let adjacency =
        diagonal.where_cond(&similarities.zeros_like()?, similarities)?;

    // Each column sums to one.
    let stochastic = candle_nn::ops::softmax(&adjacency, 0)?;

    Ok(stochastic.affine(damping, (1.0 - damping) / n as f64)?)
}

/// Repeatedly apply `transition` to the uniform distribution, stopping early
/// once two consecutive score vectors are element-wise close.
pub fn power_iteration(
    transition: &Tensor,
    iterations: usize,
) -> Result<Vec<f32>> {
    let n = transition.dim(0)?;
    if n == 0 {
        return Err(Error::InvalidInput("nothing to rank".into()));
    }

    let mut scores =
        Tensor::full(1.0f32 / n as f32, (n, 1), transition.device())?;
    let mut current: Vec<f32> = column_values(&scores)?;

    for step in 0..iterations {
        let next_scores = transition.matmul(&scores)?;
        let next = column_values(&next_scores)?;

        if all_close(&current, &next) {
            tracing::debug!(step, "power iteration converged");
            return Ok(next);
        }

        scores = next_scores;
        current = next;
    }

    Ok(current)
}

fn column_values(column: &Tensor) -> Result<Vec<f32>> {
    Ok(column.squeeze(D::Minus1)?.to_vec1::<f32>()?)
}

fn all_close(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            (x - y).abs() <= ABSOLUTE_TOLERANCE + RELATIVE_TOLERANCE * y.abs()
        })
}
