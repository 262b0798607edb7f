//! L2 normalization of embedding rows.
//!
//! After normalization the inner product of two rows equals their cosine
//! similarity. Zero (or non-finite) rows cannot be normalized and are
//! rejected with [`IndexError::DegenerateVector`] instead of producing NaN.

use rayon::prelude::*;

use crate::semantic::IndexError;

/// Rows shorter than this (in L2 norm) are considered zero vectors.
const MIN_NORM: f64 = f32::EPSILON as f64;

/// Batches below this many rows are normalized on the calling thread.
const PARALLEL_THRESHOLD: usize = 256;

/// Rescale every row of `batch` to unit L2 norm, keeping its shape.
pub fn normalize(mut batch: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>, IndexError> {
    if batch.len() < PARALLEL_THRESHOLD {
        batch.iter_mut().enumerate().try_for_each(normalize_row)?;
    } else {
        batch.par_iter_mut().enumerate().try_for_each(normalize_row)?;
    }

    Ok(batch)
}

/// Normalize a single vector with the same policy as [`normalize`].
pub fn normalize_one(vector: &[f32]) -> Result<Vec<f32>, IndexError> {
    let mut v = vector.to_vec();
    normalize_row((0, &mut v))?;
    Ok(v)
}

/// L2 norm accumulated in f64.
pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt()
}

fn normalize_row((row, v): (usize, &mut Vec<f32>)) -> Result<(), IndexError> {
    let norm = l2_norm(v);
    if !norm.is_finite() || norm < MIN_NORM {
        return Err(IndexError::DegenerateVector { row });
    }

    for x in v.iter_mut() {
        *x = (*x as f64 / norm) as f32;
    }

    Ok(())
}
