//! Activation functions and softmax.

use anyhow::anyhow;
use ndarray::{Array2, Array4, ArrayViewMut1, Zip};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Below this element count the rayon dispatch overhead outweighs the work.
pub const PARALLEL_THRESHOLD: usize = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Gelu,
}

impl FromStr for Activation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relu" => Ok(Activation::Relu),
            "gelu" => Ok(Activation::Gelu),
            other => Err(anyhow!("Unknown activation: {}", other)),
        }
    }
}

#[inline]
pub fn relu_scalar(x: f32) -> f32 {
    x.max(0.0)
}

/// Exact GELU using the error function.
#[inline]
pub fn gelu_scalar(x: f32) -> f32 {
    0.5 * x * (1.0 + libm::erff(x / std::f32::consts::SQRT_2))
}

/// Applies the activation elementwise, in parallel for large tensors.
pub fn apply_activation_2d(x: &mut Array2<f32>, activation: Activation) {
    let f: fn(f32) -> f32 = match activation {
        Activation::Relu => relu_scalar,
        Activation::Gelu => gelu_scalar,
    };

    if x.len() >= PARALLEL_THRESHOLD {
        x.par_mapv_inplace(f);
    } else {
        x.mapv_inplace(f);
    }
}

#[inline]
fn softmax_row(row: &mut ArrayViewMut1<f32>) {
    // Max subtraction keeps exp() in range; a fully masked row normalizes
    // to a uniform distribution instead of NaN.
    let max = row.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
    let mut sum = 0.0;
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
}

/// Softmax over the last axis of a (batch, heads, query, key) score tensor,
/// parallel over the batch axis.
pub fn softmax_4d_inplace(scores: &mut Array4<f32>) {
    Zip::from(scores.outer_iter_mut()).par_for_each(|mut batch| {
        for mut row in batch.rows_mut() {
            softmax_row(&mut row);
        }
    });
}
