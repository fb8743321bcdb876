//! Token embedding lookup.

pub mod positional;

pub use positional::PositionalEncoding;

use anyhow::{anyhow, Result};
use ndarray::{Array2, Array3, Zip};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

/// A learned token-id to vector table, shaped (vocab_size, d_model).
pub struct Embedding {
    pub weight: Array2<f32>,
}

impl Embedding {
    pub fn new(vocab_size: usize, d_model: usize) -> Self {
        let scale = (1.0 / d_model as f32).sqrt();
        let weight = Array2::random((vocab_size, d_model), Uniform::new(-scale, scale));
        Self { weight }
    }

    pub fn from_parts(weight: Array2<f32>) -> Self {
        Self { weight }
    }

    pub fn vocab_size(&self) -> usize {
        self.weight.nrows()
    }

    pub fn d_model(&self) -> usize {
        self.weight.ncols()
    }

    /// Looks up each token id, parallel over the batch axis. Ids outside the
    /// vocabulary are an error.
    pub fn forward(&self, token_ids: &Array2<u32>) -> Result<Array3<f32>> {
        let vocab_size = self.vocab_size();
        if let Some(&bad) = token_ids.iter().find(|&&id| id as usize >= vocab_size) {
            return Err(anyhow!(
                "Token id {} is out of range for vocabulary size {}",
                bad,
                vocab_size
            ));
        }

        let (batch, seq_len) = token_ids.dim();
        let mut output = Array3::zeros((batch, seq_len, self.d_model()));

        Zip::from(output.outer_iter_mut())
            .and(token_ids.outer_iter())
            .par_for_each(|mut embedded, ids| {
                for (mut dst, &id) in embedded.outer_iter_mut().zip(ids.iter()) {
                    dst.assign(&self.weight.row(id as usize));
                }
            });

        Ok(output)
    }
}
