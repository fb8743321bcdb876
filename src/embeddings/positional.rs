//! Fixed sinusoidal positional encoding.

use anyhow::{anyhow, Result};
use ndarray::{s, Array2, Array3, Axis};

use crate::dropout::Dropout;

/// Precomputed sinusoidal table: even columns carry
/// `sin(pos / 10000^(2i/d_model))`, odd columns the matching cosine.
pub fn create_sinusoidal_table(max_len: usize, d_model: usize) -> Array2<f32> {
    let mut table = Array2::zeros((max_len, d_model));
    for pos in 0..max_len {
        for i in 0..d_model.div_ceil(2) {
            let angle = pos as f32 / 10000_f32.powf(2.0 * i as f32 / d_model as f32);
            table[[pos, 2 * i]] = angle.sin();
            // Odd d_model has a trailing sine column without a cosine partner.
            if 2 * i + 1 < d_model {
                table[[pos, 2 * i + 1]] = angle.cos();
            }
        }
    }
    table
}

/// Adds the positional table to a hidden-state tensor, then applies dropout.
/// The table is computed once at construction and never updated.
pub struct PositionalEncoding {
    table: Array2<f32>,
    dropout: Dropout,
}

impl PositionalEncoding {
    pub fn new(d_model: usize, dropout: f32, max_len: usize) -> Result<Self> {
        if d_model == 0 || max_len == 0 {
            return Err(anyhow!(
                "Positional encoding requires d_model > 0 and max_len > 0, got d_model={}, max_len={}",
                d_model,
                max_len
            ));
        }
        Ok(Self {
            table: create_sinusoidal_table(max_len, d_model),
            dropout: Dropout::new(dropout)?,
        })
    }

    pub fn max_len(&self) -> usize {
        self.table.nrows()
    }

    pub fn d_model(&self) -> usize {
        self.table.ncols()
    }

    pub fn table(&self) -> &Array2<f32> {
        &self.table
    }

    pub fn forward(&self, x: &Array3<f32>, training: bool) -> Result<Array3<f32>> {
        let (_batch, seq_len, features) = x.dim();

        if features != self.d_model() {
            return Err(anyhow!(
                "Input feature dimension {} does not match positional encoding dimension {}",
                features,
                self.d_model()
            ));
        }
        if seq_len > self.max_len() {
            return Err(anyhow!(
                "Sequence length {} exceeds maximum supported length {}",
                seq_len,
                self.max_len()
            ));
        }

        let pe = self.table.slice(s![..seq_len, ..]).insert_axis(Axis(0));
        let mut out = x + &pe;
        self.dropout.forward_inplace(&mut out, training);
        Ok(out)
    }
}
