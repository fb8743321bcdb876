//! Scaled dot-product multi-head attention.
//!
//! One forward path serves self-attention (query = key = value) and
//! cross-attention (query from the decoder, key/value from the encoder
//! output); the causal constraint is a flag applied to the score tensor
//! before softmax.

use anyhow::{anyhow, Result};
use ndarray::{Array2, Array3, Array4};

use crate::activations::softmax_4d_inplace;
use crate::linear_layer::Linear;
use crate::utils::linear_algebra::matmul_4d;
use crate::utils::masks::{
    apply_broadcast_mask, apply_causal_mask, apply_padding_mask, apply_pattern_mask,
};

#[cfg(test)]
mod tests;

/// Attention mask in one of the supported layouts. Zero entries forbid
/// attention; `None` at the call site means "attend everywhere."
pub enum AttentionMask {
    /// Key padding mask shaped (batch, key_len).
    Padding(Array2<f32>),
    /// Position pattern shaped (query_len, key_len), shared across the batch.
    Pattern(Array2<f32>),
    /// Pre-expanded mask broadcastable to (batch, heads, query_len, key_len).
    Broadcast(Array4<f32>),
}

#[derive(Debug)]
pub struct MultiHeadAttention {
    pub q_proj: Linear,
    pub k_proj: Linear,
    pub v_proj: Linear,
    pub out_proj: Linear,
    pub num_heads: usize,
    pub head_dim: usize,
    scale_factor: f32,
}

impl MultiHeadAttention {
    /// Builds randomly initialized projections. The divisibility of
    /// `d_model` by `num_heads` is checked before `head_dim` is derived.
    pub fn new(d_model: usize, num_heads: usize) -> Result<Self> {
        if num_heads == 0 {
            return Err(anyhow!("num_heads must be at least 1"));
        }
        if d_model % num_heads != 0 {
            return Err(anyhow!(
                "d_model {} is not divisible by num_heads {}",
                d_model,
                num_heads
            ));
        }
        let head_dim = d_model / num_heads;

        Ok(Self {
            q_proj: Linear::new(d_model, d_model),
            k_proj: Linear::new(d_model, d_model),
            v_proj: Linear::new(d_model, d_model),
            out_proj: Linear::new(d_model, d_model),
            num_heads,
            head_dim,
            scale_factor: 1.0 / (head_dim as f32).sqrt(),
        })
    }

    /// Builds attention from explicit projections; each must map
    /// `d_model -> d_model`.
    pub fn from_parts(
        q_proj: Linear,
        k_proj: Linear,
        v_proj: Linear,
        out_proj: Linear,
        num_heads: usize,
    ) -> Result<Self> {
        let d_model = q_proj.in_features();
        for (name, proj) in [
            ("query", &q_proj),
            ("key", &k_proj),
            ("value", &v_proj),
            ("output", &out_proj),
        ] {
            if proj.in_features() != d_model || proj.out_features() != d_model {
                return Err(anyhow!(
                    "The {} projection must map {} -> {}, got {} -> {}",
                    name,
                    d_model,
                    d_model,
                    proj.in_features(),
                    proj.out_features()
                ));
            }
        }
        if num_heads == 0 {
            return Err(anyhow!("num_heads must be at least 1"));
        }
        if d_model % num_heads != 0 {
            return Err(anyhow!(
                "d_model {} is not divisible by num_heads {}",
                d_model,
                num_heads
            ));
        }
        let head_dim = d_model / num_heads;

        Ok(Self {
            q_proj,
            k_proj,
            v_proj,
            out_proj,
            num_heads,
            head_dim,
            scale_factor: 1.0 / (head_dim as f32).sqrt(),
        })
    }

    pub fn d_model(&self) -> usize {
        self.num_heads * self.head_dim
    }

    /// (batch, seq, d_model) -> (batch, heads, seq, head_dim)
    fn split_heads(&self, x: Array3<f32>) -> Result<Array4<f32>> {
        let (batch, seq_len, _hidden) = x.dim();
        let split =
            x.into_shape_with_order((batch, seq_len, self.num_heads, self.head_dim))?;
        Ok(split
            .permuted_axes([0, 2, 1, 3])
            .as_standard_layout()
            .to_owned())
    }

    /// (batch, heads, seq, head_dim) -> (batch, seq, d_model)
    fn merge_heads(&self, x: Array4<f32>) -> Result<Array3<f32>> {
        let (batch, _heads, seq_len, _dim) = x.dim();
        let merged = x.permuted_axes([0, 2, 1, 3]);
        let merged = merged.as_standard_layout();
        Ok(merged
            .into_shape_with_order((batch, seq_len, self.d_model()))?
            .to_owned())
    }

    fn validate_inputs(
        &self,
        query: &Array3<f32>,
        key: &Array3<f32>,
        value: &Array3<f32>,
    ) -> Result<()> {
        let d_model = self.d_model();
        let (q_batch, _q_len, q_features) = query.dim();
        let (k_batch, k_len, k_features) = key.dim();
        let (v_batch, v_len, v_features) = value.dim();

        if q_features != d_model || k_features != d_model || v_features != d_model {
            return Err(anyhow!(
                "Attention input feature dimensions (q={}, k={}, v={}) do not match d_model {}",
                q_features,
                k_features,
                v_features,
                d_model
            ));
        }
        if k_batch != q_batch || v_batch != q_batch {
            return Err(anyhow!(
                "Attention input batch sizes disagree (q={}, k={}, v={})",
                q_batch,
                k_batch,
                v_batch
            ));
        }
        if k_len != v_len {
            return Err(anyhow!(
                "Key length {} does not match value length {}",
                k_len,
                v_len
            ));
        }
        Ok(())
    }

    fn attend(
        &self,
        q: Array3<f32>,
        k: Array3<f32>,
        v: Array3<f32>,
        mask: Option<&AttentionMask>,
        causal: bool,
    ) -> Result<(Array3<f32>, Array4<f32>)> {
        let q4 = self.split_heads(q)?;
        let k4 = self.split_heads(k)?;
        let v4 = self.split_heads(v)?;

        let k_t = k4.permuted_axes([0, 1, 3, 2]).as_standard_layout().to_owned();
        let mut scores = matmul_4d(&q4, &k_t);
        scores.mapv_inplace(|s| s * self.scale_factor);

        let mut scores = match mask {
            None => scores,
            Some(AttentionMask::Padding(m)) => apply_padding_mask(scores, m)?,
            Some(AttentionMask::Pattern(m)) => {
                apply_pattern_mask(&mut scores, m)?;
                scores
            }
            Some(AttentionMask::Broadcast(m)) => {
                apply_broadcast_mask(&mut scores, m)?;
                scores
            }
        };
        if causal {
            apply_causal_mask(&mut scores);
        }

        softmax_4d_inplace(&mut scores);

        let context = matmul_4d(&scores, &v4);
        let merged = self.merge_heads(context)?;
        let output = self.out_proj.forward_3d(&merged)?;
        Ok((output, scores))
    }

    /// Full attention: project, split heads, attend, merge, project out.
    /// Output shape matches the query shape (batch, query_len, d_model).
    pub fn forward(
        &self,
        query: &Array3<f32>,
        key: &Array3<f32>,
        value: &Array3<f32>,
        mask: Option<&AttentionMask>,
        causal: bool,
    ) -> Result<Array3<f32>> {
        let (output, _weights) = self.forward_with_weights(query, key, value, mask, causal)?;
        Ok(output)
    }

    /// Like [`forward`](Self::forward), additionally returning the
    /// post-softmax attention probabilities shaped
    /// (batch, heads, query_len, key_len).
    pub fn forward_with_weights(
        &self,
        query: &Array3<f32>,
        key: &Array3<f32>,
        value: &Array3<f32>,
        mask: Option<&AttentionMask>,
        causal: bool,
    ) -> Result<(Array3<f32>, Array4<f32>)> {
        self.validate_inputs(query, key, value)?;

        let q = self.q_proj.forward_3d(query)?;
        let k = self.k_proj.forward_3d(key)?;
        let v = self.v_proj.forward_3d(value)?;

        self.attend(q, k, v, mask, causal)
    }
}
