//! A single encoder layer: self-attention and feed-forward with post-norm
//! residuals.

use anyhow::Result;
use ndarray::Array3;

use crate::attention::{AttentionMask, MultiHeadAttention};
use crate::config::TransformerConfig;
use crate::dropout::Dropout;
use crate::feedforward::FeedForward;
use crate::normalization::LayerNorm;

pub struct EncoderLayer {
    pub self_attn: MultiHeadAttention,
    pub self_attn_layer_norm: LayerNorm,
    pub feedforward: FeedForward,
    pub ffn_layer_norm: LayerNorm,
    dropout: Dropout,
}

impl EncoderLayer {
    pub fn new(config: &TransformerConfig) -> Result<Self> {
        Ok(Self {
            self_attn: MultiHeadAttention::new(config.d_model, config.num_heads)?,
            self_attn_layer_norm: LayerNorm::new(config.d_model, config.layer_norm_eps),
            feedforward: FeedForward::new(
                config.d_model,
                config.d_ff,
                config.dropout,
                config.activation,
            )?,
            ffn_layer_norm: LayerNorm::new(config.d_model, config.layer_norm_eps),
            dropout: Dropout::new(config.dropout)?,
        })
    }

    /// Post-norm composition: each sublayer output is dropped out, added to
    /// its residual, then normalized.
    pub fn forward(
        &self,
        hidden: &Array3<f32>,
        mask: Option<&AttentionMask>,
        training: bool,
    ) -> Result<Array3<f32>> {
        let residual = hidden.clone();
        let mut attn_out = self.self_attn.forward(hidden, hidden, hidden, mask, false)?;
        self.dropout.forward_inplace(&mut attn_out, training);
        let hidden = self.self_attn_layer_norm.forward_3d(&(residual + attn_out));

        let residual = hidden.clone();
        let mut ffn_out = self.feedforward.forward(&hidden, training)?;
        self.dropout.forward_inplace(&mut ffn_out, training);
        Ok(self.ffn_layer_norm.forward_3d(&(residual + ffn_out)))
    }
}
