//! A single decoder layer: causal self-attention, cross-attention over the
//! encoder output, and feed-forward, each with post-norm residuals.

use std::time::Instant;

use anyhow::Result;
use ndarray::Array3;

use crate::attention::{AttentionMask, MultiHeadAttention};
use crate::config::TransformerConfig;
use crate::dropout::Dropout;
use crate::feedforward::FeedForward;
use crate::normalization::LayerNorm;

pub struct DecoderLayer {
    pub self_attn: MultiHeadAttention,
    pub self_attn_layer_norm: LayerNorm,
    pub cross_attn: MultiHeadAttention,
    pub cross_attn_layer_norm: LayerNorm,
    pub feedforward: FeedForward,
    pub ffn_layer_norm: LayerNorm,
    dropout: Dropout,
}

impl DecoderLayer {
    pub fn new(config: &TransformerConfig) -> Result<Self> {
        Ok(Self {
            self_attn: MultiHeadAttention::new(config.d_model, config.num_heads)?,
            self_attn_layer_norm: LayerNorm::new(config.d_model, config.layer_norm_eps),
            cross_attn: MultiHeadAttention::new(config.d_model, config.num_heads)?,
            cross_attn_layer_norm: LayerNorm::new(config.d_model, config.layer_norm_eps),
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

    /// Self-attention is always causal: a position never attends past
    /// itself. `self_mask` adds target padding on top of that; `cross_mask`
    /// masks padded source positions in the encoder output.
    pub fn forward(
        &self,
        hidden: &Array3<f32>,
        encoder_output: &Array3<f32>,
        self_mask: Option<&AttentionMask>,
        cross_mask: Option<&AttentionMask>,
        training: bool,
    ) -> Result<Array3<f32>> {
        let start = Instant::now();

        let residual = hidden.clone();
        let mut attn_out = self
            .self_attn
            .forward(hidden, hidden, hidden, self_mask, true)?;
        self.dropout.forward_inplace(&mut attn_out, training);
        let hidden = self.self_attn_layer_norm.forward_3d(&(residual + attn_out));

        let residual = hidden.clone();
        let mut cross_out =
            self.cross_attn
                .forward(&hidden, encoder_output, encoder_output, cross_mask, false)?;
        self.dropout.forward_inplace(&mut cross_out, training);
        let hidden = self
            .cross_attn_layer_norm
            .forward_3d(&(residual + cross_out));

        let residual = hidden.clone();
        let mut ffn_out = self.feedforward.forward(&hidden, training)?;
        self.dropout.forward_inplace(&mut ffn_out, training);
        let output = self.ffn_layer_norm.forward_3d(&(residual + ffn_out));

        log::trace!("Decoder layer forward took {:?}", start.elapsed());
        Ok(output)
    }
}
