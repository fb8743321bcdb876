//! The assembled encoder-decoder model.

use anyhow::Result;
use ndarray::{Array2, Array3};

use super::{DecoderLayer, EncoderLayer};
use crate::attention::AttentionMask;
use crate::config::TransformerConfig;
use crate::embeddings::{Embedding, PositionalEncoding};

/// Full encoder-decoder stack. `forward` maps source and target token
/// batches to decoder hidden states; projecting those onto vocabulary
/// logits is the caller's concern.
pub struct Transformer {
    pub src_embeddings: Embedding,
    pub tgt_embeddings: Embedding,
    pub src_pos_encoding: PositionalEncoding,
    pub tgt_pos_encoding: PositionalEncoding,
    pub encoder_layers: Vec<EncoderLayer>,
    pub decoder_layers: Vec<DecoderLayer>,
    config: TransformerConfig,
}

impl Transformer {
    pub fn new(config: TransformerConfig) -> Result<Self> {
        config.validate()?;
        log::debug!(
            "Building transformer: d_model={}, num_heads={}, num_layers={}, d_ff={}",
            config.d_model,
            config.num_heads,
            config.num_layers,
            config.d_ff
        );

        let encoder_layers = (0..config.num_layers)
            .map(|_| EncoderLayer::new(&config))
            .collect::<Result<Vec<_>>>()?;
        let decoder_layers = (0..config.num_layers)
            .map(|_| DecoderLayer::new(&config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            src_embeddings: Embedding::new(config.src_vocab_size, config.d_model),
            tgt_embeddings: Embedding::new(config.tgt_vocab_size, config.d_model),
            src_pos_encoding: PositionalEncoding::new(
                config.d_model,
                config.dropout,
                config.max_len,
            )?,
            tgt_pos_encoding: PositionalEncoding::new(
                config.d_model,
                config.dropout,
                config.max_len,
            )?,
            encoder_layers,
            decoder_layers,
            config,
        })
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    /// Runs the encoder stack: embed, add positional encoding, then each
    /// encoder layer in order. Output shape (batch, src_len, d_model).
    pub fn encode(
        &self,
        src_ids: &Array2<u32>,
        src_mask: Option<&AttentionMask>,
        training: bool,
    ) -> Result<Array3<f32>> {
        let embedded = self.src_embeddings.forward(src_ids)?;
        let mut hidden = self.src_pos_encoding.forward(&embedded, training)?;

        for layer in &self.encoder_layers {
            hidden = layer.forward(&hidden, src_mask, training)?;
        }
        Ok(hidden)
    }

    /// Runs the decoder stack against a precomputed encoder output. Decoder
    /// self-attention is causal; `memory_mask` masks padded source positions
    /// in cross-attention. Output shape (batch, tgt_len, d_model).
    pub fn decode(
        &self,
        tgt_ids: &Array2<u32>,
        encoder_output: &Array3<f32>,
        tgt_mask: Option<&AttentionMask>,
        memory_mask: Option<&AttentionMask>,
        training: bool,
    ) -> Result<Array3<f32>> {
        let embedded = self.tgt_embeddings.forward(tgt_ids)?;
        let mut hidden = self.tgt_pos_encoding.forward(&embedded, training)?;

        for layer in &self.decoder_layers {
            hidden = layer.forward(&hidden, encoder_output, tgt_mask, memory_mask, training)?;
        }
        Ok(hidden)
    }

    /// End-to-end forward pass. The source padding mask gates both encoder
    /// self-attention and decoder cross-attention; the target padding mask
    /// combines with the decoder's internal causal constraint.
    pub fn forward(
        &self,
        src_ids: &Array2<u32>,
        tgt_ids: &Array2<u32>,
        src_padding: Option<&Array2<f32>>,
        tgt_padding: Option<&Array2<f32>>,
        training: bool,
    ) -> Result<Array3<f32>> {
        let src_mask = src_padding.map(|m| AttentionMask::Padding(m.clone()));
        let tgt_mask = tgt_padding.map(|m| AttentionMask::Padding(m.clone()));

        let encoder_output = self.encode(src_ids, src_mask.as_ref(), training)?;
        self.decode(
            tgt_ids,
            &encoder_output,
            tgt_mask.as_ref(),
            src_mask.as_ref(),
            training,
        )
    }
}
