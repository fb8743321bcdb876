//! Model configuration.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::activations::Activation;

fn default_d_model() -> usize {
    512
}
fn default_num_heads() -> usize {
    8
}
fn default_num_layers() -> usize {
    6
}
fn default_d_ff() -> usize {
    2048
}
fn default_dropout() -> f32 {
    0.1
}
fn default_max_len() -> usize {
    5000
}
fn default_layer_norm_eps() -> f32 {
    1e-5
}

/// Construction-time configuration for [`Transformer`](crate::Transformer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerConfig {
    pub src_vocab_size: usize,
    pub tgt_vocab_size: usize,
    #[serde(default = "default_d_model")]
    pub d_model: usize,
    #[serde(default = "default_num_heads")]
    pub num_heads: usize,
    #[serde(default = "default_num_layers")]
    pub num_layers: usize,
    #[serde(default = "default_d_ff")]
    pub d_ff: usize,
    #[serde(default = "default_dropout")]
    pub dropout: f32,
    #[serde(default = "default_max_len")]
    pub max_len: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f32,
    #[serde(default)]
    pub activation: Activation,
}

impl TransformerConfig {
    /// Standard base configuration: d_model 512, 8 heads, 6 layers, d_ff
    /// 2048, dropout 0.1.
    pub fn new(src_vocab_size: usize, tgt_vocab_size: usize) -> Self {
        Self {
            src_vocab_size,
            tgt_vocab_size,
            d_model: default_d_model(),
            num_heads: default_num_heads(),
            num_layers: default_num_layers(),
            d_ff: default_d_ff(),
            dropout: default_dropout(),
            max_len: default_max_len(),
            layer_norm_eps: default_layer_norm_eps(),
            activation: Activation::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.src_vocab_size == 0 || self.tgt_vocab_size == 0 {
            return Err(anyhow!(
                "Vocabulary sizes must be positive, got src={}, tgt={}",
                self.src_vocab_size,
                self.tgt_vocab_size
            ));
        }
        if self.d_model == 0 {
            return Err(anyhow!("d_model must be positive"));
        }
        if self.num_heads == 0 {
            return Err(anyhow!("num_heads must be at least 1"));
        }
        if self.d_model % self.num_heads != 0 {
            return Err(anyhow!(
                "d_model {} is not divisible by num_heads {}",
                self.d_model,
                self.num_heads
            ));
        }
        if self.num_layers == 0 {
            return Err(anyhow!("num_layers must be at least 1"));
        }
        if self.d_ff == 0 {
            return Err(anyhow!("d_ff must be positive"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(anyhow!(
                "Dropout probability must be in [0, 1), got {}",
                self.dropout
            ));
        }
        if self.max_len == 0 {
            return Err(anyhow!("max_len must be positive"));
        }
        Ok(())
    }
}
