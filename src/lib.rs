//! Core building blocks for Transformer encoder-decoder models
//!
//! This crate provides the forward computation of the original Transformer
//! architecture — sinusoidal positional encoding, scaled dot-product
//! multi-head attention, position-wise feed-forward sublayers, and post-norm
//! residual composition — assembled into a full encoder-decoder model on
//! ndarray. Training machinery (losses, gradients, optimizers) and the final
//! vocabulary projection live outside this crate.

pub mod activations;
pub mod attention;
pub mod config;
pub mod dropout;
pub mod embeddings;
pub mod encoder_decoder;
pub mod feedforward;
pub mod linear_layer;
pub mod normalization;
pub mod utils;

// Re-export commonly used items
pub use crate::{
    activations::Activation,
    attention::{AttentionMask, MultiHeadAttention},
    config::TransformerConfig,
    dropout::Dropout,
    embeddings::{Embedding, PositionalEncoding},
    encoder_decoder::{DecoderLayer, EncoderLayer, Transformer},
    feedforward::FeedForward,
    linear_layer::Linear,
    normalization::LayerNorm,
};

// Prelude for easy imports
pub mod prelude {
    pub use crate::attention::{AttentionMask, MultiHeadAttention};
    pub use crate::config::TransformerConfig;
    pub use crate::encoder_decoder::Transformer;
    pub use crate::utils::masks::{create_causal_mask, create_padding_mask};
}
