//! Encoder/decoder layer composition and the full model assembly.

pub mod decoder_layer;
pub mod encoder_layer;
pub mod transformer;

pub use decoder_layer::DecoderLayer;
pub use encoder_layer::EncoderLayer;
pub use transformer::Transformer;
