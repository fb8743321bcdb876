//! Position-wise feed-forward sublayer.

use anyhow::{anyhow, Result};
use ndarray::Array3;

use crate::activations::{apply_activation_2d, Activation};
use crate::dropout::Dropout;
use crate::linear_layer::Linear;

/// Two affine stages `d_model -> d_ff -> d_model` with an activation and
/// dropout between them, applied independently at every token position.
pub struct FeedForward {
    pub fc1: Linear,
    pub fc2: Linear,
    pub activation: Activation,
    dropout: Dropout,
}

impl FeedForward {
    pub fn new(d_model: usize, d_ff: usize, dropout: f32, activation: Activation) -> Result<Self> {
        if d_model == 0 || d_ff == 0 {
            return Err(anyhow!(
                "Feed-forward dimensions must be positive, got d_model={}, d_ff={}",
                d_model,
                d_ff
            ));
        }
        Ok(Self {
            fc1: Linear::new(d_model, d_ff),
            fc2: Linear::new(d_ff, d_model),
            activation,
            dropout: Dropout::new(dropout)?,
        })
    }

    pub fn from_parts(
        fc1: Linear,
        fc2: Linear,
        activation: Activation,
        dropout: f32,
    ) -> Result<Self> {
        if fc1.out_features() != fc2.in_features() || fc2.out_features() != fc1.in_features() {
            return Err(anyhow!(
                "Feed-forward stages do not compose: {} -> {} then {} -> {}",
                fc1.in_features(),
                fc1.out_features(),
                fc2.in_features(),
                fc2.out_features()
            ));
        }
        Ok(Self {
            fc1,
            fc2,
            activation,
            dropout: Dropout::new(dropout)?,
        })
    }

    pub fn d_model(&self) -> usize {
        self.fc1.in_features()
    }

    pub fn d_ff(&self) -> usize {
        self.fc1.out_features()
    }

    pub fn forward(&self, hidden: &Array3<f32>, training: bool) -> Result<Array3<f32>> {
        let (batch, seq_len, features) = hidden.dim();
        if features != self.d_model() {
            return Err(anyhow!(
                "Input feature dimension {} does not match feed-forward d_model {}",
                features,
                self.d_model()
            ));
        }

        let hidden_std = hidden.as_standard_layout();
        let flat = hidden_std
            .view()
            .into_shape_with_order((batch * seq_len, features))?
            .to_owned();

        let mut inner = self.fc1.forward_2d(&flat)?;
        apply_activation_2d(&mut inner, self.activation);
        self.dropout.forward_inplace(&mut inner, training);
        let out = self.fc2.forward_2d(&inner)?;

        Ok(out.into_shape_with_order((batch, seq_len, self.d_model()))?)
    }
}
