//! Layer normalization over the feature axis.

use ndarray::{Array1, Array3, ArrayView3, Axis};

/// Layer normalization with learned scale and shift.
pub struct LayerNorm {
    pub weight: Array1<f32>,
    pub bias: Array1<f32>,
    pub eps: f32,
}

impl LayerNorm {
    /// Identity-initialized normalization (unit scale, zero shift).
    pub fn new(d_model: usize, eps: f32) -> Self {
        Self {
            weight: Array1::ones(d_model),
            bias: Array1::zeros(d_model),
            eps,
        }
    }

    pub fn from_parts(weight: Array1<f32>, bias: Array1<f32>, eps: f32) -> Self {
        Self { weight, bias, eps }
    }

    /// Normalizes each (batch, position) vector over the feature axis.
    #[inline]
    pub fn forward(&self, hidden_states: &ArrayView3<f32>) -> Array3<f32> {
        let mean = hidden_states.mean_axis(Axis(2)).expect("feature axis is non-empty");
        let variance = hidden_states.var_axis(Axis(2), 0.0);

        let mean_expanded = mean.insert_axis(Axis(2));
        let var_expanded = variance.insert_axis(Axis(2));

        let inv_std = (&var_expanded + self.eps).mapv(|x| 1.0 / x.sqrt());
        let normalized = (hidden_states.to_owned() - &mean_expanded) * &inv_std;

        normalized * &self.weight + &self.bias
    }

    pub fn forward_3d(&self, hidden: &Array3<f32>) -> Array3<f32> {
        self.forward(&hidden.view())
    }
}
