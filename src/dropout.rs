//! Inverted dropout with an explicit training flag.

use anyhow::{anyhow, Result};
use ndarray::{Array, Dimension};
use rand::Rng;

/// Zeroes each element with probability `prob` during training and scales
/// survivors by `1 / (1 - prob)` so the expected activation is unchanged.
/// Identity in inference mode.
pub struct Dropout {
    prob: f32,
}

impl Dropout {
    pub fn new(prob: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&prob) {
            return Err(anyhow!(
                "Dropout probability must be in [0, 1), got {}",
                prob
            ));
        }
        Ok(Self { prob })
    }

    pub fn prob(&self) -> f32 {
        self.prob
    }

    pub fn forward_inplace<D: Dimension>(&self, x: &mut Array<f32, D>, training: bool) {
        if !training || self.prob == 0.0 {
            return;
        }
        let scale = 1.0 / (1.0 - self.prob);
        let mut rng = rand::thread_rng();
        x.mapv_inplace(|v| {
            if rng.gen::<f32>() < self.prob {
                0.0
            } else {
                v * scale
            }
        });
    }
}
