//! Affine projection over the last axis.

use anyhow::{anyhow, Result};
use ndarray::{Array1, Array2, Array3};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

use crate::utils::linear_algebra::{matmul_2d, matmul_3d_2d};

/// A learned affine map `x @ W + b`, weight stored as [in_features, out_features].
#[derive(Debug)]
pub struct Linear {
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
}

impl Linear {
    /// Xavier-uniform initialized projection with a zero bias.
    pub fn new(in_features: usize, out_features: usize) -> Self {
        let bound = (6.0 / (in_features + out_features) as f32).sqrt();
        let weight = Array2::random((in_features, out_features), Uniform::new(-bound, bound));
        let bias = Array1::zeros(out_features);
        Self { weight, bias }
    }

    /// Builds a projection from explicit parameters (e.g. externally trained
    /// weights).
    pub fn from_parts(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self> {
        if bias.len() != weight.ncols() {
            return Err(anyhow!(
                "Bias length {} does not match output dimension {}",
                bias.len(),
                weight.ncols()
            ));
        }
        Ok(Self { weight, bias })
    }

    pub fn in_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn out_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn forward_2d(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.in_features() {
            return Err(anyhow!(
                "Input feature dimension {} does not match projection input dimension {}",
                x.ncols(),
                self.in_features()
            ));
        }
        let out = matmul_2d(&x.view(), &self.weight.view());
        Ok(out + &self.bias)
    }

    pub fn forward_3d(&self, x: &Array3<f32>) -> Result<Array3<f32>> {
        let (_batch, _seq, features) = x.dim();
        if features != self.in_features() {
            return Err(anyhow!(
                "Input feature dimension {} does not match projection input dimension {}",
                features,
                self.in_features()
            ));
        }
        let out = matmul_3d_2d(x, &self.weight);
        Ok(out + &self.bias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array3};

    #[test]
    fn test_identity_projection_with_bias() {
        let linear = Linear::from_parts(Array2::eye(3), arr1(&[1.0, -1.0, 0.5])).unwrap();
        let x = arr2(&[[2.0, 3.0, 4.0]]);
        let out = linear.forward_2d(&x).unwrap();
        assert_eq!(out, arr2(&[[3.0, 2.0, 4.5]]));
    }

    #[test]
    fn test_forward_3d_shape() {
        let linear = Linear::new(8, 16);
        let x = Array3::<f32>::ones((2, 5, 8));
        let out = linear.forward_3d(&x).unwrap();
        assert_eq!(out.shape(), &[2, 5, 16]);
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let linear = Linear::new(8, 16);
        let x = Array3::<f32>::ones((2, 5, 9));
        assert!(linear.forward_3d(&x).is_err());
    }

    #[test]
    fn test_from_parts_bias_mismatch() {
        assert!(Linear::from_parts(Array2::eye(3), arr1(&[0.0, 0.0])).is_err());
    }

    #[test]
    fn test_random_init_within_bound() {
        let linear = Linear::new(64, 64);
        let bound = (6.0 / 128.0_f32).sqrt();
        for &w in linear.weight.iter() {
            assert!(w.abs() <= bound);
        }
        assert!(linear.bias.iter().all(|&b| b == 0.0));
    }
}
