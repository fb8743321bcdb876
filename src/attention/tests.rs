use crate::attention::{AttentionMask, MultiHeadAttention};
use crate::linear_layer::Linear;
use anyhow::Result;
use ndarray::{arr2, Array1, Array2, Array3};

fn identity_attention(hidden: usize, heads: usize) -> MultiHeadAttention {
    let identity = || {
        Linear::from_parts(Array2::eye(hidden), Array1::zeros(hidden))
            .expect("identity projection is square")
    };
    MultiHeadAttention::from_parts(identity(), identity(), identity(), identity(), heads)
        .expect("identity attention construction")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_construction_rejects_indivisible_heads() {
        let err = MultiHeadAttention::new(10, 3).unwrap_err();
        assert!(err.to_string().contains("not divisible"));
    }

    #[test]
    fn test_construction_rejects_zero_heads() {
        assert!(MultiHeadAttention::new(8, 0).is_err());
    }

    #[test]
    fn test_output_preserves_query_shape() -> Result<()> {
        let attn = MultiHeadAttention::new(64, 4)?;
        let input = Array3::from_shape_fn((2, 10, 64), |(b, s, d)| {
            ((b * 640 + s * 64 + d) as f32).sin()
        });

        let output = attn.forward(&input, &input, &input, None, false)?;
        assert_eq!(output.shape(), &[2, 10, 64]);
        Ok(())
    }

    #[test]
    fn test_probabilities_sum_to_one() -> Result<()> {
        let attn = MultiHeadAttention::new(16, 4)?;
        let input = Array3::from_shape_fn((2, 6, 16), |(b, s, d)| {
            ((b + s * 3 + d) as f32 * 0.37).cos()
        });

        let (_output, weights) = attn.forward_with_weights(&input, &input, &input, None, false)?;
        assert_eq!(weights.shape(), &[2, 4, 6, 6]);
        for row in weights.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-4);
        }
        Ok(())
    }

    #[test]
    fn test_probabilities_sum_to_one_with_mask() -> Result<()> {
        let attn = MultiHeadAttention::new(16, 4)?;
        let input = Array3::from_shape_fn((1, 4, 16), |(_, s, d)| ((s * 16 + d) as f32).sin());
        let mask = AttentionMask::Padding(arr2(&[[1.0, 1.0, 0.0, 0.0]]));

        let (_output, weights) =
            attn.forward_with_weights(&input, &input, &input, Some(&mask), false)?;
        for row in weights.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-4);
        }
        Ok(())
    }

    #[test]
    fn test_masked_keys_get_zero_probability() -> Result<()> {
        let attn = identity_attention(8, 2);
        // Large values so unmasked scores are far from zero.
        let input = Array3::from_shape_fn((1, 4, 8), |(_, s, d)| ((s + d) as f32) * 3.0);
        let mask = AttentionMask::Padding(arr2(&[[1.0, 1.0, 0.0, 0.0]]));

        let (_output, weights) =
            attn.forward_with_weights(&input, &input, &input, Some(&mask), false)?;

        for h in 0..2 {
            for q in 0..4 {
                assert!(weights[[0, h, q, 2]] < 1e-6);
                assert!(weights[[0, h, q, 3]] < 1e-6);
            }
        }
        Ok(())
    }

    #[test]
    fn test_causal_blocks_future_positions() -> Result<()> {
        let attn = MultiHeadAttention::new(16, 4)?;
        let input = Array3::from_shape_fn((2, 5, 16), |(b, s, d)| {
            ((b * 80 + s * 16 + d) as f32 * 0.13).sin()
        });

        let (_output, weights) =
            attn.forward_with_weights(&input, &input, &input, None, true)?;

        for b in 0..2 {
            for h in 0..4 {
                for q in 0..5 {
                    for k in (q + 1)..5 {
                        assert!(
                            weights[[b, h, q, k]] < 1e-6,
                            "Future key {} visible from query {}",
                            k,
                            q
                        );
                    }
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_pattern_mask_equivalent_to_causal_flag() -> Result<()> {
        let attn = identity_attention(8, 2);
        let input = Array3::from_shape_fn((1, 4, 8), |(_, s, d)| ((s * 8 + d) as f32 * 0.1).cos());

        let pattern = crate::utils::masks::create_causal_mask(4, 4);
        let (_out_a, w_flag) = attn.forward_with_weights(&input, &input, &input, None, true)?;
        let (_out_b, w_mask) = attn.forward_with_weights(
            &input,
            &input,
            &input,
            Some(&AttentionMask::Pattern(pattern)),
            false,
        )?;

        for (a, b) in w_flag.iter().zip(w_mask.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_broadcast_mask_through_forward() -> Result<()> {
        // A (batch, 1, 1, key_len) rank-4 mask must behave exactly like the
        // equivalent 2D key padding mask.
        let attn = identity_attention(8, 2);
        let input = Array3::from_shape_fn((2, 4, 8), |(b, s, d)| {
            ((b * 32 + s * 8 + d) as f32 * 0.15).sin()
        });

        let padding = arr2(&[[1.0, 1.0, 0.0, 0.0], [1.0, 1.0, 1.0, 0.0]]);
        let rank4 = ndarray::Array4::from_shape_fn((2, 1, 1, 4), |(b, _, _, k)| padding[[b, k]]);

        let (_out_a, w_broadcast) = attn.forward_with_weights(
            &input,
            &input,
            &input,
            Some(&AttentionMask::Broadcast(rank4)),
            false,
        )?;
        let (_out_b, w_padding) = attn.forward_with_weights(
            &input,
            &input,
            &input,
            Some(&AttentionMask::Padding(padding)),
            false,
        )?;

        for (a, b) in w_broadcast.iter().zip(w_padding.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-6);
        }
        for h in 0..2 {
            for q in 0..4 {
                assert!(w_broadcast[[0, h, q, 2]] < 1e-6);
                assert!(w_broadcast[[0, h, q, 3]] < 1e-6);
                assert!(w_broadcast[[1, h, q, 3]] < 1e-6);
            }
        }
        Ok(())
    }

    #[test]
    fn test_broadcast_mask_shape_mismatch_is_error() {
        let attn = MultiHeadAttention::new(8, 2).unwrap();
        let input = Array3::<f32>::ones((2, 4, 8));
        let mask = AttentionMask::Broadcast(ndarray::Array4::ones((3, 1, 4, 4)));
        assert!(attn.forward(&input, &input, &input, Some(&mask), false).is_err());
    }

    #[test]
    fn test_single_token_sequence_concentrates() -> Result<()> {
        let attn = MultiHeadAttention::new(8, 2)?;
        let input = Array3::from_shape_fn((1, 1, 8), |(_, _, d)| d as f32 * 0.5);

        let (output, weights) = attn.forward_with_weights(&input, &input, &input, None, true)?;
        assert_eq!(output.shape(), &[1, 1, 8]);
        for h in 0..2 {
            assert_relative_eq!(weights[[0, h, 0, 0]], 1.0, epsilon = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_single_head_matches_reference() -> Result<()> {
        // With identity projections and one head, attention reduces to plain
        // scaled dot-product over the full d_model.
        let d = 4;
        let attn = identity_attention(d, 1);
        let input = Array3::from_shape_vec(
            (1, 3, d),
            vec![
                0.5, -0.2, 0.8, 0.1, //
                -0.3, 0.9, 0.4, -0.6, //
                0.7, 0.2, -0.5, 0.3,
            ],
        )?;

        let (output, _weights) = attn.forward_with_weights(&input, &input, &input, None, false)?;

        // Reference: softmax(x @ x^T / sqrt(d)) @ x
        let x = input.index_axis(ndarray::Axis(0), 0).to_owned();
        let scale = 1.0 / (d as f32).sqrt();
        let mut scores = Array2::<f32>::zeros((3, 3));
        for i in 0..3 {
            for j in 0..3 {
                let dot: f32 = (0..d).map(|p| x[[i, p]] * x[[j, p]]).sum();
                scores[[i, j]] = dot * scale;
            }
        }
        for mut row in scores.rows_mut() {
            let max = row.fold(f32::NEG_INFINITY, |a, &v| a.max(v));
            let mut sum = 0.0;
            for v in row.iter_mut() {
                *v = (*v - max).exp();
                sum += *v;
            }
            for v in row.iter_mut() {
                *v /= sum;
            }
        }
        for i in 0..3 {
            for p in 0..d {
                let expected: f32 = (0..3).map(|j| scores[[i, j]] * x[[j, p]]).sum();
                assert_relative_eq!(output[[0, i, p]], expected, epsilon = 1e-4);
            }
        }
        Ok(())
    }

    #[test]
    fn test_cross_attention_shapes() -> Result<()> {
        let attn = MultiHeadAttention::new(16, 4)?;
        let decoder_state = Array3::from_shape_fn((2, 4, 16), |(b, s, d)| {
            ((b + s + d) as f32 * 0.21).sin()
        });
        let encoder_output = Array3::from_shape_fn((2, 6, 16), |(b, s, d)| {
            ((b * 2 + s + d) as f32 * 0.17).cos()
        });

        let (output, weights) = attn.forward_with_weights(
            &decoder_state,
            &encoder_output,
            &encoder_output,
            None,
            false,
        )?;

        assert_eq!(output.shape(), &[2, 4, 16]);
        assert_eq!(weights.shape(), &[2, 4, 4, 6]);
        Ok(())
    }

    #[test]
    fn test_mask_length_mismatch_is_error() {
        let attn = MultiHeadAttention::new(8, 2).unwrap();
        let input = Array3::<f32>::ones((1, 4, 8));
        let mask = AttentionMask::Padding(arr2(&[[1.0, 1.0, 1.0]]));

        assert!(attn.forward(&input, &input, &input, Some(&mask), false).is_err());
    }

    #[test]
    fn test_feature_dimension_mismatch_is_error() {
        let attn = MultiHeadAttention::new(8, 2).unwrap();
        let input = Array3::<f32>::ones((1, 4, 9));
        assert!(attn.forward(&input, &input, &input, None, false).is_err());
    }

    #[test]
    fn test_key_value_length_mismatch_is_error() {
        let attn = MultiHeadAttention::new(8, 2).unwrap();
        let q = Array3::<f32>::ones((1, 4, 8));
        let k = Array3::<f32>::ones((1, 5, 8));
        let v = Array3::<f32>::ones((1, 6, 8));
        assert!(attn.forward(&q, &k, &v, None, false).is_err());
    }
}
