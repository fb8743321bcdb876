//! Attention mask construction and application.
//!
//! Masks are numeric: 1.0 marks a position that may be attended to, 0.0 a
//! forbidden one. Forbidden score entries are filled with `MASK_VALUE` so
//! softmax drives their probability to ~0.

use anyhow::{anyhow, Result};
use ndarray::{Array2, Array4, Axis, Zip};

/// Large negative fill for forbidden attention scores. The exact constant
/// only needs to be far below any real score at f32 precision.
pub const MASK_VALUE: f32 = -1e9;

/// Lower-triangular causal pattern: query `i` may attend to keys `<= i`.
/// Shaped (query_len, key_len); handles query_len < key_len by aligning the
/// last query with the last key.
pub fn create_causal_mask(query_len: usize, key_len: usize) -> Array2<f32> {
    let offset = key_len.saturating_sub(query_len);
    Array2::from_shape_fn((query_len, key_len), |(q, k)| {
        if k > q + offset {
            0.0
        } else {
            1.0
        }
    })
}

/// Key padding mask from a token batch: 0.0 where the token equals
/// `pad_token_id`, 1.0 elsewhere. Shaped (batch, seq_len).
pub fn create_padding_mask(token_ids: &Array2<u32>, pad_token_id: u32) -> Array2<f32> {
    token_ids.mapv(|id| if id == pad_token_id { 0.0 } else { 1.0 })
}

/// Applies a (batch, key_len) padding mask to (batch, heads, query_len,
/// key_len) scores. A mask whose dimensions disagree with the scores is an
/// error, never silently skipped.
pub fn apply_padding_mask(mut scores: Array4<f32>, mask: &Array2<f32>) -> Result<Array4<f32>> {
    let (batch, _heads, _seq_q, seq_k) = scores.dim();

    if mask.nrows() != batch {
        return Err(anyhow!(
            "Padding mask batch size {} does not match scores batch size {}",
            mask.nrows(),
            batch
        ));
    }
    if mask.ncols() != seq_k {
        return Err(anyhow!(
            "Padding mask key length {} does not match scores key length {}",
            mask.ncols(),
            seq_k
        ));
    }

    let mask_bc = mask.view().insert_axis(Axis(1)).insert_axis(Axis(2));
    Zip::from(&mut scores)
        .and_broadcast(&mask_bc)
        .for_each(|score, &m| {
            if m == 0.0 {
                *score = MASK_VALUE;
            }
        });

    Ok(scores)
}

/// Applies a (query_len, key_len) pattern mask (e.g. a precomputed causal
/// pattern) across all batches and heads.
pub fn apply_pattern_mask(scores: &mut Array4<f32>, mask: &Array2<f32>) -> Result<()> {
    let (_batch, _heads, seq_q, seq_k) = scores.dim();

    if mask.dim() != (seq_q, seq_k) {
        return Err(anyhow!(
            "Pattern mask shape {:?} does not match score shape ({}, {})",
            mask.dim(),
            seq_q,
            seq_k
        ));
    }

    let mask_bc = mask.view().insert_axis(Axis(0)).insert_axis(Axis(0));
    Zip::from(scores)
        .and_broadcast(&mask_bc)
        .for_each(|score, &m| {
            if m == 0.0 {
                *score = MASK_VALUE;
            }
        });

    Ok(())
}

/// Applies a rank-4 mask that must be broadcastable against the score shape
/// (every mask dimension equals the score dimension or 1).
pub fn apply_broadcast_mask(scores: &mut Array4<f32>, mask: &Array4<f32>) -> Result<()> {
    let score_dim = scores.dim();
    let mask_dim = mask.dim();

    let compatible = |m: usize, s: usize| m == s || m == 1;
    if !(compatible(mask_dim.0, score_dim.0)
        && compatible(mask_dim.1, score_dim.1)
        && compatible(mask_dim.2, score_dim.2)
        && compatible(mask_dim.3, score_dim.3))
    {
        return Err(anyhow!(
            "Mask shape {:?} is not broadcastable against score shape {:?}",
            mask_dim,
            score_dim
        ));
    }

    let mask_bc = mask
        .broadcast(score_dim)
        .ok_or_else(|| anyhow!("Mask broadcast to {:?} failed", score_dim))?;
    Zip::from(scores).and(&mask_bc).for_each(|score, &m| {
        if m == 0.0 {
            *score = MASK_VALUE;
        }
    });

    Ok(())
}

/// In-place causal fill: query `i` may only attend to keys `<= i`.
pub fn apply_causal_mask(scores: &mut Array4<f32>) {
    let (_batch, _heads, seq_q, seq_k) = scores.dim();
    let offset = seq_k.saturating_sub(seq_q);

    for ((_, _, q, k), score) in scores.indexed_iter_mut() {
        if k > q + offset {
            *score = MASK_VALUE;
        }
    }
}
