//! Dense matrix-multiplication kernels backed by faer.
//!
//! Everything here is f32 row-major. The 2D kernel lets faer parallelize
//! internally; the 4D kernel parallelizes over the batch axis itself and
//! runs faer single-threaded per head.

use faer::Parallelism;
use ndarray::{Array2, Array3, Array4, ArrayView2, Zip};

#[inline]
pub fn matmul_2d(a: &ArrayView2<f32>, b: &ArrayView2<f32>) -> Array2<f32> {
    let (m, k) = a.dim();
    let (k2, n) = b.dim();
    assert_eq!(k, k2, "Dim mismatch");

    let mut c = Array2::<f32>::zeros((m, n));
    let a_s = a.as_standard_layout();
    let a_sl = a_s.as_slice().expect("standard layout is contiguous");
    let b_s = b.as_standard_layout();
    let b_sl = b_s.as_slice().expect("standard layout is contiguous");
    let c_sl = c.as_slice_mut().expect("freshly allocated output is contiguous");

    faer::linalg::matmul::matmul(
        faer::mat::from_row_major_slice_mut(c_sl, m, n),
        faer::mat::from_row_major_slice(a_sl, m, k),
        faer::mat::from_row_major_slice(b_sl, k, n),
        None,
        1.0,
        Parallelism::Rayon(0),
    );
    c
}

/// Batched matmul: flattens (batch, m, k) to (batch*m, k), multiplies by a
/// shared (k, n) weight, reshapes back.
#[inline]
pub fn matmul_3d_2d(a: &Array3<f32>, b: &Array2<f32>) -> Array3<f32> {
    let (batch, m, k) = a.dim();
    let (k2, n) = b.dim();
    assert_eq!(k, k2, "Dim mismatch");

    let a_std = a.as_standard_layout();
    let a_flat = a_std
        .view()
        .into_shape_with_order((batch * m, k))
        .expect("standard layout reshape cannot fail");
    let c_flat = matmul_2d(&a_flat, &b.view());
    c_flat
        .into_shape_with_order((batch, m, n))
        .expect("standard layout reshape cannot fail")
}

/// Per-head batched matmul: (batch, heads, s1, d) x (batch, heads, d, s2).
#[inline]
pub fn matmul_4d(a: &Array4<f32>, b: &Array4<f32>) -> Array4<f32> {
    let (batch, heads, seq1, dim) = a.dim();
    let seq2 = b.shape()[3];
    debug_assert_eq!(b.shape()[2], dim, "Dim mismatch");

    let mut output = Array4::<f32>::zeros((batch, heads, seq1, seq2));

    Zip::from(output.outer_iter_mut())
        .and(a.outer_iter())
        .and(b.outer_iter())
        .par_for_each(|mut out_b, a_b, b_b| {
            Zip::from(out_b.outer_iter_mut())
                .and(a_b.outer_iter())
                .and(b_b.outer_iter())
                .for_each(|mut out_h, a_h, b_h| {
                    let a_s = a_h.as_standard_layout();
                    let b_s = b_h.as_standard_layout();
                    let o_s = out_h.as_slice_mut().expect("Output buffer must be contiguous");

                    faer::linalg::matmul::matmul(
                        faer::mat::from_row_major_slice_mut(o_s, seq1, seq2),
                        faer::mat::from_row_major_slice(
                            a_s.as_slice().expect("standard layout is contiguous"),
                            seq1,
                            dim,
                        ),
                        faer::mat::from_row_major_slice(
                            b_s.as_slice().expect("standard layout is contiguous"),
                            dim,
                            seq2,
                        ),
                        None,
                        1.0,
                        Parallelism::None, // No internal threads; we are already parallel
                    );
                });
        });

    output
}
