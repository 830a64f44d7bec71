// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

//! 2-D correlation primitives used by the convolution layer.
//!
//! "Valid" mode produces only the positions where the filter fully overlaps
//! the input; "full" mode conceptually zero-pads the input by
//! `filter_dim - 1` on each side so every partial overlap contributes. The
//! backward pass pairs full mode with [`flip180`] to obtain a true
//! convolution, the mathematical gradient of a valid forward correlation.

use crate::matrix::Matrix;
use crate::{TensorError, TensorResult};

/// Valid-mode correlation of `input` with `filter`.
///
/// Output dimensions are `input - filter + 1` per axis; the filter must
/// fit inside the input, otherwise the call fails with
/// [`TensorError::FilterTooLarge`].
pub fn correlate_valid(input: &Matrix, filter: &Matrix) -> TensorResult<Matrix> {
    let (in_rows, in_cols) = input.shape();
    let (f_rows, f_cols) = filter.shape();
    if in_rows < f_rows || in_cols < f_cols {
        return Err(TensorError::FilterTooLarge {
            input: (in_rows, in_cols),
            filter: (f_rows, f_cols),
        });
    }
    Matrix::from_fn(in_rows - f_rows + 1, in_cols - f_cols + 1, |r, c| {
        let mut acc = 0.0;
        for i in 0..f_rows {
            for j in 0..f_cols {
                acc += input.get(r + i, c + j) * filter.get(i, j);
            }
        }
        acc
    })
}

/// Full-mode correlation of `input` with `filter`.
///
/// Equivalent to zero-padding the input by `filter_dim - 1` on each side
/// and correlating over every overlap position; output dimensions are
/// `input + filter - 1` per axis.
pub fn correlate_full(input: &Matrix, filter: &Matrix) -> TensorResult<Matrix> {
    let (in_rows, in_cols) = input.shape();
    let (f_rows, f_cols) = filter.shape();
    Matrix::from_fn(in_rows + f_rows - 1, in_cols + f_cols - 1, |r, c| {
        let mut acc = 0.0;
        for i in 0..f_rows {
            for j in 0..f_cols {
                let row = r as isize + i as isize - (f_rows as isize - 1);
                let col = c as isize + j as isize - (f_cols as isize - 1);
                if row >= 0 && col >= 0 && (row as usize) < in_rows && (col as usize) < in_cols {
                    acc += input.get(row as usize, col as usize) * filter.get(i, j);
                }
            }
        }
        acc
    })
}

/// Returns the filter rotated by 180 degrees in its spatial plane.
pub fn flip180(filter: &Matrix) -> TensorResult<Matrix> {
    let (rows, cols) = filter.shape();
    Matrix::from_fn(rows, cols, |r, c| filter.get(rows - 1 - r, cols - 1 - c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn valid_shape_shrinks_by_filter_minus_one() {
        let input = Matrix::ones(5, 4).unwrap();
        let filter = Matrix::ones(2, 3).unwrap();
        let out = correlate_valid(&input, &filter).unwrap();
        assert_eq!(out.shape(), (4, 2));
    }

    #[test]
    fn valid_all_ones_yields_filter_area() {
        let input = Matrix::ones(4, 4).unwrap();
        let filter = Matrix::ones(3, 2).unwrap();
        let out = correlate_valid(&input, &filter).unwrap();
        for &value in out.data() {
            assert_relative_eq!(value, 6.0);
        }
    }

    #[test]
    fn valid_rejects_oversized_filter() {
        let input = Matrix::ones(2, 2).unwrap();
        let filter = Matrix::ones(3, 3).unwrap();
        assert!(matches!(
            correlate_valid(&input, &filter),
            Err(TensorError::FilterTooLarge { .. })
        ));
    }

    #[test]
    fn full_shape_grows_by_filter_minus_one() {
        let input = Matrix::ones(3, 3).unwrap();
        let filter = Matrix::ones(2, 2).unwrap();
        let out = correlate_full(&input, &filter).unwrap();
        assert_eq!(out.shape(), (4, 4));
    }

    #[test]
    fn full_corner_sees_single_overlap() {
        let input = Matrix::from_fn(3, 3, |r, c| (r * 3 + c + 1) as f32).unwrap();
        let filter = Matrix::ones(2, 2).unwrap();
        let out = correlate_full(&input, &filter).unwrap();
        // Top-left output position overlaps only input(0, 0).
        assert_relative_eq!(out.get(0, 0), input.get(0, 0));
        // Bottom-right position overlaps only input(2, 2).
        assert_relative_eq!(out.get(3, 3), input.get(2, 2));
    }

    #[test]
    fn full_interior_matches_valid() {
        let input = Matrix::from_fn(4, 4, |r, c| (r as f32) - (c as f32) * 0.5).unwrap();
        let filter = Matrix::from_fn(2, 2, |r, c| (r * 2 + c) as f32 * 0.25 + 0.1).unwrap();
        let full = correlate_full(&input, &filter).unwrap();
        let valid = correlate_valid(&input, &filter).unwrap();
        let (vr, vc) = valid.shape();
        for r in 0..vr {
            for c in 0..vc {
                assert_relative_eq!(full.get(r + 1, c + 1), valid.get(r, c), epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn flip180_reverses_both_axes() {
        let filter = Matrix::from_fn(2, 3, |r, c| (r * 3 + c) as f32).unwrap();
        let flipped = flip180(&filter).unwrap();
        assert_eq!(flipped.get(0, 0), filter.get(1, 2));
        assert_eq!(flipped.get(1, 2), filter.get(0, 0));
        let double = flip180(&flipped).unwrap();
        assert_eq!(double, filter);
    }
}
