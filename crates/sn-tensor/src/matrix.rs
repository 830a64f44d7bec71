// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

use crate::{TensorError, TensorResult};

/// Dense 2-D matrix backing one tensor slice.
///
/// Storage is column-major (`data[row + col * rows]`), matching the flatten
/// contract the fully-connected layer relies on: flattening a matrix walks
/// its native storage order, and unflattening reverses it exactly.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    fn from_parts(rows: usize, cols: usize, data: Vec<f32>) -> TensorResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let expected = rows * cols;
        if data.len() != expected {
            return Err(TensorError::DataLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Creates a matrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> TensorResult<Self> {
        Self::from_parts(rows, cols, vec![0.0; rows.saturating_mul(cols)])
    }

    /// Creates a matrix filled with ones.
    pub fn ones(rows: usize, cols: usize) -> TensorResult<Self> {
        Self::from_parts(rows, cols, vec![1.0; rows.saturating_mul(cols)])
    }

    /// Creates a matrix from column-major data.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> TensorResult<Self> {
        Self::from_parts(rows, cols, data)
    }

    /// Creates a single-column matrix wrapping the provided values.
    pub fn column(data: Vec<f32>) -> TensorResult<Self> {
        let rows = data.len();
        Self::from_parts(rows, 1, data)
    }

    /// Creates a matrix by applying a generator to each `(row, col)` coordinate.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> TensorResult<Self>
    where
        F: FnMut(usize, usize) -> f32,
    {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let mut data = Vec::with_capacity(rows * cols);
        for c in 0..cols {
            for r in 0..rows {
                data.push(f(r, c));
            }
        }
        Self::from_parts(rows, cols, data)
    }

    /// Returns the `(rows, cols)` pair of the matrix.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Always `false`; constructors reject zero-sized axes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Column-major view of the backing storage.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable column-major view of the backing storage.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Reads the element at `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row + col * self.rows]
    }

    /// Writes the element at `(row, col)`.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row + col * self.rows] = value;
    }

    fn assert_same_shape(&self, other: &Matrix) -> TensorResult<()> {
        if self.shape() != other.shape() {
            return Err(TensorError::MatrixShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(())
    }

    /// Applies a function to every element, producing a new matrix.
    pub fn map<F>(&self, mut f: F) -> Matrix
    where
        F: FnMut(f32) -> f32,
    {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Elementwise addition of a scalar.
    pub fn add_scalar(&self, value: f32) -> Matrix {
        self.map(|v| v + value)
    }

    /// Elementwise subtraction of a scalar.
    pub fn sub_scalar(&self, value: f32) -> Matrix {
        self.map(|v| v - value)
    }

    /// Elementwise multiplication by a scalar.
    pub fn mul_scalar(&self, value: f32) -> Matrix {
        self.map(|v| v * value)
    }

    /// Elementwise division by a scalar.
    pub fn div_scalar(&self, value: f32) -> Matrix {
        self.map(|v| v / value)
    }

    /// In-place scalar addition.
    pub fn addi_scalar(&mut self, value: f32) {
        for v in &mut self.data {
            *v += value;
        }
    }

    /// In-place scalar multiplication.
    pub fn muli_scalar(&mut self, value: f32) {
        for v in &mut self.data {
            *v *= value;
        }
    }

    /// Elementwise sum of two matrices.
    pub fn add(&self, other: &Matrix) -> TensorResult<Matrix> {
        self.assert_same_shape(other)?;
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a + b)
                .collect(),
        })
    }

    /// Elementwise difference of two matrices.
    pub fn sub(&self, other: &Matrix) -> TensorResult<Matrix> {
        self.assert_same_shape(other)?;
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a - b)
                .collect(),
        })
    }

    /// Elementwise (Hadamard) product of two matrices.
    pub fn mul(&self, other: &Matrix) -> TensorResult<Matrix> {
        self.assert_same_shape(other)?;
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a * b)
                .collect(),
        })
    }

    /// Elementwise quotient of two matrices.
    pub fn div(&self, other: &Matrix) -> TensorResult<Matrix> {
        self.assert_same_shape(other)?;
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a / b)
                .collect(),
        })
    }

    /// In-place elementwise sum.
    pub fn addi(&mut self, other: &Matrix) -> TensorResult<()> {
        self.assert_same_shape(other)?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
        Ok(())
    }

    /// In-place elementwise difference.
    pub fn subi(&mut self, other: &Matrix) -> TensorResult<()> {
        self.assert_same_shape(other)?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a -= b;
        }
        Ok(())
    }

    /// In-place elementwise product.
    pub fn muli(&mut self, other: &Matrix) -> TensorResult<()> {
        self.assert_same_shape(other)?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a *= b;
        }
        Ok(())
    }

    /// In-place elementwise quotient.
    pub fn divi(&mut self, other: &Matrix) -> TensorResult<()> {
        self.assert_same_shape(other)?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a /= b;
        }
        Ok(())
    }

    /// Matrix multiplication; `self.cols` must equal `other.rows`.
    pub fn mmul(&self, other: &Matrix) -> TensorResult<Matrix> {
        if self.cols != other.rows {
            return Err(TensorError::MatrixShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let mut out = Matrix::zeros(self.rows, other.cols)?;
        for c in 0..other.cols {
            for k in 0..self.cols {
                let rhs = other.get(k, c);
                if rhs == 0.0 {
                    continue;
                }
                for r in 0..self.rows {
                    let value = out.get(r, c) + self.get(r, k) * rhs;
                    out.set(r, c, value);
                }
            }
        }
        Ok(out)
    }

    /// Returns the transposed matrix.
    pub fn transpose(&self) -> Matrix {
        let mut data = Vec::with_capacity(self.len());
        for c in 0..self.rows {
            for r in 0..self.cols {
                data.push(self.get(c, r));
            }
        }
        Matrix {
            rows: self.cols,
            cols: self.rows,
            data,
        }
    }

    /// Sum over all elements.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }
}
