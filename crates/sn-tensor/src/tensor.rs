// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

use crate::init;
use crate::matrix::Matrix;
use crate::{TensorError, TensorResult};
use rand::Rng;
use rand_distr::StandardNormal;

/// Fixed 4-axis shape: `[kernels, channels, rows, cols]`.
pub type Shape = [usize; 4];

/// Fixed 4-axis numeric container stored as an ordered collection of 2-D
/// matrix slices, indexed `kernel * channels + channel`.
///
/// Shapes with fewer than four axes right-align; missing leading axes
/// default to 1, so `&[3, 3]` describes a single 3x3 slice. The shape is
/// immutable after construction; reshaping or merging always builds a new
/// tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    shape: Shape,
    slices: Vec<Matrix>,
}

fn normalize_shape(dims: &[usize]) -> TensorResult<Shape> {
    if dims.len() > 4 {
        return Err(TensorError::DimensionOverflow { axes: dims.len() });
    }
    let mut shape: Shape = [1, 1, 1, 1];
    shape[4 - dims.len()..].copy_from_slice(dims);
    if shape.iter().any(|&d| d == 0) {
        return Err(TensorError::InvalidDimensions {
            rows: shape[2],
            cols: shape[3],
        });
    }
    Ok(shape)
}

impl Tensor {
    fn with_slices(shape: Shape, slices: Vec<Matrix>) -> Self {
        debug_assert_eq!(slices.len(), shape[0] * shape[1]);
        Self { shape, slices }
    }

    fn filled(dims: &[usize], value: f32) -> TensorResult<Self> {
        let shape = normalize_shape(dims)?;
        let count = shape[0] * shape[1];
        let mut slices = Vec::with_capacity(count);
        for _ in 0..count {
            slices.push(Matrix::from_fn(shape[2], shape[3], |_, _| value)?);
        }
        Ok(Self::with_slices(shape, slices))
    }

    /// Creates a tensor filled with zeros.
    pub fn zeros(dims: &[usize]) -> TensorResult<Self> {
        Self::filled(dims, 0.0)
    }

    /// Creates a tensor filled with ones.
    pub fn ones(dims: &[usize]) -> TensorResult<Self> {
        Self::filled(dims, 1.0)
    }

    /// Creates a tensor with uniform samples in `[0, 1)`.
    ///
    /// A seed makes the content deterministic for tests; otherwise host
    /// entropy is used.
    pub fn rand(dims: &[usize], seed: Option<u64>) -> TensorResult<Self> {
        let shape = normalize_shape(dims)?;
        let mut rng = init::rng(seed);
        let count = shape[0] * shape[1];
        let mut slices = Vec::with_capacity(count);
        for _ in 0..count {
            slices.push(Matrix::from_fn(shape[2], shape[3], |_, _| {
                rng.gen::<f32>()
            })?);
        }
        Ok(Self::with_slices(shape, slices))
    }

    /// Creates a tensor with standard Gaussian samples.
    pub fn randn(dims: &[usize], seed: Option<u64>) -> TensorResult<Self> {
        let shape = normalize_shape(dims)?;
        let mut rng = init::rng(seed);
        let count = shape[0] * shape[1];
        let mut slices = Vec::with_capacity(count);
        for _ in 0..count {
            slices.push(Matrix::from_fn(shape[2], shape[3], |_, _| {
                rng.sample(StandardNormal)
            })?);
        }
        Ok(Self::with_slices(shape, slices))
    }

    /// Creates a tensor from a flat value array in slice storage order.
    ///
    /// The array length must equal the product of the shape dimensions.
    /// Consecutive `rows * cols` chunks become the column-major content of
    /// successive slices, which makes this the exact inverse of
    /// [`Tensor::to_array`].
    pub fn from_vec(data: Vec<f32>, dims: &[usize]) -> TensorResult<Self> {
        let shape = normalize_shape(dims)?;
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(TensorError::DataLength {
                expected,
                got: data.len(),
            });
        }
        let mat_size = shape[2] * shape[3];
        let slices = data
            .chunks_exact(mat_size)
            .map(|chunk| Matrix::from_vec(shape[2], shape[3], chunk.to_vec()))
            .collect::<TensorResult<Vec<_>>>()?;
        Ok(Self::with_slices(shape, slices))
    }

    /// Builds a tensor that owns the provided slices.
    ///
    /// All slices must share the same row/col dimensions and their count
    /// must equal `kernels * channels`.
    pub fn from_slices(slices: Vec<Matrix>, kernels: usize, channels: usize) -> TensorResult<Self> {
        if slices.is_empty() {
            return Err(TensorError::EmptyInput("slice list"));
        }
        if slices.len() != kernels * channels {
            return Err(TensorError::DataLength {
                expected: kernels * channels,
                got: slices.len(),
            });
        }
        let (rows, cols) = slices[0].shape();
        for slice in &slices[1..] {
            if slice.shape() != (rows, cols) {
                return Err(TensorError::MatrixShapeMismatch {
                    left: (rows, cols),
                    right: slice.shape(),
                });
            }
        }
        Ok(Self::with_slices([kernels, channels, rows, cols], slices))
    }

    /// Returns the 4-axis shape `[kernels, channels, rows, cols]`.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Number of kernel slots along the first axis.
    pub fn kernels(&self) -> usize {
        self.shape[0]
    }

    /// Number of channels along the second axis.
    pub fn channels(&self) -> usize {
        self.shape[1]
    }

    /// Rows of every slice.
    pub fn rows(&self) -> usize {
        self.shape[2]
    }

    /// Columns of every slice.
    pub fn cols(&self) -> usize {
        self.shape[3]
    }

    /// Total number of elements across all slices.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Always `false`; constructors reject zero-sized axes.
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Borrows the slice at `(kernel, channel)`.
    pub fn slice(&self, kernel: usize, channel: usize) -> &Matrix {
        &self.slices[kernel * self.shape[1] + channel]
    }

    /// Mutably borrows the slice at `(kernel, channel)`.
    pub fn slice_mut(&mut self, kernel: usize, channel: usize) -> &mut Matrix {
        &mut self.slices[kernel * self.shape[1] + channel]
    }

    /// Borrows a slice by its flat `kernel * channels + channel` index.
    pub fn slice_flat(&self, index: usize) -> &Matrix {
        &self.slices[index]
    }

    /// Ordered view over all slices.
    pub fn slices(&self) -> &[Matrix] {
        &self.slices
    }

    /// Number of stored slices (`kernels * channels`).
    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    fn assert_same_shape(&self, other: &Tensor) -> TensorResult<()> {
        if self.shape != other.shape {
            return Err(TensorError::ShapeMismatch {
                left: self.shape,
                right: other.shape,
            });
        }
        Ok(())
    }

    fn zip_slices<F>(&self, other: &Tensor, f: F) -> TensorResult<Tensor>
    where
        F: Fn(&Matrix, &Matrix) -> TensorResult<Matrix>,
    {
        self.assert_same_shape(other)?;
        let slices = self
            .slices
            .iter()
            .zip(other.slices.iter())
            .map(|(a, b)| f(a, b))
            .collect::<TensorResult<Vec<_>>>()?;
        Ok(Self::with_slices(self.shape, slices))
    }

    /// Elementwise scalar addition.
    pub fn add_scalar(&self, value: f32) -> Tensor {
        Self::with_slices(
            self.shape,
            self.slices.iter().map(|m| m.add_scalar(value)).collect(),
        )
    }

    /// Elementwise scalar subtraction.
    pub fn sub_scalar(&self, value: f32) -> Tensor {
        Self::with_slices(
            self.shape,
            self.slices.iter().map(|m| m.sub_scalar(value)).collect(),
        )
    }

    /// Elementwise scalar multiplication.
    pub fn mul_scalar(&self, value: f32) -> Tensor {
        Self::with_slices(
            self.shape,
            self.slices.iter().map(|m| m.mul_scalar(value)).collect(),
        )
    }

    /// Elementwise scalar division.
    pub fn div_scalar(&self, value: f32) -> Tensor {
        Self::with_slices(
            self.shape,
            self.slices.iter().map(|m| m.div_scalar(value)).collect(),
        )
    }

    /// In-place scalar addition.
    pub fn addi_scalar(&mut self, value: f32) {
        for slice in &mut self.slices {
            slice.addi_scalar(value);
        }
    }

    /// In-place scalar multiplication.
    pub fn muli_scalar(&mut self, value: f32) {
        for slice in &mut self.slices {
            slice.muli_scalar(value);
        }
    }

    /// Elementwise tensor addition; shapes must match exactly.
    pub fn add(&self, other: &Tensor) -> TensorResult<Tensor> {
        self.zip_slices(other, |a, b| a.add(b))
    }

    /// Elementwise tensor subtraction.
    pub fn sub(&self, other: &Tensor) -> TensorResult<Tensor> {
        self.zip_slices(other, |a, b| a.sub(b))
    }

    /// Elementwise (Hadamard) tensor product.
    pub fn mul(&self, other: &Tensor) -> TensorResult<Tensor> {
        self.zip_slices(other, |a, b| a.mul(b))
    }

    /// Elementwise tensor quotient.
    pub fn div(&self, other: &Tensor) -> TensorResult<Tensor> {
        self.zip_slices(other, |a, b| a.div(b))
    }

    /// In-place elementwise addition.
    pub fn addi(&mut self, other: &Tensor) -> TensorResult<()> {
        self.assert_same_shape(other)?;
        for (a, b) in self.slices.iter_mut().zip(other.slices.iter()) {
            a.addi(b)?;
        }
        Ok(())
    }

    /// In-place elementwise subtraction.
    pub fn subi(&mut self, other: &Tensor) -> TensorResult<()> {
        self.assert_same_shape(other)?;
        for (a, b) in self.slices.iter_mut().zip(other.slices.iter()) {
            a.subi(b)?;
        }
        Ok(())
    }

    /// In-place elementwise multiplication.
    pub fn muli(&mut self, other: &Tensor) -> TensorResult<()> {
        self.assert_same_shape(other)?;
        for (a, b) in self.slices.iter_mut().zip(other.slices.iter()) {
            a.muli(b)?;
        }
        Ok(())
    }

    /// In-place elementwise division.
    pub fn divi(&mut self, other: &Tensor) -> TensorResult<()> {
        self.assert_same_shape(other)?;
        for (a, b) in self.slices.iter_mut().zip(other.slices.iter()) {
            a.divi(b)?;
        }
        Ok(())
    }

    /// Matrix multiply applied independently per `(kernel, channel)` slice
    /// pair. Operands must share kernel/channel counts and satisfy
    /// `self.cols == other.rows`.
    pub fn mmul(&self, other: &Tensor) -> TensorResult<Tensor> {
        if self.shape[0] != other.shape[0]
            || self.shape[1] != other.shape[1]
            || self.shape[3] != other.shape[2]
        {
            return Err(TensorError::IncompatibleMultiply {
                left: self.shape,
                right: other.shape,
            });
        }
        let slices = self
            .slices
            .iter()
            .zip(other.slices.iter())
            .map(|(a, b)| a.mmul(b))
            .collect::<TensorResult<Vec<_>>>()?;
        Ok(Self::with_slices(
            [self.shape[0], self.shape[1], self.shape[2], other.shape[3]],
            slices,
        ))
    }

    /// Transposes every slice, swapping the row and column axes.
    pub fn transpose(&self) -> Tensor {
        Self::with_slices(
            [self.shape[0], self.shape[1], self.shape[3], self.shape[2]],
            self.slices.iter().map(|m| m.transpose()).collect(),
        )
    }

    /// Sum over every element of every slice.
    pub fn sum(&self) -> f32 {
        self.slices.iter().map(|m| m.sum()).sum()
    }

    /// Returns a tensor with the same shape and copied slice values.
    pub fn dup(&self) -> Tensor {
        self.clone()
    }

    /// Concatenates tensors along the kernel axis. All inputs must share
    /// identical `(channels, rows, cols)`; the result's kernel count is the
    /// sum of the inputs' kernel counts, elements preserved in input order.
    pub fn merge(tensors: &[Tensor]) -> TensorResult<Tensor> {
        let first = tensors.first().ok_or(TensorError::EmptyInput("merge"))?;
        let tail = &first.shape[1..];
        let mut kernels = 0;
        for tensor in tensors {
            if &tensor.shape[1..] != tail {
                return Err(TensorError::ShapeMismatch {
                    left: first.shape,
                    right: tensor.shape,
                });
            }
            kernels += tensor.shape[0];
        }
        let mut slices = Vec::with_capacity(kernels * first.shape[1]);
        for tensor in tensors {
            slices.extend(tensor.slices.iter().cloned());
        }
        Ok(Self::with_slices(
            [kernels, first.shape[1], first.shape[2], first.shape[3]],
            slices,
        ))
    }

    /// Flattens to one value array in kernel-major, channel-major order,
    /// each slice contributing its native column-major storage.
    pub fn to_array(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.len());
        for slice in &self.slices {
            out.extend_from_slice(slice.data());
        }
        out
    }

    /// Repacks the flattened content into a new shape; the total element
    /// count must be unchanged.
    pub fn reshape(&self, dims: &[usize]) -> TensorResult<Tensor> {
        Tensor::from_vec(self.to_array(), dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample(dims: &[usize]) -> Tensor {
        let len: usize = dims.iter().product();
        Tensor::from_vec((0..len).map(|i| i as f32 * 0.5 - 3.0).collect(), dims).unwrap()
    }

    #[test]
    fn shape_right_aligns_missing_axes() {
        let t = Tensor::zeros(&[3, 4]).unwrap();
        assert_eq!(t.shape(), [1, 1, 3, 4]);
        let t = Tensor::zeros(&[2, 3, 4]).unwrap();
        assert_eq!(t.shape(), [1, 2, 3, 4]);
    }

    #[test]
    fn five_axes_overflow() {
        assert!(matches!(
            Tensor::zeros(&[1, 1, 1, 2, 2]),
            Err(TensorError::DimensionOverflow { axes: 5 })
        ));
    }

    #[test]
    fn from_vec_checks_length() {
        assert!(matches!(
            Tensor::from_vec(vec![1.0; 5], &[2, 3]),
            Err(TensorError::DataLength {
                expected: 6,
                got: 5
            })
        ));
    }

    #[test]
    fn add_sub_round_trip() {
        let a = sample(&[2, 2, 3, 3]);
        let b = sample(&[2, 2, 3, 3]).mul_scalar(0.3);
        let restored = a.add(&b).unwrap().sub(&b).unwrap();
        for (x, y) in restored.to_array().iter().zip(a.to_array().iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-5);
        }
    }

    #[test]
    fn binary_op_rejects_shape_mismatch() {
        let a = Tensor::zeros(&[2, 2]).unwrap();
        let b = Tensor::zeros(&[2, 3]).unwrap();
        assert!(matches!(a.add(&b), Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn mmul_requires_matching_kernel_and_channel() {
        let a = Tensor::zeros(&[2, 1, 2, 3]).unwrap();
        let b = Tensor::zeros(&[1, 1, 3, 2]).unwrap();
        assert!(matches!(
            a.mmul(&b),
            Err(TensorError::IncompatibleMultiply { .. })
        ));
    }

    #[test]
    fn mmul_multiplies_per_slice() {
        let a = Tensor::ones(&[2, 1, 2, 3]).unwrap();
        let b = Tensor::ones(&[2, 1, 3, 4]).unwrap();
        let out = a.mmul(&b).unwrap();
        assert_eq!(out.shape(), [2, 1, 2, 4]);
        for value in out.to_array() {
            assert_relative_eq!(value, 3.0);
        }
    }

    #[test]
    fn dup_preserves_shape_and_values() {
        let t = sample(&[2, 1, 2, 2]);
        let copy = t.dup();
        assert_eq!(copy.shape(), t.shape());
        assert_eq!(copy.to_array(), t.to_array());
    }

    #[test]
    fn merge_concatenates_kernel_axis() {
        let a = sample(&[1, 2, 2, 2]);
        let b = sample(&[2, 2, 2, 2]);
        let merged = Tensor::merge(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(merged.shape(), [3, 2, 2, 2]);
        let mut expected = a.to_array();
        expected.extend(b.to_array());
        assert_eq!(merged.to_array(), expected);
    }

    #[test]
    fn merge_rejects_differing_tail_shape() {
        let a = Tensor::zeros(&[1, 2, 2, 2]).unwrap();
        let b = Tensor::zeros(&[1, 2, 3, 2]).unwrap();
        assert!(matches!(
            Tensor::merge(&[a, b]),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn reshape_of_to_array_reproduces_contents() {
        let t = sample(&[2, 2, 2, 3]);
        let rebuilt = Tensor::from_vec(t.to_array(), &[2, 2, 2, 3]).unwrap();
        assert_eq!(rebuilt, t);
        let reshaped = t.reshape(&[4, 1, 3, 2]).unwrap();
        assert_eq!(reshaped.to_array(), t.to_array());
    }

    #[test]
    fn reshape_rejects_changed_element_count() {
        let t = Tensor::zeros(&[2, 3]).unwrap();
        assert!(matches!(
            t.reshape(&[2, 4]),
            Err(TensorError::DataLength { .. })
        ));
    }

    #[test]
    fn seeded_randn_is_deterministic() {
        let a = Tensor::randn(&[2, 3, 3], Some(11));
        let b = Tensor::randn(&[2, 3, 3], Some(11));
        assert_eq!(a.unwrap(), b.unwrap());
    }
}
