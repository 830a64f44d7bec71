// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

use crate::tensor::Tensor;
use crate::{TensorError, TensorResult};

/// Paired `(tensor, bias vector)` value holding either layer parameters or
/// a gradient of the same shape.
///
/// Gradients must be summed and scaled during the reduce step, so the pair
/// supports the same arithmetic as [`Tensor`], applied to the tensor and
/// bias sides in lockstep.
#[derive(Clone, Debug, PartialEq)]
pub struct Weight {
    w: Tensor,
    b: Vec<f32>,
}

impl Weight {
    /// Creates a weight pair from its tensor and bias parts.
    pub fn new(w: Tensor, b: Vec<f32>) -> Self {
        Self { w, b }
    }

    /// Creates a zero-valued pair with the given tensor shape and bias length.
    pub fn zeros(dims: &[usize], bias_len: usize) -> TensorResult<Self> {
        Ok(Self {
            w: Tensor::zeros(dims)?,
            b: vec![0.0; bias_len],
        })
    }

    /// Creates a zero-valued pair with the same shape as `self`.
    pub fn zeros_like(&self) -> TensorResult<Self> {
        Ok(Self {
            w: Tensor::zeros(&self.w.shape())?,
            b: vec![0.0; self.b.len()],
        })
    }

    /// Borrows the tensor part.
    pub fn w(&self) -> &Tensor {
        &self.w
    }

    /// Mutably borrows the tensor part.
    pub fn w_mut(&mut self) -> &mut Tensor {
        &mut self.w
    }

    /// Borrows the bias part.
    pub fn b(&self) -> &[f32] {
        &self.b
    }

    /// Mutably borrows the bias part.
    pub fn b_mut(&mut self) -> &mut [f32] {
        &mut self.b
    }

    fn assert_same_shape(&self, other: &Weight) -> TensorResult<()> {
        if self.w.shape() != other.w.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.w.shape(),
                right: other.w.shape(),
            });
        }
        if self.b.len() != other.b.len() {
            return Err(TensorError::DataLength {
                expected: self.b.len(),
                got: other.b.len(),
            });
        }
        Ok(())
    }

    /// Elementwise sum of two pairs.
    pub fn add(&self, other: &Weight) -> TensorResult<Weight> {
        self.assert_same_shape(other)?;
        Ok(Weight {
            w: self.w.add(&other.w)?,
            b: self
                .b
                .iter()
                .zip(other.b.iter())
                .map(|(a, b)| a + b)
                .collect(),
        })
    }

    /// Elementwise difference of two pairs.
    pub fn sub(&self, other: &Weight) -> TensorResult<Weight> {
        self.assert_same_shape(other)?;
        Ok(Weight {
            w: self.w.sub(&other.w)?,
            b: self
                .b
                .iter()
                .zip(other.b.iter())
                .map(|(a, b)| a - b)
                .collect(),
        })
    }

    /// In-place elementwise sum.
    pub fn addi(&mut self, other: &Weight) -> TensorResult<()> {
        self.assert_same_shape(other)?;
        self.w.addi(&other.w)?;
        for (a, b) in self.b.iter_mut().zip(other.b.iter()) {
            *a += b;
        }
        Ok(())
    }

    /// In-place elementwise difference.
    pub fn subi(&mut self, other: &Weight) -> TensorResult<()> {
        self.assert_same_shape(other)?;
        self.w.subi(&other.w)?;
        for (a, b) in self.b.iter_mut().zip(other.b.iter()) {
            *a -= b;
        }
        Ok(())
    }

    /// Scalar multiplication.
    pub fn mul_scalar(&self, value: f32) -> Weight {
        Weight {
            w: self.w.mul_scalar(value),
            b: self.b.iter().map(|v| v * value).collect(),
        }
    }

    /// Scalar division.
    pub fn div_scalar(&self, value: f32) -> Weight {
        Weight {
            w: self.w.div_scalar(value),
            b: self.b.iter().map(|v| v / value).collect(),
        }
    }

    /// In-place scalar multiplication.
    pub fn muli_scalar(&mut self, value: f32) {
        self.w.muli_scalar(value);
        for v in &mut self.b {
            *v *= value;
        }
    }

    /// In-place scalar division.
    pub fn divi_scalar(&mut self, value: f32) {
        self.muli_scalar(1.0 / value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pair(scale: f32) -> Weight {
        let w = Tensor::from_vec(
            (0..8).map(|i| i as f32 * scale).collect(),
            &[2, 1, 2, 2],
        )
        .unwrap();
        Weight::new(w, vec![scale, -scale])
    }

    #[test]
    fn addi_then_subi_restores_original() {
        let mut a = pair(1.0);
        let original = a.clone();
        let b = pair(0.5);
        a.addi(&b).unwrap();
        a.subi(&b).unwrap();
        for (x, y) in a.w().to_array().iter().zip(original.w().to_array().iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-6);
        }
        assert_relative_eq!(a.b()[0], original.b()[0], epsilon = 1e-6);
    }

    #[test]
    fn scalar_ops_scale_both_parts() {
        let scaled = pair(2.0).mul_scalar(-1.5);
        assert_relative_eq!(scaled.w().to_array()[1], -3.0);
        assert_relative_eq!(scaled.b()[0], -3.0);
        let divided = pair(2.0).div_scalar(2.0);
        assert_relative_eq!(divided.b()[0], 1.0);
    }

    #[test]
    fn mismatched_bias_lengths_are_rejected() {
        let mut a = pair(1.0);
        let b = Weight::new(a.w().clone(), vec![0.0; 3]);
        assert!(matches!(a.addi(&b), Err(TensorError::DataLength { .. })));
    }
}
