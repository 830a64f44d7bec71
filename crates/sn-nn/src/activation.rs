// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

use sn_tensor::{Matrix, Tensor, TensorResult};

/// Per-layer nonlinearity, configured at construction.
///
/// Each variant knows its derivative expressed in terms of the activation
/// OUTPUT, which is the value layers cache after a forward pass. The backward
/// pass therefore never recomputes the pre-activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Identity,
    Sigmoid,
    Tanh,
    Relu,
}

impl Activation {
    /// Applies the nonlinearity to one value.
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
            Activation::Relu => x.max(0.0),
        }
    }

    /// Derivative evaluated from the cached activation output `y`.
    pub fn derive_from_output(&self, y: f32) -> f32 {
        match self {
            Activation::Identity => 1.0,
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Tanh => 1.0 - y * y,
            Activation::Relu => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Applies the nonlinearity to every element of a matrix.
    pub fn apply_matrix(&self, m: &Matrix) -> Matrix {
        m.map(|v| self.apply(v))
    }

    /// Applies the nonlinearity to every element of a tensor.
    pub fn apply_tensor(&self, t: &Tensor) -> TensorResult<Tensor> {
        let slices = t.slices().iter().map(|s| self.apply_matrix(s)).collect();
        Tensor::from_slices(slices, t.kernels(), t.channels())
    }

    /// Elementwise derivative of a cached output tensor.
    pub fn derive_tensor(&self, output: &Tensor) -> TensorResult<Tensor> {
        let slices = output
            .slices()
            .iter()
            .map(|s| s.map(|v| self.derive_from_output(v)))
            .collect();
        Tensor::from_slices(slices, output.kernels(), output.channels())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sigmoid_derivative_uses_output_form() {
        let act = Activation::Sigmoid;
        let y = act.apply(0.7);
        assert_relative_eq!(act.derive_from_output(y), y * (1.0 - y));
        assert_relative_eq!(act.apply(0.0), 0.5);
    }

    #[test]
    fn identity_passes_values_through() {
        let act = Activation::Identity;
        assert_relative_eq!(act.apply(-3.25), -3.25);
        assert_relative_eq!(act.derive_from_output(-3.25), 1.0);
    }

    #[test]
    fn relu_clamps_and_gates() {
        let act = Activation::Relu;
        assert_relative_eq!(act.apply(-1.0), 0.0);
        assert_relative_eq!(act.apply(2.5), 2.5);
        assert_relative_eq!(act.derive_from_output(2.5), 1.0);
        assert_relative_eq!(act.derive_from_output(0.0), 0.0);
    }

    #[test]
    fn tanh_derivative_matches_closed_form() {
        let act = Activation::Tanh;
        let y = act.apply(0.4);
        assert_relative_eq!(act.derive_from_output(y), 1.0 - y * y, epsilon = 1e-6);
    }
}
