// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

use crate::activation::Activation;
use crate::layer::{Layer, LayerShape, RoundCache};
use sn_tensor::{flatten_tensor, unflatten, Matrix, Tensor, TensorError, TensorResult, Weight, WeightInit};

const BIAS_INIT: f32 = 0.1;

/// Dense layer over the flattened input: `out = activation(W · flatten(x) + b)`.
///
/// `flatten` walks the input's column-major storage order and `derive_delta`
/// repacks through the exact inverse, so
/// `flatten(unflatten(v)) == v` holds for every vector of the right length.
/// Updates are plain gradient steps; neither momentum nor decay applies here.
#[derive(Clone, Debug)]
pub struct FullyConnected {
    name: String,
    num_outputs: usize,
    activation: Activation,
    init: WeightInit,
    params: Option<Params>,
    cache: RoundCache,
}

#[derive(Clone, Debug)]
struct Params {
    /// Single-slice tensor of shape `[1, 1, num_outputs, dim_in]`.
    weights: Tensor,
    bias: Vec<f32>,
    input_shape: LayerShape,
}

impl FullyConnected {
    pub fn new(num_outputs: usize) -> Self {
        Self {
            name: format!("dense{}", num_outputs),
            num_outputs,
            activation: Activation::Sigmoid,
            init: WeightInit::default(),
            params: None,
            cache: RoundCache::default(),
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_init(mut self, init: WeightInit) -> Self {
        self.init = init;
        self
    }

    /// Borrows the weight matrix; fails before `init_weights`.
    pub fn weights(&self) -> TensorResult<&Matrix> {
        Ok(self.params()?.weights.slice(0, 0))
    }

    /// Replaces the weight matrix and bias. Used by tests that pin
    /// parameters to known values.
    pub fn set_weights(&mut self, weights: Matrix, bias: Vec<f32>) -> TensorResult<()> {
        let num_outputs = self.num_outputs;
        let params = self.params_mut()?;
        let expected = params.weights.slice(0, 0).shape();
        if weights.shape() != expected {
            return Err(TensorError::MatrixShapeMismatch {
                left: expected,
                right: weights.shape(),
            });
        }
        if bias.len() != num_outputs {
            return Err(TensorError::DataLength {
                expected: num_outputs,
                got: bias.len(),
            });
        }
        params.weights = Tensor::from_slices(vec![weights], 1, 1)?;
        params.bias = bias;
        Ok(())
    }

    fn params(&self) -> TensorResult<&Params> {
        self.params.as_ref().ok_or_else(|| TensorError::Uninitialized {
            layer: self.name.clone(),
        })
    }

    fn params_mut(&mut self) -> TensorResult<&mut Params> {
        let name = self.name.clone();
        self.params
            .as_mut()
            .ok_or(TensorError::Uninitialized { layer: name })
    }

    fn stale(&self) -> TensorError {
        TensorError::StaleBackward {
            layer: self.name.clone(),
        }
    }
}

impl Layer for FullyConnected {
    fn name(&self) -> &str {
        &self.name
    }

    fn init_weights(&mut self, input: LayerShape) -> TensorResult<LayerShape> {
        let [rows, cols, channels] = input;
        let dim_in = rows * cols * channels;
        let weights = self.init.tensor(&[1, 1, self.num_outputs, dim_in])?;
        self.params = Some(Params {
            weights,
            bias: vec![BIAS_INIT; self.num_outputs],
            input_shape: input,
        });
        Ok([self.num_outputs, 1, 1])
    }

    fn forward(&mut self, input: &Tensor) -> TensorResult<Tensor> {
        let num_outputs = self.num_outputs;
        let activation = self.activation;
        let params = self.params()?;
        let x = flatten_tensor(input)?;
        let mut pre = params.weights.slice(0, 0).mmul(&x)?;
        for row in 0..num_outputs {
            let value = pre.get(row, 0) + params.bias[row];
            pre.set(row, 0, value);
        }
        let out = activation.apply_matrix(&pre);
        let output = Tensor::from_slices(vec![out], 1, 1)?;
        self.cache.store_forward(input.dup(), output.dup());
        Ok(output)
    }

    fn set_delta(&mut self, upstream: &Tensor) -> TensorResult<()> {
        let output = self.cache.output.as_ref().ok_or_else(|| self.stale())?;
        let local = upstream.mul(&self.activation.derive_tensor(output)?)?;
        self.cache.delta = Some(local);
        Ok(())
    }

    fn gradient(&self) -> TensorResult<Option<Weight>> {
        let input = self.cache.input.as_ref().ok_or_else(|| self.stale())?;
        let delta = self.cache.delta.as_ref().ok_or_else(|| self.stale())?;
        let x = flatten_tensor(input)?;
        let local = delta.slice(0, 0);
        // Outer product: (out x 1) * (1 x in).
        let grad_w = local.mmul(&x.transpose())?;
        let grad_b = local.data().to_vec();
        Ok(Some(Weight::new(
            Tensor::from_slices(vec![grad_w], 1, 1)?,
            grad_b,
        )))
    }

    fn derive_delta(&self) -> TensorResult<Tensor> {
        let params = self.params()?;
        let delta = self.cache.delta.as_ref().ok_or_else(|| self.stale())?;
        let propagated = params.weights.slice(0, 0).transpose().mmul(delta.slice(0, 0))?;
        let [rows, cols, channels] = params.input_shape;
        // Kernel axis carries the channel count, matching the layout the
        // convolution and pooling layers emit and consume.
        unflatten(propagated.data(), &[channels, 1, rows, cols])
    }

    fn update(&mut self, gradient: &Weight, learning_rate: f32) -> TensorResult<()> {
        let params = self.params_mut()?;
        params
            .weights
            .subi(&gradient.w().mul_scalar(learning_rate))?;
        if gradient.b().len() != params.bias.len() {
            return Err(TensorError::DataLength {
                expected: params.bias.len(),
                got: gradient.b().len(),
            });
        }
        for (bias, grad) in params.bias.iter_mut().zip(gradient.b().iter()) {
            *bias -= learning_rate * grad;
        }
        Ok(())
    }

    fn state(&self) -> Option<Weight> {
        self.params
            .as_ref()
            .map(|p| Weight::new(p.weights.dup(), p.bias.clone()))
    }

    fn load_state(&mut self, state: Weight) -> TensorResult<()> {
        let params = self.params_mut()?;
        if state.w().shape() != params.weights.shape() {
            return Err(TensorError::ShapeMismatch {
                left: params.weights.shape(),
                right: state.w().shape(),
            });
        }
        if state.b().len() != params.bias.len() {
            return Err(TensorError::DataLength {
                expected: params.bias.len(),
                got: state.b().len(),
            });
        }
        params.weights = state.w().dup();
        params.bias = state.b().to_vec();
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn identity_layer(dim: usize) -> FullyConnected {
        let mut layer = FullyConnected::new(dim).with_activation(Activation::Identity);
        layer.init_weights([dim, 1, 1]).unwrap();
        let eye = Matrix::from_fn(dim, dim, |r, c| if r == c { 1.0 } else { 0.0 }).unwrap();
        layer.set_weights(eye, vec![0.0; dim]).unwrap();
        layer
    }

    #[test]
    fn identity_weights_reproduce_flattened_input() {
        let mut layer = FullyConnected::new(4).with_activation(Activation::Identity);
        layer.init_weights([2, 2, 1]).unwrap();
        let eye = Matrix::from_fn(4, 4, |r, c| if r == c { 1.0 } else { 0.0 }).unwrap();
        layer.set_weights(eye, vec![0.0; 4]).unwrap();
        let input = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        let out = layer.forward(&input).unwrap();
        assert_eq!(out.shape(), [1, 1, 4, 1]);
        assert_eq!(out.to_array(), input.to_array());
    }

    #[test]
    fn derive_delta_emits_channels_on_the_kernel_axis() {
        let mut layer = FullyConnected::new(3).with_activation(Activation::Identity);
        layer.init_weights([2, 2, 2]).unwrap();
        // Two-channel input the way an upstream layer delivers it.
        let input = Tensor::randn(&[2, 1, 2, 2], Some(11)).unwrap();
        layer.forward(&input).unwrap();
        layer
            .set_delta(&Tensor::ones(&[1, 1, 3, 1]).unwrap())
            .unwrap();
        let propagated = layer.derive_delta().unwrap();
        assert_eq!(propagated.shape(), input.shape());
        assert_eq!(propagated.slice_count(), input.slice_count());
    }

    #[test]
    fn gradient_is_outer_product_of_delta_and_input() {
        let mut layer = identity_layer(2);
        let input = Tensor::from_vec(vec![3.0, 5.0], &[2, 1]).unwrap();
        layer.forward(&input).unwrap();
        let upstream = Tensor::from_vec(vec![1.0, -2.0], &[1, 1, 2, 1]).unwrap();
        layer.set_delta(&upstream).unwrap();
        let grad = layer.gradient().unwrap().unwrap();
        let w = grad.w().slice(0, 0);
        assert_relative_eq!(w.get(0, 0), 3.0);
        assert_relative_eq!(w.get(0, 1), 5.0);
        assert_relative_eq!(w.get(1, 0), -6.0);
        assert_relative_eq!(w.get(1, 1), -10.0);
        assert_relative_eq!(grad.b()[0], 1.0);
        assert_relative_eq!(grad.b()[1], -2.0);
    }

    #[test]
    fn update_steps_against_gradient() {
        let mut layer = identity_layer(2);
        let grad = Weight::new(
            Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0], &[1, 1, 2, 2]).unwrap(),
            vec![1.0, 1.0],
        );
        layer.update(&grad, 0.1).unwrap();
        assert_relative_eq!(layer.weights().unwrap().get(0, 0), 0.9);
        assert_relative_eq!(layer.weights().unwrap().get(1, 0), 0.0);
    }

    #[test]
    fn backward_before_forward_is_rejected() {
        let mut layer = identity_layer(2);
        assert!(matches!(
            layer.derive_delta(),
            Err(TensorError::StaleBackward { .. })
        ));
    }
}
