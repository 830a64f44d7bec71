// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

use crate::activation::Activation;
use crate::layer::{Layer, LayerShape, RoundCache};
use sn_tensor::convolution::{correlate_full, correlate_valid, flip180};
use sn_tensor::{Matrix, Tensor, TensorError, TensorResult, Weight, WeightInit};

const DEFAULT_DECAY: f32 = 1e-5;

/// 2-D convolution layer: `num_filters` filters of `filter_rows ×
/// filter_cols`, one bias scalar per filter.
///
/// Forward runs a valid correlation of every input channel with the matching
/// filter slice, sums over channels, adds the bias and applies the configured
/// activation. The weight update carries momentum and weight decay; the bias
/// update deliberately carries decay but NO momentum term, an asymmetry
/// preserved from the reference update rule.
#[derive(Clone, Debug)]
pub struct Convolution {
    name: String,
    num_filters: usize,
    filter_rows: usize,
    filter_cols: usize,
    activation: Activation,
    momentum: f32,
    decay: f32,
    init: WeightInit,
    params: Option<Params>,
    cache: RoundCache,
}

#[derive(Clone, Debug)]
struct Params {
    /// Filter bank, shape `[num_filters, channels, filter_rows, filter_cols]`.
    weights: Tensor,
    bias: Vec<f32>,
    prev_delta_w: Tensor,
    prev_delta_b: Vec<f32>,
    input_shape: LayerShape,
}

impl Convolution {
    pub fn new(filter_rows: usize, filter_cols: usize, num_filters: usize) -> Self {
        Self {
            name: format!("conv{}x{}x{}", filter_rows, filter_cols, num_filters),
            num_filters,
            filter_rows,
            filter_cols,
            activation: Activation::Sigmoid,
            momentum: 0.0,
            decay: DEFAULT_DECAY,
            init: WeightInit::default(),
            params: None,
            cache: RoundCache::default(),
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_momentum(mut self, momentum: f32) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn with_decay(mut self, decay: f32) -> Self {
        self.decay = decay;
        self
    }

    pub fn with_init(mut self, init: WeightInit) -> Self {
        self.init = init;
        self
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Borrows the filter bank; fails before `init_weights`.
    pub fn weights(&self) -> TensorResult<&Tensor> {
        Ok(&self.params()?.weights)
    }

    /// Replaces the filter bank, keeping momentum buffers. Used by tests
    /// that pin weights to known values.
    pub fn set_weights(&mut self, weights: Tensor, bias: Vec<f32>) -> TensorResult<()> {
        let params = self.params_mut()?;
        if weights.shape() != params.weights.shape() {
            return Err(TensorError::ShapeMismatch {
                left: params.weights.shape(),
                right: weights.shape(),
            });
        }
        if bias.len() != params.bias.len() {
            return Err(TensorError::DataLength {
                expected: params.bias.len(),
                got: bias.len(),
            });
        }
        params.weights = weights;
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

    fn channels(&self) -> TensorResult<usize> {
        Ok(self.params()?.input_shape[2])
    }
}

impl Layer for Convolution {
    fn name(&self) -> &str {
        &self.name
    }

    fn init_weights(&mut self, input: LayerShape) -> TensorResult<LayerShape> {
        let [rows, cols, channels] = input;
        if rows < self.filter_rows || cols < self.filter_cols {
            return Err(TensorError::FilterTooLarge {
                input: (rows, cols),
                filter: (self.filter_rows, self.filter_cols),
            });
        }
        let dims = [self.num_filters, channels, self.filter_rows, self.filter_cols];
        let weights = self.init.tensor(&dims)?;
        let prev_delta_w = Tensor::zeros(&dims)?;
        self.params = Some(Params {
            weights,
            bias: vec![0.0; self.num_filters],
            prev_delta_w,
            prev_delta_b: vec![0.0; self.num_filters],
            input_shape: input,
        });
        Ok([
            rows - self.filter_rows + 1,
            cols - self.filter_cols + 1,
            self.num_filters,
        ])
    }

    fn forward(&mut self, input: &Tensor) -> TensorResult<Tensor> {
        let channels = self.channels()?;
        let params = self.params()?;
        let [rows, cols, _] = params.input_shape;
        if input.slice_count() != channels || input.rows() != rows || input.cols() != cols {
            return Err(TensorError::ShapeMismatch {
                left: [1, channels, rows, cols],
                right: input.shape(),
            });
        }
        let out_rows = input.rows() - self.filter_rows + 1;
        let out_cols = input.cols() - self.filter_cols + 1;
        let mut slices = Vec::with_capacity(self.num_filters);
        for filter in 0..self.num_filters {
            let mut acc = Matrix::zeros(out_rows, out_cols)?;
            for channel in 0..channels {
                let correlated =
                    correlate_valid(input.slice_flat(channel), params.weights.slice(filter, channel))?;
                acc.addi(&correlated)?;
            }
            acc.addi_scalar(params.bias[filter]);
            slices.push(self.activation.apply_matrix(&acc));
        }
        let output = Tensor::from_slices(slices, self.num_filters, 1)?;
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
        let params = self.params()?;
        let input = self.cache.input.as_ref().ok_or_else(|| self.stale())?;
        let delta = self.cache.delta.as_ref().ok_or_else(|| self.stale())?;
        let channels = params.input_shape[2];
        let mut slices = Vec::with_capacity(self.num_filters * channels);
        let mut grad_b = Vec::with_capacity(self.num_filters);
        for filter in 0..self.num_filters {
            let local = delta.slice_flat(filter);
            for channel in 0..channels {
                slices.push(correlate_valid(input.slice_flat(channel), local)?);
            }
            grad_b.push(local.sum());
        }
        let grad_w = Tensor::from_slices(slices, self.num_filters, channels)?;
        Ok(Some(Weight::new(grad_w, grad_b)))
    }

    fn derive_delta(&self) -> TensorResult<Tensor> {
        let params = self.params()?;
        let delta = self.cache.delta.as_ref().ok_or_else(|| self.stale())?;
        let [rows, cols, channels] = params.input_shape;
        let mut slices = Vec::with_capacity(channels);
        for channel in 0..channels {
            let mut acc = Matrix::zeros(rows, cols)?;
            for filter in 0..self.num_filters {
                let flipped = flip180(params.weights.slice(filter, channel))?;
                acc.addi(&correlate_full(delta.slice_flat(filter), &flipped)?)?;
            }
            slices.push(acc);
        }
        Tensor::from_slices(slices, channels, 1)
    }

    fn update(&mut self, gradient: &Weight, learning_rate: f32) -> TensorResult<()> {
        let momentum = self.momentum;
        let decay = self.decay;
        let params = self.params_mut()?;
        // prevDeltaW = momentum*prevDeltaW + lr*decay*W + lr*gradW
        params.prev_delta_w.muli_scalar(momentum);
        params
            .prev_delta_w
            .addi(&params.weights.mul_scalar(learning_rate * decay))?;
        params
            .prev_delta_w
            .addi(&gradient.w().mul_scalar(learning_rate))?;
        params.weights.subi(&params.prev_delta_w)?;
        if gradient.b().len() != params.bias.len() {
            return Err(TensorError::DataLength {
                expected: params.bias.len(),
                got: gradient.b().len(),
            });
        }
        // Bias step: decay but no momentum.
        for (i, bias) in params.bias.iter_mut().enumerate() {
            params.prev_delta_b[i] = (gradient.b()[i] + *bias * decay) * learning_rate;
            *bias -= params.prev_delta_b[i];
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
