// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

use crate::accumulator::Accumulator;
use crate::dataset::{Dataset, Sample};
use crate::layer::{Layer, LayerShape};
use rayon::prelude::*;
use sn_tensor::{Tensor, TensorError, TensorResult, Weight};
use tracing::{debug, info};

/// Per-round training configuration supplied by the caller.
#[derive(Clone, Copy, Debug)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    /// Base seed for the per-epoch shuffle; `None` draws from host entropy.
    pub shuffle_seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 1,
            batch_size: 1,
            learning_rate: 0.1,
            shuffle_seed: None,
        }
    }
}

/// Summary of one training epoch.
#[derive(Clone, Copy, Debug)]
pub struct EpochStats {
    pub epoch: usize,
    pub batches: usize,
    pub mean_loss: f32,
}

/// Ordered layer chain plus the training round driver.
///
/// `fit` runs the data-parallel round: workers clone the layer stack, each
/// computes a gradient snapshot for one sample of the minibatch, and the
/// snapshots converge on one [`Accumulator`] folded sequentially on the
/// calling thread. The averaged gradient is applied once per layer, after
/// which the next batch starts from the updated weights — weight
/// redistribution falls out of the workers recloning the stack.
#[derive(Clone, Default)]
pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    input_shape: Option<LayerShape>,
    output_shape: Option<LayerShape>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer. Invalidates any previous wiring; call [`Network::init`]
    /// again before training.
    pub fn add_layer(&mut self, layer: impl Layer + 'static) -> &mut Self {
        self.layers.push(Box::new(layer));
        self.input_shape = None;
        self.output_shape = None;
        self
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Wires the chain: runs `init_weights` through every layer in order and
    /// returns the final output shape.
    pub fn init(&mut self, input: LayerShape) -> TensorResult<LayerShape> {
        if self.layers.is_empty() {
            return Err(TensorError::EmptyInput("network"));
        }
        let mut shape = input;
        for layer in &mut self.layers {
            shape = layer.init_weights(shape)?;
        }
        self.input_shape = Some(input);
        self.output_shape = Some(shape);
        Ok(shape)
    }

    fn require_init(&self) -> TensorResult<()> {
        if self.input_shape.is_none() {
            return Err(TensorError::Uninitialized {
                layer: "network".to_owned(),
            });
        }
        Ok(())
    }

    /// Forward pass only, on a scratch copy of the layer stack.
    pub fn predict(&self, data: &Tensor) -> TensorResult<Tensor> {
        self.require_init()?;
        let mut layers = self.layers.clone();
        let mut value = data.dup();
        for layer in &mut layers {
            value = layer.forward(&value)?;
        }
        Ok(value)
    }

    /// Fraction of samples whose predicted argmax matches the label argmax.
    pub fn evaluate(&self, samples: &[Sample]) -> TensorResult<f32> {
        if samples.is_empty() {
            return Err(TensorError::EmptyInput("evaluate"));
        }
        let mut correct = 0usize;
        for sample in samples {
            let output = self.predict(&sample.data)?;
            if argmax(&output) == argmax(&sample.label) {
                correct += 1;
            }
        }
        Ok(correct as f32 / samples.len() as f32)
    }

    /// Trains over the dataset for the configured number of epochs.
    pub fn fit(&mut self, dataset: &mut Dataset, config: &TrainConfig) -> TensorResult<Vec<EpochStats>> {
        self.require_init()?;
        if dataset.is_empty() {
            return Err(TensorError::EmptyInput("fit"));
        }
        let mut stats = Vec::with_capacity(config.epochs);
        for epoch in 0..config.epochs {
            dataset.shuffle(config.shuffle_seed.map(|s| s.wrapping_add(epoch as u64)));
            let mut epoch_loss = 0.0f32;
            let mut batches = 0usize;
            for batch in dataset.minibatches(config.batch_size) {
                // Map phase: each worker runs forward/backward on its own
                // copy of the current weights.
                let snapshots = batch
                    .par_iter()
                    .map(|sample| {
                        let mut layers = self.layers.clone();
                        sample_gradients(&mut layers, sample)
                    })
                    .collect::<TensorResult<Vec<_>>>()?;
                // Reduce phase: one owner folds every snapshot, then the
                // averaged gradient is applied exactly once per layer.
                let mut accumulator = Accumulator::new(self.layers.len());
                for (gradients, loss) in snapshots {
                    accumulator.accumulate(gradients)?;
                    epoch_loss += loss;
                }
                debug!(batch = batches, contributions = accumulator.count(), "reduced gradients");
                let averaged = accumulator.average()?;
                for (layer, gradient) in self.layers.iter_mut().zip(averaged) {
                    if let Some(gradient) = gradient {
                        layer.update(&gradient, config.learning_rate)?;
                    }
                }
                batches += 1;
            }
            let mean_loss = epoch_loss / dataset.len() as f32;
            info!(epoch, batches, mean_loss, "epoch finished");
            stats.push(EpochStats {
                epoch,
                batches,
                mean_loss,
            });
        }
        Ok(stats)
    }

    /// Per-layer parameter snapshots in chain order.
    pub fn state(&self) -> Vec<Option<Weight>> {
        self.layers.iter().map(|layer| layer.state()).collect()
    }

    /// Restores parameters captured by [`Network::state`].
    pub fn load_state(&mut self, state: Vec<Option<Weight>>) -> TensorResult<()> {
        if state.len() != self.layers.len() {
            return Err(TensorError::LayerCountMismatch {
                expected: self.layers.len(),
                got: state.len(),
            });
        }
        for (layer, snapshot) in self.layers.iter_mut().zip(state) {
            match snapshot {
                Some(snapshot) => layer.load_state(snapshot)?,
                None if layer.state().is_some() => {
                    return Err(TensorError::MissingParameter {
                        name: layer.name().to_owned(),
                    });
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// One worker unit: forward chain, squared-error loss, reverse backward
/// chain, gradients collected in layer order.
fn sample_gradients(
    layers: &mut [Box<dyn Layer>],
    sample: &Sample,
) -> TensorResult<(Vec<Option<Weight>>, f32)> {
    let mut value = sample.data.dup();
    for layer in layers.iter_mut() {
        value = layer.forward(&value)?;
    }
    let error = value.sub(&sample.label)?;
    let loss = 0.5 * error.mul(&error)?.sum();
    let mut gradients = vec![None; layers.len()];
    let mut delta = error;
    for index in (0..layers.len()).rev() {
        layers[index].set_delta(&delta)?;
        gradients[index] = layers[index].gradient()?;
        if index > 0 {
            delta = layers[index].derive_delta()?;
        }
    }
    Ok((gradients, loss))
}

fn argmax(t: &Tensor) -> usize {
    let values = t.to_array();
    let mut best = 0usize;
    for (index, value) in values.iter().enumerate() {
        if *value > values[best] {
            best = index;
        }
    }
    best
}
