// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

use crate::layer::{Layer, LayerShape};
use sn_tensor::{Matrix, Tensor, TensorError, TensorResult, Weight};

/// Non-overlapping max pooling over a square window.
///
/// Parameterless: forward records the argmax position of every window and
/// backward routes the delta to those positions, zero elsewhere. Trailing
/// rows/cols that do not fill a whole window are dropped (floor division).
#[derive(Clone, Debug)]
pub struct MaxPooling {
    name: String,
    window: usize,
    input_shape: Option<LayerShape>,
    cache: Option<PoolCache>,
}

#[derive(Clone, Debug)]
struct PoolCache {
    /// Per slice, per output position (row-major): the input `(row, col)`
    /// that won the max.
    argmax: Vec<Vec<(usize, usize)>>,
    out_rows: usize,
    out_cols: usize,
    delta: Option<Tensor>,
}

impl MaxPooling {
    pub fn new(window: usize) -> Self {
        Self {
            name: format!("maxpool{}", window),
            window,
            input_shape: None,
            cache: None,
        }
    }

    fn stale(&self) -> TensorError {
        TensorError::StaleBackward {
            layer: self.name.clone(),
        }
    }

    fn shape(&self) -> TensorResult<LayerShape> {
        self.input_shape.ok_or_else(|| TensorError::Uninitialized {
            layer: self.name.clone(),
        })
    }
}

impl Layer for MaxPooling {
    fn name(&self) -> &str {
        &self.name
    }

    fn init_weights(&mut self, input: LayerShape) -> TensorResult<LayerShape> {
        let [rows, cols, channels] = input;
        if rows < self.window || cols < self.window {
            return Err(TensorError::FilterTooLarge {
                input: (rows, cols),
                filter: (self.window, self.window),
            });
        }
        self.input_shape = Some(input);
        Ok([rows / self.window, cols / self.window, channels])
    }

    fn forward(&mut self, input: &Tensor) -> TensorResult<Tensor> {
        let [rows, cols, channels] = self.shape()?;
        if input.slice_count() != channels || input.rows() != rows || input.cols() != cols {
            return Err(TensorError::ShapeMismatch {
                left: [1, channels, rows, cols],
                right: input.shape(),
            });
        }
        let out_rows = rows / self.window;
        let out_cols = cols / self.window;
        let mut slices = Vec::with_capacity(channels);
        let mut argmax = Vec::with_capacity(channels);
        for channel in 0..channels {
            let plane = input.slice_flat(channel);
            let mut out = Matrix::zeros(out_rows, out_cols)?;
            let mut winners = Vec::with_capacity(out_rows * out_cols);
            for or in 0..out_rows {
                for oc in 0..out_cols {
                    let mut best = f32::NEG_INFINITY;
                    let mut best_at = (or * self.window, oc * self.window);
                    for dr in 0..self.window {
                        for dc in 0..self.window {
                            let (r, c) = (or * self.window + dr, oc * self.window + dc);
                            let value = plane.get(r, c);
                            if value > best {
                                best = value;
                                best_at = (r, c);
                            }
                        }
                    }
                    out.set(or, oc, best);
                    winners.push(best_at);
                }
            }
            slices.push(out);
            argmax.push(winners);
        }
        self.cache = Some(PoolCache {
            argmax,
            out_rows,
            out_cols,
            delta: None,
        });
        Tensor::from_slices(slices, channels, 1)
    }

    fn set_delta(&mut self, upstream: &Tensor) -> TensorResult<()> {
        let stale = self.stale();
        let cache = self.cache.as_mut().ok_or(stale)?;
        if upstream.slice_count() != cache.argmax.len()
            || upstream.rows() != cache.out_rows
            || upstream.cols() != cache.out_cols
        {
            return Err(TensorError::ShapeMismatch {
                left: [1, cache.argmax.len(), cache.out_rows, cache.out_cols],
                right: upstream.shape(),
            });
        }
        // No activation, so the local error is the upstream gradient as-is.
        cache.delta = Some(upstream.dup());
        Ok(())
    }

    fn gradient(&self) -> TensorResult<Option<Weight>> {
        Ok(None)
    }

    fn derive_delta(&self) -> TensorResult<Tensor> {
        let [rows, cols, channels] = self.shape()?;
        let cache = self.cache.as_ref().ok_or_else(|| self.stale())?;
        let delta = cache.delta.as_ref().ok_or_else(|| self.stale())?;
        let mut slices = Vec::with_capacity(channels);
        for channel in 0..channels {
            let mut routed = Matrix::zeros(rows, cols)?;
            let upstream = delta.slice_flat(channel);
            for (index, &(r, c)) in cache.argmax[channel].iter().enumerate() {
                let or = index / cache.out_cols;
                let oc = index % cache.out_cols;
                routed.set(r, c, upstream.get(or, oc));
            }
            slices.push(routed);
        }
        Tensor::from_slices(slices, channels, 1)
    }

    fn update(&mut self, _gradient: &Weight, _learning_rate: f32) -> TensorResult<()> {
        Ok(())
    }

    fn state(&self) -> Option<Weight> {
        None
    }

    fn load_state(&mut self, _state: Weight) -> TensorResult<()> {
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}
