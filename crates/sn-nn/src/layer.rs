// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

use sn_tensor::{Tensor, TensorResult, Weight};

/// Spatial shape threaded through layer wiring: `[rows, cols, channels]`.
pub type LayerShape = [usize; 3];

/// Uniform capability set every layer variant exposes.
///
/// The lifecycle is `init_weights` once, then per round `forward`, then the
/// backward trio `set_delta` / `gradient` / `derive_delta` in that order, and
/// finally `update` with an (averaged) gradient. Forward and delta caches are
/// single-slot: each round overwrites the previous one, and calling a
/// backward operation before the matching forward in the same round fails
/// with an explicit error instead of reading stale state.
///
/// Layers are `Send + Sync` so a worker can clone the whole stack via
/// [`Layer::clone_box`] and run forward/backward on its own copy; parameter
/// mutation only ever happens through `update` on the owning stack.
pub trait Layer: Send + Sync {
    /// Human-readable layer name used in error reports and logs.
    fn name(&self) -> &str;

    /// Allocates parameters for the given input shape and returns the shape
    /// this layer produces. Must be called exactly once before anything else.
    fn init_weights(&mut self, input: LayerShape) -> TensorResult<LayerShape>;

    /// Runs the forward pass, caching input and output for the backward pass.
    fn forward(&mut self, input: &Tensor) -> TensorResult<Tensor>;

    /// Converts the upstream gradient into this layer's local error by
    /// applying the configured activation derivative, and caches it.
    fn set_delta(&mut self, upstream: &Tensor) -> TensorResult<()>;

    /// Parameter gradient for the cached forward/delta pair, or `None` for
    /// parameterless layers.
    fn gradient(&self) -> TensorResult<Option<Weight>>;

    /// Error propagated to the previous layer, shaped like this layer's input.
    fn derive_delta(&self) -> TensorResult<Tensor>;

    /// Applies a gradient with the layer's own update rule.
    fn update(&mut self, gradient: &Weight, learning_rate: f32) -> TensorResult<()>;

    /// Snapshot of the layer parameters, or `None` for parameterless layers.
    fn state(&self) -> Option<Weight>;

    /// Restores parameters from a snapshot taken by [`Layer::state`].
    fn load_state(&mut self, state: Weight) -> TensorResult<()>;

    /// Deep copy behind trait-object dispatch.
    fn clone_box(&self) -> Box<dyn Layer>;
}

impl Clone for Box<dyn Layer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Single-slot forward/backward buffers shared by the layer variants.
#[derive(Clone, Debug, Default)]
pub(crate) struct RoundCache {
    pub input: Option<Tensor>,
    pub output: Option<Tensor>,
    pub delta: Option<Tensor>,
}

impl RoundCache {
    /// Starts a fresh round: stores the forward pair and drops any delta
    /// left over from the previous round.
    pub fn store_forward(&mut self, input: Tensor, output: Tensor) {
        self.input = Some(input);
        self.output = Some(output);
        self.delta = None;
    }
}
