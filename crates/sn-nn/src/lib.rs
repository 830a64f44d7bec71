// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

//! Layer chain, training driver, and gradient reduce for data-parallel
//! convolutional network training.
//!
//! Layers implement the [`Layer`] protocol (`init_weights` → `forward` →
//! `set_delta`/`gradient`/`derive_delta` → `update`) over the 4-axis tensors
//! from `sn-tensor`. [`Network::fit`] runs the round: a parallel map phase
//! produces per-sample gradient snapshots, a single-owner [`Accumulator`]
//! folds and averages them, and each layer applies the averaged gradient
//! exactly once before the next round begins.

pub mod accumulator;
pub mod activation;
pub mod dataset;
pub mod io;
pub mod layer;
pub mod layers;
pub mod network;

pub use accumulator::Accumulator;
pub use activation::Activation;
pub use dataset::{Dataset, Sample};
pub use layer::{Layer, LayerShape};
pub use layers::{Convolution, FullyConnected, MaxPooling};
pub use network::{EpochStats, Network, TrainConfig};
pub use sn_tensor::{Tensor, TensorError, TensorResult, Weight};
