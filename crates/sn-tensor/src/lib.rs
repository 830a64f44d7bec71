// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

//! Dense 4-axis tensors and the 2-D correlation primitives built on them.
//!
//! A [`Tensor`] is a `[kernels, channels, rows, cols]` stack of column-major
//! matrix slices. Everything the layer crate needs lives here: elementwise
//! and matrix arithmetic with explicit shape checking, valid/full
//! correlation with 180-degree filter flips, seedable weight initialization,
//! and the flatten/unflatten contract that bridges spatial maps to
//! fully-connected columns.

pub mod convolution;
pub mod error;
pub mod init;
pub mod matrix;
pub mod tensor;
pub mod weight;

pub use convolution::{correlate_full, correlate_valid, flip180};
pub use error::{TensorError, TensorResult};
pub use init::{flatten, flatten_tensor, unflatten, InitScheme, WeightInit};
pub use matrix::Matrix;
pub use tensor::{Shape, Tensor};
pub use weight::Weight;
