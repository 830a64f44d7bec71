// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

//! Layer variants dispatched through the [`crate::Layer`] trait.

mod convolution;
mod fully_connected;
mod pooling;

pub use convolution::Convolution;
pub use fully_connected::FullyConnected;
pub use pooling::MaxPooling;
