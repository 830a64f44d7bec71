// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sn_tensor::Tensor;

/// One labelled training example: an input tensor of fixed
/// `(channels, rows, cols)` shape plus a label column vector.
#[derive(Clone, Debug)]
pub struct Sample {
    pub data: Tensor,
    pub label: Tensor,
}

impl Sample {
    pub fn new(data: Tensor, label: Tensor) -> Self {
        Self { data, label }
    }
}

/// In-memory sample collection with deterministic shuffling and minibatch
/// chunking. Loading samples from files or distributed storage is the
/// caller's concern.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Shuffles the sample order in place; a fixed seed gives a
    /// reproducible permutation.
    pub fn shuffle(&mut self, seed: Option<u64>) {
        let mut rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        self.samples.shuffle(&mut rng);
    }

    /// Iterates over minibatches of at most `size` samples; the final batch
    /// may be smaller.
    pub fn minibatches(&self, size: usize) -> impl Iterator<Item = &[Sample]> {
        self.samples.chunks(size.max(1))
    }
}
