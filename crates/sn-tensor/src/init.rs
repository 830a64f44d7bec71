// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

//! Weight initialization and the flatten/unflatten shape contract.

use crate::matrix::Matrix;
use crate::tensor::Tensor;
use crate::{TensorError, TensorResult};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

/// Returns a deterministic RNG for the given seed, or an entropy-seeded one.
pub(crate) fn rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Initialization schemes selectable per layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InitScheme {
    /// All-zero content.
    Zeros,
    /// All-one content.
    Ones,
    /// Uniform samples in `[0, 1)`.
    Uniform,
    /// Gaussian(0, 1) samples scaled by 1/10, the reference weight policy.
    ScaledGaussian,
}

/// Seedable, scheme-selectable weight initializer.
///
/// The default reproduces the reference policy: standard Gaussian samples
/// scaled by 1/10, drawn from host entropy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightInit {
    scheme: InitScheme,
    seed: Option<u64>,
}

impl Default for WeightInit {
    fn default() -> Self {
        Self {
            scheme: InitScheme::ScaledGaussian,
            seed: None,
        }
    }
}

impl WeightInit {
    /// Creates an initializer with the given scheme and host-entropy seeding.
    pub fn new(scheme: InitScheme) -> Self {
        Self { scheme, seed: None }
    }

    /// Builder-style helper pinning the RNG seed for deterministic content.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Returns the configured scheme.
    pub fn scheme(&self) -> InitScheme {
        self.scheme
    }

    /// Fills a single matrix according to the configured scheme.
    pub fn matrix(&self, rows: usize, cols: usize) -> TensorResult<Matrix> {
        let mut rng = rng(self.seed);
        self.matrix_with(&mut rng, rows, cols)
    }

    /// Fills a 4-axis tensor according to the configured scheme; all slices
    /// draw from one RNG stream so a seeded initializer stays reproducible
    /// across the whole tensor.
    pub fn tensor(&self, dims: &[usize]) -> TensorResult<Tensor> {
        match self.scheme {
            InitScheme::Zeros => Tensor::zeros(dims),
            InitScheme::Ones => Tensor::ones(dims),
            InitScheme::Uniform => Tensor::rand(dims, self.seed),
            InitScheme::ScaledGaussian => Ok(Tensor::randn(dims, self.seed)?.mul_scalar(0.1)),
        }
    }

    fn matrix_with(&self, rng: &mut ChaCha8Rng, rows: usize, cols: usize) -> TensorResult<Matrix> {
        match self.scheme {
            InitScheme::Zeros => Matrix::zeros(rows, cols),
            InitScheme::Ones => Matrix::ones(rows, cols),
            InitScheme::Uniform => Matrix::from_fn(rows, cols, |_, _| rng.gen::<f32>()),
            InitScheme::ScaledGaussian => Matrix::from_fn(rows, cols, |_, _| {
                let sample: f32 = rng.sample(StandardNormal);
                sample * 0.1
            }),
        }
    }
}

/// Flattens an ordered matrix list into one column vector.
///
/// The output obeys `out[i * dim + j] = slices[i].data()[j]`, each matrix
/// contributing its native column-major storage order. This ordering is a
/// shape contract the fully-connected layer's flatten/unflatten pair relies
/// on and must not change.
pub fn flatten(slices: &[Matrix]) -> TensorResult<Matrix> {
    let first = slices.first().ok_or(TensorError::EmptyInput("flatten"))?;
    let dim = first.len();
    let mut data = Vec::with_capacity(slices.len() * dim);
    for slice in slices {
        if slice.shape() != first.shape() {
            return Err(TensorError::MatrixShapeMismatch {
                left: first.shape(),
                right: slice.shape(),
            });
        }
        data.extend_from_slice(slice.data());
    }
    Matrix::column(data)
}

/// Flattens a tensor's slices into one column vector.
pub fn flatten_tensor(tensor: &Tensor) -> TensorResult<Matrix> {
    flatten(tensor.slices())
}

/// Exact inverse of [`flatten_tensor`]: repacks a flat value array into a
/// tensor of the given shape. `flatten_tensor(&unflatten(v, dims)?)` yields
/// `v` again for any vector of the correct length.
pub fn unflatten(values: &[f32], dims: &[usize]) -> TensorResult<Tensor> {
    Tensor::from_vec(values.to_vec(), dims)
}
