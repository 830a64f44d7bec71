// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

use sn_tensor::{TensorError, TensorResult, Weight};

/// Reduce-step object summing per-layer gradient snapshots from independent
/// work units and averaging them on demand.
///
/// The layer count is fixed at construction; every `accumulate` call must
/// carry one complete, atomic set of per-layer gradients (`None` for
/// parameterless layers). Calls are not internally synchronized: concurrent
/// producers must funnel their snapshots through a single owner of the
/// accumulator, which is what [`crate::Network::fit`] does after its
/// parallel map phase.
#[derive(Clone, Debug)]
pub struct Accumulator {
    sums: Vec<Option<Weight>>,
    counter: usize,
}

impl Accumulator {
    /// Creates an empty accumulator for a chain of `num_layers` layers.
    pub fn new(num_layers: usize) -> Self {
        Self {
            sums: vec![None; num_layers],
            counter: 0,
        }
    }

    /// Number of layers this accumulator reduces over.
    pub fn num_layers(&self) -> usize {
        self.sums.len()
    }

    /// Contributions folded in since construction or the last [`clear`].
    ///
    /// [`clear`]: Accumulator::clear
    pub fn count(&self) -> usize {
        self.counter
    }

    /// Folds one complete per-layer gradient set into the running sums.
    pub fn accumulate(&mut self, gradients: Vec<Option<Weight>>) -> TensorResult<()> {
        if gradients.len() != self.sums.len() {
            return Err(TensorError::LayerCountMismatch {
                expected: self.sums.len(),
                got: gradients.len(),
            });
        }
        // The first contribution fixes which slots carry gradients; later
        // sets must agree, otherwise the average would divide a partial sum
        // by the full counter. Checked up front so a rejected set leaves
        // the running sums untouched.
        if self.counter > 0 {
            for (layer, (sum, gradient)) in self.sums.iter().zip(gradients.iter()).enumerate() {
                if sum.is_some() != gradient.is_some() {
                    return Err(TensorError::InconsistentGradientSet { layer });
                }
            }
        }
        for (sum, gradient) in self.sums.iter_mut().zip(gradients) {
            match (sum.as_mut(), gradient) {
                (Some(sum), Some(gradient)) => sum.addi(&gradient)?,
                (None, Some(gradient)) => *sum = Some(gradient),
                (_, None) => {}
            }
        }
        self.counter += 1;
        Ok(())
    }

    /// Per-layer average of everything accumulated so far. Non-destructive.
    ///
    /// Fails with [`TensorError::EmptyAccumulator`] when nothing has been
    /// contributed yet; callers decide whether an empty round is an error
    /// or simply skipped.
    pub fn average(&self) -> TensorResult<Vec<Option<Weight>>> {
        if self.counter == 0 {
            return Err(TensorError::EmptyAccumulator);
        }
        let scale = 1.0 / self.counter as f32;
        Ok(self
            .sums
            .iter()
            .map(|sum| sum.as_ref().map(|w| w.mul_scalar(scale)))
            .collect())
    }

    /// Resets every running sum and the contribution counter.
    pub fn clear(&mut self) {
        for sum in &mut self.sums {
            *sum = None;
        }
        self.counter = 0;
    }
}
