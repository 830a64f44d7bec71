// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

//! Checkpointing: network parameter snapshots to JSON or bincode files.

use crate::network::Network;
use serde::{Deserialize, Serialize};
use sn_tensor::{unflatten, TensorError, TensorResult, Weight};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredWeight {
    dims: [usize; 4],
    values: Vec<f32>,
    bias: Vec<f32>,
}

impl StoredWeight {
    fn from_weight(weight: &Weight) -> StoredWeight {
        StoredWeight {
            dims: weight.w().shape(),
            values: weight.w().to_array(),
            bias: weight.b().to_vec(),
        }
    }

    fn into_weight(self) -> TensorResult<Weight> {
        Ok(Weight::new(unflatten(&self.values, &self.dims)?, self.bias))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct NetworkSnapshot {
    layers: Vec<Option<StoredWeight>>,
}

fn to_snapshot(network: &Network) -> NetworkSnapshot {
    NetworkSnapshot {
        layers: network
            .state()
            .iter()
            .map(|state| state.as_ref().map(StoredWeight::from_weight))
            .collect(),
    }
}

fn apply_snapshot(network: &mut Network, snapshot: NetworkSnapshot) -> TensorResult<()> {
    let mut state = Vec::with_capacity(snapshot.layers.len());
    for stored in snapshot.layers {
        state.push(stored.map(StoredWeight::into_weight).transpose()?);
    }
    network.load_state(state)
}

fn io_error(err: std::io::Error) -> TensorError {
    TensorError::IoError {
        message: err.to_string(),
    }
}

/// Writes the network parameters as pretty-printed JSON.
pub fn save_json<P: AsRef<Path>>(network: &Network, path: P) -> TensorResult<()> {
    let file = File::create(path).map_err(io_error)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &to_snapshot(network)).map_err(|err| {
        TensorError::SerializationError {
            message: err.to_string(),
        }
    })
}

/// Restores parameters previously written by [`save_json`] into an
/// already-wired network of the same architecture.
pub fn load_json<P: AsRef<Path>>(network: &mut Network, path: P) -> TensorResult<()> {
    let file = File::open(path).map_err(io_error)?;
    let snapshot: NetworkSnapshot =
        serde_json::from_reader(BufReader::new(file)).map_err(|err| {
            TensorError::SerializationError {
                message: err.to_string(),
            }
        })?;
    apply_snapshot(network, snapshot)
}

/// Writes the network parameters in the compact bincode format.
pub fn save_bincode<P: AsRef<Path>>(network: &Network, path: P) -> TensorResult<()> {
    let file = File::create(path).map_err(io_error)?;
    bincode::serialize_into(BufWriter::new(file), &to_snapshot(network)).map_err(|err| {
        TensorError::SerializationError {
            message: err.to_string(),
        }
    })
}

/// Restores parameters previously written by [`save_bincode`].
pub fn load_bincode<P: AsRef<Path>>(network: &mut Network, path: P) -> TensorResult<()> {
    let file = File::open(path).map_err(io_error)?;
    let snapshot: NetworkSnapshot =
        bincode::deserialize_from(BufReader::new(file)).map_err(|err| {
            TensorError::SerializationError {
                message: err.to_string(),
            }
        })?;
    apply_snapshot(network, snapshot)
}
