use std::io;

use thiserror::Error;

use crate::graph::NeuronId;

/// Failures of the ownership lists in [`crate::arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArenaError {
    #[error("handle does not refer to a live element")]
    Stale,
    #[error("element is already in this list")]
    AlreadyPresent,
    #[error("element is owned by another list; transfer it explicitly")]
    OwnedElsewhere,
    #[error("anchor element is not in this list")]
    AnchorMissing,
    #[error("index {index} is out of range for a list of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("element is not in this list")]
    NotPresent,
    #[error("only an owning list can destroy its elements")]
    NotOwning,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Evaluation re-entered a neuron that was still being computed.
    #[error("cycle detected at neuron {0:?}")]
    Cycle(NeuronId),
    #[error("expected {expected} values, got {actual}")]
    BufferSize { expected: usize, actual: usize },
    #[error("expected {expected} weights, got {actual}")]
    WeightCount { expected: usize, actual: usize },
    #[error("unknown neuron {0:?}")]
    UnknownNeuron(NeuronId),
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("negative {what} count {value}")]
    NegativeCount { what: &'static str, value: i32 },
    #[error("a layered net needs at least 2 layers, file has {0}")]
    TooFewLayers(usize),
    #[error("{0} does not fit the 32-bit file format")]
    TooLarge(&'static str),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrainError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("genetic training needs at least 2 nets, have {0}")]
    PopulationTooSmall(usize),
    #[error("gene count mismatch: expected {expected}, got {actual}")]
    GeneCountMismatch { expected: usize, actual: usize },
    #[error("net shape {actual:?} does not match trainer shape {expected:?}")]
    Shape {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("invalid config: {0}")]
    Config(&'static str),
}
