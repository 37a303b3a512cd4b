//! # neuronet
//!
//! A small feed-forward neural network engine with two ways to search for
//! weights: backpropagation and a genetic algorithm.
//!
//! Neurons and synapses live in one [`graph::Graph`] arena and are addressed
//! by generation-checked handles. Layers and whole nets share the
//! [`group::Group`] capability, so a net can be nested inside another one.
//!
//! ## Quick Start
//!
//! ```
//! use neuronet::prelude::*;
//!
//! let mut net = LayeredNet::new(2, 1).unwrap();
//! net.add_layer(3).unwrap();
//! net.connect_groups().unwrap();
//! net.connect_layers(0, 2).unwrap(); // input straight to output
//! net.set_weights(WeightInit::Random, &mut Prng::new(42)).unwrap();
//!
//! let mut bp = Backprop::new(
//!     BackpropConfig::default().with_step(2.0),
//!     2,
//!     1,
//!     samples::xor_input,
//!     samples::xor_target,
//! )
//! .unwrap();
//! for state in 0..400 {
//!     bp.train(&mut net, state).unwrap();
//! }
//!
//! let mut out = [0.0];
//! net.update(&[1.0, 0.0], &mut out).unwrap();
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): `Serialize`/`Deserialize` for the trainer configs and
//!   [`graph::Transfer`]
//!
//! ## Modules
//!
//! - [`arena`]: handle arena and ownership lists
//! - [`graph`]: neurons, synapses and recursive evaluation
//! - [`group`]: the `Group` capability, `Layer` and `Net`
//! - [`layered`]: `LayeredNet` and its binary file format
//! - [`backprop`], [`genetic`]: the two trainers

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/arena.rs"]
pub mod arena;

#[path = "core/graph.rs"]
pub mod graph;

#[path = "core/group.rs"]
pub mod group;

#[path = "core/storage.rs"]
pub mod storage;

#[path = "core/layered.rs"]
pub mod layered;

#[path = "core/trainer.rs"]
pub mod trainer;

#[path = "core/backprop.rs"]
pub mod backprop;

#[path = "core/genetic.rs"]
pub mod genetic;

#[path = "core/samples.rs"]
pub mod samples;

/// Prelude module for convenient imports.
///
/// ```
/// use neuronet::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backprop::{Backprop, BackpropConfig};
    pub use crate::error::{ArenaError, GraphError, StorageError, TrainError};
    pub use crate::genetic::{Chromosome, GeneticConfig, GeneticTrainer};
    pub use crate::graph::{Graph, NeuronId, SynapseId, Transfer, WeightInit};
    pub use crate::group::{Group, Layer, Net};
    pub use crate::layered::LayeredNet;
    pub use crate::prng::Prng;
    pub use crate::samples;
    pub use crate::trainer::{InputSource, Target};
}
