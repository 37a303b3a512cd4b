//! A self-contained net made only of layers, chained input to output.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use tracing::{debug, warn};

use crate::error::{ArenaError, GraphError, StorageError};
use crate::graph::{Graph, Neuron, NeuronId, SynapseId, Transfer, WeightInit};
use crate::group::{Group, Layer, Net};
use crate::prng::Prng;
use crate::storage::{self, InputRecord};

/// A [`Net`] of [`Layer`]s that owns its [`Graph`].
///
/// Remember to call [`LayeredNet::connect_groups`] once the hidden layers are
/// in place.
#[derive(Debug, Clone)]
pub struct LayeredNet {
    graph: Graph,
    net: Net<Layer>,
}

fn layer_at(net: &Net<Layer>, index: usize) -> Option<&Layer> {
    let hidden = net.hidden();
    match index {
        0 => Some(net.input_layer()),
        i if i <= hidden.len() => hidden.get(i - 1),
        i if i == hidden.len() + 1 => Some(net.output_layer()),
        _ => None,
    }
}

impl LayeredNet {
    pub fn new(input_count: usize, output_count: usize) -> Result<Self, GraphError> {
        let mut graph = Graph::new();
        let net = Net::new(&mut graph, input_count, output_count)?;
        Ok(Self { graph, net })
    }

    /// Add a hidden layer of `size` neurons just before the output layer.
    /// Returns its group index.
    pub fn add_layer(&mut self, size: usize) -> Result<usize, GraphError> {
        let layer = Layer::new(&mut self.graph, size)?;
        self.net.add_group(layer);
        Ok(self.net.hidden().len())
    }

    /// Fully connect each layer to the next one.
    pub fn connect_groups(&mut self) -> Result<(), GraphError> {
        self.net.connect_groups(&mut self.graph)
    }

    /// Fully connect layer `from` to layer `to`, e.g. input straight to output.
    pub fn connect_layers(&mut self, from: usize, to: usize) -> Result<(), GraphError> {
        let (Some(a), Some(b)) = (layer_at(&self.net, from), layer_at(&self.net, to)) else {
            return Err(ArenaError::IndexOutOfRange {
                index: from.max(to),
                len: self.net.group_count(),
            }
            .into());
        };
        a.connect(&mut self.graph, b)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn net(&self) -> &Net<Layer> {
        &self.net
    }

    /// Borrow the layer structure and the graph at the same time.
    pub fn split_mut(&mut self) -> (&Net<Layer>, &mut Graph) {
        (&self.net, &mut self.graph)
    }

    pub fn input_count(&self) -> usize {
        self.net.input_count()
    }

    pub fn output_count(&self) -> usize {
        self.net.output_count()
    }

    pub fn layer_count(&self) -> usize {
        self.net.group_count()
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        layer_at(&self.net, index)
    }

    /// Layers in order, input first.
    pub fn layers(&self) -> impl DoubleEndedIterator<Item = &Layer> + '_ {
        core::iter::once(self.net.input_layer())
            .chain(self.net.hidden().iter())
            .chain(core::iter::once(self.net.output_layer()))
    }

    pub fn neuron(&self, group: usize, index: usize) -> Option<NeuronId> {
        self.layer(group)?.neuron(index)
    }

    pub fn set_weights(&mut self, init: WeightInit, rng: &mut Prng) -> Result<(), GraphError> {
        Group::set_weights(&self.net, &mut self.graph, init, rng)
    }

    pub fn set_transfer_functions(&mut self, transfer: Transfer) -> Result<(), GraphError> {
        Group::set_transfer(&self.net, &mut self.graph, transfer)
    }

    /// See [`Net::update`].
    pub fn update(&mut self, inputs: &[f64], outputs: &mut [f64]) -> Result<(), GraphError> {
        self.net.update(&mut self.graph, inputs, outputs)
    }

    pub fn verify(&self) -> Result<(), GraphError> {
        self.net.verify(&self.graph)
    }

    // ---------------------------------------------------------------------
    // Flat weight access (layer -> neuron -> input order)
    // ---------------------------------------------------------------------

    fn synapse_ids(&self) -> impl Iterator<Item = SynapseId> + '_ {
        self.layers()
            .flat_map(|layer| layer.ids().iter().copied())
            .flat_map(move |id| {
                self.graph
                    .neuron(id)
                    .map_or(&[][..], Neuron::inputs)
                    .iter()
                    .copied()
            })
    }

    /// Number of input synapses in the net, biases included.
    pub fn weight_count(&self) -> usize {
        self.synapse_ids().count()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.synapse_ids()
            .filter_map(|sid| self.graph.weight(sid))
            .collect()
    }

    pub fn set_weights_from(&mut self, weights: &[f64]) -> Result<(), GraphError> {
        let ids: Vec<SynapseId> = self.synapse_ids().collect();
        if ids.len() != weights.len() {
            return Err(GraphError::WeightCount {
                expected: ids.len(),
                actual: weights.len(),
            });
        }
        for (sid, &w) in ids.into_iter().zip(weights) {
            self.graph.set_weight(sid, w)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Serialization
    // ---------------------------------------------------------------------

    /// Write topology and weights. See [`crate::storage`] for the layout.
    pub fn save_to<W: Write>(&self, w: &mut W) -> Result<(), StorageError> {
        let mut position: HashMap<NeuronId, (i32, i32)> = HashMap::new();
        for (g, layer) in self.layers().enumerate() {
            for (n, &id) in layer.ids().iter().enumerate() {
                position.insert(id, (g as i32, n as i32));
            }
        }

        storage::write_count(w, self.layer_count(), "layer count")?;
        for layer in self.layers() {
            storage::write_count(w, layer.len(), "neuron count")?;
            for &id in layer.ids() {
                let neuron = self.graph.neuron(id)?;
                storage::write_count(w, neuron.inputs().len(), "input count")?;
                for &sid in neuron.inputs() {
                    let s = self
                        .graph
                        .synapse(sid)
                        .ok_or(GraphError::Arena(ArenaError::Stale))?;
                    let record = match s.source_neuron() {
                        None => InputRecord::bias(s.weight()),
                        Some(src) => {
                            let &(group, neuron) = position
                                .get(&src)
                                .ok_or(GraphError::UnknownNeuron(src))?;
                            InputRecord {
                                group,
                                neuron,
                                weight: s.weight(),
                            }
                        }
                    };
                    record.write_to(w)?;
                }
            }
        }
        debug!(
            layers = self.layer_count(),
            weights = self.weight_count(),
            "saved layered net"
        );
        Ok(())
    }

    /// Rebuild a net from [`LayeredNet::save_to`] output.
    ///
    /// Layers are built in file order and a synapse is only wired when its
    /// source layer already exists (the current layer included); any other
    /// record is dropped, so only feed-forward nets survive intact. Every
    /// neuron gets the sigmoid transfer function.
    pub fn load_from<R: Read>(r: &mut R) -> Result<Self, StorageError> {
        let group_count = storage::read_count(r, "layer")?;
        if group_count < 2 {
            return Err(StorageError::TooFewLayers(group_count));
        }

        let mut graph = Graph::new();
        let mut layers: Vec<Layer> = Vec::new();
        let mut dropped = 0usize;

        for _ in 0..group_count {
            let size = storage::read_count(r, "neuron")?;
            // Records are read before the layer is built so that header
            // counts never drive work beyond the bytes actually present.
            let mut records: Vec<Vec<InputRecord>> = Vec::new();
            for _ in 0..size {
                let count = storage::read_count(r, "input")?;
                let mut inputs = Vec::new();
                for _ in 0..count {
                    inputs.push(InputRecord::read_from(r)?);
                }
                records.push(inputs);
            }

            let layer = Layer::new(&mut graph, size)?;
            for (&this, inputs) in layer.ids().iter().zip(&records) {
                for record in inputs {
                    if record.is_bias() {
                        graph.set_bias(this, record.weight)?;
                        continue;
                    }
                    match lookup(&layers, &layer, record.group, record.neuron) {
                        Some(src) => {
                            graph.connect(src, this, record.weight)?;
                        }
                        None => dropped += 1,
                    }
                }
            }
            layers.push(layer);
        }

        if dropped > 0 {
            warn!(dropped, "dropped synapses whose source was not yet constructed");
        }

        let output = layers.pop().ok_or(StorageError::TooFewLayers(0))?;
        let mut rest = layers.into_iter();
        let input = rest.next().ok_or(StorageError::TooFewLayers(1))?;
        let net = Net::from_parts(input, rest.collect(), output);
        Group::set_transfer(&net, &mut graph, Transfer::Sigmoid)?;

        debug!(
            layers = group_count,
            neurons = graph.neuron_count(),
            synapses = graph.synapse_count(),
            "loaded layered net"
        );
        Ok(Self { graph, net })
    }

    pub fn save_bytes(&self) -> Result<Vec<u8>, StorageError> {
        let mut buf = Vec::new();
        self.save_to(&mut buf)?;
        Ok(buf)
    }

    pub fn load_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        Self::load_from(&mut io::Cursor::new(bytes))
    }

    /// Exact serialized size in bytes.
    pub fn encoded_len(&self) -> Result<usize, StorageError> {
        let mut counter = storage::ByteCounter::default();
        self.save_to(&mut counter)?;
        Ok(counter.len())
    }
}

fn lookup(built: &[Layer], current: &Layer, group: i32, neuron: i32) -> Option<NeuronId> {
    let group = usize::try_from(group).ok()?;
    let neuron = usize::try_from(neuron).ok()?;
    let layer = match group.cmp(&built.len()) {
        core::cmp::Ordering::Less => &built[group],
        core::cmp::Ordering::Equal => current,
        core::cmp::Ordering::Greater => return None,
    };
    layer.neuron(neuron)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{write_f64_ne, write_i32_ne};

    fn xor_shape(seed: u64) -> LayeredNet {
        let mut net = LayeredNet::new(2, 1).unwrap();
        net.add_layer(3).unwrap();
        net.connect_groups().unwrap();
        net.connect_layers(0, 2).unwrap();
        net.set_transfer_functions(Transfer::Sigmoid).unwrap();
        let mut rng = Prng::new(seed);
        net.set_weights(WeightInit::Random, &mut rng).unwrap();
        net
    }

    #[test]
    fn shape_and_lookup() {
        let net = xor_shape(1);
        assert_eq!(net.layer_count(), 3);
        assert_eq!(net.input_count(), 2);
        assert_eq!(net.output_count(), 1);
        assert_eq!(net.layer(1).unwrap().len(), 3);
        assert!(net.layer(3).is_none());
        assert!(net.neuron(1, 2).is_some());
        assert!(net.neuron(1, 3).is_none());
        // 6 biases, 2*3 + 3*1 + 2*1 connections.
        assert_eq!(net.weight_count(), 17);
    }

    #[test]
    fn connect_layers_rejects_unknown_index() {
        let mut net = LayeredNet::new(1, 1).unwrap();
        assert!(net.connect_layers(0, 5).is_err());
    }

    #[test]
    fn flat_weights_roundtrip() {
        let mut net = xor_shape(2);
        let mut w = net.weights();
        for (i, x) in w.iter_mut().enumerate() {
            *x = i as f64 * 0.01;
        }
        net.set_weights_from(&w).unwrap();
        assert_eq!(net.weights(), w);
        assert!(matches!(
            net.set_weights_from(&w[1..]),
            Err(GraphError::WeightCount {
                expected: 17,
                actual: 16
            })
        ));
    }

    #[test]
    fn save_load_is_bit_exact() {
        let mut net = xor_shape(9);
        let bytes = net.save_bytes().unwrap();
        assert_eq!(bytes.len(), net.encoded_len().unwrap());
        assert_eq!(bytes.len(), 4 + 3 * 4 + 6 * 4 + 17 * 16);

        let mut loaded = LayeredNet::load_bytes(&bytes).unwrap();
        assert_eq!(loaded.weights(), net.weights());
        assert_eq!(loaded.save_bytes().unwrap(), bytes);

        let mut rng = Prng::new(4);
        for _ in 0..50 {
            let x = [rng.next_f64(), rng.next_f64()];
            let mut a = [0.0];
            let mut b = [0.0];
            net.update(&x, &mut a).unwrap();
            loaded.update(&x, &mut b).unwrap();
            assert_eq!(a[0].to_bits(), b[0].to_bits());
        }
    }

    #[test]
    fn load_sets_sigmoid() {
        let mut net = xor_shape(3);
        net.set_transfer_functions(Transfer::Linear).unwrap();
        let loaded = LayeredNet::load_bytes(&net.save_bytes().unwrap()).unwrap();
        for layer in loaded.layers() {
            for &id in layer.ids() {
                assert_eq!(loaded.graph().neuron(id).unwrap().transfer(), Transfer::Sigmoid);
            }
        }
    }

    #[test]
    fn load_drops_forward_references() {
        let mut buf = Vec::new();
        write_i32_ne(&mut buf, 2).unwrap();

        // Layer 0: one neuron pointing at layer 1, which does not exist yet.
        write_i32_ne(&mut buf, 1).unwrap();
        write_i32_ne(&mut buf, 2).unwrap();
        InputRecord::bias(0.5).write_to(&mut buf).unwrap();
        InputRecord {
            group: 1,
            neuron: 0,
            weight: 9.0,
        }
        .write_to(&mut buf)
        .unwrap();

        // Layer 1: one neuron fed by layer 0 and by a layer that never exists.
        write_i32_ne(&mut buf, 1).unwrap();
        write_i32_ne(&mut buf, 3).unwrap();
        InputRecord::bias(0.25).write_to(&mut buf).unwrap();
        write_i32_ne(&mut buf, 0).unwrap();
        write_i32_ne(&mut buf, 0).unwrap();
        write_f64_ne(&mut buf, 2.0).unwrap();
        InputRecord {
            group: 7,
            neuron: 0,
            weight: 1.0,
        }
        .write_to(&mut buf)
        .unwrap();

        let net = LayeredNet::load_bytes(&buf).unwrap();
        let first = net.neuron(0, 0).unwrap();
        let last = net.neuron(1, 0).unwrap();
        assert_eq!(net.graph().neuron(first).unwrap().inputs().len(), 1);
        assert_eq!(net.graph().bias(first).unwrap(), 0.5);
        assert_eq!(net.graph().neuron(last).unwrap().inputs().len(), 2);
        assert_eq!(net.weights(), vec![0.5, 0.25, 2.0]);
    }

    #[test]
    fn load_rejects_bad_headers() {
        let mut buf = Vec::new();
        write_i32_ne(&mut buf, 1).unwrap();
        assert!(matches!(
            LayeredNet::load_bytes(&buf),
            Err(StorageError::TooFewLayers(1))
        ));

        let mut buf = Vec::new();
        write_i32_ne(&mut buf, 2).unwrap();
        write_i32_ne(&mut buf, -1).unwrap();
        assert!(matches!(
            LayeredNet::load_bytes(&buf),
            Err(StorageError::NegativeCount { .. })
        ));

        let mut buf = Vec::new();
        write_i32_ne(&mut buf, 2).unwrap();
        write_i32_ne(&mut buf, 1).unwrap();
        assert!(matches!(
            LayeredNet::load_bytes(&buf),
            Err(StorageError::Io(_))
        ));
    }

    #[test]
    fn huge_header_counts_fail_on_missing_bytes() {
        assert!(matches!(
            LayeredNet::load_bytes(&i32::MAX.to_ne_bytes()),
            Err(StorageError::Io(_))
        ));

        let mut buf = Vec::new();
        write_i32_ne(&mut buf, 2).unwrap();
        write_i32_ne(&mut buf, 50_000_000).unwrap();
        assert!(matches!(
            LayeredNet::load_bytes(&buf),
            Err(StorageError::Io(_))
        ));

        let mut buf = Vec::new();
        write_i32_ne(&mut buf, 2).unwrap();
        write_i32_ne(&mut buf, 1).unwrap();
        write_i32_ne(&mut buf, i32::MAX).unwrap();
        assert!(matches!(
            LayeredNet::load_bytes(&buf),
            Err(StorageError::Io(_))
        ));
    }

    #[test]
    fn back_edge_makes_update_fail() {
        let mut net = xor_shape(5);
        let out = net.neuron(2, 0).unwrap();
        let hidden = net.neuron(1, 0).unwrap();
        net.graph_mut().connect(out, hidden, 0.5).unwrap();

        let mut y = [7.0];
        assert!(matches!(
            net.update(&[0.0, 1.0], &mut y),
            Err(GraphError::Cycle(_))
        ));
        assert_eq!(y[0], 7.0);
        assert!(net.verify().is_err());
    }
}
