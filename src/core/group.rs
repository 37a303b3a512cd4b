//! Connectable neuron groups: layers and nets.
//!
//! A [`Net`] is itself a [`Group`], so a whole net can be wired into another
//! one. All groups of one net live in the same [`Graph`].

use tracing::warn;

use crate::arena::List;
use crate::error::GraphError;
use crate::graph::{Graph, Neuron, NeuronId, Transfer, WeightInit};
use crate::prng::Prng;

/// What a set of neurons must offer to be wired and evaluated as a unit.
pub trait Group {
    /// Neurons that receive connections from upstream groups.
    fn inputs(&self) -> &[NeuronId];

    /// Neurons that feed downstream groups and are evaluated by
    /// [`Group::update`].
    fn outputs(&self) -> &[NeuronId];

    /// Every neuron in the group.
    fn neurons(&self) -> Vec<NeuronId>;

    fn reset(&self, graph: &mut Graph) -> Result<(), GraphError> {
        for id in self.neurons() {
            graph.reset(id)?;
        }
        Ok(())
    }

    fn set_weights(
        &self,
        graph: &mut Graph,
        init: WeightInit,
        rng: &mut Prng,
    ) -> Result<(), GraphError> {
        for id in self.neurons() {
            graph.set_weights(id, init, rng)?;
        }
        Ok(())
    }

    fn set_transfer(&self, graph: &mut Graph, transfer: Transfer) -> Result<(), GraphError> {
        for id in self.neurons() {
            graph.set_transfer(id, transfer)?;
        }
        Ok(())
    }

    /// Evaluate the output neurons; they pull the rest of the graph on demand.
    fn update(&self, graph: &mut Graph) -> Result<(), GraphError> {
        for &id in self.outputs() {
            graph.update(id)?;
        }
        Ok(())
    }

    /// Connect every output of this group to every input of `other`.
    fn connect(&self, graph: &mut Graph, other: &dyn Group) -> Result<(), GraphError> {
        for &from in self.outputs() {
            for &to in other.inputs() {
                graph.connect(from, to, 0.0)?;
            }
        }
        Ok(())
    }

    /// Connect outputs to inputs one-to-one by position, stopping at the
    /// shorter side.
    fn connect_parallel(&self, graph: &mut Graph, other: &dyn Group) -> Result<(), GraphError> {
        for (&from, &to) in self.outputs().iter().zip(other.inputs()) {
            graph.connect(from, to, 0.0)?;
        }
        Ok(())
    }

    /// Connect every output of this group to `neuron`.
    fn connect_neuron(&self, graph: &mut Graph, neuron: NeuronId) -> Result<(), GraphError> {
        for &from in self.outputs() {
            graph.connect(from, neuron, 0.0)?;
        }
        Ok(())
    }
}

impl<G: Group + ?Sized> Group for Box<G> {
    fn inputs(&self) -> &[NeuronId] {
        (**self).inputs()
    }

    fn outputs(&self) -> &[NeuronId] {
        (**self).outputs()
    }

    fn neurons(&self) -> Vec<NeuronId> {
        (**self).neurons()
    }

    fn reset(&self, graph: &mut Graph) -> Result<(), GraphError> {
        (**self).reset(graph)
    }

    fn update(&self, graph: &mut Graph) -> Result<(), GraphError> {
        (**self).update(graph)
    }
}

/// The simplest group: every neuron is both an input and an output, with no
/// connections inside the layer.
#[derive(Debug, Clone)]
pub struct Layer {
    neurons: List<Neuron>,
}

impl Layer {
    /// Create `size` neurons, each with a zero bias.
    pub fn new(graph: &mut Graph, size: usize) -> Result<Self, GraphError> {
        let mut neurons = graph.neuron_list();
        for _ in 0..size {
            let id = graph.add_neuron_with_bias(0.0)?;
            graph.adopt(&mut neurons, id)?;
        }
        Ok(Self { neurons })
    }

    pub fn len(&self) -> usize {
        self.neurons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neurons.is_empty()
    }

    pub fn neuron(&self, index: usize) -> Option<NeuronId> {
        self.neurons.get(index)
    }

    pub fn index_of(&self, id: NeuronId) -> Option<usize> {
        self.neurons.index_of(id)
    }

    pub fn ids(&self) -> &[NeuronId] {
        self.neurons.as_slice()
    }

    /// Destroy the layer's neurons and every synapse touching them.
    pub fn destroy(mut self, graph: &mut Graph) -> Result<(), GraphError> {
        graph.destroy_neurons(&mut self.neurons)
    }
}

impl Group for Layer {
    fn inputs(&self) -> &[NeuronId] {
        self.neurons.as_slice()
    }

    fn outputs(&self) -> &[NeuronId] {
        self.neurons.as_slice()
    }

    fn neurons(&self) -> Vec<NeuronId> {
        self.neurons.as_slice().to_vec()
    }
}

/// An ordered run of groups between a dedicated input layer and output layer.
///
/// `G` is the type of the groups in between; the default allows mixing layers
/// and nested nets.
#[derive(Debug, Clone)]
pub struct Net<G = Box<dyn Group>> {
    input: Layer,
    hidden: Vec<G>,
    output: Layer,
}

impl<G: Group> Net<G> {
    pub fn new(graph: &mut Graph, input_count: usize, output_count: usize) -> Result<Self, GraphError> {
        let input = Layer::new(graph, input_count)?;
        let output = Layer::new(graph, output_count)?;
        Ok(Self::from_parts(input, Vec::new(), output))
    }

    pub fn from_parts(input: Layer, hidden: Vec<G>, output: Layer) -> Self {
        Self {
            input,
            hidden,
            output,
        }
    }

    pub fn input_layer(&self) -> &Layer {
        &self.input
    }

    pub fn output_layer(&self) -> &Layer {
        &self.output
    }

    pub fn hidden(&self) -> &[G] {
        &self.hidden
    }

    pub fn input_count(&self) -> usize {
        self.input.len()
    }

    pub fn output_count(&self) -> usize {
        self.output.len()
    }

    /// Number of groups, input and output layers included.
    pub fn group_count(&self) -> usize {
        self.hidden.len() + 2
    }

    /// Insert `group` between the last hidden group and the output layer.
    pub fn add_group(&mut self, group: G) {
        self.hidden.push(group);
    }

    /// Groups in order: input layer, hidden groups, output layer.
    pub fn groups(&self) -> impl Iterator<Item = &dyn Group> + '_ {
        core::iter::once(&self.input as &dyn Group)
            .chain(self.hidden.iter().map(|g| g as &dyn Group))
            .chain(core::iter::once(&self.output as &dyn Group))
    }

    /// Fully connect each group to the next one.
    pub fn connect_groups(&self, graph: &mut Graph) -> Result<(), GraphError> {
        let groups: Vec<&dyn Group> = self.groups().collect();
        for pair in groups.windows(2) {
            pair[0].connect(graph, pair[1])?;
        }
        Ok(())
    }

    /// Feed `inputs` to the input layer, evaluate, and copy the output layer
    /// into `outputs`.
    ///
    /// On error `outputs` is left untouched.
    pub fn update(
        &self,
        graph: &mut Graph,
        inputs: &[f64],
        outputs: &mut [f64],
    ) -> Result<(), GraphError> {
        if inputs.len() != self.input.len() {
            return Err(GraphError::BufferSize {
                expected: self.input.len(),
                actual: inputs.len(),
            });
        }
        if outputs.len() != self.output.len() {
            return Err(GraphError::BufferSize {
                expected: self.output.len(),
                actual: outputs.len(),
            });
        }

        Group::reset(self, graph)?;
        for (&id, &v) in self.input.ids().iter().zip(inputs) {
            graph.set_value(id, v)?;
        }

        if let Err(e) = self.output.update(graph) {
            if let GraphError::Cycle(id) = e {
                warn!("net evaluation aborted: cycle through neuron {:?}", id);
            }
            return Err(e);
        }

        for (slot, &id) in outputs.iter_mut().zip(self.output.ids()) {
            *slot = graph.neuron(id)?.value();
        }
        Ok(())
    }

    /// Check the whole net for cycles, including parts the outputs never
    /// reach.
    pub fn verify(&self, graph: &Graph) -> Result<(), GraphError> {
        match graph.find_cycle(Group::neurons(self)) {
            Some(id) => Err(GraphError::Cycle(id)),
            None => Ok(()),
        }
    }
}

impl<G: Group> Group for Net<G> {
    fn inputs(&self) -> &[NeuronId] {
        self.input.ids()
    }

    fn outputs(&self) -> &[NeuronId] {
        self.output.ids()
    }

    fn neurons(&self) -> Vec<NeuronId> {
        self.groups().flat_map(|g| g.neurons()).collect()
    }
}
