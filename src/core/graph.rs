//! Neurons, synapses and the arena that owns them.
//!
//! Every connection is a single [`Synapse`] record. The destination neuron's
//! input list owns it; the source neuron's output list is a view onto the same
//! record. Removing a synapse unlinks it from both sides in one step.
//!
//! A bias is a synapse with [`Source::Bias`]: it sits in the owner's input
//! list, appears in no output list, and always contributes `1.0 * weight`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arena::{Arena, Handle, List, Ownership};
use crate::error::{ArenaError, GraphError};
use crate::prng::Prng;

pub type NeuronId = Handle<Neuron>;
pub type SynapseId = Handle<Synapse>;

/// Nonlinearity applied to a neuron's weighted input sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Transfer {
    Linear,
    Step,
    #[default]
    Sigmoid,
}

impl Transfer {
    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Transfer::Linear => x,
            Transfer::Step => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Transfer::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

/// Weight initialiser.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WeightInit {
    Zero,
    One,
    /// Uniform in [-1, 1).
    Random,
}

impl WeightInit {
    #[inline]
    pub fn sample(self, rng: &mut Prng) -> f64 {
        match self {
            WeightInit::Zero => 0.0,
            WeightInit::One => 1.0,
            WeightInit::Random => rng.gen_range_f64(-1.0, 1.0),
        }
    }
}

/// Per-evaluation visit state.
///
/// Kept apart from the numeric value so no output can be mistaken for a
/// marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvalState {
    #[default]
    Unvisited,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Neuron(NeuronId),
    Bias,
}

#[derive(Debug, Clone)]
pub struct Synapse {
    source: Source,
    target: NeuronId,
    weight: f64,
    // Pending update, applied by `Graph::commit_staged`.
    staged: Option<f64>,
}

impl Synapse {
    pub fn source(&self) -> Source {
        self.source
    }

    /// Neuron feeding this synapse, `None` for a bias.
    pub fn source_neuron(&self) -> Option<NeuronId> {
        match self.source {
            Source::Neuron(id) => Some(id),
            Source::Bias => None,
        }
    }

    pub fn target(&self) -> NeuronId {
        self.target
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn staged(&self) -> Option<f64> {
        self.staged
    }

    pub fn is_bias(&self) -> bool {
        self.source == Source::Bias
    }
}

#[derive(Debug, Clone)]
pub struct Neuron {
    value: f64,
    state: EvalState,
    transfer: Transfer,
    bias: Option<SynapseId>,
    // Algorithm-local scratch; backprop keeps the error factor here.
    scratch: f64,
    inputs: List<Synapse>,
    outputs: List<Synapse>,
}

impl Neuron {
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn state(&self) -> EvalState {
        self.state
    }

    pub fn transfer(&self) -> Transfer {
        self.transfer
    }

    pub fn set_transfer(&mut self, transfer: Transfer) {
        self.transfer = transfer;
    }

    pub fn bias_synapse(&self) -> Option<SynapseId> {
        self.bias
    }

    pub fn scratch(&self) -> f64 {
        self.scratch
    }

    pub fn set_scratch(&mut self, v: f64) {
        self.scratch = v;
    }

    /// Input synapses in summation order (bias first when present).
    pub fn inputs(&self) -> &[SynapseId] {
        self.inputs.as_slice()
    }

    pub fn outputs(&self) -> &[SynapseId] {
        self.outputs.as_slice()
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
        self.state = EvalState::Unvisited;
        self.scratch = 0.0;
    }
}

/// Storage for every neuron and synapse of one network.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    neurons: Arena<Neuron>,
    synapses: Arena<Synapse>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn neuron_count(&self) -> usize {
        self.neurons.len()
    }

    pub fn synapse_count(&self) -> usize {
        self.synapses.len()
    }

    pub fn add_neuron(&mut self) -> NeuronId {
        let neuron = Neuron {
            value: 0.0,
            state: EvalState::Unvisited,
            transfer: Transfer::default(),
            bias: None,
            scratch: 0.0,
            inputs: self.synapses.list(Ownership::Owning),
            outputs: self.synapses.list(Ownership::View),
        };
        self.neurons.insert(neuron)
    }

    pub fn add_neuron_with_bias(&mut self, bias: f64) -> Result<NeuronId, GraphError> {
        let id = self.add_neuron();
        self.set_bias(id, bias)?;
        Ok(id)
    }

    pub fn neuron(&self, id: NeuronId) -> Result<&Neuron, GraphError> {
        self.neurons.get(id).ok_or(GraphError::UnknownNeuron(id))
    }

    pub fn neuron_mut(&mut self, id: NeuronId) -> Result<&mut Neuron, GraphError> {
        self.neurons.get_mut(id).ok_or(GraphError::UnknownNeuron(id))
    }

    pub fn synapse(&self, id: SynapseId) -> Option<&Synapse> {
        self.synapses.get(id)
    }

    pub fn contains(&self, id: NeuronId) -> bool {
        self.neurons.contains(id)
    }

    pub fn neurons(&self) -> impl Iterator<Item = (NeuronId, &Neuron)> + '_ {
        self.neurons.iter()
    }

    // ---------------------------------------------------------------------
    // Neuron lists (layers)
    // ---------------------------------------------------------------------

    /// New owning list for grouping neurons of this graph.
    pub fn neuron_list(&mut self) -> List<Neuron> {
        self.neurons.list(Ownership::Owning)
    }

    pub fn adopt(&mut self, list: &mut List<Neuron>, id: NeuronId) -> Result<(), GraphError> {
        list.attach_last(&mut self.neurons, id)?;
        Ok(())
    }

    /// Destroy every neuron in `list`, with all of their synapses.
    pub fn destroy_neurons(&mut self, list: &mut List<Neuron>) -> Result<(), GraphError> {
        let mut cursor = list.cursor();
        while let Some(id) = cursor.next(list) {
            self.unlink(id)?;
            list.destroy(&mut self.neurons, id)?;
        }
        Ok(())
    }

    /// Remove a neuron that no list owns, together with all of its synapses.
    pub fn remove_neuron(&mut self, id: NeuronId) -> Result<(), GraphError> {
        if self.neurons.owner(id).is_some() {
            return Err(ArenaError::OwnedElsewhere.into());
        }
        self.unlink(id)?;
        self.neurons.remove(id)?;
        Ok(())
    }

    fn unlink(&mut self, id: NeuronId) -> Result<(), GraphError> {
        let mut cursor = self.neuron(id)?.inputs.cursor();
        loop {
            let next = cursor.next(&self.neuron(id)?.inputs);
            let Some(sid) = next else { break };
            self.disconnect(sid)?;
        }
        let mut cursor = self.neuron(id)?.outputs.cursor();
        loop {
            let next = cursor.next(&self.neuron(id)?.outputs);
            let Some(sid) = next else { break };
            self.disconnect(sid)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Synapses
    // ---------------------------------------------------------------------

    /// Wire `from` into `to`; data flows from `from` to `to`.
    pub fn connect(
        &mut self,
        from: NeuronId,
        to: NeuronId,
        weight: f64,
    ) -> Result<SynapseId, GraphError> {
        if !self.neurons.contains(from) {
            return Err(GraphError::UnknownNeuron(from));
        }
        if !self.neurons.contains(to) {
            return Err(GraphError::UnknownNeuron(to));
        }

        let sid = self.synapses.insert(Synapse {
            source: Source::Neuron(from),
            target: to,
            weight,
            staged: None,
        });

        let target = self.neurons.get_mut(to).ok_or(GraphError::UnknownNeuron(to))?;
        target.inputs.attach_last(&mut self.synapses, sid)?;
        let source = self
            .neurons
            .get_mut(from)
            .ok_or(GraphError::UnknownNeuron(from))?;
        source.outputs.attach_last(&mut self.synapses, sid)?;
        Ok(sid)
    }

    /// Remove a synapse from both of its neurons and free it.
    pub fn disconnect(&mut self, sid: SynapseId) -> Result<Synapse, GraphError> {
        let (source, target) = {
            let s = self.synapses.get(sid).ok_or(ArenaError::Stale)?;
            (s.source, s.target)
        };

        if let Source::Neuron(src) = source {
            if let Some(n) = self.neurons.get_mut(src) {
                n.outputs.detach(&mut self.synapses, sid)?;
            }
        }

        let t = self
            .neurons
            .get_mut(target)
            .ok_or(GraphError::UnknownNeuron(target))?;
        if t.bias == Some(sid) {
            t.bias = None;
        }
        Ok(t.inputs.destroy(&mut self.synapses, sid)?)
    }

    pub fn weight(&self, sid: SynapseId) -> Option<f64> {
        self.synapses.get(sid).map(|s| s.weight)
    }

    pub fn set_weight(&mut self, sid: SynapseId, weight: f64) -> Result<(), GraphError> {
        let s = self.synapses.get_mut(sid).ok_or(ArenaError::Stale)?;
        s.weight = weight;
        Ok(())
    }

    /// Value flowing through a synapse: the source neuron's value, or 1.0 for
    /// a bias.
    pub fn connected_value(&self, sid: SynapseId) -> Option<f64> {
        let s = self.synapses.get(sid)?;
        match s.source {
            Source::Bias => Some(1.0),
            Source::Neuron(src) => self.neurons.get(src).map(|n| n.value),
        }
    }

    pub fn bias(&self, id: NeuronId) -> Result<f64, GraphError> {
        let n = self.neuron(id)?;
        Ok(n
            .bias
            .and_then(|b| self.synapses.get(b))
            .map_or(0.0, |s| s.weight))
    }

    /// Set the bias weight, creating the bias synapse at the front of the
    /// input list if the neuron has none.
    pub fn set_bias(&mut self, id: NeuronId, weight: f64) -> Result<SynapseId, GraphError> {
        let n = self.neurons.get_mut(id).ok_or(GraphError::UnknownNeuron(id))?;
        if let Some(b) = n.bias {
            if let Some(s) = self.synapses.get_mut(b) {
                s.weight = weight;
                return Ok(b);
            }
        }

        let sid = self.synapses.insert(Synapse {
            source: Source::Bias,
            target: id,
            weight,
            staged: None,
        });
        n.inputs.attach(&mut self.synapses, sid)?;
        n.bias = Some(sid);
        Ok(sid)
    }

    pub fn set_transfer(&mut self, id: NeuronId, transfer: Transfer) -> Result<(), GraphError> {
        self.neuron_mut(id)?.transfer = transfer;
        Ok(())
    }

    /// Draw a fresh weight for every input synapse of `id`, bias included.
    pub fn set_weights(
        &mut self,
        id: NeuronId,
        init: WeightInit,
        rng: &mut Prng,
    ) -> Result<(), GraphError> {
        let n = self.neurons.get(id).ok_or(GraphError::UnknownNeuron(id))?;
        for sid in n.inputs.iter() {
            if let Some(s) = self.synapses.get_mut(sid) {
                s.weight = init.sample(rng);
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Evaluation
    // ---------------------------------------------------------------------

    pub fn reset(&mut self, id: NeuronId) -> Result<(), GraphError> {
        self.neuron_mut(id)?.reset();
        Ok(())
    }

    /// Assign a value directly, marking the neuron as computed.
    pub fn set_value(&mut self, id: NeuronId, value: f64) -> Result<(), GraphError> {
        let n = self.neuron_mut(id)?;
        n.value = value;
        n.state = EvalState::Done;
        Ok(())
    }

    /// Recompute `id` from its inputs, pulling any unvisited input neuron
    /// first.
    ///
    /// Reaching a neuron that is still being computed means the graph has a
    /// cycle; evaluation stops and the offending neuron is reported. Neurons
    /// on the aborted path stay [`EvalState::InProgress`].
    pub fn update(&mut self, id: NeuronId) -> Result<f64, GraphError> {
        self.neuron_mut(id)?.state = EvalState::InProgress;

        let mut sum = 0.0;
        let mut i = 0;
        while let Some(sid) = self.neuron(id)?.inputs.get(i) {
            i += 1;
            let (source, weight) = match self.synapses.get(sid) {
                Some(s) => (s.source, s.weight),
                None => continue,
            };
            let data = match source {
                Source::Bias => 1.0,
                Source::Neuron(src) => {
                    let (state, value) = {
                        let n = self.neuron(src)?;
                        (n.state, n.value)
                    };
                    match state {
                        EvalState::Done => value,
                        EvalState::Unvisited => self.update(src)?,
                        EvalState::InProgress => return Err(GraphError::Cycle(src)),
                    }
                }
            };
            sum += data * weight;
        }

        let n = self.neuron_mut(id)?;
        n.value = n.transfer.apply(sum);
        n.state = EvalState::Done;
        Ok(n.value)
    }

    /// First neuron found on a cycle reachable (through inputs) from `seeds`.
    pub fn find_cycle<I>(&self, seeds: I) -> Option<NeuronId>
    where
        I: IntoIterator<Item = NeuronId>,
    {
        const WHITE: u8 = 0;
        const GREY: u8 = 1;
        const BLACK: u8 = 2;

        let mut color = vec![WHITE; self.neurons.capacity()];
        let mut stack: Vec<(NeuronId, usize)> = Vec::new();

        for seed in seeds {
            if !self.neurons.contains(seed) || color[seed.index()] != WHITE {
                continue;
            }
            color[seed.index()] = GREY;
            stack.push((seed, 0));

            while let Some(top) = stack.len().checked_sub(1) {
                let (id, next) = stack[top];
                let Some(n) = self.neurons.get(id) else {
                    stack.pop();
                    continue;
                };
                match n.inputs.get(next) {
                    Some(sid) => {
                        stack[top].1 += 1;
                        let Some(Source::Neuron(src)) = self.synapses.get(sid).map(|s| s.source)
                        else {
                            continue;
                        };
                        match color[src.index()] {
                            GREY => return Some(src),
                            WHITE => {
                                color[src.index()] = GREY;
                                stack.push((src, 0));
                            }
                            _ => {}
                        }
                    }
                    None => {
                        color[id.index()] = BLACK;
                        stack.pop();
                    }
                }
            }
        }
        None
    }

    // ---------------------------------------------------------------------
    // Staged weight updates
    // ---------------------------------------------------------------------

    /// Stage `weight + rate * factor * input` on every input synapse of `id`.
    pub fn stage_input_deltas(
        &mut self,
        id: NeuronId,
        rate: f64,
        factor: f64,
    ) -> Result<(), GraphError> {
        let n = self.neurons.get(id).ok_or(GraphError::UnknownNeuron(id))?;
        for sid in n.inputs.iter() {
            let Some(s) = self.synapses.get_mut(sid) else {
                continue;
            };
            let data = match s.source {
                Source::Bias => 1.0,
                Source::Neuron(src) => self.neurons.get(src).map_or(0.0, |m| m.value),
            };
            s.staged = Some(s.weight + rate * factor * data);
        }
        Ok(())
    }

    /// Sum of `weight * scratch` over the neurons `id` feeds into.
    pub fn downstream_scratch(&self, id: NeuronId) -> Result<f64, GraphError> {
        let n = self.neuron(id)?;
        let mut sum = 0.0;
        for sid in n.outputs.iter() {
            if let Some(s) = self.synapses.get(sid) {
                if let Some(t) = self.neurons.get(s.target) {
                    sum += t.scratch * s.weight;
                }
            }
        }
        Ok(sum)
    }

    /// Apply every staged weight and clear the stage.
    pub fn commit_staged(&mut self) {
        for (_, s) in self.synapses.iter_mut() {
            if let Some(w) = s.staged.take() {
                s.weight = w;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn transfer_functions() {
        assert_eq!(Transfer::Linear.apply(-2.5), -2.5);
        assert_eq!(Transfer::Step.apply(0.0), 0.0);
        assert_eq!(Transfer::Step.apply(1e-9), 1.0);
        assert!(approx(Transfer::Sigmoid.apply(0.0), 0.5));
        assert!(Transfer::Sigmoid.apply(40.0) <= 1.0);
    }

    #[test]
    fn connect_links_both_sides() {
        let mut g = Graph::new();
        let a = g.add_neuron();
        let b = g.add_neuron();
        let s = g.connect(a, b, 0.5).unwrap();

        assert_eq!(g.neuron(a).unwrap().outputs(), &[s]);
        assert_eq!(g.neuron(b).unwrap().inputs(), &[s]);
        let syn = g.synapse(s).unwrap();
        assert_eq!(syn.source_neuron(), Some(a));
        assert_eq!(syn.target(), b);

        g.disconnect(s).unwrap();
        assert!(g.neuron(a).unwrap().outputs().is_empty());
        assert!(g.neuron(b).unwrap().inputs().is_empty());
        assert_eq!(g.synapse_count(), 0);
        assert!(g.disconnect(s).is_err());
    }

    #[test]
    fn bias_goes_first_and_is_reused() {
        let mut g = Graph::new();
        let a = g.add_neuron();
        let b = g.add_neuron();
        g.connect(a, b, 1.0).unwrap();
        let bias = g.set_bias(b, 0.25).unwrap();

        assert_eq!(g.neuron(b).unwrap().inputs()[0], bias);
        assert_eq!(g.bias(b).unwrap(), 0.25);
        assert_eq!(g.set_bias(b, -1.0).unwrap(), bias);
        assert_eq!(g.bias(b).unwrap(), -1.0);
        assert_eq!(g.bias(a).unwrap(), 0.0);
        assert!(g.synapse(bias).unwrap().is_bias());
        assert_eq!(g.connected_value(bias), Some(1.0));
    }

    #[test]
    fn removing_a_neuron_cascades_once() {
        let mut g = Graph::new();
        let a = g.add_neuron();
        let b = g.add_neuron_with_bias(0.1).unwrap();
        let c = g.add_neuron();
        g.connect(a, b, 1.0).unwrap();
        g.connect(b, c, 1.0).unwrap();
        g.connect(b, b, 1.0).unwrap();
        assert_eq!(g.synapse_count(), 4);

        g.remove_neuron(b).unwrap();
        assert_eq!(g.synapse_count(), 0);
        assert!(g.neuron(a).unwrap().outputs().is_empty());
        assert!(g.neuron(c).unwrap().inputs().is_empty());
        assert!(!g.contains(b));
    }

    #[test]
    fn update_sums_weighted_inputs() {
        let mut g = Graph::new();
        let x = g.add_neuron();
        let y = g.add_neuron();
        let out = g.add_neuron_with_bias(0.5).unwrap();
        g.set_transfer(out, Transfer::Linear).unwrap();
        g.connect(x, out, 2.0).unwrap();
        g.connect(y, out, -1.0).unwrap();

        g.set_value(x, 3.0).unwrap();
        g.set_value(y, 4.0).unwrap();
        let v = g.update(out).unwrap();
        assert!(approx(v, 0.5 + 6.0 - 4.0));
        assert_eq!(g.neuron(out).unwrap().state(), EvalState::Done);
    }

    #[test]
    fn update_pulls_unvisited_inputs() {
        let mut g = Graph::new();
        let x = g.add_neuron();
        let h = g.add_neuron();
        let out = g.add_neuron();
        g.set_transfer(h, Transfer::Step).unwrap();
        g.set_transfer(out, Transfer::Linear).unwrap();
        g.connect(x, h, 1.0).unwrap();
        g.connect(h, out, 3.0).unwrap();

        g.set_value(x, 0.2).unwrap();
        assert_eq!(g.update(out).unwrap(), 3.0);
        assert_eq!(g.neuron(h).unwrap().value(), 1.0);
    }

    #[test]
    fn zero_output_is_a_legitimate_result() {
        let mut g = Graph::new();
        let x = g.add_neuron();
        let out = g.add_neuron();
        g.set_transfer(out, Transfer::Step).unwrap();
        g.connect(x, out, 1.0).unwrap();
        g.set_value(x, -1.0).unwrap();
        assert_eq!(g.update(out), Ok(0.0));
    }

    #[test]
    fn cycles_are_reported() {
        let mut g = Graph::new();
        let a = g.add_neuron();
        let b = g.add_neuron();
        let out = g.add_neuron();
        g.connect(a, b, 1.0).unwrap();
        g.connect(b, a, 1.0).unwrap();
        g.connect(b, out, 1.0).unwrap();

        assert!(matches!(g.update(out), Err(GraphError::Cycle(_))));
        assert!(g.find_cycle([out]).is_some());

        let mut h = Graph::new();
        let p = h.add_neuron();
        let q = h.add_neuron();
        h.connect(p, q, 1.0).unwrap();
        assert_eq!(h.find_cycle([q, p]), None);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut g = Graph::new();
        let a = g.add_neuron();
        g.connect(a, a, 1.0).unwrap();
        assert_eq!(g.update(a), Err(GraphError::Cycle(a)));
        assert_eq!(g.find_cycle([a]), Some(a));
    }

    #[test]
    fn staged_weights_wait_for_commit() {
        let mut g = Graph::new();
        let x = g.add_neuron();
        let out = g.add_neuron_with_bias(0.0).unwrap();
        let s = g.connect(x, out, 1.0).unwrap();
        g.set_value(x, 2.0).unwrap();

        g.stage_input_deltas(out, 0.5, 0.1).unwrap();
        assert_eq!(g.weight(s), Some(1.0));
        assert!(approx(g.synapse(s).unwrap().staged().unwrap(), 1.1));

        g.commit_staged();
        assert!(approx(g.weight(s).unwrap(), 1.1));
        assert!(approx(g.bias(out).unwrap(), 0.05));
        assert_eq!(g.synapse(s).unwrap().staged(), None);
    }

    #[test]
    fn downstream_scratch_uses_current_weights() {
        let mut g = Graph::new();
        let h = g.add_neuron();
        let o1 = g.add_neuron();
        let o2 = g.add_neuron();
        g.connect(h, o1, 2.0).unwrap();
        g.connect(h, o2, -1.0).unwrap();
        g.neuron_mut(o1).unwrap().set_scratch(0.5);
        g.neuron_mut(o2).unwrap().set_scratch(0.25);
        assert!(approx(g.downstream_scratch(h).unwrap(), 0.75));
    }

    #[test]
    fn random_weights_touch_every_input() {
        let mut g = Graph::new();
        let x = g.add_neuron();
        let out = g.add_neuron_with_bias(0.0).unwrap();
        g.connect(x, out, 0.0).unwrap();
        let mut rng = Prng::new(3);
        g.set_weights(out, WeightInit::One, &mut rng).unwrap();
        for &sid in g.neuron(out).unwrap().inputs() {
            assert_eq!(g.weight(sid), Some(1.0));
        }
        g.set_weights(out, WeightInit::Random, &mut rng).unwrap();
        for &sid in g.neuron(out).unwrap().inputs() {
            let w = g.weight(sid).unwrap();
            assert!((-1.0..1.0).contains(&w));
        }
    }
}
