//! Single-step supervised training with the sigmoid delta rule.

use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::TrainError;
use crate::layered::LayeredNet;
use crate::trainer::{InputSource, NetTrainer, Target};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BackpropConfig {
    /// Learning rate. Useful values lie roughly in [0.1, 10].
    pub step: f64,
}

impl Default for BackpropConfig {
    fn default() -> Self {
        Self { step: 1.0 }
    }
}

impl BackpropConfig {
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.step.is_finite() || self.step <= 0.0 {
            return Err("step must be finite and > 0");
        }
        Ok(())
    }
}

/// Backpropagation trainer for a [`LayeredNet`] of a fixed shape.
#[derive(Debug, Clone)]
pub struct Backprop<I, T> {
    config: BackpropConfig,
    trainer: NetTrainer<I, T>,
}

impl<I: InputSource, T: Target> Backprop<I, T> {
    pub fn new(
        config: BackpropConfig,
        input_count: usize,
        output_count: usize,
        source: I,
        target: T,
    ) -> Result<Self, TrainError> {
        config.validate().map_err(TrainError::Config)?;
        debug!(
            step = config.step,
            inputs = input_count,
            outputs = output_count,
            "backprop trainer ready"
        );
        Ok(Self {
            config,
            trainer: NetTrainer::new(input_count, output_count, source, target),
        })
    }

    pub fn config(&self) -> &BackpropConfig {
        &self.config
    }

    pub fn set_step(&mut self, step: f64) -> Result<(), TrainError> {
        let config = self.config.with_step(step);
        config.validate().map_err(TrainError::Config)?;
        self.config = config;
        Ok(())
    }

    pub fn trainer(&self) -> &NetTrainer<I, T> {
        &self.trainer
    }

    pub fn trainer_mut(&mut self) -> &mut NetTrainer<I, T> {
        &mut self.trainer
    }

    /// One training step for `state`. Returns the mean absolute output error
    /// measured before the weights were adjusted.
    ///
    /// Every new weight is computed from the pre-step network and applied
    /// only once the whole backward pass is done. If the forward pass hits a
    /// cycle the step is abandoned and no weight changes.
    pub fn train(&mut self, net: &mut LayeredNet, state: usize) -> Result<f64, TrainError> {
        self.trainer.check_shape(net)?;
        self.trainer.generate(state);
        let error = self.trainer.evaluate(net)?;

        let step = self.config.step;
        let (layers, graph) = net.split_mut();

        let output = layers.output_layer();
        for (k, &id) in output.ids().iter().enumerate() {
            let actual = self.trainer.actual()[k];
            let desired = self.trainer.desired()[k];
            let factor = actual * (1.0 - actual) * (desired - actual);
            graph.neuron_mut(id)?.set_scratch(factor);
            graph.stage_input_deltas(id, step, factor)?;
        }

        for layer in layers.hidden().iter().rev() {
            for &id in layer.ids() {
                let data = graph.neuron(id)?.value();
                let factor = data * (1.0 - data) * graph.downstream_scratch(id)?;
                graph.neuron_mut(id)?.set_scratch(factor);
                graph.stage_input_deltas(id, step, factor)?;
            }
        }

        graph.commit_staged();
        Ok(error)
    }
}
