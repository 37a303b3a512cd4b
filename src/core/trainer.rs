//! Pieces shared by both trainers: the collaborator traits that supply
//! training data and the scratch buffers a trainer feeds through a net.

use crate::error::{GraphError, TrainError};
use crate::layered::LayeredNet;

/// Fills a feature vector for an opaque per-call `state` token.
pub trait InputSource {
    fn generate(&mut self, input: &mut [f64], state: usize);
}

impl<F> InputSource for F
where
    F: FnMut(&mut [f64], usize),
{
    fn generate(&mut self, input: &mut [f64], state: usize) {
        self(input, state)
    }
}

/// Fills the desired output vector for a given input.
pub trait Target {
    fn desired(&mut self, input: &[f64], output: &mut [f64]);
}

impl<F> Target for F
where
    F: FnMut(&[f64], &mut [f64]),
{
    fn desired(&mut self, input: &[f64], output: &mut [f64]) {
        self(input, output)
    }
}

/// Mean of `|desired - actual|`; zero for empty buffers.
pub fn mean_abs_error(desired: &[f64], actual: &[f64]) -> f64 {
    if desired.is_empty() {
        return 0.0;
    }
    let sum: f64 = desired
        .iter()
        .zip(actual)
        .map(|(d, a)| (d - a).abs())
        .sum();
    sum / desired.len() as f64
}

/// Input, desired and actual buffers sized for one net shape, plus the two
/// collaborators that fill them.
#[derive(Debug, Clone)]
pub struct NetTrainer<I, T> {
    input: Vec<f64>,
    desired: Vec<f64>,
    actual: Vec<f64>,
    source: I,
    target: T,
}

impl<I: InputSource, T: Target> NetTrainer<I, T> {
    pub fn new(input_count: usize, output_count: usize, source: I, target: T) -> Self {
        Self {
            input: vec![0.0; input_count],
            desired: vec![0.0; output_count],
            actual: vec![0.0; output_count],
            source,
            target,
        }
    }

    pub fn input_count(&self) -> usize {
        self.input.len()
    }

    pub fn output_count(&self) -> usize {
        self.desired.len()
    }

    /// Last generated input vector.
    pub fn input(&self) -> &[f64] {
        &self.input
    }

    pub fn desired(&self) -> &[f64] {
        &self.desired
    }

    /// Outputs of the last successful evaluation.
    pub fn actual(&self) -> &[f64] {
        &self.actual
    }

    pub fn source_mut(&mut self) -> &mut I {
        &mut self.source
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn check_shape(&self, net: &LayeredNet) -> Result<(), TrainError> {
        let expected = (self.input_count(), self.output_count());
        let actual = (net.input_count(), net.output_count());
        if expected != actual {
            return Err(TrainError::Shape { expected, actual });
        }
        Ok(())
    }

    /// Ask the collaborators for the next input/desired pair.
    pub fn generate(&mut self, state: usize) {
        self.source.generate(&mut self.input, state);
        self.target.desired(&self.input, &mut self.desired);
    }

    /// Run the current input through `net` and return the mean absolute
    /// error against the desired output.
    pub fn evaluate(&mut self, net: &mut LayeredNet) -> Result<f64, GraphError> {
        net.update(&self.input, &mut self.actual)?;
        Ok(mean_abs_error(&self.desired, &self.actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_abs_error_basics() {
        assert_eq!(mean_abs_error(&[], &[]), 0.0);
        assert_eq!(mean_abs_error(&[1.0, 0.0], &[0.5, 0.5]), 0.5);
        assert_eq!(mean_abs_error(&[0.0], &[-2.0]), 2.0);
    }

    #[test]
    fn closures_act_as_collaborators() {
        let source = |input: &mut [f64], state: usize| {
            input[0] = state as f64;
            input[1] = 1.0;
        };
        let target = |input: &[f64], output: &mut [f64]| output[0] = input[0] + input[1];
        let mut t = NetTrainer::new(2, 1, source, target);
        t.generate(4);
        assert_eq!(t.input(), &[4.0, 1.0]);
        assert_eq!(t.desired(), &[5.0]);
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let net = LayeredNet::new(3, 1).unwrap();
        let t = NetTrainer::new(2, 1, |_: &mut [f64], _: usize| {}, |_: &[f64], _: &mut [f64]| {});
        assert_eq!(
            t.check_shape(&net),
            Err(TrainError::Shape {
                expected: (2, 1),
                actual: (3, 1)
            })
        );
    }
}
