//! Reference training data used by the demo binary, tests and benches.

use crate::prng::Prng;
use crate::trainer::InputSource;

/// Feature rows of the small binary classification table.
pub const STOCK_INPUTS: [[f64; 6]; 9] = [
    [0.1, 0.2, 0.4, 0.22, 0.78, 0.9],
    [0.3, 0.6, 0.4, 0.32, 0.18, 0.1],
    [0.2, 0.7, 0.4, 0.72, 0.28, 0.2],
    [0.4, 0.8, 0.4, 0.72, 0.38, 0.4],
    [0.1, 0.8, 0.4, 0.12, 0.48, 0.7],
    [0.7, 0.2, 0.4, 0.62, 0.78, 0.6],
    [0.9, 0.1, 0.4, 0.27, 0.88, 0.0],
    [0.7, 0.2, 0.4, 0.27, 0.72, 0.3],
    [0.1, 0.2, 0.4, 0.29, 0.71, 0.9],
];

/// Expected class of each row in [`STOCK_INPUTS`].
pub const STOCK_OUTPUTS: [f64; 9] = [1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0];

/// The four XOR patterns, cycled by `state`.
pub fn xor_input(input: &mut [f64], state: usize) {
    let (a, b) = match state % 4 {
        0 => (0.0, 0.0),
        1 => (1.0, 0.0),
        2 => (0.0, 1.0),
        _ => (1.0, 1.0),
    };
    input[0] = a;
    input[1] = b;
}

pub fn xor_target(input: &[f64], output: &mut [f64]) {
    let a = input[0] != 0.0;
    let b = input[1] != 0.0;
    output[0] = if a != b { 1.0 } else { 0.0 };
}

/// Addends on a 0.1 grid: `state` in `0..100` picks `(state / 10, state % 10)`.
/// Learns much faster than uniformly random addends.
pub fn addition_grid_input(input: &mut [f64], state: usize) {
    let state = state % 100;
    input[0] = (state / 10) as f64 * 0.1;
    input[1] = (state % 10) as f64 * 0.1;
}

pub fn addition_target(input: &[f64], output: &mut [f64]) {
    output[0] = input[0] + input[1];
}

/// Two uniformly random addends in `[0, 1)`; ignores `state`.
#[derive(Debug, Clone)]
pub struct RandomAddends {
    rng: Prng,
}

impl RandomAddends {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Prng::new(seed),
        }
    }
}

impl InputSource for RandomAddends {
    fn generate(&mut self, input: &mut [f64], _state: usize) {
        input[0] = self.rng.next_f64();
        input[1] = self.rng.next_f64();
    }
}

/// Draws a random row of [`STOCK_INPUTS`]; ignores `state`.
#[derive(Debug, Clone)]
pub struct StockRows {
    rng: Prng,
}

impl StockRows {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Prng::new(seed),
        }
    }
}

impl InputSource for StockRows {
    fn generate(&mut self, input: &mut [f64], _state: usize) {
        let row = self.rng.gen_range_usize(0, STOCK_INPUTS.len());
        input.copy_from_slice(&STOCK_INPUTS[row]);
    }
}

/// Looks the input up in [`STOCK_INPUTS`]; leaves `output` alone when no row
/// matches.
pub fn stock_target(input: &[f64], output: &mut [f64]) {
    if let Some(row) = STOCK_INPUTS.iter().position(|r| r[..] == *input) {
        output[0] = STOCK_OUTPUTS[row];
    }
}
