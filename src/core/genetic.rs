//! Population training: one chromosome per net, roulette selection,
//! single-point crossover and per-gene mutation.

use std::mem;

use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::TrainError;
use crate::graph::WeightInit;
use crate::layered::LayeredNet;
use crate::prng::Prng;
use crate::trainer::{InputSource, NetTrainer, Target};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GeneticConfig {
    /// Per-gene mutation probability; 0.05 to 0.2 works well.
    pub mutation_rate: f64,
    /// Largest offset a mutation adds or subtracts.
    pub mutation_offset: f64,
    /// Probability that a selected pair is spliced instead of copied.
    pub crossover_rate: f64,

    // If set, makes evolution reproducible.
    pub seed: Option<u64>,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            mutation_rate: 0.1,
            mutation_offset: 0.3,
            crossover_rate: 0.7,
            seed: None,
        }
    }
}

impl GeneticConfig {
    pub fn with_mutation(mut self, rate: f64, max_offset: f64) -> Self {
        self.mutation_rate = rate;
        self.mutation_offset = max_offset;
        self
    }

    pub fn with_crossover_rate(mut self, rate: f64) -> Self {
        self.crossover_rate = rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err("mutation_rate must be in [0, 1]");
        }
        if !self.mutation_offset.is_finite() || self.mutation_offset < 0.0 {
            return Err("mutation_offset must be finite and >= 0");
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return Err("crossover_rate must be in [0, 1]");
        }
        Ok(())
    }
}

/// A flat weight vector with a second buffer the next generation is bred
/// into.
#[derive(Debug, Clone, PartialEq)]
pub struct Chromosome {
    genes: Vec<f64>,
    next: Vec<f64>,
    fitness: f64,
}

impl Chromosome {
    pub fn new(gene_count: usize) -> Self {
        Self::from_genes(vec![0.0; gene_count])
    }

    pub fn from_genes(genes: Vec<f64>) -> Self {
        let next = vec![0.0; genes.len()];
        Self {
            genes,
            next,
            fitness: 0.0,
        }
    }

    pub fn gene_count(&self) -> usize {
        self.genes.len()
    }

    pub fn genes(&self) -> &[f64] {
        &self.genes
    }

    pub fn genes_mut(&mut self) -> &mut [f64] {
        &mut self.genes
    }

    /// Genes bred for the next generation, not yet swapped in.
    pub fn next_genes(&self) -> &[f64] {
        &self.next
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub fn set_fitness(&mut self, fitness: f64) {
        self.fitness = fitness;
    }

    pub fn set_genes(&mut self, init: WeightInit, rng: &mut Prng) {
        for g in &mut self.genes {
            *g = init.sample(rng);
        }
    }

    /// With probability `rate`, independently per gene, add a uniform offset
    /// in `[-max_offset, max_offset)`.
    pub fn mutate(&mut self, rate: f64, max_offset: f64, rng: &mut Prng) {
        for g in &mut self.genes {
            if rng.next_f64() < rate {
                *g += rng.gen_range_f64(-1.0, 1.0) * max_offset;
            }
        }
    }

    /// Make the bred genes current.
    pub fn advance(&mut self) {
        mem::swap(&mut self.genes, &mut self.next);
    }
}

/// Breed two children from two parents.
///
/// With probability `1 - rate`, or when both parents are the same
/// chromosome, the children are plain copies. Otherwise a split point `p` is
/// drawn from `[0, gene_count]`: `child_a` takes `a[..p]` and `b[p..]`,
/// `child_b` the complement. All four lengths must agree; on mismatch nothing
/// is written.
pub fn crossover(
    a: &Chromosome,
    b: &Chromosome,
    child_a: &mut [f64],
    child_b: &mut [f64],
    rate: f64,
    rng: &mut Prng,
) -> Result<(), TrainError> {
    let n = a.gene_count();
    for len in [b.gene_count(), child_a.len(), child_b.len()] {
        if len != n {
            return Err(TrainError::GeneCountMismatch {
                expected: n,
                actual: len,
            });
        }
    }

    if rng.next_f64() >= rate || std::ptr::eq(a, b) {
        child_a.copy_from_slice(&a.genes);
        child_b.copy_from_slice(&b.genes);
        return Ok(());
    }

    let p = rng.gen_range_usize(0, n + 1);
    child_a[..p].copy_from_slice(&a.genes[..p]);
    child_a[p..].copy_from_slice(&b.genes[p..]);
    child_b[..p].copy_from_slice(&b.genes[..p]);
    child_b[p..].copy_from_slice(&a.genes[p..]);
    Ok(())
}

/// Evolves a population of structurally identical nets.
#[derive(Debug, Clone)]
pub struct GeneticTrainer<I, T> {
    config: GeneticConfig,
    rng: Prng,
    trainer: NetTrainer<I, T>,
    nets: Vec<LayeredNet>,
    chromosomes: Vec<Chromosome>,
    gene_count: Option<usize>,
}

impl<I: InputSource, T: Target> GeneticTrainer<I, T> {
    pub fn new(
        config: GeneticConfig,
        input_count: usize,
        output_count: usize,
        source: I,
        target: T,
    ) -> Result<Self, TrainError> {
        config.validate().map_err(TrainError::Config)?;
        debug!(
            mutation_rate = config.mutation_rate,
            mutation_offset = config.mutation_offset,
            crossover_rate = config.crossover_rate,
            seed = ?config.seed,
            "genetic trainer ready"
        );
        Ok(Self {
            config,
            rng: Prng::new(config.seed.unwrap_or(1)),
            trainer: NetTrainer::new(input_count, output_count, source, target),
            nets: Vec::new(),
            chromosomes: Vec::new(),
            gene_count: None,
        })
    }

    pub fn config(&self) -> &GeneticConfig {
        &self.config
    }

    pub fn rng_mut(&mut self) -> &mut Prng {
        &mut self.rng
    }

    pub fn trainer(&self) -> &NetTrainer<I, T> {
        &self.trainer
    }

    /// Register a net and copy its current weights into a new chromosome.
    /// Every net must have the trainer's shape and the same weight count as
    /// the first one added. Returns the net's index.
    pub fn add_net(&mut self, net: LayeredNet) -> Result<usize, TrainError> {
        self.trainer.check_shape(&net)?;
        let weights = net.weights();
        match self.gene_count {
            Some(expected) if expected != weights.len() => {
                return Err(TrainError::GeneCountMismatch {
                    expected,
                    actual: weights.len(),
                });
            }
            Some(_) => {}
            None => self.gene_count = Some(weights.len()),
        }
        self.chromosomes.push(Chromosome::from_genes(weights));
        self.nets.push(net);
        Ok(self.nets.len() - 1)
    }

    /// Drop every net and chromosome, handing the nets back.
    pub fn remove_nets(&mut self) -> Vec<LayeredNet> {
        self.chromosomes.clear();
        self.gene_count = None;
        mem::take(&mut self.nets)
    }

    pub fn into_nets(self) -> Vec<LayeredNet> {
        self.nets
    }

    pub fn nets(&self) -> &[LayeredNet] {
        &self.nets
    }

    /// Direct access to the nets. Weight edits are not seen by the
    /// chromosomes until [`GeneticTrainer::reload_genes`].
    pub fn nets_mut(&mut self) -> &mut [LayeredNet] {
        &mut self.nets
    }

    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }

    pub fn gene_count(&self) -> Option<usize> {
        self.gene_count
    }

    /// Copy every net's weights back into its chromosome.
    pub fn reload_genes(&mut self) {
        for (net, chromosome) in self.nets.iter().zip(&mut self.chromosomes) {
            chromosome.genes = net.weights();
        }
    }

    /// Overwrite every chromosome with fresh genes and push them to the nets.
    pub fn randomize(&mut self, init: WeightInit) -> Result<(), TrainError> {
        for (net, chromosome) in self.nets.iter_mut().zip(&mut self.chromosomes) {
            chromosome.set_genes(init, &mut self.rng);
            net.set_weights_from(&chromosome.genes)?;
        }
        Ok(())
    }

    pub fn fitness_total(&self) -> f64 {
        self.chromosomes.iter().map(|c| c.fitness).sum()
    }

    /// Roulette lookup: the first chromosome whose cumulative fitness reaches
    /// `value`. `None` once `value` exceeds the total.
    pub fn select(&self, value: f64) -> Option<usize> {
        let mut cumulative = 0.0;
        for (i, c) in self.chromosomes.iter().enumerate() {
            cumulative += c.fitness;
            if value <= cumulative {
                return Some(i);
            }
        }
        None
    }

    /// Breed the next generation into each chromosome's spare buffer,
    /// two slots at a time. With an odd population the last slot keeps only
    /// the second child of its pair, the one led by the second parent.
    pub fn create_population(&mut self) -> Result<(), TrainError> {
        let n = self.chromosomes.len();
        let total = self.fitness_total();
        let rate = self.config.crossover_rate;

        let mut next: Vec<Vec<f64>> = self
            .chromosomes
            .iter_mut()
            .map(|c| mem::take(&mut c.next))
            .collect();
        let mut spare = vec![0.0; self.gene_count.unwrap_or(0)];

        let mut bred = Ok(());
        let mut i = 0;
        while i < n {
            let (va, vb) = (
                self.rng.gen_range_f64(0.0, total),
                self.rng.gen_range_f64(0.0, total),
            );
            let a = self.select(va).unwrap_or(i);
            let b = self.select(vb).unwrap_or(i);
            let (pa, pb) = (&self.chromosomes[a], &self.chromosomes[b]);
            bred = if i + 1 < n {
                let (left, right) = next.split_at_mut(i + 1);
                crossover(pa, pb, &mut left[i], &mut right[0], rate, &mut self.rng)
            } else {
                crossover(pa, pb, &mut spare, &mut next[i], rate, &mut self.rng)
            };
            if bred.is_err() {
                break;
            }
            i += 2;
        }

        for (c, buf) in self.chromosomes.iter_mut().zip(next) {
            c.next = buf;
        }
        bred
    }

    /// One generation for `state`. Returns the population's mean error.
    ///
    /// If any net fails to evaluate, or a net's weight count no longer
    /// matches the chromosomes, no new generation is produced and every net
    /// keeps its weights.
    pub fn train(&mut self, state: usize) -> Result<f64, TrainError> {
        let n = self.nets.len();
        if n < 2 {
            return Err(TrainError::PopulationTooSmall(n));
        }
        let expected = self.gene_count.unwrap_or(0);
        if let Some(actual) = self
            .nets
            .iter()
            .map(LayeredNet::weight_count)
            .find(|&count| count != expected)
        {
            return Err(TrainError::GeneCountMismatch { expected, actual });
        }

        self.trainer.generate(state);
        let mut error_sum = 0.0;
        for (net, chromosome) in self.nets.iter_mut().zip(&mut self.chromosomes) {
            let error = self.trainer.evaluate(net)?;
            chromosome.fitness = (1.0 - error).exp();
            error_sum += error;
        }
        let best = self
            .chromosomes
            .iter()
            .map(|c| c.fitness)
            .fold(f64::MIN, f64::max);

        self.create_population()?;

        let (rate, offset) = (self.config.mutation_rate, self.config.mutation_offset);
        for (net, chromosome) in self.nets.iter_mut().zip(&mut self.chromosomes) {
            chromosome.advance();
            chromosome.mutate(rate, offset, &mut self.rng);
            net.set_weights_from(&chromosome.genes)?;
        }

        let mean = error_sum / n as f64;
        debug!(state, population = n, mean_error = mean, best_fitness = best, "generation");
        Ok(mean)
    }
}
