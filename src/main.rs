use std::error::Error;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::{info, warn};

use neuronet::prelude::*;
use neuronet::samples::{RandomAddends, StockRows};

/// Optional `--config` file; missing sections keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DemoConfig {
    backprop: Option<BackpropConfig>,
    genetic: Option<GeneticConfig>,
}

struct Options {
    config: DemoConfig,
    iterations: Option<usize>,
    seed: u64,
    file: Option<PathBuf>,
}

impl Options {
    fn backprop(&self, default_step: f64) -> BackpropConfig {
        self.config
            .backprop
            .unwrap_or_else(|| BackpropConfig::default().with_step(default_step))
    }

    fn iterations(&self, default: usize) -> usize {
        self.iterations.unwrap_or(default)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" || args[1] == "help" {
        print_help();
        return Ok(());
    }

    let opts = parse_options(&args[2..])?;
    match args[1].as_str() {
        "xor" => run_xor(&opts),
        "add" => run_add(&opts),
        "stock" => run_stock(&opts),
        "evolve" => run_evolve(&opts),
        "roundtrip" => run_roundtrip(&opts),
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(2);
        }
    }
}

fn print_help() {
    println!("neuronet (feed-forward nets trained by backprop or evolution)");
    println!("usage:");
    println!("  neuronet xor       [--iterations N] [--seed S] [--config FILE]");
    println!("  neuronet add       [--iterations N] [--seed S] [--config FILE]");
    println!("  neuronet stock     [--iterations N] [--seed S] [--config FILE]");
    println!("  neuronet evolve    [--iterations N] [--seed S] [--config FILE]");
    println!("  neuronet roundtrip [--seed S] [--file PATH]");
    println!("  neuronet help");
    println!();
    println!("FILE is JSON: {{\"backprop\": {{\"step\": 2.0}}, \"genetic\": {{\"mutation_rate\": 0.2}}}}");
}

fn parse_options(args: &[String]) -> Result<Options, Box<dyn Error>> {
    let mut opts = Options {
        config: DemoConfig::default(),
        iterations: None,
        seed: 1,
        file: None,
    };

    let mut it = args.iter();
    while let Some(flag) = it.next() {
        let mut value = || it.next().ok_or_else(|| format!("{flag} needs a value"));
        match flag.as_str() {
            "--config" => {
                let path = value()?;
                let text = fs::read_to_string(path)?;
                opts.config = serde_json::from_str(&text)?;
                info!("loaded config from {}", path);
            }
            "--iterations" => opts.iterations = Some(value()?.parse()?),
            "--seed" => opts.seed = value()?.parse()?,
            "--file" => opts.file = Some(PathBuf::from(value()?)),
            other => return Err(format!("unknown option {other}").into()),
        }
    }
    Ok(opts)
}

/// 2-3-1 sigmoid net with an extra input to output connection.
fn two_three_one(rng: &mut Prng) -> Result<LayeredNet, GraphError> {
    let mut net = LayeredNet::new(2, 1)?;
    net.add_layer(3)?;
    net.connect_groups()?;
    net.connect_layers(0, 2)?;
    net.set_transfer_functions(Transfer::Sigmoid)?;
    net.set_weights(WeightInit::Random, rng)?;
    Ok(net)
}

fn report_every(total: usize) -> usize {
    (total / 20).max(1)
}

fn run_backprop<I: InputSource, T: Target>(
    net: &mut LayeredNet,
    bp: &mut Backprop<I, T>,
    iterations: usize,
    states: usize,
) -> Result<f64, TrainError> {
    let every = report_every(iterations);
    let mut error = 0.0;
    for i in 0..iterations {
        error = bp.train(net, i % states)?;
        if (i + 1) % every == 0 {
            info!(iteration = i + 1, error, "backprop");
        }
    }
    Ok(error)
}

fn run_xor(opts: &Options) -> Result<(), Box<dyn Error>> {
    let mut rng = Prng::new(opts.seed);
    let mut net = two_three_one(&mut rng)?;
    let mut bp = Backprop::new(
        opts.backprop(2.0),
        2,
        1,
        samples::xor_input,
        samples::xor_target,
    )?;
    run_backprop(&mut net, &mut bp, opts.iterations(40_000), 4)?;

    let mut x = [0.0; 2];
    let mut y = [0.0];
    for state in 0..4 {
        samples::xor_input(&mut x, state);
        net.update(&x, &mut y)?;
        println!("{} xor {} = {:.4}", x[0], x[1], y[0]);
    }
    Ok(())
}

fn run_add(opts: &Options) -> Result<(), Box<dyn Error>> {
    let mut rng = Prng::new(opts.seed);
    let mut net = two_three_one(&mut rng)?;
    let mut bp = Backprop::new(
        opts.backprop(10.0),
        2,
        1,
        samples::addition_grid_input,
        samples::addition_target,
    )?;
    run_backprop(&mut net, &mut bp, opts.iterations(100_000), 100)?;

    let mut y = [0.0];
    for x in [[0.1, 0.2], [0.25, 0.5], [0.4, 0.45]] {
        net.update(&x, &mut y)?;
        println!("{} + {} = {:.4}", x[0], x[1], y[0]);
    }
    Ok(())
}

fn run_stock(opts: &Options) -> Result<(), Box<dyn Error>> {
    let mut rng = Prng::new(opts.seed);
    let mut net = LayeredNet::new(6, 1)?;
    net.add_layer(4)?;
    net.connect_groups()?;
    net.set_transfer_functions(Transfer::Sigmoid)?;
    net.set_weights(WeightInit::Random, &mut rng)?;

    let mut bp = Backprop::new(
        opts.backprop(10.0),
        6,
        1,
        StockRows::new(opts.seed),
        samples::stock_target,
    )?;
    run_backprop(&mut net, &mut bp, opts.iterations(20_000), 1)?;

    let mut y = [0.0];
    for (row, want) in samples::STOCK_INPUTS.iter().zip(samples::STOCK_OUTPUTS) {
        net.update(row, &mut y)?;
        println!("{row:?} -> {:.4} (expected {want})", y[0]);
    }
    Ok(())
}

fn run_evolve(opts: &Options) -> Result<(), Box<dyn Error>> {
    let config = opts.config.genetic.unwrap_or_else(|| {
        GeneticConfig::default()
            .with_mutation(0.2, 0.2)
            .with_crossover_rate(0.7)
            .with_seed(opts.seed)
    });
    let mut trainer = GeneticTrainer::new(
        config,
        2,
        1,
        RandomAddends::new(opts.seed),
        samples::addition_target,
    )?;

    let mut rng = Prng::new(opts.seed);
    for _ in 0..100 {
        trainer.add_net(two_three_one(&mut rng)?)?;
    }

    let generations = opts.iterations(100);
    let every = report_every(generations);
    for g in 0..generations {
        let error = trainer.train(0)?;
        if (g + 1) % every == 0 {
            info!(generation = g + 1, error, "evolve");
        }
    }

    let mut nets = trainer.into_nets();
    let Some(net) = nets.first_mut() else {
        warn!("population is empty");
        return Ok(());
    };
    let mut y = [0.0];
    for x in [[0.1, 0.2], [0.25, 0.5], [0.4, 0.45]] {
        net.update(&x, &mut y)?;
        println!("{} + {} = {:.4}", x[0], x[1], y[0]);
    }
    Ok(())
}

fn run_roundtrip(opts: &Options) -> Result<(), Box<dyn Error>> {
    let mut rng = Prng::new(opts.seed);
    let mut net = two_three_one(&mut rng)?;
    let mut bp = Backprop::new(
        opts.backprop(2.0),
        2,
        1,
        samples::xor_input,
        samples::xor_target,
    )?;
    run_backprop(&mut net, &mut bp, opts.iterations(4_000), 4)?;

    let path = opts
        .file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("neuronet-xor.net"));
    fs::write(&path, net.save_bytes()?)?;
    info!("saved {} bytes to {}", net.encoded_len()?, path.display());

    let mut loaded = LayeredNet::load_bytes(&fs::read(&path)?)?;
    let mut identical = true;
    let (mut a, mut b) = ([0.0], [0.0]);
    for _ in 0..100 {
        let x = [rng.next_f64(), rng.next_f64()];
        net.update(&x, &mut a)?;
        loaded.update(&x, &mut b)?;
        identical &= a[0].to_bits() == b[0].to_bits();
    }
    println!(
        "round trip through {}: {}",
        path.display(),
        if identical { "identical outputs" } else { "outputs differ" }
    );
    Ok(())
}
