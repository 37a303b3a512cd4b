use std::fs;

use neuronet::prelude::*;
use neuronet::samples::{RandomAddends, StockRows};

fn table_error(net: &mut LayeredNet) -> f64 {
    let mut y = [0.0];
    let mut sum = 0.0;
    for (row, want) in samples::STOCK_INPUTS.iter().zip(samples::STOCK_OUTPUTS) {
        net.update(row, &mut y).unwrap();
        sum += (want - y[0]).abs();
    }
    sum / samples::STOCK_INPUTS.len() as f64
}

fn xor_net(seed: u64) -> LayeredNet {
    let mut net = LayeredNet::new(2, 1).unwrap();
    net.add_layer(3).unwrap();
    net.connect_groups().unwrap();
    net.connect_layers(0, 2).unwrap();
    net.set_transfer_functions(Transfer::Sigmoid).unwrap();
    net.set_weights(WeightInit::Random, &mut Prng::new(seed))
        .unwrap();
    net
}

#[test]
fn backprop_learns_stock_table() {
    let mut net = LayeredNet::new(6, 1).unwrap();
    net.add_layer(4).unwrap();
    net.connect_groups().unwrap();
    net.set_weights(WeightInit::Random, &mut Prng::new(21))
        .unwrap();
    let before = table_error(&mut net);

    let mut bp = Backprop::new(
        BackpropConfig::default().with_step(2.0),
        6,
        1,
        StockRows::new(5),
        samples::stock_target,
    )
    .unwrap();
    for _ in 0..20_000 {
        bp.train(&mut net, 0).unwrap();
    }

    let after = table_error(&mut net);
    assert!(after < before, "before {before} after {after}");
    assert!(after < 0.25, "after {after}");
}

#[test]
fn backprop_learns_xor() {
    let mut net = xor_net(3);
    let mut bp = Backprop::new(
        BackpropConfig::default().with_step(2.0),
        2,
        1,
        samples::xor_input,
        samples::xor_target,
    )
    .unwrap();

    let mut early = 0.0;
    for s in 0..400 {
        early += bp.train(&mut net, s).unwrap();
    }
    for s in 0..40_000 {
        bp.train(&mut net, s).unwrap();
    }
    let mut late = 0.0;
    for s in 0..400 {
        late += bp.train(&mut net, s).unwrap();
    }
    assert!(late < early, "early {early} late {late}");
}

#[test]
fn saved_file_reloads_bit_for_bit() {
    let mut net = xor_net(17);
    let path = std::env::temp_dir().join(format!("neuronet-test-{}.net", std::process::id()));
    {
        let mut file = fs::File::create(&path).unwrap();
        net.save_to(&mut file).unwrap();
    }
    let mut loaded = {
        let mut file = fs::File::open(&path).unwrap();
        LayeredNet::load_from(&mut file).unwrap()
    };
    let _ = fs::remove_file(&path);

    assert_eq!(loaded.weight_count(), net.weight_count());
    assert_eq!(loaded.layer_count(), 3);
    let mut rng = Prng::new(8);
    let (mut a, mut b) = ([0.0], [0.0]);
    for _ in 0..200 {
        let x = [rng.gen_range_f64(-2.0, 2.0), rng.gen_range_f64(-2.0, 2.0)];
        net.update(&x, &mut a).unwrap();
        loaded.update(&x, &mut b).unwrap();
        assert_eq!(a[0].to_bits(), b[0].to_bits());
    }
}

#[test]
fn evolution_lowers_population_error() {
    let mut trainer = GeneticTrainer::new(
        GeneticConfig::default()
            .with_mutation(0.2, 0.2)
            .with_crossover_rate(0.7)
            .with_seed(4),
        2,
        1,
        RandomAddends::new(4),
        samples::addition_target,
    )
    .unwrap();
    for seed in 0..40 {
        trainer.add_net(xor_net(seed)).unwrap();
    }

    let early: f64 = (0..20).map(|_| trainer.train(0).unwrap()).sum();
    for _ in 0..300 {
        trainer.train(0).unwrap();
    }
    let late: f64 = (0..20).map(|_| trainer.train(0).unwrap()).sum();
    assert!(late < early, "early {early} late {late}");

    let nets = trainer.into_nets();
    assert_eq!(nets.len(), 40);
}

#[test]
fn nested_net_evaluates_inside_outer_net() {
    let mut graph = Graph::new();
    let inner: Net<Layer> = Net::new(&mut graph, 2, 2).unwrap();
    inner.connect_groups(&mut graph).unwrap();

    let mut outer: Net = Net::new(&mut graph, 2, 1).unwrap();
    outer.add_group(Box::new(inner));
    outer.connect_groups(&mut graph).unwrap();
    outer.set_transfer(&mut graph, Transfer::Linear).unwrap();
    outer
        .set_weights(&mut graph, WeightInit::One, &mut Prng::new(1))
        .unwrap();
    outer.verify(&graph).unwrap();

    // Every weight and bias is 1: inner inputs see x0 + x1 + 1, inner outputs
    // 2 * that + 1, the final neuron twice that plus its bias.
    let mut y = [0.0];
    outer.update(&mut graph, &[1.0, 2.0], &mut y).unwrap();
    let inner_in = 1.0 + 2.0 + 1.0;
    let inner_out = 2.0 * inner_in + 1.0;
    assert_eq!(y[0], 2.0 * inner_out + 1.0);
}
