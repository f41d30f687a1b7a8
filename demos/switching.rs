//! Provides an example of a switching system: a robot moving along a line whose odometry
//! depends on a hidden mode (moving or stuck) at every step.
//!
//! Run with `RUST_LOG=chimera=trace cargo run --example switching` to see the factor routing.

use chimera as c;
use c::factor::{BetweenFactor, HybridFactor, NonlinearFactor, NonlinearFactorGraph, PriorFactor};
use c::graph::{HybridFactorGraphBuilder, NonlinearHybridFactorGraph};
use c::variable::{all_assignments, default_key_formatter, Assignment, DiscreteKey, Key, Values};

use ndarray::array;
use std::sync::Arc;

fn main() -> c::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let steps = 3;
    let x = |i: u64| Key::symbol('x', i);
    let m = |i: u64| DiscreteKey::binary(Key::symbol('m', i));

    /////////////////////////////////////////////////////
    // Step 1: Build the graph
    //
    // Note: mode 0 is "moving" (odometry of 1.0), mode 1 is "stuck"
    let mut builder = HybridFactorGraphBuilder::<NonlinearFactorGraph>::new()
        .with_factor(HybridFactor::nonlinear(PriorFactor::new(x(0), array![0.0], 0.1)?));

    for i in 0..steps - 1 {
        let moving: Arc<dyn NonlinearFactor> = Arc::new(BetweenFactor::new(x(i), x(i + 1), array![1.0], 0.2)?);
        let stuck: Arc<dyn NonlinearFactor> = Arc::new(BetweenFactor::new(x(i), x(i + 1), array![0.0], 0.2)?);

        builder = builder
            .with_discrete(vec![m(i)], vec![0.8, 0.2])
            .with_dc_mixture(vec![m(i)], vec![moving, stuck]);
    }

    let graph: NonlinearHybridFactorGraph = builder.build()?;
    graph.print("switching system", &default_key_formatter);

    /////////////////////////////////////////////////////
    // Step 2: Linearize at an initial estimate where the robot moved once
    let mut values = Values::new();
    values.insert(x(0), array![0.0])?;
    values.insert(x(1), array![1.0])?;
    values.insert(x(2), array![1.0])?;

    let linear = graph.linearize(&values)?;

    /////////////////////////////////////////////////////
    // Step 3: Sum the mixtures into one Gaussian graph per mode sequence
    let sum = linear.sum()?;
    println!("\n{} hypotheses over {} modes", sum.nr_leaves(), linear.discrete_keys().len());

    /////////////////////////////////////////////////////
    // Step 4: Score every hypothesis at the linearization point
    let mut zero = Values::new();
    for i in 0..steps {
        zero.insert(x(i), array![0.0])?;
    }

    let modes = linear.discrete_keys();
    let mut best: Option<(Assignment, f64)> = None;
    for assignment in all_assignments(&modes) {
        let error = linear.error(&zero, &assignment)?;
        println!("{:<20} error {:8.3}", assignment.format(&default_key_formatter), error);

        if best.as_ref().map_or(true, |(_, e)| error < *e) {
            best = Some((assignment, error));
        }
    }

    if let Some((assignment, error)) = best {
        println!("\nmost likely: {} (error {:.3})", assignment.format(&default_key_formatter), error);
    }

    Ok(())
}
