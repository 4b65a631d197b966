// SPDX-License-Identifier: AGPL-3.0-only

//! `analog` — command-line interface for analog tile layers.
//!
//! ```text
//! USAGE:
//!   analog backends                  List backends and whether they are compiled in
//!   analog roundtrip [options]       Write weights through a layer and report read-back error
//!   analog migrate --to <backend>    Move a layer between backends and check its output
//! ```

use analog_nn::prelude::*;
use analog_tile::available_backends;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ndarray::{Array1, Array2, ArrayD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "analog", about = "Analog tile layer CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List tile backends and whether this build includes them.
    Backends,
    /// Write uniform weights through a layer and report the read-back deviation.
    Roundtrip {
        /// Input features.
        #[arg(long = "in", default_value_t = 16)]
        in_features: usize,
        /// Output features.
        #[arg(long = "out", default_value_t = 8)]
        out_features: usize,
        /// Build the layer without a bias.
        #[arg(long)]
        no_bias: bool,
        /// Use realistic (noisy) reads and writes.
        #[arg(long)]
        realistic: bool,
        /// Scale weights so the largest magnitude becomes this value (0 = off).
        #[arg(long, default_value_t = 0.0)]
        omega: f32,
        /// Seed for weights and tile noise.
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Build a layer on the CPU, migrate it and compare its output.
    Migrate {
        /// Target backend (cpu, cuda).
        #[arg(long)]
        to: Backend,
        /// Seed for weights and input.
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Backends => cmd_backends(),
        Cmd::Roundtrip {
            in_features,
            out_features,
            no_bias,
            realistic,
            omega,
            seed,
        } => cmd_roundtrip(in_features, out_features, !no_bias, realistic, omega, seed)?,
        Cmd::Migrate { to, seed } => cmd_migrate(to, seed)?,
    }

    Ok(())
}

fn cmd_backends() {
    let compiled = available_backends();
    println!("Tile backends:");
    for backend in Backend::ALL {
        let status = if compiled.contains(&backend) {
            "available"
        } else {
            "not compiled"
        };
        println!("  {backend:<6} {status}");
    }
}

/// Max and mean absolute deviation between two equally long sequences.
fn deviation<'a>(
    got: impl IntoIterator<Item = &'a f32>,
    want: impl IntoIterator<Item = &'a f32>,
) -> (f32, f32) {
    let (mut max, mut sum, mut n) = (0.0f32, 0.0f32, 0usize);
    for (g, w) in got.into_iter().zip(want) {
        let d = (g - w).abs();
        max = max.max(d);
        sum += d;
        n += 1;
    }
    (max, if n == 0 { 0.0 } else { sum / n as f32 })
}

fn cmd_roundtrip(
    in_features: usize,
    out_features: usize,
    bias: bool,
    realistic: bool,
    omega: f32,
    seed: u64,
) -> Result<()> {
    let config = RpuConfig::default().with_seed(seed);
    let mut layer = AnalogLinear::new(in_features, out_features, bias, &config, realistic, omega)
        .context("Failed to build layer")?;

    let mut rng = StdRng::seed_from_u64(seed);
    let w = Array2::from_shape_fn((out_features, in_features), |_| rng.gen_range(-0.5f32..=0.5));
    let b = bias.then(|| Array1::from_shape_fn(out_features, |_| rng.gen_range(-0.5f32..=0.5)));

    layer
        .set_weights(w.view(), b.as_ref().map(Array1::view))
        .context("Failed to write weights")?;
    let (rw, rb) = layer.get_weights().context("Failed to read weights")?;
    info!("roundtrip {out_features}×{in_features} realistic={realistic} omega={omega}");

    println!("Layer        : {in_features} → {out_features} (bias={bias})");
    println!("Tile         : {} on {}", layer.analog_tile().kind(), layer.analog_tile().backend());
    println!("Realistic    : {realistic}");
    println!("Omega        : {omega}");

    let (max, mean) = deviation(&rw, &w);
    println!("Weights      : max |Δ| = {max:.6}   mean |Δ| = {mean:.6}");
    if let (Some(rb), Some(b)) = (&rb, &b) {
        let (max, mean) = deviation(rb, b);
        println!("Bias         : max |Δ| = {max:.6}   mean |Δ| = {mean:.6}");
    }

    let state = layer.analog_tile().state();
    let tile_max = state.weights.iter().fold(0.0f32, |m, x| m.max(x.abs()));
    println!("Tile max |w| : {tile_max:.6}   (alpha = {:.6})", state.out_scaling_alpha);

    Ok(())
}

fn cmd_migrate(to: Backend, seed: u64) -> Result<()> {
    if !to.is_compiled() {
        bail!("Backend {to} is not compiled into this build");
    }

    let config = RpuConfig::ideal().with_seed(seed);
    let mut layer =
        AnalogLinear::new(8, 4, true, &config, false, 0.0).context("Failed to build layer")?;
    layer.eval();

    let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);
    let x: ArrayD<f32> = Array2::from_shape_fn((3, 8), |_| rng.gen_range(-1.0f32..1.0)).into_dyn();

    let before = layer.forward(x.view())?;
    println!(
        "Before : {} on {}",
        layer.analog_tile().kind(),
        layer.analog_tile().backend()
    );

    layer
        .migrate(to)
        .with_context(|| format!("Failed to migrate to {to}"))?;
    println!(
        "After  : {} on {}",
        layer.analog_tile().kind(),
        layer.analog_tile().backend()
    );

    let after = layer.forward(x.view())?;
    let (max, _) = deviation(&after, &before);
    if max > 0.0 {
        bail!("Forward output changed after migration (max |Δ| = {max})");
    }
    println!("Output : unchanged ({} values compared)", after.len());

    Ok(())
}
