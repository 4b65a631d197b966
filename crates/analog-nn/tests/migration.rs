// SPDX-License-Identifier: AGPL-3.0-only

//! Device placement tests
//!
//! Moving layers and containers between backends, and plugging custom tile
//! classes in through the configuration's factory.

use analog_nn::prelude::*;
use analog_tile::{DefaultTileFactory, TileFactory, TileShape, TileState, Weights};
use ndarray::{array, ArrayD};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn ideal_layer(in_features: usize, out_features: usize) -> AnalogLinear {
    let config = RpuConfig::ideal().with_seed(21);
    AnalogLinear::new(in_features, out_features, true, &config, false, 0.0).expect("layer")
}

fn sample_output(layer: &mut impl AnalogModule, width: usize) -> ArrayD<f32> {
    let x = ndarray::Array2::from_shape_fn((2, width), |(i, j)| (i + j) as f32 * 0.25 - 0.5);
    layer.forward(x.into_dyn().view()).expect("forward")
}

/// Migrating to the current backend changes nothing
#[test]
fn test_same_backend_is_noop() {
    let mut layer = ideal_layer(3, 2);
    let before = layer.analog_tile().state();

    layer.migrate(Backend::Cpu).expect("cpu→cpu");

    assert_eq!(layer.backend(), Some(Backend::Cpu));
    assert_eq!(layer.analog_tile().kind(), "AnalogTile");
    assert_eq!(layer.analog_tile().state(), before);
}

/// CPU → CUDA → CPU keeps weights, scale and forward output
#[cfg(feature = "cuda")]
#[test]
fn test_layer_round_trip_through_cuda() {
    let config = RpuConfig::ideal().with_seed(3);
    let mut layer = AnalogLinear::new(4, 3, true, &config, false, 0.7).expect("layer");
    layer.eval();
    let weights = layer.get_weights().expect("read");
    let alpha = layer.analog_tile().out_scaling_alpha();
    let y_cpu = sample_output(&mut layer, 4);

    layer.migrate(Backend::Cuda).expect("cpu→cuda");
    assert_eq!(layer.backend(), Some(Backend::Cuda));
    assert_eq!(layer.analog_tile().kind(), "CudaAnalogTile");
    assert_eq!(layer.analog_tile().out_scaling_alpha(), alpha);
    assert_eq!(layer.get_weights().expect("read"), weights);
    assert_eq!(sample_output(&mut layer, 4), y_cpu);

    layer.migrate(Backend::Cuda).expect("cuda→cuda");
    assert_eq!(layer.analog_tile().kind(), "CudaAnalogTile");

    layer.migrate(Backend::Cpu).expect("cuda→cpu");
    assert_eq!(layer.analog_tile().kind(), "AnalogTile");
    assert_eq!(sample_output(&mut layer, 4), y_cpu);
}

/// A layer can be built directly on the accelerator
#[cfg(feature = "cuda")]
#[test]
fn test_build_on_cuda() {
    let config = RpuConfig::default().with_seed(8);
    let mut layer =
        AnalogLinear::on_backend(2, 2, false, &config, true, 0.0, Backend::Cuda).expect("layer");
    assert_eq!(layer.backend(), Some(Backend::Cuda));
    assert_eq!(layer.analog_tile().kind(), "CudaAnalogTile");
    let (weight, bias) = layer.get_weights_exact().expect("exact read");
    assert_eq!(&weight, layer.weight());
    assert!(bias.is_none());
}

/// Pending updates survive a move and land on the new tile
#[cfg(feature = "cuda")]
#[test]
fn test_pending_update_follows_tile() {
    let mut layer = ideal_layer(2, 2);
    layer
        .forward(array![[1.0f32, 0.0]].into_dyn().view())
        .expect("forward");
    layer
        .backward(array![[1.0f32, 0.0]].into_dyn().view())
        .expect("backward");
    let before = layer.get_weights_exact().expect("exact read").0;

    layer.migrate(Backend::Cuda).expect("cpu→cuda");
    assert_eq!(layer.update(0.1).expect("update"), 1);

    let after = layer.get_weights_exact().expect("exact read").0;
    assert!((after[[0, 0]] - (before[[0, 0]] - 0.1)).abs() < 1e-6);
    assert_eq!(after[[1, 1]], before[[1, 1]]);
}

/// Without the accelerator the move is refused and nothing changes
#[cfg(not(feature = "cuda"))]
#[test]
fn test_cuda_unavailable() {
    let mut layer = ideal_layer(3, 2);
    let before = layer.analog_tile().state();

    let err = layer.migrate(Backend::Cuda).expect_err("no cuda");
    assert_eq!(err, TileError::backend_unavailable(Backend::Cuda));
    assert_eq!(layer.backend(), Some(Backend::Cpu));
    assert_eq!(layer.analog_tile().state(), before);

    let mut net = AnalogSequential::new().add(ideal_layer(3, 2));
    assert!(net.cuda().is_err());
    assert_eq!(net.backend(), Some(Backend::Cpu));

    let err = AnalogLinear::on_backend(2, 2, true, &RpuConfig::default(), false, 0.0, Backend::Cuda)
        .expect_err("no cuda");
    assert_eq!(err, TileError::backend_unavailable(Backend::Cuda));
}

/// Realistic reads on the moved tile continue the noise stream instead of
/// replaying the draws the source tile already made
#[cfg(feature = "cuda")]
#[test]
fn test_realistic_reads_stay_independent_across_moves() {
    let config = RpuConfig::default().with_read_noise(0.05).with_seed(13);
    let mut layer = AnalogLinear::new(4, 3, true, &config, true, 0.0).expect("layer");
    let first = layer.get_weights().expect("read");

    layer.migrate(Backend::Cuda).expect("cpu→cuda");
    let second = layer.get_weights().expect("read");
    layer.migrate(Backend::Cpu).expect("cuda→cpu");
    let third = layer.get_weights().expect("read");

    assert_ne!(first, second);
    assert_ne!(second, third);
    assert_ne!(first, third);
    // the stored weights themselves did not move
    let exact = layer.get_weights_exact().expect("exact read");
    assert_eq!(exact.0, *layer.weight());
}

/// Containers move every child
#[cfg(feature = "cuda")]
#[test]
fn test_sequential_moves_all_children() {
    let mut net = AnalogSequential::new()
        .add(ideal_layer(4, 6))
        .add(ideal_layer(6, 2));
    net.eval();
    let y = sample_output(&mut net, 4);

    net.cuda().expect("to cuda");
    assert!(net
        .analog_tiles()
        .iter()
        .all(|t| t.backend() == Backend::Cuda && t.kind() == "CudaAnalogTile"));
    assert_eq!(sample_output(&mut net, 4), y);

    net.cpu().expect("to cpu");
    assert!(net.analog_tiles().iter().all(|t| t.backend() == Backend::Cpu));
    assert_eq!(sample_output(&mut net, 4), y);
}

/// Builds CPU tiles and refuses every other backend
#[derive(Debug)]
struct CpuOnlyFactory;

impl TileFactory for CpuOnlyFactory {
    fn create(
        &self,
        shape: TileShape,
        config: &RpuConfig,
        backend: Backend,
    ) -> analog_nn::Result<Box<dyn AnalogTile>> {
        match backend {
            Backend::Cpu => DefaultTileFactory.create(shape, config, backend),
            other => Err(TileError::backend_unavailable(other)),
        }
    }

    fn name(&self) -> &'static str {
        "cpu-only"
    }
}

/// A move the factory refuses leaves the layer exactly as it was
#[test]
fn test_refused_move_keeps_old_tile() {
    let config = RpuConfig::ideal()
        .with_seed(6)
        .with_tile_factory(Arc::new(CpuOnlyFactory));
    let mut layer = AnalogLinear::new(3, 2, true, &config, false, 0.5).expect("layer");
    layer.eval();
    let state = layer.analog_tile().state();
    let shadow = (layer.weight().clone(), layer.bias().cloned());
    let y = sample_output(&mut layer, 3);

    let err = layer.migrate(Backend::Cuda).expect_err("refused");
    assert_eq!(err, TileError::backend_unavailable(Backend::Cuda));

    assert_eq!(layer.backend(), Some(Backend::Cpu));
    assert_eq!(layer.analog_tile().kind(), "AnalogTile");
    assert_eq!(layer.analog_tile().state(), state);
    assert_eq!((layer.weight().clone(), layer.bias().cloned()), shadow);
    assert_eq!(sample_output(&mut layer, 3), y);

    let mut net = AnalogSequential::new().add(layer);
    assert!(net.cuda().is_err());
    assert_eq!(net.backend(), Some(Backend::Cpu));
    assert_eq!(net.analog_tiles()[0].state(), state);
}

// -- custom tile classes ------------------------------------------------------

/// Tile that reports its own class name and counts reads
#[derive(Debug)]
struct CountingTile {
    inner: Box<dyn AnalogTile>,
    reads: Arc<AtomicUsize>,
}

impl AnalogTile for CountingTile {
    fn shape(&self) -> TileShape {
        self.inner.shape()
    }
    fn backend(&self) -> Backend {
        self.inner.backend()
    }
    fn kind(&self) -> &'static str {
        "CountingTile"
    }
    fn config(&self) -> &RpuConfig {
        self.inner.config()
    }
    fn set_weights(&mut self, w: &[f32], b: Option<&[f32]>, realistic: bool) -> analog_nn::Result<()> {
        self.inner.set_weights(w, b, realistic)
    }
    fn set_weights_scaled(
        &mut self,
        w: &[f32],
        b: Option<&[f32]>,
        realistic: bool,
        omega: f32,
    ) -> analog_nn::Result<()> {
        self.inner.set_weights_scaled(w, b, realistic, omega)
    }
    fn get_weights(&mut self, realistic: bool) -> Weights {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.inner.get_weights(realistic)
    }
    fn get_weights_scaled(&mut self, realistic: bool) -> Weights {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.inner.get_weights_scaled(realistic)
    }
    fn out_scaling_alpha(&self) -> f32 {
        self.inner.out_scaling_alpha()
    }
    fn forward(&mut self, x: &[f32], batch: usize, inference: bool) -> analog_nn::Result<Vec<f32>> {
        self.inner.forward(x, batch, inference)
    }
    fn backward(&self, d: &[f32], batch: usize) -> analog_nn::Result<Vec<f32>> {
        self.inner.backward(d, batch)
    }
    fn update(&mut self, x: &[f32], d: &[f32], batch: usize, lr: f32) -> analog_nn::Result<()> {
        self.inner.update(x, d, batch, lr)
    }
    fn state(&self) -> TileState {
        self.inner.state()
    }
    fn restore(&mut self, state: TileState) -> analog_nn::Result<()> {
        self.inner.restore(state)
    }
    fn fork_noise_seed(&mut self) -> Option<u64> {
        self.inner.fork_noise_seed()
    }
}

#[derive(Debug, Default)]
struct CountingFactory {
    created: AtomicUsize,
    reads: Arc<AtomicUsize>,
}

impl TileFactory for CountingFactory {
    fn create(
        &self,
        shape: TileShape,
        config: &RpuConfig,
        backend: Backend,
    ) -> analog_nn::Result<Box<dyn AnalogTile>> {
        self.created.fetch_add(1, Ordering::Relaxed);
        let inner = DefaultTileFactory.create(shape, config, backend)?;
        Ok(Box::new(CountingTile {
            inner,
            reads: Arc::clone(&self.reads),
        }))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// The layer only ever talks to the tile the configured factory built
#[test]
fn test_custom_tile_factory() {
    let factory = Arc::new(CountingFactory::default());
    let config = RpuConfig::ideal()
        .with_seed(4)
        .with_tile_factory(factory.clone());
    let mut layer = AnalogLinear::new(3, 2, true, &config, false, 0.0).expect("layer");

    assert_eq!(layer.analog_tile().kind(), "CountingTile");
    assert_eq!(factory.created.load(Ordering::Relaxed), 1);

    let reads = factory.reads.load(Ordering::Relaxed);
    let w = array![[0.1f32, 0.2, 0.3], [0.4, 0.5, 0.6]];
    layer
        .set_weights(w.view(), Some(array![0.0f32, 1.0].view()))
        .expect("set_weights");
    assert_eq!(layer.get_weights().expect("read").0, w);
    // one shadow refresh plus one explicit read
    assert_eq!(factory.reads.load(Ordering::Relaxed), reads + 2);

    #[cfg(feature = "cuda")]
    {
        layer.migrate(Backend::Cuda).expect("cpu→cuda");
        assert_eq!(layer.analog_tile().kind(), "CountingTile");
        assert_eq!(layer.backend(), Some(Backend::Cuda));
        assert_eq!(factory.created.load(Ordering::Relaxed), 2);
        assert_eq!(layer.get_weights().expect("read").0, w);
    }
}
