// SPDX-License-Identifier: AGPL-3.0-only

//! Analog tile abstraction
//!
//! Every tile, whatever backend it lives on, implements [`AnalogTile`].
//! Layers only ever hold a `Box<dyn AnalogTile>` produced by the
//! [`TileFactory`] carried in their [`RpuConfig`].

use crate::backend::{ensure_compiled, Backend};
use crate::config::{RpuConfig, TileShape};
use crate::error::Result;
use crate::state::TileState;
use std::fmt::Debug;
use tracing::info;

/// Weights and optional bias as flat row-major buffers
pub type Weights = (Vec<f32>, Option<Vec<f32>>);

/// Analog tile contract
///
/// Weights are `out_size × in_size` row-major; the bias has `out_size`
/// elements and must be present exactly when the tile was built with one.
/// Batched inputs and gradients are row-major `batch × size`.
pub trait AnalogTile: Debug + Send {
    /// Logical shape
    fn shape(&self) -> TileShape;

    /// Backend the storage lives on
    fn backend(&self) -> Backend;

    /// Tile class name (`"AnalogTile"`, `"CudaAnalogTile"`, or a custom one)
    fn kind(&self) -> &'static str;

    /// Configuration the tile was built with
    fn config(&self) -> &RpuConfig;

    /// Program weights and bias into the tile.
    ///
    /// Exact copy when `realistic` is false; quantized, clipped and noisy
    /// otherwise. Resets the output scale to 1.
    ///
    /// # Errors
    ///
    /// Returns `Shape` if an array does not match the tile; the tile is left
    /// untouched in that case.
    fn set_weights(&mut self, weights: &[f32], bias: Option<&[f32]>, realistic: bool)
        -> Result<()>;

    /// Program weights scaled so that the largest magnitude becomes `omega`.
    ///
    /// The scale is remembered as the output scaling factor so the tile still
    /// computes the original mapping. `omega == 0` is a plain `set_weights`.
    ///
    /// # Errors
    ///
    /// Returns `Shape` if an array does not match the tile.
    fn set_weights_scaled(
        &mut self,
        weights: &[f32],
        bias: Option<&[f32]>,
        realistic: bool,
        omega: f32,
    ) -> Result<()>;

    /// Read the raw stored weights (scaled domain).
    ///
    /// A realistic read draws fresh read noise on every call.
    fn get_weights(&mut self, realistic: bool) -> Weights;

    /// Read the stored weights multiplied back by the output scale.
    fn get_weights_scaled(&mut self, realistic: bool) -> Weights;

    /// Output scaling factor recorded by the last scaled write
    fn out_scaling_alpha(&self) -> f32;

    /// Batched forward pass `y = alpha · (W x + b)`.
    ///
    /// `is_inference` skips the training-time output noise.
    ///
    /// # Errors
    ///
    /// Returns `Shape` if `input.len() != batch × in_size`.
    fn forward(&mut self, input: &[f32], batch: usize, is_inference: bool) -> Result<Vec<f32>>;

    /// Batched backward pass `dx = alpha · Wᵀ d`.
    ///
    /// # Errors
    ///
    /// Returns `Shape` if `grad_output.len() != batch × out_size`.
    fn backward(&self, grad_output: &[f32], batch: usize) -> Result<Vec<f32>>;

    /// Apply the gradient step `W -= lr · dᵀ x` inside the device bounds.
    ///
    /// # Errors
    ///
    /// Returns `Shape` if `input` or `grad_output` do not match `batch`.
    fn update(
        &mut self,
        input: &[f32],
        grad_output: &[f32],
        batch: usize,
        learning_rate: f32,
    ) -> Result<()>;

    /// Snapshot the physical storage
    fn state(&self) -> TileState;

    /// Overwrite the physical storage from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Shape` if the snapshot was taken from a differently shaped tile.
    fn restore(&mut self, state: TileState) -> Result<()>;

    /// Seed for the noise stream of a tile derived from this one.
    ///
    /// Each call advances this tile's own stream. `None` means the tile has
    /// no stream to fork and a copy falls back to the configured seed.
    fn fork_noise_seed(&mut self) -> Option<u64> {
        None
    }

    /// Build a copy of this tile on `target`.
    ///
    /// The new tile comes from the same factory and is fully populated before
    /// it is returned. Its noise stream is forked from this tile's, so a copy
    /// never replays draws already consumed here. The stored weights of
    /// `self` are not modified.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if `target` is not compiled in, or any
    /// error raised by the packing, the factory or the restore.
    fn migrate(&mut self, target: Backend) -> Result<Box<dyn AnalogTile>> {
        ensure_compiled(target)?;
        let blob = self.state().pack()?;
        let state = TileState::unpack(&blob)?;
        let mut config = self.config().clone();
        if let Some(seed) = self.fork_noise_seed() {
            config.seed = Some(seed);
        }
        let mut tile = config.tile_factory.create(self.shape(), &config, target)?;
        tile.restore(state)?;
        info!(
            "Migrated {} {}→{} ({} bytes)",
            self.kind(),
            self.backend(),
            tile.backend(),
            blob.len()
        );
        Ok(tile)
    }
}

/// Builds tiles for a configuration
///
/// Custom tile classes are plugged in by handing a different factory to
/// [`RpuConfig::with_tile_factory`].
pub trait TileFactory: Debug + Send + Sync {
    /// Build an empty (zero) tile of `shape` on `backend`.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if the factory cannot build for `backend`.
    fn create(
        &self,
        shape: TileShape,
        config: &RpuConfig,
        backend: Backend,
    ) -> Result<Box<dyn AnalogTile>>;

    /// Factory name for logging
    fn name(&self) -> &'static str;
}

/// Factory for the built-in CPU and CUDA tiles
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTileFactory;

impl TileFactory for DefaultTileFactory {
    fn create(
        &self,
        shape: TileShape,
        config: &RpuConfig,
        backend: Backend,
    ) -> Result<Box<dyn AnalogTile>> {
        match backend {
            Backend::Cpu => Ok(Box::new(crate::tiles::CpuTile::new(shape, config.clone()))),
            #[cfg(feature = "cuda")]
            Backend::Cuda => Ok(Box::new(crate::tiles::CudaTile::new(shape, config.clone()))),
            #[cfg(not(feature = "cuda"))]
            Backend::Cuda => Err(crate::TileError::backend_unavailable(Backend::Cuda)),
        }
    }

    fn name(&self) -> &'static str {
        "default"
    }
}

/// Validate `config` and `shape`, then build a tile with the configured factory.
///
/// # Errors
///
/// Returns `InvalidConfig` for a bad configuration or shape, and
/// `BackendUnavailable` if `backend` is not compiled in.
pub fn create_tile(
    shape: TileShape,
    config: &RpuConfig,
    backend: Backend,
) -> Result<Box<dyn AnalogTile>> {
    config.validate()?;
    shape.validate()?;
    ensure_compiled(backend)?;
    let tile = config.tile_factory.create(shape, config, backend)?;
    info!(
        "Created {} {}×{} (bias={}) on {} via {} factory",
        tile.kind(),
        shape.out_size,
        shape.in_size,
        shape.bias,
        tile.backend(),
        config.tile_factory.name()
    );
    Ok(tile)
}
