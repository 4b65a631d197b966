// SPDX-License-Identifier: AGPL-3.0-only

//! Weight/bias synchronization between a layer and its tile.
//!
//! [`WeightSync`] is the only path between the logical `weight` / `bias`
//! a user sees and the tile's physical storage. It owns the tile handle and
//! applies two fixed policies on every transfer:
//!
//! - **realistic read/write**: writes are programmed through the tile's
//!   noisy channel and reads draw fresh read noise. Noise is never retried
//!   or corrected here.
//! - **weight scaling omega**: with `omega > 0` the combined `[W | b]` is
//!   scaled so its largest magnitude lands on `omega` before it is
//!   committed. The tile remembers the factor, and reads through this type
//!   are returned in the logical (unscaled) domain.
//!
//! After every write, and after every training update applied by the layer,
//! the logical shadow is refreshed from an exact read of the tile. It mirrors
//! what the tile actually holds rather than what the caller asked for. A
//! read-back that does not match the tile's shape is an error, never a
//! silently zeroed matrix.

use crate::init::dense_uniform;
use analog_tile::{AnalogTile, Backend, Result, TileError, TileShape};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;
use tracing::{debug, info};

/// Logical weights and optional bias
pub type LayerWeights = (Array2<f32>, Option<Array1<f32>>);

/// Synchronization adapter between logical parameters and a tile
#[derive(Debug)]
pub struct WeightSync {
    tile: Box<dyn AnalogTile>,
    realistic_read_write: bool,
    weight_scaling_omega: f32,
    weight: Array2<f32>,
    bias: Option<Array1<f32>>,
}

impl WeightSync {
    /// Wrap `tile`; the logical shadow starts as an exact read of the tile.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `weight_scaling_omega` is negative or not
    /// finite, and `Shape` if the tile's read-back does not match its shape.
    pub fn new(
        tile: Box<dyn AnalogTile>,
        realistic_read_write: bool,
        weight_scaling_omega: f32,
    ) -> Result<Self> {
        if !(weight_scaling_omega.is_finite() && weight_scaling_omega >= 0.0) {
            return Err(TileError::invalid_config(format!(
                "weight_scaling_omega must be a non-negative number, got {weight_scaling_omega}"
            )));
        }
        let shape = tile.shape();
        let mut sync = Self {
            tile,
            realistic_read_write,
            weight_scaling_omega,
            weight: Array2::<f32>::zeros((shape.out_size, shape.in_size)),
            bias: shape.bias.then(|| Array1::<f32>::zeros(shape.out_size)),
        };
        sync.refresh_shadow()?;
        Ok(sync)
    }

    /// Write weights and bias through the configured channel.
    ///
    /// # Errors
    ///
    /// Returns `Shape` if `weights` is not `out × in` or the bias does not
    /// match the layer's bias configuration. Nothing is written in that case.
    pub fn set_weights(
        &mut self,
        weights: ArrayView2<'_, f32>,
        bias: Option<ArrayView1<'_, f32>>,
    ) -> Result<()> {
        self.write(weights, bias, self.realistic_read_write)
    }

    /// Write weights and bias exactly, ignoring the realistic flag.
    ///
    /// The scaling policy still applies.
    ///
    /// # Errors
    ///
    /// Same as [`WeightSync::set_weights`].
    pub fn set_weights_exact(
        &mut self,
        weights: ArrayView2<'_, f32>,
        bias: Option<ArrayView1<'_, f32>>,
    ) -> Result<()> {
        self.write(weights, bias, false)
    }

    /// Read weights and bias through the configured channel.
    ///
    /// Under realistic read/write every call is an independent noisy read.
    ///
    /// # Errors
    ///
    /// Returns `Shape` if the tile hands back buffers that do not match its
    /// shape.
    pub fn get_weights(&mut self) -> Result<LayerWeights> {
        self.read(self.realistic_read_write)
    }

    /// Exact read of what the tile holds, in the logical domain.
    ///
    /// # Errors
    ///
    /// Same as [`WeightSync::get_weights`].
    pub fn get_weights_exact(&mut self) -> Result<LayerWeights> {
        self.read(false)
    }

    /// Refresh the logical shadow from an exact read of the tile.
    ///
    /// Needed after anything that changes the tile outside this adapter,
    /// such as a training update.
    ///
    /// # Errors
    ///
    /// Same as [`WeightSync::get_weights`]; the shadow is left as it was.
    pub fn refresh_shadow(&mut self) -> Result<()> {
        let (weight, bias) = self.read(false)?;
        self.weight = weight;
        self.bias = bias;
        Ok(())
    }

    /// Re-draw the dense-layer initialization and write it through.
    ///
    /// # Errors
    ///
    /// Only fails if the tile rejects the write.
    pub fn reset_parameters<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        let shape = self.tile.shape();
        let (weight, bias) = dense_uniform(rng, shape.in_size, shape.out_size, shape.bias);
        self.set_weights(weight.view(), bias.as_ref().map(Array1::view))
    }

    /// Move the tile to `target`.
    ///
    /// A no-op when the tile already lives there. Otherwise the replacement is
    /// built and populated completely before the current tile is released; on
    /// error the current tile stays in place.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if `target` is not compiled in, or the
    /// error the tile's factory raised while building the replacement.
    pub fn migrate(&mut self, target: Backend) -> Result<()> {
        let current = self.tile.backend();
        if current == target {
            debug!("WeightSync: tile already on {target}, nothing to migrate");
            return Ok(());
        }
        let replacement = self.tile.migrate(target)?;
        self.tile = replacement;
        info!("WeightSync: tile rebound {current}→{target}");
        Ok(())
    }

    /// Logical weights (`out × in`), as last synchronized
    pub fn weight(&self) -> &Array2<f32> {
        &self.weight
    }

    /// Logical bias, as last synchronized
    pub fn bias(&self) -> Option<&Array1<f32>> {
        self.bias.as_ref()
    }

    /// The tile
    pub fn tile(&self) -> &dyn AnalogTile {
        self.tile.as_ref()
    }

    /// The tile, mutably
    pub fn tile_mut(&mut self) -> &mut dyn AnalogTile {
        self.tile.as_mut()
    }

    /// Logical shape of the tile
    pub fn shape(&self) -> TileShape {
        self.tile.shape()
    }

    /// Whether transfers go through the realistic channel
    pub fn realistic_read_write(&self) -> bool {
        self.realistic_read_write
    }

    /// Target maximum magnitude for committed weights (0 = no scaling)
    pub fn weight_scaling_omega(&self) -> f32 {
        self.weight_scaling_omega
    }

    fn write(
        &mut self,
        weights: ArrayView2<'_, f32>,
        bias: Option<ArrayView1<'_, f32>>,
        realistic: bool,
    ) -> Result<()> {
        let shape = self.tile.shape();
        let (rows, cols) = weights.dim();
        if rows != shape.out_size {
            return Err(TileError::shape("weight rows", shape.out_size, rows));
        }
        if cols != shape.in_size {
            return Err(TileError::shape("weight columns", shape.in_size, cols));
        }
        match (&bias, shape.bias) {
            (Some(b), true) if b.len() != shape.out_size => {
                return Err(TileError::shape("bias", shape.out_size, b.len()));
            }
            (Some(b), false) => return Err(TileError::shape("bias", 0, b.len())),
            (None, true) => return Err(TileError::shape("bias", shape.out_size, 0)),
            _ => {}
        }

        let flat_weights: Vec<f32> = weights.iter().copied().collect();
        let flat_bias: Option<Vec<f32>> = bias.map(|b| b.iter().copied().collect());

        if self.weight_scaling_omega > 0.0 {
            self.tile.set_weights_scaled(
                &flat_weights,
                flat_bias.as_deref(),
                realistic,
                self.weight_scaling_omega,
            )?;
        } else {
            self.tile
                .set_weights(&flat_weights, flat_bias.as_deref(), realistic)?;
        }
        debug!(
            "WeightSync: wrote {}×{} (bias={}, realistic={realistic}, omega={})",
            shape.out_size, shape.in_size, shape.bias, self.weight_scaling_omega
        );

        self.refresh_shadow()
    }

    fn read(&mut self, realistic: bool) -> Result<LayerWeights> {
        let shape = self.tile.shape();
        let (weights, bias) = if self.weight_scaling_omega > 0.0 {
            self.tile.get_weights_scaled(realistic)
        } else {
            self.tile.get_weights(realistic)
        };
        let got = weights.len();
        let weight = Array2::from_shape_vec((shape.out_size, shape.in_size), weights)
            .map_err(|_| TileError::shape("tile weights", shape.weight_len(), got))?;
        let bias = match (bias, shape.bias) {
            (Some(b), true) if b.len() == shape.out_size => Some(Array1::from_vec(b)),
            (Some(b), _) => {
                let expected = if shape.bias { shape.out_size } else { 0 };
                return Err(TileError::shape("tile bias", expected, b.len()));
            }
            (None, true) => return Err(TileError::shape("tile bias", shape.out_size, 0)),
            (None, false) => None,
        };
        Ok((weight, bias))
    }
}
