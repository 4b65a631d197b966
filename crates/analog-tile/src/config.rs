// SPDX-License-Identifier: AGPL-3.0-only

//! Tile configuration
//!
//! `RpuConfig` (resistive processing unit configuration) bundles everything a
//! tile factory needs: the device conductance range and programming noise,
//! the read-out noise, an optional seed, and the factory itself. Custom tile
//! classes are selected by swapping the factory, not by subclassing.

use crate::error::{Result, TileError};
use crate::tile::{DefaultTileFactory, TileFactory};
use std::sync::Arc;

/// Logical shape of a tile
///
/// The physical matrix is `out_size × (in_size + 1)` when `bias` is set: the
/// bias lives in an extra trailing column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileShape {
    /// Input vector size (columns, excluding the bias column)
    pub in_size: usize,
    /// Output vector size (rows)
    pub out_size: usize,
    /// Whether the tile carries a bias column
    pub bias: bool,
}

impl TileShape {
    /// Create a shape
    pub const fn new(in_size: usize, out_size: usize, bias: bool) -> Self {
        Self {
            in_size,
            out_size,
            bias,
        }
    }

    /// Number of physical columns (input columns plus the bias column)
    pub const fn columns(&self) -> usize {
        self.in_size + self.bias as usize
    }

    /// Number of stored elements
    pub const fn len(&self) -> usize {
        self.out_size * self.columns()
    }

    /// Whether the tile stores no elements at all
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expected number of weight elements (`out_size × in_size`)
    pub const fn weight_len(&self) -> usize {
        self.out_size * self.in_size
    }

    /// Reject shapes with a zero dimension.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if either dimension is zero.
    pub fn validate(&self) -> Result<()> {
        if self.in_size == 0 || self.out_size == 0 {
            return Err(TileError::invalid_config(format!(
                "tile dimensions must be non-zero (in={}, out={})",
                self.in_size, self.out_size
            )));
        }
        Ok(())
    }
}

/// Resistive device parameters used by realistic programming
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Lowest reachable conductance (weight units)
    pub w_min: f32,
    /// Highest reachable conductance (weight units)
    pub w_max: f32,
    /// Programming granularity; realistic writes land on multiples of this
    pub dw_min: f32,
    /// Programming noise standard deviation, relative to `w_max`
    pub write_noise_std: f32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            w_min: -1.0,
            w_max: 1.0,
            dw_min: 0.001,
            write_noise_std: 0.02,
        }
    }
}

/// Read-out and forward noise
#[derive(Debug, Clone, PartialEq)]
pub struct ReadConfig {
    /// Noise added to each element of a realistic weight read-out
    pub read_noise_std: f32,
    /// Noise added to each forward output while training
    pub out_noise_std: f32,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            read_noise_std: 0.01,
            out_noise_std: 0.0,
        }
    }
}

/// Resistive processing unit configuration
#[derive(Debug, Clone)]
pub struct RpuConfig {
    /// Device parameters
    pub device: DeviceConfig,
    /// Read-out parameters
    pub read: ReadConfig,
    /// Seed for the tile noise generator; entropy when `None`
    pub seed: Option<u64>,
    /// Factory that builds the tile (swap it for custom tile classes)
    pub tile_factory: Arc<dyn TileFactory>,
}

impl Default for RpuConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            read: ReadConfig::default(),
            seed: None,
            tile_factory: Arc::new(DefaultTileFactory),
        }
    }
}

impl RpuConfig {
    /// Configuration with every noise source disabled
    pub fn ideal() -> Self {
        Self::default()
            .with_write_noise(0.0)
            .with_read_noise(0.0)
            .with_out_noise(0.0)
    }

    /// Set the device parameters
    #[must_use]
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }

    /// Set the conductance range
    #[must_use]
    pub fn with_weight_bounds(mut self, w_min: f32, w_max: f32) -> Self {
        self.device.w_min = w_min;
        self.device.w_max = w_max;
        self
    }

    /// Set the programming granularity
    #[must_use]
    pub fn with_dw_min(mut self, dw_min: f32) -> Self {
        self.device.dw_min = dw_min;
        self
    }

    /// Set the relative programming noise
    #[must_use]
    pub fn with_write_noise(mut self, std: f32) -> Self {
        self.device.write_noise_std = std;
        self
    }

    /// Set the read-out noise
    #[must_use]
    pub fn with_read_noise(mut self, std: f32) -> Self {
        self.read.read_noise_std = std;
        self
    }

    /// Set the forward output noise (training only)
    #[must_use]
    pub fn with_out_noise(mut self, std: f32) -> Self {
        self.read.out_noise_std = std;
        self
    }

    /// Fix the noise seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Use a custom tile factory
    #[must_use]
    pub fn with_tile_factory(mut self, factory: Arc<dyn TileFactory>) -> Self {
        self.tile_factory = factory;
        self
    }

    /// Check the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty or inverted conductance range,
    /// a non-positive `dw_min`, or negative / non-finite noise levels.
    pub fn validate(&self) -> Result<()> {
        let d = &self.device;
        if !(d.w_min.is_finite() && d.w_max.is_finite()) || d.w_min >= d.w_max {
            return Err(TileError::invalid_config(format!(
                "conductance range [{}, {}] is empty",
                d.w_min, d.w_max
            )));
        }
        if !(d.dw_min.is_finite() && d.dw_min > 0.0) {
            return Err(TileError::invalid_config(format!(
                "dw_min must be positive, got {}",
                d.dw_min
            )));
        }
        for (name, std) in [
            ("write_noise_std", d.write_noise_std),
            ("read_noise_std", self.read.read_noise_std),
            ("out_noise_std", self.read.out_noise_std),
        ] {
            if !(std.is_finite() && std >= 0.0) {
                return Err(TileError::invalid_config(format!(
                    "{name} must be a non-negative number, got {std}"
                )));
            }
        }
        Ok(())
    }
}
