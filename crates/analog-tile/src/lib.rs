// SPDX-License-Identifier: AGPL-3.0-only

//! Simulated resistive-memory ("analog") compute tiles.
//!
//! A tile stores a weight matrix (plus an optional bias column) as simulated
//! device conductances and computes matrix-vector products with it. Weight
//! transfers can be exact or *realistic*: a realistic write is quantized,
//! clipped to the conductance range and perturbed by programming noise, and
//! a realistic read adds fresh read noise on every call.
//!
//! # Backend hierarchy
//!
//! ```text
//! Always available:
//!   CpuTile   "AnalogTile", host memory
//!
//! Feature `cuda` (default):
//!   CudaTile  "CudaAnalogTile", emulated device buffer
//! ```
//!
//! Tiles move between backends with [`AnalogTile::migrate`], which builds a
//! complete copy on the target before anything is released.
//!
//! # Quick start
//!
//! ```
//! use analog_tile::{create_tile, AnalogTile, Backend, RpuConfig, TileShape};
//!
//! # fn main() -> analog_tile::Result<()> {
//! let config = RpuConfig::default().with_seed(7);
//! let mut tile = create_tile(TileShape::new(2, 2, true), &config, Backend::Cpu)?;
//!
//! tile.set_weights(&[0.1, 0.2, 0.3, 0.4], Some(&[0.0, 0.5]), false)?;
//! let y = tile.forward(&[1.0, 1.0], 1, true)?;
//! assert_eq!(y.len(), 2);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

mod backend;
mod config;
mod error;
pub mod noise;
mod state;
mod tile;
pub mod tiles;

pub use backend::{available_backends, ensure_compiled, Backend};
pub use config::{DeviceConfig, ReadConfig, RpuConfig, TileShape};
pub use error::{Result, TileError};
pub use state::TileState;
pub use tile::{create_tile, AnalogTile, DefaultTileFactory, TileFactory, Weights};
pub use tiles::CpuTile;
#[cfg(feature = "cuda")]
pub use tiles::CudaTile;

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        create_tile, AnalogTile, Backend, RpuConfig, TileError, TileFactory, TileShape, Weights,
    };
}
