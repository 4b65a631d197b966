// SPDX-License-Identifier: AGPL-3.0-only

//! Neural-network layers whose weights live on simulated analog tiles.
//!
//! The central piece is [`WeightSync`], the one path between a layer's
//! logical `weight` / `bias` and the tile's physical storage. It applies the
//! realistic read/write policy and the weight scaling omega on every
//! transfer, and keeps the logical view equal to what the tile holds.
//!
//! ```text
//! user ── set_weights ──► WeightSync ──► tile (exact or noisy commit)
//!                            │
//!          weight / bias ◄───┘ (exact read-back of the committed state)
//!
//! input ──► AnalogFunction::forward ──► tile.forward ──► output
//! ```
//!
//! [`AnalogLinear`] wraps the adapter as a dense layer and
//! [`AnalogSequential`] chains layers and moves them between backends.
//!
//! # Example
//!
//! ```
//! use analog_nn::prelude::*;
//! use ndarray::array;
//!
//! # fn main() -> analog_nn::Result<()> {
//! let config = RpuConfig::default().with_seed(3);
//! let mut layer = AnalogLinear::new(2, 2, true, &config, false, 0.0)?;
//!
//! let w = array![[0.5, -0.5], [0.25, 0.75]];
//! let b = array![0.1, -0.1];
//! layer.set_weights(w.view(), Some(b.view()))?;
//! assert_eq!(layer.get_weights()?.0, w);
//!
//! let y = layer.forward(array![[1.0, 1.0]].into_dyn().view())?;
//! assert_eq!(y.shape(), &[1, 2]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::too_many_arguments)]

mod container;
mod function;
pub mod init;
mod linear;
mod module;
mod sync;

pub use container::AnalogSequential;
pub use function::{AnalogContext, AnalogFunction};
pub use linear::AnalogLinear;
pub use module::AnalogModule;
pub use sync::{LayerWeights, WeightSync};

pub use analog_tile::{
    available_backends, create_tile, AnalogTile, Backend, Result, RpuConfig, TileError,
    TileFactory, TileShape,
};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        AnalogLinear, AnalogModule, AnalogSequential, AnalogTile, Backend, RpuConfig, TileError,
        WeightSync,
    };
}
