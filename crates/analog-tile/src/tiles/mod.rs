// SPDX-License-Identifier: AGPL-3.0-only

//! Built-in tile implementations
//!
//! - **CPU**: `AnalogTile`, storage in host memory (always available)
//! - **CUDA**: `CudaAnalogTile`, storage in an emulated device buffer
//!   (`cuda` feature)
//!
//! Both share the numerics in [`simulated`], so exact reads, forward and
//! backward agree bit-for-bit across backends.

pub mod cpu;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod simulated;

pub use cpu::CpuTile;
#[cfg(feature = "cuda")]
pub use cuda::CudaTile;
pub use simulated::{SimulatedTile, TileMemory};
