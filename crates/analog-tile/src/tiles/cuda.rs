// SPDX-License-Identifier: AGPL-3.0-only

//! CUDA tile (simulated)
//!
//! Models a tile whose physical matrix lives in accelerator memory. There is
//! no GPU dispatch here: the buffer is host memory standing in for device
//! memory, and every write and read goes through an explicit upload or
//! download, the same copies a real device tile would perform. The numerics
//! are shared with the CPU tile, so a migrated layer computes the same
//! result on either side.

use super::simulated::{SimulatedTile, TileMemory};
use crate::backend::Backend;
use tracing::trace;

/// Emulated device buffer backing a [`CudaTile`]
#[derive(Debug, Clone)]
pub struct DeviceBuffer {
    data: Box<[f32]>,
}

impl TileMemory for DeviceBuffer {
    const BACKEND: Backend = Backend::Cuda;
    const KIND: &'static str = "CudaAnalogTile";

    fn zeroed(len: usize) -> Self {
        Self {
            data: vec![0.0; len].into_boxed_slice(),
        }
    }

    fn upload(&mut self, data: &[f32]) {
        trace!("DeviceBuffer: H2D {} bytes", data.len() * 4);
        self.data.copy_from_slice(data);
    }

    fn download(&self) -> Vec<f32> {
        trace!("DeviceBuffer: D2H {} bytes", self.data.len() * 4);
        self.data.to_vec()
    }

    fn as_slice(&self) -> &[f32] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

/// Analog tile simulated in (emulated) accelerator memory
pub type CudaTile = SimulatedTile<DeviceBuffer>;
