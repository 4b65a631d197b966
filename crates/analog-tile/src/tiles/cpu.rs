// SPDX-License-Identifier: AGPL-3.0-only

//! CPU tile
//!
//! The physical matrix lives in a plain host `Vec<f32>`. This is the tile
//! every layer starts on.

use super::simulated::{SimulatedTile, TileMemory};
use crate::backend::Backend;

/// Host memory backing a [`CpuTile`]
#[derive(Debug, Clone)]
pub struct HostMemory(Vec<f32>);

impl TileMemory for HostMemory {
    const BACKEND: Backend = Backend::Cpu;
    const KIND: &'static str = "AnalogTile";

    fn zeroed(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    fn upload(&mut self, data: &[f32]) {
        self.0.copy_from_slice(data);
    }

    fn download(&self) -> Vec<f32> {
        self.0.clone()
    }

    fn as_slice(&self) -> &[f32] {
        &self.0
    }

    fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.0
    }
}

/// Analog tile simulated in host memory
pub type CpuTile = SimulatedTile<HostMemory>;
