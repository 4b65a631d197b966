// SPDX-License-Identifier: AGPL-3.0-only

//! Programming and read-out noise
//!
//! The realistic channel is deliberately coarse: a write lands on the
//! `dw_min` grid, is clipped to the conductance range and then picks up
//! Gaussian programming noise; a read adds independent Gaussian read noise.
//! Every call draws fresh samples, so two realistic reads of the same tile
//! are independent.

use crate::config::DeviceConfig;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

/// Per-tile noise generator
#[derive(Debug, Clone)]
pub struct NoiseSource {
    rng: ChaCha8Rng,
}

impl NoiseSource {
    /// Seeded generator, or one drawn from OS entropy when `seed` is `None`
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { rng }
    }

    /// One sample of `N(0, std²)`; exactly zero when `std == 0`
    pub fn gaussian(&mut self, std: f32) -> f32 {
        if std == 0.0 {
            return 0.0;
        }
        let z: f32 = self.rng.sample(StandardNormal);
        z * std
    }

    /// Add `N(0, std²)` to every element in place
    pub fn perturb(&mut self, values: &mut [f32], std: f32) {
        if std == 0.0 {
            return;
        }
        for v in values {
            *v += self.gaussian(std);
        }
    }

    /// Realistically program `target` into `cells`.
    ///
    /// `cells` and `target` must have the same length.
    pub fn program(&mut self, cells: &mut [f32], target: &[f32], device: &DeviceConfig) {
        debug_assert_eq!(cells.len(), target.len());
        let noise_std = device.write_noise_std * device.w_max.abs();
        for (cell, &t) in cells.iter_mut().zip(target) {
            let quantized = quantize(t, device.dw_min).clamp(device.w_min, device.w_max);
            let noisy = quantized + self.gaussian(noise_std);
            *cell = noisy.clamp(device.w_min, device.w_max);
        }
    }

    /// Realistic read-out of `cells`
    pub fn read(&mut self, cells: &[f32], read_noise_std: f32) -> Vec<f32> {
        let mut out = cells.to_vec();
        self.perturb(&mut out, read_noise_std);
        out
    }

    /// Seed for a child generator; advances this stream
    pub fn fork_seed(&mut self) -> u64 {
        self.rng.gen()
    }
}

/// Snap `value` to the nearest multiple of `step`
pub fn quantize(value: f32, step: f32) -> f32 {
    if step > 0.0 {
        (value / step).round() * step
    } else {
        value
    }
}
