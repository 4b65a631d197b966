// SPDX-License-Identifier: AGPL-3.0-only

//! Simulated tile shared by every built-in backend
//!
//! The numerics are identical across backends; only the memory the physical
//! matrix lives in differs. A backend provides a [`TileMemory`] and gets a
//! full [`AnalogTile`] from [`SimulatedTile`].
//!
//! ## Storage layout
//!
//! ```text
//! row i:  [ w(i,0) … w(i,in-1) | b(i) ]     (bias column only when shape.bias)
//! ```
//!
//! The output scale `alpha` multiplies every forward and backward result, so
//! a scaled write leaves the computed mapping unchanged.

use crate::backend::Backend;
use crate::config::{RpuConfig, TileShape};
use crate::error::{check_len, Result, TileError};
use crate::noise::NoiseSource;
use crate::state::TileState;
use crate::tile::{AnalogTile, Weights};
use std::fmt::Debug;
use tracing::{debug, warn};

/// Memory holding a tile's physical matrix
pub trait TileMemory: Debug + Send + 'static {
    /// Backend this memory belongs to
    const BACKEND: Backend;

    /// Tile class name reported by [`AnalogTile::kind`]
    const KIND: &'static str;

    /// Zero-filled memory of `len` elements
    fn zeroed(len: usize) -> Self;

    /// Copy `data` into the memory (same length)
    fn upload(&mut self, data: &[f32]);

    /// Copy the memory out
    fn download(&self) -> Vec<f32>;

    /// Read-only view for kernels
    fn as_slice(&self) -> &[f32];

    /// Mutable view for kernels
    fn as_mut_slice(&mut self) -> &mut [f32];
}

/// Tile simulated on top of a [`TileMemory`]
#[derive(Debug)]
pub struct SimulatedTile<M: TileMemory> {
    shape: TileShape,
    config: RpuConfig,
    memory: M,
    alpha: f32,
    noise: NoiseSource,
}

impl<M: TileMemory> SimulatedTile<M> {
    /// Build a zero tile of `shape`.
    ///
    /// Does not validate `config`; [`crate::create_tile`] does that.
    pub fn new(shape: TileShape, config: RpuConfig) -> Self {
        let noise = NoiseSource::new(config.seed);
        Self {
            shape,
            memory: M::zeroed(shape.len()),
            config,
            alpha: 1.0,
            noise,
        }
    }

    /// Compose the physical matrix from logical weights and bias.
    fn compose(&self, weights: &[f32], bias: Option<&[f32]>) -> Result<Vec<f32>> {
        let s = self.shape;
        check_len("weights", s.weight_len(), weights.len())?;
        match (s.bias, bias) {
            (true, Some(b)) => check_len("bias", s.out_size, b.len())?,
            (true, None) => return Err(TileError::shape("bias", s.out_size, 0)),
            (false, Some(b)) => return Err(TileError::shape("bias", 0, b.len())),
            (false, None) => {}
        }

        let cols = s.columns();
        let mut matrix = vec![0.0f32; s.len()];
        for i in 0..s.out_size {
            let row = &mut matrix[i * cols..(i + 1) * cols];
            row[..s.in_size].copy_from_slice(&weights[i * s.in_size..(i + 1) * s.in_size]);
            if let Some(b) = bias {
                row[s.in_size] = b[i];
            }
        }
        Ok(matrix)
    }

    /// Split a physical matrix back into weights and bias.
    fn split(&self, matrix: &[f32]) -> Weights {
        let s = self.shape;
        if !s.bias {
            return (matrix.to_vec(), None);
        }
        let cols = s.columns();
        let mut weights = Vec::with_capacity(s.weight_len());
        let mut bias = Vec::with_capacity(s.out_size);
        for row in matrix.chunks_exact(cols) {
            weights.extend_from_slice(&row[..s.in_size]);
            bias.push(row[s.in_size]);
        }
        (weights, Some(bias))
    }

    fn commit(&mut self, matrix: &[f32], realistic: bool) {
        if realistic {
            let mut cells = vec![0.0f32; matrix.len()];
            self.noise.program(&mut cells, matrix, &self.config.device);
            self.memory.upload(&cells);
        } else {
            self.memory.upload(matrix);
        }
    }

    fn read(&mut self, realistic: bool) -> Vec<f32> {
        if realistic {
            let stored = self.memory.download();
            self.noise.read(&stored, self.config.read.read_noise_std)
        } else {
            self.memory.download()
        }
    }
}

impl<M: TileMemory> AnalogTile for SimulatedTile<M> {
    fn shape(&self) -> TileShape {
        self.shape
    }

    fn backend(&self) -> Backend {
        M::BACKEND
    }

    fn kind(&self) -> &'static str {
        M::KIND
    }

    fn config(&self) -> &RpuConfig {
        &self.config
    }

    fn set_weights(
        &mut self,
        weights: &[f32],
        bias: Option<&[f32]>,
        realistic: bool,
    ) -> Result<()> {
        let matrix = self.compose(weights, bias)?;
        self.commit(&matrix, realistic);
        self.alpha = 1.0;
        debug!(
            "{}: set {} elements (realistic={realistic})",
            M::KIND,
            matrix.len()
        );
        Ok(())
    }

    fn set_weights_scaled(
        &mut self,
        weights: &[f32],
        bias: Option<&[f32]>,
        realistic: bool,
        omega: f32,
    ) -> Result<()> {
        if omega <= 0.0 {
            return self.set_weights(weights, bias, realistic);
        }
        let mut matrix = self.compose(weights, bias)?;
        let max_abs = matrix.iter().fold(0.0f32, |m, w| m.max(w.abs()));
        let alpha = if max_abs > 0.0 {
            let scale = omega / max_abs;
            for w in &mut matrix {
                *w *= scale;
            }
            max_abs / omega
        } else {
            warn!("{}: omega={omega} requested for an all-zero matrix, not scaling", M::KIND);
            1.0
        };
        self.commit(&matrix, realistic);
        self.alpha = alpha;
        debug!(
            "{}: scaled write max|w|={max_abs:.6} → omega={omega}, alpha={alpha:.6} (realistic={realistic})",
            M::KIND
        );
        Ok(())
    }

    fn get_weights(&mut self, realistic: bool) -> Weights {
        let matrix = self.read(realistic);
        self.split(&matrix)
    }

    fn get_weights_scaled(&mut self, realistic: bool) -> Weights {
        let alpha = self.alpha;
        let mut matrix = self.read(realistic);
        if alpha != 1.0 {
            for w in &mut matrix {
                *w *= alpha;
            }
        }
        self.split(&matrix)
    }

    fn out_scaling_alpha(&self) -> f32 {
        self.alpha
    }

    fn forward(&mut self, input: &[f32], batch: usize, is_inference: bool) -> Result<Vec<f32>> {
        let s = self.shape;
        check_len("input", batch * s.in_size, input.len())?;
        let cols = s.columns();
        let m = self.memory.as_slice();
        let mut out = vec![0.0f32; batch * s.out_size];

        for (x, y) in input
            .chunks_exact(s.in_size)
            .zip(out.chunks_exact_mut(s.out_size))
        {
            for (i, yi) in y.iter_mut().enumerate() {
                let row = &m[i * cols..(i + 1) * cols];
                let mut acc: f32 = row[..s.in_size].iter().zip(x).map(|(w, v)| w * v).sum();
                if s.bias {
                    acc += row[s.in_size];
                }
                *yi = self.alpha * acc;
            }
        }

        let out_noise = self.config.read.out_noise_std;
        if !is_inference && out_noise > 0.0 {
            self.noise.perturb(&mut out, out_noise);
        }
        Ok(out)
    }

    fn backward(&self, grad_output: &[f32], batch: usize) -> Result<Vec<f32>> {
        let s = self.shape;
        check_len("grad_output", batch * s.out_size, grad_output.len())?;
        let cols = s.columns();
        let m = self.memory.as_slice();
        let mut grad_input = vec![0.0f32; batch * s.in_size];

        for (d, dx) in grad_output
            .chunks_exact(s.out_size)
            .zip(grad_input.chunks_exact_mut(s.in_size))
        {
            for (i, &di) in d.iter().enumerate() {
                let row = &m[i * cols..i * cols + s.in_size];
                for (dxj, &w) in dx.iter_mut().zip(row) {
                    *dxj += w * di;
                }
            }
            for v in dx.iter_mut() {
                *v *= self.alpha;
            }
        }
        Ok(grad_input)
    }

    fn update(
        &mut self,
        input: &[f32],
        grad_output: &[f32],
        batch: usize,
        learning_rate: f32,
    ) -> Result<()> {
        let s = self.shape;
        check_len("input", batch * s.in_size, input.len())?;
        check_len("grad_output", batch * s.out_size, grad_output.len())?;
        let cols = s.columns();
        let (w_min, w_max) = (self.config.device.w_min, self.config.device.w_max);
        let m = self.memory.as_mut_slice();

        for (x, d) in input
            .chunks_exact(s.in_size)
            .zip(grad_output.chunks_exact(s.out_size))
        {
            for (i, &di) in d.iter().enumerate() {
                let step = learning_rate * di;
                let row = &mut m[i * cols..(i + 1) * cols];
                for (w, &xj) in row[..s.in_size].iter_mut().zip(x) {
                    *w -= step * xj;
                }
                if s.bias {
                    row[s.in_size] -= step;
                }
            }
        }
        for w in m.iter_mut() {
            *w = w.clamp(w_min, w_max);
        }
        debug!("{}: update batch={batch} lr={learning_rate}", M::KIND);
        Ok(())
    }

    fn state(&self) -> TileState {
        TileState {
            shape: self.shape,
            backend: M::BACKEND,
            out_scaling_alpha: self.alpha,
            weights: self.memory.download(),
        }
    }

    fn fork_noise_seed(&mut self) -> Option<u64> {
        Some(self.noise.fork_seed())
    }

    fn restore(&mut self, state: TileState) -> Result<()> {
        if state.shape != self.shape {
            return Err(TileError::shape(
                "tile state",
                self.shape.len(),
                state.shape.len(),
            ));
        }
        check_len("tile state", self.shape.len(), state.weights.len())?;
        self.memory.upload(&state.weights);
        self.alpha = state.out_scaling_alpha;
        Ok(())
    }
}
