// SPDX-License-Identifier: AGPL-3.0-only

//! Differentiable boundary between a layer and its tile.
//!
//! [`AnalogFunction`] is the custom forward/backward pair every analog layer
//! routes through. The forward records the input in the layer's
//! [`AnalogContext`]; the backward asks the tile for the input gradient and
//! parks `(x, d)` in the context, where the tile-owned update path picks it
//! up on the next [`AnalogFunction::update`].
//!
//! ```text
//! forward:   x ──► tile.forward(x) ──► y          ctx.saved = x
//! backward:  d ──► tile.backward(d) ──► dx        ctx.pending = (x, d)
//! update:    tile.update(x, d, lr)                ctx.pending = None
//! ```

use analog_tile::{AnalogTile, Result, TileError};
use tracing::trace;

#[derive(Debug, Clone)]
struct SavedInput {
    input: Vec<f32>,
    batch: usize,
}

#[derive(Debug, Clone)]
struct PendingUpdate {
    input: Vec<f32>,
    grad_output: Vec<f32>,
    batch: usize,
}

/// Per-layer autograd context
#[derive(Debug, Clone, Default)]
pub struct AnalogContext {
    saved: Option<SavedInput>,
    pending: Option<PendingUpdate>,
}

impl AnalogContext {
    /// Whether a forward input is available for a backward pass
    pub fn has_saved_input(&self) -> bool {
        self.saved.is_some()
    }

    /// Whether a backward pass left an update for the tile
    pub fn has_pending_update(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop everything recorded so far
    pub fn clear(&mut self) {
        self.saved = None;
        self.pending = None;
    }
}

/// Custom forward/backward operation over an analog tile
#[derive(Debug, Clone, Copy)]
pub struct AnalogFunction;

impl AnalogFunction {
    /// Run the tile forward pass and record the input.
    ///
    /// # Errors
    ///
    /// Returns `Shape` if `input` does not hold `batch` rows of the tile input size.
    pub fn forward(
        ctx: &mut AnalogContext,
        tile: &mut dyn AnalogTile,
        input: &[f32],
        batch: usize,
        is_inference: bool,
    ) -> Result<Vec<f32>> {
        let output = tile.forward(input, batch, is_inference)?;
        ctx.saved = Some(SavedInput {
            input: input.to_vec(),
            batch,
        });
        trace!("AnalogFunction::forward batch={batch} inference={is_inference}");
        Ok(output)
    }

    /// Compute the input gradient and queue the tile update.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` when no forward pass was recorded, and `Shape`
    /// if `grad_output` does not match the recorded batch.
    pub fn backward(
        ctx: &mut AnalogContext,
        tile: &dyn AnalogTile,
        grad_output: &[f32],
    ) -> Result<Vec<f32>> {
        let saved = ctx
            .saved
            .as_ref()
            .ok_or_else(|| TileError::invalid_state("backward called before forward"))?;
        let grad_input = tile.backward(grad_output, saved.batch)?;
        ctx.pending = Some(PendingUpdate {
            input: saved.input.clone(),
            grad_output: grad_output.to_vec(),
            batch: saved.batch,
        });
        trace!("AnalogFunction::backward batch={}", saved.batch);
        Ok(grad_input)
    }

    /// Hand the queued `(x, d)` pair to the tile; returns whether one was pending.
    ///
    /// # Errors
    ///
    /// Propagates tile update errors; the pending pair is consumed either way.
    pub fn update(
        ctx: &mut AnalogContext,
        tile: &mut dyn AnalogTile,
        learning_rate: f32,
    ) -> Result<bool> {
        match ctx.pending.take() {
            Some(p) => {
                tile.update(&p.input, &p.grad_output, p.batch, learning_rate)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analog_tile::{create_tile, Backend, RpuConfig, TileShape};

    fn identity_tile() -> Box<dyn AnalogTile> {
        let mut t = create_tile(TileShape::new(2, 2, false), &RpuConfig::ideal(), Backend::Cpu)
            .unwrap();
        t.set_weights(&[1.0, 0.0, 0.0, 1.0], None, false).unwrap();
        t
    }

    #[test]
    fn backward_requires_forward() {
        let mut ctx = AnalogContext::default();
        let tile = identity_tile();
        let err = AnalogFunction::backward(&mut ctx, tile.as_ref(), &[1.0, 1.0]).unwrap_err();
        assert!(matches!(err, TileError::InvalidState { .. }));
    }

    #[test]
    fn full_cycle_updates_tile() {
        let mut ctx = AnalogContext::default();
        let mut tile = identity_tile();

        let y = AnalogFunction::forward(&mut ctx, tile.as_mut(), &[1.0, 2.0], 1, false).unwrap();
        assert_eq!(y, vec![1.0, 2.0]);
        assert!(ctx.has_saved_input());

        let dx = AnalogFunction::backward(&mut ctx, tile.as_ref(), &[0.5, 0.0]).unwrap();
        assert_eq!(dx, vec![0.5, 0.0]);
        assert!(ctx.has_pending_update());

        assert!(AnalogFunction::update(&mut ctx, tile.as_mut(), 0.1).unwrap());
        assert!(!ctx.has_pending_update());
        let (w, _) = tile.get_weights(false);
        // w00 -= 0.1 * 0.5 * 1.0, w01 -= 0.1 * 0.5 * 2.0
        assert!((w[0] - 0.95).abs() < 1e-6);
        assert!((w[1] + 0.1).abs() < 1e-6);
        assert_eq!(w[2], 0.0);
        assert_eq!(w[3], 1.0);

        assert!(!AnalogFunction::update(&mut ctx, tile.as_mut(), 0.1).unwrap());
    }

    #[test]
    fn gradient_shape_checked() {
        let mut ctx = AnalogContext::default();
        let mut tile = identity_tile();
        AnalogFunction::forward(&mut ctx, tile.as_mut(), &[1.0, 2.0, 3.0, 4.0], 2, true).unwrap();
        let err = AnalogFunction::backward(&mut ctx, tile.as_ref(), &[1.0]).unwrap_err();
        assert!(err.is_shape());
        assert!(!ctx.has_pending_update());
    }
}
