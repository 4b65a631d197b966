// SPDX-License-Identifier: AGPL-3.0-only

//! Common interface of analog layers and containers

use analog_tile::{AnalogTile, Backend, Result};
use ndarray::{ArrayD, ArrayViewD};

/// A network component whose parameters live on analog tiles
///
/// Layers and containers both implement this, so a container can move,
/// train and evaluate its children without knowing their concrete type.
pub trait AnalogModule: std::fmt::Debug + Send {
    /// Short type name for logs
    fn name(&self) -> &'static str;

    /// Forward pass over a batch whose last dimension is the input size.
    ///
    /// # Errors
    ///
    /// Returns `Shape` if the last dimension does not match.
    fn forward(&mut self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>>;

    /// Backward pass for the most recent forward.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` without a preceding forward, `Shape` if the
    /// gradient does not match the forward output.
    fn backward(&mut self, grad_output: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>>;

    /// Apply pending tile updates; returns how many tiles were updated.
    ///
    /// # Errors
    ///
    /// Propagates tile update errors.
    fn update(&mut self, learning_rate: f32) -> Result<usize>;

    /// Switch training mode on or off
    fn train(&mut self, mode: bool);

    /// Switch to inference mode
    fn eval(&mut self) {
        self.train(false);
    }

    /// Whether training mode is on
    fn is_training(&self) -> bool;

    /// Backend the module's tiles live on (`None` if it holds no tiles)
    fn backend(&self) -> Option<Backend>;

    /// Rebind every tile to `target`.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if `target` is not compiled in.
    fn migrate(&mut self, target: Backend) -> Result<()>;

    /// Tiles owned by this module, in forward order
    fn analog_tiles(&self) -> Vec<&dyn AnalogTile>;
}
