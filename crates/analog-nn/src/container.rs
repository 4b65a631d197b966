// SPDX-License-Identifier: AGPL-3.0-only

//! Sequential container and device placement
//!
//! [`AnalogSequential`] chains analog modules and is the relocation
//! coordinator for them: [`AnalogSequential::to`] rebinds every child's
//! tiles to a new backend through the explicit [`AnalogModule::migrate`] hook.

use crate::module::AnalogModule;
use analog_tile::{ensure_compiled, AnalogTile, Backend, Result};
use ndarray::{ArrayD, ArrayViewD};
use tracing::info;

/// Ordered chain of analog modules
///
/// # Example
///
/// ```
/// use analog_nn::prelude::*;
///
/// let config = RpuConfig::ideal().with_seed(1);
/// let mut net = AnalogSequential::new()
///     .add(AnalogLinear::new(4, 8, true, &config, false, 0.0)?)
///     .add(AnalogLinear::new(8, 2, true, &config, false, 0.0)?);
///
/// let x = ndarray::Array2::<f32>::ones((3, 4)).into_dyn();
/// let y = net.forward(x.view())?;
/// assert_eq!(y.shape(), &[3, 2]);
/// # Ok::<(), analog_nn::TileError>(())
/// ```
#[derive(Debug)]
pub struct AnalogSequential {
    modules: Vec<Box<dyn AnalogModule>>,
    training: bool,
}

impl AnalogSequential {
    /// Create an empty container
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            training: true,
        }
    }

    /// Append a module, builder style
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn add<M: AnalogModule + 'static>(mut self, module: M) -> Self {
        self.push(module);
        self
    }

    /// Append a module
    pub fn push<M: AnalogModule + 'static>(&mut self, mut module: M) {
        module.train(self.training);
        self.modules.push(Box::new(module));
    }

    /// Number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the container holds no modules
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules in forward order
    pub fn iter(&self) -> impl Iterator<Item = &dyn AnalogModule> {
        self.modules.iter().map(|m| &**m)
    }

    /// Move every tile to `backend`.
    ///
    /// The target is checked once up front so an uncompiled backend leaves
    /// every child where it was. A failure from an individual child stops the
    /// walk and is returned; children already moved stay moved.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if `backend` is not compiled in.
    pub fn to(&mut self, backend: Backend) -> Result<&mut Self> {
        ensure_compiled(backend)?;
        for module in &mut self.modules {
            module.migrate(backend)?;
        }
        info!(
            "AnalogSequential: {} modules placed on {backend}",
            self.modules.len()
        );
        Ok(self)
    }

    /// Move every tile to host memory.
    ///
    /// # Errors
    ///
    /// Propagates child migration errors.
    pub fn cpu(&mut self) -> Result<&mut Self> {
        self.to(Backend::Cpu)
    }

    /// Move every tile to the accelerator.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` in builds without the `cuda` feature.
    pub fn cuda(&mut self) -> Result<&mut Self> {
        self.to(Backend::Cuda)
    }
}

impl Default for AnalogSequential {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalogModule for AnalogSequential {
    fn name(&self) -> &'static str {
        "AnalogSequential"
    }

    fn forward(&mut self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        let mut activ = input.to_owned();
        for module in &mut self.modules {
            activ = module.forward(activ.view())?;
        }
        Ok(activ)
    }

    fn backward(&mut self, grad_output: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        let mut grad = grad_output.to_owned();
        for module in self.modules.iter_mut().rev() {
            grad = module.backward(grad.view())?;
        }
        Ok(grad)
    }

    fn update(&mut self, learning_rate: f32) -> Result<usize> {
        let mut updated = 0;
        for module in &mut self.modules {
            updated += module.update(learning_rate)?;
        }
        Ok(updated)
    }

    fn train(&mut self, mode: bool) {
        self.training = mode;
        for module in &mut self.modules {
            module.train(mode);
        }
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn backend(&self) -> Option<Backend> {
        self.modules.iter().find_map(|m| m.backend())
    }

    fn migrate(&mut self, target: Backend) -> Result<()> {
        self.to(target).map(|_| ())
    }

    fn analog_tiles(&self) -> Vec<&dyn AnalogTile> {
        self.modules.iter().flat_map(|m| m.analog_tiles()).collect()
    }
}
