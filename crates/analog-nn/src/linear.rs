// SPDX-License-Identifier: AGPL-3.0-only

//! Dense layer computed on an analog tile
//!
//! ```text
//! AnalogLinear
//!   ├── WeightSync     logical weight/bias ⇄ tile storage
//!   ├── AnalogContext  forward input / pending update
//!   └── training flag  forward(is_inference = !training)
//! ```
//!
//! The layer never computes with its logical `weight` / `bias`: every forward
//! and backward reads the tile. The logical fields are derived views kept in
//! step by [`WeightSync`].

use crate::function::{AnalogContext, AnalogFunction};
use crate::init::init_rng;
use crate::module::AnalogModule;
use crate::sync::{LayerWeights, WeightSync};
use analog_tile::{create_tile, AnalogTile, Backend, Result, RpuConfig, TileError, TileShape};
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, IxDyn};
use rand::rngs::StdRng;
use tracing::info;

/// Fully connected layer backed by an analog tile
#[derive(Debug)]
pub struct AnalogLinear {
    sync: WeightSync,
    ctx: AnalogContext,
    training: bool,
    rng: StdRng,
}

impl AnalogLinear {
    /// Build a layer on the CPU backend and initialize its weights.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a bad `rpu_config`, a zero dimension or a
    /// negative `weight_scaling_omega`.
    pub fn new(
        in_features: usize,
        out_features: usize,
        bias: bool,
        rpu_config: &RpuConfig,
        realistic_read_write: bool,
        weight_scaling_omega: f32,
    ) -> Result<Self> {
        Self::on_backend(
            in_features,
            out_features,
            bias,
            rpu_config,
            realistic_read_write,
            weight_scaling_omega,
            Backend::Cpu,
        )
    }

    /// Build a layer directly on `backend` and initialize its weights.
    ///
    /// # Errors
    ///
    /// As [`AnalogLinear::new`], plus `BackendUnavailable` if `backend` is
    /// not compiled in.
    pub fn on_backend(
        in_features: usize,
        out_features: usize,
        bias: bool,
        rpu_config: &RpuConfig,
        realistic_read_write: bool,
        weight_scaling_omega: f32,
        backend: Backend,
    ) -> Result<Self> {
        let shape = TileShape::new(in_features, out_features, bias);
        let tile = create_tile(shape, rpu_config, backend)?;
        let sync = WeightSync::new(tile, realistic_read_write, weight_scaling_omega)?;
        let mut layer = Self {
            sync,
            ctx: AnalogContext::default(),
            training: true,
            rng: init_rng(rpu_config.seed),
        };
        layer.reset_parameters()?;
        info!(
            "AnalogLinear {in_features}→{out_features} (bias={bias}, realistic={realistic_read_write}, omega={weight_scaling_omega}) on {backend}"
        );
        Ok(layer)
    }

    /// Input size
    pub fn in_features(&self) -> usize {
        self.sync.shape().in_size
    }

    /// Output size
    pub fn out_features(&self) -> usize {
        self.sync.shape().out_size
    }

    /// Whether the layer has a bias
    pub fn has_bias(&self) -> bool {
        self.sync.shape().bias
    }

    /// Whether weight transfers are realistic (noisy)
    pub fn realistic_read_write(&self) -> bool {
        self.sync.realistic_read_write()
    }

    /// Omega used to scale weights on write (0 = off)
    pub fn weight_scaling_omega(&self) -> f32 {
        self.sync.weight_scaling_omega()
    }

    /// Logical weights, as last synchronized with the tile
    pub fn weight(&self) -> &Array2<f32> {
        self.sync.weight()
    }

    /// Logical bias, as last synchronized with the tile
    pub fn bias(&self) -> Option<&Array1<f32>> {
        self.sync.bias()
    }

    /// The tile holding this layer's weights
    pub fn analog_tile(&self) -> &dyn AnalogTile {
        self.sync.tile()
    }

    /// Program weights and bias into the tile.
    ///
    /// # Errors
    ///
    /// Returns `Shape` on any dimension mismatch; the tile is unchanged.
    pub fn set_weights(
        &mut self,
        weights: ArrayView2<'_, f32>,
        bias: Option<ArrayView1<'_, f32>>,
    ) -> Result<()> {
        self.sync.set_weights(weights, bias)
    }

    /// Program weights and bias bypassing the realistic channel.
    ///
    /// # Errors
    ///
    /// Returns `Shape` on any dimension mismatch.
    pub fn set_weights_exact(
        &mut self,
        weights: ArrayView2<'_, f32>,
        bias: Option<ArrayView1<'_, f32>>,
    ) -> Result<()> {
        self.sync.set_weights_exact(weights, bias)
    }

    /// Read weights and bias back from the tile
    ///
    /// # Errors
    ///
    /// Returns `Shape` if the tile's read-back does not match the layer.
    pub fn get_weights(&mut self) -> Result<LayerWeights> {
        self.sync.get_weights()
    }

    /// Read weights and bias back exactly
    ///
    /// # Errors
    ///
    /// Returns `Shape` if the tile's read-back does not match the layer.
    pub fn get_weights_exact(&mut self) -> Result<LayerWeights> {
        self.sync.get_weights_exact()
    }

    /// Draw fresh initial weights and program them into the tile.
    ///
    /// # Errors
    ///
    /// Only fails if the tile rejects the write.
    pub fn reset_parameters(&mut self) -> Result<()> {
        self.sync.reset_parameters(&mut self.rng)
    }
}

/// Split an input into leading dims, flat row-major data and batch size.
fn batched(
    input: &ArrayViewD<'_, f32>,
    what: &'static str,
    width: usize,
) -> Result<(Vec<usize>, Vec<f32>, usize)> {
    let last = input.shape().last().copied().unwrap_or(0);
    if input.ndim() == 0 || last != width {
        return Err(TileError::shape(what, width, last));
    }
    let lead = input.shape()[..input.ndim() - 1].to_vec();
    let batch = lead.iter().product();
    Ok((lead, input.iter().copied().collect(), batch))
}

fn reshape(mut lead: Vec<usize>, width: usize, data: Vec<f32>) -> Result<ArrayD<f32>> {
    lead.push(width);
    let expected: usize = lead.iter().product();
    let got = data.len();
    ArrayD::from_shape_vec(IxDyn(&lead), data)
        .map_err(|_| TileError::shape("output", expected, got))
}

impl AnalogModule for AnalogLinear {
    fn name(&self) -> &'static str {
        "AnalogLinear"
    }

    fn forward(&mut self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        let (lead, flat, batch) = batched(&input, "input features", self.in_features())?;
        let out = AnalogFunction::forward(
            &mut self.ctx,
            self.sync.tile_mut(),
            &flat,
            batch,
            !self.training,
        )?;
        reshape(lead, self.out_features(), out)
    }

    fn backward(&mut self, grad_output: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        let (lead, flat, _) = batched(&grad_output, "grad_output features", self.out_features())?;
        let grad_input = AnalogFunction::backward(&mut self.ctx, self.sync.tile(), &flat)?;
        reshape(lead, self.in_features(), grad_input)
    }

    fn update(&mut self, learning_rate: f32) -> Result<usize> {
        let applied = AnalogFunction::update(&mut self.ctx, self.sync.tile_mut(), learning_rate)?;
        if applied {
            self.sync.refresh_shadow()?;
        }
        Ok(usize::from(applied))
    }

    fn train(&mut self, mode: bool) {
        self.training = mode;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn backend(&self) -> Option<Backend> {
        Some(self.sync.tile().backend())
    }

    fn migrate(&mut self, target: Backend) -> Result<()> {
        self.sync.migrate(target)
    }

    fn analog_tiles(&self) -> Vec<&dyn AnalogTile> {
        vec![self.sync.tile()]
    }
}
