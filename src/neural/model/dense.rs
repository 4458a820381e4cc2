//! Fully-connected encoder for flat (non-image) observations.
//!
//! `[B, T, *feature_dims]` is flattened to `[B*T, F]`, passed through
//! `dense → norm → relu` hidden blocks and a final dense projection,
//! then split back to `[B, T, outsize]`.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{BatchNorm, BatchNormConfig, LayerNorm, LayerNormConfig, Linear};
use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use super::encoder::{check_first_flags, EmptyState, Encoder};
use super::init::normed_linear;
use super::{check_scale, CONFIG_SCHEMA_VERSION};
use crate::error::EncoderError;

/// Normalization applied after each hidden dense layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormKind {
    Layer,
    /// Batch norm over the flattened rows, skipped for single-row batches.
    Batch,
}

/// Fully-connected encoder configuration.
#[derive(Config, Debug)]
pub struct FullyConnectedEncoderConfig {
    /// Per-step observation shape; its product is the input width.
    pub inshape: Vec<usize>,
    /// Code size.
    #[config(default = 256)]
    pub outsize: usize,
    /// Hidden layer widths, in order.
    #[config(default = "vec![256, 256]")]
    pub hidden_sizes: Vec<usize>,
    /// Raw observations are divided by this before any layer.
    #[config(default = 1.0)]
    pub scale_ob: f64,
    #[config(default = "NormKind::Layer")]
    pub norm: NormKind,
    /// Schema version this config was written with.
    #[config(default = "CONFIG_SCHEMA_VERSION")]
    pub schema_version: u32,
}

// ─── Normalization ────────────────────────────────────────────────

/// Batch norm that leaves a single-row batch untouched.
#[derive(Module, Debug)]
pub struct BatchNormSkipping<B: Backend> {
    norm: BatchNorm<B>,
}

impl<B: Backend> BatchNormSkipping<B> {
    pub fn new(features: usize, device: &B::Device) -> Self {
        Self {
            norm: BatchNormConfig::new(features).init(device),
        }
    }

    /// `[N, F]` → `[N, F]`
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        if x.dims()[0] == 1 {
            return x;
        }
        self.norm.forward(x)
    }
}

// ─── Hidden Block ─────────────────────────────────────────────────

/// `dense → norm → relu`. Exactly one of the norms is present.
#[derive(Module, Debug)]
pub struct HiddenBlock<B: Backend> {
    linear: Linear<B>,
    layer_norm: Option<LayerNorm<B>>,
    batch_norm: Option<BatchNormSkipping<B>>,
}

impl<B: Backend> HiddenBlock<B> {
    fn new(d_in: usize, d_out: usize, norm: NormKind, device: &B::Device) -> Self {
        let (layer_norm, batch_norm) = match norm {
            NormKind::Layer => (Some(LayerNormConfig::new(d_out).init(device)), None),
            NormKind::Batch => (None, Some(BatchNormSkipping::new(d_out, device))),
        };
        HiddenBlock {
            linear: normed_linear(d_in, d_out, 1.0, device),
            layer_norm,
            batch_norm,
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = self.linear.forward(x);
        if let Some(norm) = &self.layer_norm {
            x = norm.forward(x);
        }
        if let Some(norm) = &self.batch_norm {
            x = norm.forward(x);
        }
        relu(x)
    }
}

// ─── MLP ──────────────────────────────────────────────────────────

/// The MLP behind [`FullyConnectedEncoder`].
#[derive(Module, Debug)]
pub struct FullyConnectedNn<B: Backend> {
    hidden: Vec<HiddenBlock<B>>,
    out: Linear<B>,
    scale_ob: f64,
    in_size: usize,
    outsize: usize,
}

impl<B: Backend> FullyConnectedNn<B> {
    /// `[B, T, *feature_dims]` → `[B, T, outsize]`
    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, 3> {
        let dims = x.dims();
        assert!(D >= 2, "observations need a (batch, time) preshape");
        let (b, t) = (dims[0], dims[1]);
        let features: usize = dims[2..].iter().product();
        assert_eq!(
            features, self.in_size,
            "observation features do not match encoder inshape"
        );

        let mut x = x.div_scalar(self.scale_ob).reshape([b * t, self.in_size]);
        for block in &self.hidden {
            x = block.forward(x);
        }
        self.out.forward(x).reshape([b, t, self.outsize])
    }

    /// Input width followed by each layer's output width.
    pub fn layer_widths(&self) -> Vec<usize> {
        let mut widths = vec![self.in_size];
        widths.extend(self.hidden.iter().map(|h| h.linear.weight.dims()[1]));
        widths.push(self.outsize);
        widths
    }
}

// ─── Encoder ──────────────────────────────────────────────────────

/// Stateless encoder over a [`FullyConnectedNn`].
#[derive(Module, Debug)]
pub struct FullyConnectedEncoder<B: Backend> {
    mlp: FullyConnectedNn<B>,
}

impl FullyConnectedEncoderConfig {
    /// Validate the configuration and initialize the encoder.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<FullyConnectedEncoder<B>, EncoderError> {
        check_scale(self.scale_ob)?;
        if self.inshape.contains(&0) {
            return Err(EncoderError::InvalidShape {
                shape: self.inshape.clone(),
                reason: "inshape extents must be nonzero".into(),
            });
        }
        if self.outsize == 0 || self.hidden_sizes.contains(&0) {
            return Err(EncoderError::InvalidShape {
                shape: self.hidden_sizes.clone(),
                reason: "layer widths must be nonzero".into(),
            });
        }

        let in_size: usize = self.inshape.iter().product();
        let mut hidden = Vec::with_capacity(self.hidden_sizes.len());
        let mut prev = in_size;
        for &h in &self.hidden_sizes {
            hidden.push(HiddenBlock::new(prev, h, self.norm, device));
            prev = h;
        }

        Ok(FullyConnectedEncoder {
            mlp: FullyConnectedNn {
                hidden,
                out: normed_linear(prev, self.outsize, 1.0, device),
                scale_ob: self.scale_ob,
                in_size,
                outsize: self.outsize,
            },
        })
    }
}

impl<B: Backend> FullyConnectedEncoder<B> {
    pub fn mlp(&self) -> &FullyConnectedNn<B> {
        &self.mlp
    }
}

impl<B: Backend, const D: usize> Encoder<B, D> for FullyConnectedEncoder<B> {
    type State = EmptyState;

    fn code_size(&self) -> usize {
        self.mlp.outsize
    }

    fn initial_state(&self, batch_size: usize, _device: &B::Device) -> EmptyState {
        EmptyState::new(batch_size)
    }

    fn forward(
        &self,
        obs: Tensor<B, D>,
        first: Option<Tensor<B, 2, Bool>>,
        state_in: EmptyState,
    ) -> (Tensor<B, 3>, EmptyState) {
        assert!(D >= 2, "observations need a (batch, time) preshape");
        let dims = obs.dims();
        check_first_flags(first.as_ref(), dims[0], dims[1]);
        (self.mlp.forward(obs), state_in)
    }
}
