//! Impala CNN image encoder.
//!
//! Stacks of downsampling stages, each a widening convolution, an optional
//! 3x3/stride-2 max-pool and a run of pre-activation residual blocks,
//! followed by a dense projection to the code size.
//!
//! Input `[B, T, H, W, C]` (channels last), output `[B, T, outsize]`.

use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Linear, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::relu;

use super::encoder::{check_first_flags, EmptyState, Encoder};
use super::init::{normed_conv2d, normed_linear};
use super::{check_scale, CONFIG_SCHEMA_VERSION};
use crate::error::EncoderError;

/// Norm of the dense projection's per-unit weights.
const DENSE_SCALE: f64 = 1.4;

// ─── Configuration ────────────────────────────────────────────────

/// Residual block configuration.
#[derive(Config, Debug)]
pub struct CnnBasicBlockConfig {
    /// Channel count, preserved by the block.
    pub channels: usize,
    /// Block scale; each convolution gets `sqrt(scale)`.
    #[config(default = 1.0)]
    pub scale: f64,
    /// Batch-normalize before each activation.
    #[config(default = false)]
    pub batch_norm: bool,
}

/// Downsampling stage configuration.
#[derive(Config, Debug)]
pub struct CnnDownStackConfig {
    /// Input channels.
    pub in_channels: usize,
    /// Output channels.
    pub out_channels: usize,
    /// Residual blocks after the widening convolution.
    #[config(default = 2)]
    pub num_blocks: usize,
    /// Stage scale, split evenly across the blocks.
    #[config(default = 1.0)]
    pub scale: f64,
    /// Halve spatial extent with a max-pool.
    #[config(default = true)]
    pub pool: bool,
    /// Batch-normalize inside residual blocks.
    #[config(default = false)]
    pub batch_norm: bool,
}

/// Impala image encoder configuration.
///
/// Fields added after the first schema version carry defaults, so older
/// saved configs load with the behavior they were trained with.
#[derive(Config, Debug)]
pub struct ImpalaEncoderConfig {
    /// Observation shape `[height, width, channels]`.
    pub inshape: [usize; 3],
    /// Code size.
    #[config(default = 256)]
    pub outsize: usize,
    /// Output channels of each downsampling stage, in order.
    #[config(default = "vec![16, 32, 32]")]
    pub chans: Vec<usize>,
    /// Raw observations are divided by this before any layer.
    #[config(default = 255.0)]
    pub scale_ob: f64,
    /// Residual blocks per stage.
    #[config(default = 2)]
    pub nblock: usize,
    /// Apply ReLU after the dense projection.
    #[config(default = true)]
    pub final_relu: bool,
    /// Batch-normalize inside residual blocks.
    #[config(default = false)]
    pub batch_norm: bool,
    /// Max-pool in each stage.
    #[config(default = true)]
    pub pool: bool,
    /// Schema version this config was written with.
    #[config(default = "CONFIG_SCHEMA_VERSION")]
    pub schema_version: u32,
}

// ─── Residual Block ───────────────────────────────────────────────

/// Pre-activation residual block. Preserves channel count and shape.
#[derive(Module, Debug)]
pub struct CnnBasicBlock<B: Backend> {
    conv0: Conv2d<B>,
    conv1: Conv2d<B>,
    bn0: Option<BatchNorm<B>>,
    bn1: Option<BatchNorm<B>>,
}

impl CnnBasicBlockConfig {
    /// Initialize a residual block.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CnnBasicBlock<B> {
        let s = self.scale.sqrt();
        let norm = |device: &B::Device| {
            self.batch_norm
                .then(|| BatchNormConfig::new(self.channels).init(device))
        };
        CnnBasicBlock {
            conv0: normed_conv2d(self.channels, self.channels, 3, 1, s, device),
            conv1: normed_conv2d(self.channels, self.channels, 3, 1, s, device),
            bn0: norm(device),
            bn1: norm(device),
        }
    }
}

impl<B: Backend> CnnBasicBlock<B> {
    /// The learned correction added to the input.
    pub fn residual(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.bn0 {
            Some(bn) => bn.forward(x),
            None => x,
        };
        let x = self.conv0.forward(relu(x));
        let x = match &self.bn1 {
            Some(bn) => bn.forward(x),
            None => x,
        };
        self.conv1.forward(relu(x))
    }

    /// `x + residual(x)`; the skip path uses the untouched input.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        x.clone() + self.residual(x)
    }
}

// ─── Downsampling Stage ───────────────────────────────────────────

/// Widening convolution, optional max-pool, residual blocks.
#[derive(Module, Debug)]
pub struct CnnDownStack<B: Backend> {
    firstconv: Conv2d<B>,
    pool: Option<MaxPool2d>,
    blocks: Vec<CnnBasicBlock<B>>,
    in_channels: usize,
    out_channels: usize,
}

impl CnnDownStackConfig {
    /// Initialize a downsampling stage.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CnnDownStack<B> {
        let block_scale = if self.num_blocks == 0 {
            self.scale
        } else {
            self.scale / (self.num_blocks as f64).sqrt()
        };
        let blocks = (0..self.num_blocks)
            .map(|_| {
                CnnBasicBlockConfig::new(self.out_channels)
                    .with_scale(block_scale)
                    .with_batch_norm(self.batch_norm)
                    .init(device)
            })
            .collect();

        let pool = self.pool.then(|| {
            MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init()
        });

        CnnDownStack {
            firstconv: normed_conv2d(self.in_channels, self.out_channels, 3, 1, 1.0, device),
            pool,
            blocks,
            in_channels: self.in_channels,
            out_channels: self.out_channels,
        }
    }
}

impl<B: Backend> CnnDownStack<B> {
    /// `[N, in, H, W]` → `[N, out, H', W']`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.firstconv.forward(x);
        if let Some(pool) = &self.pool {
            x = pool.forward(x);
        }
        for block in &self.blocks {
            x = block.forward(x);
        }
        x
    }

    /// Shape `[c, h, w]` this stage produces from an input of shape `inshape`.
    pub fn output_shape(&self, inshape: [usize; 3]) -> Result<[usize; 3], EncoderError> {
        let [c, h, w] = inshape;
        if c != self.in_channels {
            return Err(EncoderError::ChannelMismatch {
                expected: self.in_channels,
                actual: c,
            });
        }
        if self.pool.is_some() {
            Ok([self.out_channels, h.div_ceil(2), w.div_ceil(2)])
        } else {
            Ok([self.out_channels, h, w])
        }
    }
}

// ─── Impala CNN ───────────────────────────────────────────────────

/// The convolutional trunk plus dense head.
#[derive(Module, Debug)]
pub struct ImpalaCnn<B: Backend> {
    stacks: Vec<CnnDownStack<B>>,
    dense: Linear<B>,
    scale_ob: f64,
    final_relu: bool,
    height: usize,
    width: usize,
    channels: usize,
    /// Flattened `[c, h, w]` after the last stage; the dense input width.
    features: usize,
    outsize: usize,
}

impl<B: Backend> ImpalaCnn<B> {
    fn new(config: &ImpalaEncoderConfig, device: &B::Device) -> Result<Self, EncoderError> {
        let [h, w, c] = config.inshape;
        let mut curshape = [c, h, w];
        let stack_scale = 1.0 / (config.chans.len() as f64).sqrt();

        let mut stacks = Vec::with_capacity(config.chans.len());
        for &outchan in &config.chans {
            let stack = CnnDownStackConfig::new(curshape[0], outchan)
                .with_num_blocks(config.nblock)
                .with_scale(stack_scale)
                .with_pool(config.pool)
                .with_batch_norm(config.batch_norm)
                .init(device);
            curshape = stack.output_shape(curshape)?;
            tracing::debug!(?curshape, "impala stage");
            stacks.push(stack);
        }

        let features = curshape.iter().product();
        Ok(ImpalaCnn {
            stacks,
            dense: normed_linear(features, config.outsize, DENSE_SCALE, device),
            scale_ob: config.scale_ob,
            final_relu: config.final_relu,
            height: h,
            width: w,
            channels: c,
            features,
            outsize: config.outsize,
        })
    }

    /// `[B, T, H, W, C]` → `[B, T, outsize]`
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 3> {
        let [b, t, h, w, c] = x.dims();
        assert_eq!(
            [h, w, c],
            [self.height, self.width, self.channels],
            "observation shape does not match encoder inshape"
        );

        let x = x.div_scalar(self.scale_ob);
        // NHWC → NCHW
        let mut x = x.reshape([b * t, h, w, c]).permute([0, 3, 1, 2]);
        for stack in &self.stacks {
            x = stack.forward(x);
        }

        let x = relu(x.reshape([b, t, self.features]));
        let x = self.dense.forward(x);
        if self.final_relu {
            relu(x)
        } else {
            x
        }
    }

    /// Shape `[c, h, w]` after each stage, in order.
    pub fn stage_shapes(&self) -> Vec<[usize; 3]> {
        let mut shape = [self.channels, self.height, self.width];
        let mut shapes = Vec::with_capacity(self.stacks.len());
        for stack in &self.stacks {
            // Shapes were validated at construction.
            if let Ok(next) = stack.output_shape(shape) {
                shape = next;
            }
            shapes.push(shape);
        }
        shapes
    }

    /// Flattened feature count fed to the dense projection.
    pub fn feature_count(&self) -> usize {
        self.features
    }
}

// ─── Encoder ──────────────────────────────────────────────────────

/// Stateless image encoder over an [`ImpalaCnn`].
#[derive(Module, Debug)]
pub struct ImpalaEncoder<B: Backend> {
    cnn: ImpalaCnn<B>,
}

impl ImpalaEncoderConfig {
    /// Validate the configuration and initialize the encoder.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<ImpalaEncoder<B>, EncoderError> {
        self.validate()?;
        Ok(ImpalaEncoder {
            cnn: ImpalaCnn::new(self, device)?,
        })
    }

    fn validate(&self) -> Result<(), EncoderError> {
        check_scale(self.scale_ob)?;
        if self.inshape.contains(&0) {
            return Err(EncoderError::InvalidShape {
                shape: self.inshape.to_vec(),
                reason: "inshape extents must be nonzero".into(),
            });
        }
        if self.chans.is_empty() || self.chans.contains(&0) {
            return Err(EncoderError::InvalidShape {
                shape: self.chans.clone(),
                reason: "need at least one stage, each with nonzero channels".into(),
            });
        }
        if self.outsize == 0 {
            return Err(EncoderError::InvalidShape {
                shape: vec![self.outsize],
                reason: "outsize must be nonzero".into(),
            });
        }
        Ok(())
    }
}

impl<B: Backend> ImpalaEncoder<B> {
    pub fn cnn(&self) -> &ImpalaCnn<B> {
        &self.cnn
    }
}

impl<B: Backend> Encoder<B, 5> for ImpalaEncoder<B> {
    type State = EmptyState;

    fn code_size(&self) -> usize {
        self.cnn.outsize
    }

    fn initial_state(&self, batch_size: usize, _device: &B::Device) -> EmptyState {
        EmptyState::new(batch_size)
    }

    fn forward(
        &self,
        obs: Tensor<B, 5>,
        first: Option<Tensor<B, 2, Bool>>,
        state_in: EmptyState,
    ) -> (Tensor<B, 3>, EmptyState) {
        let [b, t, ..] = obs.dims();
        check_first_flags(first.as_ref(), b, t);
        (self.cnn.forward(obs), state_in)
    }
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray;

    fn small_config(inshape: [usize; 3]) -> ImpalaEncoderConfig {
        ImpalaEncoderConfig::new(inshape)
            .with_outsize(16)
            .with_chans(vec![4, 8])
            .with_nblock(1)
    }

    fn max_abs_diff(a: Tensor<B, 4>, b: Tensor<B, 4>) -> f32 {
        (a - b).abs().max().into_scalar()
    }

    fn conv_unit_norms(conv: &Conv2d<B>) -> Vec<f32> {
        let w = conv.weight.val();
        (w.clone() * w)
            .sum_dim(3)
            .sum_dim(2)
            .sum_dim(1)
            .sqrt()
            .into_data()
            .to_vec::<f32>()
            .unwrap()
    }

    fn assert_norms(norms: Vec<f32>, expected: f64, layer: &str) {
        assert!(!norms.is_empty());
        for n in norms {
            assert!(
                (n as f64 - expected).abs() < 1e-4,
                "{}: unit norm {} != {}",
                layer,
                n,
                expected
            );
        }
    }

    #[test]
    fn layer_scales_follow_depth() {
        let device = Default::default();
        let encoder = ImpalaEncoderConfig::new([8, 8, 3])
            .with_outsize(6)
            .with_chans(vec![4, 6, 5])
            .with_nblock(2)
            .init::<B>(&device)
            .unwrap();

        // 1/sqrt(len(chans)) per stage, split over sqrt(nblock) blocks,
        // shared by the block's two convs.
        let block_conv = (1.0 / 3f64.sqrt() / 2f64.sqrt()).sqrt();
        assert_eq!(encoder.cnn.stacks.len(), 3);
        for (i, stack) in encoder.cnn.stacks.iter().enumerate() {
            assert_norms(conv_unit_norms(&stack.firstconv), 1.0, &format!("stage {} firstconv", i));
            assert_eq!(stack.blocks.len(), 2);
            for (j, block) in stack.blocks.iter().enumerate() {
                assert_norms(conv_unit_norms(&block.conv0), block_conv, &format!("stage {} block {} conv0", i, j));
                assert_norms(conv_unit_norms(&block.conv1), block_conv, &format!("stage {} block {} conv1", i, j));
            }
        }

        let w = encoder.cnn.dense.weight.val();
        let dense = (w.clone() * w)
            .sum_dim(0)
            .sqrt()
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(dense.len(), 6);
        assert_norms(dense, DENSE_SCALE, "dense");
    }

    #[test]
    fn impala_encoder_forward_shape() {
        let device = Default::default();
        let encoder = small_config([12, 10, 3]).init::<B>(&device).unwrap();

        let obs = Tensor::<B, 5>::random([2, 3, 12, 10, 3], Distribution::Uniform(0.0, 255.0), &device);
        let code = encoder.stateless_forward(obs);

        assert_eq!(code.dims(), [2, 3, 16]);
    }

    #[test]
    fn feature_bookkeeping_matches_execution() {
        let device = Default::default();
        for (inshape, pool) in [
            ([7, 9, 1], true),
            ([8, 8, 3], true),
            ([1, 5, 2], true),
            ([6, 5, 3], false),
        ] {
            let config = small_config(inshape).with_pool(pool);
            let encoder = config.init::<B>(&device).unwrap();
            let cnn = encoder.cnn();

            let [h, w, c] = inshape;
            let mut x = Tensor::<B, 4>::ones([2, c, h, w], &device);
            for stack in &cnn.stacks {
                x = stack.forward(x);
            }
            let [_, c2, h2, w2] = x.dims();

            assert_eq!(cnn.feature_count(), c2 * h2 * w2, "inshape {:?}", inshape);
            assert_eq!(cnn.stage_shapes().last(), Some(&[c2, h2, w2]));
        }
    }

    #[test]
    fn pooling_halves_with_ceil() {
        let device = Default::default();
        let stack = CnnDownStackConfig::new(3, 5).init::<B>(&device);
        assert_eq!(stack.output_shape([3, 7, 8]).unwrap(), [5, 4, 4]);

        let flat = CnnDownStackConfig::new(3, 5).with_pool(false).init::<B>(&device);
        assert_eq!(flat.output_shape([3, 7, 8]).unwrap(), [5, 7, 8]);
    }

    #[test]
    fn output_shape_rejects_wrong_channels() {
        let device = Default::default();
        let stack = CnnDownStackConfig::new(3, 5).init::<B>(&device);
        assert!(matches!(
            stack.output_shape([4, 8, 8]),
            Err(EncoderError::ChannelMismatch {
                expected: 3,
                actual: 4
            })
        ));
    }

    #[test]
    fn residual_skip_uses_original_input() {
        let device = Default::default();
        let block = CnnBasicBlockConfig::new(4).init::<B>(&device);
        let x = Tensor::<B, 4>::random([2, 4, 5, 5], Distribution::Normal(0.0, 1.0), &device);

        let expected = x.clone() + block.residual(x.clone());
        assert!(max_abs_diff(block.forward(x), expected) < 1e-5);
    }

    #[test]
    fn zeroed_convolutions_make_block_identity() {
        let device = Default::default();
        let mut block = CnnBasicBlockConfig::new(3).init::<B>(&device);
        block.conv0.weight = block.conv0.weight.map(|w| w.zeros_like());
        block.conv1.weight = block.conv1.weight.map(|w| w.zeros_like());

        let x = Tensor::<B, 4>::random([1, 3, 4, 6], Distribution::Normal(0.0, 1.0), &device);
        assert!(max_abs_diff(block.forward(x.clone()), x) < 1e-6);
    }

    #[test]
    fn zeroed_block_is_identity_with_batch_norm() {
        let device = Default::default();
        let mut block = CnnBasicBlockConfig::new(3)
            .with_batch_norm(true)
            .init::<B>(&device);
        block.conv0.weight = block.conv0.weight.map(|w| w.zeros_like());
        block.conv1.weight = block.conv1.weight.map(|w| w.zeros_like());

        let x = Tensor::<B, 4>::random([2, 3, 4, 4], Distribution::Normal(2.0, 3.0), &device);
        assert!(max_abs_diff(block.forward(x.clone()), x) < 1e-6);
    }

    #[test]
    fn stateless_matches_forward_from_initial_state() {
        let device = Default::default();
        let encoder = small_config([8, 8, 3]).init::<B>(&device).unwrap();
        let obs = Tensor::<B, 5>::random([3, 2, 8, 8, 3], Distribution::Uniform(0.0, 255.0), &device);

        let stateless = encoder.stateless_forward(obs.clone());
        let first = Tensor::<B, 2>::zeros([3, 2], &device).greater_elem(0.5);
        let (code, state) = encoder.forward(obs, Some(first), encoder.initial_state(3, &device));

        let diff: f32 = (stateless - code).abs().max().into_scalar();
        assert!(diff < 1e-6);
        assert_eq!(state.dims(), [3, 0]);
    }

    #[test]
    fn initial_state_is_empty() {
        let device = Default::default();
        let encoder = small_config([4, 4, 1]).init::<B>(&device).unwrap();
        for batch in [1, 5, 32] {
            assert_eq!(encoder.initial_state(batch, &device).dims(), [batch, 0]);
        }
    }

    #[test]
    fn final_relu_controls_sign() {
        let device = Default::default();
        let obs = Tensor::<B, 5>::random([2, 2, 6, 6, 3], Distribution::Uniform(0.0, 255.0), &device);

        let with_relu = small_config([6, 6, 3]).init::<B>(&device).unwrap();
        let min: f32 = with_relu.stateless_forward(obs).min().into_scalar();
        assert!(min >= 0.0);

        let without = small_config([6, 6, 3])
            .with_final_relu(false)
            .init::<B>(&device)
            .unwrap();
        assert_eq!(without.code_size(), 16);
    }

    #[test]
    fn rejects_zero_scale() {
        let device = Default::default();
        let result = small_config([4, 4, 3]).with_scale_ob(0.0).init::<B>(&device);
        assert!(matches!(result, Err(EncoderError::InvalidScale(_))));
    }

    #[test]
    fn rejects_empty_stages() {
        let device = Default::default();
        let result = small_config([4, 4, 3]).with_chans(vec![]).init::<B>(&device);
        assert!(matches!(result, Err(EncoderError::InvalidShape { .. })));
    }

    #[test]
    fn code_size_independent_of_extents() {
        let device = Default::default();
        let encoder = small_config([5, 5, 2]).init::<B>(&device).unwrap();
        for (b, t) in [(1, 1), (2, 7), (4, 3)] {
            let obs = Tensor::<B, 5>::zeros([b, t, 5, 5, 2], &device);
            assert_eq!(encoder.stateless_forward(obs).dims(), [b, t, 16]);
        }
    }
}
