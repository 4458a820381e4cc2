//! Normed layer construction.
//!
//! Every weight-bearing layer in the encoders is built with its weights
//! rescaled so that each output unit's incoming weight vector has L2 norm
//! `scale`, and with a zero bias. Keeping the per-unit norm fixed lets the
//! per-stage and per-block scale factors control activation magnitude
//! regardless of network depth.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d};
use burn::prelude::*;

/// Build a square-kernel 2D convolution with normed weights and zero bias.
///
/// Weight layout is `[out, in, k, k]`; the norm is taken over everything
/// but the output channel.
pub fn normed_conv2d<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    padding: usize,
    scale: f64,
    device: &B::Device,
) -> Conv2d<B> {
    let mut conv = Conv2dConfig::new([in_channels, out_channels], [kernel, kernel])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .init(device);

    conv.weight = conv.weight.map(|w| {
        let norm = (w.clone() * w.clone())
            .sum_dim(3)
            .sum_dim(2)
            .sum_dim(1)
            .sqrt(); // [out, 1, 1, 1]
        (w / norm).mul_scalar(scale)
    });
    conv.bias = conv.bias.map(|bias| bias.map(|b| b.zeros_like()));
    conv
}

/// Build a dense layer with normed weights and zero bias.
///
/// burn stores linear weights as `[d_in, d_out]`, so the per-unit norm
/// runs over dimension 0.
pub fn normed_linear<B: Backend>(
    d_in: usize,
    d_out: usize,
    scale: f64,
    device: &B::Device,
) -> Linear<B> {
    let mut linear = LinearConfig::new(d_in, d_out).init(device);

    linear.weight = linear.weight.map(|w| {
        let norm = (w.clone() * w.clone()).sum_dim(0).sqrt(); // [1, d_out]
        (w / norm).mul_scalar(scale)
    });
    linear.bias = linear.bias.map(|bias| bias.map(|b| b.zeros_like()));
    linear
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-4, "{} != {}", a, b);
    }

    #[test]
    fn conv_rows_have_requested_norm() {
        let device = Default::default();
        let conv = normed_conv2d::<B>(3, 8, 3, 1, 0.5, &device);
        let w = conv.weight.val();
        let norms = (w.clone() * w)
            .sum_dim(3)
            .sum_dim(2)
            .sum_dim(1)
            .sqrt()
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(norms.len(), 8);
        for n in norms {
            assert_close(n, 0.5);
        }
    }

    #[test]
    fn linear_columns_have_requested_norm() {
        let device = Default::default();
        let linear = normed_linear::<B>(10, 4, 1.4, &device);
        let w = linear.weight.val();
        let norms = (w.clone() * w)
            .sum_dim(0)
            .sqrt()
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(norms.len(), 4);
        for n in norms {
            assert_close(n, 1.4);
        }
    }

    #[test]
    fn biases_start_at_zero() {
        let device = Default::default();
        let conv = normed_conv2d::<B>(2, 4, 3, 1, 1.0, &device);
        let linear = normed_linear::<B>(6, 3, 1.0, &device);
        let conv_bias = conv.bias.expect("conv has bias").val();
        let lin_bias = linear.bias.expect("linear has bias").val();
        assert_eq!(conv_bias.abs().sum().into_scalar(), 0.0);
        assert_eq!(lin_bias.abs().sum().into_scalar(), 0.0);
    }
}
