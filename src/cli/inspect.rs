use std::path::{Path, PathBuf};

use burn::backend::{NdArray, Wgpu};
use burn::module::Module;
use burn::prelude::*;
use clap::{Args, ValueEnum};

use rlc_learn::neural::checkpoint::{is_checkpoint, load_config, load_encoder, EncoderSpec};
use rlc_learn::neural::{Encoder, FullyConnectedEncoderConfig, ImpalaEncoderConfig};
use rlc_learn::{EncoderError, Error, Result};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum EncoderKind {
    /// Impala CNN over [H, W, C] images
    Image,
    /// MLP over flat feature vectors
    Vector,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Encoder config (.json) or checkpoint directory
    pub path: PathBuf,
    /// Which encoder the config describes
    #[arg(long, value_enum, default_value = "image")]
    pub kind: EncoderKind,
    /// Batch extent of the probe observation
    #[arg(long, default_value = "1")]
    pub batch: usize,
    /// Time extent of the probe observation
    #[arg(long, default_value = "1")]
    pub time: usize,
    /// Run on the GPU (wgpu) instead of the CPU
    #[arg(long)]
    pub gpu: bool,
}

pub fn cmd_inspect(args: InspectArgs) -> Result<()> {
    if args.batch == 0 || args.time == 0 {
        return Err(Error::Usage("--batch and --time must be positive".to_string()));
    }
    if args.gpu {
        let device = burn::backend::wgpu::WgpuDevice::default();
        run::<Wgpu>(&args, &device)
    } else {
        run::<NdArray>(&args, &Default::default())
    }
}

/// Load a checkpoint directory, or build fresh weights from a config file.
fn load_or_init<B: Backend, C: EncoderSpec>(
    path: &Path,
    device: &B::Device,
) -> Result<(C, C::Encoder<B>), EncoderError> {
    if path.is_dir() {
        if !is_checkpoint(path) {
            return Err(EncoderError::Record {
                path: path.to_path_buf(),
                message: "not a checkpoint directory (need config.json and model.mpk)".into(),
            });
        }
        return load_encoder::<B, C>(path, device);
    }
    let config: C = load_config(path)?;
    let encoder = config.build::<B>(device)?;
    Ok((config, encoder))
}

fn run<B: Backend>(args: &InspectArgs, device: &B::Device) -> Result<()> {
    match args.kind {
        EncoderKind::Image => {
            let (config, encoder) = load_or_init::<B, ImpalaEncoderConfig>(&args.path, device)?;
            let [h, w, c] = config.inshape;
            println!("impala encoder (schema v{})", config.schema_version);
            println!("  input:    [{}, {}, {}] (h, w, c) / {}", h, w, c, config.scale_ob);
            for (i, [sc, sh, sw]) in encoder.cnn().stage_shapes().into_iter().enumerate() {
                println!("  stage {}:  [{}, {}, {}] (c, h, w)", i, sc, sh, sw);
            }
            println!("  features: {}", encoder.cnn().feature_count());
            println!("  params:   {}", encoder.num_params());

            let obs = Tensor::<B, 5>::zeros([args.batch, args.time, h, w, c], device);
            let code = encoder.stateless_forward(obs);
            println!("  code:     {:?}", code.dims());
        }
        EncoderKind::Vector => {
            let (config, encoder) =
                load_or_init::<B, FullyConnectedEncoderConfig>(&args.path, device)?;
            let widths = encoder.mlp().layer_widths();
            println!("fully-connected encoder (schema v{})", config.schema_version);
            println!("  input:    {:?} / {}", config.inshape, config.scale_ob);
            println!("  layers:   {:?} ({:?} norm)", widths, config.norm);
            println!("  params:   {}", encoder.num_params());

            // The MLP flattens trailing dims, so probe with them pre-flattened.
            let obs = Tensor::<B, 3>::zeros([args.batch, args.time, widths[0]], device);
            let code = encoder.stateless_forward(obs);
            println!("  code:     {:?}", code.dims());
        }
    }
    Ok(())
}
