//! Observation encoders for RLC reinforcement learning.
//!
//! Two encoders share the [`Encoder`] capability: an Impala CNN for image
//! observations and an MLP for flat feature vectors. Both are stateless;
//! their state is an [`EmptyState`] that only records the batch extent.
//!
//! ```ignore
//! use rlc_learn::neural::{Encoder, ImpalaEncoderConfig};
//! let encoder = ImpalaEncoderConfig::new([64, 64, 3]).init::<NdArray>(&device)?;
//! let codes = encoder.stateless_forward(obs); // [B, T, 256]
//! ```

pub mod checkpoint;
pub mod model;

pub use checkpoint::{load_encoder, save_encoder, EncoderSpec};
pub use model::dense::{FullyConnectedEncoder, FullyConnectedEncoderConfig, NormKind};
pub use model::encoder::{EmptyState, Encoder};
pub use model::impala::{ImpalaEncoder, ImpalaEncoderConfig};
