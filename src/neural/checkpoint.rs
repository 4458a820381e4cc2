//! Encoder checkpoints.
//!
//! A checkpoint is a directory holding `config.json` (the burn `Config`
//! the encoder was built from, including its schema version) and
//! `model.mpk` (weights in burn's NamedMpk format, full precision).
//! Missing config fields are filled with their defaults when the config is
//! read, so older checkpoints never need per-call compatibility checks. A
//! config without `schema_version` predates versioning and reads as
//! [`LEGACY_SCHEMA_VERSION`].

use std::path::{Path, PathBuf};

use burn::config::Config;
use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::model::dense::{FullyConnectedEncoder, FullyConnectedEncoderConfig, NormKind};
use super::model::impala::{ImpalaEncoder, ImpalaEncoderConfig};
use super::model::{CONFIG_SCHEMA_VERSION, LEGACY_SCHEMA_VERSION};
use crate::error::EncoderError;

const CONFIG_FILE: &str = "config.json";
/// burn appends `.mpk`.
const MODEL_STEM: &str = "model";

/// A config that can rebuild its encoder.
pub trait EncoderSpec: Config + DeserializeOwned {
    type Encoder<B: Backend>: Module<B>;

    fn schema_version(&self) -> u32;

    /// Values for defaulted fields absent from a saved config.
    fn field_defaults() -> Vec<(&'static str, Value)>;

    fn build<B: Backend>(&self, device: &B::Device) -> Result<Self::Encoder<B>, EncoderError>;
}

impl EncoderSpec for ImpalaEncoderConfig {
    type Encoder<B: Backend> = ImpalaEncoder<B>;

    fn schema_version(&self) -> u32 {
        self.schema_version
    }

    fn field_defaults() -> Vec<(&'static str, Value)> {
        vec![
            ("outsize", json!(256)),
            ("chans", json!([16, 32, 32])),
            ("scale_ob", json!(255.0)),
            ("nblock", json!(2)),
            ("final_relu", json!(true)),
            ("batch_norm", json!(false)),
            ("pool", json!(true)),
            ("schema_version", json!(LEGACY_SCHEMA_VERSION)),
        ]
    }

    fn build<B: Backend>(&self, device: &B::Device) -> Result<ImpalaEncoder<B>, EncoderError> {
        self.init(device)
    }
}

impl EncoderSpec for FullyConnectedEncoderConfig {
    type Encoder<B: Backend> = FullyConnectedEncoder<B>;

    fn schema_version(&self) -> u32 {
        self.schema_version
    }

    fn field_defaults() -> Vec<(&'static str, Value)> {
        vec![
            ("outsize", json!(256)),
            ("hidden_sizes", json!([256, 256])),
            ("scale_ob", json!(1.0)),
            ("norm", json!(NormKind::Layer)),
            ("schema_version", json!(LEGACY_SCHEMA_VERSION)),
        ]
    }

    fn build<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<FullyConnectedEncoder<B>, EncoderError> {
        self.init(device)
    }
}

/// Read an encoder config, rejecting versions newer than this crate knows.
pub fn load_config<C: EncoderSpec>(path: &Path) -> Result<C, EncoderError> {
    let config_error = |message: String| EncoderError::Config {
        path: path.to_path_buf(),
        message,
    };
    let text = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
    let mut value: Value = serde_json::from_str(&text).map_err(|e| config_error(e.to_string()))?;
    let fields = value
        .as_object_mut()
        .ok_or_else(|| config_error("expected a JSON object".into()))?;
    for (key, default) in C::field_defaults() {
        if !fields.contains_key(key) {
            tracing::debug!(field = key, "config field missing, using default");
            fields.insert(key.to_string(), default);
        }
    }
    let config: C = serde_json::from_value(value).map_err(|e| config_error(e.to_string()))?;
    if config.schema_version() > CONFIG_SCHEMA_VERSION {
        return Err(EncoderError::UnsupportedSchema {
            found: config.schema_version(),
            supported: CONFIG_SCHEMA_VERSION,
        });
    }
    Ok(config)
}

/// Save an encoder and its config into `dir`, creating it if needed.
///
/// Returns the path of the weight file.
pub fn save_encoder<B: Backend, C: EncoderSpec>(
    dir: &Path,
    config: &C,
    encoder: &C::Encoder<B>,
) -> Result<PathBuf, EncoderError> {
    std::fs::create_dir_all(dir)?;

    let config_path = dir.join(CONFIG_FILE);
    config.save(&config_path).map_err(|e| EncoderError::Config {
        path: config_path.clone(),
        message: e.to_string(),
    })?;

    let path = dir.join(MODEL_STEM);
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    encoder
        .clone()
        .save_file(path.clone(), &recorder)
        .map_err(|e| EncoderError::Record {
            path: path.clone(),
            message: e.to_string(),
        })?;

    let full_path = path.with_extension("mpk");
    tracing::info!(path = %full_path.display(), "saved encoder checkpoint");
    Ok(full_path)
}

/// Load an encoder checkpoint from `dir`.
pub fn load_encoder<B: Backend, C: EncoderSpec>(
    dir: &Path,
    device: &B::Device,
) -> Result<(C, C::Encoder<B>), EncoderError> {
    let config: C = load_config(&dir.join(CONFIG_FILE))?;
    let encoder = config.build::<B>(device)?;

    let path = dir.join(MODEL_STEM);
    let full_path = path.with_extension("mpk");
    if !full_path.exists() {
        return Err(EncoderError::Record {
            path: full_path,
            message: "weight file not found".into(),
        });
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let encoder = encoder
        .load_file(path, &recorder, device)
        .map_err(|e| EncoderError::Record {
            path: full_path.clone(),
            message: e.to_string(),
        })?;

    tracing::debug!(path = %full_path.display(), "loaded encoder checkpoint");
    Ok((config, encoder))
}

/// Whether `dir` looks like a checkpoint directory.
pub fn is_checkpoint(dir: &Path) -> bool {
    dir.join(CONFIG_FILE).is_file() && dir.join(MODEL_STEM).with_extension("mpk").is_file()
}
