pub mod dense;
pub mod encoder;
pub mod impala;
pub mod init;

use crate::error::EncoderError;

/// Current version of the saved encoder config layout.
///
/// Version 1 added `batch_norm` and `pool` to the image encoder and `norm`
/// to the vector encoder; configs that lack them load with the defaults.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Version assumed for configs written before the field existed.
pub const LEGACY_SCHEMA_VERSION: u32 = 0;

/// Observation scale must be usable as a divisor.
pub(crate) fn check_scale(scale: f64) -> Result<(), EncoderError> {
    if scale == 0.0 || !scale.is_finite() {
        return Err(EncoderError::InvalidScale(scale));
    }
    Ok(())
}
