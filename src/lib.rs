pub mod action;
pub mod error;
pub mod neural;

pub use error::{EncodeError, EncoderError, Error, FormatError, ProgramError, Result};
