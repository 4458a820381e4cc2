//! Error types for encoders, checkpoints, and action logs.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building, saving, or loading an encoder.
#[derive(Error, Debug)]
pub enum EncoderError {
    /// The observation scale would divide by zero (or by a non-finite value).
    #[error("invalid observation scale {0}: must be finite and nonzero")]
    InvalidScale(f64),

    /// A declared shape is empty or has a zero extent.
    #[error("invalid shape {shape:?}: {reason}")]
    InvalidShape { shape: Vec<usize>, reason: String },

    /// A stage received a different channel count than it was built for.
    #[error("channel mismatch: stage expects {expected} input channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    /// The stored configuration was written by a newer version of this crate.
    #[error("unsupported config schema version {found} (newest supported is {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    /// Reading or writing a config file failed.
    #[error("config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    /// Reading or writing a weight record failed.
    #[error("record {}: {message}", path.display())]
    Record { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while decoding a binary action buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The buffer ended in the middle of a record.
    #[error("truncated buffer at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A record tag names no declared action.
    #[error("unknown action tag {tag} at offset {offset} (program declares {declared} actions)")]
    UnknownTag {
        offset: usize,
        tag: i64,
        declared: usize,
    },

    /// A bool argument was encoded as something other than 0 or 1.
    #[error("invalid bool byte {byte:#04x} at offset {offset}")]
    InvalidBool { offset: usize, byte: u8 },
}

/// Errors raised while encoding action records against a program.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("program declares no action '{0}'")]
    UnknownAction(String),

    #[error("action '{action}' takes {expected} arguments, got {actual}")]
    ArgumentCount {
        action: String,
        expected: usize,
        actual: usize,
    },

    /// An argument's name or value does not fit its declaration.
    #[error("action '{action}' expects '{expected}', got '{actual}'")]
    ArgumentMismatch {
        action: String,
        expected: String,
        actual: String,
    },
}

/// Errors raised while loading or compiling a program.
#[derive(Error, Debug)]
pub enum ProgramError {
    /// A schema line could not be understood.
    #[error("{}:{line}: {message}", path.display())]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// The schema declares nothing usable.
    #[error("{}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },

    /// A compiled artifact failed validation.
    #[error("{}: corrupt program artifact: {message}", path.display())]
    Artifact { path: PathBuf, message: String },

    /// The program could not be serialized into an artifact.
    #[error("cannot compile program '{program}': {message}")]
    Compile { program: String, message: String },

    #[error("cannot read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error for the command-line tool.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A required command-line input was not supplied.
    #[error("{0}")]
    Usage(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
