//! Program loading.
//!
//! A program is loaded either from its schema source or from a compiled
//! artifact: the magic bytes `RLCPROG1` followed by an rkyv archive of the
//! [`Program`].

use std::path::Path;

use rkyv::rancor;
use rkyv::util::AlignedVec;

use super::codec::{decode_actions, ActionRecord};
use super::schema::{parse_schema, Program};
use crate::error::{FormatError, ProgramError};

/// Prefix identifying a compiled program artifact.
pub const ARTIFACT_MAGIC: &[u8; 8] = b"RLCPROG1";

/// Extension given to compiled artifacts.
pub const ARTIFACT_EXTENSION: &str = "rlcp";

/// Anything that can turn a binary action log into action records.
pub trait ActionProgram {
    fn name(&self) -> &str;

    /// Decode `buf` completely, or fail without partial output.
    fn parse_actions_from_binary_buffer(&self, buf: &[u8])
        -> Result<Vec<ActionRecord>, FormatError>;
}

impl ActionProgram for Program {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse_actions_from_binary_buffer(
        &self,
        buf: &[u8],
    ) -> Result<Vec<ActionRecord>, FormatError> {
        decode_actions(self, buf)
    }
}

/// Serialize a program into a compiled artifact.
pub fn compile_program(program: &Program) -> Result<Vec<u8>, ProgramError> {
    let archive =
        rkyv::to_bytes::<rancor::Error>(program).map_err(|e| ProgramError::Compile {
            program: program.name.clone(),
            message: e.to_string(),
        })?;
    let mut out = Vec::with_capacity(ARTIFACT_MAGIC.len() + archive.len());
    out.extend_from_slice(ARTIFACT_MAGIC);
    out.extend_from_slice(&archive);
    Ok(out)
}

/// Decode a program from raw file contents. `path` is for error messages.
pub fn program_from_bytes(bytes: &[u8], path: &Path) -> Result<Program, ProgramError> {
    if let Some(archive) = bytes.strip_prefix(ARTIFACT_MAGIC.as_slice()) {
        // rkyv validates alignment; copy out of the file buffer.
        let mut aligned = AlignedVec::<16>::with_capacity(archive.len());
        aligned.extend_from_slice(archive);
        return rkyv::from_bytes::<Program, rancor::Error>(&aligned).map_err(|e| {
            ProgramError::Artifact {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        });
    }

    let source = std::str::from_utf8(bytes).map_err(|_| ProgramError::Invalid {
        path: path.to_path_buf(),
        message: "neither a compiled program nor UTF-8 schema source".into(),
    })?;
    parse_schema(source, path)
}

/// Load a program from a schema file or a compiled artifact.
pub fn load_program(path: &Path) -> Result<Program, ProgramError> {
    let bytes = std::fs::read(path).map_err(|source| ProgramError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let program = program_from_bytes(&bytes, path)?;
    tracing::info!(
        program = %program.name,
        actions = program.actions.len(),
        path = %path.display(),
        "loaded program"
    );
    Ok(program)
}
