//! Action logs: schemas, the binary codec, and disassembly to text.

pub mod codec;
pub mod program;
pub mod schema;

pub use codec::{decode_actions, encode_actions, ActionRecord, Value};
pub use program::{compile_program, load_program, ActionProgram};
pub use schema::Program;

use crate::error::FormatError;

/// Render a binary action log as text, one newline-terminated line per
/// action in decoding order.
///
/// The whole buffer is decoded before any text is produced, so a malformed
/// log yields an error and no lines.
pub fn disassemble<P: ActionProgram + ?Sized>(program: &P, buf: &[u8]) -> Result<String, FormatError> {
    let actions = program.parse_actions_from_binary_buffer(buf)?;
    let mut text = String::new();
    for action in &actions {
        text.push_str(&action.to_string());
        text.push('\n');
    }
    Ok(text)
}
