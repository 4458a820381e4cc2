//! Binary action-log codec.
//!
//! A log is a flat concatenation of records. Each record is the action's
//! tag as a little-endian i64 followed by its arguments in declaration
//! order: `int` and `float` as 8 little-endian bytes, `byte` and `bool` as
//! one byte, arrays as their elements back to back.

use std::fmt;

use super::schema::{ActionDecl, ArgType, Program, Scalar};
use crate::error::{EncodeError, FormatError};

/// A decoded argument value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Byte(i8),
    Bool(bool),
    Float(f64),
    Array(Vec<Value>),
}

impl Value {
    fn matches(&self, ty: &ArgType) -> bool {
        match (self, ty.len) {
            (Value::Array(items), Some(n)) => {
                items.len() == n as usize
                    && items.iter().all(|v| v.matches(&ArgType::scalar(ty.scalar)))
            }
            (Value::Int(_), None) => ty.scalar == Scalar::Int,
            (Value::Byte(_), None) => ty.scalar == Scalar::Byte,
            (Value::Bool(_), None) => ty.scalar == Scalar::Bool,
            (Value::Float(_), None) => ty.scalar == Scalar::Float,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// One decoded action: `name {arg: value, ...}`.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionRecord {
    pub name: String,
    pub args: Vec<(String, Value)>,
}

impl ActionRecord {
    pub fn new(name: impl Into<String>, args: Vec<(&str, Value)>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().map(|(n, v)| (n.to_string(), v)).collect(),
        }
    }
}

impl fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.name)?;
        for (i, (name, value)) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        f.write_str("}")
    }
}

// ─── Decoding ─────────────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let available = self.buf.len() - self.pos;
        if available < n {
            return Err(FormatError::Truncated {
                offset: self.pos,
                needed: n,
                available,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn scalar(&mut self, scalar: Scalar) -> Result<Value, FormatError> {
        let offset = self.pos;
        Ok(match scalar {
            Scalar::Int => Value::Int(i64::from_le_bytes(self.take_array()?)),
            Scalar::Float => Value::Float(f64::from_le_bytes(self.take_array()?)),
            Scalar::Byte => Value::Byte(i8::from_le_bytes(self.take_array()?)),
            Scalar::Bool => match self.take_array::<1>()?[0] {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                byte => return Err(FormatError::InvalidBool { offset, byte }),
            },
        })
    }

    fn value(&mut self, ty: &ArgType) -> Result<Value, FormatError> {
        match ty.len {
            None => self.scalar(ty.scalar),
            Some(n) => (0..n)
                .map(|_| self.scalar(ty.scalar))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
        }
    }

    fn record(&mut self, program: &Program) -> Result<ActionRecord, FormatError> {
        let offset = self.pos;
        let tag = i64::from_le_bytes(self.take_array()?);
        let decl = program.action(tag).ok_or(FormatError::UnknownTag {
            offset,
            tag,
            declared: program.actions.len(),
        })?;

        // Check the whole record fits before decoding any argument.
        let width = decl.args_width();
        let available = self.buf.len() - self.pos;
        if available < width {
            return Err(FormatError::Truncated {
                offset: self.pos,
                needed: width,
                available,
            });
        }

        let mut args = Vec::with_capacity(decl.args.len());
        for arg in &decl.args {
            args.push((arg.name.clone(), self.value(&arg.ty)?));
        }
        Ok(ActionRecord {
            name: decl.name.clone(),
            args,
        })
    }
}

/// Decode every record in `buf`. An empty buffer holds zero records.
pub fn decode_actions(program: &Program, buf: &[u8]) -> Result<Vec<ActionRecord>, FormatError> {
    let mut reader = Reader { buf, pos: 0 };
    let mut actions = Vec::new();
    while reader.pos < buf.len() {
        actions.push(reader.record(program)?);
    }
    tracing::debug!(
        program = %program.name,
        bytes = buf.len(),
        actions = actions.len(),
        "decoded action log"
    );
    Ok(actions)
}

// ─── Encoding ─────────────────────────────────────────────────────

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Byte(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Bool(v) => out.push(u8::from(*v)),
        Value::Array(items) => items.iter().for_each(|item| write_value(out, item)),
    }
}

fn check_record<'p>(
    program: &'p Program,
    record: &ActionRecord,
) -> Result<(usize, &'p ActionDecl), EncodeError> {
    let tag = program
        .tag_of(&record.name)
        .ok_or_else(|| EncodeError::UnknownAction(record.name.clone()))?;
    let decl = &program.actions[tag];
    if decl.args.len() != record.args.len() {
        return Err(EncodeError::ArgumentCount {
            action: decl.name.clone(),
            expected: decl.args.len(),
            actual: record.args.len(),
        });
    }
    for (arg, (name, value)) in decl.args.iter().zip(&record.args) {
        if arg.name != *name || !value.matches(&arg.ty) {
            return Err(EncodeError::ArgumentMismatch {
                action: decl.name.clone(),
                expected: format!("{}: {}", arg.name, arg.ty),
                actual: format!("{}: {}", name, value),
            });
        }
    }
    Ok((tag, decl))
}

/// Encode records into a log `decode_actions` reads back.
pub fn encode_actions(
    program: &Program,
    records: &[ActionRecord],
) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    for record in records {
        let (tag, decl) = check_record(program, record)?;
        out.reserve(8 + decl.args_width());
        out.extend_from_slice(&(tag as i64).to_le_bytes());
        for (_, value) in &record.args {
            write_value(&mut out, value);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::schema::parse_schema;
    use std::path::Path;

    fn program() -> Program {
        parse_schema(
            r#"
[program]
name = "game"

[action.mark]
args = ["x: int", "y: int"]

[action.pass]

[action.setup]
args = ["cells: bool[3]", "bias: byte", "temp: float"]
"#,
            Path::new("game.rlcs"),
        )
        .unwrap()
    }

    fn mark(x: i64, y: i64) -> ActionRecord {
        ActionRecord::new("mark", vec![("x", Value::Int(x)), ("y", Value::Int(y))])
    }

    #[test]
    fn empty_buffer_has_no_actions() {
        assert_eq!(decode_actions(&program(), &[]).unwrap(), vec![]);
    }

    #[test]
    fn decodes_in_order() {
        let program = program();
        let records = vec![
            mark(1, 2),
            ActionRecord::new("pass", vec![]),
            ActionRecord::new(
                "setup",
                vec![
                    (
                        "cells",
                        Value::Array(vec![Value::Bool(true), Value::Bool(false), Value::Bool(true)]),
                    ),
                    ("bias", Value::Byte(-3)),
                    ("temp", Value::Float(0.5)),
                ],
            ),
            mark(-7, 0),
        ];
        let buf = encode_actions(&program, &records).unwrap();
        assert_eq!(buf.len(), (8 + 16) + 8 + (8 + 3 + 1 + 8) + (8 + 16));
        assert_eq!(decode_actions(&program, &buf).unwrap(), records);
    }

    #[test]
    fn display_format() {
        let setup = ActionRecord::new(
            "setup",
            vec![
                ("cells", Value::Array(vec![Value::Bool(true), Value::Bool(false)])),
                ("bias", Value::Byte(4)),
                ("temp", Value::Float(1.0)),
            ],
        );
        insta::assert_snapshot!(mark(3, -1).to_string(), @"mark {x: 3, y: -1}");
        insta::assert_snapshot!(ActionRecord::new("pass", vec![]).to_string(), @"pass {}");
        insta::assert_snapshot!(setup.to_string(), @"setup {cells: [true, false], bias: 4, temp: 1.0}");
    }

    #[test]
    fn truncated_tag_is_reported() {
        let program = program();
        let mut buf = encode_actions(&program, &[mark(1, 1)]).unwrap();
        buf.extend_from_slice(&[0, 0, 0]);
        assert_eq!(
            decode_actions(&program, &buf),
            Err(FormatError::Truncated {
                offset: 24,
                needed: 8,
                available: 3
            })
        );
    }

    #[test]
    fn truncated_arguments_are_reported() {
        let program = program();
        let buf = encode_actions(&program, &[mark(1, 1)]).unwrap();
        let cut = &buf[..buf.len() - 1];
        assert_eq!(
            decode_actions(&program, cut),
            Err(FormatError::Truncated {
                offset: 8,
                needed: 16,
                available: 15
            })
        );
    }

    #[test]
    fn unknown_tag_is_reported() {
        let program = program();
        let buf = 9i64.to_le_bytes();
        assert_eq!(
            decode_actions(&program, &buf),
            Err(FormatError::UnknownTag {
                offset: 0,
                tag: 9,
                declared: 3
            })
        );
    }

    #[test]
    fn invalid_bool_is_reported() {
        let program = program();
        let mut buf = 2i64.to_le_bytes().to_vec();
        buf.extend_from_slice(&[1, 2, 0, 0]);
        buf.extend_from_slice(&0f64.to_le_bytes());
        assert_eq!(
            decode_actions(&program, &buf),
            Err(FormatError::InvalidBool { offset: 9, byte: 2 })
        );
    }

    #[test]
    fn encode_rejects_mismatched_records() {
        let program = program();
        assert_eq!(
            encode_actions(&program, &[ActionRecord::new("fly", vec![])]),
            Err(EncodeError::UnknownAction("fly".into()))
        );
        assert_eq!(
            encode_actions(&program, &[ActionRecord::new("mark", vec![("x", Value::Int(1))])]),
            Err(EncodeError::ArgumentCount {
                action: "mark".into(),
                expected: 2,
                actual: 1
            })
        );
        let wrong_type = ActionRecord::new("mark", vec![("x", Value::Bool(true)), ("y", Value::Int(1))]);
        let err = encode_actions(&program, &[wrong_type]).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"action 'mark' expects 'x: int', got 'x: true'");
    }

    #[test]
    fn decoding_is_deterministic() {
        let program = program();
        let buf = encode_actions(&program, &[mark(5, 6), mark(7, 8)]).unwrap();
        let first: Vec<String> = decode_actions(&program, &buf)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        let second: Vec<String> = decode_actions(&program, &buf)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(first, second);
    }
}
