//! Action schema: the declarations a program uses to decode action logs.
//!
//! Schemas are written in a small TOML subset:
//!
//! ```toml
//! [program]
//! name = "tictactoe"
//!
//! [action.mark]
//! args = ["x: int", "y: int"]
//!
//! [action.resign]
//! ```
//!
//! Actions are tagged by declaration order.

use std::fmt;
use std::path::Path;

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::ProgramError;

/// Scalar argument types.
#[derive(Archive, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scalar {
    /// 64-bit signed integer.
    Int,
    /// 8-bit signed integer.
    Byte,
    Bool,
    /// 64-bit IEEE-754 float.
    Float,
}

impl Scalar {
    /// Encoded width in bytes.
    pub fn width(self) -> usize {
        match self {
            Scalar::Int | Scalar::Float => 8,
            Scalar::Byte | Scalar::Bool => 1,
        }
    }

    fn parse(s: &str) -> Option<Scalar> {
        match s {
            "int" => Some(Scalar::Int),
            "byte" => Some(Scalar::Byte),
            "bool" => Some(Scalar::Bool),
            "float" => Some(Scalar::Float),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scalar::Int => "int",
            Scalar::Byte => "byte",
            Scalar::Bool => "bool",
            Scalar::Float => "float",
        };
        f.write_str(name)
    }
}

/// An argument type: a scalar, or a fixed-length array of scalars.
#[derive(Archive, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgType {
    pub scalar: Scalar,
    pub len: Option<u32>,
}

impl ArgType {
    pub fn scalar(scalar: Scalar) -> Self {
        Self { scalar, len: None }
    }

    pub fn array(scalar: Scalar, len: u32) -> Self {
        Self {
            scalar,
            len: Some(len),
        }
    }

    /// Encoded width in bytes.
    pub fn width(&self) -> usize {
        self.scalar.width() * self.len.map_or(1, |n| n as usize)
    }

    /// Parse `int`, `bool[9]`, ...
    pub fn parse(s: &str) -> Result<ArgType, String> {
        let s = s.trim();
        let (base, len) = match s.split_once('[') {
            Some((base, rest)) => {
                let digits = rest
                    .strip_suffix(']')
                    .ok_or_else(|| format!("unterminated array type '{}'", s))?;
                let len: u32 = digits
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid array length in '{}'", s))?;
                (base.trim(), Some(len))
            }
            None => (s, None),
        };
        let scalar = Scalar::parse(base).ok_or_else(|| format!("unknown type '{}'", base))?;
        Ok(ArgType { scalar, len })
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.len {
            Some(n) => write!(f, "{}[{}]", self.scalar, n),
            None => write!(f, "{}", self.scalar),
        }
    }
}

/// A named, typed action argument.
#[derive(Archive, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ArgDecl {
    pub name: String,
    pub ty: ArgType,
}

/// A declared action.
#[derive(Archive, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ActionDecl {
    pub name: String,
    pub args: Vec<ArgDecl>,
}

impl ActionDecl {
    /// Encoded width of the arguments (excluding the tag).
    pub fn args_width(&self) -> usize {
        self.args.iter().map(|a| a.ty.width()).sum()
    }
}

/// A program's action schema.
#[derive(Archive, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Program {
    pub name: String,
    pub actions: Vec<ActionDecl>,
}

impl Program {
    /// Look up an action by tag.
    pub fn action(&self, tag: i64) -> Option<&ActionDecl> {
        usize::try_from(tag).ok().and_then(|i| self.actions.get(i))
    }

    /// Look up an action's tag by name.
    pub fn tag_of(&self, name: &str) -> Option<usize> {
        self.actions.iter().position(|a| a.name == name)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a TOML string array: `["a", "b"]` → `vec!["a", "b"]`.
fn parse_string_array(s: &str) -> Result<Vec<String>, String> {
    let inner = s
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| format!("expected a string array, found '{}'", s.trim()))?;
    let mut items = Vec::new();
    for part in inner.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let item = part
            .strip_prefix('"')
            .and_then(|p| p.strip_suffix('"'))
            .ok_or_else(|| format!("expected a quoted string, found '{}'", part))?;
        items.push(item.to_string());
    }
    Ok(items)
}

fn parse_arg(spec: &str) -> Result<ArgDecl, String> {
    let (name, ty) = spec
        .split_once(':')
        .ok_or_else(|| format!("argument '{}' must be written 'name: type'", spec))?;
    let name = name.trim();
    if !is_identifier(name) {
        return Err(format!("invalid argument name '{}'", name));
    }
    Ok(ArgDecl {
        name: name.to_string(),
        ty: ArgType::parse(ty)?,
    })
}

/// Parse an action schema. `path` is used for error messages only.
pub fn parse_schema(source: &str, path: &Path) -> Result<Program, ProgramError> {
    let syntax = |line: usize, message: String| ProgramError::Syntax {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut name = String::new();
    let mut actions: Vec<ActionDecl> = Vec::new();
    let mut section = String::new();
    let mut section_keys: Vec<String> = Vec::new();

    for (idx, line) in source.lines().enumerate() {
        let lineno = idx + 1;
        let trimmed = line.trim();
        if trimmed.starts_with('#') || trimmed.is_empty() {
            continue;
        }

        if let Some(header) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            section = header.trim().to_string();
            section_keys.clear();
            if let Some(action) = section.strip_prefix("action.") {
                if !is_identifier(action) {
                    return Err(syntax(lineno, format!("invalid action name '{}'", action)));
                }
                if actions.iter().any(|a| a.name == action) {
                    return Err(syntax(lineno, format!("duplicate action '{}'", action)));
                }
                actions.push(ActionDecl {
                    name: action.to_string(),
                    args: Vec::new(),
                });
            } else if section != "program" {
                return Err(syntax(lineno, format!("unknown section [{}]", section)));
            }
            continue;
        }

        let (key, value) = trimmed
            .split_once('=')
            .ok_or_else(|| syntax(lineno, format!("expected 'key = value', found '{}'", trimmed)))?;
        let key = key.trim();
        let value = value.trim();
        if section_keys.iter().any(|k| k == key) {
            return Err(syntax(lineno, format!("duplicate key '{}' in [{}]", key, section)));
        }
        section_keys.push(key.to_string());

        match (section.as_str(), key) {
            ("program", "name") => name = value.trim_matches('"').to_string(),
            (s, "args") if s.starts_with("action.") => {
                let specs = parse_string_array(value).map_err(|m| syntax(lineno, m))?;
                let mut args = Vec::with_capacity(specs.len());
                for spec in &specs {
                    let arg = parse_arg(spec).map_err(|m| syntax(lineno, m))?;
                    if args.iter().any(|a: &ArgDecl| a.name == arg.name) {
                        return Err(syntax(lineno, format!("duplicate argument '{}'", arg.name)));
                    }
                    args.push(arg);
                }
                if let Some(action) = actions.last_mut() {
                    action.args = args;
                }
            }
            ("", _) => {
                return Err(syntax(lineno, format!("key '{}' outside of a section", key)));
            }
            (s, _) => {
                return Err(syntax(lineno, format!("unknown key '{}' in [{}]", key, s)));
            }
        }
    }

    if name.is_empty() {
        return Err(ProgramError::Invalid {
            path: path.to_path_buf(),
            message: "missing 'name' in [program]".into(),
        });
    }
    if actions.is_empty() {
        return Err(ProgramError::Invalid {
            path: path.to_path_buf(),
            message: "program declares no actions".into(),
        });
    }

    Ok(Program { name, actions })
}
