//! Signature mini-language - fixed per-position type contracts
//!
//! A signature is an ordered list of single-token parameter kinds. Native
//! entry points declare exactly one signature for their arguments and one
//! for their result. Recognized tokens:
//!
//! - `i8 i16 i32 i64 u8 u16 u32 u64` - integer, width and signedness
//! - `f32 f64` - floating point, width
//! - `bool` - strict boolean
//! - `bytes` - opaque byte string with explicit length
//! - `text` - opaque text with explicit length
//! - `handle:<tag>` - opaque handle with the given tag
//! - `array:<format>:<ndim>[:c]` - array view; trailing `:c` requires a
//!   dense row-major contiguous layout
//!
//! A malformed signature is an internal programming error in the module
//! declaring it, reported as [`SignatureError`] at declaration time - never
//! as a recoverable caller failure.

use crate::view::Format;
use std::fmt;

/// Integer width in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub const fn bits(self) -> u32 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }
}

/// Floating-point width in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatWidth {
    W32,
    W64,
}

impl FloatWidth {
    pub const fn bits(self) -> u32 {
        match self {
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }
}

/// One parameter kind in a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    Int { width: IntWidth, signed: bool },
    Float { width: FloatWidth },
    Bool,
    Bytes,
    Text,
    Handle { tag: String },
    ArrayView {
        format: Format,
        ndim: usize,
        contiguous: bool,
    },
}

impl ParamKind {
    /// Human-readable description for diagnostics
    pub fn describe(&self) -> String {
        match self {
            Self::Int { width, signed: true } => format!("{}-bit signed integer", width.bits()),
            Self::Int {
                width,
                signed: false,
            } => format!("{}-bit unsigned integer", width.bits()),
            Self::Float { width } => format!("{}-bit float", width.bits()),
            Self::Bool => "boolean".to_string(),
            Self::Bytes => "bytes".to_string(),
            Self::Text => "text".to_string(),
            Self::Handle { tag } => format!("opaque handle '{}'", tag),
            Self::ArrayView {
                format,
                ndim,
                contiguous,
            } => format!(
                "array view (format '{}', {}-D{})",
                format.code(),
                ndim,
                if *contiguous { ", contiguous" } else { "" }
            ),
        }
    }
}

/// Fixed ordered list of parameter kinds
///
/// Immutable once constructed; bindings hold one for their arguments and
/// one for their result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Vec<ParamKind>,
}

impl Signature {
    /// Build from explicit kinds
    pub fn new(params: Vec<ParamKind>) -> Self {
        Self { params }
    }

    /// Empty signature (no arguments, or a void result)
    pub fn empty() -> Self {
        Self { params: Vec::new() }
    }

    /// Parse whitespace-separated kind tokens
    pub fn parse(text: &str) -> Result<Self, SignatureError> {
        let mut params = Vec::new();
        for (position, token) in text.split_whitespace().enumerate() {
            params.push(parse_token(position, token)?);
        }
        Ok(Self { params })
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// All parameter kinds in order
    pub fn params(&self) -> &[ParamKind] {
        &self.params
    }

    /// Kind at one position
    pub fn get(&self, index: usize) -> Option<&ParamKind> {
        self.params.get(index)
    }
}

fn parse_token(position: usize, token: &str) -> Result<ParamKind, SignatureError> {
    let simple = match token {
        "i8" => Some(ParamKind::Int { width: IntWidth::W8, signed: true }),
        "i16" => Some(ParamKind::Int { width: IntWidth::W16, signed: true }),
        "i32" => Some(ParamKind::Int { width: IntWidth::W32, signed: true }),
        "i64" => Some(ParamKind::Int { width: IntWidth::W64, signed: true }),
        "u8" => Some(ParamKind::Int { width: IntWidth::W8, signed: false }),
        "u16" => Some(ParamKind::Int { width: IntWidth::W16, signed: false }),
        "u32" => Some(ParamKind::Int { width: IntWidth::W32, signed: false }),
        "u64" => Some(ParamKind::Int { width: IntWidth::W64, signed: false }),
        "f32" => Some(ParamKind::Float { width: FloatWidth::W32 }),
        "f64" => Some(ParamKind::Float { width: FloatWidth::W64 }),
        "bool" => Some(ParamKind::Bool),
        "bytes" => Some(ParamKind::Bytes),
        "text" => Some(ParamKind::Text),
        _ => None,
    };
    if let Some(kind) = simple {
        return Ok(kind);
    }

    if let Some(tag) = token.strip_prefix("handle:") {
        if tag.is_empty() {
            return Err(SignatureError::Malformed {
                position,
                token: token.to_string(),
                reason: "handle kind needs a non-empty tag",
            });
        }
        return Ok(ParamKind::Handle {
            tag: tag.to_string(),
        });
    }

    if let Some(rest) = token.strip_prefix("array:") {
        return parse_array_token(position, token, rest);
    }

    Err(SignatureError::UnknownKind {
        position,
        token: token.to_string(),
    })
}

fn parse_array_token(
    position: usize,
    token: &str,
    rest: &str,
) -> Result<ParamKind, SignatureError> {
    let malformed = |reason| SignatureError::Malformed {
        position,
        token: token.to_string(),
        reason,
    };

    let mut parts = rest.split(':');
    let format_part = parts.next().unwrap_or("");
    let ndim_part = parts
        .next()
        .ok_or(malformed("array kind needs a dimension count"))?;
    let contiguous = match parts.next() {
        None => false,
        Some("c") => true,
        Some(_) => return Err(malformed("array flag must be 'c'")),
    };
    if parts.next().is_some() {
        return Err(malformed("too many array components"));
    }

    let mut chars = format_part.chars();
    let format = match (chars.next().and_then(Format::from_code), chars.next()) {
        (Some(f), None) => f,
        _ => return Err(malformed("array format must be a single known code")),
    };

    let ndim: usize = ndim_part
        .parse()
        .map_err(|_| malformed("array dimension count must be an integer"))?;
    if ndim == 0 {
        return Err(malformed("array dimension count must be at least 1"));
    }

    Ok(ParamKind::ArrayView {
        format,
        ndim,
        contiguous,
    })
}

/// Internal signature programming errors
///
/// Distinguished from caller-argument errors: these indicate a bug in the
/// bridge module declaring the signature or producing results against it,
/// and are never surfaced through the recoverable last-error channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    UnknownKind {
        position: usize,
        token: String,
    },
    Malformed {
        position: usize,
        token: String,
        reason: &'static str,
    },
    /// Result value count does not match the result signature
    Arity { expected: usize, got: usize },
    /// A result value does not fit the declared kind at its position
    ResultKind {
        position: usize,
        expected: String,
        got: String,
    },
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKind { position, token } => {
                write!(f, "unknown kind '{}' at position {}", token, position)
            }
            Self::Malformed {
                position,
                token,
                reason,
            } => write!(f, "malformed kind '{}' at position {}: {}", token, position, reason),
            Self::Arity { expected, got } => {
                write!(f, "result signature expects {} value(s), got {}", expected, got)
            }
            Self::ResultKind {
                position,
                expected,
                got,
            } => write!(
                f,
                "result {}: declared {}, produced {}",
                position, expected, got
            ),
        }
    }
}

impl std::error::Error for SignatureError {}
