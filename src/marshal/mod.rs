//! Type marshaling - managed <-> native value conversion
//!
//! Design: every native entry point first runs `parse` to obtain validated
//! native values against its fixed argument signature, and runs `build` to
//! turn its native results back into a managed value. Contracts are
//! per-position and strict: integer narrowing is checked rather than
//! truncating, booleans accept only the two canonical values, and no
//! implicit cross-kind coercion happens.
//!
//! Caller-argument errors are recoverable (`BridgeError::Argument` with the
//! offending position); malformed signatures and mismatched native results
//! are internal programming errors (`SignatureError`) and never reach the
//! recoverable channel.

mod sig;
mod value;

#[cfg(test)]
mod tests;

pub use sig::{FloatWidth, IntWidth, ParamKind, Signature, SignatureError};
pub use value::{NativeValue, Value};

use crate::capability::CapabilityFn;
use crate::error::BridgeError;
use crate::logging::log_marshal_error;
use crate::view;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static PARSES: AtomicUsize = AtomicUsize::new(0);
static PARSE_ERRORS: AtomicUsize = AtomicUsize::new(0);

/// Marshaling statistics for monitoring
#[derive(Debug, Clone, Copy)]
pub struct MarshalStats {
    pub parses: usize,
    pub parse_errors: usize,
}

/// Get marshaling statistics
pub fn stats() -> MarshalStats {
    MarshalStats {
        parses: PARSES.load(Ordering::Relaxed),
        parse_errors: PARSE_ERRORS.load(Ordering::Relaxed),
    }
}

/// Convert managed call arguments into native-typed values
///
/// Fails with a position-specific diagnostic when the argument count
/// mismatches, a value cannot be narrowed into the requested integer width
/// without overflow, or a value's kind does not match the expected kind.
/// Array-view arguments run the full negotiation; on any failure the views
/// already acquired for earlier positions are dropped, unpinning their
/// sources, so a failed parse leaves no residue.
pub fn parse(args: &[Value], signature: &Signature) -> Result<Vec<NativeValue>, BridgeError> {
    PARSES.fetch_add(1, Ordering::Relaxed);
    parse_inner(args, signature).map_err(|err| {
        PARSE_ERRORS.fetch_add(1, Ordering::Relaxed);
        log_marshal_error(err.argument_index(), &err.to_string());
        err
    })
}

fn parse_inner(args: &[Value], signature: &Signature) -> Result<Vec<NativeValue>, BridgeError> {
    if args.len() != signature.arity() {
        return Err(BridgeError::Argument {
            index: None,
            message: format!(
                "expected {} argument(s), got {}",
                signature.arity(),
                args.len()
            ),
        });
    }

    let mut out = Vec::with_capacity(args.len());
    for (index, (arg, kind)) in args.iter().zip(signature.params()).enumerate() {
        out.push(parse_one(index, arg, kind)?);
    }
    Ok(out)
}

fn parse_one(index: usize, arg: &Value, kind: &ParamKind) -> Result<NativeValue, BridgeError> {
    let mismatch = || {
        BridgeError::argument(
            index,
            format!("expected {}, got {}", kind.describe(), arg.type_name()),
        )
    };

    match kind {
        ParamKind::Int { width, signed } => {
            let Value::Int(v) = arg else {
                return Err(mismatch());
            };
            narrow_int(index, *v, *width, *signed, kind)
        }

        ParamKind::Float { width } => {
            let Value::Float(v) = arg else {
                return Err(mismatch());
            };
            Ok(match width {
                FloatWidth::W32 => NativeValue::F32(*v as f32),
                FloatWidth::W64 => NativeValue::F64(*v),
            })
        }

        ParamKind::Bool => match arg {
            // Only the two canonical representations coerce; no truthiness
            Value::Bool(b) => Ok(NativeValue::Bool(*b)),
            Value::Int(0) => Ok(NativeValue::Bool(false)),
            Value::Int(1) => Ok(NativeValue::Bool(true)),
            Value::Int(v) => Err(BridgeError::argument(
                index,
                format!("boolean must be true, false, 0 or 1, got {}", v),
            )),
            _ => Err(mismatch()),
        },

        ParamKind::Bytes => {
            let Value::Bytes(b) = arg else {
                return Err(mismatch());
            };
            Ok(NativeValue::Bytes(b.clone()))
        }

        ParamKind::Text => {
            let Value::Text(s) = arg else {
                return Err(mismatch());
            };
            Ok(NativeValue::Text(s.clone()))
        }

        ParamKind::Handle { tag } => {
            let Value::Handle(h) = arg else {
                return Err(mismatch());
            };
            // Tag and liveness failures carry their own kinds through
            let ptr = h.resolve(tag)?;
            Ok(NativeValue::Ptr(ptr))
        }

        ParamKind::ArrayView {
            format,
            ndim,
            contiguous,
        } => {
            let Value::Array(source) = arg else {
                return Err(mismatch());
            };
            let view = view::acquire(Arc::clone(source), &[*format], *contiguous, *ndim)?;
            Ok(NativeValue::View(view))
        }
    }
}

fn narrow_int(
    index: usize,
    v: i64,
    width: IntWidth,
    signed: bool,
    kind: &ParamKind,
) -> Result<NativeValue, BridgeError> {
    let overflow = || {
        BridgeError::argument(
            index,
            format!("{} does not fit {}", v, kind.describe()),
        )
    };

    if signed {
        match width {
            IntWidth::W8 => i8::try_from(v).map(NativeValue::I8).map_err(|_| overflow()),
            IntWidth::W16 => i16::try_from(v).map(NativeValue::I16).map_err(|_| overflow()),
            IntWidth::W32 => i32::try_from(v).map(NativeValue::I32).map_err(|_| overflow()),
            IntWidth::W64 => Ok(NativeValue::I64(v)),
        }
    } else {
        match width {
            IntWidth::W8 => u8::try_from(v).map(NativeValue::U8).map_err(|_| overflow()),
            IntWidth::W16 => u16::try_from(v).map(NativeValue::U16).map_err(|_| overflow()),
            IntWidth::W32 => u32::try_from(v).map(NativeValue::U32).map_err(|_| overflow()),
            IntWidth::W64 => u64::try_from(v).map(NativeValue::U64).map_err(|_| overflow()),
        }
    }
}

/// Convert native results back into a managed value
///
/// A one-kind signature builds a single value; longer signatures build an
/// ordered tuple (e.g. a native function returning a value plus an
/// out-parameter); an empty signature builds unit. Mismatches between the
/// produced values and the declared kinds are internal programming errors
/// in the producing module, not caller failures. No side effects beyond
/// allocating the result representation.
pub fn build(signature: &Signature, values: Vec<NativeValue>) -> Result<Value, SignatureError> {
    if values.len() != signature.arity() {
        return Err(SignatureError::Arity {
            expected: signature.arity(),
            got: values.len(),
        });
    }

    let mut out = Vec::with_capacity(values.len());
    for (position, (value, kind)) in values.into_iter().zip(signature.params()).enumerate() {
        out.push(build_one(position, value, kind)?);
    }

    Ok(match out.len() {
        0 => Value::Unit,
        1 => out.pop().expect("one element"),
        _ => Value::Tuple(out),
    })
}

fn build_one(
    position: usize,
    value: NativeValue,
    kind: &ParamKind,
) -> Result<Value, SignatureError> {
    let kind_err = |got: &NativeValue| SignatureError::ResultKind {
        position,
        expected: kind.describe(),
        got: got.kind_name().to_string(),
    };

    match kind {
        ParamKind::Int { .. } => match value.as_i64() {
            Some(v) => Ok(Value::Int(v)),
            // Also rejects u64 results beyond the managed integer range
            None => Err(kind_err(&value)),
        },
        ParamKind::Float { .. } => match value.as_f64() {
            Some(v) => Ok(Value::Float(v)),
            None => Err(kind_err(&value)),
        },
        ParamKind::Bool => match value {
            NativeValue::Bool(b) => Ok(Value::Bool(b)),
            other => Err(kind_err(&other)),
        },
        ParamKind::Bytes => match value {
            NativeValue::Bytes(b) => Ok(Value::Bytes(b)),
            other => Err(kind_err(&other)),
        },
        ParamKind::Text => match value {
            NativeValue::Text(s) => Ok(Value::Text(s)),
            other => Err(kind_err(&other)),
        },
        ParamKind::Handle { tag } => match value {
            NativeValue::Handle(h) if h.tag() == tag => Ok(Value::Handle(h)),
            other => Err(kind_err(&other)),
        },
        // Views flow into native code, never back out as results
        ParamKind::ArrayView { .. } => Err(kind_err(&value)),
    }
}

/// A native entry point with its fixed argument and result contracts
///
/// Created once at module load and immutable thereafter; owned by the
/// bridge module that defines it.
pub struct NativeFunctionBinding {
    name: String,
    entry: CapabilityFn,
    args: Signature,
    result: Signature,
}

impl NativeFunctionBinding {
    pub fn new(
        name: impl Into<String>,
        entry: CapabilityFn,
        args: Signature,
        result: Signature,
    ) -> Self {
        Self {
            name: name.into(),
            entry,
            args,
            result,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> CapabilityFn {
        self.entry
    }

    pub fn args(&self) -> &Signature {
        &self.args
    }

    pub fn result(&self) -> &Signature {
        &self.result
    }

    /// Marshal managed arguments against this binding's argument signature
    pub fn parse_args(&self, args: &[Value]) -> Result<Vec<NativeValue>, BridgeError> {
        parse(args, &self.args)
    }

    /// Build the managed result against this binding's result signature
    pub fn build_result(&self, values: Vec<NativeValue>) -> Result<Value, SignatureError> {
        build(&self.result, values)
    }
}

impl std::fmt::Debug for NativeFunctionBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunctionBinding")
            .field("name", &self.name)
            .field("arity", &self.args.arity())
            .field("results", &self.result.arity())
            .finish()
    }
}
