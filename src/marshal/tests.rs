//! Tests for type marshaling

use super::*;
use crate::handle::HandleRegistry;
use crate::lock;
use crate::view::{Format, OwnedSource};
use proptest::prelude::*;
use std::ffi::c_void;

fn with_lock<R>(f: impl FnOnce() -> R) -> R {
    let lock = lock::global();
    lock.register_thread();
    let token = lock.acquire_for_native_call();
    let result = f();
    token.release();
    result
}

#[test]
fn test_signature_parsing() {
    let sig = Signature::parse("i32 f64 bool bytes text handle:window array:d:1:c").unwrap();
    assert_eq!(sig.arity(), 7);
    assert_eq!(
        sig.get(0),
        Some(&ParamKind::Int {
            width: IntWidth::W32,
            signed: true
        })
    );
    assert_eq!(
        sig.get(5),
        Some(&ParamKind::Handle {
            tag: "window".to_string()
        })
    );
    assert_eq!(
        sig.get(6),
        Some(&ParamKind::ArrayView {
            format: Format::F64,
            ndim: 1,
            contiguous: true
        })
    );

    assert!(matches!(
        Signature::parse("i32 wat").unwrap_err(),
        SignatureError::UnknownKind { position: 1, .. }
    ));
    assert!(matches!(
        Signature::parse("handle:").unwrap_err(),
        SignatureError::Malformed { .. }
    ));
    assert!(matches!(
        Signature::parse("array:d").unwrap_err(),
        SignatureError::Malformed { .. }
    ));
    assert!(matches!(
        Signature::parse("array:z:1").unwrap_err(),
        SignatureError::Malformed { .. }
    ));
    assert!(matches!(
        Signature::parse("array:d:0").unwrap_err(),
        SignatureError::Malformed { .. }
    ));
}

#[test]
fn test_arg_count_mismatch() {
    let sig = Signature::parse("i32 i32").unwrap();
    let err = parse(&[Value::Int(1)], &sig).unwrap_err();
    assert_eq!(err.argument_index(), None);
    assert!(err.to_string().contains("expected 2 argument(s), got 1"));
}

#[test]
fn test_checked_narrowing() {
    let sig = Signature::parse("i8").unwrap();
    assert!(parse(&[Value::Int(127)], &sig).is_ok());

    let err = parse(&[Value::Int(128)], &sig).unwrap_err();
    assert_eq!(err.argument_index(), Some(0));
    assert!(err.to_string().contains("8-bit signed integer"));

    // Unsigned kinds reject negatives
    let sig = Signature::parse("u16").unwrap();
    let err = parse(&[Value::Int(-1)], &sig).unwrap_err();
    assert!(err.to_string().contains("does not fit"));
    assert!(parse(&[Value::Int(65535)], &sig).is_ok());
}

#[test]
fn test_kind_mismatch_names_position() {
    let sig = Signature::parse("i32 f64").unwrap();
    let err = parse(&[Value::Int(1), Value::Text("x".into())], &sig).unwrap_err();
    assert_eq!(err.argument_index(), Some(1));
    assert!(err.to_string().contains("expected 64-bit float, got text"));
}

#[test]
fn test_strict_boolean() {
    let sig = Signature::parse("bool").unwrap();
    assert!(matches!(
        parse(&[Value::Bool(true)], &sig).unwrap()[0],
        NativeValue::Bool(true)
    ));
    assert!(matches!(
        parse(&[Value::Int(0)], &sig).unwrap()[0],
        NativeValue::Bool(false)
    ));
    assert!(matches!(
        parse(&[Value::Int(1)], &sig).unwrap()[0],
        NativeValue::Bool(true)
    ));

    // No implicit truthiness
    assert!(parse(&[Value::Int(2)], &sig).is_err());
    assert!(parse(&[Value::Float(1.0)], &sig).is_err());
    assert!(parse(&[Value::Text("true".into())], &sig).is_err());
}

#[test]
fn test_bytes_and_text() {
    let sig = Signature::parse("bytes text").unwrap();
    let out = parse(
        &[Value::Bytes(vec![0, 159]), Value::Text("hi".into())],
        &sig,
    )
    .unwrap();
    assert!(matches!(&out[0], NativeValue::Bytes(b) if b == &vec![0u8, 159]));
    assert!(matches!(&out[1], NativeValue::Text(s) if s == "hi"));

    // bytes and text do not cross-coerce
    assert!(parse(&[Value::Text("x".into()), Value::Text("y".into())], &sig).is_err());
}

#[test]
fn test_handle_argument() {
    with_lock(|| {
        let registry = HandleRegistry::new();
        let ptr = 0xABC0 as *mut c_void;
        let handle = registry.create("window", ptr, None);

        let sig = Signature::parse("handle:window").unwrap();
        let out = parse(&[Value::Handle(handle.clone())], &sig).unwrap();
        assert!(matches!(out[0], NativeValue::Ptr(p) if p == ptr));

        // Wrong expected tag surfaces as TypeMismatch, not Argument
        let sig = Signature::parse("handle:socket").unwrap();
        let err = parse(&[Value::Handle(handle.clone())], &sig).unwrap_err();
        assert!(matches!(err, BridgeError::TypeMismatch { .. }));

        registry.release(&handle);
        let sig = Signature::parse("handle:window").unwrap();
        let err = parse(&[Value::Handle(handle)], &sig).unwrap_err();
        assert!(matches!(err, BridgeError::UseAfterRelease { .. }));
    });
}

#[test]
fn test_array_view_argument() {
    with_lock(|| {
        let source = std::sync::Arc::new(OwnedSource::new(vec![1.0f64, 2.0, 3.0]));
        let sig = Signature::parse("array:d:1:c").unwrap();

        let out = parse(&[Value::Array(source.clone())], &sig).unwrap();
        let view = out[0].as_view().unwrap();
        assert_eq!(view.as_slice::<f64>().unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(source.pin_count(), 1);

        drop(out);
        assert_eq!(source.pin_count(), 0);
    });
}

#[test]
fn test_failed_parse_unpins_earlier_views() {
    with_lock(|| {
        let source = std::sync::Arc::new(OwnedSource::new(vec![1.0f64, 2.0]));
        let sig = Signature::parse("array:d:1:c i8").unwrap();

        // Second argument overflows; the view acquired for the first must go
        let err = parse(
            &[Value::Array(source.clone()), Value::Int(4000)],
            &sig,
        )
        .unwrap_err();
        assert_eq!(err.argument_index(), Some(1));
        assert_eq!(source.pin_count(), 0);
    });
}

#[test]
fn test_build_single_and_tuple() {
    let sig = Signature::parse("i32").unwrap();
    let result = build(&sig, vec![NativeValue::I32(7)]).unwrap();
    assert!(matches!(result, Value::Int(7)));

    // Value plus out-parameter becomes an ordered tuple
    let sig = Signature::parse("i64 f64").unwrap();
    let result = build(&sig, vec![NativeValue::I64(1), NativeValue::F64(2.5)]).unwrap();
    match result {
        Value::Tuple(vs) => {
            assert!(matches!(vs[0], Value::Int(1)));
            assert!(matches!(vs[1], Value::Float(f) if f == 2.5));
        }
        other => panic!("expected tuple, got {:?}", other),
    }

    let result = build(&Signature::empty(), vec![]).unwrap();
    assert!(matches!(result, Value::Unit));
}

#[test]
fn test_build_mismatch_is_internal_error() {
    let sig = Signature::parse("i32").unwrap();

    let err = build(&sig, vec![]).unwrap_err();
    assert!(matches!(err, SignatureError::Arity { expected: 1, got: 0 }));

    let err = build(&sig, vec![NativeValue::Text("x".into())]).unwrap_err();
    assert!(matches!(err, SignatureError::ResultKind { position: 0, .. }));

    // u64 result beyond the managed integer range is a producer bug
    let sig = Signature::parse("u64").unwrap();
    let err = build(&sig, vec![NativeValue::U64(u64::MAX)]).unwrap_err();
    assert!(matches!(err, SignatureError::ResultKind { .. }));
}

#[test]
fn test_binding_contracts() {
    extern "C" fn dummy() {}
    let binding = NativeFunctionBinding::new(
        "avg",
        crate::capability::CapabilityFn::new(dummy as *const ()),
        Signature::parse("array:d:1:c").unwrap(),
        Signature::parse("f64").unwrap(),
    );

    assert_eq!(binding.name(), "avg");
    assert_eq!(binding.args().arity(), 1);

    let result = binding.build_result(vec![NativeValue::F64(1.5)]).unwrap();
    assert!(matches!(result, Value::Float(f) if f == 1.5));
}

proptest! {
    /// Round-trip: for in-range integer pairs, building a managed result and
    /// parsing it back yields the same native values.
    #[test]
    fn roundtrip_int_pair(x in any::<i32>(), y in any::<i16>()) {
        let sig = Signature::parse("i32 i16").unwrap();
        let built = build(&sig, vec![NativeValue::I32(x), NativeValue::I16(y)]).unwrap();

        let Value::Tuple(args) = built else { panic!("expected tuple") };
        let reparsed = parse(&args, &sig).unwrap();
        prop_assert!(matches!(reparsed[0], NativeValue::I32(v) if v == x));
        prop_assert!(matches!(reparsed[1], NativeValue::I16(v) if v == y));
    }

    /// Narrowing never truncates: out-of-range inputs always error
    #[test]
    fn narrowing_is_checked(v in any::<i64>()) {
        let sig = Signature::parse("i8").unwrap();
        let result = parse(&[Value::Int(v)], &sig);
        if (i64::from(i8::MIN)..=i64::from(i8::MAX)).contains(&v) {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }
}
