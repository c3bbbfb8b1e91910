//! Tests for JSON over stack values: script-world encoding conventions,
//! in-place slot replacement and decode round trips.

use cairn::{Context, EngineError, ErrorKind, HostRet, RawPtr, ScriptError, ValueType};

fn encode_one<F>(push: F) -> String
where
    F: FnOnce(&mut Context) -> Result<(), EngineError>,
{
    let mut ctx = Context::new();
    push(&mut ctx).unwrap();
    ctx.json_encode(-1).unwrap()
}

// ============================================================================
// Encoding
// ============================================================================

/// Primitives encode the way scripts expect.
#[test]
fn primitives_encode_directly() {
    assert_eq!(encode_one(|ctx| ctx.push_null()), "null");
    assert_eq!(encode_one(|ctx| ctx.push_bool(true)), "true");
    assert_eq!(encode_one(|ctx| ctx.push_int(42)), "42");
    assert_eq!(encode_one(|ctx| ctx.push_number(1.5)), "1.5");
    assert_eq!(encode_one(|ctx| ctx.push_str("hi")), "\"hi\"");
}

/// Whole numbers print without a fractional tail.
#[test]
fn integral_numbers_drop_the_fraction() {
    assert_eq!(encode_one(|ctx| ctx.push_number(3.0)), "3");
    assert_eq!(encode_one(|ctx| ctx.push_number(-0.0)), "0");
    assert_eq!(encode_one(|ctx| ctx.push_number(1e10)), "10000000000");
}

/// Non-finite numbers have no JSON form and become null.
#[test]
fn non_finite_numbers_encode_as_null() {
    assert_eq!(encode_one(|ctx| ctx.push_number(f64::NAN)), "null");
    assert_eq!(encode_one(|ctx| ctx.push_number(f64::INFINITY)), "null");
}

/// Nested structure encodes with insertion order preserved.
#[test]
fn nested_structures_keep_their_order() {
    let mut ctx = Context::new();
    ctx.push_object().unwrap();

    ctx.push_array().unwrap();
    ctx.push_int(1).unwrap();
    ctx.array_append(-2).unwrap();
    ctx.push_str("two").unwrap();
    ctx.array_append(-2).unwrap();
    ctx.put_prop_str(-2, "list").unwrap();

    ctx.push_bool(true).unwrap();
    ctx.put_prop_str(-2, "flag").unwrap();

    assert_eq!(ctx.json_encode(-1).unwrap(), r#"{"list":[1,"two"],"flag":true}"#);
}

/// A valueless property is skipped; a valueless element becomes null.
#[test]
fn undefined_skips_in_objects_but_nulls_in_arrays() {
    fn noop(_ctx: &mut Context) -> Result<HostRet, ScriptError> {
        Ok(HostRet::Undefined)
    }

    let mut ctx = Context::new();
    ctx.push_object().unwrap();
    ctx.push_undefined().unwrap();
    ctx.put_prop_str(-2, "gone").unwrap();
    ctx.push_host_fn(None, noop).unwrap();
    ctx.put_prop_str(-2, "f").unwrap();
    ctx.push_int(1).unwrap();
    ctx.put_prop_str(-2, "kept").unwrap();
    assert_eq!(ctx.json_encode(-1).unwrap(), r#"{"kept":1}"#);

    ctx.push_array().unwrap();
    ctx.push_undefined().unwrap();
    ctx.array_append(-2).unwrap();
    ctx.push_int(2).unwrap();
    ctx.array_append(-2).unwrap();
    assert_eq!(ctx.json_encode(-1).unwrap(), "[null,2]");
}

/// Hidden properties stay invisible to the encoder.
#[test]
fn hidden_props_never_encode() {
    let mut ctx = Context::new();
    ctx.push_object().unwrap();
    ctx.push_str("secret").unwrap();
    ctx.put_hidden_prop_str(-2, "stash").unwrap();
    assert_eq!(ctx.json_encode(-1).unwrap(), "{}");
}

/// Buffers encode as arrays of byte numbers.
#[test]
fn buffers_encode_as_byte_arrays() {
    assert_eq!(encode_one(|ctx| ctx.push_bytes(&[1, 2, 255])), "[1,2,255]");
}

/// A root with no JSON form is an error, not a silent null.
#[test]
fn unrepresentable_roots_throw() {
    fn noop(_ctx: &mut Context) -> Result<HostRet, ScriptError> {
        Ok(HostRet::Undefined)
    }

    let mut ctx = Context::new();
    ctx.push_undefined().unwrap();
    ctx.push_ptr(RawPtr::null()).unwrap();
    ctx.push_host_fn(None, noop).unwrap();

    for idx in [-3, -2, -1] {
        match ctx.json_encode(idx) {
            Err(EngineError::Script(err)) => {
                assert_eq!(err.kind(), ErrorKind::Type);
                assert_eq!(err.message(), "value has no JSON representation");
            }
            other => panic!("expected a thrown error at {idx}, got {other:?}"),
        }
    }
}

/// A value reached twice through different properties is shared structure,
/// not a cycle.
#[test]
fn shared_siblings_encode_twice() {
    let mut ctx = Context::new();
    ctx.push_object().unwrap();
    ctx.push_array().unwrap();
    ctx.push_int(1).unwrap();
    ctx.array_append(-2).unwrap();
    ctx.dup(-1).unwrap();
    ctx.put_prop_str(-3, "a").unwrap();
    ctx.put_prop_str(-2, "b").unwrap();

    assert_eq!(ctx.json_encode(-1).unwrap(), r#"{"a":[1],"b":[1]}"#);
}

/// A container reaching itself is a cycle and throws.
#[test]
fn cycles_throw_instead_of_recursing() {
    let mut ctx = Context::new();
    ctx.push_array().unwrap();
    ctx.dup(-1).unwrap();
    ctx.array_append(-2).unwrap();

    match ctx.json_encode(-1) {
        Err(EngineError::Script(err)) => {
            assert_eq!(err.kind(), ErrorKind::Type);
            assert_eq!(err.message(), "cyclic structure cannot encode to JSON");
        }
        other => panic!("expected a thrown error, got {other:?}"),
    }
}

/// Encoding replaces the slot with the produced text.
#[test]
fn encode_replaces_the_slot() {
    let mut ctx = Context::new();
    ctx.push_array().unwrap();
    let text = ctx.json_encode(-1).unwrap();
    assert_eq!(text, "[]");
    assert_eq!(ctx.type_of(-1), ValueType::String);
    assert_eq!(ctx.get_str(-1).unwrap(), "[]");
    assert_eq!(ctx.stats().live_objects, 0);
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode builds the value in place; re-encoding reproduces the text, key
/// order included.
#[test]
fn decode_round_trips_ordered_keys() {
    let mut ctx = Context::new();
    ctx.push_str(r#"{"z":1,"a":{"inner":[true,null]},"m":2.5}"#).unwrap();
    ctx.json_decode(-1).unwrap();
    assert_eq!(ctx.type_of(-1), ValueType::Object);
    assert_eq!(
        ctx.json_encode(-1).unwrap(),
        r#"{"z":1,"a":{"inner":[true,null]},"m":2.5}"#
    );
}

/// Decoded numbers are plain f64 values.
#[test]
fn decoded_numbers_are_floats() {
    let mut ctx = Context::new();
    ctx.push_str(r#"{"n":1}"#).unwrap();
    ctx.json_decode(-1).unwrap();
    assert!(ctx.get_prop_str(-1, "n").unwrap());
    assert_eq!(ctx.get_number(-1).unwrap(), 1.0);
}

/// Decode coerces its input to text first, so a number decodes as itself.
#[test]
fn decode_coerces_non_string_input() {
    let mut ctx = Context::new();
    ctx.push_int(42).unwrap();
    ctx.json_decode(-1).unwrap();
    assert_eq!(ctx.get_number(-1).unwrap(), 42.0);

    ctx.push_bool(true).unwrap();
    ctx.json_decode(-1).unwrap();
    assert!(ctx.get_bool(-1).unwrap());
}

/// Unparsable text throws a syntax error and leaves the input in place.
#[test]
fn parse_failures_throw_syntax_errors() {
    let mut ctx = Context::new();
    ctx.push_str("{oops").unwrap();
    match ctx.json_decode(-1) {
        Err(EngineError::Script(err)) => {
            assert_eq!(err.kind(), ErrorKind::Syntax);
            assert!(
                err.message().starts_with("JSON parse failed: "),
                "message = {msg:?}",
                msg = err.message()
            );
        }
        other => panic!("expected a thrown error, got {other:?}"),
    }
    assert_eq!(ctx.get_str(-1).unwrap(), "{oops");
}

/// Decoded properties are ordinary enumerable props.
#[test]
fn decoded_props_enumerate() {
    let mut ctx = Context::new();
    ctx.push_str(r#"{"a":1,"b":2}"#).unwrap();
    ctx.json_decode(-1).unwrap();

    let var = ctx.to_var(-1).unwrap();
    let map = var.as_object().unwrap();
    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
    assert_eq!(keys, ["a", "b"]);
}
