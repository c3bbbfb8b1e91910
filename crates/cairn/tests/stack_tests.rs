//! Tests for the value stack: indexing, rearrangement, strict getters and
//! the machine snapshot.

use cairn::{Context, EngineError, ValueType};

/// Non-negative indexes count from the frame bottom, negative from the top.
#[test]
fn indexes_count_from_both_ends() {
    let mut ctx = Context::new();
    ctx.push_int(10).unwrap();
    ctx.push_int(20).unwrap();
    ctx.push_int(30).unwrap();

    assert_eq!(ctx.top(), 3);
    assert_eq!(ctx.get_int(0).unwrap(), 10);
    assert_eq!(ctx.get_int(2).unwrap(), 30);
    assert_eq!(ctx.get_int(-1).unwrap(), 30);
    assert_eq!(ctx.get_int(-3).unwrap(), 10);
}

/// `type_of` reports `None` for an index that names nothing, while value
/// reads fail with a typed error.
#[test]
fn invalid_indexes_report_none_not_errors() {
    let mut ctx = Context::new();
    assert_eq!(ctx.type_of(0), ValueType::None);
    assert_eq!(ctx.type_of(-1), ValueType::None);

    ctx.push_int(1).unwrap();
    assert_eq!(ctx.type_of(5), ValueType::None);
    assert!(matches!(ctx.get_int(5), Err(EngineError::InvalidIndex { index: 5 })));
}

/// A pop that would cross the frame floor fails and leaves the stack alone.
#[test]
fn pop_below_the_floor_is_an_underflow() {
    let mut ctx = Context::new();
    assert!(matches!(ctx.pop(), Err(EngineError::StackUnderflow)));

    ctx.push_int(1).unwrap();
    assert!(matches!(ctx.pop_n(2), Err(EngineError::StackUnderflow)));
    assert_eq!(ctx.top(), 1);

    ctx.pop().unwrap();
    assert_eq!(ctx.top(), 0);
}

/// `dup`, `remove` and `insert` rearrange without disturbing neighbours.
#[test]
fn dup_remove_insert_rearrange() {
    let mut ctx = Context::new();
    ctx.push_int(1).unwrap();
    ctx.push_int(2).unwrap();
    ctx.push_int(3).unwrap();

    ctx.dup(-3).unwrap();
    assert_eq!(ctx.get_int(-1).unwrap(), 1);

    ctx.remove(-2).unwrap();
    assert_eq!(ctx.top(), 3);
    assert_eq!(ctx.get_int(-1).unwrap(), 1);
    assert_eq!(ctx.get_int(-2).unwrap(), 2);

    ctx.push_int(9).unwrap();
    ctx.insert(-4).unwrap();
    assert_eq!(ctx.get_int(0).unwrap(), 9);
    assert_eq!(ctx.get_int(-1).unwrap(), 1);
}

/// `insert(-1)` moves the top to the top.
#[test]
fn insert_at_the_top_is_a_no_op() {
    let mut ctx = Context::new();
    ctx.push_int(1).unwrap();
    ctx.push_int(2).unwrap();
    ctx.insert(-1).unwrap();
    assert_eq!(ctx.get_int(-1).unwrap(), 2);
    assert_eq!(ctx.get_int(-2).unwrap(), 1);
}

/// Strict getters never coerce.
#[test]
fn strict_getters_demand_the_exact_type() {
    let mut ctx = Context::new();
    ctx.push_str("5").unwrap();
    assert!(matches!(
        ctx.get_int(-1),
        Err(EngineError::WrongType { expected: "number", found: ValueType::String })
    ));

    ctx.push_bool(true).unwrap();
    assert!(matches!(
        ctx.get_str(-1),
        Err(EngineError::WrongType { expected: "string", .. })
    ));

    ctx.push_number(1.0).unwrap();
    assert!(matches!(
        ctx.get_bool(-1),
        Err(EngineError::WrongType { expected: "boolean", .. })
    ));
}

/// `get_int` truncates toward zero and saturates at the i64 range.
#[test]
fn get_int_truncates_and_saturates() {
    let mut ctx = Context::new();
    ctx.push_number(3.9).unwrap();
    assert_eq!(ctx.get_int(-1).unwrap(), 3);

    ctx.push_number(-3.9).unwrap();
    assert_eq!(ctx.get_int(-1).unwrap(), -3);

    ctx.push_number(f64::NAN).unwrap();
    assert_eq!(ctx.get_int(-1).unwrap(), 0);

    ctx.push_number(1e300).unwrap();
    assert_eq!(ctx.get_int(-1).unwrap(), i64::MAX);

    ctx.push_number(-1e300).unwrap();
    assert_eq!(ctx.get_int(-1).unwrap(), i64::MIN);
}

/// Length is characters for strings, elements for arrays, bytes for buffers
/// and zero for everything else.
#[test]
fn lengths_respect_each_shape() {
    let mut ctx = Context::new();
    ctx.push_str("héllo").unwrap();
    assert_eq!(ctx.get_length(-1).unwrap(), 5);

    ctx.push_bytes(&[1, 2, 3]).unwrap();
    assert_eq!(ctx.get_length(-1).unwrap(), 3);

    ctx.push_array().unwrap();
    ctx.push_int(1).unwrap();
    ctx.array_append(-2).unwrap();
    ctx.push_int(2).unwrap();
    ctx.array_append(-2).unwrap();
    assert_eq!(ctx.get_length(-1).unwrap(), 2);

    ctx.push_number(5.0).unwrap();
    assert_eq!(ctx.get_length(-1).unwrap(), 0);
}

/// Type predicates agree with `type_of`, and arrays, functions and plain
/// objects all report `object`.
#[test]
fn predicates_match_the_coarse_types() {
    let mut ctx = Context::new();
    ctx.push_undefined().unwrap();
    assert!(ctx.is_undefined(-1));
    assert!(ctx.is_null_or_undefined(-1));

    ctx.push_null().unwrap();
    assert!(ctx.is_null(-1));
    assert!(ctx.is_null_or_undefined(-1));

    ctx.push_array().unwrap();
    assert_eq!(ctx.type_of(-1), ValueType::Object);
    assert!(ctx.is_array(-1));
    assert!(ctx.is_object(-1));
    assert!(!ctx.is_function(-1));

    ctx.push_bytes(&[1]).unwrap();
    assert_eq!(ctx.type_of(-1), ValueType::Buffer);
    assert!(ctx.is_buffer(-1));
    assert!(!ctx.is_object(-1));
}

/// The stats snapshot tracks stack depth, live objects and interned strings.
#[test]
fn stats_track_the_machine() {
    let mut ctx = Context::new();
    let fresh = ctx.stats();
    assert_eq!(fresh.stack_depth, 0);
    assert_eq!(fresh.call_depth, 0);
    assert_eq!(fresh.live_objects, 0);

    ctx.push_object().unwrap();
    ctx.push_str("x").unwrap();
    let loaded = ctx.stats();
    assert_eq!(loaded.stack_depth, 2);
    assert_eq!(loaded.live_objects, 1);
    assert!(loaded.interned_strings >= 1);

    ctx.pop_n(2).unwrap();
    let drained = ctx.stats();
    assert_eq!(drained.stack_depth, 0);
    assert_eq!(drained.live_objects, 0);
}

/// `dump` renders one line per snapshot with readable value forms.
#[test]
fn dump_renders_a_snapshot() {
    let mut ctx = Context::new();
    ctx.push_int(1).unwrap();
    ctx.push_str("hi").unwrap();
    ctx.push_null().unwrap();

    let dump = ctx.dump();
    assert!(dump.contains("top=3"), "unexpected dump: {dump}");
    assert!(dump.contains("\"hi\""), "unexpected dump: {dump}");
    assert!(dump.contains("null"), "unexpected dump: {dump}");
}
