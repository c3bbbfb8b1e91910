//! Tests for heap lifetime behavior as seen through the public API:
//! shared references, host pins, finalizer installation and teardown.

use std::sync::atomic::{AtomicUsize, Ordering};

use cairn::{Context, EngineError, HostRet, ScriptError, ValueType};

// ============================================================================
// Reference sharing
// ============================================================================

/// Duplicates share one heap entry; the entry frees when the last copy
/// goes.
#[test]
fn duplicates_share_one_entry() {
    let mut ctx = Context::new();
    ctx.push_object().unwrap();
    ctx.dup(-1).unwrap();
    ctx.dup(-1).unwrap();
    assert_eq!(ctx.stats().live_objects, 1);

    ctx.pop_n(2).unwrap();
    assert_eq!(ctx.stats().live_objects, 1);

    ctx.pop().unwrap();
    assert_eq!(ctx.stats().live_objects, 0);
    assert_eq!(ctx.stats().free_slots, 1);
}

/// A container keeps its children alive after the stack lets go of them.
#[test]
fn containers_own_their_children() {
    let mut ctx = Context::new();
    ctx.push_object().unwrap();
    ctx.push_array().unwrap();
    ctx.put_prop_str(-2, "child").unwrap();
    assert_eq!(ctx.stats().live_objects, 2);

    assert!(ctx.delete_prop_str(-1, "child").unwrap());
    assert_eq!(ctx.stats().live_objects, 1);
}

/// Overwriting a property releases the value it used to hold.
#[test]
fn overwrites_release_the_old_value() {
    let mut ctx = Context::new();
    ctx.push_object().unwrap();
    ctx.push_array().unwrap();
    ctx.put_prop_str(-2, "x").unwrap();
    ctx.push_bytes(&[1]).unwrap();
    ctx.put_prop_str(-2, "x").unwrap();

    assert_eq!(ctx.stats().live_objects, 2);
    assert_eq!(ctx.stats().free_slots, 1);
}

/// Freed slots come back for the next allocation.
#[test]
fn freed_slots_recycle() {
    let mut ctx = Context::new();
    ctx.push_object().unwrap();
    ctx.pop().unwrap();
    assert_eq!(ctx.stats().free_slots, 1);

    ctx.push_array().unwrap();
    assert_eq!(ctx.stats().live_objects, 1);
    assert_eq!(ctx.stats().free_slots, 0);
}

// ============================================================================
// Host pins
// ============================================================================

/// A pin keeps an object alive off the stack and puts it back on request.
#[test]
fn pins_outlive_the_stack() {
    let mut ctx = Context::new();
    ctx.push_object().unwrap();
    ctx.push_int(7).unwrap();
    ctx.put_prop_str(-2, "tag").unwrap();

    let pin = ctx.heap_ref(-1).unwrap();
    ctx.pop().unwrap();
    assert_eq!(ctx.stats().live_objects, 1);

    ctx.push_heap_ref(&pin).unwrap();
    assert!(ctx.get_prop_str(-1, "tag").unwrap());
    assert_eq!(ctx.get_int(-1).unwrap(), 7);
    ctx.pop_n(2).unwrap();

    ctx.release_ref(pin);
    assert_eq!(ctx.stats().live_objects, 0);
}

/// Only heap values can be pinned.
#[test]
fn pins_demand_a_heap_value() {
    let mut ctx = Context::new();
    ctx.push_int(3).unwrap();
    assert!(matches!(
        ctx.heap_ref(-1),
        Err(EngineError::WrongType {
            expected: "object",
            found: ValueType::Number,
        })
    ));
}

// ============================================================================
// Finalizer installation
// ============================================================================

/// The installed callback reads back through `get_finalizer`.
#[test]
fn finalizers_read_back() {
    fn fin(_ctx: &mut Context) -> Result<HostRet, ScriptError> {
        Ok(HostRet::Undefined)
    }

    let mut ctx = Context::new();
    ctx.push_object().unwrap();
    ctx.get_finalizer(-1).unwrap();
    assert!(ctx.is_undefined(-1));
    ctx.pop().unwrap();

    ctx.push_host_fn(Some("fin"), fin).unwrap();
    ctx.set_finalizer(-2).unwrap();

    ctx.get_finalizer(-1).unwrap();
    assert!(ctx.is_function(-1));
    assert!(ctx.get_prop_str(-1, "name").unwrap());
    assert_eq!(ctx.get_str(-1).unwrap(), "fin");
}

/// Undefined or null clears an installed finalizer.
#[test]
fn null_clears_a_finalizer() {
    fn shout(ctx: &mut Context) -> Result<HostRet, ScriptError> {
        ctx.push_bool(true)?;
        ctx.put_global_str("died")?;
        Ok(HostRet::Undefined)
    }

    let mut ctx = Context::new();
    ctx.push_object().unwrap();
    ctx.push_host_fn(Some("shout"), shout).unwrap();
    ctx.set_finalizer(-2).unwrap();
    ctx.push_null().unwrap();
    ctx.set_finalizer(-2).unwrap();

    ctx.get_finalizer(-1).unwrap();
    assert!(ctx.is_undefined(-1));
    ctx.pop().unwrap();

    ctx.pop().unwrap();
    assert!(!ctx.get_global_str("died").unwrap());
}

/// Anything except a function, undefined or null is rejected as a
/// callback.
#[test]
fn finalizer_callbacks_must_be_functions() {
    let mut ctx = Context::new();
    ctx.push_object().unwrap();
    ctx.push_int(3).unwrap();
    assert!(matches!(
        ctx.set_finalizer(-2),
        Err(EngineError::WrongType {
            expected: "function",
            found: ValueType::Number,
        })
    ));
}

// ============================================================================
// Teardown
// ============================================================================

/// Dropping the context runs the finalizers of everything still live,
/// including values still sitting on the stack.
#[test]
fn teardown_runs_every_finalizer() {
    static RUNS: AtomicUsize = AtomicUsize::new(0);
    fn bump(_ctx: &mut Context) -> Result<HostRet, ScriptError> {
        RUNS.fetch_add(1, Ordering::SeqCst);
        Ok(HostRet::Undefined)
    }

    let mut ctx = Context::new();
    for _ in 0..2 {
        ctx.push_object().unwrap();
        ctx.push_host_fn(Some("bump"), bump).unwrap();
        ctx.set_finalizer(-2).unwrap();
    }
    assert_eq!(RUNS.load(Ordering::SeqCst), 0);

    drop(ctx);
    assert_eq!(RUNS.load(Ordering::SeqCst), 2);
}

/// A slot recycled after its finalizer ran does not inherit the old
/// callback.
#[test]
fn recycled_slots_carry_no_finalizer() {
    static RUNS: AtomicUsize = AtomicUsize::new(0);
    fn bump(_ctx: &mut Context) -> Result<HostRet, ScriptError> {
        RUNS.fetch_add(1, Ordering::SeqCst);
        Ok(HostRet::Undefined)
    }

    let mut ctx = Context::new();
    ctx.push_object().unwrap();
    ctx.push_host_fn(Some("bump"), bump).unwrap();
    ctx.set_finalizer(-2).unwrap();
    ctx.pop().unwrap();
    assert_eq!(RUNS.load(Ordering::SeqCst), 1);

    ctx.push_object().unwrap();
    ctx.pop().unwrap();
    assert_eq!(RUNS.load(Ordering::SeqCst), 1);
}
