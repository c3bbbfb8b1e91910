//! Tests for sessions: closure registration, host data carriers, detached
//! globals and the retirement of registrations.

use std::rc::Rc;

use cairn::{
    Context, EngineError, ErrorKind, HostRet, LimitError, Limits, ScriptError, Session, Var,
};

// ============================================================================
// Globals by value
// ============================================================================

/// `set_global` and `get_global` move whole trees across the boundary.
#[test]
fn globals_round_trip_as_vars() {
    let mut session = Session::new();
    let config = Var::from_json(r#"{"name":"cairn","tags":["a","b"],"depth":3}"#).unwrap();

    session.set_global("config", &config).unwrap();
    assert_eq!(session.get_global("config").unwrap(), config);
    assert_eq!(session.context().top(), 0);
}

/// A global nobody set reads back as undefined.
#[test]
fn missing_globals_read_undefined() {
    let mut session = Session::new();
    assert_eq!(session.get_global("nothing").unwrap(), Var::Undefined);
}

/// A global move that trips a limit part way leaves the stack balanced.
#[test]
fn failed_global_moves_leave_no_residue() {
    let mut session = Session::with_limits(Limits::default().max_stack(2));
    assert!(matches!(
        session.set_global("name", &Var::Int(1)),
        Err(EngineError::Limit(LimitError::Stack { limit: 2 }))
    ));
    assert_eq!(session.context().top(), 0);

    let mut session = Session::with_limits(Limits::default().max_stack(1));
    assert!(matches!(
        session.get_global("name"),
        Err(EngineError::Limit(LimitError::Stack { limit: 1 }))
    ));
    assert_eq!(session.context().top(), 0);
}

// ============================================================================
// Registered closures
// ============================================================================

/// A registered closure keeps its captured state across calls.
#[test]
fn closures_keep_state_between_calls() {
    let mut session = Session::new();
    let mut count = 0_i64;
    session
        .register_fn("tick", move |ctx| {
            count += 1;
            ctx.push_int(count)?;
            Ok(HostRet::Top)
        })
        .unwrap();

    assert_eq!(session.registered(), 1);
    assert_eq!(session.call_global("tick", &[]).unwrap(), Var::Int(1));
    assert_eq!(session.call_global("tick", &[]).unwrap(), Var::Int(2));
    assert_eq!(session.context().top(), 0);
}

/// Arguments arrive as engine values in the callee frame.
#[test]
fn arguments_cross_the_boundary() {
    let mut session = Session::new();
    session
        .register_fn("sum", |ctx| {
            let total = ctx.to_number(0)? + ctx.to_number(1)?;
            ctx.push_number(total)?;
            Ok(HostRet::Top)
        })
        .unwrap();

    let out = session.call_global("sum", &[Var::Int(2), Var::Float(0.5)]);
    assert_eq!(out.unwrap(), Var::Float(2.5));
}

/// Structured results detach with shape and key order intact.
#[test]
fn structured_results_detach() {
    let mut session = Session::new();
    session
        .register_fn("shape", |ctx| {
            ctx.push_str(r#"{"z":1,"a":[true,null]}"#)?;
            ctx.json_decode(-1)?;
            Ok(HostRet::Top)
        })
        .unwrap();

    let out = session.call_global("shape", &[]).unwrap();
    assert_eq!(out.to_json(), r#"{"z":1,"a":[true,null]}"#);
}

/// A function pushed without a global binding travels like any value.
#[test]
fn pushed_functions_travel_as_values() {
    let mut session = Session::new();
    session.context_mut().push_object().unwrap();
    session
        .push_fn(Some("double"), |ctx| {
            let n = ctx.to_number(0)?;
            ctx.push_number(n * 2.0)?;
            Ok(HostRet::Top)
        })
        .unwrap();
    session.context_mut().put_prop_str(-2, "double").unwrap();

    let ctx = session.context_mut();
    ctx.push_str("double").unwrap();
    ctx.push_int(21).unwrap();
    ctx.pcall_prop(-3, 1).unwrap();
    assert_eq!(ctx.get_number(-1).unwrap(), 42.0);
}

// ============================================================================
// Call failures
// ============================================================================

/// Calling a name nobody defined throws a reference error.
#[test]
fn missing_globals_throw_reference_errors() {
    let mut session = Session::new();
    match session.call_global("nope", &[]) {
        Err(EngineError::Script(err)) => {
            assert_eq!(err.kind(), ErrorKind::Reference);
            assert_eq!(err.message(), "\"nope\" is not defined");
        }
        other => panic!("expected a thrown error, got {other:?}"),
    }
    assert_eq!(session.context().top(), 0);
}

/// A throwing closure reports through the result and leaves no residue.
#[test]
fn thrown_errors_leave_the_stack_balanced() {
    let mut session = Session::new();
    session
        .register_fn("fail", |_ctx| Err(ScriptError::range_error("bad input")))
        .unwrap();

    match session.call_global("fail", &[]) {
        Err(EngineError::Script(err)) => {
            assert_eq!(err.kind(), ErrorKind::Range);
            assert_eq!(err.message(), "bad input");
            assert_eq!(err.frames(), ["fail"]);
        }
        other => panic!("expected a thrown error, got {other:?}"),
    }
    assert_eq!(session.context().top(), 0);
}

/// A closure that calls itself hits the live-borrow guard, not undefined
/// behavior.
#[test]
fn reentrant_calls_are_rejected() {
    let mut session = Session::new();
    session
        .register_fn("again", |ctx| {
            ctx.get_global_str("again")?;
            ctx.pcall(0)?;
            Ok(HostRet::Top)
        })
        .unwrap();

    match session.call_global("again", &[]) {
        Err(EngineError::Script(err)) => {
            assert_eq!(err.kind(), ErrorKind::Error);
            assert_eq!(err.message(), "reentrant call into a live host closure");
            assert_eq!(err.frames(), ["again", "again"]);
        }
        other => panic!("expected a thrown error, got {other:?}"),
    }
    assert_eq!(session.context().top(), 0);
}

/// Shape failures from limits pass through unconverted and still unwind.
#[test]
fn limit_failures_unwind_cleanly() {
    let mut session = Session::with_limits(Limits::default().max_call_depth(0));
    session
        .register_fn("f", |_ctx| Ok(HostRet::Undefined))
        .unwrap();

    assert!(matches!(
        session.call_global("f", &[]),
        Err(EngineError::Limit(LimitError::Calls { limit: 0 }))
    ));
    assert_eq!(session.context().top(), 0);
}

// ============================================================================
// Host data carriers
// ============================================================================

#[derive(Debug, PartialEq)]
struct Blob {
    tag: u32,
}

/// Host data rides an object and comes back by downcast.
#[test]
fn host_data_downcasts() {
    let mut session = Session::new();
    session.push_host_object(Rc::new(Blob { tag: 7 })).unwrap();
    assert_eq!(session.registered(), 1);

    let data = session.host_object(-1).unwrap().unwrap();
    assert_eq!(data.downcast_ref::<Blob>(), Some(&Blob { tag: 7 }));
}

/// From the engine side a carrier is an ordinary object: its plants stay
/// out of conversion and JSON.
#[test]
fn carriers_look_like_plain_objects() {
    let mut session = Session::new();
    session.push_host_object(Rc::new(Blob { tag: 1 })).unwrap();
    session.context_mut().push_int(7).unwrap();
    session.context_mut().put_prop_str(-2, "visible").unwrap();

    let var = session.context_mut().to_var(-1).unwrap();
    assert_eq!(var.to_json(), r#"{"visible":7}"#);

    assert_eq!(session.context_mut().json_encode(-1).unwrap(), r#"{"visible":7}"#);
    // Encoding replaced the carrier in its slot, so the data just retired.
    assert_eq!(session.registered(), 0);
}

/// Values nobody planted read as no host data at all.
#[test]
fn unplanted_values_carry_nothing() {
    let mut session = Session::new();
    let ctx = session.context_mut();
    ctx.push_object().unwrap();
    ctx.push_int(3).unwrap();

    assert!(session.host_object(-1).unwrap().is_none());
    assert!(session.host_object(-2).unwrap().is_none());
}

/// Function registrations are not host data.
#[test]
fn function_registrations_are_not_host_data() {
    let mut session = Session::new();
    session
        .push_fn(None, |_ctx| Ok(HostRet::Undefined))
        .unwrap();
    assert!(session.host_object(-1).unwrap().is_none());
}

/// Hand-built plants with a null or foreign address read as no data
/// instead of being dereferenced.
#[test]
fn forged_plants_read_as_nothing() {
    let mut session = Session::new();

    let ctx = session.context_mut();
    ctx.push_object().unwrap();
    cairn::slot::push_ptr_slot(ctx).unwrap();
    ctx.put_hidden_prop_str(-2, "__scope").unwrap();
    ctx.push_int(1).unwrap();
    ctx.put_hidden_prop_str(-2, "__id").unwrap();
    assert!(session.host_object(-1).unwrap().is_none());

    let mut junk = 0_u8;
    let foreign = cairn::RawPtr::new((&raw mut junk).cast());
    let ctx = session.context_mut();
    ctx.push_object().unwrap();
    cairn::slot::push_ptr_slot(ctx).unwrap().store(foreign);
    ctx.put_hidden_prop_str(-2, "__scope").unwrap();
    ctx.push_int(1).unwrap();
    ctx.put_hidden_prop_str(-2, "__id").unwrap();
    assert!(session.host_object(-1).unwrap().is_none());
}

// ============================================================================
// Retirement
// ============================================================================

/// Replacing the global drops the carrier's last reference and the
/// finalizer retires the closure.
#[test]
fn replaced_globals_retire_their_closures() {
    let mut session = Session::new();
    session
        .register_fn("f", |_ctx| Ok(HostRet::Undefined))
        .unwrap();
    assert_eq!(session.registered(), 1);

    session.set_global("f", &Var::Null).unwrap();
    assert_eq!(session.registered(), 0);

    match session.call_global("f", &[]) {
        Err(EngineError::Script(err)) => assert_eq!(err.kind(), ErrorKind::Type),
        other => panic!("expected a thrown error, got {other:?}"),
    }
}

/// Popping a data carrier retires its cell the same way.
#[test]
fn popped_carriers_retire_their_data() {
    let mut session = Session::new();
    session.push_host_object(Rc::new(Blob { tag: 2 })).unwrap();
    session.push_host_object(Rc::new(String::from("kept"))).unwrap();
    assert_eq!(session.registered(), 2);

    session.context_mut().remove(-2).unwrap();
    assert_eq!(session.registered(), 1);

    let data = session.host_object(-1).unwrap().unwrap();
    assert_eq!(data.downcast_ref::<String>().map(String::as_str), Some("kept"));
}

/// Dropping the session drops the context first, which retires every
/// registration through the ordinary finalizer path.
#[test]
fn dropping_the_session_runs_finalizers() {
    let flag = Rc::new(std::cell::Cell::new(false));
    let seen = Rc::clone(&flag);

    let mut session = Session::new();
    session
        .register_fn("watch", move |_ctx| {
            seen.set(true);
            Ok(HostRet::Undefined)
        })
        .unwrap();

    drop(session);
    assert!(!flag.get(), "the closure itself never ran");
    assert_eq!(Rc::strong_count(&flag), 1, "teardown dropped the closure");
}

/// The session still exposes the plain context API for direct stack work.
#[test]
fn the_context_stays_reachable() {
    fn plain(ctx: &mut Context) -> Result<HostRet, ScriptError> {
        ctx.push_int(5)?;
        Ok(HostRet::Top)
    }

    let mut session = Session::new();
    let ctx = session.context_mut();
    ctx.push_host_fn(Some("plain"), plain).unwrap();
    ctx.pcall(0).unwrap();
    assert_eq!(ctx.get_int(-1).unwrap(), 5);
    assert_eq!(session.context().stats().live_objects, 0);
}
