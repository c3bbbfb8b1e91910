use cairn::{Context, HostRet, RawPtr, ScriptError, Session, Var, slot};
use criterion::{Bencher, Criterion, black_box, criterion_group, criterion_main};

/// A small but realistic document: nested objects, an array of objects and
/// mixed scalar types.
const CONFIG_JSON: &str = r#"{"name":"pipeline","steps":[{"op":"map","by":2},{"op":"filter","min":10}],"limits":{"depth":4,"width":16}}"#;

fn add(ctx: &mut Context) -> Result<HostRet, ScriptError> {
    let total = ctx.to_number(0)? + ctx.to_number(1)?;
    ctx.push_number(total)?;
    Ok(HostRet::Top)
}

/// Push/pop churn over immediate values and one interned string.
fn stack_churn(bench: &mut Bencher) {
    let mut ctx = Context::new();
    bench.iter(|| {
        ctx.push_int(1).unwrap();
        ctx.push_str("x").unwrap();
        ctx.push_bool(true).unwrap();
        ctx.pop_n(3).unwrap();
        black_box(ctx.top());
    });
}

/// One property write and read back on a long-lived object.
fn prop_round_trip(bench: &mut Bencher) {
    let mut ctx = Context::new();
    ctx.push_object().unwrap();
    bench.iter(|| {
        ctx.push_int(42).unwrap();
        ctx.put_prop_str(-2, "k").unwrap();
        ctx.get_prop_str(-1, "k").unwrap();
        let out = ctx.get_int(-1).unwrap();
        ctx.pop().unwrap();
        black_box(out);
    });
}

/// A full protected call of a plain host function, fetched from a global
/// each time the way an embedding driver would.
fn host_call(bench: &mut Bencher) {
    let mut ctx = Context::new();
    ctx.push_host_fn(Some("add"), add).unwrap();
    ctx.put_global_str("add").unwrap();

    bench.iter(|| {
        ctx.get_global_str("add").unwrap();
        ctx.push_int(2).unwrap();
        ctx.push_int(3).unwrap();
        ctx.pcall(2).unwrap();
        let out = ctx.get_number(-1).unwrap();
        ctx.pop().unwrap();
        black_box(out);
    });
}

/// A registered closure called through the session layer, including both
/// argument and result conversion.
fn session_dispatch(bench: &mut Bencher) {
    let mut session = Session::new();
    session
        .register_fn("add", |ctx| {
            let total = ctx.to_number(0)? + ctx.to_number(1)?;
            ctx.push_number(total)?;
            Ok(HostRet::Top)
        })
        .unwrap();

    let args = [Var::Int(2), Var::Int(3)];
    assert_eq!(session.call_global("add", &args).unwrap(), Var::Int(5));

    bench.iter(|| {
        let out = session.call_global("add", &args).unwrap();
        black_box(out);
    });
}

/// Decode then re-encode the sample document in place.
fn json_round_trip(bench: &mut Bencher) {
    let mut ctx = Context::new();
    ctx.push_str(CONFIG_JSON).unwrap();
    ctx.json_decode(-1).unwrap();
    assert_eq!(ctx.json_encode(-1).unwrap(), CONFIG_JSON);
    ctx.pop().unwrap();

    bench.iter(|| {
        ctx.push_str(CONFIG_JSON).unwrap();
        ctx.json_decode(-1).unwrap();
        let text = ctx.json_encode(-1).unwrap();
        ctx.pop().unwrap();
        black_box(text);
    });
}

/// Move the sample document across the boundary both ways as a `Var` tree.
fn var_boundary(bench: &mut Bencher) {
    let mut ctx = Context::new();
    let var = Var::from_json(CONFIG_JSON).unwrap();

    bench.iter(|| {
        ctx.push_var(&var).unwrap();
        let back = ctx.to_var(-1).unwrap();
        ctx.pop().unwrap();
        black_box(back);
    });
}

/// Store a pointer into a fresh slot and read it back out.
fn ptr_slot_round_trip(bench: &mut Bencher) {
    let mut ctx = Context::new();
    let marker = 0x5a5a_usize as *mut ();

    bench.iter(|| {
        slot::push_ptr_slot(&mut ctx).unwrap().store(RawPtr::new(marker));
        let back = slot::read_ptr_slot(&mut ctx, -1).unwrap();
        ctx.pop().unwrap();
        black_box(back.as_ptr());
    });
}

/// Configures the engine benchmark group.
fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("stack_churn", stack_churn);
    c.bench_function("prop_round_trip", prop_round_trip);
    c.bench_function("host_call", host_call);
    c.bench_function("session_dispatch", session_dispatch);
    c.bench_function("json_round_trip", json_round_trip);
    c.bench_function("var_boundary", var_boundary);
    c.bench_function("ptr_slot_round_trip", ptr_slot_round_trip);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
