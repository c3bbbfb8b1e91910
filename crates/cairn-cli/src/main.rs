//! Line-oriented workbench over a [`Session`].
//!
//! Each input line is one command against the live value stack. With a file
//! argument the commands are read from the file and executed in order;
//! without one the workbench reads stdin interactively and echoes the stack
//! after every mutating command.

use std::{
    env, fs,
    io::{self, BufRead, Write},
    process::ExitCode,
};

use cairn::{Context, EngineError, EnumFlags, HostRet, Session, Var};

const HELP: &str = "\
push:    int N | num X | str TEXT | true | false | null | undef
         bytes HEX | json TEXT | obj | arr
stack:   pop | dup IDX | remove IDX | top | type IDX | dump | stats
props:   get IDX KEY | put IDX KEY | del IDX KEY | enum IDX
json:    enc IDX | dec IDX
globals: global NAME | setglobal NAME | call NAME [NARGS]
other:   help | quit
builtin functions: upper(text), sum(numbers...), concat(texts...)";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let mut session = match build_session() {
        Ok(session) => session,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if args.len() > 1 {
        run_script(&mut session, &args[1])
    } else {
        run_repl(&mut session)
    }
}

/// A session with a few demonstration functions registered.
fn build_session() -> Result<Session, EngineError> {
    let mut session = Session::new();
    session.register_fn("upper", |ctx| {
        let text = ctx.to_str(0)?.to_uppercase();
        ctx.push_str(&text)?;
        Ok(HostRet::Top)
    })?;
    session.register_fn("sum", |ctx| {
        let mut total = 0.0;
        for i in 0..ctx.top() {
            total += ctx.to_number(i)?;
        }
        ctx.push_number(total)?;
        Ok(HostRet::Top)
    })?;
    session.register_fn("concat", |ctx| {
        let mut out = String::new();
        for i in 0..ctx.top() {
            out.push_str(ctx.to_str(i)?);
        }
        ctx.push_str(&out)?;
        Ok(HostRet::Top)
    })?;
    Ok(session)
}

fn run_script(session: &mut Session, path: &str) -> ExitCode {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("error reading {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    for (number, line) in text.lines().enumerate() {
        match execute(session, line) {
            Ok(Some(output)) => {
                if !output.is_empty() {
                    println!("{output}");
                }
            }
            Ok(None) => return ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{path}:{line_no}: {err}", line_no = number + 1);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn run_repl(session: &mut Session) -> ExitCode {
    println!("cairn workbench (\"help\" lists commands, \"quit\" leaves)");
    let stdin = io::stdin();
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            return ExitCode::FAILURE;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {}
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        }

        match execute(session, &line) {
            Ok(Some(output)) => {
                if output.is_empty() {
                    println!("{}", session.context().dump());
                } else {
                    println!("{output}");
                }
            }
            Ok(None) => return ExitCode::SUCCESS,
            Err(err) => eprintln!("error: {err}"),
        }
    }
}

/// Runs one command line. `Ok(None)` means quit; an empty output string
/// means the command mutated the stack without producing text.
fn execute(session: &mut Session, line: &str) -> Result<Option<String>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(Some(String::new()));
    }
    let (cmd, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim_start()),
        None => (trimmed, ""),
    };

    let ctx = session.context_mut();
    match cmd {
        "int" => engine(ctx.push_int(parse_num(rest)?))?,
        "num" => engine(ctx.push_number(parse_num(rest)?))?,
        "str" => engine(ctx.push_str(rest))?,
        "true" => engine(ctx.push_bool(true))?,
        "false" => engine(ctx.push_bool(false))?,
        "null" => engine(ctx.push_null())?,
        "undef" => engine(ctx.push_undefined())?,
        "bytes" => engine(ctx.push_bytes(&parse_hex(rest)?))?,
        "json" => {
            engine(ctx.push_str(rest))?;
            engine(ctx.json_decode(-1))?;
        }
        "obj" => engine(ctx.push_object())?,
        "arr" => engine(ctx.push_array())?,

        "pop" => engine(ctx.pop())?,
        "dup" => engine(ctx.dup(parse_num(rest)?))?,
        "remove" => engine(ctx.remove(parse_num(rest)?))?,
        "top" => return Ok(Some(format!("top = {}", ctx.top()))),
        "type" => return Ok(Some(ctx.type_of(parse_num(rest)?).to_string())),
        "dump" => return Ok(Some(ctx.dump())),
        "stats" => return Ok(Some(format!("{stats:?}", stats = ctx.stats()))),

        "get" => {
            let (idx, key) = parse_idx_key(rest)?;
            let found = engine(ctx.get_prop_str(idx, key))?;
            let shown = value_text(ctx, -1);
            return Ok(Some(if found {
                format!("pushed {shown}")
            } else {
                format!("pushed {shown} (missing)")
            }));
        }
        "put" => {
            let (idx, key) = parse_idx_key(rest)?;
            engine(ctx.put_prop_str(idx, key))?;
        }
        "del" => {
            let (idx, key) = parse_idx_key(rest)?;
            let found = engine(ctx.delete_prop_str(idx, key))?;
            return Ok(Some(format!("deleted = {found}")));
        }
        "enum" => return enumerate(ctx, parse_num(rest)?).map(Some),

        "enc" => return Ok(Some(engine(ctx.json_encode(parse_num(rest)?))?)),
        "dec" => engine(ctx.json_decode(parse_num(rest)?))?,

        "global" => {
            let found = engine(ctx.get_global_str(rest))?;
            let shown = value_text(ctx, -1);
            return Ok(Some(if found {
                format!("pushed {shown}")
            } else {
                format!("pushed {shown} (missing)")
            }));
        }
        "setglobal" => engine(ctx.put_global_str(rest))?,
        "call" => return call(ctx, rest).map(Some),

        "help" => return Ok(Some(HELP.to_string())),
        "quit" | "exit" => return Ok(None),
        other => return Err(format!("unknown command: {other} (try \"help\")")),
    }
    Ok(Some(String::new()))
}

/// Fetches the named global, moves it under the top `nargs` values and
/// calls it.
fn call(ctx: &mut Context, rest: &str) -> Result<String, String> {
    let (name, nargs) = match rest.split_once(char::is_whitespace) {
        Some((name, count)) => (name, parse_num::<usize>(count.trim())?),
        None => (rest, 0),
    };

    if !engine(ctx.get_global_str(name))? {
        engine(ctx.pop())?;
        return Err(format!("\"{name}\" is not defined"));
    }
    engine(ctx.insert(-(nargs as i32) - 1))?;
    engine(ctx.pcall(nargs))?;
    Ok(format!("-> {}", value_text(ctx, -1)))
}

/// Walks a fresh enumerator over the value at `idx` and renders one line
/// per key.
fn enumerate(ctx: &mut Context, idx: i32) -> Result<String, String> {
    engine(ctx.enumerate(idx, EnumFlags::default()))?;
    let mut lines = Vec::new();
    loop {
        match ctx.next(-1, true) {
            Ok(true) => {
                let key = engine(ctx.get_str(-2))?.to_string();
                let shown = value_text(ctx, -1);
                lines.push(format!("{key}: {shown}"));
                engine(ctx.pop_n(2))?;
            }
            Ok(false) => break,
            Err(err) => {
                let _ = ctx.pop();
                return Err(err.to_string());
            }
        }
    }
    engine(ctx.pop())?;
    if lines.is_empty() {
        Ok("(no enumerable keys)".to_string())
    } else {
        Ok(lines.join("\n"))
    }
}

/// Renders the value at `idx` without mutating it.
fn value_text(ctx: &mut Context, idx: i32) -> String {
    if ctx.is_function(idx) {
        return "function".to_string();
    }
    match ctx.to_var(idx) {
        Ok(Var::Undefined) => "undefined".to_string(),
        Ok(var) => var.to_json(),
        Err(_) => ctx.type_of(idx).to_string(),
    }
}

fn engine<T>(outcome: Result<T, EngineError>) -> Result<T, String> {
    outcome.map_err(|err| err.to_string())
}

fn parse_num<T: std::str::FromStr>(text: &str) -> Result<T, String> {
    text.parse().map_err(|_| format!("not a number: {text:?}"))
}

fn parse_idx_key(rest: &str) -> Result<(i32, &str), String> {
    let Some((idx, key)) = rest.split_once(char::is_whitespace) else {
        return Err(format!("expected IDX KEY, got {rest:?}"));
    };
    Ok((parse_num(idx)?, key.trim()))
}

fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in {text:?}"));
    }
    let mut out = Vec::with_capacity(compact.len() / 2);
    for pair in compact.as_bytes().chunks(2) {
        let pair = std::str::from_utf8(pair).map_err(|_| format!("not hex: {text:?}"))?;
        out.push(u8::from_str_radix(pair, 16).map_err(|_| format!("not a hex byte: {pair:?}"))?);
    }
    Ok(out)
}
