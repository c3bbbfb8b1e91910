#![doc = include_str!("../../../README.md")]

mod buffer;
mod call;
mod coerce;
mod context;
mod convert;
mod error;
mod heap;
mod intern;
mod json;
mod limits;
mod props;
mod scope;
mod session;
pub mod slot;
pub mod tracer;
mod value;
mod var;

pub use crate::{
    call::{HostFnEntry, HostRet},
    context::{Context, ContextStats},
    error::{EngineError, ErrorKind, ScriptError},
    heap::HeapRef,
    limits::{LimitError, Limits},
    props::EnumFlags,
    session::Session,
    tracer::{EngineTracer, NoopTracer, RecordingTracer, StderrTracer, TraceEvent},
    value::{RawPtr, ValueType},
    var::Var,
};
