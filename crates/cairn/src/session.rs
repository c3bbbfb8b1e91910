//! The embedder's entry point: a context paired with a registration scope.
//!
//! A bare [`Context`] only calls plain function pointers. A [`Session`] adds
//! the bridge for everything stateful: it owns the context together with a
//! boxed scope registry, registers `FnMut` closures as callable engine
//! functions, attaches host data (`Rc<dyn Any>`) to engine objects, and
//! moves [`Var`] trees across the boundary in both directions.
//!
//! Registration works by planting two hidden properties on the carrying
//! object: a pointer slot holding the scope's boxed address and the cell id
//! inside it. A finalizer on the carrier retires the cell when the engine
//! collects it, so dropping the last engine reference to a registered
//! function also drops the closure.

use std::{any::Any, rc::Rc};

use crate::{
    call::HostRet,
    context::Context,
    error::{EngineError, ErrorKind, ScriptError},
    heap::HeapRef,
    limits::Limits,
    scope::{self, ID_KEY, SCOPE_KEY, Scope},
    slot,
    tracer::{EngineTracer, NoopTracer},
    value::RawPtr,
    var::Var,
};

/// A [`Context`] with a host-side registration scope attached.
///
/// ```
/// use cairn::{HostRet, Session, Var};
///
/// # fn main() -> Result<(), cairn::EngineError> {
/// let mut session = Session::new();
/// session.register_fn("greet", |ctx| {
///     let name = ctx.to_str(0)?.to_owned();
///     ctx.push_str(&format!("hello, {name}"))?;
///     Ok(HostRet::Top)
/// })?;
///
/// let out = session.call_global("greet", &[Var::from("cairn")])?;
/// assert_eq!(out.as_str(), Some("hello, cairn"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Session<Tr: EngineTracer = NoopTracer> {
    // Field order is drop order: the context tears down first, running the
    // finalize trampolines that dereference the scope box.
    ctx: Context<Tr>,
    scope: Box<Scope<Tr>>,
    finalize_fn: Option<HeapRef>,
}

impl Session<NoopTracer> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_context(Context::new())
    }

    #[must_use]
    pub fn with_limits(limits: Limits) -> Self {
        Self::with_context(Context::with_limits(limits))
    }
}

impl Default for Session<NoopTracer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tr: EngineTracer> Session<Tr> {
    #[must_use]
    pub fn with_tracer(tracer: Tr) -> Self {
        Self::with_context(Context::with_tracer(tracer))
    }

    #[must_use]
    pub fn with_tracer_and_limits(tracer: Tr, limits: Limits) -> Self {
        Self::with_context(Context::with_tracer_and_limits(tracer, limits))
    }

    fn with_context(ctx: Context<Tr>) -> Self {
        Self {
            ctx,
            scope: Box::new(Scope::new()),
            finalize_fn: None,
        }
    }

    #[must_use]
    pub fn context(&self) -> &Context<Tr> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context<Tr> {
        &mut self.ctx
    }

    /// Number of live registrations (closures and host data) in the scope.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.scope.len()
    }

    // ========================================================================
    // Closures
    // ========================================================================

    /// Registers `f` as a global function callable from the engine side.
    ///
    /// The closure stays alive until every engine reference to the function
    /// drops; replacing the global with another value is enough to retire
    /// it. Calling the function while an earlier activation of the same
    /// closure is still running fails with
    /// [`EngineError::ReentrantHostFn`].
    pub fn register_fn<F>(&mut self, name: &str, f: F) -> Result<(), EngineError>
    where
        F: FnMut(&mut Context<Tr>) -> Result<HostRet, ScriptError> + 'static,
    {
        let floor = self.ctx.top();
        self.push_fn(Some(name), f)?;
        if let Err(err) = self.ctx.put_global_str(name) {
            self.unwind_to(floor);
            return Err(err);
        }
        Ok(())
    }

    /// Pushes a function carrying `f` without binding it to a global. The
    /// caller decides where it goes: a property, a call argument, anywhere
    /// a value fits.
    pub fn push_fn<F>(&mut self, name: Option<&str>, f: F) -> Result<(), EngineError>
    where
        F: FnMut(&mut Context<Tr>) -> Result<HostRet, ScriptError> + 'static,
    {
        let floor = self.ctx.top();
        let id = self.scope.add_func(f);
        let outcome = self.push_fn_carrier(name, id);
        self.unwind_plant(floor, id, outcome)
    }

    fn push_fn_carrier(&mut self, name: Option<&str>, id: u64) -> Result<(), EngineError> {
        self.ctx.push_host_fn(name, scope::dispatch::<Tr>)?;
        self.plant(-1, id)
    }

    // ========================================================================
    // Host data
    // ========================================================================

    /// Pushes a fresh object carrying `data`. The data is retired when the
    /// engine collects the object.
    pub fn push_host_object(&mut self, data: Rc<dyn Any>) -> Result<(), EngineError> {
        let floor = self.ctx.top();
        let id = self.scope.add_data(data);
        let outcome = self.push_object_carrier(id);
        self.unwind_plant(floor, id, outcome)
    }

    fn push_object_carrier(&mut self, id: u64) -> Result<(), EngineError> {
        self.ctx.push_object()?;
        self.plant(-1, id)
    }

    /// Recovers the host data carried by the value at `idx`.
    ///
    /// Returns `Ok(None)` for values this session did not plant: ordinary
    /// objects, registered functions, and carriers planted by a different
    /// session.
    pub fn host_object(&mut self, idx: i32) -> Result<Option<Rc<dyn Any>>, EngineError> {
        let Some((ptr, id)) = scope::read_plant(&mut self.ctx, idx)? else {
            return Ok(None);
        };
        // A foreign plant points at some other session's scope; it must not
        // be dereferenced, only compared.
        if !std::ptr::eq(ptr, &raw mut *self.scope) {
            return Ok(None);
        }
        Ok(self.scope.get_data(id))
    }

    // ========================================================================
    // Globals by value
    // ========================================================================

    /// Reads a global and detaches it as a [`Var`]. Missing globals read as
    /// [`Var::Undefined`].
    pub fn get_global(&mut self, name: &str) -> Result<Var, EngineError> {
        let floor = self.ctx.top();
        if let Err(err) = self.ctx.get_global_str(name) {
            self.unwind_to(floor);
            return Err(err);
        }
        let var = self.ctx.to_var(-1);
        self.ctx.pop()?;
        var
    }

    /// Stores a [`Var`] as a global.
    pub fn set_global(&mut self, name: &str, var: &Var) -> Result<(), EngineError> {
        let floor = self.ctx.top();
        self.ctx.push_var(var)?;
        if let Err(err) = self.ctx.put_global_str(name) {
            self.unwind_to(floor);
            return Err(err);
        }
        Ok(())
    }

    /// Calls a global function with [`Var`] arguments and detaches its
    /// result.
    ///
    /// The stack is left balanced on every path. A thrown error comes back
    /// as [`EngineError::Script`] with the error object discarded; a missing
    /// global throws a `ReferenceError`.
    pub fn call_global(&mut self, name: &str, args: &[Var]) -> Result<Var, EngineError> {
        let floor = self.ctx.top();
        let outcome = self.call_global_inner(name, args);
        if outcome.is_err() {
            self.unwind_to(floor);
        }
        outcome
    }

    fn call_global_inner(&mut self, name: &str, args: &[Var]) -> Result<Var, EngineError> {
        if !self.ctx.get_global_str(name)? {
            self.ctx.pop()?;
            return Err(EngineError::Script(ScriptError::new(
                ErrorKind::Reference,
                format!("\"{name}\" is not defined"),
            )));
        }
        for arg in args {
            self.ctx.push_var(arg)?;
        }
        self.ctx.pcall(args.len())?;
        let var = self.ctx.to_var(-1);
        self.ctx.pop()?;
        var
    }

    // ========================================================================
    // Planting
    // ========================================================================

    /// Plants the scope address and cell id on the object at `obj_idx` and
    /// arms the retiring finalizer. Each step runs with exactly one value
    /// pushed above the caller's top, so `obj_idx` is shifted once.
    fn plant(&mut self, obj_idx: i32, id: u64) -> Result<(), EngineError> {
        let scope_ptr = RawPtr::new((&raw mut *self.scope).cast());
        slot::push_ptr_slot(&mut self.ctx)?.store(scope_ptr);
        self.ctx.put_hidden_prop_str(under_push(obj_idx), SCOPE_KEY)?;

        self.ctx.push_int(id as i64)?;
        self.ctx.put_hidden_prop_str(under_push(obj_idx), ID_KEY)?;

        self.push_finalize_fn()?;
        self.ctx.set_finalizer(under_push(obj_idx))
    }

    /// Pushes the shared finalize trampoline, creating and pinning it on
    /// first use so every carrier reuses one function object.
    fn push_finalize_fn(&mut self) -> Result<(), EngineError> {
        if let Some(pin) = &self.finalize_fn {
            return self.ctx.push_heap_ref(pin);
        }
        self.ctx.push_host_fn(None, scope::finalize::<Tr>)?;
        let pin = self.ctx.heap_ref(-1)?;
        self.finalize_fn = Some(pin);
        Ok(())
    }

    /// Retires `id` and pops back to `floor` when planting failed part way.
    fn unwind_plant(
        &mut self,
        floor: i32,
        id: u64,
        outcome: Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        if outcome.is_err() {
            self.scope.remove(id);
            self.unwind_to(floor);
        }
        outcome
    }

    fn unwind_to(&mut self, floor: i32) {
        while self.ctx.top() > floor {
            let _ = self.ctx.pop();
        }
    }
}

/// Adjusts a negative index for one value pushed above it.
fn under_push(idx: i32) -> i32 {
    if idx < 0 { idx - 1 } else { idx }
}
