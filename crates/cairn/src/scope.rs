//! The registration scope: where host closures and host data live.
//!
//! Engine host functions are plain function pointers, so stateful closures
//! need somewhere to stand. A [`Scope`] is that place: an id-keyed registry
//! owned by the session, pinned behind a `Box` so its address is stable.
//! Registering a closure plants two hidden properties on the carrying
//! function object: a pointer slot holding the scope's address and the
//! numeric cell id. The [`dispatch`] trampoline reads both back from the
//! function it was called through and forwards into the closure; the
//! [`finalize`] trampoline runs when a carrier is collected and retires its
//! cell.
//!
//! # Safety
//!
//! The trampolines dereference the planted scope pointer. They rely on the
//! plants being the ones the session wrote: the trampoline entries are
//! crate-private, the scope is pinned behind a `Box` for the session's whole
//! life, and the session drops its context (running every finalizer) before
//! the scope box. Overwriting a plant with foreign bytes is outside the
//! engine's contract, the same way dereferencing a recovered pointer slot
//! is. Scope references are taken in tight blocks that never span an engine
//! call, so reentrant dispatch cannot alias them.

use std::{any::Any, cell::RefCell, rc::Rc};

use ahash::AHashMap;

use crate::{
    call::HostRet,
    context::Context,
    error::{EngineError, ScriptError},
    slot,
    tracer::EngineTracer,
};

/// Hidden property carrying the scope address as a pointer slot.
pub(crate) const SCOPE_KEY: &str = "__scope";
/// Hidden property carrying the cell id as a number.
pub(crate) const ID_KEY: &str = "__id";

pub(crate) type HostClosure<Tr> = dyn FnMut(&mut Context<Tr>) -> Result<HostRet, ScriptError>;

/// One registered entry.
pub(crate) enum ScopeCell<Tr: EngineTracer> {
    /// A host closure behind a carrying function object. The `RefCell`
    /// catches the same closure being re-entered through a nested call.
    Func(Rc<RefCell<HostClosure<Tr>>>),
    /// Host data behind a host object.
    Data(Rc<dyn Any>),
}

impl<Tr: EngineTracer> Clone for ScopeCell<Tr> {
    fn clone(&self) -> Self {
        match self {
            Self::Func(f) => Self::Func(Rc::clone(f)),
            Self::Data(d) => Self::Data(Rc::clone(d)),
        }
    }
}

pub(crate) struct Scope<Tr: EngineTracer> {
    cells: AHashMap<u64, ScopeCell<Tr>>,
    /// Next id to hand out; ids start at 1 so zero always means "absent".
    next: u64,
}

impl<Tr: EngineTracer> Scope<Tr> {
    pub(crate) fn new() -> Self {
        Self {
            cells: AHashMap::new(),
            next: 1,
        }
    }

    pub(crate) fn add_func<F>(&mut self, f: F) -> u64
    where
        F: FnMut(&mut Context<Tr>) -> Result<HostRet, ScriptError> + 'static,
    {
        let id = self.next;
        self.next += 1;
        self.cells.insert(id, ScopeCell::Func(Rc::new(RefCell::new(f))));
        id
    }

    pub(crate) fn add_data(&mut self, data: Rc<dyn Any>) -> u64 {
        let id = self.next;
        self.next += 1;
        self.cells.insert(id, ScopeCell::Data(data));
        id
    }

    pub(crate) fn remove(&mut self, id: u64) {
        self.cells.remove(&id);
    }

    pub(crate) fn get(&self, id: u64) -> Option<ScopeCell<Tr>> {
        self.cells.get(&id).cloned()
    }

    pub(crate) fn get_data(&self, id: u64) -> Option<Rc<dyn Any>> {
        match self.cells.get(&id) {
            Some(ScopeCell::Data(data)) => Some(Rc::clone(data)),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }
}

impl<Tr: EngineTracer> std::fmt::Debug for Scope<Tr> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("cells", &self.cells.len())
            .field("next", &self.next)
            .finish()
    }
}

/// Reads the plants off the value at `idx`. `Ok(None)` means the value
/// carries no plausible registration; junk plants are treated the same way.
pub(crate) fn read_plant<Tr: EngineTracer>(
    ctx: &mut Context<Tr>,
    idx: i32,
) -> Result<Option<(*mut Scope<Tr>, u64)>, EngineError> {
    if !ctx.is_object(idx) {
        return Ok(None);
    }
    if !ctx.get_prop_str(idx, SCOPE_KEY)? {
        ctx.pop()?;
        return Ok(None);
    }
    let raw = match slot::read_ptr_slot(ctx, -1) {
        Ok(raw) => raw,
        Err(EngineError::SlotWidth { .. } | EngineError::WrongType { .. }) => {
            ctx.pop()?;
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    ctx.pop()?;
    if raw.is_null() {
        return Ok(None);
    }

    if !ctx.get_prop_str(idx, ID_KEY)? {
        ctx.pop()?;
        return Ok(None);
    }
    let id = match ctx.get_int(-1) {
        Ok(id) => id,
        Err(EngineError::WrongType { .. }) => {
            ctx.pop()?;
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    ctx.pop()?;
    if id <= 0 {
        return Ok(None);
    }
    Ok(Some((raw.as_ptr().cast::<Scope<Tr>>(), id as u64)))
}

/// Trampoline installed as the engine entry of every registered closure.
///
/// Recovers the scope and cell id from the function it was called through,
/// then forwards the call into the closure. Calling a closure that is
/// already running (through a nested call chain) fails instead of aliasing
/// its state.
pub(crate) fn dispatch<Tr: EngineTracer>(ctx: &mut Context<Tr>) -> Result<HostRet, ScriptError> {
    ctx.push_current_fn()?;
    let plant = read_plant(ctx, -1)?;
    ctx.pop()?;
    let Some((scope_ptr, id)) = plant else {
        return Err(ScriptError::type_error("function has no host registration"));
    };

    let cell = {
        // SAFETY: plants are written only by the session that owns both this
        // context and the scope box, which outlives the context. The
        // reference is confined to this block, so nested dispatches through
        // the closure below cannot alias it.
        let scope = unsafe { &*scope_ptr };
        scope.get(id)
    };
    match cell {
        Some(ScopeCell::Func(f)) => {
            let Ok(mut guard) = f.try_borrow_mut() else {
                return Err(EngineError::ReentrantHostFn.into());
            };
            (*guard)(ctx)
        }
        Some(ScopeCell::Data(_)) => {
            Err(ScriptError::type_error("registration is host data, not a function"))
        }
        None => Err(ScriptError::type_error("host registration was already retired")),
    }
}

/// Trampoline installed as the finalizer of every carrier object.
///
/// The collected carrier arrives as the argument; its plants name the cell
/// to retire. Carriers that lost their plants are ignored.
pub(crate) fn finalize<Tr: EngineTracer>(ctx: &mut Context<Tr>) -> Result<HostRet, ScriptError> {
    if let Some((scope_ptr, id)) = read_plant(ctx, 0)? {
        // SAFETY: same ownership argument as in `dispatch`; the reference
        // lives only for this block and the removed cell is dropped after
        // it ends.
        let cell = {
            let scope = unsafe { &mut *scope_ptr };
            scope.cells.remove(&id)
        };
        drop(cell);
    }
    Ok(HostRet::Undefined)
}
