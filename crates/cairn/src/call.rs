//! Protected calls into host functions.
//!
//! A call site arranges `[func, arg1 .. argN]` on the stack and invokes
//! [`Context::pcall`]. The callee runs in its own frame where index 0 is its
//! first argument; it cannot see or touch the caller's values. When the call
//! unwinds, the function and arguments are replaced by exactly one value:
//! the result on success, or an error object when the callee failed. A
//! failed call also reports the typed [`ScriptError`] through the returned
//! `Result`, so hosts rarely need to inspect the error object itself.
//!
//! Shape problems (missing operands, call depth limit) are reported without
//! consuming the operands; everything else follows the one-value protocol.

use crate::{
    context::{Context, Frame},
    error::{EngineError, ErrorKind, ScriptError},
    heap::{HeapData, HostFnData, PendingFinalizer, PropTable},
    tracer::EngineTracer,
    value::Value,
};

/// What a host function leaves for its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostRet {
    /// The call produces undefined; anything on the callee frame is
    /// discarded.
    Undefined,
    /// The value at the top of the callee frame is the result.
    Top,
}

/// Entry point of a host function.
///
/// Plain function pointers keep the heap data `Copy`-friendly; closures with
/// captured state are registered through a [`crate::session::Session`],
/// which dispatches to them from a function like this.
pub type HostFnEntry<Tr> = fn(&mut Context<Tr>) -> Result<HostRet, ScriptError>;

impl<Tr: EngineTracer> Context<Tr> {
    /// Pushes a host function value. The name is optional and shows up in
    /// traces, error frames and the function's `name` property.
    pub fn push_host_fn(
        &mut self,
        name: Option<&str>,
        entry: HostFnEntry<Tr>,
    ) -> Result<(), EngineError> {
        self.limits.check_stack(self.stack.len(), 1)?;
        self.limits.check_heap_objects(self.heap.live())?;
        let name_id = match name {
            Some(text) => Some(self.intern(text)?),
            None => None,
        };
        let data = HostFnData {
            entry,
            name: name_id,
            props: PropTable::default(),
        };
        let id = self
            .heap
            .allocate(HeapData::HostFn(data), &self.limits)
            .expect("heap object limit pre-checked");
        self.stack.push(Value::Ref(id));
        Ok(())
    }

    /// Calls the function below the top `nargs` values with `this` bound to
    /// undefined. See the module docs for the stack protocol.
    pub fn pcall(&mut self, nargs: usize) -> Result<(), EngineError> {
        let within = self.stack.len() - self.frame_base();
        if within < nargs + 1 {
            return Err(EngineError::StackUnderflow);
        }
        let func_pos = self.stack.len() - nargs - 1;
        self.do_call(func_pos, nargs, Value::Undefined)
    }

    /// Method call: looks up the property named by the key below the top
    /// `nargs` values on the object at `obj_idx`, then calls it with `this`
    /// bound to that object. The key and arguments are replaced by the
    /// result; the object itself stays where it was.
    pub fn pcall_prop(&mut self, obj_idx: i32, nargs: usize) -> Result<(), EngineError> {
        let within = self.stack.len() - self.frame_base();
        if within < nargs + 1 {
            return Err(EngineError::StackUnderflow);
        }
        let obj_pos = self.resolve(obj_idx)?;
        let key_pos = self.stack.len() - nargs - 1;
        if obj_pos >= key_pos {
            return Err(EngineError::InvalidIndex { index: obj_idx });
        }
        let target = self.target_id(obj_pos)?;
        let key = self.key_text(&self.stack[key_pos])?;

        let func = match self.lookup_in(target, &key)? {
            Some(peek) => {
                self.retain_value(&peek);
                peek
            }
            None => Value::Undefined,
        };
        self.replace_at(key_pos, func);
        let this = self.stack[obj_pos].raw_copy();
        self.retain_value(&this);
        self.do_call(key_pos, nargs, this)
    }

    fn do_call(&mut self, func_pos: usize, nargs: usize, this: Value) -> Result<(), EngineError> {
        debug_assert_eq!(func_pos + 1 + nargs, self.stack.len());
        if let Err(err) = self.limits.check_calls(self.frames.len()) {
            self.drop_value(this);
            self.flush_finalizers();
            return Err(err.into());
        }

        let callee = match &self.stack[func_pos] {
            Value::Ref(id) => match self.heap.data(*id) {
                HeapData::HostFn(host_fn) => Some((host_fn.entry, host_fn.name)),
                _ => None,
            },
            _ => None,
        };
        let Some((entry, name_id)) = callee else {
            self.drop_value(this);
            let err = ScriptError::type_error("value is not callable");
            self.unwind_call(func_pos, &err)?;
            return Err(EngineError::Script(err));
        };

        let depth = self.frames.len() + 1;
        match name_id {
            Some(id) => self.tracer.on_call(Some(self.strings.get(id)), depth),
            None => self.tracer.on_call(None, depth),
        }
        self.frames.push(Frame { base: func_pos + 1, this });

        let outcome = entry(self);

        let Frame { base, this } = self.frames.pop().expect("call frame vanished during return");
        self.drop_value(this);

        match outcome {
            Ok(ret) => {
                let result = match ret {
                    HostRet::Undefined => Value::Undefined,
                    HostRet::Top => {
                        if self.stack.len() <= base {
                            let msg = "host function returned no value";
                            let err = ScriptError::new(ErrorKind::Error, msg);
                            self.tracer.on_return(depth, false);
                            self.unwind_call(func_pos, &err)?;
                            return Err(EngineError::Script(err));
                        }
                        self.stack.pop().expect("result vanished during return")
                    }
                };
                while self.stack.len() > func_pos {
                    let value = self.stack.pop().expect("stack entry vanished during return");
                    self.drop_value(value);
                }
                self.stack.push(result);
                self.tracer.on_return(depth, true);
                self.flush_finalizers();
                Ok(())
            }
            Err(mut err) => {
                let frame_name = name_id.map_or_else(
                    || "(anonymous)".to_string(),
                    |id| self.strings.get(id).to_string(),
                );
                err.push_frame(&frame_name);
                self.tracer.on_return(depth, false);
                self.unwind_call(func_pos, &err)?;
                Err(EngineError::Script(err))
            }
        }
    }

    /// Clears the stack down to `func_pos` and pushes an error object in the
    /// vacated slot.
    fn unwind_call(&mut self, func_pos: usize, err: &ScriptError) -> Result<(), EngineError> {
        while self.stack.len() > func_pos {
            let value = self.stack.pop().expect("stack entry vanished during unwind");
            self.drop_value(value);
        }
        self.tracer.on_throw(err.kind(), err.message());
        self.push_error_object(err)?;
        self.flush_finalizers();
        Ok(())
    }

    /// Builds the stack representation of a failed call.
    ///
    /// The `name`, `message` and `stack` properties are hidden so the object
    /// JSON-encodes to `{}`, matching how engines serialize error values.
    fn push_error_object(&mut self, err: &ScriptError) -> Result<(), EngineError> {
        self.push_object()?;
        self.push_str(&err.kind().to_string())?;
        self.put_hidden_prop_str(-2, "name")?;
        self.push_str(err.message())?;
        self.put_hidden_prop_str(-2, "message")?;
        self.push_str(&err.to_string())?;
        self.put_hidden_prop_str(-2, "stack")?;
        Ok(())
    }

    /// Pushes the `this` binding of the innermost active call.
    pub fn push_this(&mut self) -> Result<(), EngineError> {
        let Some(frame) = self.frames.last() else {
            return Err(EngineError::NoActiveCall);
        };
        let peek = frame.this.raw_copy();
        self.limits.check_stack(self.stack.len(), 1)?;
        self.retain_value(&peek);
        self.stack.push(peek);
        Ok(())
    }

    /// Pushes the function currently executing.
    ///
    /// Dispatch shims lean on this to find the registration planted on the
    /// function object they were called through.
    pub fn push_current_fn(&mut self) -> Result<(), EngineError> {
        let Some(frame) = self.frames.last() else {
            return Err(EngineError::NoActiveCall);
        };
        let peek = self.stack[frame.base - 1].raw_copy();
        self.limits.check_stack(self.stack.len(), 1)?;
        self.retain_value(&peek);
        self.stack.push(peek);
        Ok(())
    }

    // ========================================================================
    // Finalizer queue
    // ========================================================================

    /// Runs every queued finalizer. Safe points call this after their own
    /// mutations are complete; the `finalizing` guard keeps the queue from
    /// being drained reentrantly while a callback is still on the stack.
    pub(crate) fn flush_finalizers(&mut self) {
        if self.finalizing || self.pending.is_empty() {
            return;
        }
        self.finalizing = true;
        while let Some(job) = self.pending.pop() {
            self.run_finalizer(job);
        }
        self.finalizing = false;
    }

    /// Calls `callback(target)` in a protected frame.
    ///
    /// The queue hands over its two references: the callback value and the
    /// artificial last reference on the target. Pushing them as the call
    /// operands transfers both to the frame, so the normal unwind either
    /// frees the target (nothing rescued it, its finalizer is already gone)
    /// or leaves it alive under the rescuer's new reference.
    fn run_finalizer(&mut self, job: PendingFinalizer) {
        let PendingFinalizer { target, callback } = job;
        if self.limits.check_stack(self.stack.len(), 2).is_err() {
            self.drop_value(callback);
            self.heap.dec_ref(target, &mut self.strings, &mut self.pending);
            return;
        }
        self.stack.push(callback);
        let func_pos = self.stack.len() - 1;
        self.stack.push(Value::Ref(target));

        let ok = match self.do_call(func_pos, 1, Value::Undefined) {
            Ok(()) => {
                let result = self.stack.pop().expect("finalizer result vanished");
                self.drop_value(result);
                true
            }
            Err(EngineError::Script(_)) => {
                // A throwing finalizer is swallowed; the error object it
                // left behind still has to come off the stack.
                let errobj = self.stack.pop().expect("finalizer error object vanished");
                self.drop_value(errobj);
                false
            }
            Err(_) => {
                // Depth or limit trouble; clear whatever part of the call
                // is still sitting above the floor.
                while self.stack.len() > func_pos {
                    let value = self.stack.pop().expect("finalizer operand vanished");
                    self.drop_value(value);
                }
                false
            }
        };
        self.tracer.on_finalizer(ok);
    }
}
