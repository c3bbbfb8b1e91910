//! The engine context: a value stack plus the heap and string table behind it.
//!
//! All host interaction goes through a [`Context`]. Values are pushed, read
//! and popped by stack index: non-negative indexes count from the bottom of
//! the current frame, negative indexes count back from the top, so `-1` is
//! always the most recently pushed value. Inside a host function call the
//! frame bottom sits at the first argument; values below it belong to the
//! caller and cannot be addressed.
//!
//! The context is single-threaded and `!Send`; embedders that want
//! parallelism run one context per thread.

use smallvec::SmallVec;

use crate::{
    buffer::FixedBuffer,
    error::EngineError,
    heap::{ArrayData, Heap, HeapData, HeapId, HeapRef, ObjectData, PendingFinalizer},
    intern::{StringId, StringTable},
    limits::Limits,
    tracer::{EngineTracer, NoopTracer},
    value::{RawPtr, Value, ValueType},
};

/// One protected call activation.
///
/// `base` is the absolute stack position of the callee's first argument; the
/// function value itself sits just below it, outside the callee's addressable
/// range. `this` is owned by the frame and dropped when it unwinds.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) base: usize,
    pub(crate) this: Value,
}

/// Point-in-time counters for a context, as reported by [`Context::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextStats {
    /// Total values on the stack, across all frames.
    pub stack_depth: usize,
    /// Nesting depth of protected calls.
    pub call_depth: usize,
    /// Live heap objects.
    pub live_objects: usize,
    /// Recycled heap slots awaiting reuse.
    pub free_slots: usize,
    /// Distinct live interned strings.
    pub interned_strings: usize,
}

/// An engine instance: value stack, heap, interned strings and limits.
///
/// The tracer is a type parameter so production embedders pay nothing for
/// the hooks; see [`crate::tracer`].
#[derive(Debug)]
pub struct Context<Tr: EngineTracer = NoopTracer> {
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: SmallVec<[Frame; 8]>,
    pub(crate) heap: Heap<Tr>,
    pub(crate) strings: StringTable,
    pub(crate) limits: Limits,
    pub(crate) tracer: Tr,
    /// Global object, allocated on first use.
    pub(crate) globals: Option<HeapId>,
    /// Finalizers waiting to run at the next safe point.
    pub(crate) pending: Vec<PendingFinalizer>,
    /// True while the finalizer queue is being flushed.
    pub(crate) finalizing: bool,
}

impl Context<NoopTracer> {
    /// Creates a context with the default bounded limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tracer_and_limits(NoopTracer, Limits::new())
    }

    /// Creates a context with custom limits.
    #[must_use]
    pub fn with_limits(limits: Limits) -> Self {
        Self::with_tracer_and_limits(NoopTracer, limits)
    }
}

impl Default for Context<NoopTracer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tr: EngineTracer> Context<Tr> {
    /// Creates a context with a custom tracer and the default limits.
    #[must_use]
    pub fn with_tracer(tracer: Tr) -> Self {
        Self::with_tracer_and_limits(tracer, Limits::new())
    }

    /// Creates a context with a custom tracer and custom limits.
    #[must_use]
    pub fn with_tracer_and_limits(tracer: Tr, limits: Limits) -> Self {
        Self {
            stack: Vec::new(),
            frames: SmallVec::new(),
            heap: Heap::new(),
            strings: StringTable::new(),
            limits,
            tracer,
            globals: None,
            pending: Vec::new(),
            finalizing: false,
        }
    }

    #[must_use]
    pub fn tracer(&self) -> &Tr {
        &self.tracer
    }

    pub fn tracer_mut(&mut self) -> &mut Tr {
        &mut self.tracer
    }

    #[must_use]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    // ========================================================================
    // Index resolution
    // ========================================================================

    pub(crate) fn frame_base(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.base)
    }

    /// Resolves a frame-relative index to an absolute stack position.
    pub(crate) fn resolve(&self, idx: i32) -> Result<usize, EngineError> {
        let base = self.frame_base();
        let within = self.stack.len() - base;
        let wide = i64::from(idx);
        if wide >= 0 {
            let offset = wide as usize;
            if offset < within {
                return Ok(base + offset);
            }
        } else {
            let back = wide.unsigned_abs() as usize;
            if back <= within {
                return Ok(self.stack.len() - back);
            }
        }
        Err(EngineError::InvalidIndex { index: idx })
    }

    /// True if `idx` names a value in the current frame.
    #[must_use]
    pub fn is_valid_index(&self, idx: i32) -> bool {
        self.resolve(idx).is_ok()
    }

    /// Number of values in the current frame.
    #[must_use]
    pub fn top(&self) -> i32 {
        i32::try_from(self.stack.len() - self.frame_base()).expect("frame depth exceeds i32")
    }

    pub(crate) fn value_at(&self, idx: i32) -> Result<&Value, EngineError> {
        let pos = self.resolve(idx)?;
        Ok(&self.stack[pos])
    }

    // ========================================================================
    // Reference discipline
    // ========================================================================

    /// Takes a reference on whatever allocation `value` names.
    pub(crate) fn retain_value(&mut self, value: &Value) {
        match value {
            Value::Str(id) => self.strings.retain(*id),
            Value::Ref(id) => self.heap.inc_ref(*id),
            _ => {}
        }
    }

    /// Copies a value, taking a new reference on its allocation.
    pub(crate) fn clone_value(&mut self, value: &Value) -> Value {
        self.retain_value(value);
        value.raw_copy()
    }

    /// Releases a value's reference. Finalizers triggered by the release are
    /// queued and run at the end of the current public operation.
    pub(crate) fn drop_value(&mut self, value: Value) {
        match value {
            Value::Str(id) => self.strings.release(id),
            Value::Ref(id) => self.heap.dec_ref(id, &mut self.strings, &mut self.pending),
            _ => {}
        }
    }

    /// Pushes an owned value, releasing it if the stack limit rejects it.
    pub(crate) fn push_value(&mut self, value: Value) -> Result<(), EngineError> {
        if let Err(err) = self.limits.check_stack(self.stack.len(), 1) {
            self.drop_value(value);
            self.flush_finalizers();
            return Err(err.into());
        }
        self.stack.push(value);
        Ok(())
    }

    /// Replaces the value at an absolute position, releasing the old one.
    pub(crate) fn replace_at(&mut self, pos: usize, value: Value) {
        let old = std::mem::replace(&mut self.stack[pos], value);
        self.drop_value(old);
    }

    pub(crate) fn intern(&mut self, text: &str) -> Result<StringId, EngineError> {
        Ok(self.strings.intern(text, &self.limits)?)
    }

    pub(crate) fn str_value(&self, id: StringId) -> &str {
        self.strings.get(id)
    }

    // ========================================================================
    // Push operations
    // ========================================================================

    pub fn push_undefined(&mut self) -> Result<(), EngineError> {
        self.push_value(Value::Undefined)
    }

    pub fn push_null(&mut self) -> Result<(), EngineError> {
        self.push_value(Value::Null)
    }

    pub fn push_bool(&mut self, value: bool) -> Result<(), EngineError> {
        self.push_value(Value::Bool(value))
    }

    /// Pushes an integer as a number.
    ///
    /// Numbers are f64, so magnitudes above 2^53 lose precision.
    pub fn push_int(&mut self, value: i64) -> Result<(), EngineError> {
        self.push_value(Value::Number(value as f64))
    }

    pub fn push_number(&mut self, value: f64) -> Result<(), EngineError> {
        self.push_value(Value::Number(value))
    }

    pub fn push_str(&mut self, text: &str) -> Result<(), EngineError> {
        self.limits.check_stack(self.stack.len(), 1)?;
        let id = self.intern(text)?;
        self.stack.push(Value::Str(id));
        Ok(())
    }

    /// Pushes a native pointer as an immediate value.
    pub fn push_ptr(&mut self, ptr: RawPtr) -> Result<(), EngineError> {
        self.push_value(Value::Ptr(ptr))
    }

    /// Pushes a zero-filled fixed buffer and returns a writable view of it.
    ///
    /// The view borrows the context; finish writing before issuing further
    /// engine calls.
    pub fn push_fixed_buffer(&mut self, len: usize) -> Result<&mut [u8], EngineError> {
        self.limits.check_stack(self.stack.len(), 1)?;
        self.limits.check_buffer_bytes(len)?;
        let id = self.heap.allocate(HeapData::Buffer(FixedBuffer::zeroed(len)), &self.limits)?;
        self.stack.push(Value::Ref(id));
        match self.heap.data_mut(id) {
            HeapData::Buffer(buffer) => Ok(buffer.as_mut_slice()),
            _ => unreachable!("freshly allocated buffer slot holds buffer data"),
        }
    }

    /// Pushes a fixed buffer holding a copy of `data`.
    pub fn push_bytes(&mut self, data: &[u8]) -> Result<(), EngineError> {
        self.limits.check_stack(self.stack.len(), 1)?;
        self.limits.check_buffer_bytes(data.len())?;
        let id = self
            .heap
            .allocate(HeapData::Buffer(FixedBuffer::from_slice(data)), &self.limits)?;
        self.stack.push(Value::Ref(id));
        Ok(())
    }

    pub fn push_object(&mut self) -> Result<(), EngineError> {
        self.limits.check_stack(self.stack.len(), 1)?;
        let id = self.heap.allocate(HeapData::Object(ObjectData::default()), &self.limits)?;
        self.stack.push(Value::Ref(id));
        Ok(())
    }

    pub fn push_array(&mut self) -> Result<(), EngineError> {
        self.limits.check_stack(self.stack.len(), 1)?;
        let id = self.heap.allocate(HeapData::Array(ArrayData::default()), &self.limits)?;
        self.stack.push(Value::Ref(id));
        Ok(())
    }

    /// Pushes the global object, creating it on first use.
    pub fn push_global_object(&mut self) -> Result<(), EngineError> {
        self.limits.check_stack(self.stack.len(), 1)?;
        let id = self.globals_id()?;
        self.heap.inc_ref(id);
        self.stack.push(Value::Ref(id));
        Ok(())
    }

    pub(crate) fn globals_id(&mut self) -> Result<HeapId, EngineError> {
        if let Some(id) = self.globals {
            return Ok(id);
        }
        let id = self.heap.allocate(HeapData::Object(ObjectData::default()), &self.limits)?;
        self.globals = Some(id);
        Ok(id)
    }

    // ========================================================================
    // Stack shuffling
    // ========================================================================

    /// Pops the top value of the current frame.
    pub fn pop(&mut self) -> Result<(), EngineError> {
        self.pop_n(1)
    }

    /// Pops the top `count` values of the current frame.
    pub fn pop_n(&mut self, count: usize) -> Result<(), EngineError> {
        let within = self.stack.len() - self.frame_base();
        if count > within {
            return Err(EngineError::StackUnderflow);
        }
        for _ in 0..count {
            let value = self.stack.pop().expect("stack entry vanished during pop");
            self.drop_value(value);
        }
        self.flush_finalizers();
        Ok(())
    }

    /// Pushes a copy of the value at `idx`.
    pub fn dup(&mut self, idx: i32) -> Result<(), EngineError> {
        let pos = self.resolve(idx)?;
        self.limits.check_stack(self.stack.len(), 1)?;
        let copy = self.stack[pos].raw_copy();
        self.retain_value(&copy);
        self.stack.push(copy);
        Ok(())
    }

    /// Removes the value at `idx`, shifting the values above it down.
    pub fn remove(&mut self, idx: i32) -> Result<(), EngineError> {
        let pos = self.resolve(idx)?;
        let value = self.stack.remove(pos);
        self.drop_value(value);
        self.flush_finalizers();
        Ok(())
    }

    /// Moves the top value to `idx`, shifting the values above it up.
    /// `insert(-1)` is a no-op.
    pub fn insert(&mut self, idx: i32) -> Result<(), EngineError> {
        let pos = self.resolve(idx)?;
        let value = self.stack.pop().expect("resolved index implies a non-empty frame");
        self.stack.insert(pos, value);
        Ok(())
    }

    // ========================================================================
    // Type inspection
    // ========================================================================

    pub(crate) fn type_of_value(&self, value: &Value) -> ValueType {
        match value {
            Value::Undefined => ValueType::Undefined,
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Boolean,
            Value::Number(_) => ValueType::Number,
            Value::Str(_) => ValueType::String,
            Value::Ptr(_) => ValueType::Pointer,
            Value::Ref(id) => match self.heap.data(*id) {
                HeapData::Buffer(_) => ValueType::Buffer,
                _ => ValueType::Object,
            },
        }
    }

    /// Type of the value at `idx`, or [`ValueType::None`] for an invalid
    /// index. This is the one inspection call that never fails.
    #[must_use]
    pub fn type_of(&self, idx: i32) -> ValueType {
        match self.resolve(idx) {
            Ok(pos) => self.type_of_value(&self.stack[pos]),
            Err(_) => ValueType::None,
        }
    }

    #[must_use]
    pub fn is_undefined(&self, idx: i32) -> bool {
        self.type_of(idx) == ValueType::Undefined
    }

    #[must_use]
    pub fn is_null(&self, idx: i32) -> bool {
        self.type_of(idx) == ValueType::Null
    }

    #[must_use]
    pub fn is_null_or_undefined(&self, idx: i32) -> bool {
        matches!(self.type_of(idx), ValueType::Null | ValueType::Undefined)
    }

    #[must_use]
    pub fn is_bool(&self, idx: i32) -> bool {
        self.type_of(idx) == ValueType::Boolean
    }

    #[must_use]
    pub fn is_number(&self, idx: i32) -> bool {
        self.type_of(idx) == ValueType::Number
    }

    #[must_use]
    pub fn is_string(&self, idx: i32) -> bool {
        self.type_of(idx) == ValueType::String
    }

    #[must_use]
    pub fn is_buffer(&self, idx: i32) -> bool {
        self.type_of(idx) == ValueType::Buffer
    }

    #[must_use]
    pub fn is_pointer(&self, idx: i32) -> bool {
        self.type_of(idx) == ValueType::Pointer
    }

    /// True for objects, arrays, host functions and enumerators.
    #[must_use]
    pub fn is_object(&self, idx: i32) -> bool {
        match self.resolve(idx) {
            Ok(pos) => match &self.stack[pos] {
                Value::Ref(id) => !matches!(self.heap.data(*id), HeapData::Buffer(_)),
                _ => false,
            },
            Err(_) => false,
        }
    }

    #[must_use]
    pub fn is_array(&self, idx: i32) -> bool {
        match self.resolve(idx) {
            Ok(pos) => match &self.stack[pos] {
                Value::Ref(id) => matches!(self.heap.data(*id), HeapData::Array(_)),
                _ => false,
            },
            Err(_) => false,
        }
    }

    #[must_use]
    pub fn is_function(&self, idx: i32) -> bool {
        match self.resolve(idx) {
            Ok(pos) => match &self.stack[pos] {
                Value::Ref(id) => matches!(self.heap.data(*id), HeapData::HostFn(_)),
                _ => false,
            },
            Err(_) => false,
        }
    }

    // ========================================================================
    // Strict accessors
    // ========================================================================

    pub fn get_bool(&self, idx: i32) -> Result<bool, EngineError> {
        match self.value_at(idx)? {
            Value::Bool(b) => Ok(*b),
            other => Err(self.wrong_type("boolean", other)),
        }
    }

    pub fn get_number(&self, idx: i32) -> Result<f64, EngineError> {
        match self.value_at(idx)? {
            Value::Number(n) => Ok(*n),
            other => Err(self.wrong_type("number", other)),
        }
    }

    /// Reads a number and truncates it toward zero, saturating at the i64
    /// range. NaN reads as zero.
    pub fn get_int(&self, idx: i32) -> Result<i64, EngineError> {
        let n = self.get_number(idx)?;
        if n.is_nan() { Ok(0) } else { Ok(n as i64) }
    }

    pub fn get_str(&self, idx: i32) -> Result<&str, EngineError> {
        match self.value_at(idx)? {
            Value::Str(id) => Ok(self.strings.get(*id)),
            other => Err(self.wrong_type("string", other)),
        }
    }

    pub fn get_ptr(&self, idx: i32) -> Result<RawPtr, EngineError> {
        match self.value_at(idx)? {
            Value::Ptr(p) => Ok(*p),
            other => Err(self.wrong_type("pointer", other)),
        }
    }

    /// Borrows the bytes of the buffer at `idx` without coercing.
    pub fn get_bytes(&self, idx: i32) -> Result<&[u8], EngineError> {
        match self.value_at(idx)? {
            Value::Ref(id) => match self.heap.data(*id) {
                HeapData::Buffer(buffer) => Ok(buffer.as_slice()),
                _ => Err(EngineError::WrongType {
                    expected: "buffer",
                    found: ValueType::Object,
                }),
            },
            other => Err(self.wrong_type("buffer", other)),
        }
    }

    /// Mutably borrows the bytes of the buffer at `idx` without coercing.
    pub fn get_bytes_mut(&mut self, idx: i32) -> Result<&mut [u8], EngineError> {
        let pos = self.resolve(idx)?;
        match &self.stack[pos] {
            Value::Ref(id) => {
                let id = *id;
                match self.heap.data_mut(id) {
                    HeapData::Buffer(buffer) => Ok(buffer.as_mut_slice()),
                    _ => Err(EngineError::WrongType {
                        expected: "buffer",
                        found: ValueType::Object,
                    }),
                }
            }
            other => Err(EngineError::WrongType {
                expected: "buffer",
                found: self.type_of_value(other),
            }),
        }
    }

    /// Length of the value at `idx`: element count for arrays, scalar count
    /// for strings, byte count for buffers, zero for everything else.
    pub fn get_length(&self, idx: i32) -> Result<usize, EngineError> {
        match self.value_at(idx)? {
            Value::Str(id) => Ok(self.strings.get(*id).chars().count()),
            Value::Ref(id) => match self.heap.data(*id) {
                HeapData::Array(array) => Ok(array.items.len()),
                HeapData::Buffer(buffer) => Ok(buffer.len()),
                _ => Ok(0),
            },
            _ => Ok(0),
        }
    }

    pub(crate) fn wrong_type(&self, expected: &'static str, found: &Value) -> EngineError {
        EngineError::WrongType {
            expected,
            found: self.type_of_value(found),
        }
    }

    // ========================================================================
    // Host pins
    // ========================================================================

    /// Pins the heap object at `idx` so the host can hold it across stack
    /// operations.
    pub fn heap_ref(&mut self, idx: i32) -> Result<HeapRef, EngineError> {
        let pos = self.resolve(idx)?;
        match &self.stack[pos] {
            Value::Ref(id) => {
                let id = *id;
                self.heap.inc_ref(id);
                Ok(HeapRef { id })
            }
            other => Err(self.wrong_type("object", other)),
        }
    }

    /// Pushes the pinned object back onto the stack.
    pub fn push_heap_ref(&mut self, pin: &HeapRef) -> Result<(), EngineError> {
        self.limits.check_stack(self.stack.len(), 1)?;
        self.heap.inc_ref(pin.id);
        self.stack.push(Value::Ref(pin.id));
        Ok(())
    }

    /// Releases a pin, allowing the object to be collected.
    pub fn release_ref(&mut self, pin: HeapRef) {
        self.heap.dec_ref(pin.id, &mut self.strings, &mut self.pending);
        self.flush_finalizers();
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    #[must_use]
    pub fn stats(&self) -> ContextStats {
        ContextStats {
            stack_depth: self.stack.len(),
            call_depth: self.frames.len(),
            live_objects: self.heap.live(),
            free_slots: self.heap.free_slots(),
            interned_strings: self.strings.live(),
        }
    }

    /// Renders the current frame's stack for debugging, top last.
    #[must_use]
    pub fn dump(&self) -> String {
        use std::fmt::Write;

        let base = self.frame_base();
        let mut out = format!("ctx: top={}, stack=[", self.top());
        for (i, value) in self.stack[base..].iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}", self.short_repr(value));
        }
        out.push(']');
        out
    }

    pub(crate) fn short_repr(&self, value: &Value) -> String {
        match value {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => crate::coerce::number_text(*n),
            Value::Str(id) => {
                let text = self.strings.get(*id);
                let escaped: String = text
                    .chars()
                    .flat_map(|c| match c {
                        '"' | '\\' => vec!['\\', c],
                        '\n' => vec!['\\', 'n'],
                        c => vec![c],
                    })
                    .collect();
                format!("\"{escaped}\"")
            }
            Value::Ptr(p) => {
                if p.is_null() {
                    "pointer:null".to_string()
                } else {
                    format!("pointer:0x{:x}", p.addr())
                }
            }
            Value::Ref(id) => match self.heap.data(*id) {
                HeapData::Object(object) => format!("{{obj:{}}}", object.props.len()),
                HeapData::Array(array) => format!("[arr:{}]", array.items.len()),
                HeapData::Buffer(buffer) => {
                    let bytes = buffer.as_slice();
                    let shown: Vec<String> =
                        bytes.iter().take(16).map(|b| format!("{b:02x}")).collect();
                    let ellipsis = if bytes.len() > 16 { ".." } else { "" };
                    format!("|{}{}|", shown.join(" "), ellipsis)
                }
                HeapData::HostFn(host_fn) => match host_fn.name {
                    Some(name) => format!("function:{}", self.strings.get(name)),
                    None => "function:anon".to_string(),
                },
                HeapData::Enumerator(_) => "[enum]".to_string(),
            },
        }
    }
}

impl<Tr: EngineTracer> Drop for Context<Tr> {
    /// Tears the engine down: unwinds the stack, runs every remaining
    /// finalizer exactly once, then drops the arena wholesale so cycles are
    /// reclaimed too.
    fn drop(&mut self) {
        while let Some(frame) = self.frames.pop() {
            self.drop_value(frame.this);
        }
        while let Some(value) = self.stack.pop() {
            self.drop_value(value);
        }
        if let Some(id) = self.globals.take() {
            self.heap.dec_ref(id, &mut self.strings, &mut self.pending);
        }
        self.flush_finalizers();
        self.heap.queue_all_finalizers(&mut self.pending);
        self.flush_finalizers();
        self.heap.clear_all();
    }
}
