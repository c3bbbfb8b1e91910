//! Property access, prototypes, finalizer wiring and enumeration.
//!
//! Keys coerce to text the same way `to_str` does, so a numeric key `5`
//! and the string `"5"` address the same slot. Arrays and buffers treat
//! canonical index text (`"0"`, `"17"`, no leading zeros) as element access
//! and expose a read-only `length`.
//!
//! Operand protocol: the stack-borne operands of an operation (the key, or
//! key plus value) are consumed once the target and key have resolved, on
//! success and on failure alike. Errors raised before that point, such as an
//! invalid index or a non-object target, leave the stack untouched. The
//! `_str` conveniences validate the target before pushing their internal
//! key, so they fail the same way.

use ahash::AHashSet;

use crate::{
    context::Context,
    error::{EngineError, ScriptError},
    heap::{EnumeratorData, HeapData, HeapId, Prop},
    intern::StringId,
    tracer::EngineTracer,
    value::{Value, ValueType},
};

/// Upper bound on prototype chain walks. Cycles are rejected when a chain is
/// built, so this only guards against pathological-depth chains.
const PROTO_DEPTH_MAX: usize = 1_000;

/// Canonical array index text: `"0"`, or digits without a leading zero,
/// fitting in u32.
fn index_from_text(text: &str) -> Option<u32> {
    if text == "0" {
        return Some(0);
    }
    let bytes = text.as_bytes();
    if bytes.is_empty() || bytes[0] == b'0' || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    text.parse::<u32>().ok()
}

/// Selects which keys an enumerator snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnumFlags {
    /// Include properties stored with `put_hidden_prop`.
    pub include_hidden: bool,
}

impl<Tr: EngineTracer> Context<Tr> {
    pub(crate) fn key_text(&self, value: &Value) -> Result<String, EngineError> {
        if let Value::Str(id) = value {
            return Ok(self.str_value(*id).to_string());
        }
        let mut visited = AHashSet::new();
        self.stringify_value(value, &mut visited, 0)
    }

    pub(crate) fn target_id(&self, pos: usize) -> Result<HeapId, EngineError> {
        match &self.stack[pos] {
            Value::Ref(id) => Ok(*id),
            Value::Undefined => {
                Err(ScriptError::type_error("cannot access property of undefined").into())
            }
            Value::Null => Err(ScriptError::type_error("cannot access property of null").into()),
            other => Err(self.wrong_type("object", other)),
        }
    }

    /// Own-or-inherited property lookup, returning an unretained peek.
    pub(crate) fn lookup_in(&self, start: HeapId, key: &str) -> Result<Option<Value>, EngineError> {
        let mut cur = start;
        for _ in 0..PROTO_DEPTH_MAX {
            match self.heap.data(cur) {
                HeapData::Object(object) => {
                    if let Some(id) = self.strings.find(key)
                        && let Some(prop) = object.props.get(&id)
                    {
                        return Ok(Some(prop.value.raw_copy()));
                    }
                    match object.proto {
                        Some(proto) => cur = proto,
                        None => return Ok(None),
                    }
                }
                HeapData::Array(array) => {
                    if key == "length" {
                        return Ok(Some(Value::Number(array.items.len() as f64)));
                    }
                    return Ok(index_from_text(key)
                        .and_then(|i| array.items.get(i as usize))
                        .map(Value::raw_copy));
                }
                HeapData::Buffer(buffer) => {
                    if key == "length" {
                        return Ok(Some(Value::Number(buffer.len() as f64)));
                    }
                    return Ok(index_from_text(key)
                        .and_then(|i| buffer.as_slice().get(i as usize))
                        .map(|byte| Value::Number(f64::from(*byte))));
                }
                HeapData::HostFn(host_fn) => {
                    if let Some(id) = self.strings.find(key)
                        && let Some(prop) = host_fn.props.get(&id)
                    {
                        return Ok(Some(prop.value.raw_copy()));
                    }
                    if key == "name" {
                        return Ok(host_fn.name.map(Value::Str));
                    }
                    return Ok(None);
                }
                HeapData::Enumerator(_) => return Ok(None),
            }
        }
        Err(ScriptError::type_error("prototype chain too deep").into())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Pops the key at the top and pushes the property value from the object
    /// at `obj_idx`. Returns whether the property existed; a miss pushes
    /// undefined.
    pub fn get_prop(&mut self, obj_idx: i32) -> Result<bool, EngineError> {
        let obj_pos = self.resolve(obj_idx)?;
        self.get_prop_at(obj_pos)
    }

    /// Like [`Context::get_prop`] with the key supplied directly.
    pub fn get_prop_str(&mut self, obj_idx: i32, key: &str) -> Result<bool, EngineError> {
        let obj_pos = self.resolve(obj_idx)?;
        self.target_id(obj_pos)?;
        self.push_str(key)?;
        self.get_prop_at(obj_pos)
    }

    fn get_prop_at(&mut self, obj_pos: usize) -> Result<bool, EngineError> {
        let key_pos = self.resolve(-1)?;
        let target = self.target_id(obj_pos)?;
        let key = self.key_text(&self.stack[key_pos])?;

        let key_value = self.stack.pop().expect("key vanished during get_prop");
        self.drop_value(key_value);

        let peek = self.lookup_in(target, &key)?;
        let (found, result) = match peek {
            Some(value) => (true, value),
            None => (false, Value::Undefined),
        };
        self.retain_value(&result);
        self.stack.push(result);
        self.flush_finalizers();
        Ok(found)
    }

    /// Pops the key at the top; returns whether the object at `obj_idx` has
    /// that property, own or inherited.
    pub fn has_prop(&mut self, obj_idx: i32) -> Result<bool, EngineError> {
        let obj_pos = self.resolve(obj_idx)?;
        self.has_prop_at(obj_pos)
    }

    pub fn has_prop_str(&mut self, obj_idx: i32, key: &str) -> Result<bool, EngineError> {
        let obj_pos = self.resolve(obj_idx)?;
        self.target_id(obj_pos)?;
        self.push_str(key)?;
        self.has_prop_at(obj_pos)
    }

    fn has_prop_at(&mut self, obj_pos: usize) -> Result<bool, EngineError> {
        let key_pos = self.resolve(-1)?;
        let target = self.target_id(obj_pos)?;
        let key = self.key_text(&self.stack[key_pos])?;

        let key_value = self.stack.pop().expect("key vanished during has_prop");
        self.drop_value(key_value);

        let existed = self.lookup_in(target, &key)?.is_some();
        self.flush_finalizers();
        Ok(existed)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Pops `[key, value]` from the top and stores the value as an enumerable
    /// own property of the object at `obj_idx`.
    pub fn put_prop(&mut self, obj_idx: i32) -> Result<(), EngineError> {
        let obj_pos = self.resolve(obj_idx)?;
        self.put_prop_at(obj_pos, true)
    }

    /// Like [`Context::put_prop`] with the key supplied directly; pops only
    /// the value.
    pub fn put_prop_str(&mut self, obj_idx: i32, key: &str) -> Result<(), EngineError> {
        let obj_pos = self.resolve(obj_idx)?;
        self.target_id(obj_pos)?;
        self.push_str(key)?;
        self.insert(-2)?;
        self.put_prop_at(obj_pos, true)
    }

    /// Stores a non-enumerable own property. Hidden properties are invisible
    /// to enumeration and JSON encoding but read and delete normally.
    pub fn put_hidden_prop(&mut self, obj_idx: i32) -> Result<(), EngineError> {
        let obj_pos = self.resolve(obj_idx)?;
        self.put_prop_at(obj_pos, false)
    }

    pub fn put_hidden_prop_str(&mut self, obj_idx: i32, key: &str) -> Result<(), EngineError> {
        let obj_pos = self.resolve(obj_idx)?;
        self.target_id(obj_pos)?;
        self.push_str(key)?;
        self.insert(-2)?;
        self.put_prop_at(obj_pos, false)
    }

    fn put_prop_at(&mut self, obj_pos: usize, enumerable: bool) -> Result<(), EngineError> {
        let value_pos = self.resolve(-1)?;
        let key_pos = self.resolve(-2)?;
        if obj_pos == value_pos {
            return Err(EngineError::InvalidIndex { index: -1 });
        }
        if obj_pos == key_pos {
            return Err(EngineError::InvalidIndex { index: -2 });
        }
        let target = self.target_id(obj_pos)?;
        let key = self.key_text(&self.stack[key_pos])?;

        let value = self.stack.pop().expect("value vanished during put_prop");
        let key_value = self.stack.pop().expect("key vanished during put_prop");
        self.drop_value(key_value);

        let outcome = self.store(target, &key, value, enumerable);
        self.flush_finalizers();
        outcome
    }

    /// Stores `value` on `target`, consuming the value's reference even when
    /// the store is rejected.
    fn store(
        &mut self,
        target: HeapId,
        key: &str,
        value: Value,
        enumerable: bool,
    ) -> Result<(), EngineError> {
        enum Kind {
            Table,
            Array,
            Buffer,
            Plain,
        }
        let kind = match self.heap.data(target) {
            HeapData::Object(_) | HeapData::HostFn(_) => Kind::Table,
            HeapData::Array(_) => Kind::Array,
            HeapData::Buffer(_) => Kind::Buffer,
            HeapData::Enumerator(_) => Kind::Plain,
        };

        match kind {
            Kind::Table => {
                let id = match self.intern(key) {
                    Ok(id) => id,
                    Err(err) => {
                        self.drop_value(value);
                        return Err(err);
                    }
                };
                let prop = Prop { value, enumerable };
                let old = match self.heap.data_mut(target) {
                    HeapData::Object(object) => object.props.insert(id, prop),
                    HeapData::HostFn(host_fn) => host_fn.props.insert(id, prop),
                    _ => unreachable!("table target changed kind during store"),
                };
                if let Some(old) = old {
                    // The table already owned the key; drop the fresh ref.
                    self.strings.release(id);
                    self.drop_value(old.value);
                }
                Ok(())
            }
            Kind::Array => {
                if key == "length" {
                    return self.store_array_length(target, value);
                }
                let Some(index) = index_from_text(key) else {
                    self.drop_value(value);
                    return Err(ScriptError::type_error(format!(
                        "array property must be an index or length, got \"{key}\""
                    ))
                    .into());
                };
                let index = index as usize;
                let len = match self.heap.data(target) {
                    HeapData::Array(array) => array.items.len(),
                    _ => unreachable!("array target changed kind during store"),
                };
                if index >= len
                    && let Err(err) = self.limits.check_array_elems(index + 1)
                {
                    self.drop_value(value);
                    return Err(err.into());
                }
                let old = match self.heap.data_mut(target) {
                    HeapData::Array(array) => {
                        if index >= array.items.len() {
                            array.items.resize_with(index + 1, || Value::Undefined);
                        }
                        std::mem::replace(&mut array.items[index], value)
                    }
                    _ => unreachable!("array target changed kind during store"),
                };
                self.drop_value(old);
                Ok(())
            }
            Kind::Buffer => {
                let Some(index) = index_from_text(key) else {
                    self.drop_value(value);
                    return Err(ScriptError::type_error(format!(
                        "buffer property must be an index, got \"{key}\""
                    ))
                    .into());
                };
                let byte = match value {
                    Value::Number(n) if !n.is_nan() => (n as i64 & 0xff) as u8,
                    Value::Number(_) => 0,
                    other => {
                        let err = self.wrong_type("number", &other);
                        self.drop_value(other);
                        return Err(err);
                    }
                };
                if let HeapData::Buffer(buffer) = self.heap.data_mut(target)
                    && let Some(slot) = buffer.as_mut_slice().get_mut(index as usize)
                {
                    *slot = byte;
                }
                // Out-of-range buffer writes are dropped silently.
                Ok(())
            }
            Kind::Plain => {
                self.drop_value(value);
                Err(EngineError::WrongType {
                    expected: "object, array, buffer or function",
                    found: ValueType::Object,
                })
            }
        }
    }

    fn store_array_length(&mut self, target: HeapId, value: Value) -> Result<(), EngineError> {
        let new_len = match value {
            Value::Number(n) if n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => {
                n as usize
            }
            other => {
                let err = self.wrong_type("array length", &other);
                self.drop_value(other);
                return Err(err);
            }
        };
        let len = match self.heap.data(target) {
            HeapData::Array(array) => array.items.len(),
            _ => unreachable!("array target changed kind during length store"),
        };
        if new_len > len {
            self.limits.check_array_elems(new_len)?;
        }
        let removed: Vec<Value> = match self.heap.data_mut(target) {
            HeapData::Array(array) => {
                if new_len >= array.items.len() {
                    array.items.resize_with(new_len, || Value::Undefined);
                    Vec::new()
                } else {
                    array.items.drain(new_len..).collect()
                }
            }
            _ => unreachable!("array target changed kind during length store"),
        };
        for item in removed {
            self.drop_value(item);
        }
        Ok(())
    }

    /// Pops the value at the top and appends it to the array at `arr_idx`.
    pub fn array_append(&mut self, arr_idx: i32) -> Result<(), EngineError> {
        let top_pos = self.resolve(-1)?;
        let arr_pos = self.resolve(arr_idx)?;
        if arr_pos == top_pos {
            return Err(EngineError::InvalidIndex { index: arr_idx });
        }
        let target = self.target_id(arr_pos)?;
        let len = match self.heap.data(target) {
            HeapData::Array(array) => array.items.len(),
            _ => {
                let found = self.type_of_value(&self.stack[arr_pos]);
                return Err(EngineError::WrongType { expected: "array", found });
            }
        };
        self.limits.check_array_elems(len + 1)?;
        let value = self.stack.pop().expect("value vanished during array_append");
        match self.heap.data_mut(target) {
            HeapData::Array(array) => array.items.push(value),
            _ => unreachable!("array target changed kind during append"),
        }
        Ok(())
    }

    /// Pops the key at the top and removes that own property. Returns true
    /// when something was actually removed; deleting an array element leaves
    /// an undefined hole without changing the length.
    pub fn delete_prop(&mut self, obj_idx: i32) -> Result<bool, EngineError> {
        let obj_pos = self.resolve(obj_idx)?;
        self.delete_prop_at(obj_pos)
    }

    pub fn delete_prop_str(&mut self, obj_idx: i32, key: &str) -> Result<bool, EngineError> {
        let obj_pos = self.resolve(obj_idx)?;
        self.target_id(obj_pos)?;
        self.push_str(key)?;
        self.delete_prop_at(obj_pos)
    }

    fn delete_prop_at(&mut self, obj_pos: usize) -> Result<bool, EngineError> {
        let key_pos = self.resolve(-1)?;
        let target = self.target_id(obj_pos)?;
        let key = self.key_text(&self.stack[key_pos])?;

        let key_value = self.stack.pop().expect("key vanished during delete_prop");
        self.drop_value(key_value);

        let removed = match self.heap.data(target) {
            HeapData::Object(_) | HeapData::HostFn(_) => {
                let found = self.strings.find(&key);
                match found {
                    Some(id) => {
                        let taken = match self.heap.data_mut(target) {
                            HeapData::Object(object) => object.props.shift_remove(&id),
                            HeapData::HostFn(host_fn) => host_fn.props.shift_remove(&id),
                            _ => unreachable!("table target changed kind during delete"),
                        };
                        match taken {
                            Some(prop) => {
                                self.strings.release(id);
                                self.drop_value(prop.value);
                                true
                            }
                            None => false,
                        }
                    }
                    None => false,
                }
            }
            HeapData::Array(_) => {
                let slot = index_from_text(&key).map(|i| i as usize);
                match self.heap.data_mut(target) {
                    HeapData::Array(array) => match slot {
                        Some(index) if index < array.items.len() => {
                            let old = std::mem::replace(&mut array.items[index], Value::Undefined);
                            let existed = !matches!(old, Value::Undefined);
                            self.drop_value(old);
                            existed
                        }
                        _ => false,
                    },
                    _ => unreachable!("array target changed kind during delete"),
                }
            }
            HeapData::Buffer(_) | HeapData::Enumerator(_) => false,
        };
        self.flush_finalizers();
        Ok(removed)
    }

    // ========================================================================
    // Globals
    // ========================================================================

    /// Reads a property of the global object and pushes it. Returns whether
    /// it existed.
    pub fn get_global_str(&mut self, key: &str) -> Result<bool, EngineError> {
        self.push_global_object()?;
        let found = self.get_prop_str(-1, key)?;
        self.remove(-2)?;
        Ok(found)
    }

    /// Pops the value at the top and stores it as a global.
    pub fn put_global_str(&mut self, key: &str) -> Result<(), EngineError> {
        self.push_global_object()?;
        self.insert(-2)?;
        self.put_prop_str(-2, key)?;
        self.pop()
    }

    pub fn delete_global_str(&mut self, key: &str) -> Result<bool, EngineError> {
        self.push_global_object()?;
        let removed = self.delete_prop_str(-1, key)?;
        self.pop()?;
        Ok(removed)
    }

    // ========================================================================
    // Prototypes
    // ========================================================================

    /// Pops the value at the top (a plain object or null) and installs it as
    /// the prototype of the object at `obj_idx`. Chains that would form a
    /// cycle are rejected.
    pub fn set_prototype(&mut self, obj_idx: i32) -> Result<(), EngineError> {
        let proto_pos = self.resolve(-1)?;
        let obj_pos = self.resolve(obj_idx)?;
        if obj_pos == proto_pos {
            return Err(EngineError::InvalidIndex { index: obj_idx });
        }
        let target = self.target_id(obj_pos)?;
        if !matches!(self.heap.data(target), HeapData::Object(_)) {
            return Err(EngineError::WrongType {
                expected: "plain object",
                found: ValueType::Object,
            });
        }
        let proto = match &self.stack[proto_pos] {
            Value::Null => None,
            Value::Ref(id) if matches!(self.heap.data(*id), HeapData::Object(_)) => Some(*id),
            other => return Err(self.wrong_type("plain object or null", other)),
        };

        if let Some(start) = proto {
            let mut cur = Some(start);
            let mut hops = 0;
            while let Some(id) = cur {
                if id == target {
                    let err = ScriptError::type_error("prototype chain would contain a cycle");
                    return Err(err.into());
                }
                hops += 1;
                if hops > PROTO_DEPTH_MAX {
                    return Err(ScriptError::type_error("prototype chain too deep").into());
                }
                cur = match self.heap.data(id) {
                    HeapData::Object(object) => object.proto,
                    _ => None,
                };
            }
        }

        // Transfer the stack's reference straight into the proto link.
        let proto_value = self.stack.pop().expect("prototype vanished during set_prototype");
        let new_proto = match proto_value {
            Value::Null => None,
            Value::Ref(id) => Some(id),
            _ => unreachable!("prototype operand changed during set_prototype"),
        };
        let old = match self.heap.data_mut(target) {
            HeapData::Object(object) => std::mem::replace(&mut object.proto, new_proto),
            _ => unreachable!("object target changed kind during set_prototype"),
        };
        if let Some(old_id) = old {
            self.heap.dec_ref(old_id, &mut self.strings, &mut self.pending);
        }
        self.flush_finalizers();
        Ok(())
    }

    /// Pushes the prototype of the object at `obj_idx`, or null if it has
    /// none.
    pub fn get_prototype(&mut self, obj_idx: i32) -> Result<(), EngineError> {
        self.limits.check_stack(self.stack.len(), 1)?;
        let obj_pos = self.resolve(obj_idx)?;
        let target = self.target_id(obj_pos)?;
        let proto = match self.heap.data(target) {
            HeapData::Object(object) => object.proto,
            _ => {
                return Err(EngineError::WrongType {
                    expected: "plain object",
                    found: ValueType::Object,
                });
            }
        };
        match proto {
            Some(id) => {
                self.heap.inc_ref(id);
                self.stack.push(Value::Ref(id));
            }
            None => self.stack.push(Value::Null),
        }
        Ok(())
    }

    // ========================================================================
    // Finalizers
    // ========================================================================

    /// Pops the callback at the top (a function, or undefined/null to clear)
    /// and installs it as the finalizer of the object at `obj_idx`.
    ///
    /// The callback runs exactly once with the object as its argument, at
    /// the engine's next safe point after the last reference drops, or at
    /// context teardown. Re-rescuing the object from inside the callback
    /// keeps it alive but the finalizer does not re-arm.
    pub fn set_finalizer(&mut self, obj_idx: i32) -> Result<(), EngineError> {
        let cb_pos = self.resolve(-1)?;
        let obj_pos = self.resolve(obj_idx)?;
        if obj_pos == cb_pos {
            return Err(EngineError::InvalidIndex { index: obj_idx });
        }
        let target = self.target_id(obj_pos)?;
        match &self.stack[cb_pos] {
            Value::Undefined | Value::Null => {}
            Value::Ref(id) if matches!(self.heap.data(*id), HeapData::HostFn(_)) => {}
            other => return Err(self.wrong_type("function", other)),
        }

        let callback = self.stack.pop().expect("callback vanished during set_finalizer");
        let old = match callback {
            Value::Undefined | Value::Null => self.heap.set_finalizer(target, None),
            callback @ Value::Ref(_) => self.heap.set_finalizer(target, Some(callback)),
            _ => unreachable!("callback operand changed during set_finalizer"),
        };
        if let Some(old) = old {
            self.drop_value(old);
        }
        self.flush_finalizers();
        Ok(())
    }

    /// Pushes the current finalizer of the object at `obj_idx`, or undefined.
    pub fn get_finalizer(&mut self, obj_idx: i32) -> Result<(), EngineError> {
        self.limits.check_stack(self.stack.len(), 1)?;
        let obj_pos = self.resolve(obj_idx)?;
        let target = self.target_id(obj_pos)?;
        let peek = self.heap.finalizer_peek(target);
        let value = match peek {
            Some(value) => {
                self.retain_value(&value);
                value
            }
            None => Value::Undefined,
        };
        self.stack.push(value);
        Ok(())
    }

    // ========================================================================
    // Enumeration
    // ========================================================================

    /// Pushes an enumerator over the object at `obj_idx`.
    ///
    /// The key list is a snapshot: keys added after this call are not
    /// visited, and keys deleted after it yield undefined from
    /// [`Context::next`]. Objects and host functions enumerate their own
    /// property keys in insertion order (the prototype chain is not walked),
    /// arrays enumerate their index keys, buffers enumerate nothing.
    pub fn enumerate(&mut self, obj_idx: i32, flags: EnumFlags) -> Result<(), EngineError> {
        self.limits.check_stack(self.stack.len(), 1)?;
        self.limits.check_heap_objects(self.heap.live())?;
        let obj_pos = self.resolve(obj_idx)?;
        let target = self.target_id(obj_pos)?;

        enum Snapshot {
            Peeked(Vec<StringId>),
            ArrayLen(usize),
        }
        let table_keys = |props: &crate::heap::PropTable| {
            props
                .iter()
                .filter(|(_, prop)| flags.include_hidden || prop.enumerable)
                .map(|(key, _)| *key)
                .collect()
        };
        let snapshot = match self.heap.data(target) {
            HeapData::Object(object) => Snapshot::Peeked(table_keys(&object.props)),
            HeapData::HostFn(host_fn) => Snapshot::Peeked(table_keys(&host_fn.props)),
            HeapData::Array(array) => Snapshot::ArrayLen(array.items.len()),
            HeapData::Buffer(_) | HeapData::Enumerator(_) => Snapshot::Peeked(Vec::new()),
        };

        let keys = match snapshot {
            Snapshot::Peeked(keys) => {
                for &key in &keys {
                    self.strings.retain(key);
                }
                keys
            }
            Snapshot::ArrayLen(len) => {
                let mut keys = Vec::with_capacity(len);
                for i in 0..len {
                    // Fresh interns already carry the snapshot's reference.
                    match self.intern(&i.to_string()) {
                        Ok(id) => keys.push(id),
                        Err(err) => {
                            for id in keys {
                                self.strings.release(id);
                            }
                            return Err(err);
                        }
                    }
                }
                keys
            }
        };

        self.heap.inc_ref(target);
        let data = EnumeratorData { target, keys, pos: 0 };
        let id = self
            .heap
            .allocate(HeapData::Enumerator(data), &self.limits)
            .expect("heap object limit pre-checked");
        self.stack.push(Value::Ref(id));
        Ok(())
    }

    /// Advances the enumerator at `enum_idx`. On a remaining key, pushes the
    /// key (and, when `want_value` is set, the property's current value) and
    /// returns true. Past the end, pushes nothing and returns false.
    pub fn next(&mut self, enum_idx: i32, want_value: bool) -> Result<bool, EngineError> {
        let pos = self.resolve(enum_idx)?;
        let id = match &self.stack[pos] {
            Value::Ref(id) if matches!(self.heap.data(*id), HeapData::Enumerator(_)) => *id,
            other => return Err(self.wrong_type("enumerator", other)),
        };

        let (target, key) = match self.heap.data(id) {
            HeapData::Enumerator(state) => {
                if state.pos >= state.keys.len() {
                    return Ok(false);
                }
                (state.target, state.keys[state.pos])
            }
            _ => unreachable!("enumerator changed kind during next"),
        };

        let needed = if want_value { 2 } else { 1 };
        self.limits.check_stack(self.stack.len(), needed)?;

        let value = if want_value {
            let text = self.str_value(key).to_string();
            let peek = self.lookup_in(target, &text)?;
            match peek {
                Some(value) => {
                    self.retain_value(&value);
                    Some(value)
                }
                None => Some(Value::Undefined),
            }
        } else {
            None
        };

        match self.heap.data_mut(id) {
            HeapData::Enumerator(state) => state.pos += 1,
            _ => unreachable!("enumerator changed kind during next"),
        }

        self.strings.retain(key);
        self.stack.push(Value::Str(key));
        if let Some(value) = value {
            self.stack.push(value);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::index_from_text;

    #[test]
    fn index_text_is_canonical() {
        assert_eq!(index_from_text("0"), Some(0));
        assert_eq!(index_from_text("17"), Some(17));
        assert_eq!(index_from_text("01"), None);
        assert_eq!(index_from_text(""), None);
        assert_eq!(index_from_text("-1"), None);
        assert_eq!(index_from_text("1.5"), None);
        assert_eq!(index_from_text("4294967295"), Some(u32::MAX));
        assert_eq!(index_from_text("4294967296"), None);
    }
}
