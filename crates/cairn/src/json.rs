//! JSON encode/decode over stack values.
//!
//! The rules follow script-world JSON conventions rather than a strict type
//! mapping: non-finite numbers encode as `null`, object properties whose
//! value has no JSON form are skipped while array elements become `null`,
//! hidden properties never encode, and buffers encode as arrays of byte
//! numbers. Cyclic structure raises a `TypeError`; text that fails to parse
//! raises a `SyntaxError`.

use ahash::AHashSet;

use crate::{
    context::Context,
    error::{EngineError, ScriptError},
    heap::{HeapData, HeapId},
    limits::{LimitError, MAX_CONVERT_DEPTH},
    tracer::EngineTracer,
    value::Value,
};

fn json_number(n: f64) -> serde_json::Value {
    if let Some(i) = crate::convert::int_from_number(n) {
        return serde_json::Value::Number(i.into());
    }
    match serde_json::Number::from_f64(n) {
        Some(num) => serde_json::Value::Number(num),
        None => serde_json::Value::Null,
    }
}

fn cycle_error() -> EngineError {
    ScriptError::type_error("cyclic structure cannot encode to JSON").into()
}

impl<Tr: EngineTracer> Context<Tr> {
    /// Encodes the value at `idx` to JSON text, replaces the slot with that
    /// text, and returns it.
    ///
    /// A root value with no JSON form (undefined, a pointer, a function)
    /// fails with a `TypeError`.
    pub fn json_encode(&mut self, idx: i32) -> Result<String, EngineError> {
        let pos = self.resolve(idx)?;
        let tree = {
            let mut visited = AHashSet::new();
            self.json_from_value(&self.stack[pos], &mut visited, 0)?
        };
        let Some(tree) = tree else {
            return Err(ScriptError::type_error("value has no JSON representation").into());
        };
        let text = serde_json::to_string(&tree).expect("JSON tree serialization is infallible");
        let id = self.intern(&text)?;
        self.replace_at(pos, Value::Str(id));
        self.flush_finalizers();
        Ok(text)
    }

    /// Coerces the value at `idx` to text, parses it as JSON, and replaces
    /// the slot with the decoded value.
    ///
    /// Decoded objects keep their key order; all decoded properties are
    /// enumerable. Numbers decode as f64.
    pub fn json_decode(&mut self, idx: i32) -> Result<(), EngineError> {
        let pos = self.resolve(idx)?;
        let text = self.to_str(idx)?.to_string();
        let parsed: serde_json::Value = serde_json::from_str(&text)
            .map_err(|err| ScriptError::syntax_error(format!("JSON parse failed: {err}")))?;

        let floor = self.stack.len();
        if let Err(err) = self.push_json_value(&parsed, 0) {
            while self.stack.len() > floor {
                let value = self.stack.pop().expect("stack entry vanished during rollback");
                self.drop_value(value);
            }
            self.flush_finalizers();
            return Err(err);
        }
        let value = self.stack.pop().expect("decoded value vanished");
        self.replace_at(pos, value);
        self.flush_finalizers();
        Ok(())
    }

    /// `None` means the value has no JSON form and the caller decides
    /// whether that skips a property or becomes `null`.
    fn json_from_value(
        &self,
        value: &Value,
        visited: &mut AHashSet<HeapId>,
        depth: usize,
    ) -> Result<Option<serde_json::Value>, EngineError> {
        use serde_json::Value as Json;

        if depth > MAX_CONVERT_DEPTH {
            return Err(LimitError::ConvertDepth { limit: MAX_CONVERT_DEPTH }.into());
        }
        Ok(match value {
            Value::Undefined | Value::Ptr(_) => None,
            Value::Null => Some(Json::Null),
            Value::Bool(b) => Some(Json::Bool(*b)),
            Value::Number(n) => Some(json_number(*n)),
            Value::Str(id) => Some(Json::String(self.str_value(*id).to_string())),
            Value::Ref(id) => {
                let id = *id;
                match self.heap.data(id) {
                    HeapData::HostFn(_) | HeapData::Enumerator(_) => None,
                    HeapData::Buffer(buffer) => Some(Json::Array(
                        buffer.as_slice().iter().map(|b| Json::Number((*b).into())).collect(),
                    )),
                    HeapData::Array(array) => {
                        if !visited.insert(id) {
                            return Err(cycle_error());
                        }
                        let mut out = Vec::with_capacity(array.items.len());
                        for item in &array.items {
                            let encoded = self.json_from_value(item, visited, depth + 1)?;
                            out.push(encoded.unwrap_or(Json::Null));
                        }
                        visited.remove(&id);
                        Some(Json::Array(out))
                    }
                    HeapData::Object(object) => {
                        if !visited.insert(id) {
                            return Err(cycle_error());
                        }
                        let mut map = serde_json::Map::new();
                        for (key, prop) in &object.props {
                            if !prop.enumerable {
                                continue;
                            }
                            let encoded = self.json_from_value(&prop.value, visited, depth + 1)?;
                            if let Some(encoded) = encoded {
                                map.insert(self.str_value(*key).to_string(), encoded);
                            }
                        }
                        visited.remove(&id);
                        Some(Json::Object(map))
                    }
                }
            }
        })
    }

    fn push_json_value(
        &mut self,
        parsed: &serde_json::Value,
        depth: usize,
    ) -> Result<(), EngineError> {
        if depth > MAX_CONVERT_DEPTH {
            return Err(LimitError::ConvertDepth { limit: MAX_CONVERT_DEPTH }.into());
        }
        match parsed {
            serde_json::Value::Null => self.push_null(),
            serde_json::Value::Bool(b) => self.push_bool(*b),
            serde_json::Value::Number(n) => self.push_number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => self.push_str(s),
            serde_json::Value::Array(items) => {
                self.push_array()?;
                for item in items {
                    self.push_json_value(item, depth + 1)?;
                    self.array_append(-2)?;
                }
                Ok(())
            }
            serde_json::Value::Object(map) => {
                self.push_object()?;
                for (key, item) in map {
                    self.push_json_value(item, depth + 1)?;
                    self.put_prop_str(-2, key)?;
                }
                Ok(())
            }
        }
    }
}
