//! Crossing the boundary: `Var` trees to stack values and back.
//!
//! `push_var` builds heap structure from a tree; `to_var` snapshots a stack
//! value into a tree. The mapping is mostly one-to-one with two deliberate
//! asymmetries: engine numbers are f64, so `Int` pushes as a number and a
//! number reads back as `Int` exactly when it holds an integral value in
//! the i64 range; and values with no tree form (host functions, pointers,
//! enumerators) read back as `Undefined`.
//!
//! Object snapshots take enumerable own properties only, in insertion
//! order. Cyclic structure is reported as a `TypeError`; depth runaway as a
//! limit error.

use ahash::AHashSet;

use crate::{
    context::Context,
    error::{EngineError, ScriptError},
    heap::{HeapData, HeapId},
    limits::{LimitError, MAX_CONVERT_DEPTH},
    tracer::EngineTracer,
    value::Value,
    var::Var,
};

/// The i64 an f64 holds exactly, if it holds one.
pub(crate) fn int_from_number(n: f64) -> Option<i64> {
    if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Some(n as i64)
    } else {
        None
    }
}

impl<Tr: EngineTracer> Context<Tr> {
    /// Pushes one value built from `var`. On failure nothing is left behind.
    pub fn push_var(&mut self, var: &Var) -> Result<(), EngineError> {
        let floor = self.stack.len();
        match self.push_var_inner(var, 0) {
            Ok(()) => Ok(()),
            Err(err) => {
                while self.stack.len() > floor {
                    let value = self.stack.pop().expect("stack entry vanished during rollback");
                    self.drop_value(value);
                }
                self.flush_finalizers();
                Err(err)
            }
        }
    }

    fn push_var_inner(&mut self, var: &Var, depth: usize) -> Result<(), EngineError> {
        if depth > MAX_CONVERT_DEPTH {
            return Err(LimitError::ConvertDepth { limit: MAX_CONVERT_DEPTH }.into());
        }
        match var {
            Var::Undefined => self.push_undefined(),
            Var::Null => self.push_null(),
            Var::Bool(b) => self.push_bool(*b),
            Var::Int(i) => self.push_int(*i),
            Var::Float(f) => self.push_number(*f),
            Var::Str(s) => self.push_str(s),
            Var::Bytes(b) => self.push_bytes(b),
            Var::Array(items) => {
                self.push_array()?;
                for item in items {
                    self.push_var_inner(item, depth + 1)?;
                    self.array_append(-2)?;
                }
                Ok(())
            }
            Var::Object(map) => {
                self.push_object()?;
                for (key, item) in map {
                    self.push_var_inner(item, depth + 1)?;
                    self.put_prop_str(-2, key)?;
                }
                Ok(())
            }
        }
    }

    /// Snapshots the value at `idx` into a tree, leaving the stack as it is.
    pub fn to_var(&self, idx: i32) -> Result<Var, EngineError> {
        let value = self.value_at(idx)?;
        let mut visited = AHashSet::new();
        self.var_from_value(value, &mut visited, 0)
    }

    fn var_from_value(
        &self,
        value: &Value,
        visited: &mut AHashSet<HeapId>,
        depth: usize,
    ) -> Result<Var, EngineError> {
        if depth > MAX_CONVERT_DEPTH {
            return Err(LimitError::ConvertDepth { limit: MAX_CONVERT_DEPTH }.into());
        }
        Ok(match value {
            Value::Undefined => Var::Undefined,
            Value::Null => Var::Null,
            Value::Bool(b) => Var::Bool(*b),
            Value::Number(n) => match int_from_number(*n) {
                Some(i) => Var::Int(i),
                None => Var::Float(*n),
            },
            Value::Str(id) => Var::Str(self.str_value(*id).to_string()),
            Value::Ptr(_) => Var::Undefined,
            Value::Ref(id) => {
                let id = *id;
                match self.heap.data(id) {
                    HeapData::Buffer(buffer) => Var::Bytes(buffer.as_slice().to_vec()),
                    HeapData::HostFn(_) | HeapData::Enumerator(_) => Var::Undefined,
                    HeapData::Array(array) => {
                        if !visited.insert(id) {
                            return Err(
                                ScriptError::type_error("cyclic structure cannot detach").into()
                            );
                        }
                        let mut out = Vec::with_capacity(array.items.len());
                        for item in &array.items {
                            out.push(self.var_from_value(item, visited, depth + 1)?);
                        }
                        visited.remove(&id);
                        Var::Array(out)
                    }
                    HeapData::Object(object) => {
                        if !visited.insert(id) {
                            return Err(
                                ScriptError::type_error("cyclic structure cannot detach").into()
                            );
                        }
                        let mut map = indexmap::IndexMap::new();
                        for (key, prop) in &object.props {
                            if !prop.enumerable {
                                continue;
                            }
                            let item = self.var_from_value(&prop.value, visited, depth + 1)?;
                            map.insert(self.str_value(*key).to_string(), item);
                        }
                        visited.remove(&id);
                        Var::Object(map)
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::int_from_number;

    #[test]
    fn integral_detection_respects_the_i64_range() {
        assert_eq!(int_from_number(0.0), Some(0));
        assert_eq!(int_from_number(-0.0), Some(0));
        assert_eq!(int_from_number(3.0), Some(3));
        assert_eq!(int_from_number(3.5), None);
        assert_eq!(int_from_number(f64::NAN), None);
        assert_eq!(int_from_number(f64::INFINITY), None);
        assert_eq!(int_from_number(9.3e18), None);
        assert_eq!(int_from_number(-9.3e18), None);
        assert_eq!(int_from_number(1e15), Some(1_000_000_000_000_000));
    }
}
