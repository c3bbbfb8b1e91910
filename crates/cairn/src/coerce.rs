//! In-place coercions.
//!
//! Each `to_*` call replaces the addressed stack slot with the coerced value
//! and returns it, so repeated reads of the same index pay the conversion
//! once. The rules are the usual scripting-language ones: see the individual
//! methods for the exact tables.

use ahash::AHashSet;

use crate::{
    buffer::FixedBuffer,
    context::Context,
    error::EngineError,
    heap::{HeapData, HeapId},
    limits::{LimitError, MAX_CONVERT_DEPTH},
    tracer::EngineTracer,
    value::Value,
};

/// Canonical text for a number: `NaN`, `Infinity`, `-Infinity`, `0` for both
/// zeros, otherwise the shortest round-trip decimal with any trailing `.0`
/// stripped.
pub(crate) fn number_text(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let mut buf = ryu::Buffer::new();
    let text = buf.format_finite(n);
    text.strip_suffix(".0").unwrap_or(text).to_string()
}

/// Text-to-number: trimmed, empty means zero, `0x` prefix reads as hex,
/// anything else goes through the float grammar, failures are NaN.
pub(crate) fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return match u64::from_str_radix(hex, 16) {
            Ok(v) => v as f64,
            Err(_) => f64::NAN,
        };
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

impl<Tr: EngineTracer> Context<Tr> {
    /// Coerces the value at `idx` to a string in place and returns it.
    ///
    /// Objects render as `[object Object]`, arrays join their elements with
    /// commas (undefined and null join as empty), buffers decode their bytes
    /// as UTF-8 with replacement characters.
    pub fn to_str(&mut self, idx: i32) -> Result<&str, EngineError> {
        let pos = self.resolve(idx)?;
        if let Value::Str(id) = &self.stack[pos] {
            let id = *id;
            return Ok(self.str_value(id));
        }
        let text = {
            let mut visited = AHashSet::new();
            self.stringify_value(&self.stack[pos], &mut visited, 0)?
        };
        let id = self.intern(&text)?;
        self.replace_at(pos, Value::Str(id));
        self.flush_finalizers();
        Ok(self.str_value(id))
    }

    /// Coerces the value at `idx` to a number in place and returns it.
    ///
    /// Undefined is NaN, null is zero, booleans are zero or one, strings go
    /// through [`parse_number`] rules, everything else coerces via its string
    /// form.
    pub fn to_number(&mut self, idx: i32) -> Result<f64, EngineError> {
        let pos = self.resolve(idx)?;
        let n = {
            let value = &self.stack[pos];
            match value {
                Value::Undefined => f64::NAN,
                Value::Null => 0.0,
                Value::Bool(b) => {
                    if *b {
                        1.0
                    } else {
                        0.0
                    }
                }
                Value::Number(n) => return Ok(*n),
                Value::Str(id) => parse_number(self.str_value(*id)),
                Value::Ptr(_) | Value::Ref(_) => {
                    let mut visited = AHashSet::new();
                    let text = self.stringify_value(value, &mut visited, 0)?;
                    parse_number(&text)
                }
            }
        };
        self.replace_at(pos, Value::Number(n));
        self.flush_finalizers();
        Ok(n)
    }

    /// Coerces to a number, truncates the slot toward zero, and returns the
    /// result saturated to the i64 range. NaN comes back as zero.
    pub fn to_int(&mut self, idx: i32) -> Result<i64, EngineError> {
        let pos = self.resolve(idx)?;
        let n = self.to_number(idx)?;
        let truncated = if n.is_nan() { 0.0 } else { n.trunc() };
        self.replace_at(pos, Value::Number(truncated));
        Ok(if n.is_nan() { 0 } else { n as i64 })
    }

    /// Coerces the value at `idx` to a boolean in place and returns it.
    ///
    /// Falsy values: undefined, null, false, zero, NaN, the empty string and
    /// the null pointer. Every heap object is truthy, including empty
    /// buffers.
    pub fn to_bool(&mut self, idx: i32) -> Result<bool, EngineError> {
        let pos = self.resolve(idx)?;
        let truthy = match &self.stack[pos] {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => !(*n == 0.0 || n.is_nan()),
            Value::Str(id) => !self.str_value(*id).is_empty(),
            Value::Ptr(p) => !p.is_null(),
            Value::Ref(_) => true,
        };
        self.replace_at(pos, Value::Bool(truthy));
        self.flush_finalizers();
        Ok(truthy)
    }

    /// Coerces the value at `idx` to a fixed buffer in place and returns its
    /// bytes.
    ///
    /// A buffer stays as it is. A string becomes a buffer of its UTF-8
    /// bytes. Anything else coerces to its string form first and then to the
    /// bytes of that string.
    pub fn to_buffer(&mut self, idx: i32) -> Result<&[u8], EngineError> {
        let pos = self.resolve(idx)?;
        let already = matches!(
            &self.stack[pos],
            Value::Ref(id) if matches!(self.heap.data(*id), HeapData::Buffer(_))
        );
        if !already {
            let text = {
                let mut visited = AHashSet::new();
                self.stringify_value(&self.stack[pos], &mut visited, 0)?
            };
            self.limits.check_buffer_bytes(text.len())?;
            let id = self.heap.allocate(
                HeapData::Buffer(FixedBuffer::from_vec(text.into_bytes())),
                &self.limits,
            )?;
            self.replace_at(pos, Value::Ref(id));
            self.flush_finalizers();
        }
        match &self.stack[pos] {
            Value::Ref(id) => match self.heap.data(*id) {
                HeapData::Buffer(buffer) => Ok(buffer.as_slice()),
                _ => unreachable!("buffer coercion left a non-buffer object in the slot"),
            },
            _ => unreachable!("buffer coercion left a non-ref value in the slot"),
        }
    }

    /// Walks a value into text form. Array recursion is depth-capped and
    /// cycle-checked; a revisited array joins as the empty string.
    pub(crate) fn stringify_value(
        &self,
        value: &Value,
        visited: &mut AHashSet<HeapId>,
        depth: usize,
    ) -> Result<String, EngineError> {
        if depth > MAX_CONVERT_DEPTH {
            return Err(LimitError::ConvertDepth { limit: MAX_CONVERT_DEPTH }.into());
        }
        Ok(match value {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_text(*n),
            Value::Str(id) => self.str_value(*id).to_string(),
            Value::Ptr(p) => {
                if p.is_null() {
                    "pointer:null".to_string()
                } else {
                    format!("pointer:0x{:x}", p.addr())
                }
            }
            Value::Ref(id) => {
                let id = *id;
                match self.heap.data(id) {
                    HeapData::Buffer(buffer) => {
                        String::from_utf8_lossy(buffer.as_slice()).into_owned()
                    }
                    HeapData::Object(_) | HeapData::Enumerator(_) => "[object Object]".to_string(),
                    HeapData::HostFn(host_fn) => {
                        let name = host_fn.name.map_or("", |n| self.str_value(n));
                        format!("function {name}() {{ [native code] }}")
                    }
                    HeapData::Array(array) => {
                        if !visited.insert(id) {
                            return Ok(String::new());
                        }
                        let mut out = String::new();
                        for (i, item) in array.items.iter().enumerate() {
                            if i > 0 {
                                out.push(',');
                            }
                            match item {
                                Value::Undefined | Value::Null => {}
                                other => {
                                    out.push_str(&self.stringify_value(other, visited, depth + 1)?);
                                }
                            }
                        }
                        visited.remove(&id);
                        out
                    }
                }
            }
        })
    }
}
