//! `Var`: detached values that live outside any context.
//!
//! A `Var` is a plain owned tree with no ties to an engine's heap, so it can
//! cross threads, sit in host data structures, and round-trip through serde.
//! `Context::push_var` and `Context::to_var` move values across the
//! boundary; see [`crate::convert`] for the mapping rules.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An engine value detached from any context.
///
/// Serialization is shape-based (untagged), so a `Var` reads and writes as
/// ordinary JSON: `null` decodes as [`Var::Null`], whole numbers as
/// [`Var::Int`], fractional ones as [`Var::Float`]. `Undefined` encodes as
/// `null` and never decodes. `Bytes` encodes as an array of numbers and, by
/// the same token, decodes as [`Var::Array`].
///
/// `Int(5)` and `Float(5.0)` compare unequal; hosts that want numeric
/// equality should compare through [`Var::as_float`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Var {
    Null,
    #[default]
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Var>),
    Object(IndexMap<String, Var>),
    Bytes(Vec<u8>),
}

impl Var {
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view: `Int` directly, or a `Float` that holds an exact
    /// integral value.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) => crate::convert::int_from_number(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Var]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&IndexMap<String, Var>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Compact JSON text. Non-finite floats encode as `null`.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Var serialization is infallible")
    }

    /// Pretty-printed JSON text.
    #[must_use]
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).expect("Var serialization is infallible")
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_json())
    }
}

impl From<bool> for Var {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Var {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Var {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Var {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Var {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Var {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Var {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&[u8]> for Var {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for Var {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<Var>> for Var {
    fn from(value: Vec<Var>) -> Self {
        Self::Array(value)
    }
}

impl From<IndexMap<String, Var>> for Var {
    fn from(value: IndexMap<String, Var>) -> Self {
        Self::Object(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_decoding_picks_the_narrowest_number() {
        assert_eq!(Var::from_json("5").unwrap(), Var::Int(5));
        assert_eq!(Var::from_json("5.5").unwrap(), Var::Float(5.5));
        assert_eq!(Var::from_json("null").unwrap(), Var::Null);
        assert_eq!(Var::from_json("\"hi\"").unwrap(), Var::Str("hi".to_string()));
    }

    #[test]
    fn object_key_order_survives_a_round_trip() {
        let var = Var::from_json(r#"{"z":1,"a":2,"m":3}"#).unwrap();
        assert_eq!(var.to_json(), r#"{"z":1,"a":2,"m":3}"#);
    }

    #[test]
    fn undefined_encodes_as_null() {
        assert_eq!(Var::Undefined.to_json(), "null");
        assert_eq!(Var::from_json("null").unwrap(), Var::Null);
    }

    #[test]
    fn bytes_encode_as_a_number_array() {
        assert_eq!(Var::Bytes(vec![1, 2, 255]).to_json(), "[1,2,255]");
    }

    #[test]
    fn integral_floats_read_back_as_ints() {
        assert_eq!(Var::Float(7.0).as_int(), Some(7));
        assert_eq!(Var::Float(7.5).as_int(), None);
        assert_eq!(Var::Int(7).as_float(), Some(7.0));
    }
}
