//! The engine's internal value representation.
//!
//! A [`Value`] is one slot on the value stack or one field inside a heap
//! container. Strings and heap objects are held by id; the value itself is a
//! small tag plus payload and never owns an allocation directly.

use std::fmt;

use strum::{Display, IntoStaticStr};

use crate::{heap::HeapId, intern::StringId};

/// A native pointer carried through the engine as an immediate value.
///
/// The engine stores the address and never dereferences it. Null is an
/// ordinary, falsy pointer value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawPtr(*mut ());

impl RawPtr {
    #[must_use]
    pub fn new(ptr: *mut ()) -> Self {
        Self(ptr)
    }

    #[must_use]
    pub fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    #[must_use]
    pub fn as_ptr(self) -> *mut () {
        self.0
    }

    #[must_use]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    pub(crate) fn addr(self) -> usize {
        self.0 as usize
    }
}

impl Default for RawPtr {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for RawPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawPtr(0x{:x})", self.addr())
    }
}

/// Coarse type of a stack value, as reported by `Context::type_of`.
///
/// Arrays and host functions report [`ValueType::Object`]; use the dedicated
/// predicates to tell them apart. An invalid index reports
/// [`ValueType::None`] instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    None,
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Object,
    Buffer,
    Pointer,
}

/// One engine value.
///
/// `Value` deliberately does not implement `Clone` or `Drop`: a `Str` owns
/// one reference in the string table and a `Ref` owns one reference in the
/// heap, so duplication and disposal must go through the context
/// (`retain_value` / `drop_value`) to keep the counts balanced. A value that
/// is moved out of the engine without one of those calls leaks its slot.
#[derive(Debug)]
pub(crate) enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(StringId),
    Ptr(RawPtr),
    Ref(HeapId),
}

impl Value {
    /// Bitwise copy without touching reference counts.
    ///
    /// Callers must immediately either retain the copy through the context or
    /// treat it as a borrowed peek that never outlives the original.
    pub(crate) fn raw_copy(&self) -> Self {
        match self {
            Self::Undefined => Self::Undefined,
            Self::Null => Self::Null,
            Self::Bool(b) => Self::Bool(*b),
            Self::Number(n) => Self::Number(*n),
            Self::Str(id) => Self::Str(*id),
            Self::Ptr(p) => Self::Ptr(*p),
            Self::Ref(id) => Self::Ref(*id),
        }
    }
}
