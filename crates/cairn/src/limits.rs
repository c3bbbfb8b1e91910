use std::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a configured engine limit is exceeded.
///
/// This lets an embedder run untrusted drivers against a bounded engine:
/// stack growth, call nesting, heap population, array growth and buffer
/// sizes all fail with a typed error instead of aborting the host.
#[derive(Debug, Clone)]
pub enum LimitError {
    /// Value stack would grow past the configured depth.
    Stack { limit: usize },
    /// Call nesting would grow past the configured depth.
    Calls { limit: usize },
    /// Live heap object count would exceed the configured maximum.
    HeapObjects { limit: usize },
    /// A single buffer allocation asked for more than the configured maximum.
    BufferBytes { limit: usize, requested: usize },
    /// A single array would grow to more elements than the configured
    /// maximum.
    ArrayElems { limit: usize, requested: usize },
    /// Interned string count would exceed the configured maximum.
    InternedStrings { limit: usize },
    /// A conversion walked deeper into nested data than the fixed cap.
    ConvertDepth { limit: usize },
}

impl fmt::Display for LimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stack { limit } => write!(f, "value stack limit exceeded: {limit}"),
            Self::Calls { limit } => write!(f, "call depth limit exceeded: {limit}"),
            Self::HeapObjects { limit } => write!(f, "heap object limit exceeded: {limit}"),
            Self::BufferBytes { limit, requested } => {
                write!(f, "buffer allocation of {requested} bytes exceeds limit of {limit}")
            }
            Self::ArrayElems { limit, requested } => {
                write!(f, "array growth to {requested} elements exceeds limit of {limit}")
            }
            Self::InternedStrings { limit } => {
                write!(f, "interned string limit exceeded: {limit}")
            }
            Self::ConvertDepth { limit } => {
                write!(f, "conversion depth limit exceeded: {limit}")
            }
        }
    }
}

impl std::error::Error for LimitError {}

/// Default value stack depth for `Limits::new`.
pub const DEFAULT_MAX_STACK: usize = 4096;

/// Default call nesting depth for `Limits::new`.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Default live heap object count for `Limits::new`.
pub const DEFAULT_MAX_HEAP_OBJECTS: usize = 1_000_000;

/// Default cap on a single buffer allocation for `Limits::new` (64 MiB).
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 64 * 1024 * 1024;

/// Default cap on a single array's element count for `Limits::new`.
pub const DEFAULT_MAX_ARRAY_ELEMS: usize = 4 * 1024 * 1024;

/// Default interned string count for `Limits::new`.
pub const DEFAULT_MAX_INTERNED_STRINGS: usize = 1_000_000;

/// Maximum recursion depth for structural conversions (`push_var`, `to_var`,
/// JSON transcoding).
///
/// Separate from the call depth limit. This protects against host stack
/// overflow when traversing deeply nested data.
///
/// Lower in debug mode to avoid stack overflow (debug builds use more stack
/// space per call frame).
#[cfg(debug_assertions)]
pub const MAX_CONVERT_DEPTH: usize = 100;

/// Maximum recursion depth for structural conversions (`push_var`, `to_var`,
/// JSON transcoding).
///
/// Separate from the call depth limit. This protects against host stack
/// overflow when traversing deeply nested data.
#[cfg(not(debug_assertions))]
pub const MAX_CONVERT_DEPTH: usize = 400;

/// Configuration for engine limits.
///
/// All limits are optional: `None` disables a specific limit. `Limits::new`
/// applies the bounded defaults, `Limits::default()` disables everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum number of values on the stack, across all frames.
    pub max_stack: Option<usize>,
    /// Maximum nesting of protected calls.
    pub max_call_depth: Option<usize>,
    /// Maximum number of live heap objects.
    pub max_heap_objects: Option<usize>,
    /// Maximum size in bytes of a single buffer allocation.
    pub max_buffer_bytes: Option<usize>,
    /// Maximum number of elements in a single array. Arrays are dense, so a
    /// property write to index `n` allocates `n + 1` slots.
    pub max_array_elems: Option<usize>,
    /// Maximum number of distinct interned strings.
    pub max_interned_strings: Option<usize>,
}

impl Limits {
    /// Creates limits with all bounded defaults applied.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_stack: Some(DEFAULT_MAX_STACK),
            max_call_depth: Some(DEFAULT_MAX_CALL_DEPTH),
            max_heap_objects: Some(DEFAULT_MAX_HEAP_OBJECTS),
            max_buffer_bytes: Some(DEFAULT_MAX_BUFFER_BYTES),
            max_array_elems: Some(DEFAULT_MAX_ARRAY_ELEMS),
            max_interned_strings: Some(DEFAULT_MAX_INTERNED_STRINGS),
        }
    }

    /// Sets the maximum value stack depth.
    #[must_use]
    pub fn max_stack(mut self, limit: usize) -> Self {
        self.max_stack = Some(limit);
        self
    }

    /// Sets the maximum call nesting depth.
    #[must_use]
    pub fn max_call_depth(mut self, limit: usize) -> Self {
        self.max_call_depth = Some(limit);
        self
    }

    /// Sets the maximum number of live heap objects.
    #[must_use]
    pub fn max_heap_objects(mut self, limit: usize) -> Self {
        self.max_heap_objects = Some(limit);
        self
    }

    /// Sets the maximum size of a single buffer allocation.
    #[must_use]
    pub fn max_buffer_bytes(mut self, limit: usize) -> Self {
        self.max_buffer_bytes = Some(limit);
        self
    }

    /// Sets the maximum element count of a single array.
    #[must_use]
    pub fn max_array_elems(mut self, limit: usize) -> Self {
        self.max_array_elems = Some(limit);
        self
    }

    /// Sets the maximum number of distinct interned strings.
    #[must_use]
    pub fn max_interned_strings(mut self, limit: usize) -> Self {
        self.max_interned_strings = Some(limit);
        self
    }

    pub(crate) fn check_stack(&self, depth: usize, extra: usize) -> Result<(), LimitError> {
        if let Some(limit) = self.max_stack
            && depth + extra > limit
        {
            return Err(LimitError::Stack { limit });
        }
        Ok(())
    }

    pub(crate) fn check_calls(&self, depth: usize) -> Result<(), LimitError> {
        if let Some(limit) = self.max_call_depth
            && depth >= limit
        {
            return Err(LimitError::Calls { limit });
        }
        Ok(())
    }

    pub(crate) fn check_heap_objects(&self, live: usize) -> Result<(), LimitError> {
        if let Some(limit) = self.max_heap_objects
            && live >= limit
        {
            return Err(LimitError::HeapObjects { limit });
        }
        Ok(())
    }

    pub(crate) fn check_buffer_bytes(&self, requested: usize) -> Result<(), LimitError> {
        if let Some(limit) = self.max_buffer_bytes
            && requested > limit
        {
            return Err(LimitError::BufferBytes { limit, requested });
        }
        Ok(())
    }

    pub(crate) fn check_array_elems(&self, requested: usize) -> Result<(), LimitError> {
        if let Some(limit) = self.max_array_elems
            && requested > limit
        {
            return Err(LimitError::ArrayElems { limit, requested });
        }
        Ok(())
    }

    pub(crate) fn check_interned_strings(&self, live: usize) -> Result<(), LimitError> {
        if let Some(limit) = self.max_interned_strings
            && live >= limit
        {
            return Err(LimitError::InternedStrings { limit });
        }
        Ok(())
    }
}
