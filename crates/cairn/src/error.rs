use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

use crate::{limits::LimitError, value::ValueType};

/// Classification of script-level errors, mirroring the classic JavaScript
/// error constructors.
///
/// The variant's wire name (`TypeError`, `RangeError`, ...) is what appears
/// in the `name` property of an error object produced by a failed call, and
/// `from_str` accepts the same names when reconstructing a kind from one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    #[strum(serialize = "Error")]
    Error,
    #[strum(serialize = "EvalError")]
    Eval,
    #[strum(serialize = "RangeError")]
    Range,
    #[strum(serialize = "ReferenceError")]
    Reference,
    #[strum(serialize = "SyntaxError")]
    Syntax,
    #[strum(serialize = "TypeError")]
    Type,
    #[strum(serialize = "URIError")]
    Uri,
}

/// An error thrown by script-visible machinery: a host function, a property
/// access on a non-object, a JSON decode failure.
///
/// Protected calls turn one of these into an error object on the value stack
/// and hand the typed form back to the caller. `frames` records the names of
/// the host functions that were live when the error crossed them, innermost
/// first.
#[derive(Debug, Clone)]
pub struct ScriptError {
    kind: ErrorKind,
    message: String,
    frames: Vec<String>,
}

impl ScriptError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            frames: Vec::new(),
        }
    }

    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    #[must_use]
    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Range, message)
    }

    #[must_use]
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Host function names this error propagated through, innermost first.
    #[must_use]
    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    pub(crate) fn push_frame(&mut self, name: &str) {
        self.frames.push(name.to_string());
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for frame in &self.frames {
            write!(f, "\n    at {frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}

/// Error type for engine API calls, separating failures by origin.
///
/// Keeping misuse of the stack API (`InvalidIndex`, `WrongType`), resource
/// exhaustion (`Limit`) and script-level failures (`Script`) distinct lets
/// embedders handle recovery accurately without string matching.
#[derive(Debug, Clone)]
pub enum EngineError {
    /// The index does not name a value in the current frame.
    InvalidIndex { index: i32 },
    /// A pop would cross below the current frame's floor.
    StackUnderflow,
    /// A strict accessor found a value of the wrong type.
    WrongType {
        expected: &'static str,
        found: ValueType,
    },
    /// A pointer read found a buffer whose byte length is not pointer width.
    SlotWidth { expected: usize, found: usize },
    /// A resource limit was exceeded.
    Limit(LimitError),
    /// A script-level error was thrown. After a failed protected call the
    /// error object is also on the stack.
    Script(ScriptError),
    /// `push_this` or `push_current_fn` was used outside a function call.
    NoActiveCall,
    /// A host closure was invoked while an earlier activation still held it.
    ReentrantHostFn,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIndex { index } => write!(f, "invalid stack index {index}"),
            Self::StackUnderflow => write!(f, "attempt to pop below the frame floor"),
            Self::WrongType { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            Self::SlotWidth { expected, found } => {
                write!(
                    f,
                    "pointer slot must be exactly {expected} bytes, found {found}"
                )
            }
            Self::Limit(error) => write!(f, "{error}"),
            Self::Script(error) => write!(f, "{error}"),
            Self::NoActiveCall => write!(f, "no host function call is active"),
            Self::ReentrantHostFn => write!(f, "reentrant call into a live host closure"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<LimitError> for EngineError {
    fn from(error: LimitError) -> Self {
        Self::Limit(error)
    }
}

impl From<ScriptError> for EngineError {
    fn from(error: ScriptError) -> Self {
        Self::Script(error)
    }
}

/// Lets host closures use `?` on engine calls: an API-level failure inside a
/// host function becomes a thrown script error in the calling frame.
impl From<EngineError> for ScriptError {
    fn from(error: EngineError) -> Self {
        let kind = match &error {
            EngineError::Script(inner) => return inner.clone(),
            EngineError::InvalidIndex { .. }
            | EngineError::StackUnderflow
            | EngineError::Limit(_) => ErrorKind::Range,
            EngineError::WrongType { .. } | EngineError::SlotWidth { .. } => ErrorKind::Type,
            EngineError::NoActiveCall | EngineError::ReentrantHostFn => ErrorKind::Error,
        };
        Self::new(kind, error.to_string())
    }
}
