//! Engine execution tracing infrastructure.
//!
//! Provides a trait-based tracing system for the engine with zero-cost
//! abstraction. When using [`NoopTracer`], all trace methods compile away
//! entirely via monomorphization.
//!
//! # Architecture
//!
//! The [`EngineTracer`] trait defines hook points at key events (protected
//! calls, thrown errors, finalizer runs). Concrete implementations collect
//! different kinds of data:
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (production default) |
//! | [`StderrTracer`] | Human-readable event log to stderr |
//! | [`RecordingTracer`] | Full event recording for post-mortem analysis |
//!
//! # Usage
//!
//! The context is parameterized as `Context<Tr: EngineTracer>`. Callers choose
//! the tracer at construction time:
//!
//! ```ignore
//! // Production (zero overhead):
//! let mut ctx = Context::new();
//!
//! // Debugging:
//! let mut ctx = Context::with_tracer(StderrTracer::new());
//!
//! // Post-mortem:
//! let mut ctx = Context::with_tracer(RecordingTracer::new());
//! // ... run ...
//! let events = ctx.tracer().events();
//! ```

use crate::error::ErrorKind;

/// Trace event emitted during engine execution.
///
/// Used by [`RecordingTracer`] to capture a full event trace for post-mortem
/// analysis.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    /// A protected call pushed a new frame.
    Call {
        /// Function name, if the host function carries one.
        name: Option<String>,
        /// Call stack depth after the push.
        depth: usize,
    },
    /// A protected call popped its frame.
    Return {
        /// Call stack depth after the pop.
        depth: usize,
        /// Whether the call completed without throwing.
        ok: bool,
    },
    /// A script error was thrown.
    Throw {
        /// Error classification.
        kind: ErrorKind,
        /// Error message.
        message: String,
    },
    /// A finalizer ran for a collected object.
    Finalizer {
        /// Whether the finalizer completed without throwing.
        ok: bool,
    },
}

/// Trait for engine event tracing.
///
/// All methods have default no-op implementations, so [`NoopTracer`] requires
/// zero lines of code and compiles to zero instructions. Implementations only
/// override the hooks they care about.
///
/// The trait is designed for monomorphization: the context carries the tracer
/// as a type parameter `Tr: EngineTracer`, so the compiler can inline and
/// eliminate no-op calls at compile time. Tracers are owned by their context
/// for its whole life, hence the `'static` bound.
pub trait EngineTracer: std::fmt::Debug + 'static {
    /// Called when a protected call pushes a new frame.
    ///
    /// # Arguments
    /// * `name` - Function name if the host function carries one
    /// * `depth` - Call stack depth after the push
    #[inline(always)]
    fn on_call(&mut self, _name: Option<&str>, _depth: usize) {}

    /// Called when a protected call pops its frame.
    ///
    /// # Arguments
    /// * `depth` - Call stack depth after the pop
    /// * `ok` - Whether the call completed without throwing
    #[inline(always)]
    fn on_return(&mut self, _depth: usize, _ok: bool) {}

    /// Called when a script error is thrown, before the error object is
    /// built on the stack.
    ///
    /// # Arguments
    /// * `kind` - Error classification
    /// * `message` - Error message
    #[inline(always)]
    fn on_throw(&mut self, _kind: ErrorKind, _message: &str) {}

    /// Called after a finalizer runs for a collected object.
    ///
    /// Finalizer failures are swallowed by the engine, so this hook is the
    /// only place they become visible.
    ///
    /// # Arguments
    /// * `ok` - Whether the finalizer completed without throwing
    #[inline(always)]
    fn on_finalizer(&mut self, _ok: bool) {}
}

// ============================================================================
// NoopTracer: zero-cost production default
// ============================================================================

/// A tracer that does nothing.
///
/// All trait methods use the default no-op implementations. Because the
/// context carries the tracer as a type parameter, the compiler monomorphizes
/// `Context<NoopTracer>` and inlines every hook to nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl EngineTracer for NoopTracer {}

// ============================================================================
// StderrTracer: human-readable event log
// ============================================================================

/// Tracer that prints a human-readable event log to stderr.
///
/// Output format:
/// ```text
///   >>> CALL greet           depth=1
///   <<< RETURN ok            depth=0
///   !!! THROW TypeError: expected string, found Number
/// ```
///
/// Useful for interactive debugging while stdout shows normal program output.
#[derive(Debug)]
pub struct StderrTracer {
    /// Maximum number of events to log before stopping (prevents runaway
    /// output). None = unlimited.
    limit: Option<usize>,
    /// Number of events logged so far.
    count: usize,
    /// Whether we've stopped logging (hit the limit).
    stopped: bool,
}

impl StderrTracer {
    /// Creates a new stderr tracer with no event limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            limit: None,
            count: 0,
            stopped: false,
        }
    }

    /// Creates a new stderr tracer that stops after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            count: 0,
            stopped: false,
        }
    }

    fn bump(&mut self) {
        self.count += 1;
        if let Some(limit) = self.limit
            && self.count >= limit
        {
            eprintln!("--- trace limit reached ({limit} events) ---");
            self.stopped = true;
        }
    }
}

impl Default for StderrTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineTracer for StderrTracer {
    fn on_call(&mut self, name: Option<&str>, depth: usize) {
        if self.stopped {
            return;
        }
        let name = name.unwrap_or("<anonymous>");
        eprintln!("  >>> CALL {name:<20} depth={depth}");
        self.bump();
    }

    fn on_return(&mut self, depth: usize, ok: bool) {
        if self.stopped {
            return;
        }
        let verdict = if ok { "ok" } else { "threw" };
        eprintln!("  <<< RETURN {verdict:<18} depth={depth}");
        self.bump();
    }

    fn on_throw(&mut self, kind: ErrorKind, message: &str) {
        if self.stopped {
            return;
        }
        eprintln!("  !!! THROW {kind}: {message}");
        self.bump();
    }

    fn on_finalizer(&mut self, ok: bool) {
        if self.stopped {
            return;
        }
        let verdict = if ok { "ok" } else { "threw" };
        eprintln!("  ~~~ FINALIZER {verdict}");
        self.bump();
    }
}

// ============================================================================
// RecordingTracer: full event recording
// ============================================================================

/// Tracer that records all events for post-mortem analysis.
///
/// Captures every trace event into a `Vec<TraceEvent>`. This is the most
/// expensive tracer (allocates per event), so use it for debugging specific
/// issues or recording short executions.
#[derive(Debug)]
pub struct RecordingTracer {
    /// All recorded events in chronological order.
    events: Vec<TraceEvent>,
    /// Optional limit on number of events recorded.
    limit: Option<usize>,
}

impl RecordingTracer {
    /// Creates a new recording tracer with no event limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            limit: None,
        }
    }

    /// Creates a new recording tracer that stops recording after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::with_capacity(limit.min(1024)),
            limit: Some(limit),
        }
    }

    /// Returns the recorded events.
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Consumes the tracer and returns the recorded events.
    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    /// Returns the number of events recorded.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the event limit has been reached.
    fn at_limit(&self) -> bool {
        self.limit.is_some_and(|l| self.events.len() >= l)
    }
}

impl Default for RecordingTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineTracer for RecordingTracer {
    fn on_call(&mut self, name: Option<&str>, depth: usize) {
        if self.at_limit() {
            return;
        }
        self.events.push(TraceEvent::Call {
            name: name.map(String::from),
            depth,
        });
    }

    fn on_return(&mut self, depth: usize, ok: bool) {
        if self.at_limit() {
            return;
        }
        self.events.push(TraceEvent::Return { depth, ok });
    }

    fn on_throw(&mut self, kind: ErrorKind, message: &str) {
        if self.at_limit() {
            return;
        }
        self.events.push(TraceEvent::Throw {
            kind,
            message: message.to_string(),
        });
    }

    fn on_finalizer(&mut self, ok: bool) {
        if self.at_limit() {
            return;
        }
        self.events.push(TraceEvent::Finalizer { ok });
    }
}
