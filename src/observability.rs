//! Logger and metrics contracts.
//!
//! Grounded on the pervasive `tracing::{debug,info,warn,error}` logging
//! throughout the ancestor provider crates (e.g. `g3-providers/src/embedded.rs`)
//! and on `g3-core`'s `std::panic::catch_unwind` pattern for isolating a
//! fallible callback from the surrounding control flow.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Minimum severity a [`Logger`] will forward.
///
/// Ordered from least to most severe; `Off` disables logging entirely and
/// is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

/// Structured log sink.
///
/// By default this forwards events through the `tracing` facade, a no-op
/// until the embedder installs a subscriber. [`Logger::at_level`] additionally
/// filters by a minimum level
/// before forwarding, for embedders who want filtering without wiring up a
/// global subscriber.
#[derive(Clone)]
pub struct Logger {
    min_level: LogLevel,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("min_level", &self.min_level).finish()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Logger {
    /// Disabled logger: `min_level` above `Error`, nothing is ever forwarded.
    pub fn disabled() -> Self {
        Self { min_level: LogLevel::Off }
    }

    /// Construct a logger that forwards events at or above `level`.
    pub fn at_level(level: LogLevel) -> Self {
        Self { min_level: level }
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    pub fn warn(&self, message: &str) {
        if self.enabled(LogLevel::Warn) {
            tracing::warn!("{message}");
        }
    }

    pub fn error(&self, message: &str) {
        if self.enabled(LogLevel::Error) {
            tracing::error!("{message}");
        }
    }

    pub fn debug(&self, message: &str) {
        if self.enabled(LogLevel::Debug) {
            tracing::debug!("{message}");
        }
    }

    pub fn info(&self, message: &str) {
        if self.enabled(LogLevel::Info) {
            tracing::info!("{message}");
        }
    }
}

/// A sub-operation's measured duration within function-call detection.
#[derive(Debug, Clone)]
pub struct SubOperationDuration {
    pub name: &'static str,
    pub duration: Duration,
}

/// A single metrics event, passed to the embedder's [`MetricsCallback`].
#[derive(Debug, Clone)]
pub enum MetricsEvent {
    /// Emitted after a request has been rewritten to inject tool
    /// instructions.
    ToolTransformation {
        tool_count: usize,
        tool_names: Vec<String>,
        prompt_len: usize,
        elapsed: Duration,
    },
    /// Emitted after a function-call detection pass (streaming or not).
    FunctionCallDetection {
        call_count: usize,
        call_names: Vec<String>,
        content_len: usize,
        candidate_count: usize,
        streaming: bool,
        elapsed: Duration,
        sub_operations: Vec<SubOperationDuration>,
    },
}

/// Panic-isolated metrics hook.
///
/// Cloning is cheap (an `Arc` to the underlying closure), so a `Config` can
/// be shared across requests along with its callback.
#[derive(Clone)]
pub struct MetricsCallback {
    inner: Arc<dyn Fn(MetricsEvent) + Send + Sync>,
}

impl MetricsCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(MetricsEvent) + Send + Sync + 'static,
    {
        Self { inner: Arc::new(callback) }
    }

    /// Invoke the callback, recovering from any panic it raises.
    ///
    /// A panicking callback is logged and otherwise ignored; it must never
    /// propagate into the adapter's control flow.
    pub fn invoke(&self, logger: &Logger, event: MetricsEvent) {
        let inner = &self.inner;
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| inner(event)));

        if result.is_err() {
            logger.error("metrics callback panicked; continuing");
        }
    }
}

impl fmt::Debug for MetricsCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MetricsCallback(..)")
    }
}
