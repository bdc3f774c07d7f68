//! Tool-call ID generation.
//!
//! Generates `call_` + a time-ordered 128-bit identifier (UUID v7). On the
//! rare failure of the time-ordered generator this falls back to a random
//! v4 identifier and logs an error.

use uuid::Uuid;

/// Generate a new tool-call ID of the form `call_<uuid>`.
///
/// `Uuid::now_v7()` cannot fail on supported platforms, but the fallback
/// path is kept so that a future `uuid` release exposing a fallible
/// constructor (e.g. one dependent on a monotonic clock source) degrades
/// gracefully instead of panicking.
pub fn new_call_id() -> String {
    let id = std::panic::catch_unwind(Uuid::now_v7).unwrap_or_else(|_| {
        tracing::error!("time-ordered id generation failed, falling back to random id");
        Uuid::new_v4()
    });

    format!("call_{id}")
}
