//! Shared tool-policy decisions.
//!
//! Grounded on `g3-providers/src/embedded/adapters/mod.rs`'s
//! `ToolFormatAdapter`/`AdapterOutput` shape: a single place that decides,
//! given a format adapter's recovered calls, how many survive and what
//! happens to surrounding content. Here that decision is shared between
//! the non-streaming rewriter (`response.rs`) and the streaming state
//! machine (`streaming.rs`).

use crate::config::ToolPolicy;
use crate::types::FunctionCall;

/// Truncate `calls` to the number the policy and `tool_max_calls` allow.
///
/// `StopOnFirst` always keeps exactly the first call regardless of
/// `tool_max_calls`; the other policies cap at `tool_max_calls` (`0` means
/// uncapped).
pub fn cap_calls(calls: Vec<FunctionCall>, policy: ToolPolicy, tool_max_calls: usize) -> Vec<FunctionCall> {
    let limit = match policy {
        ToolPolicy::StopOnFirst => 1,
        _ if tool_max_calls == 0 => usize::MAX,
        _ => tool_max_calls,
    };
    calls.into_iter().take(limit).collect()
}

/// Whether surrounding textual content survives alongside emitted calls.
pub fn keeps_content(policy: ToolPolicy) -> bool {
    matches!(policy, ToolPolicy::AllowMixed)
}

/// The `finish_reason` to report for a choice/chunk that emitted at least
/// one tool call, given whether non-empty content is also being kept.
pub fn finish_reason_for(policy: ToolPolicy, content_present: bool) -> Option<&'static str> {
    match policy {
        ToolPolicy::AllowMixed if content_present => None,
        _ => Some("tool_calls"),
    }
}
