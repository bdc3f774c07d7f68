//! Non-streaming response rewriter.
//!
//! Grounded on `g3-providers/src/embedded.rs`'s per-choice tool-call
//! detection pass over a completed generation, generalized into a
//! copy-on-write choices array: the rewriter must never mutate or alias
//! its input.

use std::borrow::Cow;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{AdapterError, Result};
use crate::extractor;
use crate::id::new_call_id;
use crate::observability::{MetricsEvent, SubOperationDuration};
use crate::policy;
use crate::types::{ChatResponse, Choice, EmittedToolCall};
use crate::validator;

/// Recover and apply tool calls to every choice in `response`, per the
/// configured policy.
///
/// Copy-on-write: `response` is returned unchanged (by value, but without
/// any choice being re-allocated) when no choice contains recoverable
/// tool-call JSON.
pub fn transform_response(
    config: &Config,
    cancellation: &CancellationToken,
    response: ChatResponse,
) -> Result<ChatResponse> {
    let mut rewritten: Option<Vec<Choice>> = None;

    for (i, choice) in response.choices.iter().enumerate() {
        if cancellation.is_cancelled() {
            return Err(AdapterError::cancelled("transform_response cancelled"));
        }

        if let Some(new_choice) = rewrite_choice(config, choice) {
            let choices = rewritten.get_or_insert_with(|| response.choices.clone());
            choices[i] = new_choice;
        }
    }

    match rewritten {
        Some(choices) => Ok(ChatResponse { choices, ..response }),
        None => Ok(response),
    }
}

fn rewrite_choice(config: &Config, choice: &Choice) -> Option<Choice> {
    let content = choice.content.as_deref()?;
    if content.is_empty() {
        return None;
    }

    let start = Instant::now();
    let candidates = extractor::extract(content);
    let parse_elapsed = start.elapsed();

    let extraction_start = Instant::now();
    let mut calls = Vec::new();
    for candidate in &candidates {
        if let Some(validated) = validator::validate(candidate.text) {
            calls = validated.calls;
            break;
        }
    }
    let extraction_elapsed = extraction_start.elapsed();

    if calls.is_empty() {
        return None;
    }

    // A non-empty `InvalidFunctionCallBatch` (empty names) is dropped with a
    // warning; if that empties the batch, fall through to leaving the
    // choice untouched (content preserved), per §4.2/§8.
    let (valid_calls, dropped) = drop_empty_named(calls);
    for name in &dropped {
        config.logger.warn(&format!("dropping tool call with empty name (was: {name:?})"));
    }
    if valid_calls.is_empty() {
        return None;
    }

    let capped = policy::cap_calls(valid_calls, config.tool_policy, config.tool_max_calls);
    let keep_content = policy::keeps_content(config.tool_policy);

    let emitted: Vec<EmittedToolCall> =
        capped.iter().map(|call| EmittedToolCall::from_call(new_call_id(), call)).collect();

    let new_content = if keep_content { choice.content.clone() } else { None };
    let finish_reason = policy::finish_reason_for(config.tool_policy, new_content.is_some())
        .map(str::to_string)
        .or_else(|| choice.finish_reason.clone());

    if let Some(metrics) = &config.metrics {
        let call_names: Vec<String> = capped.iter().map(|c| c.name.clone()).collect();
        metrics.invoke(
            &config.logger,
            MetricsEvent::FunctionCallDetection {
                call_count: capped.len(),
                call_names,
                content_len: content.len(),
                candidate_count: candidates.len(),
                streaming: false,
                elapsed: start.elapsed(),
                sub_operations: vec![
                    SubOperationDuration { name: "json_parsing", duration: parse_elapsed },
                    SubOperationDuration { name: "call_extraction", duration: extraction_elapsed },
                ],
            },
        );
    }

    Some(Choice {
        index: choice.index,
        content: new_content,
        tool_calls: Some(emitted),
        finish_reason,
        extra: choice.extra.clone(),
    })
}

fn drop_empty_named(calls: Vec<crate::types::FunctionCall>) -> (Vec<crate::types::FunctionCall>, Vec<Cow<'static, str>>) {
    let mut kept = Vec::with_capacity(calls.len());
    let mut dropped = Vec::new();

    for call in calls {
        if call.name.is_empty() {
            dropped.push(Cow::Borrowed("<empty>"));
        } else {
            kept.push(call);
        }
    }

    (kept, dropped)
}
