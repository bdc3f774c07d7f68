//! Streaming state machine.
//!
//! Grounded on `g3-providers`'s `LLMProvider` async trait (the
//! `next`/`current`/`err`/`close` shape mirrors its streaming contract) and
//! on `EmbeddedProvider`'s `tokio::sync::Mutex`-guarded interior session
//! state. The buffering/collection bookkeeping itself generalizes
//! `embedded/adapters/glm.rs`'s single-shot tool-JSON recognition into a
//! four-policy state machine driven chunk by chunk.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ToolPolicy};
use crate::error::AdapterError;
use crate::extractor;
use crate::id::new_call_id;
use crate::observability::MetricsEvent;
use crate::policy;
use crate::types::{EmittedToolCall, FunctionCall, StreamChunk, ToolCallDelta};
use crate::validator;

/// The four-method contract the adapter both consumes from an upstream and
/// exposes to its own consumer.
#[async_trait]
pub trait UpstreamStream: Send + Sync {
    /// Advance to the next chunk. Returns `false` at stream end.
    async fn next(&self) -> bool;
    /// The chunk made current by the last `next()` call that returned `true`.
    async fn current(&self) -> Option<StreamChunk>;
    /// A terminal error observed by the underlying transport, if any.
    async fn err(&self) -> Option<AdapterError>;
    /// Release the upstream. Idempotent; safe to call concurrently with `next()`.
    async fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectionState {
    Idle,
    Collecting,
    Finished,
}

struct State {
    buffer: String,
    bytes_collected: usize,
    collection_state: CollectionState,
    tool_calls_emitted: bool,
    /// Set only by the terminal tool-emitting transitions (StopOnFirst's
    /// first emission, CollectThenStop's collection close, DrainAll's
    /// buffer finalization), never by AllowMixed, which keeps streaming
    /// after a speculative emission. Gates whether the real upstream finish
    /// chunk gets its `finish_reason` overridden to `"tool_calls"`.
    terminated_by_tool_emission: bool,
    content_suppressed: bool,
    upstream_closed: bool,
    collected_tools: Vec<FunctionCall>,
    collection_start_time: Option<Instant>,
    pending_finish: Option<StreamChunk>,
    done: bool,
    err: Option<AdapterError>,
    processed_chunks: usize,
    output_queue: VecDeque<StreamChunk>,
    current: Option<StreamChunk>,
}

impl State {
    fn new() -> Self {
        Self {
            buffer: String::new(),
            bytes_collected: 0,
            collection_state: CollectionState::Idle,
            tool_calls_emitted: false,
            terminated_by_tool_emission: false,
            content_suppressed: false,
            upstream_closed: false,
            collected_tools: Vec::new(),
            collection_start_time: None,
            pending_finish: None,
            done: false,
            err: None,
            processed_chunks: 0,
            output_queue: VecDeque::new(),
            current: None,
        }
    }
}

/// Wraps an upstream chunk iterator, enforcing one of the four tool
/// policies over it. One instance per response stream; strictly
/// single-consumer.
pub struct StreamAdapter {
    upstream: Box<dyn UpstreamStream>,
    config: Arc<Config>,
    cancellation: CancellationToken,
    state: Mutex<State>,
}

impl StreamAdapter {
    pub fn new(upstream: Box<dyn UpstreamStream>, config: Arc<Config>) -> Self {
        Self {
            upstream,
            config,
            cancellation: CancellationToken::new(),
            state: Mutex::new(State::new()),
        }
    }

    /// A clone of the token that `close()` cancels; exposed so callers can
    /// wire external cancellation (e.g. a client disconnect) into the
    /// adapter without calling `close()` directly.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    async fn observe_cancellation(&self, state: &mut State) {
        if state.done {
            return;
        }
        state.done = true;
        state.err = Some(AdapterError::cancelled("stream cancelled"));
    }

    /// Ingests one upstream chunk, mutating `state` and the output queue.
    /// Returns `true` if the upstream should now be proactively closed.
    fn ingest_chunk(&self, state: &mut State, chunk: StreamChunk) -> bool {
        let content_delta = chunk.content_delta().map(str::to_string);
        let is_finish = chunk.finish_reason().is_some();

        if content_delta.is_none() && !is_finish {
            state.output_queue.push_back(chunk);
            return false;
        }

        let mut close_upstream = false;

        if let Some(delta) = content_delta {
            close_upstream = self.ingest_content_delta(state, &delta);
        }

        if is_finish && !state.done {
            if !state.buffer.is_empty() || state.collection_state == CollectionState::Collecting {
                self.flush_at_stream_end(state);
            }
            if !state.done {
                state.pending_finish = Some(chunk);
            }
        }

        close_upstream
    }

    fn ingest_content_delta(&self, state: &mut State, delta: &str) -> bool {
        match self.config.tool_policy {
            ToolPolicy::AllowMixed => self.handle_allow_mixed(state, delta),
            ToolPolicy::StopOnFirst => self.handle_stop_on_first(state, delta),
            ToolPolicy::CollectThenStop => self.handle_collect_then_stop(state, delta),
            ToolPolicy::DrainAll => self.handle_drain_all(state, delta),
        }
    }

    fn handle_allow_mixed(&self, state: &mut State, delta: &str) -> bool {
        state.output_queue.push_back(StreamChunk::content_chunk(delta.to_string()));

        if !state.buffer.is_empty() || should_start_buffering(delta, self.config.stream_look_ahead_limit) {
            state.buffer.push_str(delta);
            state.bytes_collected += delta.len();

            if let Some((calls, _)) = try_extract_ready(&state.buffer) {
                self.emit_tool_chunk(state, calls, None, false);
                state.buffer.clear();
            }
        }

        self.enforce_safety_cap(state);
        false
    }

    fn handle_stop_on_first(&self, state: &mut State, delta: &str) -> bool {
        if state.tool_calls_emitted {
            return false;
        }

        if state.buffer.is_empty() && !should_start_buffering(delta, self.config.stream_look_ahead_limit) {
            state.output_queue.push_back(StreamChunk::content_chunk(delta.to_string()));
            return false;
        }

        state.buffer.push_str(delta);
        state.bytes_collected += delta.len();

        if let Some((calls, _)) = try_extract_ready(&state.buffer) {
            self.emit_tool_chunk(state, calls, Some("tool_calls"), true);
            state.buffer.clear();
            state.done = true;
            return self.config.cancel_upstream_on_stop;
        }

        self.enforce_safety_cap(state);
        false
    }

    fn handle_collect_then_stop(&self, state: &mut State, delta: &str) -> bool {
        if state.collection_state == CollectionState::Finished {
            return false;
        }

        if state.collection_state == CollectionState::Idle {
            if should_start_buffering(delta, self.config.stream_look_ahead_limit) {
                state.collection_state = CollectionState::Collecting;
                state.collection_start_time = Some(Instant::now());
                state.content_suppressed = true;
            } else {
                state.output_queue.push_back(StreamChunk::content_chunk(delta.to_string()));
                return false;
            }
        }

        state.buffer.push_str(delta);
        state.bytes_collected += delta.len();

        if let Some((calls, _)) = try_extract_ready(&state.buffer) {
            let remaining = remaining_budget(self.config.tool_max_calls, state.collected_tools.len());
            state.collected_tools.extend(calls.into_iter().take(remaining));
            state.buffer.clear();
        }

        if self.collection_should_terminate(state) {
            self.finish_collection(state);
            return self.config.cancel_upstream_on_stop;
        }

        self.enforce_safety_cap(state);
        false
    }

    fn handle_drain_all(&self, state: &mut State, delta: &str) -> bool {
        if state.collection_state == CollectionState::Finished {
            return false;
        }

        state.content_suppressed = true;
        state.buffer.push_str(delta);
        state.bytes_collected += delta.len();

        let over_byte_cap =
            self.config.tool_collect_max_bytes > 0 && state.bytes_collected > self.config.tool_collect_max_bytes;

        if over_byte_cap {
            self.finalize_drain(state);
            return false;
        }

        self.enforce_safety_cap(state);
        false
    }

    fn collection_should_terminate(&self, state: &State) -> bool {
        if self.config.tool_max_calls > 0 && state.collected_tools.len() >= self.config.tool_max_calls {
            return true;
        }
        if self.config.tool_collect_max_bytes > 0 && state.bytes_collected > self.config.tool_collect_max_bytes {
            return true;
        }
        if !self.config.tool_collect_window.is_zero() {
            if let Some(start) = state.collection_start_time {
                if start.elapsed() > self.config.tool_collect_window {
                    return true;
                }
            }
        }
        false
    }

    fn finish_collection(&self, state: &mut State) {
        state.collection_state = CollectionState::Finished;
        let calls = std::mem::take(&mut state.collected_tools);
        state.buffer.clear();
        self.emit_tool_chunk(state, calls, Some("tool_calls"), true);
        state.done = true;
    }

    fn finalize_drain(&self, state: &mut State) {
        state.collection_state = CollectionState::Finished;
        let buffered = std::mem::take(&mut state.buffer);

        match try_extract_ready(&buffered) {
            Some((calls, _)) => self.emit_tool_chunk(state, calls, None, true),
            None => state.output_queue.push_back(StreamChunk::content_chunk(buffered)),
        }
    }

    /// Called when the upstream finish chunk arrives and the buffer/collection
    /// still has unresolved content. Generalizes each policy's "what to do
    /// with a non-empty buffer at stream end" behavior.
    fn flush_at_stream_end(&self, state: &mut State) {
        match self.config.tool_policy {
            ToolPolicy::DrainAll => self.finalize_drain(state),
            ToolPolicy::CollectThenStop if state.collection_state == CollectionState::Collecting => {
                if let Some((calls, _)) = try_extract_ready(&state.buffer) {
                    let remaining = remaining_budget(self.config.tool_max_calls, state.collected_tools.len());
                    state.collected_tools.extend(calls.into_iter().take(remaining));
                }
                self.finish_collection(state);
            }
            _ => {
                if !state.buffer.is_empty() {
                    let leftover = std::mem::take(&mut state.buffer);
                    match try_extract_ready(&leftover) {
                        Some((calls, _)) => {
                            let is_stop_on_first = self.config.tool_policy == ToolPolicy::StopOnFirst;
                            let reason = if is_stop_on_first {
                                state.done = true;
                                Some("tool_calls")
                            } else {
                                None
                            };
                            self.emit_tool_chunk(state, calls, reason, is_stop_on_first);
                        }
                        None => state.output_queue.push_back(StreamChunk::content_chunk(leftover)),
                    }
                }
            }
        }
    }

    fn enforce_safety_cap(&self, state: &mut State) {
        if state.buffer.len() < self.config.stream_buffer_limit {
            return;
        }

        let overflowed = std::mem::take(&mut state.buffer);
        state.bytes_collected = 0;
        state.content_suppressed = false;
        state.collection_state = CollectionState::Idle;

        if self.config.tool_policy == ToolPolicy::AllowMixed {
            // Already forwarded verbatim as it arrived; this buffer is only a
            // speculative copy for tool-call detection, not withheld content.
            self.config.logger.warn("streaming buffer limit reached; dropping speculative tool-call buffer");
            return;
        }

        self.config.logger.warn("streaming buffer limit reached; flushing as raw content");
        state.output_queue.push_back(StreamChunk::content_chunk(overflowed));
    }

    /// Build and queue a tool-call chunk from recovered calls. Empty-named
    /// calls are dropped with a warning; if none remain, an empty content
    /// chunk is emitted instead to preserve the iterator contract.
    ///
    /// `terminal` marks one of the three transitions that end the stream by
    /// emitting a tool call (StopOnFirst's first success, CollectThenStop's
    /// collection close, DrainAll's finalize); it is what lets the real
    /// upstream finish chunk later get its `finish_reason` overridden.
    /// AllowMixed's speculative mid-stream emissions pass `false`.
    fn emit_tool_chunk(
        &self,
        state: &mut State,
        calls: Vec<FunctionCall>,
        finish_reason: Option<&'static str>,
        terminal: bool,
    ) {
        let valid: Vec<FunctionCall> = calls
            .into_iter()
            .filter(|c| {
                if c.name.is_empty() {
                    self.config.logger.warn("dropping streamed tool call with empty name");
                    false
                } else {
                    true
                }
            })
            .collect();

        if valid.is_empty() {
            state.output_queue.push_back(StreamChunk::content_chunk(String::new()));
            return;
        }

        let deltas: Vec<ToolCallDelta> = valid
            .iter()
            .enumerate()
            .map(|(index, call)| {
                let emitted = EmittedToolCall::from_call(new_call_id(), call);
                ToolCallDelta {
                    index: index as u32,
                    id: Some(emitted.id),
                    kind: Some(emitted.kind),
                    function: Some(crate::types::FunctionCallDelta {
                        name: Some(emitted.function.name),
                        arguments: Some(emitted.function.arguments),
                    }),
                }
            })
            .collect();

        state.tool_calls_emitted = true;
        state.content_suppressed = true;
        if terminal {
            state.terminated_by_tool_emission = true;
        }

        if let Some(metrics) = &self.config.metrics {
            metrics.invoke(
                &self.config.logger,
                MetricsEvent::FunctionCallDetection {
                    call_count: valid.len(),
                    call_names: valid.iter().map(|c| c.name.clone()).collect(),
                    content_len: state.bytes_collected,
                    candidate_count: valid.len(),
                    streaming: true,
                    elapsed: std::time::Duration::default(),
                    sub_operations: Vec::new(),
                },
            );
        }

        state
            .output_queue
            .push_back(StreamChunk::tool_call_chunk(deltas, finish_reason.map(str::to_string)));
    }
}

#[async_trait]
impl UpstreamStream for StreamAdapter {
    async fn next(&self) -> bool {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(chunk) = state.output_queue.pop_front() {
                    state.current = Some(chunk);
                    return true;
                }
                if let Some(mut fin) = state.pending_finish.take() {
                    if state.terminated_by_tool_emission {
                        set_finish_reason(&mut fin, "tool_calls");
                    }
                    state.current = Some(fin);
                    state.done = true;
                    return true;
                }
                if state.done {
                    state.current = None;
                    return false;
                }
            }

            if self.cancellation.is_cancelled() {
                let mut state = self.state.lock().await;
                self.observe_cancellation(&mut state).await;
                continue;
            }

            let has_next = self.upstream.next().await;

            if self.cancellation.is_cancelled() {
                let mut state = self.state.lock().await;
                self.observe_cancellation(&mut state).await;
                continue;
            }

            let mut close_upstream = false;
            {
                let mut state = self.state.lock().await;
                if !has_next {
                    if let Some(err) = self.upstream.err().await {
                        state.err = Some(err);
                        state.done = true;
                    } else {
                        if !state.buffer.is_empty() || state.collection_state == CollectionState::Collecting {
                            self.flush_at_stream_end(&mut state);
                        }
                        if !state.done {
                            state.done = true;
                        }
                    }
                } else if let Some(chunk) = self.upstream.current().await {
                    state.processed_chunks += 1;
                    close_upstream = self.ingest_chunk(&mut state, chunk);
                }
            }

            if close_upstream {
                {
                    let mut state = self.state.lock().await;
                    state.upstream_closed = true;
                }
                self.upstream.close().await;
            }
        }
    }

    async fn current(&self) -> Option<StreamChunk> {
        self.state.lock().await.current.clone()
    }

    async fn err(&self) -> Option<AdapterError> {
        let state = self.state.lock().await;
        match (&state.err, state.upstream_closed) {
            (Some(AdapterError::Cancelled(_)), true) => None,
            (other, _) => other.clone(),
        }
    }

    async fn close(&self) {
        self.cancellation.cancel();
        {
            let mut state = self.state.lock().await;
            state.upstream_closed = true;
        }
        self.upstream.close().await;
    }
}

fn remaining_budget(tool_max_calls: usize, already: usize) -> usize {
    if tool_max_calls == 0 {
        usize::MAX
    } else {
        tool_max_calls.saturating_sub(already)
    }
}

fn try_extract_ready(buffer: &str) -> Option<(Vec<FunctionCall>, validator::CandidateShape)> {
    for candidate in extractor::extract(buffer) {
        if let Some(validated) = validator::validate(candidate.text) {
            return Some((validated.calls, validated.shape));
        }
    }
    None
}

fn set_finish_reason(chunk: &mut StreamChunk, reason: &str) {
    if let Some(choice) = chunk.choices.first_mut() {
        choice.finish_reason = Some(reason.to_string());
    }
}

/// The "should start buffering" predicate of §4.6.1.
fn should_start_buffering(fragment: &str, look_ahead_limit: usize) -> bool {
    let trimmed = fragment.trim_start();

    const PREFIXES: [&str; 4] = ["[{\"name\":", "[{\"name\": ", "{\"name\":", "{\"name\": "];
    if PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        return true;
    }

    if (trimmed.starts_with("```json") || trimmed.starts_with("```"))
        && (trimmed.contains("\"name\"") || trimmed.contains("[{"))
    {
        return true;
    }

    if trimmed.contains("`{\"name\"") || trimmed.contains("`[{\"name\"") {
        return true;
    }

    if look_ahead_limit > 0 {
        let window: String = trimmed.chars().take(look_ahead_limit).collect();
        if PREFIXES.iter().any(|p| window.starts_with(p)) {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolPolicy;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct ScriptedUpstream {
        chunks: StdMutex<VecDeque<StreamChunk>>,
        current: StdMutex<Option<StreamChunk>>,
        closed: std::sync::atomic::AtomicBool,
    }

    impl ScriptedUpstream {
        fn new(chunks: Vec<StreamChunk>) -> Self {
            Self {
                chunks: StdMutex::new(chunks.into()),
                current: StdMutex::new(None),
                closed: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl UpstreamStream for ScriptedUpstream {
        async fn next(&self) -> bool {
            let next = self.chunks.lock().unwrap().pop_front();
            let has_next = next.is_some();
            *self.current.lock().unwrap() = next;
            has_next
        }

        async fn current(&self) -> Option<StreamChunk> {
            self.current.lock().unwrap().clone()
        }

        async fn err(&self) -> Option<AdapterError> {
            None
        }

        async fn close(&self) {
            self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn finish_chunk(reason: &str) -> StreamChunk {
        let mut c = StreamChunk::content_chunk("");
        c.choices[0].delta.content = None;
        c.choices[0].finish_reason = Some(reason.to_string());
        c
    }

    async fn drain(adapter: &StreamAdapter) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        while adapter.next().await {
            if let Some(c) = adapter.current().await {
                out.push(c);
            }
        }
        out
    }

    #[tokio::test]
    async fn stop_on_first_emits_tool_calls_and_closes_upstream() {
        let upstream = ScriptedUpstream::new(vec![
            StreamChunk::content_chunk("{\"name\": \"get_weather\", \"parameters\": {}}"),
            finish_chunk("stop"),
        ]);
        let config = Arc::new(Config::builder().tool_policy(ToolPolicy::StopOnFirst).build());
        let adapter = StreamAdapter::new(Box::new(upstream), config);

        let chunks = drain(&adapter).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].choices[0].finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(chunks[0].choices[0].delta.tool_calls.as_ref().unwrap().len(), 1);
        assert!(adapter.err().await.is_none());
    }

    #[tokio::test]
    async fn allow_mixed_forwards_content_and_emits_tool_calls() {
        let upstream = ScriptedUpstream::new(vec![
            StreamChunk::content_chunk("hello "),
            StreamChunk::content_chunk("{\"name\": \"a\"}"),
            finish_chunk("stop"),
        ]);
        let config = Arc::new(Config::builder().tool_policy(ToolPolicy::AllowMixed).build());
        let adapter = StreamAdapter::new(Box::new(upstream), config);

        let chunks = drain(&adapter).await;
        let has_content = chunks.iter().any(|c| c.content_delta() == Some("hello "));
        let has_tool = chunks.iter().any(|c| c.choices[0].delta.tool_calls.is_some());
        assert!(has_content);
        assert!(has_tool);
    }

    // Regression: a speculative mid-stream tool emission under AllowMixed
    // must not corrupt the real upstream finish chunk that follows.
    #[tokio::test]
    async fn allow_mixed_preserves_upstream_finish_reason_after_tool_emission() {
        let upstream = ScriptedUpstream::new(vec![
            StreamChunk::content_chunk("hello "),
            StreamChunk::content_chunk("{\"name\": \"a\"}"),
            StreamChunk::content_chunk(" still talking"),
            finish_chunk("stop"),
        ]);
        let config = Arc::new(Config::builder().tool_policy(ToolPolicy::AllowMixed).build());
        let adapter = StreamAdapter::new(Box::new(upstream), config);

        let chunks = drain(&adapter).await;
        assert!(chunks.iter().any(|c| c.choices[0].delta.tool_calls.is_some()));
        assert_eq!(chunks.last().unwrap().choices[0].finish_reason.as_deref(), Some("stop"));
    }

    // Regression: AllowMixed's safety-cap trip must not re-emit the
    // speculative buffer, since its contents were already streamed verbatim.
    #[tokio::test]
    async fn allow_mixed_safety_cap_does_not_duplicate_forwarded_content() {
        let deltas = vec!["{\"name\": \"a\", \"x\": \"".to_string(), "y".repeat(64)];
        let mut chunks = vec![StreamChunk::content_chunk(deltas[0].clone())];
        chunks.push(StreamChunk::content_chunk(deltas[1].clone()));
        chunks.push(finish_chunk("stop"));

        let upstream = ScriptedUpstream::new(chunks);
        let config = Arc::new(
            Config::builder()
                .tool_policy(ToolPolicy::AllowMixed)
                .stream_buffer_limit(32)
                .build(),
        );
        let adapter = StreamAdapter::new(Box::new(upstream), config);

        let out = drain(&adapter).await;
        let forwarded: String = out.iter().filter_map(|c| c.content_delta()).collect();
        assert_eq!(forwarded, format!("{}{}", deltas[0], deltas[1]));
    }

    // Regression: DrainAll must respect the universal safety cap even when
    // the policy-specific byte cap is disabled. Without the cap, the three
    // chunks below reassemble into one valid JSON object and would extract
    // as a tool call; with the cap forcing an early flush, the object never
    // closes in one piece and the pieces surface as content instead.
    #[tokio::test]
    async fn drain_all_respects_safety_cap_when_byte_cap_disabled() {
        let upstream = ScriptedUpstream::new(vec![
            StreamChunk::content_chunk("{\"name\": \"a\", \"x\": \""),
            StreamChunk::content_chunk("z".repeat(64)),
            StreamChunk::content_chunk("\"}"),
            finish_chunk("stop"),
        ]);
        let config = Arc::new(
            Config::builder()
                .tool_policy(ToolPolicy::DrainAll)
                .tool_collect_max_bytes(0)
                .stream_buffer_limit(32)
                .build(),
        );
        let adapter = StreamAdapter::new(Box::new(upstream), config);

        let chunks = drain(&adapter).await;
        assert!(!chunks.iter().any(|c| c.choices[0].delta.tool_calls.is_some()));
        let total: String = chunks.iter().filter_map(|c| c.content_delta()).collect();
        assert_eq!(total, format!("{}{}{}", "{\"name\": \"a\", \"x\": \"", "z".repeat(64), "\"}"));
    }

    #[tokio::test]
    async fn plain_text_stream_passes_through_unchanged() {
        let upstream = ScriptedUpstream::new(vec![
            StreamChunk::content_chunk("just a "),
            StreamChunk::content_chunk("normal reply"),
            finish_chunk("stop"),
        ]);
        let config = Arc::new(Config::default());
        let adapter = StreamAdapter::new(Box::new(upstream), config);

        let chunks = drain(&adapter).await;
        let text: String = chunks.iter().filter_map(|c| c.content_delta()).collect();
        assert_eq!(text, "just a normal reply");
        assert_eq!(chunks.last().unwrap().choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn drain_all_suppresses_content_until_end() {
        let upstream = ScriptedUpstream::new(vec![
            StreamChunk::content_chunk("{\"name\": \"a\"} "),
            StreamChunk::content_chunk("trailing text"),
            finish_chunk("stop"),
        ]);
        let config = Arc::new(Config::builder().tool_policy(ToolPolicy::DrainAll).build());
        let adapter = StreamAdapter::new(Box::new(upstream), config);

        let chunks = drain(&adapter).await;
        assert!(chunks.iter().any(|c| c.choices[0].delta.tool_calls.is_some()));
        assert!(chunks.iter().all(|c| c.content_delta().is_none()));
    }

    #[tokio::test]
    async fn collect_then_stop_respects_max_calls() {
        let upstream = ScriptedUpstream::new(vec![
            StreamChunk::content_chunk("{\"name\": \"a\"}"),
            StreamChunk::content_chunk("{\"name\": \"b\"}"),
            StreamChunk::content_chunk("{\"name\": \"c\"}"),
            finish_chunk("stop"),
        ]);
        let config = Arc::new(
            Config::builder()
                .tool_policy(ToolPolicy::CollectThenStop)
                .tool_max_calls(2)
                .tool_collect_window(Duration::from_secs(30))
                .build(),
        );
        let adapter = StreamAdapter::new(Box::new(upstream), config);

        let chunks = drain(&adapter).await;
        let tool_chunk = chunks.iter().find(|c| c.choices[0].delta.tool_calls.is_some()).unwrap();
        assert_eq!(tool_chunk.choices[0].delta.tool_calls.as_ref().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn close_masks_self_initiated_cancellation() {
        let upstream = ScriptedUpstream::new(vec![
            StreamChunk::content_chunk("{\"name\": \"a\"}"),
            finish_chunk("stop"),
        ]);
        let config = Arc::new(Config::builder().tool_policy(ToolPolicy::StopOnFirst).build());
        let adapter = StreamAdapter::new(Box::new(upstream), config);

        let _ = drain(&adapter).await;
        assert!(adapter.err().await.is_none());
    }
}
