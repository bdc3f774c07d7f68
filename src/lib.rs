//! Retrofits OpenAI-style function/tool calling onto chat models that lack
//! native tool support.
//!
//! Sits between an OpenAI-schema caller and a free-form-prompt inference
//! backend: it rewrites outgoing requests to instruct the model in plain
//! language, then recovers structured tool calls from whatever JSON the
//! model emits in its reply, either all at once (`transform_response`) or
//! incrementally as the reply streams in (`transform_streaming_response`).
//!
//! Grounded on `g3-providers`'s top-level module layout: a small set of
//! public re-exports from the crate root, with the actual logic split
//! across focused submodules.

mod config;
mod error;
mod extractor;
mod id;
mod observability;
mod policy;
mod prompt;
mod response;
mod rewriter;
mod streaming;
mod types;
mod validator;

use std::sync::Arc;

pub use config::{Config, ConfigBuilder, ToolPolicy};
pub use error::{AdapterError, Result};
pub use observability::{LogLevel, Logger, MetricsCallback, MetricsEvent, SubOperationDuration};
pub use streaming::{StreamAdapter, UpstreamStream};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, Choice, ChunkChoice, ChunkDelta, ContentPart,
    EmittedFunctionCall, EmittedToolCall, FunctionCall, FunctionCallDelta, MessageContent, Role,
    StreamChunk, TextKind, ToolCallDelta, ToolCallKind, ToolDefinition, ToolResult,
};

use prompt::PromptBuilder;
use tokio_util::sync::CancellationToken;

/// The entry point: retrofits tool calling for a single backend, per a
/// shared [`Config`].
///
/// Cheap to clone (an `Arc` around the immutable configuration and the
/// prompt-buffer pool); safe to share across concurrent requests.
#[derive(Clone)]
pub struct Adapter {
    config: Arc<Config>,
    prompt_builder: Arc<PromptBuilder>,
}

impl Adapter {
    pub fn new(config: Config) -> Self {
        let prompt_builder = PromptBuilder::new(config.prompt_template.clone(), config.prompt_buffer_reuse_limit);
        Self { config: Arc::new(config), prompt_builder: Arc::new(prompt_builder) }
    }

    /// Strip tool definitions and tool-result messages out of `request`,
    /// replacing them with a natural-language instruction block. Returns
    /// `request` unchanged when it carries neither.
    pub fn transform_request(&self, request: ChatRequest) -> ChatRequest {
        let start = std::time::Instant::now();
        let outcome = rewriter::rewrite(&self.config, &self.prompt_builder, request);

        if !outcome.tool_names.is_empty() {
            if let Some(metrics) = &self.config.metrics {
                metrics.invoke(
                    &self.config.logger,
                    MetricsEvent::ToolTransformation {
                        tool_count: outcome.tool_names.len(),
                        tool_names: outcome.tool_names,
                        prompt_len: outcome.prompt_len,
                        elapsed: start.elapsed(),
                    },
                );
            }
        }

        outcome.request
    }

    /// Recover tool calls from a completed, non-streaming response.
    pub fn transform_response(&self, response: ChatResponse) -> Result<ChatResponse> {
        let token = CancellationToken::new();
        response::transform_response(&self.config, &token, response)
    }

    /// Same as [`Self::transform_response`], but observes cancellation via
    /// a caller-supplied token rather than an adapter-internal one.
    pub fn transform_response_cancellable(
        &self,
        cancellation: &CancellationToken,
        response: ChatResponse,
    ) -> Result<ChatResponse> {
        response::transform_response(&self.config, cancellation, response)
    }

    /// Wrap an upstream chunk iterator, applying the streaming state
    /// machine configured by this adapter's [`ToolPolicy`].
    pub fn transform_streaming_response(&self, upstream: Box<dyn UpstreamStream>) -> StreamAdapter {
        StreamAdapter::new(upstream, Arc::clone(&self.config))
    }
}
