//! Protocol-agnostic chat types.
//!
//! The wire format a caller speaks (OpenAI chat-completions JSON, or
//! anything schema-compatible with it) is intentionally out of scope for
//! this crate; only the fields the transformation logic actually reads or
//! writes are modeled here. Every public type carries a `#[serde(flatten)]`
//! catch-all so that fields this crate doesn't know about survive an
//! untouched round trip instead of being silently dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sender role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single content part of a multimodal message.
///
/// Only `Text` parts are interpreted by the rewriter; anything else is
/// retained unchanged, per the multimodal preservation rule in §4.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentPart {
    Text {
        #[serde(rename = "type")]
        kind: TextKind,
        text: String,
    },
    Other(Value),
}

/// Marker so `ContentPart::Text` round-trips as `{"type": "text", "text": "..."}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextKind {
    Text,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text {
            kind: TextKind::Text,
            text: text.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text, .. } => Some(text),
            ContentPart::Other(_) => None,
        }
    }
}

/// Message content, either a plain string or a list of parts.
///
/// The untagged representation mirrors the OpenAI wire shape, where a
/// message's `content` is either a bare string or an array of content
/// blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(s) => s.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }

    /// Concatenate all text parts with a given separator; non-text parts are ignored.
    pub fn text_only(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(ContentPart::as_text)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
            tool_call_id: None,
            extra: Map::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// A tool/function definition offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parameters: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub strict: Option<bool>,
}

/// A previous tool invocation's result, ingested from a `tool`-role message.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
}

/// A function call recovered from model output, prior to ID assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON text of the arguments, or `None` if the model omitted them
    /// (serialized downstream as the literal `null`).
    pub parameters: Option<Value>,
}

/// A tool call as emitted to the caller, with an assigned ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ToolCallKind,
    pub function: EmittedFunctionCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallKind {
    Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedFunctionCall {
    pub name: String,
    /// JSON-encoded arguments string; `"null"` when parameters are absent.
    pub arguments: String,
}

impl EmittedToolCall {
    pub fn from_call(id: String, call: &FunctionCall) -> Self {
        let arguments = match &call.parameters {
            Some(value) => serde_json::to_string(value).unwrap_or_else(|_| "null".to_string()),
            None => "null".to_string(),
        };

        Self {
            id,
            kind: ToolCallKind::Function,
            function: EmittedFunctionCall {
                name: call.name.clone(),
                arguments,
            },
        }
    }
}

/// A non-streaming chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stream: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single choice in a non-streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<EmittedToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub finish_reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A non-streaming chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Incremental delta for a single tool call within a streaming chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub kind: Option<ToolCallKind>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub function: Option<FunctionCallDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub arguments: Option<String>,
}

/// The incremental content of a single streaming chunk choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub finish_reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single streamed chunk of a chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub choices: Vec<ChunkChoice>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StreamChunk {
    /// The non-empty text delta in the first choice, if any.
    pub fn content_delta(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// The non-empty finish reason in the first choice, if any.
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn content_chunk(text: impl Into<String>) -> Self {
        Self {
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: None,
                    content: Some(text.into()),
                    tool_calls: None,
                },
                finish_reason: None,
                extra: Map::new(),
            }],
            extra: Map::new(),
        }
    }

    pub fn tool_call_chunk(deltas: Vec<ToolCallDelta>, finish_reason: Option<String>) -> Self {
        Self {
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: Some(Role::Assistant),
                    content: None,
                    tool_calls: Some(deltas),
                },
                finish_reason,
                extra: Map::new(),
            }],
            extra: Map::new(),
        }
    }
}
