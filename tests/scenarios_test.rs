//! End-to-end scenarios exercising each tool policy across both the
//! non-streaming and streaming entry points, plus tool-result ingestion.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Map;
use tool_call_adapter::{
    Adapter, AdapterError, ChatMessage, ChatRequest, ChatResponse, Choice, Config, MessageContent,
    Role, StreamChunk, ToolDefinition, ToolPolicy, UpstreamStream,
};

fn weather_tool() -> ToolDefinition {
    ToolDefinition {
        name: "get_weather".to_string(),
        description: Some("Look up current weather".to_string()),
        parameters: Some(serde_json::json!({"city": "string"})),
        strict: None,
    }
}

fn choice(content: &str) -> Choice {
    Choice {
        index: 0,
        content: Some(content.to_string()),
        tool_calls: None,
        finish_reason: Some("stop".to_string()),
        extra: Map::new(),
    }
}

fn request_with_tools(tools: Vec<ToolDefinition>) -> ChatRequest {
    ChatRequest {
        model: "m".to_string(),
        messages: vec![ChatMessage::user("what's the weather in nyc?")],
        tools: Some(tools),
        tool_choice: None,
        stream: None,
        extra: Map::new(),
    }
}

struct ScriptedUpstream {
    chunks: Mutex<VecDeque<StreamChunk>>,
    current: Mutex<Option<StreamChunk>>,
    closed: AtomicBool,
}

impl ScriptedUpstream {
    fn new(chunks: Vec<StreamChunk>) -> Self {
        Self {
            chunks: Mutex::new(chunks.into()),
            current: Mutex::new(None),
            closed: AtomicBool::new(false),
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
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn finish_chunk(reason: &str) -> StreamChunk {
    let mut c = StreamChunk::content_chunk("");
    c.choices[0].delta.content = None;
    c.choices[0].finish_reason = Some(reason.to_string());
    c
}

async fn drain(stream: &(dyn UpstreamStream)) -> Vec<StreamChunk> {
    let mut out = Vec::new();
    while stream.next().await {
        if let Some(c) = stream.current().await {
            out.push(c);
        }
    }
    out
}

// 1. Non-streaming, StopOnFirst: a single recognized call replaces the
// choice's content and sets finish_reason to "tool_calls".
#[test]
fn non_streaming_stop_on_first() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let adapter = Adapter::new(Config::builder().tool_policy(ToolPolicy::StopOnFirst).build());
    let response = ChatResponse {
        choices: vec![choice(r#"{"name": "get_weather", "parameters": {"city": "nyc"}}"#)],
        extra: Map::new(),
    };

    let out = adapter.transform_response(response).unwrap();
    assert!(out.choices[0].content.is_none());
    let calls = out.choices[0].tool_calls.as_ref().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].function.name, "get_weather");
    assert_eq!(out.choices[0].finish_reason.as_deref(), Some("tool_calls"));
}

// 2. Non-streaming, DrainAll, multiple choices: each choice is rewritten
// independently and the cap on emitted calls holds per choice.
#[test]
fn non_streaming_drain_all_multi_choice() {
    let adapter = Adapter::new(
        Config::builder().tool_policy(ToolPolicy::DrainAll).tool_max_calls(2).build(),
    );
    let response = ChatResponse {
        choices: vec![
            choice(r#"[{"name": "a"}, {"name": "b"}, {"name": "c"}]"#),
            choice("no tools here, just prose"),
        ],
        extra: Map::new(),
    };

    let out = adapter.transform_response(response).unwrap();
    assert_eq!(out.choices[0].tool_calls.as_ref().unwrap().len(), 2);
    assert!(out.choices[1].tool_calls.is_none());
    assert_eq!(out.choices[1].content.as_deref(), Some("no tools here, just prose"));
}

// 3. Streaming, StopOnFirst: upstream is closed as soon as the first JSON
// emission completes, and the terminal chunk carries finish_reason
// "tool_calls".
#[tokio::test]
async fn streaming_stop_on_first() {
    let adapter = Adapter::new(Config::builder().tool_policy(ToolPolicy::StopOnFirst).build());
    let upstream = ScriptedUpstream::new(vec![
        StreamChunk::content_chunk(r#"{"name": "get_weather", "parameters": {"city": "nyc"}}"#),
        finish_chunk("stop"),
    ]);
    let stream = adapter.transform_streaming_response(Box::new(upstream));

    let chunks = drain(&stream).await;
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].choices[0].finish_reason.as_deref(), Some("tool_calls"));
}

// 4. Streaming, CollectThenStop with a tool_max_calls limit: collection
// stops once the cap is reached even though more valid calls are pending.
#[tokio::test]
async fn streaming_collect_then_stop_limits() {
    let adapter = Adapter::new(
        Config::builder()
            .tool_policy(ToolPolicy::CollectThenStop)
            .tool_max_calls(2)
            .tool_collect_window(Duration::from_secs(30))
            .build(),
    );
    let upstream = ScriptedUpstream::new(vec![
        StreamChunk::content_chunk(r#"{"name": "a"}"#),
        StreamChunk::content_chunk(r#"{"name": "b"}"#),
        StreamChunk::content_chunk(r#"{"name": "c"}"#),
        finish_chunk("stop"),
    ]);
    let stream = adapter.transform_streaming_response(Box::new(upstream));

    let chunks = drain(&stream).await;
    let tool_chunk = chunks.iter().find(|c| c.choices[0].delta.tool_calls.is_some()).unwrap();
    assert_eq!(tool_chunk.choices[0].delta.tool_calls.as_ref().unwrap().len(), 2);
    assert_eq!(tool_chunk.choices[0].finish_reason.as_deref(), Some("tool_calls"));
}

// 5. Streaming, AllowMixed: plain content is forwarded unchanged and tool
// calls are emitted as an additional chunk alongside it.
#[tokio::test]
async fn streaming_allow_mixed() {
    let adapter = Adapter::new(Config::builder().tool_policy(ToolPolicy::AllowMixed).build());
    let upstream = ScriptedUpstream::new(vec![
        StreamChunk::content_chunk("Let me check that. "),
        StreamChunk::content_chunk(r#"{"name": "get_weather"}"#),
        finish_chunk("stop"),
    ]);
    let stream = adapter.transform_streaming_response(Box::new(upstream));

    let chunks = drain(&stream).await;
    let text: String = chunks.iter().filter_map(|c| c.content_delta()).collect();
    assert_eq!(text, "Let me check that. ");
    assert!(chunks.iter().any(|c| c.choices[0].delta.tool_calls.is_some()));
}

// 6. Tool-result ingestion: a prior tool-role message is stripped from the
// conversation and rendered as natural-language context alongside the
// tool-definitions instruction block.
#[test]
fn tool_result_ingestion() {
    let adapter = Adapter::new(Config::default());
    let mut request = request_with_tools(vec![weather_tool()]);
    request.messages.push(ChatMessage {
        role: Role::Tool,
        content: MessageContent::Text("72F and sunny".to_string()),
        tool_call_id: Some("call_abc".to_string()),
        extra: Map::new(),
    });

    let out = adapter.transform_request(request);
    assert!(out.tools.is_none());
    assert_eq!(out.messages.len(), 1);

    let text = match &out.messages[0].content {
        MessageContent::Text(t) => t.clone(),
        _ => panic!("expected text content"),
    };
    assert!(text.contains("get_weather"));
    assert!(text.contains("Tool call call_abc result:"));
    assert!(text.contains("72F and sunny"));
}
