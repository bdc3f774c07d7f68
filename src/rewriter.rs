//! Message rewriter.
//!
//! Grounded on `g3-providers`'s `Message`/`MessageRole` model and on
//! `embedded.rs`'s `format_messages` role-placement logic (deciding where
//! in a message list a synthesized instruction belongs relative to
//! existing system/user turns), generalized from GLM's single fixed
//! placement into a four-way placement rule.

use crate::config::Config;
use crate::prompt::PromptBuilder;
use crate::types::{ChatMessage, ChatRequest, ContentPart, MessageContent, Role, ToolResult};

/// Result of rewriting a request, carrying what's needed for the
/// tool-transformation metrics event alongside the rewritten request.
pub struct RewriteOutcome {
    pub request: ChatRequest,
    pub tool_names: Vec<String>,
    pub prompt_len: usize,
}

/// Rewrite `req`: strip tool-result messages, inject tool-definition and
/// tool-result instructions, and clear `tools`/`tool_choice`.
///
/// Returns the request unchanged when there are neither tool definitions
/// nor tool-result messages (the identity case required by §9).
pub fn rewrite(config: &Config, prompt_builder: &PromptBuilder, mut req: ChatRequest) -> RewriteOutcome {
    let has_tools = req.tools.as_ref().is_some_and(|t| !t.is_empty());
    let has_tool_results = req.messages.iter().any(is_tool_result_message);

    if !has_tools && !has_tool_results {
        return RewriteOutcome { request: req, tool_names: Vec::new(), prompt_len: 0 };
    }

    let tool_names = req
        .tools
        .as_ref()
        .map(|t| t.iter().map(|d| d.name.clone()).collect())
        .unwrap_or_default();

    let tool_block = if has_tools {
        let (rendered, _) = prompt_builder.render(req.tools.as_deref().unwrap_or_default());
        Some(rendered)
    } else {
        None
    };

    let (remaining, results) = extract_tool_results(std::mem::take(&mut req.messages));
    req.messages = remaining;

    let result_block = if !results.is_empty() { Some(render_tool_results(&results)) } else { None };

    let instruction = match (tool_block, result_block) {
        (Some(t), Some(r)) => format!("{t}\n\n{r}"),
        (Some(t), None) => t,
        (None, Some(r)) => r,
        (None, None) => String::new(),
    };
    let prompt_len = instruction.len();

    inject_instruction(&mut req.messages, &instruction, config.system_messages_supported);

    req.tools = None;
    req.tool_choice = None;

    RewriteOutcome { request: req, tool_names, prompt_len }
}

fn is_tool_result_message(message: &ChatMessage) -> bool {
    matches!(message.role, Role::Tool)
}

fn extract_tool_results(messages: Vec<ChatMessage>) -> (Vec<ChatMessage>, Vec<ToolResult>) {
    let mut remaining = Vec::with_capacity(messages.len());
    let mut results = Vec::new();

    for message in messages {
        if is_tool_result_message(&message) {
            results.push(ToolResult {
                call_id: message.tool_call_id.clone().unwrap_or_default(),
                content: message.content.text_only(),
            });
        } else {
            remaining.push(message);
        }
    }

    (remaining, results)
}

fn render_tool_results(results: &[ToolResult]) -> String {
    let mut out = String::from("Previous tool calls requested by you returned the following results:");

    for (i, result) in results.iter().enumerate() {
        out.push_str("\n\n");
        if result.call_id.is_empty() {
            out.push_str(&format!("Tool result {}:\n", i + 1));
        } else {
            out.push_str(&format!("Tool call {} result:\n", result.call_id));
        }
        out.push_str(&result.content);
    }

    out
}

fn inject_instruction(messages: &mut Vec<ChatMessage>, instruction: &str, system_messages_supported: bool) {
    if let Some(idx) = messages.iter().rposition(|m| m.role == Role::System) {
        append_to_system_message(&mut messages[idx], instruction);
        return;
    }

    if let Some(idx) = messages.iter().position(|m| m.role == Role::User) {
        if !system_messages_supported {
            prepend_to_user_message(&mut messages[idx], instruction);
        } else {
            messages.insert(0, ChatMessage::system(instruction.to_string()));
        }
        return;
    }

    if system_messages_supported {
        messages.insert(0, ChatMessage::system(instruction.to_string()));
    } else {
        messages.insert(0, ChatMessage::user(instruction.to_string()));
    }
}

fn append_to_system_message(message: &mut ChatMessage, instruction: &str) {
    match &mut message.content {
        MessageContent::Text(existing) => {
            existing.push_str("\n\n");
            existing.push_str(instruction);
        }
        MessageContent::Parts(parts) => {
            parts.push(ContentPart::text(instruction.to_string()));
        }
    }
}

fn prepend_to_user_message(message: &mut ChatMessage, instruction: &str) {
    match &mut message.content {
        MessageContent::Text(existing) => {
            *existing = format!("{instruction}\n\n{existing}");
        }
        MessageContent::Parts(parts) => {
            let combined_text = parts
                .iter()
                .filter_map(ContentPart::as_text)
                .collect::<Vec<_>>()
                .join(" ");
            let non_text: Vec<ContentPart> = std::mem::take(parts)
                .into_iter()
                .filter(|p| p.as_text().is_none())
                .collect();

            let lead = if combined_text.is_empty() {
                instruction.to_string()
            } else {
                format!("{instruction}\n\n{combined_text}")
            };

            parts.push(ContentPart::text(lead));
            parts.extend(non_text);
        }
    }
}
