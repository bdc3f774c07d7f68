//! Prompt builder.
//!
//! Grounded on the buffer-reuse pattern used for chunk assembly in
//! `g3-providers/src/embedded/streaming.rs`, generalized from reusing
//! per-chunk string buffers into a pool of prompt-assembly buffers bounded
//! by a configured retention threshold.

use std::sync::Mutex;

use crate::types::ToolDefinition;

/// Renders a list of tool definitions into the single instruction string
/// substituted into the configured template.
pub struct PromptBuilder {
    template: String,
    buffer_reuse_limit: usize,
    pool: Mutex<Vec<String>>,
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>, buffer_reuse_limit: usize) -> Self {
        Self {
            template: template.into(),
            buffer_reuse_limit,
            pool: Mutex::new(Vec::new()),
        }
    }

    /// Render `tools` into the template, returning the finished prompt and
    /// the length of the rendered tool-definitions block (for metrics).
    pub fn render(&self, tools: &[ToolDefinition]) -> (String, usize) {
        let mut block = self.take_buffer();
        render_tool_block(tools, &mut block);
        let block_len = block.len();

        let rendered = self.template.replacen("%s", &block, 1);
        self.return_buffer(block);

        (rendered, block_len)
    }

    fn take_buffer(&self) -> String {
        self.pool.lock().unwrap().pop().unwrap_or_default()
    }

    fn return_buffer(&self, mut buffer: String) {
        buffer.clear();
        if buffer.capacity() <= self.buffer_reuse_limit {
            self.pool.lock().unwrap().push(buffer);
        }
        // else: dropped, to bound steady-state pool memory.
    }
}

fn render_tool_block(tools: &[ToolDefinition], out: &mut String) {
    for (i, tool) in tools.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }

        out.push_str("- ");
        out.push_str(&tool.name);
        if let Some(description) = &tool.description {
            out.push_str(": ");
            out.push_str(description);
        }
        out.push('\n');

        if let Some(parameters) = &tool.parameters {
            out.push_str("  Parameters: ");
            match serde_json::to_string(parameters) {
                Ok(compact) => out.push_str(&compact),
                Err(_) => out.push_str("null"),
            }
            out.push('\n');
        }

        if tool.strict == Some(true) {
            out.push_str("  Strict: true\n");
        }
    }

    // Each tool block ends with a trailing newline from its own rendering;
    // trim the final one so adjacent tools are separated by exactly one.
    while out.ends_with('\n') {
        out.pop();
    }
}
