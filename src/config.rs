//! Adapter configuration.
//!
//! Grounded on `g3-config`'s plain serde struct-of-options style, reworked
//! into an explicit immutable `Config` built through `ConfigBuilder` with
//! per-option validation at `build()` time, preferring a validated
//! immutable configuration value over a mutable struct of public fields.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::{Logger, MetricsCallback};

pub(crate) const DEFAULT_TEMPLATE: &str = "You have access to the following tools:\n\n%s\n\n\
If you need to call a tool, respond with a single JSON array of \
{\"name\": ..., \"parameters\": ...} objects as the very first thing in \
your response, starting at the first token, with no code fences around \
it. Otherwise, respond normally in natural language.";

/// Discipline governing how many tool calls are emitted and whether
/// content is preserved alongside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPolicy {
    /// Emit only the first recognized JSON emission's calls, then stop.
    StopOnFirst,
    /// Keep collecting calls (bounded by count/bytes/time), then stop.
    CollectThenStop,
    /// Suppress all content, accumulate for the whole stream, emit at end.
    DrainAll,
    /// Forward content unchanged; emit tool calls alongside it.
    AllowMixed,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        ToolPolicy::StopOnFirst
    }
}

/// Immutable, validated adapter configuration.
///
/// Constructed once via [`ConfigBuilder`] and shared (typically behind an
/// `Arc`) across requests. Reads nothing but its own fields, so sharing it
/// concurrently across requests needs no further synchronization.
#[derive(Clone)]
pub struct Config {
    pub(crate) prompt_template: String,
    pub(crate) logger: Logger,
    pub(crate) metrics: Option<MetricsCallback>,
    pub(crate) tool_policy: ToolPolicy,
    pub(crate) tool_collect_window: Duration,
    pub(crate) tool_max_calls: usize,
    pub(crate) tool_collect_max_bytes: usize,
    pub(crate) cancel_upstream_on_stop: bool,
    pub(crate) stream_buffer_limit: usize,
    pub(crate) prompt_buffer_reuse_limit: usize,
    pub(crate) stream_look_ahead_limit: usize,
    pub(crate) system_messages_supported: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("prompt_template", &self.prompt_template)
            .field("tool_policy", &self.tool_policy)
            .field("tool_collect_window", &self.tool_collect_window)
            .field("tool_max_calls", &self.tool_max_calls)
            .field("tool_collect_max_bytes", &self.tool_collect_max_bytes)
            .field("cancel_upstream_on_stop", &self.cancel_upstream_on_stop)
            .field("stream_buffer_limit", &self.stream_buffer_limit)
            .field("prompt_buffer_reuse_limit", &self.prompt_buffer_reuse_limit)
            .field("stream_look_ahead_limit", &self.stream_look_ahead_limit)
            .field("system_messages_supported", &self.system_messages_supported)
            .finish()
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::default().build()
    }
}

/// Builder for [`Config`]. Unset options fall back to sensible defaults.
pub struct ConfigBuilder {
    prompt_template: Option<String>,
    logger: Logger,
    metrics: Option<MetricsCallback>,
    tool_policy: ToolPolicy,
    tool_collect_window: Duration,
    tool_max_calls: usize,
    tool_collect_max_bytes: usize,
    cancel_upstream_on_stop: bool,
    stream_buffer_limit: usize,
    prompt_buffer_reuse_limit: usize,
    stream_look_ahead_limit: usize,
    system_messages_supported: bool,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            prompt_template: None,
            logger: Logger::disabled(),
            metrics: None,
            tool_policy: ToolPolicy::default(),
            tool_collect_window: Duration::from_millis(200),
            tool_max_calls: 8,
            tool_collect_max_bytes: 64 * 1024,
            cancel_upstream_on_stop: true,
            stream_buffer_limit: 10 * 1024 * 1024,
            prompt_buffer_reuse_limit: 64 * 1024,
            stream_look_ahead_limit: 0,
            system_messages_supported: false,
        }
    }
}

impl ConfigBuilder {
    /// Override the rendering shell for the tool-definitions block. Must
    /// contain exactly one `%s` placeholder; otherwise the default template
    /// is used and a warning is logged at `build()` time.
    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn metrics(mut self, callback: MetricsCallback) -> Self {
        self.metrics = Some(callback);
        self
    }

    pub fn tool_policy(mut self, policy: ToolPolicy) -> Self {
        self.tool_policy = policy;
        self
    }

    /// `0` disables the collection window timer.
    pub fn tool_collect_window(mut self, window: Duration) -> Self {
        self.tool_collect_window = window;
        self
    }

    /// `0` disables the cap.
    pub fn tool_max_calls(mut self, max: usize) -> Self {
        self.tool_max_calls = max;
        self
    }

    pub fn tool_collect_max_bytes(mut self, max: usize) -> Self {
        self.tool_collect_max_bytes = max;
        self
    }

    pub fn cancel_upstream_on_stop(mut self, cancel: bool) -> Self {
        self.cancel_upstream_on_stop = cancel;
        self
    }

    pub fn stream_buffer_limit(mut self, limit: usize) -> Self {
        self.stream_buffer_limit = limit;
        self
    }

    pub fn prompt_buffer_reuse_limit(mut self, limit: usize) -> Self {
        self.prompt_buffer_reuse_limit = limit;
        self
    }

    /// `0` disables early detection.
    pub fn stream_look_ahead_limit(mut self, limit: usize) -> Self {
        self.stream_look_ahead_limit = limit;
        self
    }

    pub fn system_messages_supported(mut self, supported: bool) -> Self {
        self.system_messages_supported = supported;
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// A custom template with a placeholder count other than one is
    /// rejected in favor of the built-in default, with a logged warning.
    /// This never fails the build.
    pub fn build(self) -> Config {
        let prompt_template = match self.prompt_template {
            Some(template) if placeholder_count(&template) == 1 => template,
            Some(template) => {
                self.logger.warn(&format!(
                    "prompt template has {} '%s' placeholders, expected exactly 1; using default",
                    placeholder_count(&template)
                ));
                DEFAULT_TEMPLATE.to_string()
            }
            None => DEFAULT_TEMPLATE.to_string(),
        };

        Config {
            prompt_template,
            logger: self.logger,
            metrics: self.metrics,
            tool_policy: self.tool_policy,
            tool_collect_window: self.tool_collect_window,
            tool_max_calls: self.tool_max_calls,
            tool_collect_max_bytes: self.tool_collect_max_bytes,
            cancel_upstream_on_stop: self.cancel_upstream_on_stop,
            stream_buffer_limit: self.stream_buffer_limit,
            prompt_buffer_reuse_limit: self.prompt_buffer_reuse_limit,
            stream_look_ahead_limit: self.stream_look_ahead_limit,
            system_messages_supported: self.system_messages_supported,
        }
    }
}

fn placeholder_count(template: &str) -> usize {
    template.matches("%s").count()
}
