//! Adapter error taxonomy.
//!
//! Grounded on the ancestor provider crates' per-crate error enums (each
//! defines its own error surface); narrowed to `thiserror` alone since
//! this crate has a closed, typed error surface rather than an application
//! binary's need for `anyhow`'s opaque propagation (see DESIGN.md).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdapterError>;

/// Errors the adapter surfaces to its caller.
///
/// Most malformed-input conditions never reach this enum at all: an
/// invalid prompt template is downgraded to a logged warning, a panicking
/// metrics callback is recovered and logged, and unparseable or
/// schema-invalid tool-call JSON is silently skipped. Only cancellation
/// and genuine upstream transport failures bubble up.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// The caller or the adapter itself cancelled an in-flight operation.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// The upstream iterator reported a terminal error.
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl AdapterError {
    pub fn cancelled(reason: impl Into<String>) -> Self {
        AdapterError::Cancelled(reason.into())
    }

    pub fn upstream(reason: impl Into<String>) -> Self {
        AdapterError::Upstream(reason.into())
    }
}
