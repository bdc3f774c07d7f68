//! Function-call validator.
//!
//! Grounded on `g3-providers/src/embedded/adapters/glm.rs`'s tool-name
//! handling, generalized from GLM's single fixed name shape into a
//! dotted prefix/function naming rule, and on the same module's strict
//! `serde_json` decode of the recovered candidate text.

use serde::Deserialize;
use serde_json::Value;

use crate::types::FunctionCall;

/// Whether the validated candidate was a JSON array or a single object.
///
/// Streaming collection semantics (§4.6) treat the two differently: an
/// array candidate is a model's one-shot multi-call emission, while a bare
/// object is typically the first of several separately-buffered calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateShape {
    Array,
    Object,
}

/// A validated candidate: its decoded calls plus the shape it came from.
#[derive(Debug, Clone)]
pub struct ValidatedCandidate {
    pub calls: Vec<FunctionCall>,
    pub shape: CandidateShape,
}

/// Strict wire shape for a single function-call object. `deny_unknown_fields`
/// implements the "unknown fields cause rejection" rule.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCall {
    name: String,
    #[serde(default)]
    parameters: Option<Value>,
}

/// Attempt to validate a single candidate's JSON text.
///
/// Tries array decoding first, then single-object decoding, per §4.2. Any
/// failure (parse error, unknown field, empty array, invalid name) is
/// reported back as `None` so the caller can move on to the next candidate.
pub fn validate(candidate_text: &str) -> Option<ValidatedCandidate> {
    if let Some(calls) = try_array(candidate_text) {
        return Some(ValidatedCandidate { calls, shape: CandidateShape::Array });
    }

    if let Some(call) = try_object(candidate_text) {
        return Some(ValidatedCandidate { calls: vec![call], shape: CandidateShape::Object });
    }

    None
}

fn try_array(text: &str) -> Option<Vec<FunctionCall>> {
    let raw: Vec<RawCall> = serde_json::from_str(text).ok()?;
    if raw.is_empty() {
        return None;
    }

    let mut calls = Vec::with_capacity(raw.len());
    for item in raw {
        if !valid_name(&item.name) {
            return None;
        }
        calls.push(FunctionCall { name: item.name, parameters: item.parameters });
    }
    Some(calls)
}

fn try_object(text: &str) -> Option<FunctionCall> {
    let raw: RawCall = serde_json::from_str(text).ok()?;
    if !valid_name(&raw.name) {
        return None;
    }
    Some(FunctionCall { name: raw.name, parameters: raw.parameters })
}

/// Validate a tool-call name per §4.2.1.
pub fn valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }

    let dot_count = name.matches('.').count();
    if dot_count > 1 {
        return false;
    }

    if dot_count == 0 {
        return name.chars().all(is_plain_char);
    }

    let (prefix, function) = name.split_once('.').expect("dot_count == 1");
    if prefix.is_empty() || function.is_empty() {
        return false;
    }
    if prefix.len() > 64 || function.len() > 64 {
        return false;
    }

    prefix.chars().all(|c| c.is_ascii_alphanumeric()) && function.chars().all(is_plain_char)
}

fn is_plain_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_accept_alphanumeric_underscore_hyphen() {
        assert!(valid_name("get_weather"));
        assert!(valid_name("get-weather2"));
        assert!(!valid_name(""));
        assert!(!valid_name("has space"));
        assert!(!valid_name(&"a".repeat(65)));
    }

    #[test]
    fn dotted_names_require_alphanumeric_prefix() {
        assert!(valid_name("ns.get_weather"));
        assert!(!valid_name("n.s.get_weather"));
        assert!(!valid_name("ns-1.get_weather"));
        assert!(!valid_name(".get_weather"));
        assert!(!valid_name("ns."));
    }

    #[test]
    fn object_candidate_validates() {
        let result = validate(r#"{"name": "get_weather", "parameters": {"city": "nyc"}}"#);
        let validated = result.expect("should validate");
        assert_eq!(validated.shape, CandidateShape::Object);
        assert_eq!(validated.calls[0].name, "get_weather");
    }

    #[test]
    fn object_candidate_without_parameters_is_none() {
        let validated = validate(r#"{"name": "get_weather"}"#).expect("should validate");
        assert_eq!(validated.calls[0].parameters, None);
    }

    #[test]
    fn array_candidate_validates_all_elements() {
        let validated = validate(
            r#"[{"name": "a", "parameters": {}}, {"name": "b"}]"#,
        )
        .expect("should validate");
        assert_eq!(validated.shape, CandidateShape::Array);
        assert_eq!(validated.calls.len(), 2);
    }

    #[test]
    fn empty_array_is_rejected() {
        assert!(validate("[]").is_none());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(validate(r#"{"name": "a", "extra": 1}"#).is_none());
        assert!(validate(r#"[{"name": "a", "extra": 1}]"#).is_none());
    }

    #[test]
    fn invalid_name_in_array_rejects_whole_candidate() {
        assert!(validate(r#"[{"name": "ok"}, {"name": "bad name"}]"#).is_none());
    }

    #[test]
    fn non_json_candidate_is_rejected() {
        assert!(validate("not json").is_none());
    }
}
