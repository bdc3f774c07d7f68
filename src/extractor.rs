//! Tolerant JSON candidate extraction from free-form model output.
//!
//! Grounded on `g3-providers/src/embedded/adapters/glm.rs`'s hand-rolled
//! `ParseState`/`JsonState` scanner, generalized from GLM's single
//! `<|assistant|>`-prefixed format into three recognizers
//! (triple-backtick fence, single-backtick fence, bare `{`/`[` structure)
//! and driven by an explicit bracket-depth stack rather than GLM's
//! brace-counter, so nested arrays-of-objects are handled as well as
//! nested objects.

use std::collections::HashSet;

/// A candidate span recovered from the input text.
///
/// Candidates are transient: this type borrows from the input it was
/// extracted from and is not meant to outlive a single `extract` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonCandidate<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    InStructure,
    InString,
    InEscape,
}

/// Scan `input` for candidate JSON blocks, in first-seen order, deduplicated
/// by exact text equality.
pub fn extract(input: &str) -> Vec<JsonCandidate<'_>> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let len = chars.len();
    let byte_len = input.len();

    let mut candidates: Vec<JsonCandidate<'_>> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut pos = 0usize;

    while pos < len {
        let c = chars[pos].1;

        if c == '`' {
            if let Some(outcome) = try_fenced(input, &chars, pos, byte_len) {
                match outcome {
                    FenceOutcome::Matched(candidate, next) => {
                        push_unique(&mut candidates, &mut seen, candidate);
                        pos = next;
                        continue;
                    }
                    FenceOutcome::SkippedNonJson(next) => {
                        pos = next;
                        continue;
                    }
                    FenceOutcome::UnterminatedConsumedRest => break,
                }
            }
        }

        if c == '{' || c == '[' {
            if let Some((candidate, next)) = try_bare_structure(input, &chars, pos, byte_len) {
                push_unique(&mut candidates, &mut seen, candidate);
                pos = next;
                continue;
            }
        }

        // Progress guarantee: no recognizer matched at `pos`, advance by one
        // character to guarantee termination.
        pos += 1;
    }

    candidates
}

fn push_unique<'a>(
    out: &mut Vec<JsonCandidate<'a>>,
    seen: &mut HashSet<&'a str>,
    candidate: JsonCandidate<'a>,
) {
    if seen.insert(candidate.text) {
        out.push(candidate);
    }
}

enum FenceOutcome<'a> {
    Matched(JsonCandidate<'a>, usize),
    SkippedNonJson(usize),
    UnterminatedConsumedRest,
}

/// Try to recognize a triple- or single-backtick fenced block starting at
/// `pos`. Returns `None` if `pos` isn't the start of a fence at all (so the
/// caller can fall through to other recognizers).
fn try_fenced<'a>(
    input: &'a str,
    chars: &[(usize, char)],
    pos: usize,
    byte_len: usize,
) -> Option<FenceOutcome<'a>> {
    let len = chars.len();
    let fence_len = if chars.get(pos + 1).map(|&(_, c)| c) == Some('`')
        && chars.get(pos + 2).map(|&(_, c)| c) == Some('`')
    {
        3
    } else {
        1
    };

    let mut i = pos + fence_len;

    // Optional literal `json` tag after a triple-backtick open.
    if fence_len == 3 && matches_literal(chars, i, "json") {
        i += 4;
    }

    // Skip whitespace between the opening fence (and optional tag) and the payload.
    while i < len && chars[i].1.is_whitespace() {
        i += 1;
    }

    let payload_start_byte = byte_pos(chars, i, byte_len);

    // Find the matching closing fence of the same length.
    let mut j = i;
    let close_at = loop {
        if j >= len {
            break None;
        }
        if chars[j].1 == '`' && has_n_backticks(chars, j, fence_len) {
            break Some(j);
        }
        j += 1;
    };

    let close_j = match close_at {
        Some(j) => j,
        None => return Some(FenceOutcome::UnterminatedConsumedRest),
    };

    let payload_end_byte = byte_pos(chars, close_j, byte_len);
    let raw_payload = &input[payload_start_byte..payload_end_byte];
    let trimmed = raw_payload.trim();

    let next_pos = close_j + fence_len;

    match trimmed.chars().next() {
        Some('{') | Some('[') => {
            let trim_start = raw_payload.len() - raw_payload.trim_start().len();
            let start = payload_start_byte + trim_start;
            let end = start + trimmed.len();
            Some(FenceOutcome::Matched(
                JsonCandidate { start, end, text: trimmed },
                next_pos,
            ))
        }
        _ => {
            // Not JSON-shaped payload; nothing recognized at this position,
            // but the fence itself was well-formed, so resume scanning after it.
            Some(FenceOutcome::SkippedNonJson(next_pos))
        }
    }
}

fn matches_literal(chars: &[(usize, char)], pos: usize, literal: &str) -> bool {
    let lit_chars: Vec<char> = literal.chars().collect();
    if pos + lit_chars.len() > chars.len() {
        return false;
    }
    lit_chars.iter().enumerate().all(|(k, &lc)| chars[pos + k].1 == lc)
}

fn has_n_backticks(chars: &[(usize, char)], pos: usize, n: usize) -> bool {
    if pos + n > chars.len() {
        return false;
    }
    // Exactly `n` backticks: the run must not be longer than n (so a
    // triple-fence close isn't matched by a lone backtick inside a longer run,
    // and a run of more than n isn't mistaken for an n-length fence).
    if (0..n).any(|k| chars[pos + k].1 != '`') {
        return false;
    }
    if pos + n < chars.len() && chars[pos + n].1 == '`' {
        return false;
    }
    if pos > 0 && chars[pos - 1].1 == '`' {
        return false;
    }
    true
}

fn byte_pos(chars: &[(usize, char)], idx: usize, byte_len: usize) -> usize {
    chars.get(idx).map(|&(b, _)| b).unwrap_or(byte_len)
}

/// Try to recognize a bare `{`/`[` structure starting at `pos`, using a
/// bracket-depth stack that tolerates mismatched closer types (this is a
/// span recognizer, not a validator; `validator` re-parses the result
/// strictly).
fn try_bare_structure<'a>(
    input: &'a str,
    chars: &[(usize, char)],
    pos: usize,
    byte_len: usize,
) -> Option<(JsonCandidate<'a>, usize)> {
    let len = chars.len();
    let mut stack: Vec<char> = Vec::with_capacity(16);
    stack.push(if chars[pos].1 == '{' { '}' } else { ']' });

    let mut state = ScanState::InStructure;
    let mut i = pos + 1;

    while i < len {
        let c = chars[i].1;

        match state {
            ScanState::InStructure => match c {
                '"' => state = ScanState::InString,
                '{' => stack.push('}'),
                '[' => stack.push(']'),
                '}' | ']' => {
                    stack.pop();
                    if stack.is_empty() {
                        let start = byte_pos(chars, pos, byte_len);
                        let end = chars
                            .get(i + 1)
                            .map(|&(b, _)| b)
                            .unwrap_or(byte_len);
                        return Some((
                            JsonCandidate { start, end, text: &input[start..end] },
                            i + 1,
                        ));
                    }
                }
                _ => {}
            },
            ScanState::InString => match c {
                '\\' => state = ScanState::InEscape,
                '"' => state = ScanState::InStructure,
                _ => {}
            },
            ScanState::InEscape => state = ScanState::InString,
        }

        i += 1;
    }

    None
}
