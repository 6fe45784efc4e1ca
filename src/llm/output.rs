//! Post-processing of raw completions.
//!
//! Instruction-tuned models often echo the prompt or wrap the answer in
//! template residue (`<|response|>`, `### Actual Response` headers). This is
//! the generator's concern, so the OpenAI-compatible provider applies it
//! before handing text to the orchestrator.

use std::sync::OnceLock;

use regex::Regex;

const ASSISTANT_MARKER: &str = "<|assistant|>";

/// Patterns that wrap the real answer, tried in order; group 1 is the answer.
const ANSWER_PATTERNS: [&str; 5] = [
    r"(?s)### Actual Response <\|response\|> (.+?)(### |$)",
    r"(?s)### Contextual Response <\|response\|> (.+?)(### |$)",
    r"(?s)<\|response\|> (.+?)(<\||$)",
    r"(?s)### Actual Completion <\|completion\|> (.+?)(### |$)",
    r"(?s)### Contextual Completion <\|completion\|> (.+?)(### |$)",
];

fn answer_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        ANSWER_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

fn residue_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"<\|[^|]+\|>", r"### [^#\n]+"]
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

/// Extracts the answer from a raw completion.
pub fn clean_model_output(raw: &str) -> String {
    let text = match raw.rfind(ASSISTANT_MARKER) {
        Some(pos) => &raw[pos + ASSISTANT_MARKER.len()..],
        None => raw,
    };
    let text = text.trim();

    for pattern in answer_patterns() {
        if let Some(found) = pattern.captures(text).and_then(|caps| caps.get(1)) {
            return found.as_str().trim().to_string();
        }
    }

    if !text.contains("<|") && !text.contains("###") {
        return text.to_string();
    }

    let mut cleaned = text.to_string();
    for pattern in residue_patterns() {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    cleaned.trim().to_string()
}
