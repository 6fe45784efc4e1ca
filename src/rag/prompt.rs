//! Prompt templates for the generator.
//!
//! With evidence:
//!
//! ```text
//! <|user|>
//! {query}
//! <|context|>
//! [1] {first accepted text}
//! [2] {second accepted text}
//! <|assistant|>
//! ```
//!
//! Without evidence the `<|context|>` section is absent entirely. The `[i]`
//! markers are the join key for citations and are 1-based in accepted order.

pub const USER_TAG: &str = "<|user|>";
pub const CONTEXT_TAG: &str = "<|context|>";
pub const ASSISTANT_TAG: &str = "<|assistant|>";

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAssembler;

impl PromptAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Renders the prompt. Evidence text is copied verbatim, never truncated.
    pub fn assemble<S: AsRef<str>>(&self, query: &str, accepted_texts: &[S]) -> String {
        let mut prompt = format!("{USER_TAG}\n{query}\n");

        if !accepted_texts.is_empty() {
            prompt.push_str(CONTEXT_TAG);
            prompt.push('\n');
            for (i, text) in accepted_texts.iter().enumerate() {
                prompt.push_str(&format!("[{}] {}\n", i + 1, text.as_ref()));
            }
        }

        prompt.push_str(ASSISTANT_TAG);
        prompt
    }

    /// Whether `prompt` was rendered with a context section.
    pub fn has_context(prompt: &str) -> bool {
        prompt.lines().any(|line| line == CONTEXT_TAG)
    }
}
