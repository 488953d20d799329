//! Prompt template with a single substitution point for recognized speech.
//!
//! [`PromptTemplate`] is validated once at construction: the placeholder
//! [`PLACEHOLDER`] must occur exactly once.  [`PromptTemplate::format`] then
//! splices the recognized text into that one position.  The template is split
//! ahead of time, so braces or a literal `{text}` inside the user's speech are
//! copied verbatim and never substituted again.

use thiserror::Error;

/// Marker replaced by the recognized text.
pub const PLACEHOLDER: &str = "{text}";

/// Reasons a template string is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PromptError {
    #[error("template has no `{{text}}` placeholder")]
    MissingPlaceholder,

    #[error("template has {0} `{{text}}` placeholders, expected exactly one")]
    RepeatedPlaceholder(usize),
}

// ---------------------------------------------------------------------------
// PromptTemplate
// ---------------------------------------------------------------------------

/// A prompt split around its single `{text}` placeholder.
///
/// # Example
/// ```rust
/// use ava::llm::PromptTemplate;
///
/// let template = PromptTemplate::new("Answer briefly: {text}").unwrap();
/// assert_eq!(template.format("what time is it"), "Answer briefly: what time is it");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    prefix: String,
    suffix: String,
}

impl PromptTemplate {
    /// Parse `template`, which must contain [`PLACEHOLDER`] exactly once.
    pub fn new(template: &str) -> Result<Self, PromptError> {
        match template.matches(PLACEHOLDER).count() {
            0 => Err(PromptError::MissingPlaceholder),
            1 => {
                let (prefix, suffix) = template
                    .split_once(PLACEHOLDER)
                    .ok_or(PromptError::MissingPlaceholder)?;
                Ok(Self {
                    prefix: prefix.to_string(),
                    suffix: suffix.to_string(),
                })
            }
            n => Err(PromptError::RepeatedPlaceholder(n)),
        }
    }

    /// Build the full prompt for one turn.
    pub fn format(&self, recognized: &str) -> String {
        let mut prompt =
            String::with_capacity(self.prefix.len() + recognized.len() + self.suffix.len());
        prompt.push_str(&self.prefix);
        prompt.push_str(recognized);
        prompt.push_str(&self.suffix);
        prompt
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
