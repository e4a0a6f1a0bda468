//! Grounding prompt construction and parsing of the provider's structured reply.
//!
//! Every prompt carries the same instruction block: answer only from the supplied document,
//! use a fixed sentence when the answer is absent, and reply with a JSON object holding a
//! short answer plus a verbatim supporting excerpt. Remote documents are referenced by
//! handle ahead of the instruction; inline documents embed the full extracted text.

use crate::document::ContextRepresentation;
use crate::store::{Message, Role};
use serde::Deserialize;

/// Reply the provider must give when the document does not contain the answer.
pub const NOT_FOUND_REPLY: &str = "I cannot find this information in the provided document.";

const DOCUMENT_BEGIN: &str = "----- BEGIN DOCUMENT -----";
const DOCUMENT_END: &str = "----- END DOCUMENT -----";

/// One ordered element of the payload submitted to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    /// Reference to a file held by the provider.
    FileRef {
        /// Provider handle of the file.
        uri: String,
        /// MIME type of the referenced file.
        mime_type: String,
    },
    /// Free text.
    Text(String),
}

/// Complete payload for a single grounded question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Parts in submission order.
    pub parts: Vec<PromptPart>,
}

impl Prompt {
    /// Whether the prompt references a remote file.
    pub fn references_file(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, PromptPart::FileRef { .. }))
    }

    /// Concatenated text parts, useful for logging sizes and assertions.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                PromptPart::Text(text) => Some(text.as_str()),
                PromptPart::FileRef { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Build the grounded prompt for `question` against `context`.
///
/// `history` holds earlier messages of the same conversation, oldest first; pass an empty
/// slice to send the question on its own.
pub fn build_prompt(context: &ContextRepresentation, question: &str, history: &[Message]) -> Prompt {
    let instruction = instruction_block(question, history);
    let parts = match context {
        ContextRepresentation::Remote { handle, mime_type } => vec![
            PromptPart::FileRef {
                uri: handle.clone(),
                mime_type: (*mime_type).to_string(),
            },
            PromptPart::Text(instruction),
        ],
        ContextRepresentation::Inline { text } => {
            let mut body = String::with_capacity(text.len() + instruction.len() + 64);
            body.push_str(DOCUMENT_BEGIN);
            body.push('\n');
            body.push_str(text);
            if !text.ends_with('\n') {
                body.push('\n');
            }
            body.push_str(DOCUMENT_END);
            body.push_str("\n\n");
            body.push_str(&instruction);
            vec![PromptPart::Text(body)]
        }
    };
    Prompt { parts }
}

fn instruction_block(question: &str, history: &[Message]) -> String {
    let mut text = String::new();
    text.push_str(
        "You are a strict document assistant. Answer the question using only the document supplied with this request.\n",
    );
    text.push_str("- Do not use outside knowledge or general information.\n");
    text.push_str(&format!(
        "- If the document does not contain the answer, set \"answer\" to exactly \"{NOT_FOUND_REPLY}\" and leave \"excerpt\" empty.\n"
    ));
    text.push_str("- Do not guess.\n");
    text.push_str(
        "- Reply with one JSON object and nothing else: {\"answer\": \"<short answer>\", \"excerpt\": \"<passage quoted verbatim from the document that supports the answer>\"}\n",
    );

    if !history.is_empty() {
        text.push_str("\nConversation so far:\n");
        for message in history {
            let speaker = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            text.push_str(&format!("{speaker}: {}\n", message.content.trim()));
        }
    }

    text.push_str(&format!("\nQuestion: {}", question.trim()));
    text
}

/// Answer parsed from the provider's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundedAnswer {
    /// Short answer text.
    pub answer: String,
    /// Supporting passage quoted from the document, when one was returned.
    pub excerpt: Option<String>,
}

#[derive(Deserialize)]
struct RawAnswer {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    excerpt: Option<String>,
}

impl GroundedAnswer {
    /// Parse the provider reply, tolerating code fences and falling back to the raw text.
    pub fn parse(raw: &str) -> Self {
        let body = strip_code_fence(raw.trim());
        let parsed = serde_json::from_str::<RawAnswer>(body).ok().or_else(|| {
            let start = body.find('{')?;
            let end = body.rfind('}')?;
            (start < end)
                .then(|| serde_json::from_str::<RawAnswer>(&body[start..=end]).ok())
                .flatten()
        });

        match parsed {
            Some(RawAnswer { answer, excerpt }) => {
                let answer = answer.trim();
                let answer = if answer.is_empty() { NOT_FOUND_REPLY } else { answer };
                let excerpt = excerpt
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty() && answer != NOT_FOUND_REPLY);
                Self {
                    answer: answer.to_string(),
                    excerpt,
                }
            }
            None => {
                tracing::debug!("Provider reply was not structured JSON; using raw text");
                Self {
                    answer: raw.trim().to_string(),
                    excerpt: None,
                }
            }
        }
    }

    /// Whether the provider reported that the document lacks the answer.
    pub fn is_not_found(&self) -> bool {
        self.answer == NOT_FOUND_REPLY
    }

    /// Text stored as the assistant message and returned to the caller.
    pub fn render(&self) -> String {
        match &self.excerpt {
            Some(excerpt) => format!("{}\n\n> {}", self.answer, excerpt),
            None => self.answer.clone(),
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
