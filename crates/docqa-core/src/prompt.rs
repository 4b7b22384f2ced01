//! Prompt templates for summarization and grounded question answering.
//!
//! Both templates are a fixed system instruction plus one user slot.
//! Retrieved context for QA is not part of the template; it is "stuffed"
//! into the system turn by [`stuff_context`], mirroring how a combine-
//! documents chain wraps a chat prompt.

use serde::{Deserialize, Serialize};

use crate::models::Chunk;

/// Sentence the QA model must answer with when the context is insufficient.
pub const REFUSAL_PHRASE: &str = "I cannot find the answer in the provided documents.";

/// Separator placed between stuffed chunk texts.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// An immutable two-message template: system instruction + one user slot.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub system: &'static str,
}

impl PromptTemplate {
    /// Bind the user slot.
    pub fn format(&self, user_input: &str) -> Vec<Message> {
        vec![Message::system(self.system), Message::user(user_input)]
    }
}

pub const SUMMARY_PROMPT: PromptTemplate = PromptTemplate {
    system: "You are a study assistant. Produce structured Markdown notes from the following \
             document content. The notes must be accurate and well-organized, with clear \
             headings and a logical hierarchy.",
};

pub const QA_PROMPT: PromptTemplate = PromptTemplate {
    system: "You are a careful research assistant. Answer the user's question using only the \
             context supplied below. Do not use outside knowledge. If the context does not \
             contain the answer, reply exactly: \"I cannot find the answer in the provided \
             documents.\" When you use information from a source document, cite it inline by \
             name.",
};

/// Concatenate chunk texts in the given order.
pub fn format_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Inject `context` into the system turn of `messages`.
///
/// If there is no system message one is prepended.
pub fn stuff_context(mut messages: Vec<Message>, context: &str) -> Vec<Message> {
    let block = format!("Context:\n{}", context);
    match messages.iter_mut().find(|m| m.role == Role::System) {
        Some(system) => {
            system.content.push_str("\n\n");
            system.content.push_str(&block);
        }
        None => messages.insert(0, Message::system(block)),
    }
    messages
}
