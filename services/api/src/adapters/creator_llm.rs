//! services/api/src/adapters/creator_llm.rs
//!
//! This module contains the adapter for the term-drafting LLM.
//! It implements the `TermCreationService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    error::OpenAIError,
    Client,
};
use async_trait::async_trait;
use slanglab_core::ports::{PortError, PortResult, TermCreationService, TermDraft};

const SYSTEM_INSTRUCTIONS: &str = "You are a slang lexicographer. Given a new slang phrase, \
write a short, punchy definition and one realistic example sentence showing the phrase used \
in casual conversation. Respond with EXACTLY two lines:\n\
DEFINITION: <one sentence>\n\
EXAMPLE: <one sentence using the phrase>\n\
Do not add anything else.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TermCreationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiCreatorAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCreatorAdapter {
    /// Creates a new `OpenAiCreatorAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Pulls the labeled lines out of the model's reply. Falls back to the
    /// whole reply as the definition when the labels are missing.
    fn parse_draft(raw: &str) -> TermDraft {
        let mut definition = None;
        let mut example = None;
        for line in raw.lines() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("DEFINITION:") {
                definition = Some(rest.trim().to_string());
            } else if let Some(rest) = trimmed.strip_prefix("EXAMPLE:") {
                example = Some(rest.trim().to_string());
            }
        }
        TermDraft {
            definition: definition.unwrap_or_else(|| raw.trim().to_string()),
            example_usage: example.unwrap_or_default(),
        }
    }
}

//=========================================================================================
// `TermCreationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TermCreationService for OpenAiCreatorAdapter {
    /// Drafts a definition and example usage for a new slang phrase.
    async fn draft_term(&self, phrase: &str) -> PortResult<TermDraft> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!("PHRASE: {}", phrase))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        // Extract the text content from the first choice in the response.
        if let Some(choice) = response.choices.into_iter().next() {
            if let Some(content) = choice.message.content {
                Ok(Self::parse_draft(&content))
            } else {
                Err(PortError::Unexpected(
                    "Term drafting LLM response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::Unexpected(
                "Term drafting LLM returned no choices in its response.".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labeled_lines() {
        let draft = OpenAiCreatorAdapter::parse_draft(
            "DEFINITION: Extremely good.\nEXAMPLE: This pizza is bussin.",
        );
        assert_eq!(draft.definition, "Extremely good.");
        assert_eq!(draft.example_usage, "This pizza is bussin.");
    }

    #[test]
    fn falls_back_to_whole_reply() {
        let draft = OpenAiCreatorAdapter::parse_draft("Extremely good, no labels here.");
        assert_eq!(draft.definition, "Extremely good, no labels here.");
        assert_eq!(draft.example_usage, "");
    }
}
