//! Summarization over the session's chat backend.

use scribe_context::{SummarizeError, Summarizer};
use scribe_providers::{ChatBackend, reply_failure};
use scribe_types::{ContentPart, ModelHint};
use tracing::warn;

/// [`Summarizer`] that asks the selected model with a conversation hint.
pub struct ChatSummarizer<'a> {
    chat: &'a mut dyn ChatBackend,
    model: &'a str,
    temperature: f64,
}

impl<'a> ChatSummarizer<'a> {
    pub fn new(chat: &'a mut dyn ChatBackend, model: &'a str, temperature: f64) -> Self {
        Self {
            chat,
            model,
            temperature,
        }
    }
}

impl Summarizer for ChatSummarizer<'_> {
    fn summarize(&mut self, prompt: &str) -> Result<String, SummarizeError> {
        if !self.chat.is_available(self.model) {
            return Err(SummarizeError::Unavailable);
        }
        let result = self.chat.chat(
            &[ContentPart::text(prompt)],
            self.model,
            ModelHint::Conversation,
            self.temperature,
        );
        if let Some(reason) = reply_failure(&result) {
            warn!(model = self.model, "Summarization failed: {reason}");
            return Err(SummarizeError::Failed(reason));
        }
        Ok(result.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use scribe_providers::ProviderError;

    use super::*;
    use crate::test_support::FakeChat;

    #[test]
    fn error_prefixed_reply_is_a_failure() {
        let mut chat = FakeChat::new(&["gemini"]).reply("Error: quota exceeded");
        let mut summarizer = ChatSummarizer::new(&mut chat, "gemini", 0.25);
        match summarizer.summarize("summarize me") {
            Err(SummarizeError::Failed(reason)) => assert_eq!(reason, "quota exceeded"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn provider_error_is_a_failure_and_text_passes_through() {
        let mut chat = FakeChat::new(&["gemini"])
            .fail(ProviderError::Malformed("bad json".to_string()))
            .reply("short summary");
        let mut summarizer = ChatSummarizer::new(&mut chat, "gemini", 0.25);
        assert!(matches!(
            summarizer.summarize("p"),
            Err(SummarizeError::Failed(_))
        ));
        assert_eq!(summarizer.summarize("p").expect("summary"), "short summary");
    }

    #[test]
    fn unknown_model_is_unavailable() {
        let mut chat = FakeChat::new(&["mistral"]);
        let mut summarizer = ChatSummarizer::new(&mut chat, "gemini", 0.25);
        assert!(matches!(
            summarizer.summarize("p"),
            Err(SummarizeError::Unavailable)
        ));
    }
}
