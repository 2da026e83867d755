//! Typed response bodies for the provider APIs.
//!
//! Parse errors happen at the serde boundary, not scattered through reply
//! extraction. Every field the APIs may omit is optional or defaulted.

pub mod gemini {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Response {
        #[serde(default)]
        pub candidates: Vec<Candidate>,
        pub prompt_feedback: Option<PromptFeedback>,
        pub error: Option<ErrorInfo>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Candidate {
        pub content: Option<Content>,
        pub finish_reason: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Content {
        #[serde(default)]
        pub parts: Vec<Part>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Part {
        pub text: Option<String>,
        #[serde(default)]
        pub thought: bool,
    }

    /// Why a prompt was refused before any candidate was produced.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PromptFeedback {
        pub block_reason: Option<String>,
        pub block_reason_message: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ErrorInfo {
        #[serde(default)]
        pub code: i64,
        #[serde(default)]
        pub message: String,
    }
}

pub mod mistral {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Response {
        #[serde(default)]
        pub choices: Vec<Choice>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Choice {
        pub message: Option<Message>,
        pub finish_reason: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Message {
        pub content: Option<MessageContent>,
    }

    /// Chat content is usually a string but may arrive as typed chunks.
    #[derive(Debug, Deserialize)]
    #[serde(untagged)]
    pub enum MessageContent {
        Text(String),
        Chunks(Vec<Chunk>),
    }

    #[derive(Debug, Deserialize)]
    pub struct Chunk {
        pub text: Option<String>,
    }

    impl MessageContent {
        #[must_use]
        pub fn into_text(self) -> String {
            match self {
                MessageContent::Text(text) => text,
                MessageContent::Chunks(chunks) => {
                    chunks.into_iter().filter_map(|c| c.text).collect()
                }
            }
        }
    }
}
