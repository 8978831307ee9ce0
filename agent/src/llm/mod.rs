use crate::Result;
use async_trait::async_trait;
use std::hash::{DefaultHasher, Hash, Hasher};

mod ollama;
mod openai;
mod prompt;

pub use ollama::{DEFAULT_URL as DEFAULT_OLLAMA_URL, Ollama, SkipReason, StreamChunk, TokenSink, decode_stream_line};
pub use openai::OpenAI;
pub use prompt::{format_prompt, window};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Message {
    User(String),
    Assistant(String),
    System(String),
    Tool { name: String, result: String },
}

impl Message {
    pub fn get_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::User(text) => write!(f, "**user**\n\n{}\n\n", text),
            Message::Assistant(text) => write!(f, "**assistant**\n\n{}\n\n", text),
            Message::System(text) => write!(f, "**system**\n\n{}\n\n", text),
            Message::Tool { name, result } => write!(f, "**tool `{}`**\n\n{}\n\n", name, result),
        }
    }
}

pub struct CompletionRequest<'a> {
    pub messages: &'a [Message],
    pub temperature: Option<f32>,
}

pub struct CompletionResponse {
    pub content: String,
}

#[async_trait]
pub trait LLM {
    async fn completion<'a>(&self, request: CompletionRequest<'a>) -> Result<CompletionResponse>;

    /// Identifier of the model behind this backend, recorded with persisted runs.
    fn model(&self) -> &str;
}

/// Convenience for the common system + user exchange.
pub async fn chat(
    llm: &(dyn LLM + Send + Sync),
    system: &str,
    user: &str,
    temperature: Option<f32>,
) -> Result<String> {
    let messages = [
        Message::System(system.to_string()),
        Message::User(user.to_string()),
    ];
    let res = llm
        .completion(CompletionRequest {
            messages: &messages,
            temperature,
        })
        .await?;
    Ok(res.content)
}
