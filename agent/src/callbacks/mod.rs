use crate::Result;
use crate::llm::Message;
use async_trait::async_trait;

mod logger;
pub use logger::MessageLogger;

/// Runs on the conversation history after every completed turn.
#[async_trait]
pub trait Callback {
    async fn call(&mut self, messages: Vec<Message>) -> Result<Vec<Message>>;
}
