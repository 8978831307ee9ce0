use crate::Result;
use crate::llm::Message;
use crate::tools::{FunctionalTool, ToolCall, ToolDefinition};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

pub const NAME: &str = "answer";

#[derive(Deserialize, JsonSchema)]
struct AnswerArgs {
    text: String,
}

/// Terminal action: hands the text back to the user.
pub struct Answer;

impl Answer {
    pub fn call(text: &str) -> ToolCall {
        ToolCall {
            name: NAME.to_string(),
            args: serde_json::json!({ "text": text }).to_string(),
        }
    }
}

#[async_trait]
impl FunctionalTool for Answer {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<AnswerArgs>(NAME, "reply to the user with the given text")
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: AnswerArgs = call.args()?;
        Ok(Message::Tool {
            name: NAME.to_string(),
            result: args.text,
        })
    }
}
