use crate::llm;
use crate::{Error, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestAssistantMessageContent,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

pub struct OpenAI {
    model: String,
    client: Client<OpenAIConfig>,
}

impl OpenAI {
    /// Reads the key from the environment; a missing key is a startup error.
    pub fn from_env(model: String, api_base: Option<String>) -> Result<std::sync::Arc<Self>> {
        Self::with_key(model, std::env::var(API_KEY_VAR).ok(), api_base)
    }

    pub fn with_key(
        model: String,
        api_key: Option<String>,
        api_base: Option<String>,
    ) -> Result<std::sync::Arc<Self>> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(Error::MissingCredential(API_KEY_VAR.to_string()))?;

        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }
        Ok(Self::with_config(model, config))
    }

    fn with_config(model: String, config: OpenAIConfig) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            model,
            client: Client::with_config(config),
        })
    }
}

impl TryFrom<&llm::Message> for ChatCompletionRequestMessage {
    type Error = Error;

    fn try_from(msg: &llm::Message) -> Result<Self> {
        match msg {
            llm::Message::User(msg) => Ok(ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(msg.clone()),
                    name: None,
                },
            )),
            llm::Message::System(msg) => Ok(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.clone()),
                    name: None,
                },
            )),
            // actions are selected from plain text, so tool output goes back as user input
            llm::Message::Tool { name, result } => Ok(ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(format!(
                        "Result of tool {}:\n{}",
                        name, result
                    )),
                    name: None,
                },
            )),
            llm::Message::Assistant(msg) => Ok(ChatCompletionRequestMessage::Assistant(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(ChatCompletionRequestAssistantMessageContent::Text(
                        msg.clone(),
                    ))
                    .build()?,
            )),
        }
    }
}

#[async_trait]
impl llm::LLM for OpenAI {
    async fn completion<'a>(
        &self,
        request: llm::CompletionRequest<'a>,
    ) -> Result<llm::CompletionResponse> {
        let mut completion = CreateChatCompletionRequestArgs::default();
        completion.model(&self.model).messages(
            request
                .messages
                .iter()
                .map(ChatCompletionRequestMessage::try_from)
                .collect::<Result<Vec<_>>>()?,
        );

        if let Some(temperature) = request.temperature {
            completion.temperature(temperature);
        }

        let completion = completion.build()?;

        let res = self.client.chat().create(completion).await?;

        let choice = res
            .choices
            .first()
            .ok_or(Error::LLMResponseError("choices is empty".to_string()))?;

        let content = choice
            .message
            .content
            .as_ref()
            .ok_or(Error::LLMResponseError("content is empty".to_string()))?;

        Ok(llm::CompletionResponse {
            content: content.trim().to_string(),
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
