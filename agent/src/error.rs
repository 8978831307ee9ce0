use async_openai::error::OpenAIError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Openai error: {0}")]
    OpenaiError(#[from] OpenAIError),

    #[error("Http error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid url: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("No response from llm: {0}")]
    LLMResponseError(String),

    #[error("Tool {0} does not exist")]
    ToolDoesNotExist(String),

    #[error("Missing arg: {0}")]
    MissingArg(String),

    #[error("Missing credential: {0} is not set")]
    MissingCredential(String),

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("No usable sources found")]
    NoUsableSources,

    #[error("Agent workflow error: {0}")]
    AgentWorkflowError(String),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}
