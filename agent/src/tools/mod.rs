use crate::Result;
use crate::llm::Message;
use async_trait::async_trait;
use schemars::{JsonSchema, schema_for};

mod answer;
pub use answer::{Answer, NAME as ANSWER_TOOL};

mod weather;
pub use weather::{WeatherClient, WeatherTool};

mod web_page;
pub use web_page::{FetchOutcome, FetchPageTool, PageSource, SkipReason, WebPageLoader, html_to_text};

mod web_search;
pub use web_search::{DuckDuckGo, SearchHit, SearchProvider, WebSearchTool};

pub struct ToolDefinition {
    pub name: String,
    pub desc: String,
    pub params: serde_json::Value,
}

impl ToolDefinition {
    pub fn new<P: JsonSchema>(name: &str, desc: &str) -> Result<Self> {
        let schema = schema_for!(P);
        let params = serde_json::to_value(&schema.schema)?;
        Ok(Self {
            name: name.to_string(),
            desc: desc.to_string(),
            params,
        })
    }
}

impl std::fmt::Display for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let args = self
            .params
            .get("properties")
            .cloned()
            .unwrap_or(serde_json::Value::Object(Default::default()));
        write!(f, "- {}: {}\n  args: {}", self.name, self.desc, args)
    }
}

#[derive(Clone, Debug, PartialEq, Hash)]
pub struct ToolCall {
    pub name: String,
    pub args: String,
}

impl ToolCall {
    pub fn args<O: for<'de> serde::Deserialize<'de>>(&self) -> Result<O> {
        let args = serde_json::from_str(&self.args)?;
        Ok(args)
    }
}

#[async_trait]
pub trait Tool {
    fn definition(&self) -> Result<ToolDefinition>;

    async fn invoke(&mut self, args: &ToolCall, messages: Vec<Message>) -> Result<Vec<Message>>;
}

#[async_trait]
pub trait FunctionalTool {
    fn definition(&self) -> Result<ToolDefinition>;

    async fn invoke_fn(&mut self, args: &ToolCall) -> Result<Message>;
}

#[async_trait]
impl<T> Tool for T
where
    T: FunctionalTool + Send + Sync,
{
    fn definition(&self) -> Result<ToolDefinition> {
        FunctionalTool::definition(self)
    }

    async fn invoke(
        &mut self,
        args: &ToolCall,
        mut messages: Vec<Message>,
    ) -> Result<Vec<Message>> {
        let result = FunctionalTool::invoke_fn(self, args).await?;
        messages.push(result);
        Ok(messages)
    }
}
