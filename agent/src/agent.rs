use crate::action;
use crate::callbacks;
use crate::llm::{self, Message};
use crate::tools::{self, ANSWER_TOOL, Answer};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub trait StopCondition {
    fn done(&self, history: &[llm::Message]) -> bool;
}

/// Stops once the turn ends with a reply to the user.
pub struct Answered;

impl StopCondition for Answered {
    fn done(&self, history: &[llm::Message]) -> bool {
        matches!(history.last(), Some(Message::Assistant(_)))
    }
}

type Tool = Box<dyn tools::Tool + Send>;
type Callback = Box<dyn callbacks::Callback + Send>;

const DEFAULT_MAX_STEPS: usize = 5;
const DEFAULT_HISTORY_PAIRS: usize = 6;

/// Conversational agent that asks the model for one action per step.
///
/// Without tools every completion is the reply. With tools the model is
/// asked to answer with a JSON action; non-answer actions run their tool,
/// the result joins the history and the model is asked again.
pub struct Agent {
    llm: Arc<dyn llm::LLM + Send + Sync>,
    system_prompt: String,
    tools: HashMap<String, Tool>,
    tool_defs: Vec<tools::ToolDefinition>,
    callbacks: Vec<Callback>,
    stop_condition: Box<dyn StopCondition + Send>,
    max_steps: usize,
    history_pairs: usize,
    temperature: Option<f32>,
}

impl Agent {
    fn prompt(&self) -> String {
        if self.tools.is_empty() {
            return self.system_prompt.clone();
        }

        let menu = self
            .tool_defs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "{}\n\n{}\n{}\n\n{}",
            self.system_prompt.trim(),
            ACTION_INSTRUCTIONS,
            menu,
            ACTION_FOOTER
        )
    }

    async fn execute_tool_call(
        &mut self,
        tool_call: &tools::ToolCall,
        messages: Vec<Message>,
    ) -> Result<Vec<Message>> {
        let tool = self
            .tools
            .get_mut(&tool_call.name)
            .ok_or(Error::ToolDoesNotExist(tool_call.name.clone()))?;

        tool.invoke(tool_call, messages).await
    }

    /// Applies one model output to the history.
    async fn act(&mut self, output: &str, mut history: Vec<Message>) -> Result<Vec<Message>> {
        if self.tools.is_empty() {
            history.push(Message::Assistant(output.to_string()));
            return Ok(history);
        }

        let parsed = action::parse_action(output);
        tracing::debug!(action = %parsed.call.name, strategy = ?parsed.strategy, "selected action");

        let call = if self.tools.contains_key(&parsed.call.name) {
            parsed.call
        } else {
            tracing::warn!(action = %parsed.call.name, "unknown action, treating output as answer");
            Answer::call(output.trim())
        };

        let mut history = match self.execute_tool_call(&call, history.clone()).await {
            Err(Error::JsonError(e)) => {
                tracing::warn!(action = %call.name, "invalid action args ({}), treating output as answer", e);
                self.execute_tool_call(&Answer::call(output.trim()), history)
                    .await?
            }
            res => res?,
        };

        if let Some(Message::Tool { name, result }) = history.last() {
            if name == ANSWER_TOOL {
                let answer = result.clone();
                history.pop();
                history.push(Message::Assistant(answer));
            }
        }

        Ok(history)
    }

    /// Runs one turn: `history` should end with the user's message.
    ///
    /// Returns the history extended with any tool results and the reply.
    pub async fn run(&mut self, mut history: Vec<Message>) -> Result<Vec<Message>> {
        let mut steps = 0;

        while !self.stop_condition.done(&history) {
            if steps == self.max_steps {
                return Err(Error::AgentWorkflowError(format!(
                    "no answer after {} steps",
                    self.max_steps
                )));
            }
            steps += 1;

            let mut messages = vec![Message::System(self.prompt())];
            messages.extend(llm::window(&history, self.history_pairs));

            let next = self
                .llm
                .completion(llm::CompletionRequest {
                    messages: &messages,
                    temperature: self.temperature,
                })
                .await?;

            history = self.act(&next.content, history).await?;
        }

        for callback in &mut self.callbacks {
            history = callback.call(history).await?;
        }

        Ok(history)
    }
}

/// The text of the most recent reply in `history`.
pub fn last_answer(history: &[Message]) -> Option<&str> {
    history.iter().rev().find_map(|m| match m {
        Message::Assistant(text) => Some(text.as_str()),
        _ => None,
    })
}

const ACTION_INSTRUCTIONS: &str = "Reply with exactly one JSON object of the form \
{\"action\": \"<name>\", \"args\": {...}} and nothing else. Available actions:";

const ACTION_FOOTER: &str = "After any action other than answer you will be shown its result. \
Finish every request with the answer action.";

pub struct AgentBuilder {
    llm: Option<Arc<dyn llm::LLM + Send + Sync>>,
    system_prompt: String,
    tools: Vec<Tool>,
    callbacks: Vec<Callback>,
    stop_condition: Option<Box<dyn StopCondition + Send>>,
    max_steps: usize,
    history_pairs: usize,
    temperature: Option<f32>,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            llm: None,
            system_prompt: String::new(),
            tools: Vec::new(),
            callbacks: Vec::new(),
            stop_condition: None,
            max_steps: DEFAULT_MAX_STEPS,
            history_pairs: DEFAULT_HISTORY_PAIRS,
            temperature: None,
        }
    }

    pub fn llm(mut self, llm: Arc<dyn llm::LLM + Send + Sync>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn callback(mut self, callback: Callback) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn stop_condition(mut self, cond: Box<dyn StopCondition + Send>) -> Self {
        self.stop_condition = Some(cond);
        self
    }

    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn history_pairs(mut self, pairs: usize) -> Self {
        self.history_pairs = pairs;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn build(self) -> Result<Agent> {
        let mut tool_defs = Vec::new();
        let mut tools = HashMap::new();

        // any tool set gets the answer action, listed first
        let answer: Option<Tool> = (!self.tools.is_empty()).then(|| Box::new(Answer) as Tool);

        for tool in answer.into_iter().chain(self.tools) {
            let def = tool.definition()?;
            if tools.contains_key(&def.name) {
                continue;
            }
            tools.insert(def.name.clone(), tool);
            tool_defs.push(def);
        }

        Ok(Agent {
            llm: self
                .llm
                .ok_or(Error::MissingArg("llm is required for agent".to_string()))?,
            system_prompt: self.system_prompt,
            tools,
            tool_defs,
            callbacks: self.callbacks,
            stop_condition: self.stop_condition.unwrap_or_else(|| Box::new(Answered)),
            max_steps: self.max_steps,
            history_pairs: self.history_pairs,
            temperature: self.temperature,
        })
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
