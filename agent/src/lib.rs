pub mod action;
mod agent;
pub mod callbacks;
pub mod classify;
mod error;
pub mod llm;
pub mod text;
pub mod tools;

#[cfg(test)]
mod test_server;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub use agent::{Agent, AgentBuilder, Answered, StopCondition, last_answer};
