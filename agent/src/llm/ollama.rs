use crate::llm;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_URL: &str = "http://localhost:11434";

/// Receives generated tokens as they arrive from a streaming backend.
pub type TokenSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Client for a local Ollama server's `/api/generate` endpoint.
pub struct Ollama {
    base_url: String,
    model: String,
    client: reqwest::Client,
    sink: Option<TokenSink>,
}

impl Ollama {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Result<Self> {
        url::Url::parse(&base_url)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
            sink: None,
        })
    }

    /// Switches to streamed generation, forwarding every token to `sink`.
    pub fn streaming(mut self, sink: TokenSink) -> Self {
        self.sink = Some(sink);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    async fn collect_stream(
        &self,
        mut resp: reqwest::Response,
        sink: &TokenSink,
    ) -> Result<String> {
        let mut lines = LineBuffer::default();
        let mut collected = String::new();

        while let Some(bytes) = resp.chunk().await? {
            for line in lines.push(&bytes) {
                if absorb(&line, sink, &mut collected) {
                    return Ok(collected);
                }
            }
        }

        if let Some(line) = lines.finish() {
            absorb(&line, sink, &mut collected);
        }

        Ok(collected)
    }
}

/// Applies one stream line to the collected text; returns true once the stream reports completion.
fn absorb(line: &[u8], sink: &TokenSink, collected: &mut String) -> bool {
    match decode_stream_line(line) {
        StreamChunk::Token(token) => {
            sink(&token);
            collected.push_str(&token);
            false
        }
        StreamChunk::Done => true,
        StreamChunk::Skipped(reason) => {
            tracing::debug!(?reason, "skipped stream line");
            false
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct StreamLine {
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, PartialEq)]
pub enum StreamChunk {
    Token(String),
    Done,
    Skipped(SkipReason),
}

#[derive(Debug, PartialEq)]
pub enum SkipReason {
    Blank,
    InvalidJson(String),
    MissingResponse,
}

pub fn decode_stream_line(line: &[u8]) -> StreamChunk {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return StreamChunk::Skipped(SkipReason::Blank);
    }

    match serde_json::from_str::<StreamLine>(line) {
        Err(e) => StreamChunk::Skipped(SkipReason::InvalidJson(e.to_string())),
        Ok(StreamLine {
            response: Some(token),
            ..
        }) if !token.is_empty() => StreamChunk::Token(token),
        Ok(StreamLine { done: true, .. }) => StreamChunk::Done,
        Ok(StreamLine {
            response: Some(token),
            ..
        }) => StreamChunk::Token(token),
        Ok(StreamLine { response: None, .. }) => StreamChunk::Skipped(SkipReason::MissingResponse),
    }
}

/// Reassembles newline-delimited records that may be split across reads.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            lines.push(self.pending.drain(..=pos).collect());
        }
        lines
    }

    fn finish(self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending)
        }
    }
}

#[async_trait]
impl llm::LLM for Ollama {
    async fn completion<'a>(
        &self,
        request: llm::CompletionRequest<'a>,
    ) -> Result<llm::CompletionResponse> {
        let body = GenerateRequest {
            model: &self.model,
            prompt: llm::format_prompt(request.messages),
            stream: self.sink.is_some(),
            options: request
                .temperature
                .map(|temperature| GenerateOptions { temperature }),
        };

        let resp = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let content = match &self.sink {
            Some(sink) => self.collect_stream(resp, sink).await?,
            None => resp.json::<GenerateResponse>().await?.response,
        };

        Ok(llm::CompletionResponse {
            content: content.trim().to_string(),
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
