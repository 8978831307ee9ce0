use crate::llm::Message;
use crate::tools::{FunctionalTool, ToolCall, ToolDefinition};
use crate::{Error, Result};
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use schemars::JsonSchema;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DUCKDUCKGO_URL: &str = "https://html.duckduckgo.com/html/";

const NAME: &str = "web_search";
const DEFAULT_MAX_RESULTS: usize = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait SearchProvider {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// Keyless search through DuckDuckGo's HTML endpoint.
pub struct DuckDuckGo {
    client: reqwest::Client,
    endpoint: Url,
}

impl DuckDuckGo {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DUCKDUCKGO_URL)
    }

    pub fn with_endpoint(endpoint: &str) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .user_agent(super::web_page::USER_AGENT)
                .build()?,
            endpoint: Url::parse(endpoint)?,
        })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGo {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .form(&[("q", query)])
            .header(reqwest::header::ACCEPT, "text/html")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::SearchError(format!(
                "DuckDuckGo returned HTTP {}",
                status
            )));
        }

        let body = resp.text().await?;
        parse_results(&body, max_results)
    }
}

fn selector(sel: &str) -> Result<Selector> {
    Selector::parse(sel).map_err(|e| Error::SearchError(e.to_string()))
}

/// Parses a DuckDuckGo HTML result page, skipping ads and results without a title or link.
pub fn parse_results(html: &str, max_results: usize) -> Result<Vec<SearchHit>> {
    let doc = Html::parse_document(html);
    let result_sel = selector(".result:not(.result--ad)")?;
    let link_sel = selector("a.result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let hits = doc
        .select(&result_sel)
        .filter_map(|result| {
            let link = result.select(&link_sel).next()?;
            let title = link.text().collect::<String>().trim().to_string();
            let url = resolve_redirect(link.value().attr("href")?);
            if title.is_empty() || url.is_empty() {
                return None;
            }

            let snippet = result
                .select(&snippet_sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default();

            Some(SearchHit {
                title,
                url,
                snippet,
            })
        })
        .take(max_results)
        .collect();

    Ok(hits)
}

/// Unwraps `//duckduckgo.com/l/?uddg=<encoded>&rut=...` redirect links.
fn resolve_redirect(href: &str) -> String {
    if let Some(pos) = href.find("uddg=") {
        let start = pos + 5;
        let end = href[start..]
            .find('&')
            .map(|i| start + i)
            .unwrap_or(href.len());
        let encoded = &href[start..end];
        if !encoded.is_empty() {
            return percent_decode_str(encoded).decode_utf8_lossy().into_owned();
        }
    }

    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    href.trim().to_string()
}

#[derive(Deserialize, JsonSchema)]
struct WebSearchArgs {
    query: String,
    max_results: Option<usize>,
}

pub struct WebSearchTool(Arc<dyn SearchProvider + Send + Sync>);

impl WebSearchTool {
    pub fn new(provider: Arc<dyn SearchProvider + Send + Sync>) -> Box<Self> {
        Box::new(Self(provider))
    }
}

#[async_trait]
impl FunctionalTool for WebSearchTool {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<WebSearchArgs>(
            NAME,
            "search the web and return titles, urls and snippets",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: WebSearchArgs = call.args()?;
        let hits = self
            .0
            .search(&args.query, args.max_results.unwrap_or(DEFAULT_MAX_RESULTS))
            .await?;

        let result = if hits.is_empty() {
            format!("no results for: {}", args.query)
        } else {
            hits.iter()
                .enumerate()
                .map(|(i, hit)| {
                    format!("[{}] {}\n  {}\n  {}", i + 1, hit.title, hit.url, hit.snippet)
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        Ok(Message::Tool {
            name: NAME.to_string(),
            result,
        })
    }
}
