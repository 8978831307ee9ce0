use crate::Result;
use crate::llm::Message;
use crate::text::truncate_chars;
use crate::tools::{FunctionalTool, ToolCall, ToolDefinition};
use async_trait::async_trait;
use schemars::JsonSchema;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; ResearchAgent/0.1)";
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

const NAME: &str = "fetch_page";
const TOOL_MAX_CHARS: usize = 4000;

const CONTENT_SELECTORS: &[&str] = &["article", "main", "[role=\"main\"]"];
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "noscript", "svg", "aside", "form", "iframe",
];
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "h1", "h2", "h3", "h4", "h5", "h6", "li", "tr", "td", "th", "article",
    "section", "main", "blockquote", "pre", "figcaption", "dt", "dd",
];

/// Why a page produced no usable text.
#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    HttpStatus(u16),
    Timeout,
    Network(String),
    NoText,
    TooShort { len: usize, min: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::HttpStatus(code) => write!(f, "HTTP {}", code),
            SkipReason::Timeout => write!(f, "request timed out"),
            SkipReason::Network(msg) => write!(f, "request failed: {}", msg),
            SkipReason::NoText => write!(f, "no extractable text"),
            SkipReason::TooShort { len, min } => {
                write!(f, "too short ({} chars, need {})", len, min)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    Text(String),
    Skipped(SkipReason),
}

/// Source of readable page text. Failures are outcomes, never errors.
#[async_trait]
pub trait PageSource {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

pub struct WebPageLoader {
    client: reqwest::Client,
}

impl WebPageLoader {
    pub fn new() -> Result<Self> {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .build()?,
        })
    }
}

fn network_reason(e: reqwest::Error) -> SkipReason {
    if e.is_timeout() {
        SkipReason::Timeout
    } else {
        SkipReason::Network(e.to_string())
    }
}

#[async_trait]
impl PageSource for WebPageLoader {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => return FetchOutcome::Skipped(network_reason(e)),
        };

        let status = resp.status();
        if !status.is_success() {
            return FetchOutcome::Skipped(SkipReason::HttpStatus(status.as_u16()));
        }

        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => return FetchOutcome::Skipped(network_reason(e)),
        };

        let text = html_to_text(&body);
        if text.is_empty() {
            FetchOutcome::Skipped(SkipReason::NoText)
        } else {
            FetchOutcome::Text(text)
        }
    }
}

/// Extracts readable text from an HTML document.
///
/// A focused content region (`article`, `main`) is preferred when it holds at
/// least 100 characters; otherwise the whole `body` is used. Script, style and
/// navigation subtrees are dropped and whitespace is collapsed.
pub fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);

    for sel in CONTENT_SELECTORS {
        if let Ok(sel) = Selector::parse(sel) {
            if let Some(el) = doc.select(&sel).next() {
                let text = element_text(&el);
                if text.chars().count() >= 100 {
                    return text;
                }
            }
        }
    }

    if let Ok(body) = Selector::parse("body") {
        if let Some(body) = doc.select(&body).next() {
            return element_text(&body);
        }
    }

    collapse_whitespace(&doc.root_element().text().collect::<String>())
}

fn element_text(el: &ElementRef<'_>) -> String {
    let mut buf = String::new();
    collect_text(el, &mut buf);
    collapse_whitespace(&buf)
}

fn collect_text(el: &ElementRef<'_>, buf: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => buf.push_str(text),
            Node::Element(element) => {
                let tag = element.name();
                if SKIP_TAGS.contains(&tag) {
                    continue;
                }
                if BLOCK_TAGS.contains(&tag) {
                    buf.push('\n');
                }
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(&child, buf);
                }
            }
            _ => {}
        }
    }
}

/// Collapses runs of spaces inside lines and keeps at most one blank line between paragraphs.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank = false;

    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            blank = true;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank { "\n\n" } else { "\n" });
        }
        out.push_str(&line);
        blank = false;
    }

    out
}

#[derive(Deserialize, JsonSchema)]
struct FetchPageArgs {
    url: String,
}

pub struct FetchPageTool(Arc<dyn PageSource + Send + Sync>);

impl FetchPageTool {
    pub fn new(loader: Arc<dyn PageSource + Send + Sync>) -> Box<Self> {
        Box::new(Self(loader))
    }
}

#[async_trait]
impl FunctionalTool for FetchPageTool {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<FetchPageArgs>(NAME, "fetch a web page and return its readable text")
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: FetchPageArgs = call.args()?;
        let result = match self.0.fetch(&args.url).await {
            FetchOutcome::Text(text) => truncate_chars(&text, TOOL_MAX_CHARS).to_string(),
            FetchOutcome::Skipped(reason) => format!("could not fetch {}: {}", args.url, reason),
        };
        Ok(Message::Tool {
            name: NAME.to_string(),
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{FetchOutcome, PageSource, SkipReason, USER_AGENT, WebPageLoader, html_to_text};
    use crate::Result;
    use crate::test_server::{Route, TestServer};
    use std::time::Duration;

    const ARTICLE: &str = r#"<html><head><title>T</title><script>var x = 1;</script></head>
<body>
  <nav><a href="/">Home</a> | <a href="/about">About</a></nav>
  <article>
    <h1>Quantum   computing</h1>
    <p>Quantum computers use qubits, which can represent zero and one at the same time.</p>
    <p>Error correction remains   the main obstacle to building large machines.</p>
  </article>
  <footer>Copyright</footer>
</body></html>"#;

    #[test]
    fn test_html_to_text_prefers_article() {
        let text = html_to_text(ARTICLE);

        assert!(text.starts_with("Quantum computing\n"));
        assert!(text.contains("Error correction remains the main obstacle"));
        assert!(!text.contains("Home"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("Copyright"));
    }

    #[test]
    fn test_html_to_text_falls_back_to_body() {
        let html = r#"<html><body>
            <header>Site</header>
            <main>Tiny</main>
            <div>Body text <b>survives</b>.</div>
            <style>p { color: red; }</style>
        </body></html>"#;

        assert_eq!(html_to_text(html), "Tiny\n\nBody text survives.");
    }

    #[test]
    fn test_html_to_text_empty() {
        assert_eq!(html_to_text("<html><body><script>1</script></body></html>"), "");
    }

    #[tokio::test]
    async fn test_fetch_outcomes() -> Result<()> {
        let server = TestServer::start(vec![
            Route::html("/article", ARTICLE),
            Route::new("/gone", 410, "text/html", "<p>gone</p>"),
            Route::html("/empty", "<html><body></body></html>"),
        ])
        .await;
        let loader = WebPageLoader::new()?;

        match loader.fetch(&server.url("/article")).await {
            FetchOutcome::Text(text) => assert!(text.contains("qubits")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(
            loader.fetch(&server.url("/gone")).await,
            FetchOutcome::Skipped(SkipReason::HttpStatus(410))
        );
        assert_eq!(
            loader.fetch(&server.url("/missing")).await,
            FetchOutcome::Skipped(SkipReason::HttpStatus(404))
        );
        assert_eq!(
            loader.fetch(&server.url("/empty")).await,
            FetchOutcome::Skipped(SkipReason::NoText)
        );

        assert_eq!(server.requests()[0].header("user-agent"), Some(USER_AGENT));

        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_timeout() -> Result<()> {
        let server = TestServer::start(vec![
            Route::html("/slow", ARTICLE).delayed(Duration::from_secs(5)),
        ])
        .await;
        let loader = WebPageLoader::with_timeout(Duration::from_millis(200))?;

        assert_eq!(
            loader.fetch(&server.url("/slow")).await,
            FetchOutcome::Skipped(SkipReason::Timeout)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_unreachable() -> Result<()> {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
            listener.local_addr()?.port()
        };

        let outcome = WebPageLoader::new()?
            .fetch(&format!("http://127.0.0.1:{}/", port))
            .await;
        assert!(matches!(
            outcome,
            FetchOutcome::Skipped(SkipReason::Network(_))
        ));

        Ok(())
    }
}
