use crate::config::ResearchConfig;
use crate::persist::{Persister, RunRecord};
use agent::llm::{self, LLM};
use agent::text::truncate_chars;
use agent::tools::{FetchOutcome, PageSource, SearchHit, SearchProvider, SkipReason};
use agent::{Error, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

const ARTICLE_CHARS: usize = 7000;

const SUMMARIZE_PROMPT: &str =
    "You are a careful research assistant. Output only concise bullet points with facts.";

const SYNTHESIZE_PROMPT: &str = "You are a synthesis assistant. Write a neutral summary with inline numeric citations [1], [2].";

/// One web page considered as evidence. `index` is the citation number.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceDoc {
    index: usize,
    title: String,
    url: String,
    snippet: String,
    text: Option<String>,
    summary_bullets: Option<String>,
}

impl SourceDoc {
    pub fn new(index: usize, title: &str, url: &str, snippet: &str) -> Self {
        Self {
            index,
            title: title.to_string(),
            url: url.to_string(),
            snippet: snippet.to_string(),
            text: None,
            summary_bullets: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn snippet(&self) -> &str {
        &self.snippet
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn summary_bullets(&self) -> Option<&str> {
        self.summary_bullets.as_deref()
    }

    pub(crate) fn with_text(self, text: String) -> Self {
        debug_assert!(self.text.is_none(), "text is set once");
        Self {
            text: Some(text),
            ..self
        }
    }

    pub(crate) fn with_summary(self, bullets: String) -> Self {
        debug_assert!(self.summary_bullets.is_none(), "summary is set once");
        Self {
            summary_bullets: Some(bullets),
            ..self
        }
    }
}

/// Turns raw hits into indexed sources, keeping the first hit per (title, host).
///
/// Hits whose url is not an absolute url with a host are dropped.
pub fn dedupe(hits: Vec<SearchHit>) -> Vec<SourceDoc> {
    let mut seen = HashSet::new();
    let mut docs = Vec::new();

    for hit in hits {
        let host = match Url::parse(&hit.url) {
            Ok(url) => match url.host_str() {
                Some(host) => host.to_string(),
                None => continue,
            },
            Err(e) => {
                tracing::debug!(url = %hit.url, "dropping search hit: {}", e);
                continue;
            }
        };

        let title = hit.title.trim();
        if !seen.insert((title.to_string(), host)) {
            continue;
        }

        docs.push(SourceDoc::new(docs.len() + 1, title, &hit.url, &hit.snippet));
    }

    docs
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStage {
    Created,
    Searched,
    Fetched,
    Summarized,
    Synthesized,
    Persisted,
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStage::Created => "created",
            RunStage::Searched => "searched",
            RunStage::Fetched => "fetched",
            RunStage::Summarized => "summarized",
            RunStage::Synthesized => "synthesized",
            RunStage::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

pub struct ResearchAgent {
    cfg: ResearchConfig,
    llm: Arc<dyn LLM + Send + Sync>,
    search: Arc<dyn SearchProvider + Send + Sync>,
    loader: Arc<dyn PageSource + Send + Sync>,
    persister: Persister,
}

impl ResearchAgent {
    pub fn new(
        cfg: ResearchConfig,
        llm: Arc<dyn LLM + Send + Sync>,
        search: Arc<dyn SearchProvider + Send + Sync>,
        loader: Arc<dyn PageSource + Send + Sync>,
    ) -> Self {
        let persister = Persister::new(&cfg.out_dir, &cfg.memory_file);
        Self {
            cfg,
            llm,
            search,
            loader,
            persister,
        }
    }

    pub fn persister(&self) -> &Persister {
        &self.persister
    }

    pub async fn step_search(&self, query: &str) -> Result<Vec<SourceDoc>> {
        tracing::info!("Searching: {}", query);
        let hits = self.search.search(query, self.cfg.search_results).await?;
        Ok(dedupe(hits))
    }

    /// Keeps the sources whose page yields at least `min_chars` characters of text.
    pub async fn step_fetch(&self, docs: Vec<SourceDoc>) -> Vec<SourceDoc> {
        let mut kept = Vec::new();

        for doc in docs {
            tracing::info!("Fetching: [{}] {} ({})", doc.index, doc.title, doc.url);

            let outcome = match self.loader.fetch(&doc.url).await {
                FetchOutcome::Text(text) if text.chars().count() < self.cfg.min_chars => {
                    FetchOutcome::Skipped(SkipReason::TooShort {
                        len: text.chars().count(),
                        min: self.cfg.min_chars,
                    })
                }
                outcome => outcome,
            };

            match outcome {
                FetchOutcome::Text(text) => kept.push(doc.with_text(text)),
                FetchOutcome::Skipped(reason) => {
                    tracing::warn!("Skipped [{}]: {}", doc.index, reason)
                }
            }
        }

        kept
    }

    /// Summarizes each source in index order; sources with an empty summary are dropped.
    pub async fn step_summarize(&self, docs: Vec<SourceDoc>) -> Result<Vec<SourceDoc>> {
        let mut summarized = Vec::with_capacity(docs.len());

        for doc in docs {
            let Some(text) = doc.text() else {
                continue;
            };

            let user = format!(
                "Summarize the article into {} bullets.\n\nTITLE: {}\nURL: {}\n\nARTICLE:\n{}",
                self.cfg.per_source_bullets,
                doc.title,
                doc.url,
                truncate_chars(text, ARTICLE_CHARS)
            );

            tracing::info!("Summarizing source [{}]...", doc.index);
            let bullets = llm::chat(
                self.llm.as_ref(),
                SUMMARIZE_PROMPT,
                &user,
                Some(self.cfg.temperature),
            )
            .await?;

            let bullets = bullets.trim();
            if bullets.is_empty() {
                tracing::warn!("Skipped [{}]: empty summary", doc.index);
                continue;
            }
            summarized.push(doc.with_summary(bullets.to_string()));
        }

        Ok(summarized)
    }

    pub async fn step_synthesize(&self, query: &str, docs: &[SourceDoc]) -> Result<String> {
        let summarized = docs
            .iter()
            .filter_map(|doc| doc.summary_bullets().map(|bullets| (doc, bullets)))
            .collect::<Vec<_>>();

        let sources_list = summarized
            .iter()
            .map(|(doc, _)| format!("[{}] {} — {}", doc.index, doc.title, doc.url))
            .collect::<Vec<_>>()
            .join("\n");

        let per_source_points = summarized
            .iter()
            .map(|(doc, bullets)| format!("[{}] {}", doc.index, bullets))
            .collect::<Vec<_>>()
            .join("\n\n");

        let user = format!(
            "QUESTION: {}\n\nPER-SOURCE BULLETS:\n{}\n\n\
             Write the report with:\n\
             1) Executive summary: {} bullets.\n\
             2) Key points with inline citations.\n\
             3) List of sources.\n\n\
             Sources:\n{}",
            query, per_source_points, self.cfg.final_bullets, sources_list
        );

        tracing::info!("Synthesizing final report...");
        llm::chat(
            self.llm.as_ref(),
            SYNTHESIZE_PROMPT,
            &user,
            Some(self.cfg.temperature),
        )
        .await
    }

    pub fn persist(&self, query: &str, docs: &[SourceDoc], report: &str) -> Result<PathBuf> {
        let record = RunRecord::new(chrono::Utc::now(), query, self.llm.model(), docs, report);
        self.persister.persist(&record, report)
    }

    /// Runs the whole pipeline once and returns the path of the written report.
    pub async fn run(&self, query: &str) -> Result<PathBuf> {
        let mut stage = RunStage::Created;

        let res = self.run_stages(query, &mut stage).await;
        if let Err(e) = &res {
            tracing::error!(%stage, "run aborted: {}", e);
        }
        res
    }

    async fn run_stages(&self, query: &str, stage: &mut RunStage) -> Result<PathBuf> {
        let docs = self.step_search(query).await?;
        advance(stage, RunStage::Searched);

        let docs = self.step_fetch(docs).await;
        advance(stage, RunStage::Fetched);
        if docs.is_empty() {
            return Err(Error::NoUsableSources);
        }

        let docs = self.step_summarize(docs).await?;
        advance(stage, RunStage::Summarized);

        let report = self.step_synthesize(query, &docs).await?;
        advance(stage, RunStage::Synthesized);

        let path = self.persist(query, &docs, &report)?;
        advance(stage, RunStage::Persisted);

        Ok(path)
    }
}

fn advance(stage: &mut RunStage, next: RunStage) {
    tracing::debug!(from = %stage, to = %next, "run stage");
    *stage = next;
}
