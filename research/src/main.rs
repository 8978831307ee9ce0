mod config;
mod persist;
mod research;

use agent::Result;
use agent::llm::OpenAI;
use agent::tools::{DuckDuckGo, WebPageLoader};
use clap::{CommandFactory, Parser, error::ErrorKind};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Search the web, summarize what it finds and write a cited report.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    config: config::ResearchConfig,

    /// The research question
    #[arg(required = true)]
    query: Vec<String>,
}

impl Cli {
    /// The question words joined by spaces, or `None` when they are blank.
    fn query(&self) -> Option<String> {
        let query = self.query.join(" ");
        let query = query.trim();
        (!query.is_empty()).then(|| query.to_string())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .without_time(),
        )
        .init();

    let cli = Cli::parse();
    let Some(query) = cli.query() else {
        Cli::command()
            .error(ErrorKind::MissingRequiredArgument, "the query must not be blank")
            .exit();
    };

    let cfg = cli.config;
    let llm = OpenAI::from_env(cfg.model.clone(), cfg.api_base.clone())?;
    let search = Arc::new(DuckDuckGo::new()?);
    let loader = Arc::new(WebPageLoader::new()?);

    let agent = research::ResearchAgent::new(cfg, llm, search, loader);
    let report = agent.run(&query).await?;

    println!("\nDone. Report saved to: {}", report.display());
    println!("Memory log: {}", agent.persister().memory_path().display());

    Ok(())
}
