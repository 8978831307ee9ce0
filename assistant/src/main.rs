use agent::callbacks::MessageLogger;
use agent::classify::Classifier;
use agent::llm::{self, LLM, Message, Ollama, OpenAI};
use agent::tools::{
    DuckDuckGo, FetchPageTool, WeatherClient, WeatherTool, WebPageLoader, WebSearchTool,
};
use agent::{Agent, AgentBuilder, Result, last_answer};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SYSTEM_PROMPT: &str =
    "You are a conversational assistant. Answer clearly, briefly and helpfully.";

const OLLAMA_MODEL: &str = "qwen:4b";
const OPENAI_MODEL: &str = "gpt-4o-mini";

/// Small assistant utilities: a chat loop, weather lookup and query classification.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chat interactively; type `exit` or `quit` to leave
    Chat(ChatArgs),
    /// Print the current weather for a city
    Weather {
        #[arg(required = true)]
        city: Vec<String>,
    },
    /// Classify a customer service query
    Classify {
        #[command(flatten)]
        backend: BackendArgs,

        #[arg(required = true)]
        text: Vec<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    Ollama,
    Openai,
}

#[derive(Args, Debug)]
struct BackendArgs {
    #[arg(long, value_enum, default_value_t = Backend::Ollama)]
    backend: Backend,

    /// Model name; defaults to qwen:4b for ollama and gpt-4o-mini for openai
    #[arg(long)]
    model: Option<String>,

    #[arg(long, env = "OLLAMA_URL", default_value = llm::DEFAULT_OLLAMA_URL)]
    ollama_url: String,

    /// OpenAI-compatible API base url
    #[arg(long, env = "OPENAI_BASE_URL")]
    api_base: Option<String>,

    #[arg(long, default_value_t = 0.2)]
    temperature: f32,

    /// Request timeout for the ollama backend
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Args, Debug)]
struct ChatArgs {
    #[command(flatten)]
    backend: BackendArgs,

    /// User/agent pairs of history sent with each request
    #[arg(long, default_value_t = 6)]
    history_pairs: usize,

    /// Let the agent search the web, read pages and look up the weather
    #[arg(long)]
    tools: bool,

    /// Print ollama tokens as they arrive
    #[arg(long)]
    stream: bool,

    /// Write a markdown transcript to this file
    #[arg(long)]
    transcript: Option<PathBuf>,
}

impl BackendArgs {
    fn connect(&self, stream: bool) -> Result<Arc<dyn LLM + Send + Sync>> {
        match self.backend {
            Backend::Ollama => {
                let model = self.model.clone().unwrap_or_else(|| OLLAMA_MODEL.to_string());
                let mut ollama = Ollama::new(
                    self.ollama_url.clone(),
                    model,
                    Duration::from_secs(self.timeout_secs),
                )?;
                if stream {
                    ollama = ollama.streaming(Arc::new(|token: &str| {
                        print!("{}", token);
                        let _ = std::io::stdout().flush();
                    }));
                }
                Ok(Arc::new(ollama))
            }
            Backend::Openai => {
                let model = self.model.clone().unwrap_or_else(|| OPENAI_MODEL.to_string());
                Ok(OpenAI::from_env(model, self.api_base.clone())?)
            }
        }
    }
}

fn build_agent(args: &ChatArgs, llm: Arc<dyn LLM + Send + Sync>) -> Result<Agent> {
    let mut builder = AgentBuilder::new()
        .llm(llm)
        .system_prompt(SYSTEM_PROMPT.to_string())
        .history_pairs(args.history_pairs)
        .temperature(args.backend.temperature);

    if args.tools {
        let loader = Arc::new(WebPageLoader::new()?);
        builder = builder
            .tool(WebSearchTool::new(Arc::new(DuckDuckGo::new()?)))
            .tool(FetchPageTool::new(loader))
            .tool(WeatherTool::new(WeatherClient::new()?));
    }

    if let Some(path) = &args.transcript {
        let file = std::fs::File::create(path)?;
        builder = builder.callback(MessageLogger::new("Chat transcript", file)?);
    }

    builder.build()
}

async fn chat(args: ChatArgs) -> Result<()> {
    let streaming = args.stream && args.backend.backend == Backend::Ollama;
    let llm = args.backend.connect(streaming)?;
    let mut agent = build_agent(&args, llm)?;

    println!(
        "Chatting with {}. Type 'exit' or 'quit' to leave.",
        args.model_label()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history = Vec::<Message>::new();

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!("\nLeaving...");
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
            println!("Bye!");
            break;
        }

        let mut turn = history.clone();
        turn.push(Message::User(input.to_string()));

        if streaming {
            print!("Agent: ");
        }
        match agent.run(turn).await {
            Ok(next) => {
                history = next;
                let reply = last_answer(&history).unwrap_or_default();
                if streaming {
                    println!();
                } else {
                    println!("Agent: {}", reply);
                }
            }
            Err(e) => {
                if streaming {
                    println!();
                }
                tracing::error!("request failed: {}", e);
                println!("Agent: [error] {}", e);
            }
        }
    }

    Ok(())
}

impl ChatArgs {
    fn model_label(&self) -> String {
        let default = match self.backend.backend {
            Backend::Ollama => OLLAMA_MODEL,
            Backend::Openai => OPENAI_MODEL,
        };
        self.backend.model.clone().unwrap_or_else(|| default.to_string())
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
                .with_target(false),
        )
        .init();

    match Cli::parse().command {
        Command::Chat(args) => chat(args).await?,
        Command::Weather { city } => {
            let report = WeatherClient::new()?.get_weather(&city.join(" ")).await?;
            println!("{}", report);
        }
        Command::Classify { backend, text } => {
            let llm = backend.connect(false)?;
            let classification = Classifier::new(llm, Some(backend.temperature))
                .classify(&text.join(" "))
                .await?;
            println!("{}", serde_json::to_string_pretty(&classification)?);
        }
    }

    Ok(())
}
