use clap::Args;
use std::path::PathBuf;

#[derive(Args, Clone, Debug)]
pub struct ResearchConfig {
    /// Number of search results to request
    #[arg(long, env = "RESEARCH_SEARCH_RESULTS", default_value_t = 6)]
    pub search_results: usize,

    /// Minimum extracted text length (characters) for a source to be kept
    #[arg(long, env = "RESEARCH_MIN_CHARS", default_value_t = 800)]
    pub min_chars: usize,

    /// Bullets per source summary
    #[arg(long, env = "RESEARCH_PER_SOURCE_BULLETS", default_value_t = 3)]
    pub per_source_bullets: usize,

    /// Bullets in the executive summary
    #[arg(long, env = "RESEARCH_FINAL_BULLETS", default_value_t = 6)]
    pub final_bullets: usize,

    #[arg(long, env = "RESEARCH_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    #[arg(long, env = "RESEARCH_TEMPERATURE", default_value_t = 0.2)]
    pub temperature: f32,

    /// Directory receiving reports and the run log
    #[arg(long, env = "RESEARCH_OUT_DIR", default_value = "agent_output")]
    pub out_dir: PathBuf,

    /// Run log file name inside the output directory
    #[arg(long, env = "RESEARCH_MEMORY_FILE", default_value = "memory.jsonl")]
    pub memory_file: String,

    /// OpenAI-compatible API base url
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub api_base: Option<String>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            search_results: 6,
            min_chars: 800,
            per_source_bullets: 3,
            final_bullets: 6,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            out_dir: PathBuf::from("agent_output"),
            memory_file: "memory.jsonl".to_string(),
            api_base: None,
        }
    }
}
