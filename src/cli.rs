use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "solace",
    version,
    about = "Grounded consolation composer and corpus index tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Compose(ComposeArgs),
    Retrieve(RetrieveArgs),
    Index(IndexArgs),
    Status(StatusArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum VoiceMode {
    #[value(name = "self")]
    SelfVoice,
    Other,
}

impl VoiceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelfVoice => "self",
            Self::Other => "other",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    #[arg(long, default_value = "http://127.0.0.1:11434")]
    pub generation_url: String,

    #[arg(long, default_value = "llama3.1:8b")]
    pub generation_model: String,

    #[arg(long, default_value = "http://127.0.0.1:11434")]
    pub embedding_url: String,

    #[arg(long, default_value = "nomic-embed-text")]
    pub embedding_model: String,

    #[arg(long, default_value_t = 768)]
    pub embedding_dim: usize,

    #[arg(long, default_value = "http://127.0.0.1:6333")]
    pub index_url: String,

    #[arg(long, default_value = "passages")]
    pub namespace: String,

    #[arg(long, default_value_t = 15_000)]
    pub search_timeout_ms: u64,

    #[arg(long, default_value_t = 30_000)]
    pub generation_timeout_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ComposeArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    #[arg(long)]
    pub request: String,

    #[arg(long = "for", value_enum, default_value_t = VoiceMode::SelfVoice)]
    pub voice: VoiceMode,

    #[arg(long, default_value_t = 5)]
    pub top_k: usize,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RetrieveArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    #[arg(long)]
    pub query: String,

    #[arg(long, default_value_t = 5)]
    pub top_k: usize,

    #[arg(long)]
    pub filter: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    #[arg(long)]
    pub corpus_path: PathBuf,

    #[arg(long, default_value = ".cache/solace")]
    pub cache_root: PathBuf,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
