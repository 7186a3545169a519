// ABOUTME: Entry point for roomclaw — a shared terminal chat room with an on-demand assistant.
// ABOUTME: Parses CLI args, loads config and secrets, opens the history store, and launches the app.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use roomclaw::app::App;
use roomclaw::config::Config;
use roomclaw::logging;
use roomclaw::session::Credentials;
use roomclaw::store::{FileHistoryStore, HistoryStore, MemoryHistoryStore};

#[derive(Debug, Parser)]
#[command(name = "roomclaw", version, about = "Shared chat room with an LLM assistant")]
struct Cli {
    /// Config file (default: ~/.roomclaw/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Display name in the room
    #[arg(short, long)]
    username: Option<String>,

    /// API key for the completion service (default: $OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Shared history file
    #[arg(long, conflicts_with = "memory")]
    history: Option<PathBuf>,

    /// Keep history in memory only; nothing is shared or persisted
    #[arg(long)]
    memory: bool,

    /// Wait for the whole reply instead of streaming it
    #[arg(long)]
    no_stream: bool,

    /// Completion model
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(history) = cli.history {
        config.room.history_path = Some(history);
    }
    if let Some(model) = cli.model {
        config.llm.model = model;
    }
    if cli.no_stream {
        config.llm.stream = false;
    }

    logging::init(&config.logging)?;

    // Load local .env if present, then the user's secrets file.
    let _ = dotenvy::dotenv();
    let _ = dotenvy::from_path(Config::secrets_env_path());

    let credentials = Credentials {
        api_key: cli
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        username: cli.username,
    };

    let (store, room_label): (Arc<dyn HistoryStore>, String) = if cli.memory {
        (Arc::new(MemoryHistoryStore::new()), "in-memory room".to_string())
    } else {
        let path = config.room.resolved_history_path();
        let store = FileHistoryStore::open(&path)?;
        (Arc::new(store), path.display().to_string())
    };
    tracing::info!(room = %room_label, model = %config.llm.model, "starting roomclaw");

    App::new(config, store, room_label, credentials).run().await
}
