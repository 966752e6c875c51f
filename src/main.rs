//! Spectyra — request-time prompt-optimization gateway
//!
//! Sits between chat clients and LLM providers: compiles conversation
//! history into a compact, profit-gated prompt before forwarding it, and
//! records estimated token/cost savings to a local ledger.

use std::sync::Arc;

use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

use spectyra::cache::InMemorySemanticCache;
use spectyra::config::Config;
use spectyra::ledger::{NoopSavingsLedger, SavingsLedger, SqliteSavingsLedger};
use spectyra::pipeline::PipelineDeps;
use spectyra::provider::{Embedder, GeminiEmbedder, HashingEmbedder};
use spectyra::server::{self, AppState};
use spectyra::state_store::InMemoryStateStore;

#[derive(Parser)]
#[command(name = "spectyra")]
#[command(about = "Request-time prompt-optimization gateway for LLM chat traffic")]
struct Args {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "SPECTYRA_LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// SQLite URL backing the savings ledger.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: Option<String>,

    #[arg(long, env = "DEEPSEEK_API_KEY")]
    deepseek_api_key: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY")]
    gemini_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_path = dirs::home_dir()
        .map(|h| h.join(".spectyra").join(".env"))
        .filter(|p| p.exists());
    if let Some(path) = env_path {
        let _ = dotenvy::from_path(&path);
    } else {
        let _ = dotenvy::dotenv();
    }

    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let mut config = Config::load();

    // CLI args take precedence over config-file/env values.
    config.openai_api_key = args.openai_api_key.or(config.openai_api_key);
    config.deepseek_api_key = args.deepseek_api_key.or(config.deepseek_api_key);
    config.gemini_api_key = args.gemini_api_key.or(config.gemini_api_key);
    config.database_url = args.database_url.or(config.database_url);
    config.listen_addr = args.listen_addr.or(config.listen_addr);

    if config.openai_api_key.is_none() && config.deepseek_api_key.is_none() {
        tracing::warn!(
            "no provider API key configured; requests naming an unconfigured provider will fail fast"
        );
    }

    let embedder: Arc<dyn Embedder> = match config.gemini_api_key.clone() {
        Some(key) => {
            tracing::info!("using Gemini embeddings");
            Arc::new(GeminiEmbedder::new(key))
        }
        None => {
            tracing::warn!("no GEMINI_API_KEY; falling back to deterministic hashing embedder");
            Arc::new(HashingEmbedder::default())
        }
    };

    let db_url = config.database_url_or_default();
    let ledger: Arc<dyn SavingsLedger> = match SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
    {
        Ok(pool) => match SqliteSavingsLedger::new(pool).await {
            Ok(ledger) => {
                tracing::info!(db_url, "savings ledger connected");
                Arc::new(ledger)
            }
            Err(err) => {
                tracing::warn!(%err, "failed to initialize savings ledger schema; using no-op ledger");
                Arc::new(NoopSavingsLedger)
            }
        },
        Err(err) => {
            tracing::warn!(%err, db_url, "savings ledger database unavailable; using no-op ledger");
            Arc::new(NoopSavingsLedger)
        }
    };

    let deps = Arc::new(PipelineDeps {
        embedder,
        cache: Arc::new(InMemorySemanticCache::new()),
        state_store: Arc::new(InMemoryStateStore::new()),
        ledger,
    });

    let listen_addr = config.listen_addr_or_default();
    let state = AppState {
        config: Arc::new(config),
        deps,
    };

    server::serve(state, &listen_addr).await
}
