//! Gateway configuration
//!
//! Loads from `~/.spectyra/config.toml`, with every field overridable by an
//! environment variable of the same name (upper-cased), matching the
//! teacher's file-plus-env layering.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
    pub gemini_api_key: Option<String>,

    /// SQLite URL backing the savings ledger, e.g. `sqlite://spectyra.db`.
    pub database_url: Option<String>,

    /// Bind address for the HTTP server, e.g. `0.0.0.0:8080`.
    pub listen_addr: Option<String>,

    /// Default provider name used when a request omits one.
    pub default_provider: Option<String>,

    /// Default model name used when a request omits one.
    pub default_model: Option<String>,
}

impl Config {
    /// Loads `~/.spectyra/config.toml` if present, then layers environment
    /// variables over every field that's still unset.
    pub fn load() -> Self {
        let path = config_path();

        let mut config = if !path.exists() {
            Self::default()
        } else {
            match std::fs::read_to_string(&path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse {}: {}", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read {}: {}", path.display(), e);
                    Self::default()
                }
            }
        };

        config.openai_api_key = config.openai_api_key.or_else(|| env_var("OPENAI_API_KEY"));
        config.deepseek_api_key = config.deepseek_api_key.or_else(|| env_var("DEEPSEEK_API_KEY"));
        config.gemini_api_key = config.gemini_api_key.or_else(|| env_var("GEMINI_API_KEY"));
        config.database_url = config.database_url.or_else(|| env_var("DATABASE_URL"));
        config.listen_addr = config.listen_addr.or_else(|| env_var("SPECTYRA_LISTEN_ADDR"));
        config.default_provider = config
            .default_provider
            .or_else(|| env_var("SPECTYRA_DEFAULT_PROVIDER"));
        config.default_model = config.default_model.or_else(|| env_var("SPECTYRA_DEFAULT_MODEL"));

        config
    }

    pub fn database_url_or_default(&self) -> String {
        self.database_url
            .clone()
            .unwrap_or_else(|| "sqlite://spectyra.db".to_string())
    }

    pub fn listen_addr_or_default(&self) -> String {
        self.listen_addr.clone().unwrap_or_else(|| "0.0.0.0:8080".to_string())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".spectyra")
        .join("config.toml")
}
