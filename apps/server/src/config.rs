use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;
use shelfmark_core::EngineConfig;
use shelfmark_metadata::provider::http::DEFAULT_USER_AGENT;

pub struct Config {
    pub listen_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub google_books_api_key: Option<String>,
    pub user_agent: String,
    pub engine: EngineConfig,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Read `SHELFMARK_*` variables (after loading `.env`) and the optional
    /// TOML engine configuration named by `SHELFMARK_CONFIG`.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = env_var("SHELFMARK_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("Invalid SHELFMARK_LISTEN_ADDR")?;
        let data_dir = env_var("SHELFMARK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));
        let cors_allow = env_var("SHELFMARK_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let timeout_ms: u64 = env_var("SHELFMARK_REQUEST_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(60_000);

        let mut engine = match env_var("SHELFMARK_CONFIG") {
            Some(path) => load_engine_config(&PathBuf::from(path))?,
            None => EngineConfig::default(),
        };
        if let Some(enabled) = env_var("SHELFMARK_SCHEDULER_ENABLED") {
            engine.scheduler.enabled = enabled
                .parse()
                .context("SHELFMARK_SCHEDULER_ENABLED must be true or false")?;
        }
        engine.validate()?;

        Ok(Self {
            listen_addr,
            data_dir,
            cors_allow,
            request_timeout: Duration::from_millis(timeout_ms),
            google_books_api_key: env_var("SHELFMARK_GOOGLE_BOOKS_API_KEY"),
            user_agent: env_var("SHELFMARK_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            engine,
        })
    }
}

pub fn load_engine_config(path: &PathBuf) -> anyhow::Result<EngineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read engine config {}", path.display()))?;
    parse_engine_config(&text).with_context(|| format!("Invalid engine config {}", path.display()))
}

pub fn parse_engine_config(text: &str) -> anyhow::Result<EngineConfig> {
    Ok(toml::from_str(text)?)
}
