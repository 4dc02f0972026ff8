use std::sync::Arc;

use shelfmark_core::alerts::LogAlertSink;
use shelfmark_core::{default_providers, Engine};
use shelfmark_metadata::{HttpCoverProbe, MetadataProvider};
use shelfmark_storage_sqlite::SqliteCacheStore;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn init_tracing() {
    let log_format = std::env::var("SHELFMARK_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // `init` also bridges `log` records from the library crates.
    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let providers = default_providers(config.google_books_api_key.clone(), &config.user_agent);
    build_state_with_providers(config, providers).await
}

/// Wire the store and engine with an explicit provider set.
pub async fn build_state_with_providers(
    config: &Config,
    providers: Vec<Arc<dyn MetadataProvider>>,
) -> anyhow::Result<Arc<AppState>> {
    let store = SqliteCacheStore::open(&config.data_dir)?;
    tracing::info!("Cache database in {}", config.data_dir.display());

    let engine = Engine::new(
        config.engine.clone(),
        Arc::new(store),
        providers,
        Arc::new(HttpCoverProbe::new()),
        Arc::new(LogAlertSink),
    )?;

    Ok(Arc::new(AppState {
        engine: Arc::new(engine),
    }))
}
