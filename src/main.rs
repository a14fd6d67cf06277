//! confide server binary.

use confide::api::server::{serve, AppState};
use confide::Config;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before reading any configuration; missing files are fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confide=info,tower_http=warn".into()),
        )
        .init();

    let config = Config::from_env();
    info!(
        provider = %config.default_provider,
        calls_per_minute = config.calls_per_minute,
        cache_size = config.cache_max_size,
        "starting confide"
    );

    serve(AppState::new(config)).await
}
