//! # PrintStudio API Server
//!
//! Serves the tool, usage and admin analytics endpoints.
//!
//! ## Usage
//!
//! ```bash
//! JWT_SECRET=... DATABASE_URL=postgresql://localhost/printstudio cargo run -p printstudio-api
//! ```
//!
//! Set `LOG_FORMAT=json` for JSON log lines; `RUST_LOG` overrides the filter.

use printstudio_api::{
    app::{build_router, AppState},
    config::Config,
};
use printstudio_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool, DatabaseConfig},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str =
    "printstudio_api=debug,printstudio_worker=debug,printstudio_shared=debug,tower_http=debug";

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env must be loaded before the filter reads RUST_LOG
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!(
        "PrintStudio API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;

    let db = match &config.database.url {
        Some(url) => {
            let pool = create_pool(
                DatabaseConfig::new(url.clone()).with_max_connections(config.database.max_connections),
            )
            .await?;
            run_migrations(&pool).await?;
            Some(pool)
        }
        None => None,
    };

    let bind_address = config.bind_address();
    let state = AppState::from_config(config, db.clone())?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = db {
        close_pool(pool).await;
    }

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
