//! AiWaah API server binary.
//!
//! Serves the token-exchange and chat endpoints. Uses PostgreSQL for
//! conversation memory when a database URL is configured, otherwise keeps
//! memory in process.

use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use aiwaah_api::config::ApiConfig;
use aiwaah_core::auth::jwks::{HttpKeySetSource, KeySetCache};
use aiwaah_core::completion::{CompletionClient, OpenAiClient};
use aiwaah_core::memory::{InMemoryStore, MemoryStore, PgMemoryStore};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "aiwaah_server", about = "AiWaah API server")]
struct Args {
    /// Address to bind (overrides `BIND_ADDR`).
    #[arg(long)]
    bind: Option<String>,

    /// PostgreSQL connection URL. Omit to keep memory in process.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Skip fetching the IdP key set at startup.
    #[arg(long, default_value_t = false)]
    no_jwks_warmup: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,aiwaah_api=debug,aiwaah_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.database_url.is_some() {
        config.pg_connection_url = args.database_url;
    }

    info!(
        bind_addr = %config.bind_addr,
        issuer = %config.idp.issuer,
        require_audience = config.idp.require_audience,
        "starting aiwaah_server"
    );

    let store: Arc<dyn MemoryStore> = match &config.pg_connection_url {
        Some(url) => {
            info!(max_connections = args.max_connections, "configuring connection pool");
            let pool = PgPoolOptions::new()
                .max_connections(args.max_connections)
                .acquire_timeout(std::time::Duration::from_secs(30))
                .connect(url)
                .await?;

            info!("running database migrations");
            aiwaah_core::migrate::migrate(&pool).await?;
            Arc::new(PgMemoryStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, conversation memory is kept in process");
            Arc::new(InMemoryStore::new())
        }
    };

    let source = HttpKeySetSource::new(config.resolved_jwks_url()?, config.outbound_timeout)?;
    info!(jwks_url = %source.url(), "using IdP key set");
    let keys = Arc::new(KeySetCache::new(Arc::new(source)));
    if !args.no_jwks_warmup
        && let Err(e) = keys.refresh().await
    {
        warn!(error = %e, "JWKS warm-up failed, keys will be fetched on first exchange");
    }

    let openai = OpenAiClient::new(&config.openai)?;
    info!(model = %openai.model(), "completion client ready");
    let completion: Arc<dyn CompletionClient> = Arc::new(openai);

    let bind_addr = config.bind_addr.clone();
    let state = aiwaah_api::AppState::new(config, keys, store, completion)?;
    let app = aiwaah_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
