//! Tradegate gateway server binary.
//!
//! Serves the identity endpoints and proxies `/api/v1/*` traffic to the
//! backend services named in the route table.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tradegate_api::config::ApiConfig;
use tradegate_api::{AppState, router};
use tradegate_core::store::{CredentialStore, MemoryCredentialStore, PgCredentialStore};

/// CLI arguments. Everything else comes from the environment.
#[derive(Parser, Debug)]
#[command(name = "tradegate_server", about = "Tradegate identity and edge gateway")]
struct Args {
    /// Address to listen on; overrides `BIND_ADDR`.
    #[arg(long)]
    bind: Option<String>,

    /// PostgreSQL connection URL. Without it users live in memory.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,tradegate_api=debug,tradegate_core=debug")
            }),
        )
        .init();

    let args = Args::parse();
    info!(version = tradegate_core::version(), "starting tradegate_server");

    let mut config = ApiConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.database_url.is_some() {
        config.database_url = args.database_url;
    }

    let store: Arc<dyn CredentialStore> = match &config.database_url {
        Some(url) => {
            info!(max_connections = args.max_connections, "connecting to database");
            let pool = PgPoolOptions::new()
                .max_connections(args.max_connections)
                .acquire_timeout(std::time::Duration::from_secs(30))
                .connect(url)
                .await?;

            info!("running database migrations");
            tradegate_api::migrate(&pool).await?;
            Arc::new(PgCredentialStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, users and refresh tokens are kept in memory");
            Arc::new(MemoryCredentialStore::new())
        }
    };

    info!(
        routes = config.routes.len(),
        federated = config.azure.is_some(),
        "route table loaded"
    );

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config, store)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "gateway listening");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
            }
            shutdown.cancel();
        }
    });

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    info!("gateway stopped");
    Ok(())
}
