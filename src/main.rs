//! DeepBook Query Server
//!
//! HTTP API over DeepBook's read-only view functions. Each request composes a
//! single view call and dry-runs it against a full node (JSON-RPC) or a local
//! Move VM loaded from mainnet.

use anyhow::Context;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deepbook_query::api;
use deepbook_query::config::{DeepBookConfig, ServerConfig, SimulatorBackend};
use deepbook_query::metrics::QueryMetrics;
use deepbook_query::query::{AccountRegistry, DeepBookQuery};
use deepbook_query::sandbox::rpc::JsonRpcSimulator;
use deepbook_query::sandbox::vm;
use deepbook_query::sandbox::Simulator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let server_config = ServerConfig::from_env()?;
    let deepbook_config = DeepBookConfig::load(server_config.config_path.as_deref()).await?;
    tracing::info!(
        "DeepBook package {} (types at {}, {} pools, {} coins)",
        deepbook_config.package_id.to_hex_literal(),
        deepbook_config.original_package_id.to_hex_literal(),
        deepbook_config.pools.len(),
        deepbook_config.coins.len()
    );

    let registry_metrics = prometheus::Registry::new();
    let metrics = Arc::new(QueryMetrics::new(&registry_metrics)?);

    // Trading accounts are in-memory only and repopulated on every start
    let registry = Arc::new(AccountRegistry::new());
    if let Some(path) = &server_config.accounts_path {
        match registry.load_from_file(path).await {
            Ok(count) => {
                tracing::info!("Registered {} trading accounts from {}", count, path.display())
            }
            Err(e) => tracing::warn!("Failed to load accounts from {}: {}", path.display(), e),
        }
    }

    match server_config.simulator {
        SimulatorBackend::Rpc => {
            tracing::info!("Simulating via JSON-RPC at {}", server_config.rpc_url);
            let simulator =
                JsonRpcSimulator::connect(&server_config.rpc_url, server_config.rpc_timeout)
                    .await?
                    .with_metrics(Arc::clone(&metrics));
            let context = ServeContext {
                registry,
                metrics,
                metrics_registry: registry_metrics,
            };
            serve(&server_config, deepbook_config, context, simulator).await
        }
        SimulatorBackend::Vm => {
            tracing::info!("Spawning sandbox thread for local Move VM simulation...");
            let (simulator, ready_rx) = vm::spawn_sandbox_thread(&deepbook_config);

            match ready_rx.await {
                Ok(Ok(())) => tracing::info!("Sandbox thread ready"),
                Ok(Err(e)) => return Err(e.context("sandbox setup failed")),
                Err(_) => anyhow::bail!("Sandbox thread dropped ready channel"),
            }
            let context = ServeContext {
                registry,
                metrics,
                metrics_registry: registry_metrics,
            };
            serve(&server_config, deepbook_config, context, simulator).await
        }
    }
}

/// Shared pieces the server is built from, whichever simulator runs.
struct ServeContext {
    registry: Arc<AccountRegistry>,
    metrics: Arc<QueryMetrics>,
    metrics_registry: prometheus::Registry,
}

async fn serve<S: Simulator + 'static>(
    server_config: &ServerConfig,
    deepbook_config: DeepBookConfig,
    context: ServeContext,
    simulator: S,
) -> anyhow::Result<()> {
    let query = Arc::new(
        DeepBookQuery::new(deepbook_config, context.registry, simulator)
            .with_sender(server_config.sender)
            .with_metrics(context.metrics),
    );

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .merge(api::metrics_router(context.metrics_registry))
        .nest("/api", api::router(query))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    tracing::info!("Starting server on {}", server_config.bind_addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /health                                  - Health check");
    tracing::info!("  GET  /metrics                                 - Prometheus metrics");
    tracing::info!("  GET  /api/pools                               - List configured pools");
    tracing::info!("  GET  /api/pool-id?base=&quote=                - Pool id for a coin pair");
    tracing::info!("  GET  /api/pools/:pool/whitelisted             - Whitelist flag");
    tracing::info!("  GET  /api/pools/:pool/mid-price               - Mid price");
    tracing::info!("  GET  /api/pools/:pool/vault                   - Vault balances");
    tracing::info!("  GET  /api/pools/:pool/trade-params            - Fees and stake required");
    tracing::info!("  GET  /api/pools/:pool/book-params             - Tick, lot, and min size");
    tracing::info!("  GET  /api/pools/:pool/deep-price              - DEEP fee conversion rate");
    tracing::info!("  GET  /api/pools/:pool/level2?low=&high=&side= - Levels in a price range");
    tracing::info!("  GET  /api/pools/:pool/ticks?ticks=            - Levels around mid");
    tracing::info!("  GET  /api/pools/:pool/quantity-out            - Swap quantities out");
    tracing::info!("  GET  /api/pools/:pool/orders/:order_id        - Order details");
    tracing::info!("  GET  /api/order-id/:order_id                  - Decode an order id");
    tracing::info!("  GET  /api/accounts                            - Registered accounts");
    tracing::info!("  POST /api/accounts                            - Register an account");
    tracing::info!("  GET  /api/accounts/:account/balance/:coin     - Balance manager balance");
    tracing::info!("  GET  /api/pools/:pool/accounts/:account       - Account state in pool");
    tracing::info!("  GET  /api/pools/:pool/accounts/:account/open-orders");
    tracing::info!("  GET  /api/pools/:pool/accounts/:account/locked");

    let listener = tokio::net::TcpListener::bind(&server_config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", server_config.bind_addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}
