//! API endpoints for the query service

use axum::{extract::State, routing::get, Router};
use std::sync::Arc;

mod accounts;
mod orderbook;
mod pools;

use crate::metrics;
use crate::query::DeepBookQuery;
use crate::sandbox::Simulator;
use crate::types::{ApiError, ApiResult};

/// Shared application state: the query facade behind an `Arc`
pub struct AppState<S> {
    pub query: Arc<DeepBookQuery<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            query: Arc::clone(&self.query),
        }
    }
}

/// Create the API router with all endpoints
pub fn router<S: Simulator + 'static>(query: Arc<DeepBookQuery<S>>) -> Router {
    let app_state = AppState { query };

    Router::new()
        // Pools
        .route("/pools", get(pools::list_pools::<S>))
        .route("/pool-id", get(pools::get_pool_id::<S>))
        .route("/pools/:pool/whitelisted", get(pools::whitelisted::<S>))
        .route("/pools/:pool/mid-price", get(pools::mid_price::<S>))
        .route("/pools/:pool/vault", get(pools::vault_balances::<S>))
        .route("/pools/:pool/trade-params", get(pools::trade_params::<S>))
        .route("/pools/:pool/book-params", get(pools::book_params::<S>))
        .route("/pools/:pool/deep-price", get(pools::deep_price::<S>))
        // Order book
        .route("/pools/:pool/level2", get(orderbook::level2_range::<S>))
        .route("/pools/:pool/ticks", get(orderbook::ticks_from_mid::<S>))
        .route("/pools/:pool/quantity-out", get(orderbook::quantity_out::<S>))
        .route("/pools/:pool/orders/:order_id", get(orderbook::get_order::<S>))
        .route("/order-id/:order_id", get(orderbook::decode_order_id))
        // Trading accounts
        .route(
            "/accounts",
            get(accounts::list_accounts::<S>).post(accounts::register_account::<S>),
        )
        .route(
            "/accounts/:account/balance/:coin",
            get(accounts::manager_balance::<S>),
        )
        .route(
            "/pools/:pool/accounts/:account",
            get(accounts::account::<S>),
        )
        .route(
            "/pools/:pool/accounts/:account/open-orders",
            get(accounts::open_orders::<S>),
        )
        .route(
            "/pools/:pool/accounts/:account/locked",
            get(accounts::locked_balance::<S>),
        )
        .with_state(app_state)
}

/// Create the Prometheus scrape router
pub fn metrics_router(registry: prometheus::Registry) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(registry)
}

/// GET /metrics
async fn render_metrics(State(registry): State<prometheus::Registry>) -> ApiResult<String> {
    metrics::render(&registry).map_err(|e| ApiError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::QueryMetrics;

    #[tokio::test]
    async fn test_render_metrics() {
        let registry = prometheus::Registry::new();
        let metrics = QueryMetrics::new(&registry).unwrap();
        metrics.view_calls.with_label_values(&["pool::whitelisted"]).inc();

        let body = render_metrics(State(registry)).await.unwrap();
        assert!(body.contains("deepbook_query_view_calls{function=\"pool::whitelisted\"} 1"));
    }
}
