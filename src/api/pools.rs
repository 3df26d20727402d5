//! Pool-level endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::api::AppState;
use crate::config::HexAddress;
use crate::query::types::{Balances, OrderDeepPrice, PoolBookParams, PoolTradeParams};
use crate::sandbox::Simulator;
use crate::types::ApiResult;

#[serde_as]
#[derive(Debug, Serialize)]
pub struct PoolInfo {
    pub key: String,
    #[serde_as(as = "HexAddress")]
    pub address: move_core_types::account_address::AccountAddress,
    pub base_coin: String,
    pub quote_coin: String,
}

/// GET /api/pools - List configured pools
pub async fn list_pools<S: Simulator>(State(state): State<AppState<S>>) -> Json<Vec<PoolInfo>> {
    let config = state.query.config();
    let pools = config
        .pool_keys()
        .into_iter()
        .filter_map(|key| {
            config.pools.get(key).map(|pool| PoolInfo {
                key: key.to_string(),
                address: pool.address,
                base_coin: pool.base_coin.clone(),
                quote_coin: pool.quote_coin.clone(),
            })
        })
        .collect();
    Json(pools)
}

#[derive(Debug, Deserialize)]
pub struct PoolIdQuery {
    /// Full base coin type, e.g. `0x2::sui::SUI`
    pub base: String,
    pub quote: String,
}

#[serde_as]
#[derive(Debug, Serialize)]
pub struct PoolIdResponse {
    #[serde_as(as = "HexAddress")]
    pub pool_id: move_core_types::account_address::AccountAddress,
}

/// GET /api/pool-id?base=..&quote=.. - Look up a pool by coin types
pub async fn get_pool_id<S: Simulator>(
    State(state): State<AppState<S>>,
    Query(query): Query<PoolIdQuery>,
) -> ApiResult<Json<PoolIdResponse>> {
    let pool_id = state
        .query
        .get_pool_id_by_assets(&query.base, &query.quote)
        .await?;
    Ok(Json(PoolIdResponse { pool_id }))
}

#[derive(Debug, Serialize)]
pub struct WhitelistedResponse {
    pub pool: String,
    pub whitelisted: bool,
}

/// GET /api/pools/:pool/whitelisted
pub async fn whitelisted<S: Simulator>(
    State(state): State<AppState<S>>,
    Path(pool): Path<String>,
) -> ApiResult<Json<WhitelistedResponse>> {
    let whitelisted = state.query.whitelisted(&pool).await?;
    Ok(Json(WhitelistedResponse { pool, whitelisted }))
}

#[serde_as]
#[derive(Debug, Serialize)]
pub struct MidPriceResponse {
    pub pool: String,
    #[serde_as(as = "DisplayFromStr")]
    pub mid_price: Decimal,
}

/// GET /api/pools/:pool/mid-price
pub async fn mid_price<S: Simulator>(
    State(state): State<AppState<S>>,
    Path(pool): Path<String>,
) -> ApiResult<Json<MidPriceResponse>> {
    let mid_price = state.query.mid_price(&pool).await?;
    Ok(Json(MidPriceResponse { pool, mid_price }))
}

/// GET /api/pools/:pool/vault - Base, quote, and DEEP held by the pool
pub async fn vault_balances<S: Simulator>(
    State(state): State<AppState<S>>,
    Path(pool): Path<String>,
) -> ApiResult<Json<Balances>> {
    Ok(Json(state.query.vault_balances(&pool).await?))
}

/// GET /api/pools/:pool/trade-params
pub async fn trade_params<S: Simulator>(
    State(state): State<AppState<S>>,
    Path(pool): Path<String>,
) -> ApiResult<Json<PoolTradeParams>> {
    Ok(Json(state.query.pool_trade_params(&pool).await?))
}

/// GET /api/pools/:pool/book-params
pub async fn book_params<S: Simulator>(
    State(state): State<AppState<S>>,
    Path(pool): Path<String>,
) -> ApiResult<Json<PoolBookParams>> {
    Ok(Json(state.query.pool_book_params(&pool).await?))
}

/// GET /api/pools/:pool/deep-price
pub async fn deep_price<S: Simulator>(
    State(state): State<AppState<S>>,
    Path(pool): Path<String>,
) -> ApiResult<Json<OrderDeepPrice>> {
    Ok(Json(state.query.get_pool_deep_price(&pool).await?))
}
