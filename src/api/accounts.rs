//! Trading account endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::api::AppState;
use crate::query::types::{Account, Balances, ManagerBalance};
use crate::query::TradingAccount;
use crate::sandbox::Simulator;
use crate::types::{ApiError, ApiResult};

/// Request to register a balance manager under a key
#[derive(Debug, Deserialize)]
pub struct RegisterAccountRequest {
    pub key: String,
    #[serde(flatten)]
    pub account: TradingAccount,
}

#[derive(Debug, Serialize)]
pub struct AccountsResponse {
    pub accounts: Vec<String>,
}

/// GET /api/accounts - Registered account keys
pub async fn list_accounts<S: Simulator>(
    State(state): State<AppState<S>>,
) -> Json<AccountsResponse> {
    Json(AccountsResponse {
        accounts: state.query.registry().keys().await,
    })
}

/// POST /api/accounts - Register (or replace) a trading account
pub async fn register_account<S: Simulator>(
    State(state): State<AppState<S>>,
    Json(req): Json<RegisterAccountRequest>,
) -> ApiResult<(StatusCode, Json<AccountsResponse>)> {
    let key = req.key.trim();
    if key.is_empty() {
        return Err(ApiError::BadRequest("account key must not be empty".into()));
    }

    tracing::info!(
        "Registering trading account '{}' -> {}",
        key,
        req.account.address.to_hex_literal()
    );
    state.query.registry().register(key, req.account).await;

    Ok((
        StatusCode::CREATED,
        Json(AccountsResponse {
            accounts: state.query.registry().keys().await,
        }),
    ))
}

/// GET /api/accounts/:account/balance/:coin
pub async fn manager_balance<S: Simulator>(
    State(state): State<AppState<S>>,
    Path((account, coin)): Path<(String, String)>,
) -> ApiResult<Json<ManagerBalance>> {
    Ok(Json(
        state.query.check_manager_balance(&account, &coin).await?,
    ))
}

/// GET /api/pools/:pool/accounts/:account - Account state within the pool
pub async fn account<S: Simulator>(
    State(state): State<AppState<S>>,
    Path((pool, account)): Path<(String, String)>,
) -> ApiResult<Json<Account>> {
    Ok(Json(state.query.account(&pool, &account).await?))
}

#[serde_as]
#[derive(Debug, Serialize)]
pub struct OpenOrdersResponse {
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub order_ids: Vec<u128>,
}

/// GET /api/pools/:pool/accounts/:account/open-orders
pub async fn open_orders<S: Simulator>(
    State(state): State<AppState<S>>,
    Path((pool, account)): Path<(String, String)>,
) -> ApiResult<Json<OpenOrdersResponse>> {
    let order_ids = state.query.account_open_orders(&pool, &account).await?;
    Ok(Json(OpenOrdersResponse { order_ids }))
}

/// GET /api/pools/:pool/accounts/:account/locked
pub async fn locked_balance<S: Simulator>(
    State(state): State<AppState<S>>,
    Path((pool, account)): Path<(String, String)>,
) -> ApiResult<Json<Balances>> {
    Ok(Json(state.query.locked_balance(&pool, &account).await?))
}
