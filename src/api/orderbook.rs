//! Order book endpoints
//!
//! Levels come straight from the pool's view functions at the node's latest
//! state; nothing is cached between requests.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use crate::api::AppState;
use crate::query::types::{
    self, Level2Range, Level2TicksFromMid, Order, OrderIdParts, QuantityOut,
};
use crate::sandbox::Simulator;
use crate::types::{ApiError, ApiResult};

const DEFAULT_TICKS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

/// Query parameters for the level2 range endpoint
#[serde_as]
#[derive(Debug, Deserialize)]
pub struct Level2Query {
    #[serde_as(as = "DisplayFromStr")]
    pub low: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub high: Decimal,
    pub side: Side,
}

/// GET /api/pools/:pool/level2?low=..&high=..&side=bid|ask
pub async fn level2_range<S: Simulator>(
    State(state): State<AppState<S>>,
    Path(pool): Path<String>,
    Query(query): Query<Level2Query>,
) -> ApiResult<Json<Level2Range>> {
    if query.low > query.high {
        return Err(ApiError::BadRequest(format!(
            "low {} is above high {}",
            query.low, query.high
        )));
    }

    let range = state
        .query
        .get_level2_range(&pool, query.low, query.high, query.side == Side::Bid)
        .await?;
    Ok(Json(range))
}

#[derive(Debug, Deserialize)]
pub struct TicksQuery {
    pub ticks: Option<u64>,
}

/// GET /api/pools/:pool/ticks?ticks=N - N levels each side of mid (default 10)
pub async fn ticks_from_mid<S: Simulator>(
    State(state): State<AppState<S>>,
    Path(pool): Path<String>,
    Query(query): Query<TicksQuery>,
) -> ApiResult<Json<Level2TicksFromMid>> {
    let ticks = query.ticks.unwrap_or(DEFAULT_TICKS);
    Ok(Json(state.query.get_level2_ticks_from_mid(&pool, ticks).await?))
}

#[serde_as]
#[derive(Debug, Deserialize)]
pub struct QuantityOutQuery {
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub base: Option<Decimal>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub quote: Option<Decimal>,
}

/// GET /api/pools/:pool/quantity-out?base=..|quote=..
///
/// `base` alone sells base for quote, `quote` alone buys base with quote.
pub async fn quantity_out<S: Simulator>(
    State(state): State<AppState<S>>,
    Path(pool): Path<String>,
    Query(query): Query<QuantityOutQuery>,
) -> ApiResult<Json<QuantityOut>> {
    let out = match (query.base, query.quote) {
        (Some(base), None) => state.query.get_quote_quantity_out(&pool, base).await?,
        (None, Some(quote)) => state.query.get_base_quantity_out(&pool, quote).await?,
        (Some(base), Some(quote)) => state.query.get_quantity_out(&pool, base, quote).await?,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "one of 'base' or 'quote' is required".into(),
            ))
        }
    };
    Ok(Json(out))
}

fn parse_order_id(raw: &str) -> ApiResult<u128> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid order id '{}'", raw)))
}

/// GET /api/pools/:pool/orders/:order_id
pub async fn get_order<S: Simulator>(
    State(state): State<AppState<S>>,
    Path((pool, order_id)): Path<(String, String)>,
) -> ApiResult<Json<Order>> {
    let order_id = parse_order_id(&order_id)?;
    Ok(Json(state.query.get_order(&pool, order_id).await?))
}

/// GET /api/order-id/:order_id - Split an order id into side, raw price, sequence
pub async fn decode_order_id(Path(order_id): Path<String>) -> ApiResult<Json<OrderIdParts>> {
    Ok(Json(types::decode_order_id(parse_order_id(&order_id)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order_id() {
        assert_eq!(parse_order_id("42").unwrap(), 42);
        assert_eq!(
            parse_order_id(&u128::MAX.to_string()).unwrap(),
            u128::MAX
        );
        assert!(matches!(
            parse_order_id("0xzz"),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_side_deserializes_lowercase() {
        let query: Level2Query =
            serde_json::from_str(r#"{"low": "3.1", "high": "3.9", "side": "ask"}"#).unwrap();
        assert_eq!(query.side, Side::Ask);
        assert_eq!(query.low, Decimal::new(31, 1));
    }

    #[test]
    fn test_quantity_out_query_optional_decimals() {
        let query: QuantityOutQuery = serde_json::from_str(r#"{"quote": "12.5"}"#).unwrap();
        assert_eq!(query.base, None);
        assert_eq!(query.quote, Some(Decimal::new(125, 1)));

        assert!(serde_json::from_str::<QuantityOutQuery>(r#"{"base": "lots"}"#).is_err());
    }
}
