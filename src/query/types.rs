//! Normalized query results
//!
//! Decimals and order ids serialize as strings so no precision is lost in
//! JSON.

use move_core_types::account_address::AccountAddress;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::config::HexAddress;

/// Balance of one coin held by a balance manager.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerBalance {
    pub coin_type: String,
    #[serde_as(as = "DisplayFromStr")]
    pub balance: Decimal,
}

/// Result of a quantity-out simulation against the book.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityOut {
    #[serde_as(as = "DisplayFromStr")]
    pub base_quantity: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub quote_quantity: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub base_out: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub quote_out: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub deep_required: Decimal,
}

/// Price levels on one side of the book, parallel vectors.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level2Range {
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub prices: Vec<Decimal>,
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub quantities: Vec<Decimal>,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level2TicksFromMid {
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub bid_prices: Vec<Decimal>,
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub bid_quantities: Vec<Decimal>,
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub ask_prices: Vec<Decimal>,
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub ask_quantities: Vec<Decimal>,
}

/// Amounts of the base, quote, and DEEP coins of a pool.
///
/// Used for vault totals, locked balances, and account balance buckets.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    #[serde_as(as = "DisplayFromStr")]
    pub base: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub quote: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub deep: Decimal,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTradeParams {
    #[serde_as(as = "DisplayFromStr")]
    pub taker_fee: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub maker_fee: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub stake_required: Decimal,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolBookParams {
    #[serde_as(as = "DisplayFromStr")]
    pub tick_size: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub lot_size: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub min_size: Decimal,
}

/// DEEP fee conversion rate, per unit of base or quote.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDeepPrice {
    pub asset_is_base: bool,
    #[serde_as(as = "DisplayFromStr")]
    pub deep_per_asset: Decimal,
}

/// A resting order with normalized quantities.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    #[serde_as(as = "HexAddress")]
    pub balance_manager_id: AccountAddress,
    #[serde_as(as = "DisplayFromStr")]
    pub order_id: u128,
    pub client_order_id: u64,
    pub is_bid: bool,
    #[serde_as(as = "DisplayFromStr")]
    pub price: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub quantity: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub filled_quantity: Decimal,
    pub fee_is_deep: bool,
    pub order_deep_price: OrderDeepPrice,
    pub epoch: u64,
    pub status: u8,
    pub expire_timestamp: u64,
}

/// A balance manager's state within one pool.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub epoch: u64,
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub open_orders: Vec<u128>,
    #[serde_as(as = "DisplayFromStr")]
    pub taker_volume: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub maker_volume: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub active_stake: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub inactive_stake: Decimal,
    pub created_proposal: bool,
    #[serde_as(as = "Option<HexAddress>")]
    pub voted_proposal: Option<AccountAddress>,
    pub unclaimed_rebates: Balances,
    pub settled_balances: Balances,
    pub owed_balances: Balances,
}

/// The three fields packed into a DeepBook order id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIdParts {
    pub is_bid: bool,
    /// Raw price, before normalization.
    pub price: u64,
    pub sequence: u64,
}

/// Split an order id: bit 127 is the side (0 = bid), bits 64..127 the raw
/// price, bits 0..64 the sequence number.
pub fn decode_order_id(order_id: u128) -> OrderIdParts {
    OrderIdParts {
        is_bid: (order_id >> 127) == 0,
        price: ((order_id >> 64) & ((1u128 << 63) - 1)) as u64,
        sequence: order_id as u64,
    }
}
