//! Query facade over DeepBook view functions
//!
//! Every operation runs the same pipeline: resolve pool, coin and account
//! keys, resolve the shared objects, compose one Move call, simulate it,
//! decode the declared return slots in order, and normalize.

use std::str::FromStr;
use std::sync::Arc;

use move_core_types::account_address::AccountAddress;
use move_core_types::language_storage::TypeTag;
use rust_decimal::Decimal;

use super::normalize::{
    normalize, normalize_price, price_to_raw, to_raw, DEEP_SCALAR, FLOAT_SCALAR,
};
use super::registry::AccountRegistry;
use super::types::{
    decode_order_id, Account, Balances, Level2Range, Level2TicksFromMid, ManagerBalance, Order,
    OrderDeepPrice, PoolBookParams, PoolTradeParams, QuantityOut,
};
use super::{QueryError, QueryResult};
use crate::codec::{decode_slots, DecodeError, Schema, Value};
use crate::config::{Coin, DeepBookConfig, Pool};
use crate::metrics::QueryMetrics;
use crate::ptb::{MoveTarget, ProgrammableTransaction, SharedObjectRef, TransactionBuilder};
use crate::sandbox::Simulator;

const POOL_MODULE: &str = "pool";
const BALANCE_MANAGER_MODULE: &str = "balance_manager";

const U64_SLOT: [Schema; 1] = [Schema::U64];
const U64_TRIPLE: [Schema; 3] = [Schema::U64; 3];

const U64_VECTOR: Schema = Schema::Vector(&Schema::U64);
const LEVEL2_RANGE: [Schema; 2] = [U64_VECTOR; 2];
const LEVEL2_TICKS: [Schema; 4] = [U64_VECTOR; 4];

const ORDER_DEEP_PRICE: Schema = Schema::Struct(&[Schema::Bool, Schema::U64]);

// balance_manager_id, order_id, client_order_id, quantity, filled_quantity,
// fee_is_deep, order_deep_price, epoch, status, expire_timestamp
const ORDER: Schema = Schema::Struct(&[
    Schema::Address,
    Schema::U128,
    Schema::U64,
    Schema::U64,
    Schema::U64,
    Schema::Bool,
    ORDER_DEEP_PRICE,
    Schema::U64,
    Schema::U8,
    Schema::U64,
]);

const BALANCES: Schema = Schema::Struct(&[Schema::U64, Schema::U64, Schema::U64]);

// epoch, open_orders, taker_volume, maker_volume, active_stake,
// inactive_stake, created_proposal, voted_proposal, unclaimed_rebates,
// settled_balances, owed_balances
const ACCOUNT: Schema = Schema::Struct(&[
    Schema::U64,
    Schema::Set(&Schema::U128),
    Schema::U128,
    Schema::U128,
    Schema::U64,
    Schema::U64,
    Schema::Bool,
    Schema::Option(&Schema::Address),
    BALANCES,
    BALANCES,
    BALANCES,
]);

/// One argument of a view call, before shared objects are resolved.
#[derive(Debug, Clone, Copy)]
enum ViewArg {
    Object(AccountAddress),
    Clock,
    U64(u64),
    U128(u128),
    Bool(bool),
}

/// A pool with its base and quote coins resolved.
struct PoolContext<'a> {
    pool: &'a Pool,
    base: &'a Coin,
    quote: &'a Coin,
}

impl PoolContext<'_> {
    fn type_arguments(&self) -> QueryResult<Vec<TypeTag>> {
        Ok(vec![self.base.type_tag()?, self.quote.type_tag()?])
    }

    fn price(&self, raw: u64) -> QueryResult<Decimal> {
        normalize_price(raw, self.base.scalar, self.quote.scalar)
    }

    fn balances(&self, value: Value) -> QueryResult<Balances> {
        let [base, quote, deep] = fields::<3>(value)?;
        Ok(Balances {
            base: normalize(base.as_u64()?, self.base.scalar)?,
            quote: normalize(quote.as_u64()?, self.quote.scalar)?,
            deep: normalize(deep.as_u64()?, DEEP_SCALAR)?,
        })
    }

    fn deep_price(&self, value: Value) -> QueryResult<OrderDeepPrice> {
        let [asset_is_base, deep_per_asset] = fields::<2>(value)?;
        let asset_is_base = asset_is_base.as_bool()?;
        let asset_scalar = if asset_is_base {
            self.base.scalar
        } else {
            self.quote.scalar
        };
        Ok(OrderDeepPrice {
            asset_is_base,
            deep_per_asset: normalize_price(deep_per_asset.as_u64()?, asset_scalar, DEEP_SCALAR)?,
        })
    }
}

/// Fixed-arity view of decoded values.
fn take<const N: usize>(values: Vec<Value>) -> QueryResult<[Value; N]> {
    <[Value; N]>::try_from(values).map_err(|values| {
        QueryError::Decode(DecodeError::ReturnCount {
            expected: N,
            found: values.len(),
        })
    })
}

fn fields<const N: usize>(value: Value) -> QueryResult<[Value; N]> {
    take(value.into_fields()?)
}

fn parallel(prices: &[u64], quantities: &[u64]) -> QueryResult<()> {
    if prices.len() != quantities.len() {
        return Err(QueryError::Decode(DecodeError::UnexpectedValue {
            expected: "parallel price and quantity vectors",
            found: "vectors of different lengths",
        }));
    }
    Ok(())
}

/// Read-only DeepBook client.
///
/// Cheap to share behind an `Arc`; every operation takes `&self` and may
/// run concurrently with any other.
pub struct DeepBookQuery<S> {
    config: DeepBookConfig,
    registry: Arc<AccountRegistry>,
    simulator: S,
    sender: AccountAddress,
    metrics: Option<Arc<QueryMetrics>>,
}

impl<S: Simulator> DeepBookQuery<S> {
    pub fn new(config: DeepBookConfig, registry: Arc<AccountRegistry>, simulator: S) -> Self {
        Self {
            config,
            registry,
            simulator,
            sender: AccountAddress::ZERO,
            metrics: None,
        }
    }

    /// Acting address for simulations. Nothing is ever charged to it.
    pub fn with_sender(mut self, sender: AccountAddress) -> Self {
        self.sender = sender;
        self
    }

    /// Count view calls and failures, and time simulations, per Move function.
    pub fn with_metrics(mut self, metrics: Arc<QueryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &DeepBookConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AccountRegistry> {
        &self.registry
    }

    pub fn sender(&self) -> AccountAddress {
        self.sender
    }

    fn pool_context(&self, pool_key: &str) -> QueryResult<PoolContext<'_>> {
        let pool = self.config.get_pool(pool_key)?;
        Ok(PoolContext {
            pool,
            base: self.config.get_coin(&pool.base_coin)?,
            quote: self.config.get_coin(&pool.quote_coin)?,
        })
    }

    fn pool_target(&self, function: &'static str) -> MoveTarget {
        MoveTarget::new(self.config.package_id, POOL_MODULE, function)
    }

    /// Compose, simulate, and decode a single view call.
    async fn view(
        &self,
        target: MoveTarget,
        type_arguments: Vec<TypeTag>,
        args: &[ViewArg],
        schemas: &[Schema],
    ) -> QueryResult<Vec<Value>> {
        let object_ids: Vec<AccountAddress> = args
            .iter()
            .filter_map(|arg| match arg {
                ViewArg::Object(id) => Some(*id),
                _ => None,
            })
            .collect();
        let mut resolved = if object_ids.is_empty() {
            Vec::new()
        } else {
            self.simulator.resolve_shared(&object_ids).await?
        }
        .into_iter();

        let mut builder = TransactionBuilder::new();
        let mut arguments = Vec::with_capacity(args.len());
        for arg in args {
            let argument = match *arg {
                ViewArg::Object(id) => {
                    let object = resolved
                        .next()
                        .filter(|object| object.id == id)
                        .ok_or_else(|| QueryError::Simulation {
                            code: None,
                            message: format!(
                                "shared object {} was not resolved",
                                id.to_hex_literal()
                            ),
                        })?;
                    builder.shared_object(object)?
                }
                ViewArg::Clock => builder.shared_object(SharedObjectRef::clock())?,
                ViewArg::U64(value) => builder.pure(value)?,
                ViewArg::U128(value) => builder.pure(value)?,
                ViewArg::Bool(value) => builder.pure(value)?,
            };
            arguments.push(argument);
        }
        builder.add_call(&target, type_arguments, arguments)?;
        let tx = builder.finish();

        tracing::debug!("View call {} ({} return slots)", target, schemas.len());

        let label = target.label();
        let result = self.simulate_and_decode(&tx, &label, schemas).await;
        if let (Some(metrics), Err(error)) = (&self.metrics, &result) {
            match error {
                QueryError::Simulation { .. } => metrics
                    .simulation_failures
                    .with_label_values(&[label.as_str()])
                    .inc(),
                QueryError::Decode(_) => metrics
                    .decode_failures
                    .with_label_values(&[label.as_str()])
                    .inc(),
                _ => {}
            }
        }
        result
    }

    async fn simulate_and_decode(
        &self,
        tx: &ProgrammableTransaction,
        label: &str,
        schemas: &[Schema],
    ) -> QueryResult<Vec<Value>> {
        let timer = self.metrics.as_ref().map(|metrics| {
            metrics.view_calls.with_label_values(&[label]).inc();
            metrics
                .simulate_latency
                .with_label_values(&[label])
                .start_timer()
        });
        let returns = self.simulator.simulate(tx, self.sender).await;
        drop(timer);

        let call = returns?
            .into_iter()
            .next()
            .ok_or(QueryError::Decode(DecodeError::ReturnCount {
                expected: schemas.len(),
                found: 0,
            }))?;

        Ok(decode_slots(&call.return_values, schemas)?)
    }

    async fn pool_view(
        &self,
        pool: &PoolContext<'_>,
        function: &'static str,
        args: &[ViewArg],
        schemas: &[Schema],
    ) -> QueryResult<Vec<Value>> {
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(ViewArg::Object(pool.pool.address));
        call_args.extend_from_slice(args);
        self.view(
            self.pool_target(function),
            pool.type_arguments()?,
            &call_args,
            schemas,
        )
        .await
    }

    /// Balance of `coin_key` held by the registered balance manager.
    pub async fn check_manager_balance(
        &self,
        account_key: &str,
        coin_key: &str,
    ) -> QueryResult<ManagerBalance> {
        let account = self.registry.lookup(account_key).await?;
        let coin = self.config.get_coin(coin_key)?;

        let target = MoveTarget::new(self.config.package_id, BALANCE_MANAGER_MODULE, "balance");
        let values = self
            .view(
                target,
                vec![coin.type_tag()?],
                &[ViewArg::Object(account.address)],
                &U64_SLOT,
            )
            .await?;
        let [balance] = take::<1>(values)?;

        Ok(ManagerBalance {
            coin_type: coin.type_name.clone(),
            balance: normalize(balance.as_u64()?, coin.scalar)?,
        })
    }

    pub async fn whitelisted(&self, pool_key: &str) -> QueryResult<bool> {
        let pool = self.pool_context(pool_key)?;
        let values = self
            .pool_view(&pool, "whitelisted", &[], &[Schema::Bool])
            .await?;
        let [whitelisted] = take::<1>(values)?;
        Ok(whitelisted.as_bool()?)
    }

    fn quantity_out(
        pool: &PoolContext<'_>,
        base_quantity: Decimal,
        quote_quantity: Decimal,
        values: Vec<Value>,
    ) -> QueryResult<QuantityOut> {
        let [base_out, quote_out, deep_required] = take::<3>(values)?;
        Ok(QuantityOut {
            base_quantity,
            quote_quantity,
            base_out: normalize(base_out.as_u64()?, pool.base.scalar)?,
            quote_out: normalize(quote_out.as_u64()?, pool.quote.scalar)?,
            deep_required: normalize(deep_required.as_u64()?, DEEP_SCALAR)?,
        })
    }

    /// Quote received for selling `base_quantity`.
    pub async fn get_quote_quantity_out(
        &self,
        pool_key: &str,
        base_quantity: Decimal,
    ) -> QueryResult<QuantityOut> {
        let pool = self.pool_context(pool_key)?;
        let raw = to_raw(base_quantity, pool.base.scalar)?;
        let values = self
            .pool_view(
                &pool,
                "get_quote_quantity_out",
                &[ViewArg::U64(raw), ViewArg::Clock],
                &U64_TRIPLE,
            )
            .await?;
        Self::quantity_out(&pool, base_quantity, Decimal::ZERO, values)
    }

    /// Base received for spending `quote_quantity`.
    pub async fn get_base_quantity_out(
        &self,
        pool_key: &str,
        quote_quantity: Decimal,
    ) -> QueryResult<QuantityOut> {
        let pool = self.pool_context(pool_key)?;
        let raw = to_raw(quote_quantity, pool.quote.scalar)?;
        let values = self
            .pool_view(
                &pool,
                "get_base_quantity_out",
                &[ViewArg::U64(raw), ViewArg::Clock],
                &U64_TRIPLE,
            )
            .await?;
        Self::quantity_out(&pool, Decimal::ZERO, quote_quantity, values)
    }

    /// Quantities out when exactly one of `base_quantity`/`quote_quantity` is non-zero.
    pub async fn get_quantity_out(
        &self,
        pool_key: &str,
        base_quantity: Decimal,
        quote_quantity: Decimal,
    ) -> QueryResult<QuantityOut> {
        let pool = self.pool_context(pool_key)?;
        let base_raw = to_raw(base_quantity, pool.base.scalar)?;
        let quote_raw = to_raw(quote_quantity, pool.quote.scalar)?;
        let values = self
            .pool_view(
                &pool,
                "get_quantity_out",
                &[ViewArg::U64(base_raw), ViewArg::U64(quote_raw), ViewArg::Clock],
                &U64_TRIPLE,
            )
            .await?;
        Self::quantity_out(&pool, base_quantity, quote_quantity, values)
    }

    /// Ids of the registered account's open orders in the pool.
    pub async fn account_open_orders(
        &self,
        pool_key: &str,
        account_key: &str,
    ) -> QueryResult<Vec<u128>> {
        let account = self.registry.lookup(account_key).await?;
        let pool = self.pool_context(pool_key)?;
        let values = self
            .pool_view(
                &pool,
                "account_open_orders",
                &[ViewArg::Object(account.address)],
                &[Schema::Set(&Schema::U128)],
            )
            .await?;
        let [orders] = take::<1>(values)?;
        Ok(orders.into_u128s()?)
    }

    /// Aggregated levels on one side of the book between two prices.
    pub async fn get_level2_range(
        &self,
        pool_key: &str,
        price_low: Decimal,
        price_high: Decimal,
        is_bid: bool,
    ) -> QueryResult<Level2Range> {
        let pool = self.pool_context(pool_key)?;
        let low = price_to_raw(price_low, pool.base.scalar, pool.quote.scalar)?;
        let high = price_to_raw(price_high, pool.base.scalar, pool.quote.scalar)?;
        let values = self
            .pool_view(
                &pool,
                "get_level2_range",
                &[
                    ViewArg::U64(low),
                    ViewArg::U64(high),
                    ViewArg::Bool(is_bid),
                    ViewArg::Clock,
                ],
                &LEVEL2_RANGE,
            )
            .await?;
        let [prices, quantities] = take::<2>(values)?;
        let (prices, quantities) = (prices.into_u64s()?, quantities.into_u64s()?);
        parallel(&prices, &quantities)?;

        Ok(Level2Range {
            prices: self.prices(&pool, &prices)?,
            quantities: Self::quantities(&quantities, pool.base.scalar)?,
        })
    }

    /// `ticks` levels on each side of the mid price.
    pub async fn get_level2_ticks_from_mid(
        &self,
        pool_key: &str,
        ticks: u64,
    ) -> QueryResult<Level2TicksFromMid> {
        let pool = self.pool_context(pool_key)?;
        let values = self
            .pool_view(
                &pool,
                "get_level2_ticks_from_mid",
                &[ViewArg::U64(ticks), ViewArg::Clock],
                &LEVEL2_TICKS,
            )
            .await?;
        let [bid_prices, bid_quantities, ask_prices, ask_quantities] = take::<4>(values)?;
        let bid_prices = bid_prices.into_u64s()?;
        let bid_quantities = bid_quantities.into_u64s()?;
        let ask_prices = ask_prices.into_u64s()?;
        let ask_quantities = ask_quantities.into_u64s()?;
        parallel(&bid_prices, &bid_quantities)?;
        parallel(&ask_prices, &ask_quantities)?;

        Ok(Level2TicksFromMid {
            bid_prices: self.prices(&pool, &bid_prices)?,
            bid_quantities: Self::quantities(&bid_quantities, pool.base.scalar)?,
            ask_prices: self.prices(&pool, &ask_prices)?,
            ask_quantities: Self::quantities(&ask_quantities, pool.base.scalar)?,
        })
    }

    fn prices(&self, pool: &PoolContext<'_>, raw: &[u64]) -> QueryResult<Vec<Decimal>> {
        raw.iter().map(|price| pool.price(*price)).collect()
    }

    fn quantities(raw: &[u64], scalar: u64) -> QueryResult<Vec<Decimal>> {
        raw.iter().map(|quantity| normalize(*quantity, scalar)).collect()
    }

    /// Base, quote, and DEEP held in the pool's vault.
    pub async fn vault_balances(&self, pool_key: &str) -> QueryResult<Balances> {
        let pool = self.pool_context(pool_key)?;
        let values = self
            .pool_view(&pool, "vault_balances", &[], &U64_TRIPLE)
            .await?;
        let [base, quote, deep] = take::<3>(values)?;
        Ok(Balances {
            base: normalize(base.as_u64()?, pool.base.scalar)?,
            quote: normalize(quote.as_u64()?, pool.quote.scalar)?,
            deep: normalize(deep.as_u64()?, DEEP_SCALAR)?,
        })
    }

    /// Pool id for a pair of full coin type names, looked up in the registry.
    pub async fn get_pool_id_by_assets(
        &self,
        base_type: &str,
        quote_type: &str,
    ) -> QueryResult<AccountAddress> {
        let type_arguments = [base_type, quote_type]
            .into_iter()
            .map(|type_name| {
                TypeTag::from_str(type_name).map_err(|e| {
                    QueryError::InvalidInput(format!("invalid coin type '{}': {}", type_name, e))
                })
            })
            .collect::<QueryResult<Vec<_>>>()?;

        let values = self
            .view(
                self.pool_target("get_pool_id_by_asset"),
                type_arguments,
                &[ViewArg::Object(self.config.registry_id)],
                &[Schema::Address],
            )
            .await?;
        let [pool_id] = take::<1>(values)?;
        Ok(pool_id.as_address()?)
    }

    pub async fn mid_price(&self, pool_key: &str) -> QueryResult<Decimal> {
        let pool = self.pool_context(pool_key)?;
        let values = self
            .pool_view(&pool, "mid_price", &[ViewArg::Clock], &U64_SLOT)
            .await?;
        let [price] = take::<1>(values)?;
        pool.price(price.as_u64()?)
    }

    /// Taker fee, maker fee, and DEEP stake required for fee discounts.
    pub async fn pool_trade_params(&self, pool_key: &str) -> QueryResult<PoolTradeParams> {
        let pool = self.pool_context(pool_key)?;
        let values = self
            .pool_view(&pool, "pool_trade_params", &[], &U64_TRIPLE)
            .await?;
        let [taker_fee, maker_fee, stake_required] = take::<3>(values)?;
        Ok(PoolTradeParams {
            taker_fee: normalize(taker_fee.as_u64()?, FLOAT_SCALAR)?,
            maker_fee: normalize(maker_fee.as_u64()?, FLOAT_SCALAR)?,
            stake_required: normalize(stake_required.as_u64()?, DEEP_SCALAR)?,
        })
    }

    pub async fn pool_book_params(&self, pool_key: &str) -> QueryResult<PoolBookParams> {
        let pool = self.pool_context(pool_key)?;
        let values = self
            .pool_view(&pool, "pool_book_params", &[], &U64_TRIPLE)
            .await?;
        let [tick_size, lot_size, min_size] = take::<3>(values)?;
        Ok(PoolBookParams {
            tick_size: pool.price(tick_size.as_u64()?)?,
            lot_size: normalize(lot_size.as_u64()?, pool.base.scalar)?,
            min_size: normalize(min_size.as_u64()?, pool.base.scalar)?,
        })
    }

    /// Funds of the registered account locked in the pool by open orders.
    pub async fn locked_balance(&self, pool_key: &str, account_key: &str) -> QueryResult<Balances> {
        let account = self.registry.lookup(account_key).await?;
        let pool = self.pool_context(pool_key)?;
        let values = self
            .pool_view(
                &pool,
                "locked_balance",
                &[ViewArg::Object(account.address)],
                &U64_TRIPLE,
            )
            .await?;
        let [base, quote, deep] = take::<3>(values)?;
        Ok(Balances {
            base: normalize(base.as_u64()?, pool.base.scalar)?,
            quote: normalize(quote.as_u64()?, pool.quote.scalar)?,
            deep: normalize(deep.as_u64()?, DEEP_SCALAR)?,
        })
    }

    pub async fn get_order(&self, pool_key: &str, order_id: u128) -> QueryResult<Order> {
        let pool = self.pool_context(pool_key)?;
        let values = self
            .pool_view(&pool, "get_order", &[ViewArg::U128(order_id)], &[ORDER])
            .await?;
        let [order] = take::<1>(values)?;
        let [
            balance_manager_id,
            order_id,
            client_order_id,
            quantity,
            filled_quantity,
            fee_is_deep,
            order_deep_price,
            epoch,
            status,
            expire_timestamp,
        ] = fields::<10>(order)?;

        let order_id = order_id.as_u128()?;
        let parts = decode_order_id(order_id);
        Ok(Order {
            balance_manager_id: balance_manager_id.as_address()?,
            order_id,
            client_order_id: client_order_id.as_u64()?,
            is_bid: parts.is_bid,
            price: pool.price(parts.price)?,
            quantity: normalize(quantity.as_u64()?, pool.base.scalar)?,
            filled_quantity: normalize(filled_quantity.as_u64()?, pool.base.scalar)?,
            fee_is_deep: fee_is_deep.as_bool()?,
            order_deep_price: pool.deep_price(order_deep_price)?,
            epoch: epoch.as_u64()?,
            status: status.as_u8()?,
            expire_timestamp: expire_timestamp.as_u64()?,
        })
    }

    /// DEEP conversion rate the pool currently charges fees at.
    pub async fn get_pool_deep_price(&self, pool_key: &str) -> QueryResult<OrderDeepPrice> {
        let pool = self.pool_context(pool_key)?;
        let values = self
            .pool_view(&pool, "get_order_deep_price", &[], &[ORDER_DEEP_PRICE])
            .await?;
        let [deep_price] = take::<1>(values)?;
        pool.deep_price(deep_price)
    }

    /// The registered account's state within the pool.
    pub async fn account(&self, pool_key: &str, account_key: &str) -> QueryResult<Account> {
        let trading_account = self.registry.lookup(account_key).await?;
        let pool = self.pool_context(pool_key)?;
        let values = self
            .pool_view(
                &pool,
                "account",
                &[ViewArg::Object(trading_account.address)],
                &[ACCOUNT],
            )
            .await?;
        let [account] = take::<1>(values)?;
        let [
            epoch,
            open_orders,
            taker_volume,
            maker_volume,
            active_stake,
            inactive_stake,
            created_proposal,
            voted_proposal,
            unclaimed_rebates,
            settled_balances,
            owed_balances,
        ] = fields::<11>(account)?;

        Ok(Account {
            epoch: epoch.as_u64()?,
            open_orders: open_orders.into_u128s()?,
            taker_volume: normalize(taker_volume.as_u128()?, pool.base.scalar)?,
            maker_volume: normalize(maker_volume.as_u128()?, pool.base.scalar)?,
            active_stake: normalize(active_stake.as_u64()?, DEEP_SCALAR)?,
            inactive_stake: normalize(inactive_stake.as_u64()?, DEEP_SCALAR)?,
            created_proposal: created_proposal.as_bool()?,
            voted_proposal: voted_proposal
                .into_option()?
                .map(|id| id.as_address())
                .transpose()?,
            unclaimed_rebates: pool.balances(unclaimed_rebates)?,
            settled_balances: pool.balances(settled_balances)?,
            owed_balances: pool.balances(owed_balances)?,
        })
    }
}
