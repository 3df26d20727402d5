//! Configuration
//!
//! `DeepBookConfig` resolves human-readable pool and coin keys to on-chain ids
//! and decimal scalars. `ServerConfig` holds process settings read from the
//! environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use move_core_types::account_address::AccountAddress;
use move_core_types::language_storage::TypeTag;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, DeserializeAs, SerializeAs};

use crate::query::{QueryError, QueryResult};

// DeepBook V3 mainnet. Calls go to the latest upgrade; types and objects keep
// the address the package was first published at.
const DEEPBOOK_PACKAGE: &str = "0x337f4f4f6567fcd778d5454f27c16c70e2f274cc6377ea6249ddf491482ef497";
const DEEPBOOK_ORIGINAL_PACKAGE: &str =
    "0x2c8d603bc51326b8c13cef9dd07031a408a48dddb541963357661df5d3204809";
const DEEPBOOK_REGISTRY_ID: &str =
    "0xaf16199a2dff736e9f07a845f23c5da6df6f756eddb631aed9d24a93efc4549d";

const SUI_TYPE: &str = "0x2::sui::SUI";
const USDC_TYPE: &str =
    "0xdba34672e30cb065b1f93e3ab55318768fd6fef66c15942c9f7cb846e2f900e7::usdc::USDC";
const WAL_TYPE: &str =
    "0x356a26eb9e012a68958082340d4c4116e7f55615cf27affcff209cf0ae544f59::wal::WAL";
const DEEP_TYPE: &str =
    "0xdeeb7a4662eec9f2f3def03fb937a663dddaa2e215b8078a284d026b7946c270::deep::DEEP";

const SUI_USDC_POOL: &str = "0xe05dafb5133bcffb8d59f4e12465dc0e9faeaa05e3e342a08fe135800e3e4407";
const WAL_USDC_POOL: &str = "0x56a1c985c1f1123181d6b881714793689321ba24301b3585eec427436eb1c76d";
const DEEP_USDC_POOL: &str = "0xf948981b806057580f91622417534f491da5f61aeaf33d0ed8e69fd5691c95ce";

pub const DEFAULT_RPC_URL: &str = "https://fullnode.mainnet.sui.io:443";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 30;

/// Hex address adapter for `serde_as`, accepting short literals like `0x6`.
pub struct HexAddress;

impl SerializeAs<AccountAddress> for HexAddress {
    fn serialize_as<S: Serializer>(source: &AccountAddress, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&source.to_canonical_string(true))
    }
}

impl<'de> DeserializeAs<'de, AccountAddress> for HexAddress {
    fn deserialize_as<D: Deserializer<'de>>(d: D) -> Result<AccountAddress, D::Error> {
        let raw = String::deserialize(d)?;
        parse_address(&raw).map_err(D::Error::custom)
    }
}

/// Parse `0x`-prefixed hex of any length up to 32 bytes.
pub fn parse_address(raw: &str) -> Result<AccountAddress, String> {
    let trimmed = raw.trim();
    let literal = if trimmed.starts_with("0x") {
        trimmed.to_string()
    } else {
        format!("0x{}", trimmed)
    };
    AccountAddress::from_hex_literal(&literal)
        .map_err(|e| format!("invalid address '{}': {}", raw, e))
}

/// A coin type and its decimal scalar (`10^decimals`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    #[serde(rename = "type")]
    pub type_name: String,
    pub scalar: u64,
}

impl Coin {
    pub fn new(type_name: &str, decimals: u32) -> Self {
        Self {
            type_name: type_name.to_string(),
            scalar: 10u64.pow(decimals),
        }
    }

    pub fn type_tag(&self) -> QueryResult<TypeTag> {
        TypeTag::from_str(&self.type_name).map_err(|e| {
            QueryError::InvalidInput(format!("invalid coin type '{}': {}", self.type_name, e))
        })
    }
}

/// A pool object and the keys of its base and quote coins.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    #[serde_as(as = "HexAddress")]
    pub address: AccountAddress,
    pub base_coin: String,
    pub quote_coin: String,
}

/// On-chain ids for one DeepBook deployment.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepBookConfig {
    /// Latest package upgrade, the target of every view call.
    #[serde_as(as = "HexAddress")]
    pub package_id: AccountAddress,
    /// First published address, which every DeepBook type is defined at.
    #[serde_as(as = "HexAddress")]
    pub original_package_id: AccountAddress,
    #[serde_as(as = "HexAddress")]
    pub registry_id: AccountAddress,
    pub coins: HashMap<String, Coin>,
    pub pools: HashMap<String, Pool>,
}

/// Partial config merged over a preset.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    #[serde_as(as = "Option<HexAddress>")]
    package_id: Option<AccountAddress>,
    #[serde_as(as = "Option<HexAddress>")]
    original_package_id: Option<AccountAddress>,
    #[serde_as(as = "Option<HexAddress>")]
    registry_id: Option<AccountAddress>,
    #[serde(default)]
    coins: HashMap<String, Coin>,
    #[serde(default)]
    pools: HashMap<String, Pool>,
}

impl DeepBookConfig {
    /// DeepBook V3 on mainnet.
    pub fn mainnet() -> Self {
        let coins = [
            ("SUI", Coin::new(SUI_TYPE, 9)),
            ("USDC", Coin::new(USDC_TYPE, 6)),
            ("WAL", Coin::new(WAL_TYPE, 9)),
            ("DEEP", Coin::new(DEEP_TYPE, 6)),
        ]
        .into_iter()
        .map(|(key, coin)| (key.to_string(), coin))
        .collect();

        let pools = [
            ("SUI_USDC", SUI_USDC_POOL, "SUI"),
            ("WAL_USDC", WAL_USDC_POOL, "WAL"),
            ("DEEP_USDC", DEEP_USDC_POOL, "DEEP"),
        ]
        .into_iter()
        .map(|(key, address, base)| {
            (
                key.to_string(),
                Pool {
                    address: mainnet_address(address),
                    base_coin: base.to_string(),
                    quote_coin: "USDC".to_string(),
                },
            )
        })
        .collect();

        Self {
            package_id: mainnet_address(DEEPBOOK_PACKAGE),
            original_package_id: mainnet_address(DEEPBOOK_ORIGINAL_PACKAGE),
            registry_id: mainnet_address(DEEPBOOK_REGISTRY_ID),
            coins,
            pools,
        }
    }

    /// Mainnet preset, with the JSON file at `path` merged over it when given.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = Self::mainnet();
        let Some(path) = path else {
            return Ok(config);
        };

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read DeepBook config {}", path.display()))?;
        let overrides: ConfigOverrides = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse DeepBook config {}", path.display()))?;
        config.merge(overrides);
        config.validate()?;

        tracing::info!(
            "Loaded DeepBook config from {}: {} coins, {} pools",
            path.display(),
            config.coins.len(),
            config.pools.len()
        );
        Ok(config)
    }

    fn merge(&mut self, overrides: ConfigOverrides) {
        if let Some(package_id) = overrides.package_id {
            self.package_id = package_id;
        }
        if let Some(original_package_id) = overrides.original_package_id {
            self.original_package_id = original_package_id;
        }
        if let Some(registry_id) = overrides.registry_id {
            self.registry_id = registry_id;
        }
        self.coins.extend(overrides.coins);
        self.pools.extend(overrides.pools);
    }

    /// Every pool must reference known coins and every scalar must be non-zero.
    fn validate(&self) -> anyhow::Result<()> {
        for (key, coin) in &self.coins {
            if coin.scalar == 0 {
                return Err(anyhow!("coin {} has a zero scalar", key));
            }
        }
        for (key, pool) in &self.pools {
            for coin in [&pool.base_coin, &pool.quote_coin] {
                if !self.coins.contains_key(coin) {
                    return Err(anyhow!("pool {} references unknown coin {}", key, coin));
                }
            }
        }
        Ok(())
    }

    pub fn get_coin(&self, key: &str) -> QueryResult<&Coin> {
        self.coins
            .get(key)
            .ok_or_else(|| QueryError::NotFound(format!("coin '{}'", key)))
    }

    pub fn get_pool(&self, key: &str) -> QueryResult<&Pool> {
        self.pools
            .get(key)
            .ok_or_else(|| QueryError::NotFound(format!("pool '{}'", key)))
    }

    /// Pool keys, sorted.
    pub fn pool_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.pools.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

fn mainnet_address(hex: &str) -> AccountAddress {
    // Constants above are full 32-byte literals.
    AccountAddress::from_hex_literal(hex).unwrap_or(AccountAddress::ZERO)
}

/// Which simulator answers dry-run requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorBackend {
    /// Full node `sui_devInspectTransactionBlock`.
    Rpc,
    /// Local Move VM fed with mainnet objects over gRPC.
    Vm,
}

impl FromStr for SimulatorBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rpc" | "json-rpc" | "jsonrpc" => Ok(SimulatorBackend::Rpc),
            "vm" | "sandbox" | "movevm" => Ok(SimulatorBackend::Vm),
            other => Err(anyhow!("unknown simulator backend '{}'", other)),
        }
    }
}

/// Process settings, read from `DEEPBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub rpc_url: String,
    pub simulator: SimulatorBackend,
    pub sender: AccountAddress,
    pub bind_addr: String,
    pub config_path: Option<PathBuf>,
    pub accounts_path: Option<PathBuf>,
    pub rpc_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            simulator: SimulatorBackend::Rpc,
            sender: AccountAddress::ZERO,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            config_path: None,
            accounts_path: None,
            rpc_timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("DEEPBOOK_RPC_URL") {
            config.rpc_url = url;
        }
        if let Some(backend) = lookup("DEEPBOOK_SIMULATOR") {
            config.simulator = backend.parse()?;
        }
        if let Some(sender) = lookup("DEEPBOOK_SENDER") {
            config.sender = parse_address(&sender).map_err(|e| anyhow!(e))?;
        }
        if let Some(bind_addr) = lookup("DEEPBOOK_BIND_ADDR") {
            config.bind_addr = bind_addr;
        }
        config.config_path = lookup("DEEPBOOK_CONFIG_PATH").map(PathBuf::from);
        config.accounts_path = lookup("DEEPBOOK_ACCOUNTS_PATH").map(PathBuf::from);
        if let Some(timeout) = lookup("DEEPBOOK_RPC_TIMEOUT_SECS") {
            let secs: u64 = timeout
                .parse()
                .with_context(|| format!("invalid DEEPBOOK_RPC_TIMEOUT_SECS '{}'", timeout))?;
            config.rpc_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}
