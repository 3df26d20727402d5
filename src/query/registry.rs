//! Trading accounts (balance managers) known to this process

use std::collections::HashMap;
use std::path::Path;

use move_core_types::account_address::AccountAddress;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use tokio::sync::RwLock;

use super::{QueryError, QueryResult};
use crate::config::HexAddress;

/// A balance manager registered under a caller-chosen key.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingAccount {
    /// Object id of the on-chain `BalanceManager`.
    #[serde_as(as = "HexAddress")]
    pub address: AccountAddress,
    /// Delegated `TradeCap`, if trading goes through one.
    #[serde_as(as = "Option<HexAddress>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_cap: Option<AccountAddress>,
}

/// In-memory map from account key to trading account.
///
/// Lives as long as the client and is repopulated on every start. Lookups
/// share the read lock; registration takes the write lock.
#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: RwLock<HashMap<String, TradingAccount>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `account` under `key`, replacing any previous registration.
    pub async fn register(&self, key: impl Into<String>, account: TradingAccount) {
        let key = key.into();
        let previous = self.accounts.write().await.insert(key.clone(), account);
        if previous.is_some() {
            tracing::debug!("Replaced trading account '{}'", key);
        } else {
            tracing::debug!("Registered trading account '{}'", key);
        }
    }

    pub async fn lookup(&self, key: &str) -> QueryResult<TradingAccount> {
        self.accounts
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| QueryError::NotFound(format!("trading account '{}'", key)))
    }

    /// Registered keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.accounts.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Register every account in a JSON object of `{ key: account }`.
    ///
    /// Returns the number of accounts registered.
    pub async fn load_from_file(&self, path: &Path) -> anyhow::Result<usize> {
        let content = tokio::fs::read_to_string(path).await?;
        let accounts: HashMap<String, TradingAccount> = serde_json::from_str(&content)?;
        let count = accounts.len();

        let mut map = self.accounts.write().await;
        map.extend(accounts);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(hex: &str) -> TradingAccount {
        TradingAccount {
            address: AccountAddress::from_hex_literal(hex).unwrap(),
            trade_cap: None,
        }
    }

    #[tokio::test]
    async fn test_register_then_lookup() {
        let registry = AccountRegistry::new();
        registry.register("alice", account("0xa1")).await;

        assert_eq!(registry.lookup("alice").await.unwrap(), account("0xa1"));
        assert!(matches!(
            registry.lookup("bob").await,
            Err(QueryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reregister_overwrites() {
        let registry = AccountRegistry::new();
        registry.register("alice", account("0xa1")).await;
        registry
            .register(
                "alice",
                TradingAccount {
                    address: AccountAddress::from_hex_literal("0xa2").unwrap(),
                    trade_cap: Some(AccountAddress::from_hex_literal("0xcc").unwrap()),
                },
            )
            .await;

        let found = registry.lookup("alice").await.unwrap();
        assert_eq!(found.address, AccountAddress::from_hex_literal("0xa2").unwrap());
        assert!(found.trade_cap.is_some());
        assert_eq!(registry.keys().await, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_lookups() {
        let registry = std::sync::Arc::new(AccountRegistry::new());
        registry.register("alice", account("0xa1")).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.lookup("alice").await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), account("0xa1"));
        }
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "deepbook-query-accounts-{}.json",
            std::process::id()
        ));
        tokio::fs::write(
            &path,
            r#"{
                "maker": { "address": "0x1234" },
                "taker": { "address": "0x5678", "trade_cap": "0x9abc" }
            }"#,
        )
        .await
        .unwrap();

        let registry = AccountRegistry::new();
        let count = registry.load_from_file(&path).await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;

        assert_eq!(count, 2);
        assert_eq!(registry.keys().await, vec!["maker", "taker"]);
        assert_eq!(
            registry.lookup("taker").await.unwrap().trade_cap,
            Some(AccountAddress::from_hex_literal("0x9abc").unwrap())
        );
    }
}
