//! Full node JSON-RPC simulator
//!
//! `sui_devInspectTransactionBlock` evaluates the transaction kind against the
//! node's latest state with no gas payment and no signature.
//! `sui_multiGetObjects` supplies the initial shared versions needed to
//! reference shared objects.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use move_core_types::account_address::AccountAddress;
use sui_sdk::rpc_types::{
    SuiExecutionStatus, SuiObjectDataOptions, SuiTransactionBlockEffectsAPI,
};
use sui_sdk::types::base_types::{ObjectID, SuiAddress};
use sui_sdk::types::object::Owner;
use sui_sdk::{SuiClient, SuiClientBuilder};
use tokio::sync::RwLock;

use super::{CallReturn, Simulator};
use crate::metrics::QueryMetrics;
use crate::ptb::{
    ProgrammableTransaction, SharedObjectRef, TransactionKind, CLOCK_OBJECT_ID,
};
use crate::query::{QueryError, QueryResult};

const DEV_INSPECT: &str = "sui_devInspectTransactionBlock";
const MULTI_GET_OBJECTS: &str = "sui_multiGetObjects";

/// Simulator backed by a full node.
pub struct JsonRpcSimulator {
    client: SuiClient,
    url: String,
    /// Initial shared versions never change, so they are cached for the
    /// life of the simulator.
    shared_versions: RwLock<HashMap<AccountAddress, u64>>,
    metrics: Option<Arc<QueryMetrics>>,
}

impl JsonRpcSimulator {
    /// Connect to the full node at `url`. Every request is bounded by `timeout`.
    pub async fn connect(url: impl Into<String>, timeout: Duration) -> QueryResult<Self> {
        let url = url.into();
        let client = SuiClientBuilder::default()
            .request_timeout(timeout)
            .build(&url)
            .await
            .map_err(|e| QueryError::Transport(format!("failed to connect to {}: {}", url, e)))?;

        Ok(Self {
            client,
            url,
            shared_versions: RwLock::new(HashMap::new()),
            metrics: None,
        })
    }

    /// Count every request and failed request per RPC method.
    pub fn with_metrics(mut self, metrics: Arc<QueryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn observe<T, E: Display>(
        &self,
        method: &'static str,
        request: impl Future<Output = Result<T, E>>,
    ) -> QueryResult<T> {
        if let Some(metrics) = &self.metrics {
            metrics.rpc_requests.with_label_values(&[method]).inc();
        }

        request.await.map_err(|e| {
            if let Some(metrics) = &self.metrics {
                metrics.rpc_failures.with_label_values(&[method]).inc();
            }
            tracing::debug!(method, "JSON-RPC call failed: {}", e);
            QueryError::Transport(format!("{} failed: {}", method, e))
        })
    }

    async fn fetch_shared_versions(&self, ids: &[AccountAddress]) -> QueryResult<()> {
        let object_ids: Vec<ObjectID> = ids.iter().map(|id| ObjectID::from(*id)).collect();
        let options = SuiObjectDataOptions::new().with_owner();
        let responses = self
            .observe(
                MULTI_GET_OBJECTS,
                self.client
                    .read_api()
                    .multi_get_object_with_options(object_ids, options),
            )
            .await?;

        if responses.len() != ids.len() {
            return Err(QueryError::Transport(format!(
                "{} returned {} objects for {} ids",
                MULTI_GET_OBJECTS,
                responses.len(),
                ids.len()
            )));
        }

        let mut versions = self.shared_versions.write().await;
        for (id, response) in ids.iter().zip(responses) {
            let id_hex = id.to_canonical_string(true);
            let Some(data) = response.data else {
                let reason = response
                    .error
                    .map(|e| format!("{:?}", e))
                    .unwrap_or_else(|| "no data".to_string());
                return Err(QueryError::Simulation {
                    code: None,
                    message: format!("object {} not found: {}", id_hex, reason),
                });
            };

            let version = match data.owner {
                Some(Owner::Shared {
                    initial_shared_version,
                }) => initial_shared_version.value(),
                _ => {
                    return Err(QueryError::Simulation {
                        code: None,
                        message: format!("object {} is not shared", id_hex),
                    })
                }
            };
            versions.insert(*id, version);
        }

        Ok(())
    }
}

impl Simulator for JsonRpcSimulator {
    async fn resolve_shared(&self, ids: &[AccountAddress]) -> QueryResult<Vec<SharedObjectRef>> {
        let missing: Vec<AccountAddress> = {
            let versions = self.shared_versions.read().await;
            let mut missing: Vec<AccountAddress> = ids
                .iter()
                .filter(|id| **id != CLOCK_OBJECT_ID && !versions.contains_key(*id))
                .copied()
                .collect();
            missing.sort();
            missing.dedup();
            missing
        };

        if !missing.is_empty() {
            tracing::debug!("Resolving {} shared objects", missing.len());
            self.fetch_shared_versions(&missing).await?;
        }

        let versions = self.shared_versions.read().await;
        ids.iter()
            .map(|id| {
                if *id == CLOCK_OBJECT_ID {
                    return Ok(SharedObjectRef::clock());
                }
                versions
                    .get(id)
                    .map(|version| SharedObjectRef {
                        id: *id,
                        initial_shared_version: *version,
                    })
                    .ok_or_else(|| QueryError::Simulation {
                        code: None,
                        message: format!("object {} not resolved", id.to_canonical_string(true)),
                    })
            })
            .collect()
    }

    async fn simulate(
        &self,
        tx: &ProgrammableTransaction,
        sender: AccountAddress,
    ) -> QueryResult<Vec<CallReturn>> {
        let kind = TransactionKind::ProgrammableTransaction(tx.clone());
        let results = self
            .observe(
                DEV_INSPECT,
                self.client.read_api().dev_inspect_transaction_block(
                    SuiAddress::from(sender),
                    kind,
                    None,
                    None,
                    None,
                ),
            )
            .await?;

        if let Some(error) = results.error {
            return Err(QueryError::simulation(error));
        }
        if let SuiExecutionStatus::Failure { error } = results.effects.status() {
            return Err(QueryError::simulation(error.clone()));
        }

        let returns: Vec<CallReturn> = results
            .results
            .unwrap_or_default()
            .into_iter()
            .map(|result| {
                CallReturn::new(
                    result
                        .return_values
                        .into_iter()
                        .map(|(bytes, _type)| bytes)
                        .collect(),
                )
            })
            .collect();

        tracing::debug!(
            commands = tx.commands.len(),
            results = returns.len(),
            "devInspect succeeded"
        );
        Ok(returns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ptb::{MoveTarget, TransactionBuilder};
    use prometheus::Registry;
    use serde_json::{json, Value as JsonValue};
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    const DIGEST: &str = "11111111111111111111111111111111";

    /// Replies with a fixed JSON-RPC body, echoing the request id.
    struct RpcReply(JsonValue);

    impl Respond for RpcReply {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let id = serde_json::from_slice::<JsonValue>(&request.body)
                .ok()
                .and_then(|body| body.get("id").cloned())
                .unwrap_or(JsonValue::Null);
            let mut body = self.0.clone();
            body["jsonrpc"] = json!("2.0");
            body["id"] = id;
            ResponseTemplate::new(200).set_body_json(body)
        }
    }

    fn rpc_result(result: JsonValue) -> RpcReply {
        RpcReply(json!({ "result": result }))
    }

    fn effects(status: JsonValue) -> JsonValue {
        let zero = format!("0x{}", "0".repeat(64));
        json!({
            "messageVersion": "v1",
            "status": status,
            "executedEpoch": "0",
            "gasUsed": {
                "computationCost": "0",
                "storageCost": "0",
                "storageRebate": "0",
                "nonRefundableStorageFee": "0"
            },
            "transactionDigest": DIGEST,
            "gasObject": {
                "owner": { "AddressOwner": zero },
                "reference": { "objectId": zero, "version": 0, "digest": DIGEST }
            }
        })
    }

    async fn node() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "rpc.discover" })))
            .respond_with(rpc_result(json!({
                "info": { "version": "1.64.2" },
                "methods": []
            })))
            .mount(&server)
            .await;
        server
    }

    async fn respond_to(server: &MockServer, rpc_method: &str, response: impl Respond + 'static) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": rpc_method })))
            .respond_with(response)
            .mount(server)
            .await;
    }

    async fn test_client(server: &MockServer) -> JsonRpcSimulator {
        JsonRpcSimulator::connect(server.uri(), Duration::from_secs(5))
            .await
            .unwrap()
    }

    fn pool_id() -> AccountAddress {
        AccountAddress::from_hex_literal("0xe05d").unwrap()
    }

    fn mid_price_tx() -> ProgrammableTransaction {
        let mut builder = TransactionBuilder::new();
        let pool = builder
            .shared_object(SharedObjectRef {
                id: pool_id(),
                initial_shared_version: 7,
            })
            .unwrap();
        let clock = builder.shared_object(SharedObjectRef::clock()).unwrap();
        builder
            .add_call(
                &MoveTarget::new(
                    AccountAddress::from_hex_literal("0x1").unwrap(),
                    "pool",
                    "mid_price",
                ),
                vec![],
                vec![pool, clock],
            )
            .unwrap();
        builder.finish()
    }

    #[tokio::test]
    async fn test_simulate_returns_values() {
        let server = node().await;
        respond_to(
            &server,
            DEV_INSPECT,
            rpc_result(json!({
                "effects": effects(json!({ "status": "success" })),
                "events": [],
                "results": [{
                    "returnValues": [[[100, 0, 0, 0, 0, 0, 0, 0], "u64"]]
                }]
            })),
        )
        .await;

        let client = test_client(&server).await;
        let returns = client
            .simulate(&mid_price_tx(), AccountAddress::ZERO)
            .await
            .unwrap();

        assert_eq!(
            returns,
            vec![CallReturn::new(vec![vec![100, 0, 0, 0, 0, 0, 0, 0]])]
        );
    }

    #[tokio::test]
    async fn test_simulate_abort_is_simulation_error() {
        let abort = "MoveAbort(MoveLocation { module: ModuleId { address: 2c8d, name: Identifier(\"pool\") }, function: 4, instruction: 9, function_name: Some(\"mid_price\") }, 3) in command 0";
        let server = node().await;
        respond_to(
            &server,
            DEV_INSPECT,
            rpc_result(json!({
                "effects": effects(json!({ "status": "failure", "error": abort })),
                "events": [],
                "error": abort
            })),
        )
        .await;

        let client = test_client(&server).await;
        let error = client
            .simulate(&mid_price_tx(), AccountAddress::ZERO)
            .await
            .unwrap_err();

        match error {
            QueryError::Simulation { code, message } => {
                assert_eq!(code, Some(3));
                assert_eq!(message, abort);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rpc_error_object_is_transport_error() {
        let server = node().await;
        respond_to(
            &server,
            DEV_INSPECT,
            RpcReply(json!({
                "error": { "code": -32602, "message": "Invalid params" }
            })),
        )
        .await;

        let client = test_client(&server).await;
        let error = client
            .simulate(&mid_price_tx(), AccountAddress::ZERO)
            .await
            .unwrap_err();

        assert!(matches!(error, QueryError::Transport(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_transport_error() {
        let server = node().await;
        respond_to(&server, DEV_INSPECT, ResponseTemplate::new(503)).await;

        let client = test_client(&server).await;
        let error = client
            .simulate(&mid_price_tx(), AccountAddress::ZERO)
            .await
            .unwrap_err();

        assert!(matches!(error, QueryError::Transport(_)));
    }

    #[tokio::test]
    async fn test_failed_requests_are_counted() {
        let server = node().await;
        respond_to(&server, DEV_INSPECT, ResponseTemplate::new(503)).await;

        let metrics = Arc::new(QueryMetrics::new(&Registry::new()).unwrap());
        let client = test_client(&server).await.with_metrics(Arc::clone(&metrics));
        let _ = client.simulate(&mid_price_tx(), AccountAddress::ZERO).await;
        let _ = client.simulate(&mid_price_tx(), AccountAddress::ZERO).await;

        assert_eq!(
            metrics.rpc_requests.with_label_values(&[DEV_INSPECT]).get(),
            2
        );
        assert_eq!(
            metrics.rpc_failures.with_label_values(&[DEV_INSPECT]).get(),
            2
        );
    }

    #[tokio::test]
    async fn test_resolve_shared_caches_versions() {
        let server = node().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": MULTI_GET_OBJECTS })))
            .respond_with(rpc_result(json!([{
                "data": {
                    "objectId": pool_id().to_canonical_string(true),
                    "version": "512",
                    "digest": DIGEST,
                    "owner": { "Shared": { "initial_shared_version": 389750322 } }
                }
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let ids = [pool_id(), CLOCK_OBJECT_ID];
        let first = client.resolve_shared(&ids).await.unwrap();
        let second = client.resolve_shared(&ids).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                SharedObjectRef {
                    id: pool_id(),
                    initial_shared_version: 389_750_322
                },
                SharedObjectRef::clock(),
            ]
        );
    }

    #[tokio::test]
    async fn test_clock_needs_no_lookup() {
        let server = node().await;
        let client = test_client(&server).await;

        let refs = client.resolve_shared(&[CLOCK_OBJECT_ID]).await.unwrap();
        assert_eq!(refs, vec![SharedObjectRef::clock()]);
    }

    #[tokio::test]
    async fn test_owned_object_rejected() {
        let server = node().await;
        respond_to(
            &server,
            MULTI_GET_OBJECTS,
            rpc_result(json!([{
                "data": {
                    "objectId": pool_id().to_canonical_string(true),
                    "version": "3",
                    "digest": DIGEST,
                    "owner": { "AddressOwner": AccountAddress::ONE.to_canonical_string(true) }
                }
            }])),
        )
        .await;

        let client = test_client(&server).await;
        let error = client.resolve_shared(&[pool_id()]).await.unwrap_err();
        assert!(matches!(error, QueryError::Simulation { .. }));
    }

    #[tokio::test]
    async fn test_missing_object_rejected() {
        let server = node().await;
        respond_to(
            &server,
            MULTI_GET_OBJECTS,
            rpc_result(json!([{
                "error": { "code": "notExists", "object_id": pool_id().to_canonical_string(true) }
            }])),
        )
        .await;

        let client = test_client(&server).await;
        let error = client.resolve_shared(&[pool_id()]).await.unwrap_err();
        assert!(matches!(error, QueryError::Simulation { .. }));
    }
}
