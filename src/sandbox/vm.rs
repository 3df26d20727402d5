//! Local Move VM simulator
//!
//! Dedicated thread that owns a SimulationEnvironment with the DeepBook
//! packages deployed. Shared objects are (re)loaded from mainnet over gRPC
//! whenever they are resolved, so each query runs against a fresh snapshot.
//! The latest DeepBook upgrade is deployed at its original address, where
//! every DeepBook type and object lives, and calls are redirected there.
//! Requests arrive over an mpsc channel and are answered on oneshot channels.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::mpsc;

use anyhow::{anyhow, Result};
use move_core_types::account_address::AccountAddress;
use move_core_types::identifier::Identifier;
use move_core_types::language_storage::TypeTag;
use serde::Serialize;
use tokio::sync::oneshot;

use sui_sandbox_core::fetcher::GrpcFetcher;
use sui_sandbox_core::ptb::{self as vm_ptb, InputValue, ObjectInput};
use sui_sandbox_core::simulation::state::FetcherConfig;
use sui_sandbox_core::simulation::SimulationEnvironment;
use sui_sandbox_core::tx_replay::derive_dynamic_field_id;
use sui_transport::grpc::{GrpcClient, GrpcOwner};

use super::{CallReturn, Simulator};
use crate::config::DeepBookConfig;
use crate::ptb::{
    Argument, CallArg, Command, ObjectArg, ProgrammableTransaction, SharedObjectMutability,
    SharedObjectRef, CLOCK_INITIAL_SHARED_VERSION, CLOCK_OBJECT_ID,
};
use crate::query::{QueryError, QueryResult};

const CLOCK_TYPE: &str = "0x2::clock::Clock";

/// Request sent to the sandbox thread
enum SandboxRequest {
    ResolveShared {
        ids: Vec<AccountAddress>,
        response_tx: oneshot::Sender<QueryResult<Vec<SharedObjectRef>>>,
    },
    Simulate {
        tx: ProgrammableTransaction,
        sender: AccountAddress,
        response_tx: oneshot::Sender<QueryResult<Vec<CallReturn>>>,
    },
}

/// Handle for communicating with the sandbox thread (Send+Sync)
#[derive(Clone)]
pub struct SandboxSimulator {
    tx: mpsc::Sender<SandboxRequest>,
}

fn thread_gone() -> QueryError {
    QueryError::Transport("Sandbox thread has shut down".into())
}

fn response_dropped() -> QueryError {
    QueryError::Transport("Sandbox thread dropped response channel".into())
}

impl Simulator for SandboxSimulator {
    async fn resolve_shared(&self, ids: &[AccountAddress]) -> QueryResult<Vec<SharedObjectRef>> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(SandboxRequest::ResolveShared {
                ids: ids.to_vec(),
                response_tx,
            })
            .map_err(|_| thread_gone())?;

        response_rx.await.map_err(|_| response_dropped())?
    }

    async fn simulate(
        &self,
        tx: &ProgrammableTransaction,
        sender: AccountAddress,
    ) -> QueryResult<Vec<CallReturn>> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(SandboxRequest::Simulate {
                tx: tx.clone(),
                sender,
                response_tx,
            })
            .map_err(|_| thread_gone())?;

        response_rx.await.map_err(|_| response_dropped())?
    }
}

/// Spawn the sandbox thread and return a handle for communication.
///
/// The thread:
/// 1. Creates a SimulationEnvironment
/// 2. Deploys the Move stdlib, Sui framework, DeepBook, and coin packages via gRPC,
///    the DeepBook upgrade at its original address
/// 3. Creates a Clock object
/// 4. Signals ready
/// 5. Loops processing resolve/simulate requests
pub fn spawn_sandbox_thread(
    config: &DeepBookConfig,
) -> (SandboxSimulator, oneshot::Receiver<Result<()>>) {
    let (tx, rx) = mpsc::channel::<SandboxRequest>();
    let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
    let packages = packages_to_deploy(config);
    let aliases = package_aliases(config);

    std::thread::spawn(move || {
        sandbox_thread_main(rx, ready_tx, packages, aliases);
    });

    (SandboxSimulator { tx }, ready_rx)
}

/// A package fetched from mainnet and the address its modules are deployed at.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PackageDeployment {
    fetch_id: String,
    deploy_at: String,
}

impl PackageDeployment {
    fn at_own_address(package: &str) -> Self {
        Self {
            fetch_id: package.to_string(),
            deploy_at: package.to_string(),
        }
    }

    fn is_alias(&self) -> bool {
        self.fetch_id != self.deploy_at
    }
}

/// Packages that must exist in the VM before any DeepBook call can run.
fn packages_to_deploy(config: &DeepBookConfig) -> Vec<PackageDeployment> {
    let mut packages = vec![
        PackageDeployment::at_own_address("0x1"),
        PackageDeployment::at_own_address("0x2"),
        PackageDeployment {
            fetch_id: config.package_id.to_hex_literal(),
            deploy_at: config.original_package_id.to_hex_literal(),
        },
    ];
    for coin in config.coins.values() {
        if let Some(package) = coin.type_name.split("::").next() {
            if !packages.iter().any(|p| p.fetch_id == package) {
                packages.push(PackageDeployment::at_own_address(package));
            }
        }
    }
    packages
}

/// Call targets to rewrite: the latest DeepBook package resolves to the
/// original address its modules were deployed at.
fn package_aliases(config: &DeepBookConfig) -> HashMap<AccountAddress, AccountAddress> {
    let mut aliases = HashMap::new();
    if config.package_id != config.original_package_id {
        aliases.insert(config.package_id, config.original_package_id);
    }
    aliases
}

fn sandbox_thread_main(
    rx: mpsc::Receiver<SandboxRequest>,
    ready_tx: oneshot::Sender<Result<()>>,
    packages: Vec<PackageDeployment>,
    aliases: HashMap<AccountAddress, AccountAddress>,
) {
    match setup_sandbox_env(&packages, aliases) {
        Ok(mut state) => {
            let _ = ready_tx.send(Ok(()));
            tracing::info!("Sandbox thread ready, processing simulation requests");

            while let Ok(req) = rx.recv() {
                match req {
                    SandboxRequest::ResolveShared { ids, response_tx } => {
                        let result = ids
                            .iter()
                            .map(|id| refresh_shared_object(&mut state, *id))
                            .collect();
                        let _ = response_tx.send(result);
                    }
                    SandboxRequest::Simulate {
                        tx,
                        sender,
                        response_tx,
                    } => {
                        let result = execute_view_ptb(&mut state, &tx, sender);
                        let _ = response_tx.send(result);
                    }
                }
            }

            tracing::info!("Sandbox thread shutting down (channel closed)");
        }
        Err(e) => {
            tracing::error!("Sandbox thread setup failed: {}", e);
            let _ = ready_tx.send(Err(e));
        }
    }
}

/// Internal state for the sandbox environment
struct SandboxState {
    env: SimulationEnvironment,
    rt: tokio::runtime::Runtime,
    grpc: GrpcClient,
    object_types: HashMap<AccountAddress, Option<TypeTag>>,
    package_aliases: HashMap<AccountAddress, AccountAddress>,
}

fn setup_sandbox_env(
    packages: &[PackageDeployment],
    package_aliases: HashMap<AccountAddress, AccountAddress>,
) -> Result<SandboxState> {
    tracing::info!("Sandbox thread: creating SimulationEnvironment...");
    let mut env = SimulationEnvironment::new()?;

    // Create a tokio runtime for async gRPC calls
    let rt = tokio::runtime::Runtime::new()?;
    let grpc = rt.block_on(async { GrpcClient::mainnet().await })?;

    // Missing packages and dynamic-field children are fetched on demand
    env.set_fetcher(Box::new(GrpcFetcher::mainnet()));
    env.set_fetcher_config(FetcherConfig::mainnet());

    for package in packages {
        let object = rt
            .block_on(grpc.get_object(&package.fetch_id))?
            .ok_or_else(|| anyhow!("Package not found via gRPC: {}", package.fetch_id))?;
        let modules = object
            .package_modules
            .ok_or_else(|| anyhow!("Object {} is not a package", package.fetch_id))?;
        env.deploy_package_at_address(&package.deploy_at, modules)?;
        if package.is_alias() {
            tracing::info!(
                "Sandbox: deployed package {} at {}",
                package.fetch_id,
                package.deploy_at
            );
        } else {
            tracing::info!("Sandbox: deployed package {}", package.fetch_id);
        }
    }

    create_clock_object(&mut env, now_unix_ms())?;

    Ok(SandboxState {
        env,
        rt,
        grpc,
        object_types: HashMap::new(),
        package_aliases,
    })
}

fn sandbox_error(context: impl std::fmt::Display, e: impl std::fmt::Display) -> QueryError {
    QueryError::Simulation {
        code: None,
        message: format!("{}: {}", context, e),
    }
}

/// Load the latest version of a shared object into the VM.
fn refresh_shared_object(
    state: &mut SandboxState,
    id: AccountAddress,
) -> QueryResult<SharedObjectRef> {
    if id == CLOCK_OBJECT_ID {
        return Ok(SharedObjectRef::clock());
    }

    let id_hex = id.to_hex_literal();
    let object = state
        .rt
        .block_on(state.grpc.get_object(&id_hex))
        .map_err(|e| QueryError::Transport(format!("gRPC get_object {}: {}", id_hex, e)))?
        .ok_or_else(|| QueryError::Simulation {
            code: None,
            message: format!("object {} not found", id_hex),
        })?;

    let initial_shared_version = match &object.owner {
        GrpcOwner::Shared { initial_version } => *initial_version,
        _ => {
            return Err(QueryError::Simulation {
                code: None,
                message: format!("object {} is not shared", id_hex),
            })
        }
    };
    let bytes = object
        .bcs
        .ok_or_else(|| sandbox_error(&id_hex, "missing BCS payload"))?;

    if state.env.get_object(&id).is_some() {
        state
            .env
            .set_object_bytes(id, bytes.clone())
            .map_err(|e| sandbox_error(format!("failed to refresh {}", id_hex), e))?;
    } else {
        state
            .env
            .load_object_from_data(
                &id_hex,
                bytes.clone(),
                object.type_string.as_deref(),
                true,
                false,
                object.version,
            )
            .map_err(|e| sandbox_error(format!("failed to load {}", id_hex), e))?;
    }

    let type_string = object.type_string.unwrap_or_default();
    if is_versioned_wrapper(&type_string) {
        if let Some((inner_id, inner_version)) = versioned_inner(&bytes) {
            load_versioned_inner(state, inner_id, inner_version)?;
        }
    }
    state
        .object_types
        .insert(id, SimulationEnvironment::parse_type_string(&type_string));

    tracing::debug!(
        "Sandbox: loaded {} (version={}, initial_shared_version={})",
        id_hex,
        object.version,
        initial_shared_version
    );

    Ok(SharedObjectRef {
        id,
        initial_shared_version,
    })
}

/// Pools and the registry keep their state behind `Versioned`, a dynamic
/// field keyed by the current version.
fn is_versioned_wrapper(type_string: &str) -> bool {
    type_string.contains("::pool::Pool<") || type_string.ends_with("::registry::Registry")
}

/// `id (32) + inner: Versioned { id (32), version (8) }`
fn versioned_inner(bytes: &[u8]) -> Option<(AccountAddress, u64)> {
    if bytes.len() < 72 {
        return None;
    }
    let mut inner_id = [0u8; AccountAddress::LENGTH];
    inner_id.copy_from_slice(&bytes[32..64]);
    let mut version = [0u8; 8];
    version.copy_from_slice(&bytes[64..72]);
    Some((AccountAddress::new(inner_id), u64::from_le_bytes(version)))
}

fn load_versioned_inner(
    state: &mut SandboxState,
    inner_id: AccountAddress,
    inner_version: u64,
) -> QueryResult<()> {
    let key_bytes = bcs::to_bytes(&inner_version)
        .map_err(|e| sandbox_error("failed to encode Versioned key", e))?;
    let child_id = derive_dynamic_field_id(inner_id, &TypeTag::U64, &key_bytes)
        .map_err(|e| sandbox_error("failed to derive Versioned field id", e))?;
    let child_hex = child_id.to_hex_literal();

    let child = state
        .rt
        .block_on(state.grpc.get_object(&child_hex))
        .map_err(|e| QueryError::Transport(format!("gRPC get_object {}: {}", child_hex, e)))?
        .ok_or_else(|| sandbox_error(&child_hex, "Versioned inner object not found"))?;

    let type_string = child
        .type_string
        .as_deref()
        .ok_or_else(|| sandbox_error(&child_hex, "missing type string"))?;
    let type_tag = SimulationEnvironment::parse_type_string(type_string)
        .ok_or_else(|| sandbox_error(&child_hex, format!("unparseable type {}", type_string)))?;
    let bytes = child
        .bcs
        .ok_or_else(|| sandbox_error(&child_hex, "missing BCS payload"))?;

    state
        .env
        .set_dynamic_field(inner_id, child_id, type_tag, bytes);
    Ok(())
}

fn execute_view_ptb(
    state: &mut SandboxState,
    tx: &ProgrammableTransaction,
    sender: AccountAddress,
) -> QueryResult<Vec<CallReturn>> {
    let now_ms = now_unix_ms();
    let inputs = tx
        .inputs
        .iter()
        .map(|input| to_vm_input(state, input, now_ms))
        .collect::<QueryResult<Vec<_>>>()?;
    let commands = tx
        .commands
        .iter()
        .map(|command| to_vm_command(command, &state.package_aliases))
        .collect::<QueryResult<Vec<_>>>()?;

    state.env.set_sender(sender);
    let result = state.env.execute_ptb(inputs, commands);

    if !result.success {
        return Err(QueryError::simulation(
            result
                .raw_error
                .unwrap_or_else(|| "Unknown error".to_string()),
        ));
    }

    let return_values = result
        .effects
        .as_ref()
        .map(|effects| effects.return_values.clone())
        .unwrap_or_default();

    Ok(return_values.into_iter().map(CallReturn::new).collect())
}

fn to_vm_input(state: &SandboxState, input: &CallArg, now_ms: u64) -> QueryResult<InputValue> {
    match input {
        CallArg::Pure(bytes) => Ok(InputValue::Pure(bytes.clone())),
        CallArg::Object(ObjectArg::SharedObject { id, mutability, .. }) => {
            let id = AccountAddress::from(*id);
            if id == CLOCK_OBJECT_ID {
                return Ok(InputValue::Object(build_clock_input(now_ms)?));
            }

            let object = state.env.get_object(&id).ok_or_else(|| {
                sandbox_error(id.to_hex_literal(), "shared object was not resolved")
            })?;
            let type_tag = state.object_types.get(&id).cloned().flatten();

            Ok(InputValue::Object(ObjectInput::Shared {
                id,
                bytes: object.bcs_bytes.clone(),
                type_tag,
                version: Some(object.version),
                mutable: matches!(mutability, SharedObjectMutability::Mutable),
            }))
        }
        CallArg::Object(_) => Err(QueryError::InvalidInput(
            "only shared objects can be used in a view call".into(),
        )),
        _ => Err(QueryError::InvalidInput(
            "unsupported input kind for a view call".into(),
        )),
    }
}

fn to_vm_argument(arg: &Argument) -> QueryResult<vm_ptb::Argument> {
    match arg {
        Argument::Input(idx) => Ok(vm_ptb::Argument::Input(*idx)),
        Argument::Result(idx) => Ok(vm_ptb::Argument::Result(*idx)),
        Argument::NestedResult(cmd, idx) => Ok(vm_ptb::Argument::NestedResult(*cmd, *idx)),
        Argument::GasCoin => Err(QueryError::InvalidInput(
            "gas coin is not available in a dry-run".into(),
        )),
    }
}

/// Type arguments share the `TypeTag` BCS layout.
fn to_type_tag<T: Serialize>(type_argument: &T) -> QueryResult<TypeTag> {
    bcs::to_bytes(type_argument)
        .and_then(|bytes| bcs::from_bytes(&bytes))
        .map_err(|e| QueryError::InvalidInput(format!("invalid type argument: {}", e)))
}

fn to_identifier(name: impl ToString) -> QueryResult<Identifier> {
    let name = name.to_string();
    Identifier::new(name.as_str())
        .map_err(|_| QueryError::InvalidInput(format!("invalid Move identifier '{}'", name)))
}

fn to_vm_command(
    command: &Command,
    aliases: &HashMap<AccountAddress, AccountAddress>,
) -> QueryResult<vm_ptb::Command> {
    match command {
        Command::MoveCall(call) => {
            let package = AccountAddress::from(call.package);
            Ok(vm_ptb::Command::MoveCall {
                package: aliases.get(&package).copied().unwrap_or(package),
                module: to_identifier(&call.module)?,
                function: to_identifier(&call.function)?,
                type_args: call
                    .type_arguments
                    .iter()
                    .map(to_type_tag)
                    .collect::<QueryResult<Vec<_>>>()?,
                args: call
                    .arguments
                    .iter()
                    .map(to_vm_argument)
                    .collect::<QueryResult<Vec<_>>>()?,
            })
        }
        _ => Err(QueryError::InvalidInput(
            "view calls only contain Move calls".into(),
        )),
    }
}

/// Clock input carrying `timestamp_ms`.
fn build_clock_input(timestamp_ms: u64) -> QueryResult<ObjectInput> {
    Ok(ObjectInput::Shared {
        id: CLOCK_OBJECT_ID,
        bytes: clock_bytes(timestamp_ms),
        type_tag: Some(
            TypeTag::from_str(CLOCK_TYPE).map_err(|e| sandbox_error("invalid Clock type", e))?,
        ),
        version: Some(CLOCK_INITIAL_SHARED_VERSION),
        mutable: false,
    })
}

/// Clock struct in BCS: UID (32 bytes) + timestamp_ms (u64)
fn clock_bytes(timestamp_ms: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(AccountAddress::LENGTH + 8);
    bytes.extend_from_slice(CLOCK_OBJECT_ID.as_ref());
    bytes.extend_from_slice(&timestamp_ms.to_le_bytes());
    bytes
}

fn create_clock_object(env: &mut SimulationEnvironment, timestamp_ms: u64) -> Result<()> {
    env.load_object_from_data(
        &CLOCK_OBJECT_ID.to_hex_literal(),
        clock_bytes(timestamp_ms),
        Some(CLOCK_TYPE),
        true,  // shared
        false, // not immutable
        CLOCK_INITIAL_SHARED_VERSION,
    )?;

    tracing::info!("Sandbox: created Clock at 0x6");
    Ok(())
}

fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ptb::{MoveTarget, TransactionBuilder};

    #[test]
    fn test_clock_bytes_layout() {
        let bytes = clock_bytes(1_770_000_000_000);
        assert_eq!(bytes.len(), 40);
        assert_eq!(bytes[31], 6);
        assert_eq!(
            u64::from_le_bytes(bytes[32..40].try_into().unwrap()),
            1_770_000_000_000
        );
    }

    #[test]
    fn test_versioned_inner() {
        let mut bytes = vec![0xaa; 32];
        bytes.extend_from_slice(&[0xbb; 32]);
        bytes.extend_from_slice(&3u64.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 16]);

        let (inner_id, version) = versioned_inner(&bytes).unwrap();
        assert_eq!(inner_id, AccountAddress::new([0xbb; 32]));
        assert_eq!(version, 3);
        assert!(versioned_inner(&bytes[..71]).is_none());
    }

    #[test]
    fn test_versioned_wrapper_types() {
        assert!(is_versioned_wrapper(
            "0x2c8d::pool::Pool<0x2::sui::SUI, 0xdba3::usdc::USDC>"
        ));
        assert!(is_versioned_wrapper("0x2c8d::registry::Registry"));
        assert!(!is_versioned_wrapper("0x2c8d::balance_manager::BalanceManager"));
    }

    #[test]
    fn test_packages_to_deploy() {
        let config = DeepBookConfig::mainnet();
        let packages = packages_to_deploy(&config);
        assert_eq!(
            &packages[..2],
            &[
                PackageDeployment::at_own_address("0x1"),
                PackageDeployment::at_own_address("0x2")
            ]
        );
        assert!(packages.contains(&PackageDeployment {
            fetch_id: config.package_id.to_hex_literal(),
            deploy_at: config.original_package_id.to_hex_literal(),
        }));
        assert_eq!(packages.iter().filter(|p| p.is_alias()).count(), 1);
        assert!(packages.iter().any(|p| p
            .fetch_id
            .starts_with("0xdba34672e30cb065b1f93e3ab55318768fd6fef66c15942c9f7cb846e2f900e7")));
        // SUI's package is the framework itself
        assert_eq!(packages.iter().filter(|p| p.fetch_id == "0x2").count(), 1);
    }

    fn mid_price_call(package: AccountAddress) -> Command {
        let mut builder = TransactionBuilder::new();
        let clock = builder.shared_object(SharedObjectRef::clock()).unwrap();
        builder
            .add_call(
                &MoveTarget::new(package, "pool", "mid_price"),
                vec![
                    TypeTag::from_str("0x2::sui::SUI").unwrap(),
                    TypeTag::from_str("0x2::coin::Coin<0x2::sui::SUI>").unwrap(),
                ],
                vec![clock],
            )
            .unwrap();
        builder.finish().commands.remove(0)
    }

    #[test]
    fn test_latest_package_calls_run_at_original_address() {
        let config = DeepBookConfig::mainnet();
        let aliases = package_aliases(&config);

        let vm_ptb::Command::MoveCall {
            package,
            module,
            function,
            type_args,
            args,
        } = to_vm_command(&mid_price_call(config.package_id), &aliases).unwrap()
        else {
            panic!("expected a Move call");
        };
        assert_eq!(package, config.original_package_id);
        assert_eq!(module.as_str(), "pool");
        assert_eq!(function.as_str(), "mid_price");
        assert_eq!(
            type_args,
            vec![
                TypeTag::from_str("0x2::sui::SUI").unwrap(),
                TypeTag::from_str("0x2::coin::Coin<0x2::sui::SUI>").unwrap(),
            ]
        );
        assert!(matches!(args.as_slice(), [vm_ptb::Argument::Input(0)]));
    }

    #[test]
    fn test_other_packages_keep_their_address() {
        let aliases = package_aliases(&DeepBookConfig::mainnet());
        let framework = AccountAddress::from_hex_literal("0x2").unwrap();

        let vm_ptb::Command::MoveCall { package, .. } =
            to_vm_command(&mid_price_call(framework), &aliases).unwrap()
        else {
            panic!("expected a Move call");
        };
        assert_eq!(package, framework);
    }

    #[test]
    fn test_unupgraded_deployment_has_no_alias() {
        let mut config = DeepBookConfig::mainnet();
        config.package_id = config.original_package_id;
        assert!(package_aliases(&config).is_empty());
        assert!(!packages_to_deploy(&config).iter().any(|p| p.is_alias()));
    }

    #[test]
    fn test_gas_coin_rejected() {
        assert!(matches!(
            to_vm_argument(&Argument::GasCoin),
            Err(QueryError::InvalidInput(_))
        ));
    }
}
