//! Programmable transaction composition
//!
//! A thin layer over the SDK's `ProgrammableTransactionBuilder`: shared
//! objects always go in by immutable reference, the Clock has a fixed
//! reference, and call targets carry a printable name for logs and metrics.

use std::fmt;

use move_core_types::account_address::AccountAddress;
use move_core_types::identifier::Identifier;
use move_core_types::language_storage::TypeTag;
use serde::Serialize;
use sui_sdk::types::base_types::{ObjectID, SequenceNumber};
use sui_sdk::types::programmable_transaction_builder::ProgrammableTransactionBuilder;

pub use sui_sdk::types::transaction::{
    Argument, CallArg, Command, ObjectArg, ProgrammableMoveCall, ProgrammableTransaction,
    SharedObjectMutability, TransactionKind,
};

/// Well-known shared Clock object.
pub const CLOCK_OBJECT_ID: AccountAddress = {
    let mut bytes = [0u8; AccountAddress::LENGTH];
    bytes[AccountAddress::LENGTH - 1] = 6;
    AccountAddress::new(bytes)
};
/// The Clock has been shared since genesis.
pub const CLOCK_INITIAL_SHARED_VERSION: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("failed to add transaction input: {0}")]
    Input(String),

    #[error("invalid Move identifier '{0}'")]
    Identifier(String),
}

/// A shared object together with the version it was first shared at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SharedObjectRef {
    pub id: AccountAddress,
    pub initial_shared_version: u64,
}

impl SharedObjectRef {
    pub fn clock() -> Self {
        Self {
            id: CLOCK_OBJECT_ID,
            initial_shared_version: CLOCK_INITIAL_SHARED_VERSION,
        }
    }

    fn to_object_arg(self) -> ObjectArg {
        ObjectArg::SharedObject {
            id: ObjectID::from(self.id),
            initial_shared_version: SequenceNumber::from_u64(self.initial_shared_version),
            mutability: SharedObjectMutability::Immutable,
        }
    }
}

/// `package::module::function`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveTarget {
    pub package: AccountAddress,
    pub module: &'static str,
    pub function: &'static str,
}

impl MoveTarget {
    pub fn new(package: AccountAddress, module: &'static str, function: &'static str) -> Self {
        Self {
            package,
            module,
            function,
        }
    }

    /// `module::function`, stable across package upgrades.
    pub fn label(&self) -> String {
        format!("{}::{}", self.module, self.function)
    }
}

impl fmt::Display for MoveTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}::{}",
            self.package.to_hex_literal(),
            self.module,
            self.function
        )
    }
}

/// Ids of every shared object input, in input order.
pub fn shared_object_ids(tx: &ProgrammableTransaction) -> Vec<AccountAddress> {
    tx.inputs
        .iter()
        .filter_map(|input| match input {
            CallArg::Object(ObjectArg::SharedObject { id, .. }) => Some(AccountAddress::from(*id)),
            _ => None,
        })
        .collect()
}

/// Accumulates inputs and Move calls for one programmable transaction.
///
/// Inputs are deduplicated: a repeated shared object, or a repeated pure
/// value, reuses the first input slot.
pub struct TransactionBuilder {
    inner: ProgrammableTransactionBuilder,
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self {
            inner: ProgrammableTransactionBuilder::new(),
        }
    }

    /// Add a BCS-encoded primitive argument.
    pub fn pure<T: Serialize>(&mut self, value: T) -> Result<Argument, ComposeError> {
        self.inner
            .pure(value)
            .map_err(|e| ComposeError::Input(e.to_string()))
    }

    /// Add a shared object by immutable reference.
    pub fn shared_object(&mut self, object: SharedObjectRef) -> Result<Argument, ComposeError> {
        self.inner
            .obj(object.to_object_arg())
            .map_err(|e| ComposeError::Input(e.to_string()))
    }

    /// Append a Move call and return a handle to its result.
    pub fn add_call(
        &mut self,
        target: &MoveTarget,
        type_arguments: Vec<TypeTag>,
        arguments: Vec<Argument>,
    ) -> Result<Argument, ComposeError> {
        let module = Identifier::new(target.module)
            .map_err(|_| ComposeError::Identifier(target.module.to_string()))?;
        let function = Identifier::new(target.function)
            .map_err(|_| ComposeError::Identifier(target.function.to_string()))?;

        Ok(self.inner.programmable_move_call(
            ObjectID::from(target.package),
            module,
            function,
            type_arguments,
            arguments,
        ))
    }

    pub fn finish(self) -> ProgrammableTransaction {
        self.inner.finish()
    }
}
