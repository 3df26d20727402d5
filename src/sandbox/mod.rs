//! Dry-run execution of programmable transactions
//!
//! A [`Simulator`] evaluates a transaction without committing it, charging
//! gas, or checking a signature, and hands back the raw BCS return values of
//! every command. Two backends:
//! - [`rpc::JsonRpcSimulator`]: a full node's `sui_devInspectTransactionBlock`
//! - [`vm::SandboxSimulator`]: a local Move VM fed with mainnet objects

use std::future::Future;
use std::sync::Arc;

use move_core_types::account_address::AccountAddress;

use crate::ptb::{ProgrammableTransaction, SharedObjectRef};
use crate::query::QueryResult;

pub mod rpc;
pub mod vm;

/// Return values of one command, one BCS buffer per declared slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallReturn {
    pub return_values: Vec<Vec<u8>>,
}

impl CallReturn {
    pub fn new(return_values: Vec<Vec<u8>>) -> Self {
        Self { return_values }
    }
}

pub trait Simulator: Send + Sync {
    /// Look up the initial shared version of each object, in order.
    ///
    /// Fails with a simulation error if an object is missing or not shared.
    fn resolve_shared(
        &self,
        ids: &[AccountAddress],
    ) -> impl Future<Output = QueryResult<Vec<SharedObjectRef>>> + Send;

    /// Dry-run `tx` as `sender`, returning one [`CallReturn`] per command.
    fn simulate(
        &self,
        tx: &ProgrammableTransaction,
        sender: AccountAddress,
    ) -> impl Future<Output = QueryResult<Vec<CallReturn>>> + Send;
}

impl<T: Simulator> Simulator for Arc<T> {
    fn resolve_shared(
        &self,
        ids: &[AccountAddress],
    ) -> impl Future<Output = QueryResult<Vec<SharedObjectRef>>> + Send {
        (**self).resolve_shared(ids)
    }

    fn simulate(
        &self,
        tx: &ProgrammableTransaction,
        sender: AccountAddress,
    ) -> impl Future<Output = QueryResult<Vec<CallReturn>>> + Send {
        (**self).simulate(tx, sender)
    }
}
