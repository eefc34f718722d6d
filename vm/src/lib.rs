//! Deterministic state-transition engine of a Cinder chain.
//!
//! The [`Controller`] owns the chain database and applies blocks of
//! signed transactions to it. Each transaction dispatches actions to
//! native handlers or to WebAssembly contracts, and every change it
//! makes is tracked in an undo frame so that failed transactions and
//! reverted blocks leave no trace in the state.

mod apply_context;
mod error;
mod execution;
mod native;
mod probestack;
mod signatures;

pub mod authorization;
pub mod config;
pub mod controller;
pub mod objects;
pub mod resource_limits;
pub mod schedule;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod trace;
pub mod wasm;

pub use {
  apply_context::END_ITERATOR,
  authorization::AuthorizationError,
  config::{ChainConfig, GenesisAccount, GenesisState},
  controller::{Controller, FinalizedBlock},
  error::{ChainError, ResourceKind, TrapKind},
  execution::{transaction_id_to_sender_id, BlockContext},
  snapshot::{BlockDelta, Snapshot},
  state::{ChainDatabase, ChainTables},
  trace::{ActionTrace, TransactionTrace},
  wasm::{ModuleCache, WasmRuntime},
};
