#![allow(dead_code)]

pub mod contracts;

use {
  cinder_primitives::{
    system::{
      ACTIVE_PERMISSION,
      CODE_PERMISSION,
      NEWACCOUNT,
      OWNER_PERMISSION,
      SETCODE,
      SYSTEM_ACCOUNT,
      UPDATEAUTH,
      NewAccount,
      SetCode,
      UpdateAuth,
    },
    Action,
    Authority,
    BlockTimestamp,
    KeyWeight,
    Name,
    PermissionLevel,
    PermissionLevelWeight,
    SignedTransaction,
    TimePoint,
    Transaction,
  },
  cinder_vm::{
    ChainConfig,
    Controller,
    FinalizedBlock,
    GenesisState,
    TransactionTrace,
    WasmRuntime,
  },
  ed25519_dalek::Keypair,
};

/// Genesis time of every test chain, well after the block epoch.
pub const GENESIS_SECS: u64 = 1_600_000_000;

pub fn keypair() -> Keypair {
  Keypair::generate(&mut rand::thread_rng())
}

pub fn active(account: Name) -> Vec<PermissionLevel> {
  vec![PermissionLevel::new(account, ACTIVE_PERMISSION)]
}

/// Action without payload, contracts in these tests read nothing.
pub fn call(account: Name, name: Name, authorization: Vec<PermissionLevel>) -> Action {
  Action {
    account,
    name,
    authorization,
    data: vec![],
  }
}

/// A single node chain driven block by block.
pub struct TestChain {
  pub controller: Controller,
  pub system: Keypair,
  nonce: u64,
}

impl TestChain {
  pub fn new() -> anyhow::Result<Self> {
    Self::with_config(ChainConfig::default())
  }

  pub fn with_config(config: ChainConfig) -> anyhow::Result<Self> {
    let system = keypair();
    let mut genesis =
      GenesisState::new(TimePoint::from_secs(GENESIS_SECS), system.public.into());
    genesis.initial_configuration = config;
    Ok(Self {
      controller: Controller::new(&genesis, WasmRuntime::default())?,
      system,
      nonce: 0,
    })
  }

  /// Starts a block `slots` block intervals after the head.
  pub fn start_block(&mut self, slots: u32) -> anyhow::Result<()> {
    let slot = self.controller.head().timestamp.slot() + slots;
    let header = self
      .controller
      .next_header(BlockTimestamp::from_slot(slot), SYSTEM_ACCOUNT)?;
    self.controller.start_block(header)?;
    Ok(())
  }

  pub fn finish_block(&mut self) -> anyhow::Result<FinalizedBlock> {
    Ok(self.controller.finalize_block()?)
  }

  pub fn now(&self) -> TimePoint {
    self
      .controller
      .pending_block_time()
      .unwrap_or_else(|| self.controller.head().timestamp.to_time_point())
  }

  /// Every transaction gets a distinct expiration, so identical
  /// actions still produce distinct transaction ids.
  pub fn transaction(&mut self, actions: Vec<Action>) -> Transaction {
    self.nonce += 1;
    let expiration = self
      .now()
      .saturating_add_secs(60)
      .saturating_add_micros(self.nonce);
    Transaction::new(expiration, actions)
  }

  pub fn sign(
    &self,
    trx: Transaction,
    signers: &[&Keypair],
  ) -> anyhow::Result<SignedTransaction> {
    let chain_id = *self.controller.chain_id();
    let mut signed = SignedTransaction::unsigned(trx);
    for key in signers {
      signed = signed.sign(key, &chain_id)?;
    }
    Ok(signed)
  }

  pub fn push(
    &mut self,
    actions: Vec<Action>,
    signers: &[&Keypair],
  ) -> anyhow::Result<TransactionTrace> {
    let trx = self.transaction(actions);
    let signed = self.sign(trx, signers)?;
    Ok(self.controller.push_transaction(&signed)?)
  }

  /// Like [`TestChain::push`] but fails unless the transaction executed.
  pub fn push_ok(
    &mut self,
    actions: Vec<Action>,
    signers: &[&Keypair],
  ) -> anyhow::Result<TransactionTrace> {
    let trace = self.push(actions, signers)?;
    anyhow::ensure!(
      trace.succeeded(),
      "transaction failed: {:?}",
      trace.error
    );
    Ok(trace)
  }

  pub fn create_account(&mut self, name: Name) -> anyhow::Result<Keypair> {
    let key = keypair();
    let auth = Authority::from_key(key.public.into());
    let action = Action::new(
      SYSTEM_ACCOUNT,
      NEWACCOUNT,
      active(SYSTEM_ACCOUNT),
      &NewAccount {
        creator: SYSTEM_ACCOUNT,
        name,
        owner: auth.clone(),
        active: auth,
      },
    )?;
    let system = Keypair::from_bytes(&self.system.to_bytes())?;
    self.push_ok(vec![action], &[&system])?;
    Ok(key)
  }

  pub fn set_code(
    &mut self,
    account: Name,
    key: &Keypair,
    wat: &str,
  ) -> anyhow::Result<TransactionTrace> {
    let action = Action::new(SYSTEM_ACCOUNT, SETCODE, active(account), &SetCode {
      account,
      vm_type: 0,
      vm_version: 0,
      code: wasm(wat)?,
    })?;
    self.push(vec![action], &[key])
  }

  pub fn deploy(
    &mut self,
    account: Name,
    key: &Keypair,
    wat: &str,
  ) -> anyhow::Result<()> {
    let trace = self.set_code(account, key, wat)?;
    anyhow::ensure!(trace.succeeded(), "setcode failed: {:?}", trace.error);
    Ok(())
  }

  /// Lets the contract of `account` act with its active permission.
  pub fn grant_code_permission(
    &mut self,
    account: Name,
    key: &Keypair,
  ) -> anyhow::Result<()> {
    let action = Action::new(SYSTEM_ACCOUNT, UPDATEAUTH, active(account), &UpdateAuth {
      account,
      permission: ACTIVE_PERMISSION,
      parent: OWNER_PERMISSION,
      auth: Authority {
        threshold: 1,
        keys: vec![KeyWeight {
          key: key.public.into(),
          weight: 1,
        }],
        accounts: vec![PermissionLevelWeight {
          permission: PermissionLevel::new(account, CODE_PERMISSION),
          weight: 1,
        }],
        waits: vec![],
      },
    })?;
    self.push_ok(vec![action], &[key])?;
    Ok(())
  }

  /// Values of every contract row stored under `code`.
  pub fn rows(&self, code: Name) -> Vec<(u64, Vec<u8>)> {
    let tables = self.controller.tables();
    tables
      .key_values
      .iter()
      .filter(|kv| {
        tables
          .table_ids
          .get(kv.t_id)
          .map(|t| t.code == code)
          .unwrap_or(false)
      })
      .map(|kv| (kv.primary_key, kv.value.clone()))
      .collect()
  }
}

pub fn wasm(wat: &str) -> anyhow::Result<Vec<u8>> {
  Ok(wasmer::wat2wasm(wat.as_bytes())?.into_owned())
}
