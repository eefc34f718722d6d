//! Lifecycle of one transaction: validation, budgeting, action
//! dispatch and billing.

use {
  crate::{
    apply_context::ApplyContext,
    authorization::{check_authorization, get_permission, AuthorizationRequest},
    config::ChainConfig,
    error::ResourceKind,
    objects::{GeneratedTransactionObject, TransactionObject},
    resource_limits,
    state::ChainTables,
    trace::{ActionTrace, TransactionTrace},
    wasm::WasmRuntime,
    ChainError,
  },
  cinder_primitives::{
    Action,
    Digest,
    Name,
    PublicKey,
    TimePoint,
    Transaction,
    TransactionStatus,
  },
  std::collections::BTreeSet,
  tracing::debug,
};

/// Net usage billed for retiring a delayed transaction.
pub const TRANSACTION_ID_NET_USAGE: u64 = 32;

/// Which limit capped a budget, decides the error raised when the
/// budget runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingLimit {
  Transaction,
  Account,
  Block,
}

impl BindingLimit {
  fn exhausted(self, kind: ResourceKind) -> ChainError {
    match (self, kind) {
      (BindingLimit::Block, kind) => ChainError::BlockResourceExhausted(kind),
      (BindingLimit::Account, kind) => {
        ChainError::TransactionResourceExhausted(kind)
      }
      (BindingLimit::Transaction, ResourceKind::Cpu) => {
        ChainError::DeadlineExceeded
      }
      (BindingLimit::Transaction, kind) => {
        ChainError::TransactionResourceExhausted(kind)
      }
    }
  }
}

/// Block level inputs shared by every transaction of a block.
#[derive(Debug, Clone, Copy)]
pub struct BlockContext {
  pub block_num: u64,
  pub time: TimePoint,

  /// Block slot, the ordinal of resource accumulators.
  pub slot: u32,
}

/// Maps a delayed transaction id onto the deferred queue key space.
pub fn transaction_id_to_sender_id(id: &Digest) -> u128 {
  let mut bytes = [0u8; 16];
  bytes.copy_from_slice(&id.as_bytes()[..16]);
  u128::from_le_bytes(bytes)
}

pub struct TransactionContext<'a> {
  pub(crate) tables: &'a mut ChainTables,
  pub(crate) runtime: &'a WasmRuntime,
  pub(crate) config: ChainConfig,
  pub(crate) block: BlockContext,
  pub(crate) trx: Transaction,
  pub(crate) id: Digest,
  pub(crate) published: TimePoint,
  pub(crate) trace: TransactionTrace,

  bill_to_accounts: BTreeSet<Name>,
  validate_ram_usage: BTreeSet<Name>,

  cpu_limit_us: u64,
  cpu_binding: BindingLimit,
  net_limit: u64,
  net_binding: BindingLimit,

  net_usage: u64,
  instructions: u64,
  actions_dispatched: u64,
  executed: bool,
}

impl<'a> TransactionContext<'a> {
  pub fn new(
    tables: &'a mut ChainTables,
    runtime: &'a WasmRuntime,
    block: BlockContext,
    trx: Transaction,
    id: Digest,
    scheduled: bool,
  ) -> Result<Self, ChainError> {
    let config = tables.config()?.clone();
    Ok(Self {
      tables,
      runtime,
      config,
      block,
      trace: TransactionTrace::new(id, block.block_num, scheduled),
      published: block.time,
      trx,
      id,
      bill_to_accounts: BTreeSet::new(),
      validate_ram_usage: BTreeSet::new(),
      cpu_limit_us: 0,
      cpu_binding: BindingLimit::Transaction,
      net_limit: 0,
      net_binding: BindingLimit::Transaction,
      net_usage: 0,
      instructions: 0,
      actions_dispatched: 0,
      executed: false,
    })
  }

  /// Validates a transaction received from outside the chain and
  /// records it for replay protection.
  pub fn init_for_input(
    &mut self,
    packed_size: u64,
    keys: &BTreeSet<PublicKey>,
  ) -> Result<(), ChainError> {
    self.validate_expiration()?;
    self.validate_referenced_accounts()?;

    if self.trx.delay_sec > self.config.max_transaction_delay {
      return Err(ChainError::transaction(format!(
        "delay of {}s exceeds the maximum of {}s",
        self.trx.delay_sec, self.config.max_transaction_delay
      )));
    }

    check_authorization(self.tables, AuthorizationRequest {
      actions: &self.trx.actions,
      provided_keys: keys,
      provided_permissions: &BTreeSet::new(),
      provided_delay_sec: self.trx.delay_sec as u64,
      allow_unused_keys: false,
    })?;

    let mut initial_net =
      self.config.base_per_transaction_net_usage as u64 + packed_size;
    if self.trx.delay_sec > 0 {
      initial_net += self.config.base_per_transaction_net_usage as u64
        + TRANSACTION_ID_NET_USAGE;
    }

    self.init(initial_net)?;
    self.record_transaction()
  }

  /// Prepares the execution of a transaction taken from the deferred
  /// queue. Its authorization was checked when it was scheduled.
  pub fn init_for_deferred(
    &mut self,
    published: TimePoint,
  ) -> Result<(), ChainError> {
    self.published = published;
    self.init(0)
  }

  fn validate_expiration(&self) -> Result<(), ChainError> {
    let now = self.block.time;
    if self.trx.expiration < now {
      return Err(ChainError::transaction(format!(
        "transaction expired at {}, block time is {now}",
        self.trx.expiration
      )));
    }
    let lifetime = now.saturating_add_secs(self.config.max_transaction_lifetime as u64);
    if self.trx.expiration > lifetime {
      return Err(ChainError::transaction(format!(
        "transaction expiration {} is too far in the future, at most {lifetime}",
        self.trx.expiration
      )));
    }
    Ok(())
  }

  fn validate_referenced_accounts(&self) -> Result<(), ChainError> {
    if self.trx.actions.is_empty() {
      return Err(ChainError::transaction("transaction has no actions"));
    }
    for action in &self.trx.actions {
      if !self.tables.is_account(action.account) {
        return Err(ChainError::transaction(format!(
          "action's code account '{}' does not exist",
          action.account
        )));
      }
      if action.authorization.is_empty() {
        return Err(ChainError::transaction(format!(
          "action {}::{} declares no authorization",
          action.account, action.name
        )));
      }
      for level in &action.authorization {
        get_permission(self.tables, level)?;
      }
    }
    Ok(())
  }

  fn record_transaction(&mut self) -> Result<(), ChainError> {
    let existing = self
      .tables
      .transactions
      .find(TransactionObject::BY_TRX_ID, &TransactionObject::key(&self.id));
    if existing.is_some() {
      return Err(ChainError::transaction(format!(
        "duplicate transaction {}",
        self.id
      )));
    }
    let (trx_id, expiration) = (self.id, self.trx.expiration);
    self.tables.transactions.create(|id| TransactionObject {
      id,
      trx_id,
      expiration,
    })?;
    Ok(())
  }

  /// Computes the cpu and net budgets from the chain configuration, the
  /// transaction header, the remaining block capacity and the shares
  /// of every billed account.
  fn init(&mut self, initial_net_usage: u64) -> Result<(), ChainError> {
    let config = &self.config;

    self.net_limit = resource_limits::get_block_net_limit(self.tables)?;
    self.net_binding = BindingLimit::Block;
    if config.max_transaction_net_usage as u64 <= self.net_limit {
      self.net_limit = config.max_transaction_net_usage as u64;
      self.net_binding = BindingLimit::Transaction;
    }
    let header_net = self.trx.max_net_usage_words as u64 * 8;
    if header_net > 0 && header_net <= self.net_limit {
      self.net_limit = header_net;
      self.net_binding = BindingLimit::Transaction;
    }

    self.cpu_limit_us = resource_limits::get_block_cpu_limit(self.tables)?;
    self.cpu_binding = BindingLimit::Block;
    if config.max_transaction_cpu_usage as u64 <= self.cpu_limit_us {
      self.cpu_limit_us = config.max_transaction_cpu_usage as u64;
      self.cpu_binding = BindingLimit::Transaction;
    }
    let header_cpu = self.trx.max_cpu_usage_ms as u64 * 1000;
    if header_cpu > 0 && header_cpu <= self.cpu_limit_us {
      self.cpu_limit_us = header_cpu;
      self.cpu_binding = BindingLimit::Transaction;
    }

    self.bill_to_accounts = self
      .trx
      .actions
      .iter()
      .flat_map(|a| a.authorization.iter().map(|l| l.actor))
      .collect();

    let (account_net, account_cpu) = self.max_bandwidth_billed_accounts_can_pay()?;
    if let Some(net) = account_net {
      if net < self.net_limit {
        self.net_limit = net;
        self.net_binding = BindingLimit::Account;
      }
    }
    if let Some(cpu) = account_cpu {
      if cpu < self.cpu_limit_us {
        self.cpu_limit_us = cpu;
        self.cpu_binding = BindingLimit::Account;
      }
    }

    if self.cpu_limit_us < self.config.min_transaction_cpu_usage as u64 {
      debug!(
        "transaction {} cannot afford the minimum cpu usage, limit is {}us",
        self.id, self.cpu_limit_us
      );
      return Err(self.cpu_binding.exhausted(ResourceKind::Cpu));
    }

    self.add_net_usage(initial_net_usage)?;
    self.checktime()
  }

  /// Smallest amount of net and cpu any billed account can still pay,
  /// `None` when every billed account is unlimited.
  fn max_bandwidth_billed_accounts_can_pay(
    &self,
  ) -> Result<(Option<u64>, Option<u64>), ChainError> {
    let mut net = None;
    let mut cpu = None;
    for account in &self.bill_to_accounts {
      let net_limit = resource_limits::get_account_net_limit(
        self.tables,
        *account,
        self.block.slot,
      )?;
      if !net_limit.is_unlimited() {
        let available = net_limit.available.max(0) as u64;
        net = Some(net.map_or(available, |n: u64| n.min(available)));
      }
      let cpu_limit = resource_limits::get_account_cpu_limit(
        self.tables,
        *account,
        self.block.slot,
      )?;
      if !cpu_limit.is_unlimited() {
        let available = cpu_limit.available.max(0) as u64;
        cpu = Some(cpu.map_or(available, |c: u64| c.min(available)));
      }
    }
    Ok((net, cpu))
  }

  pub(crate) fn add_net_usage(&mut self, usage: u64) -> Result<(), ChainError> {
    self.net_usage = self.net_usage.saturating_add(usage);
    if self.net_usage > self.net_limit {
      debug!(
        "transaction {} net usage {} above limit {}",
        self.id, self.net_usage, self.net_limit
      );
      return Err(self.net_binding.exhausted(ResourceKind::Net));
    }
    Ok(())
  }

  /// Objective cpu usage so far.
  pub fn cpu_usage_us(&self) -> u64 {
    let per_us = self.config.instructions_per_us.max(1);
    self.config.base_per_transaction_cpu_usage as u64
      + self.config.base_per_action_cpu_usage as u64 * self.actions_dispatched
      + (self.instructions + per_us - 1) / per_us
  }

  /// Instructions a contract may still execute before the cpu budget
  /// runs out.
  pub(crate) fn remaining_instructions(&self) -> u64 {
    let per_us = self.config.instructions_per_us.max(1);
    let fixed = self.config.base_per_transaction_cpu_usage as u64
      + self.config.base_per_action_cpu_usage as u64 * self.actions_dispatched;
    self
      .cpu_limit_us
      .saturating_sub(fixed)
      .saturating_mul(per_us)
      .saturating_sub(self.instructions)
  }

  pub(crate) fn checktime(&self) -> Result<(), ChainError> {
    if self.cpu_usage_us() > self.cpu_limit_us {
      return Err(self.cpu_binding.exhausted(ResourceKind::Cpu));
    }
    Ok(())
  }

  pub(crate) fn add_instructions(&mut self, instructions: u64) {
    self.instructions = self.instructions.saturating_add(instructions);
  }

  pub(crate) fn count_action(&mut self) -> Result<(), ChainError> {
    self.actions_dispatched += 1;
    self.checktime()
  }

  /// Error raised by a contract that ran out of instructions, named
  /// after the limit that bound the budget.
  pub(crate) fn deadline_error(&self) -> ChainError {
    self.cpu_binding.exhausted(ResourceKind::Cpu)
  }

  pub(crate) fn add_ram_usage(
    &mut self,
    account: Name,
    delta: i64,
  ) -> Result<(), ChainError> {
    resource_limits::add_pending_ram_usage(self.tables, account, delta)?;
    if delta > 0 {
      self.validate_ram_usage.insert(account);
    }
    Ok(())
  }

  pub(crate) fn check_ram_later(&mut self, account: Name) {
    self.validate_ram_usage.insert(account);
  }

  /// Seconds between publication of the transaction and now, the
  /// delay inline actions and deferred transactions inherit.
  pub(crate) fn elapsed_delay_sec(&self) -> u64 {
    self
      .block
      .time
      .as_secs()
      .saturating_sub(self.published.as_secs())
  }

  pub(crate) fn schedule_action(
    &mut self,
    act: Action,
    receiver: Name,
    creator_action_ordinal: u32,
  ) -> u32 {
    let action_ordinal = self.trace.action_traces.len() as u32 + 1;
    self.trace.action_traces.push(ActionTrace {
      action_ordinal,
      creator_action_ordinal,
      receiver,
      act,
      receipt: None,
      console: String::new(),
      error: None,
    });
    action_ordinal
  }

  pub(crate) fn action_trace(&self, ordinal: u32) -> Result<&ActionTrace, ChainError> {
    self
      .trace
      .action_traces
      .get(ordinal as usize - 1)
      .ok_or_else(|| ChainError::assertion(format!("no action with ordinal {ordinal}")))
  }

  pub(crate) fn action_trace_mut(
    &mut self,
    ordinal: u32,
  ) -> Result<&mut ActionTrace, ChainError> {
    self
      .trace
      .action_traces
      .get_mut(ordinal as usize - 1)
      .ok_or_else(|| ChainError::assertion(format!("no action with ordinal {ordinal}")))
  }

  pub(crate) fn execute_action(
    &mut self,
    action_ordinal: u32,
    recurse_depth: u16,
  ) -> Result<(), ChainError> {
    ApplyContext::new(self, action_ordinal, recurse_depth)?.exec()
  }

  /// Runs every action of the transaction, or stores an input
  /// transaction in the deferred queue when it asks for a delay.
  pub fn exec(&mut self) -> Result<(), ChainError> {
    self.executed = true;
    if self.trx.delay_sec > 0 && !self.trace.scheduled {
      self.schedule_transaction()?;
      self.trace.status = TransactionStatus::Delayed;
      return Ok(());
    }

    let ordinals: Vec<u32> = self
      .trx
      .actions
      .clone()
      .into_iter()
      .map(|act| {
        let receiver = act.account;
        self.schedule_action(act, receiver, 0)
      })
      .collect();

    for ordinal in ordinals {
      self.execute_action(ordinal, 0)?;
    }
    self.trace.status = TransactionStatus::Executed;
    Ok(())
  }

  fn schedule_transaction(&mut self) -> Result<(), ChainError> {
    let payer = self.trx.actions[0].authorization[0].actor;
    let packed_trx = self.trx.packed()?;
    let published = self.block.time;
    let delay_until = published.saturating_add_secs(self.trx.delay_sec as u64);
    let expiration = delay_until
      .saturating_add_secs(self.config.deferred_trx_expiration_window as u64);
    let (trx_id, sender_id) = (self.id, transaction_id_to_sender_id(&self.id));

    let size = self
      .tables
      .generated_transactions
      .create(|id| GeneratedTransactionObject {
        id,
        trx_id,
        sender: Name::default(),
        sender_id,
        payer,
        delay_until,
        expiration,
        published,
        packed_trx,
      })?
      .billable_size();
    self.add_ram_usage(payer, size as i64)
  }

  /// Verifies ram quotas, bills cpu and net to every billed account and
  /// fills in the usage of the trace.
  pub fn finalize(&mut self) -> Result<(), ChainError> {
    for account in std::mem::take(&mut self.validate_ram_usage) {
      resource_limits::verify_account_ram_usage(self.tables, account)?;
    }

    let (account_net, account_cpu) = self.max_bandwidth_billed_accounts_can_pay()?;
    if let Some(net) = account_net {
      if net <= self.net_limit {
        self.net_limit = net;
        self.net_binding = BindingLimit::Account;
      }
    }
    if let Some(cpu) = account_cpu {
      if cpu <= self.cpu_limit_us {
        self.cpu_limit_us = cpu;
        self.cpu_binding = BindingLimit::Account;
      }
    }

    self.net_usage = (self.net_usage + 7) / 8 * 8;
    self.add_net_usage(0)?;

    let billed_cpu = self.billed_cpu_us();
    if billed_cpu > self.cpu_limit_us {
      return Err(self.cpu_binding.exhausted(ResourceKind::Cpu));
    }

    resource_limits::add_transaction_usage(
      self.tables,
      &self.bill_to_accounts,
      billed_cpu,
      self.net_usage,
      self.block.slot,
      true,
    )?;

    self.trace.cpu_usage_us = billed_cpu as u32;
    self.trace.net_usage = self.net_usage;
    Ok(())
  }

  fn billed_cpu_us(&self) -> u64 {
    self
      .cpu_usage_us()
      .max(self.config.min_transaction_cpu_usage as u64)
  }

  /// Consumes the context after a failure and returns what is needed
  /// to bill the failed attempt once its effects were undone.
  pub fn into_failure(self, error: &ChainError) -> FailedTransaction {
    let billable = self.executed || self.trace.scheduled;
    let cpu_usage_us = match billable {
      true => self
        .cpu_usage_us()
        .max(self.config.min_transaction_cpu_usage as u64)
        .min(self.cpu_limit_us),
      false => 0,
    };

    let mut trace = self.trace;
    trace.status = TransactionStatus::HardFail;
    trace.error = Some(error.to_string());

    let record = match billable && !trace.scheduled {
      true => Some((self.id, self.trx.expiration)),
      false => None,
    };

    FailedTransaction {
      trace,
      bill_to_accounts: self.bill_to_accounts,
      cpu_usage_us,
      billable,
      record,
    }
  }

  pub fn into_trace(self) -> TransactionTrace {
    self.trace
  }
}

/// A transaction whose effects were discarded.
pub struct FailedTransaction {
  pub trace: TransactionTrace,
  pub bill_to_accounts: BTreeSet<Name>,
  pub cpu_usage_us: u64,

  /// False when the transaction was rejected before any of its actions
  /// ran. Such transactions are not billed and not part of the block.
  pub billable: bool,

  /// Replay protection entry of an input transaction, it outlives the
  /// undo of the failed attempt.
  record: Option<(Digest, TimePoint)>,
}

impl FailedTransaction {
  /// Bills the objective cpu of the failed attempt, without enforcing
  /// account shares and without net or ram.
  pub fn bill(
    &mut self,
    tables: &mut ChainTables,
    slot: u32,
  ) -> Result<(), ChainError> {
    if !self.billable {
      return Ok(());
    }
    resource_limits::add_transaction_usage(
      tables,
      &self.bill_to_accounts,
      self.cpu_usage_us,
      0,
      slot,
      false,
    )?;
    if let Some((trx_id, expiration)) = self.record {
      tables.transactions.create(|id| TransactionObject {
        id,
        trx_id,
        expiration,
      })?;
    }
    self.trace.cpu_usage_us = self.cpu_usage_us as u32;
    self.trace.net_usage = 0;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{transaction_id_to_sender_id, BindingLimit},
    crate::{error::ResourceKind, ChainError},
    cinder_primitives::Digest,
  };

  #[test]
  fn binding_limit_errors() {
    assert!(matches!(
      BindingLimit::Transaction.exhausted(ResourceKind::Cpu),
      ChainError::DeadlineExceeded
    ));
    assert!(matches!(
      BindingLimit::Account.exhausted(ResourceKind::Cpu),
      ChainError::TransactionResourceExhausted(ResourceKind::Cpu)
    ));
    assert!(matches!(
      BindingLimit::Block.exhausted(ResourceKind::Net),
      ChainError::BlockResourceExhausted(ResourceKind::Net)
    ));
    assert!(matches!(
      BindingLimit::Transaction.exhausted(ResourceKind::Net),
      ChainError::TransactionResourceExhausted(ResourceKind::Net)
    ));
  }

  #[test]
  fn sender_id_is_id_prefix() {
    let id = Digest::from_bytes([1; 32]);
    assert_eq!(
      transaction_id_to_sender_id(&id),
      u128::from_le_bytes([1; 16])
    );
  }
}
