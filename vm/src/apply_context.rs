//! Execution of one action by its receiver and every notified account.

use {
  crate::{
    authorization::{check_authorization, get_permission, AuthorizationRequest},
    execution::TransactionContext,
    native,
    objects::{
      AccountObject,
      CodeObject,
      GeneratedTransactionObject,
      KeyValueObject,
      TableIdObject,
    },
    resource_limits::{self, KEY_VALUE_RAM_BYTES, TABLE_ID_RAM_BYTES},
    wasm::{HostApi, Invocation},
    AuthorizationError,
    ChainError,
  },
  cinder_primitives::{
    system::{CODE_PERMISSION, SYSTEM_ACCOUNT},
    unpack,
    Action,
    ActionReceipt,
    Name,
    PermissionLevel,
    TimePoint,
    Transaction,
  },
  std::collections::{BTreeMap, BTreeSet},
  tracing::trace,
};

/// Iterator handle that is past the last row of every table.
pub const END_ITERATOR: i32 = -1;

pub struct ApplyContext<'c, 'a> {
  pub(crate) trx: &'c mut TransactionContext<'a>,
  pub(crate) act: Action,
  pub(crate) receiver: Name,
  pub(crate) privileged: bool,
  recurse_depth: u16,

  /// Ordinal of the trace the current receiver writes to.
  action_ordinal: u32,
  creator_ordinal: u32,

  /// Receivers in execution order with their trace ordinals, the first
  /// entry is the action's own receiver.
  notified: Vec<(Name, u32)>,
  inline_actions: Vec<u32>,

  /// Row ids behind the iterator handles given to the contract.
  iterators: Vec<Option<u64>>,
}

impl<'c, 'a> ApplyContext<'c, 'a> {
  pub(crate) fn new(
    trx: &'c mut TransactionContext<'a>,
    action_ordinal: u32,
    recurse_depth: u16,
  ) -> Result<Self, ChainError> {
    let trace = trx.action_trace(action_ordinal)?;
    let (act, receiver, creator_ordinal) =
      (trace.act.clone(), trace.receiver, trace.creator_action_ordinal);
    Ok(Self {
      trx,
      act,
      receiver,
      privileged: false,
      recurse_depth,
      action_ordinal,
      creator_ordinal,
      notified: vec![(receiver, action_ordinal)],
      inline_actions: vec![],
      iterators: vec![],
    })
  }

  /// Runs the receiver, then every notified account in the order they
  /// were added, then the inline actions sent along the way.
  pub(crate) fn exec(mut self) -> Result<(), ChainError> {
    let mut next = 0;
    while next < self.notified.len() {
      let (receiver, ordinal) = self.notified[next];
      self.receiver = receiver;
      self.action_ordinal = ordinal;
      self.iterators.clear();
      self.exec_one()?;
      next += 1;
    }

    if !self.inline_actions.is_empty() {
      let max = self.trx.config.max_inline_action_depth;
      if self.recurse_depth >= max {
        return Err(ChainError::ActionDepthExceeded { max });
      }
    }

    for ordinal in std::mem::take(&mut self.inline_actions) {
      self.trx.execute_action(ordinal, self.recurse_depth + 1)?;
    }
    Ok(())
  }

  fn exec_one(&mut self) -> Result<(), ChainError> {
    trace!(
      "applying {}::{} on {}",
      self.act.account,
      self.act.name,
      self.receiver
    );
    match self.apply_receiver().and_then(|_| self.push_receipt()) {
      Ok(()) => Ok(()),
      Err(e) => {
        if let Ok(trace) = self.trx.action_trace_mut(self.action_ordinal) {
          trace.error = Some(e.to_string());
        }
        Err(e)
      }
    }
  }

  fn apply_receiver(&mut self) -> Result<(), ChainError> {
    self.trx.count_action()?;

    let account = self.trx.tables.require_account(self.receiver)?.clone();
    self.privileged = account.privileged;

    if self.receiver == SYSTEM_ACCOUNT && self.act.account == SYSTEM_ACCOUNT {
      if let Some(handler) = native::handler(self.act.name) {
        handler(self)?;
      }
    }

    if account.has_code() {
      self.run_contract(&account)?;
    }
    Ok(())
  }

  fn run_contract(&mut self, account: &AccountObject) -> Result<(), ChainError> {
    let runtime = self.trx.runtime;
    let (hash, vm_type, vm_version) =
      (account.code_hash, account.vm_type, account.vm_version);

    let tables = &*self.trx.tables;
    let module = runtime.load((hash, vm_version), || {
      tables
        .codes
        .find(
          CodeObject::BY_HASH,
          &CodeObject::key(&hash, vm_type, vm_version),
        )
        .map(|c| c.code.clone())
        .ok_or_else(|| ChainError::assertion(format!("code {hash} not found")))
    })?;

    let invocation = Invocation {
      receiver: self.receiver,
      account: self.act.account,
      action: self.act.name,
      max_pages: self.trx.config.max_wasm_pages,
      points: self.trx.remaining_instructions(),
    };
    let (instructions, result) = runtime.execute(&module, invocation, self);
    drop(module);

    self.trx.add_instructions(instructions);
    match result {
      Err(ChainError::DeadlineExceeded) => Err(self.trx.deadline_error()),
      Err(e) => Err(e),
      Ok(()) => self.trx.checktime(),
    }
  }

  fn push_receipt(&mut self) -> Result<(), ChainError> {
    let tables = &mut *self.trx.tables;
    let global_sequence = tables.next_global_sequence()?;

    let receiver_id = tables.require_account(self.receiver)?.id;
    let recv_sequence = tables
      .accounts
      .modify(receiver_id, |a| a.recv_sequence += 1)?
      .recv_sequence;

    let mut auth_sequence = BTreeMap::new();
    for level in &self.act.authorization {
      let actor_id = tables.require_account(level.actor)?.id;
      let sequence = tables
        .accounts
        .modify(actor_id, |a| a.auth_sequence += 1)?
        .auth_sequence;
      auth_sequence.insert(level.actor, sequence);
    }

    let code = tables.require_account(self.act.account)?;
    let receipt = ActionReceipt {
      receiver: self.receiver,
      act_digest: self.act.digest()?,
      global_sequence,
      recv_sequence,
      auth_sequence,
      code_sequence: code.code_sequence,
      abi_sequence: code.abi_sequence,
    };
    self.trx.action_trace_mut(self.action_ordinal)?.receipt = Some(receipt);
    Ok(())
  }

  pub(crate) fn now(&self) -> TimePoint {
    self.trx.block.time
  }

  /// Bills ram to `payer`. Growing the usage of an account other than
  /// the receiver needs that account's authorization.
  pub(crate) fn update_db_usage(
    &mut self,
    payer: Name,
    delta: i64,
  ) -> Result<(), ChainError> {
    if delta > 0 && !self.privileged && payer != self.receiver {
      self.require_auth(payer)?;
    }
    self.trx.add_ram_usage(payer, delta)
  }

  pub(crate) fn require_privileged(&self) -> Result<(), ChainError> {
    match self.privileged {
      true => Ok(()),
      false => Err(ChainError::assertion(format!(
        "{}::{} requires a privileged receiver",
        self.act.account, self.act.name
      ))),
    }
  }

  fn find_table(&self, scope: Name, table: Name) -> Option<&TableIdObject> {
    self.trx.tables.table_ids.find(
      TableIdObject::BY_CODE_SCOPE_TABLE,
      &TableIdObject::key(self.receiver, scope, table),
    )
  }

  fn find_or_create_table(
    &mut self,
    scope: Name,
    table: Name,
    payer: Name,
  ) -> Result<u64, ChainError> {
    if let Some(existing) = self.find_table(scope, table) {
      return Ok(existing.id);
    }
    self.update_db_usage(payer, TABLE_ID_RAM_BYTES as i64)?;
    let code = self.receiver;
    Ok(
      self
        .trx
        .tables
        .table_ids
        .create(|id| TableIdObject {
          id,
          code,
          scope,
          table,
          payer,
          count: 0,
        })?
        .id,
    )
  }

  fn cache_iterator(&mut self, row: u64) -> i32 {
    if let Some(position) = self.iterators.iter().position(|r| *r == Some(row)) {
      return position as i32;
    }
    self.iterators.push(Some(row));
    self.iterators.len() as i32 - 1
  }

  fn row(&self, iterator: i32) -> Result<&KeyValueObject, ChainError> {
    let row = match iterator {
      END_ITERATOR => None,
      i if i < 0 => None,
      i => self.iterators.get(i as usize).copied().flatten(),
    };
    row
      .and_then(|id| self.trx.tables.key_values.get(id))
      .ok_or_else(|| {
        ChainError::assertion(format!("dereference of invalid iterator {iterator}"))
      })
  }

  /// Row behind `iterator` together with the table it belongs to, which
  /// must be one of the receiver's tables.
  fn owned_row(
    &self,
    iterator: i32,
  ) -> Result<(KeyValueObject, TableIdObject), ChainError> {
    let row = self.row(iterator)?.clone();
    let table = self
      .trx
      .tables
      .table_ids
      .get(row.t_id)
      .cloned()
      .ok_or_else(|| ChainError::assertion("row without a table"))?;
    if table.code != self.receiver {
      return Err(ChainError::assertion("db access violation"));
    }
    Ok((row, table))
  }

  /// First row of table `t_id` with a primary key of at least `key`.
  fn lower_bound_row(&self, t_id: u64, key: u64) -> Option<&KeyValueObject> {
    self
      .trx
      .tables
      .key_values
      .lower_bound(KeyValueObject::BY_SCOPE_PRIMARY, KeyValueObject::key(t_id, key))
      .next()
      .filter(|r| r.t_id == t_id)
  }
}

impl HostApi for ApplyContext<'_, '_> {
  fn action_data(&self) -> &[u8] {
    &self.act.data
  }

  fn receiver(&self) -> Name {
    self.receiver
  }

  fn current_time(&self) -> TimePoint {
    self.now()
  }

  fn require_auth(&mut self, account: Name) -> Result<(), ChainError> {
    match self.has_auth(account) {
      true => Ok(()),
      false => Err(AuthorizationError::MissingAuth(account).into()),
    }
  }

  fn require_auth2(
    &mut self,
    account: Name,
    permission: Name,
  ) -> Result<(), ChainError> {
    let level = PermissionLevel::new(account, permission);
    match self.act.authorization.contains(&level) {
      true => Ok(()),
      false => Err(AuthorizationError::MissingAuth(account).into()),
    }
  }

  fn has_auth(&self, account: Name) -> bool {
    self.act.authorization.iter().any(|l| l.actor == account)
  }

  fn require_recipient(&mut self, account: Name) -> Result<(), ChainError> {
    if !self.trx.tables.is_account(account) {
      return Err(ChainError::assertion(format!(
        "can not notify non-existing account '{account}'"
      )));
    }
    if self.notified.iter().any(|(n, _)| *n == account) {
      return Ok(());
    }
    let ordinal =
      self
        .trx
        .schedule_action(self.act.clone(), account, self.creator_ordinal);
    self.notified.push((account, ordinal));
    Ok(())
  }

  fn is_account(&self, account: Name) -> bool {
    self.trx.tables.is_account(account)
  }

  fn is_privileged(&self, account: Name) -> Result<bool, ChainError> {
    Ok(self.trx.tables.require_account(account)?.privileged)
  }

  fn console_append(&mut self, text: &str) {
    if let Ok(trace) = self.trx.action_trace_mut(self.action_ordinal) {
      trace.console.push_str(text);
    }
  }

  fn db_store(
    &mut self,
    scope: Name,
    table: Name,
    payer: Name,
    id: u64,
    value: &[u8],
  ) -> Result<i32, ChainError> {
    if payer.is_empty() {
      return Err(ChainError::assertion(
        "must specify a valid account to pay for new record",
      ));
    }
    if !self.trx.tables.is_account(payer) {
      return Err(ChainError::assertion(format!(
        "payer '{payer}' does not exist"
      )));
    }
    if let Some(existing) = self.find_table(scope, table) {
      let key = KeyValueObject::key(existing.id, id);
      if self
        .trx
        .tables
        .key_values
        .find(KeyValueObject::BY_SCOPE_PRIMARY, &key)
        .is_some()
      {
        return Err(ChainError::assertion(format!(
          "primary key {id} already exists in {scope}:{table}"
        )));
      }
    }

    let t_id = self.find_or_create_table(scope, table, payer)?;
    let value = value.to_vec();
    let size = value.len() as i64 + KEY_VALUE_RAM_BYTES as i64;
    let row = self
      .trx
      .tables
      .key_values
      .create(|row| KeyValueObject {
        id: row,
        t_id,
        primary_key: id,
        payer,
        value,
      })?
      .id;
    self.trx.tables.table_ids.modify(t_id, |t| t.count += 1)?;
    self.update_db_usage(payer, size)?;
    Ok(self.cache_iterator(row))
  }

  fn db_update(
    &mut self,
    iterator: i32,
    payer: Name,
    value: &[u8],
  ) -> Result<(), ChainError> {
    let (row, _) = self.owned_row(iterator)?;
    let payer = match payer.is_empty() {
      true => row.payer,
      false => payer,
    };
    if !self.trx.tables.is_account(payer) {
      return Err(ChainError::assertion(format!(
        "payer '{payer}' does not exist"
      )));
    }

    let old_size = row.value.len() as i64 + KEY_VALUE_RAM_BYTES as i64;
    let new_size = value.len() as i64 + KEY_VALUE_RAM_BYTES as i64;
    if row.payer != payer {
      self.update_db_usage(row.payer, -old_size)?;
      self.update_db_usage(payer, new_size)?;
    } else if old_size != new_size {
      self.update_db_usage(payer, new_size - old_size)?;
    }

    let value = value.to_vec();
    self.trx.tables.key_values.modify(row.id, |r| {
      r.value = value;
      r.payer = payer;
    })?;
    Ok(())
  }

  fn db_remove(&mut self, iterator: i32) -> Result<(), ChainError> {
    let (row, table) = self.owned_row(iterator)?;
    let size = row.value.len() as i64 + KEY_VALUE_RAM_BYTES as i64;
    self.update_db_usage(row.payer, -size)?;

    self.trx.tables.key_values.remove(row.id)?;
    let count = self
      .trx
      .tables
      .table_ids
      .modify(table.id, |t| t.count -= 1)?
      .count;
    if count == 0 {
      self.trx.tables.table_ids.remove(table.id)?;
      self.update_db_usage(table.payer, -(TABLE_ID_RAM_BYTES as i64))?;
    }

    if let Some(slot) = self.iterators.get_mut(iterator as usize) {
      *slot = None;
    }
    Ok(())
  }

  fn db_get(&self, iterator: i32) -> Result<&[u8], ChainError> {
    Ok(&self.row(iterator)?.value)
  }

  fn db_next(&mut self, iterator: i32) -> Result<(i32, u64), ChainError> {
    if iterator < 0 {
      return Ok((END_ITERATOR, 0));
    }
    let (t_id, primary_key) = {
      let row = self.row(iterator)?;
      (row.t_id, row.primary_key)
    };
    let next = match primary_key.checked_add(1) {
      Some(key) => self
        .lower_bound_row(t_id, key)
        .map(|r| (r.id, r.primary_key)),
      None => None,
    };
    Ok(match next {
      Some((row, key)) => (self.cache_iterator(row), key),
      None => (END_ITERATOR, 0),
    })
  }

  fn db_find(
    &mut self,
    scope: Name,
    table: Name,
    id: u64,
  ) -> Result<i32, ChainError> {
    let row = self.find_table(scope, table).and_then(|t| {
      self
        .trx
        .tables
        .key_values
        .find(KeyValueObject::BY_SCOPE_PRIMARY, &KeyValueObject::key(t.id, id))
        .map(|r| r.id)
    });
    Ok(match row {
      Some(row) => self.cache_iterator(row),
      None => END_ITERATOR,
    })
  }

  fn db_lowerbound(
    &mut self,
    scope: Name,
    table: Name,
    id: u64,
  ) -> Result<i32, ChainError> {
    let row = self
      .find_table(scope, table)
      .map(|t| t.id)
      .and_then(|t_id| self.lower_bound_row(t_id, id))
      .map(|r| r.id);
    Ok(match row {
      Some(row) => self.cache_iterator(row),
      None => END_ITERATOR,
    })
  }

  fn send_inline(&mut self, bytes: &[u8]) -> Result<(), ChainError> {
    let max_size = self.trx.config.max_inline_action_size as usize;
    if bytes.len() > max_size {
      return Err(ChainError::assertion(format!(
        "inline action of {} bytes is larger than the maximum of {max_size}",
        bytes.len()
      )));
    }
    let act: Action = unpack(bytes)?;

    if !self.trx.tables.is_account(act.account) {
      return Err(ChainError::assertion(format!(
        "inline action's code account '{}' does not exist",
        act.account
      )));
    }
    for level in &act.authorization {
      get_permission(self.trx.tables, level)?;
    }

    if !self.privileged {
      let code_permission: BTreeSet<PermissionLevel> =
        [PermissionLevel::new(self.receiver, CODE_PERMISSION)].into();
      check_authorization(self.trx.tables, AuthorizationRequest {
        actions: std::slice::from_ref(&act),
        provided_keys: &BTreeSet::new(),
        provided_permissions: &code_permission,
        provided_delay_sec: self.trx.elapsed_delay_sec(),
        allow_unused_keys: true,
      })?;
    }

    let receiver = act.account;
    let ordinal = self.trx.schedule_action(act, receiver, self.action_ordinal);
    self.inline_actions.push(ordinal);
    Ok(())
  }

  fn send_deferred(
    &mut self,
    sender_id: u128,
    payer: Name,
    bytes: &[u8],
    replace_existing: bool,
  ) -> Result<(), ChainError> {
    let mut trx: Transaction = unpack(bytes)?;
    if trx.actions.is_empty() {
      return Err(ChainError::transaction("deferred transaction has no actions"));
    }
    let max_delay = self.trx.config.max_transaction_delay;
    if trx.delay_sec > max_delay {
      return Err(ChainError::transaction(format!(
        "deferred delay of {}s exceeds the maximum of {max_delay}s",
        trx.delay_sec
      )));
    }
    if !self.trx.tables.is_account(payer) {
      return Err(ChainError::assertion(format!(
        "payer '{payer}' does not exist"
      )));
    }

    if !self.privileged {
      if payer != self.receiver {
        self.require_auth(payer)?;
      }
      let code_permission: BTreeSet<PermissionLevel> =
        [PermissionLevel::new(self.receiver, CODE_PERMISSION)].into();
      check_authorization(self.trx.tables, AuthorizationRequest {
        actions: &trx.actions,
        provided_keys: &BTreeSet::new(),
        provided_permissions: &code_permission,
        provided_delay_sec: trx.delay_sec as u64,
        allow_unused_keys: true,
      })?;
    }

    let now = self.now();
    trx.expiration = now.saturating_add_secs(1);
    let trx_id = trx.id()?;
    let packed_trx = trx.packed()?;
    let delay_until = now.saturating_add_secs(trx.delay_sec as u64);
    let expiration = delay_until.saturating_add_secs(
      self.trx.config.deferred_trx_expiration_window as u64,
    );
    let sender = self.receiver;

    let tables = &*self.trx.tables;
    let existing = tables
      .generated_transactions
      .find(
        GeneratedTransactionObject::BY_SENDER_ID,
        &GeneratedTransactionObject::sender_key(sender, sender_id),
      )
      .cloned();

    let duplicate = tables
      .generated_transactions
      .find(
        GeneratedTransactionObject::BY_TRX_ID,
        &GeneratedTransactionObject::trx_key(&trx_id),
      )
      .filter(|g| existing.as_ref().map(|e| e.id) != Some(g.id))
      .is_some();
    if duplicate {
      return Err(ChainError::transaction(format!(
        "deferred transaction {trx_id} is already scheduled"
      )));
    }

    let size = match existing {
      Some(existing) => {
        if !replace_existing {
          return Err(ChainError::transaction(format!(
            "deferred transaction {sender_id} of '{sender}' already exists"
          )));
        }
        self.trx.add_ram_usage(existing.payer, -(existing.billable_size() as i64))?;
        self
          .trx
          .tables
          .generated_transactions
          .modify(existing.id, |g| {
            g.trx_id = trx_id;
            g.payer = payer;
            g.published = now;
            g.delay_until = delay_until;
            g.expiration = expiration;
            g.packed_trx = packed_trx;
          })?
          .billable_size()
      }
      None => self
        .trx
        .tables
        .generated_transactions
        .create(|id| GeneratedTransactionObject {
          id,
          trx_id,
          sender,
          sender_id,
          payer,
          delay_until,
          expiration,
          published: now,
          packed_trx,
        })?
        .billable_size(),
    };
    self.trx.add_ram_usage(payer, size as i64)
  }

  fn cancel_deferred(&mut self, sender_id: u128) -> Result<bool, ChainError> {
    let existing = self
      .trx
      .tables
      .generated_transactions
      .find(
        GeneratedTransactionObject::BY_SENDER_ID,
        &GeneratedTransactionObject::sender_key(self.receiver, sender_id),
      )
      .cloned();
    match existing {
      Some(gto) => {
        self.trx.add_ram_usage(gto.payer, -(gto.billable_size() as i64))?;
        self.trx.tables.generated_transactions.remove(gto.id)?;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  fn set_resource_limits(
    &mut self,
    account: Name,
    ram_bytes: i64,
    net_weight: i64,
    cpu_weight: i64,
  ) -> Result<(), ChainError> {
    self.require_privileged()?;
    self.trx.tables.require_account(account)?;
    let decreased = resource_limits::set_account_limits(
      self.trx.tables,
      account,
      ram_bytes,
      net_weight,
      cpu_weight,
    )?;
    if decreased {
      self.trx.check_ram_later(account);
    }
    Ok(())
  }
}
