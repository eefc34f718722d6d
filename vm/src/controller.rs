//! Block lifecycle on top of the chain database.

use {
  crate::{
    authorization::permission_billable_size,
    config::GenesisState,
    execution::{BlockContext, TransactionContext},
    objects::{
      AccountObject,
      DynamicGlobalPropertyObject,
      GlobalPropertyObject,
      PermissionObject,
    },
    resource_limits::{self, OVERHEAD_PER_ACCOUNT_RAM_BYTES},
    schedule,
    signatures,
    snapshot::{BlockDelta, Snapshot},
    state::{ChainDatabase, ChainTables},
    store::Session,
    trace::TransactionTrace,
    wasm::WasmRuntime,
    ChainConfig,
    ChainError,
  },
  cinder_primitives::{
    pack,
    system::{ACTIVE_PERMISSION, NULL_ACCOUNT, OWNER_PERMISSION, SYSTEM_ACCOUNT},
    unpack,
    Authority,
    BlockHeader,
    BlockTimestamp,
    Digest,
    Name,
    SignedTransaction,
    TimePoint,
    Transaction,
    TransactionReceipt,
    TransactionStatus,
  },
  std::collections::VecDeque,
  tracing::{debug, info, warn},
};

/// A block being assembled.
struct PendingBlock {
  header: BlockHeader,
  session: Session,
  receipts: Vec<TransactionReceipt>,
  action_digests: Vec<Digest>,
}

impl PendingBlock {
  fn context(&self) -> BlockContext {
    BlockContext {
      block_num: self.header.height,
      time: self.header.timestamp.to_time_point(),
      slot: self.header.timestamp.slot(),
    }
  }

  fn include(&mut self, trace: &mut TransactionTrace) -> Result<(), ChainError> {
    let receipt = TransactionReceipt {
      id: trace.id,
      status: trace.status,
      cpu_usage_us: trace.cpu_usage_us,
      net_usage_words: (trace.net_usage / 8) as u32,
    };
    for action in trace.action_receipts() {
      self.action_digests.push(Digest::of(action)?);
    }
    self.receipts.push(receipt.clone());
    trace.receipt = Some(receipt);
    Ok(())
  }
}

/// A block applied on top of the irreversible state, its undo frame
/// is still on the stack.
struct ReversibleBlock {
  header: BlockHeader,
  previous: BlockHeader,
  revision: i64,
}

/// Output of a finalized block.
#[derive(Debug, Clone)]
pub struct FinalizedBlock {
  pub header: BlockHeader,
  pub receipts: Vec<TransactionReceipt>,

  /// Merkle root of the digests of every action receipt of the block.
  pub action_mroot: Digest,
  pub delta: BlockDelta,
}

/// Owns the chain state and applies blocks to it, one transaction at
/// a time.
pub struct Controller {
  db: ChainDatabase,
  runtime: WasmRuntime,
  chain_id: Digest,
  head: BlockHeader,
  irreversible: BlockHeader,
  reversible: VecDeque<ReversibleBlock>,
  pending: Option<PendingBlock>,
}

impl Controller {
  /// Creates the initial state of a chain: the system and null
  /// accounts, the global properties and the resource singletons.
  pub fn new(genesis: &GenesisState, runtime: WasmRuntime) -> Result<Self, ChainError> {
    let config = &genesis.initial_configuration;
    config.validate()?;
    let chain_id = genesis.chain_id()?;
    let now = genesis.initial_timestamp;

    let mut db = ChainDatabase::new(ChainTables::default());
    let tables = db.tables_mut();
    tables.global_property.create(|id| GlobalPropertyObject {
      id,
      chain_id,
      configuration: config.clone(),
    })?;
    tables
      .dynamic_global_property
      .create(|id| DynamicGlobalPropertyObject {
        id,
        global_action_sequence: 0,
      })?;
    resource_limits::initialize(tables, config)?;

    let system = Authority::from_key(genesis.initial_key);
    create_native_account(tables, SYSTEM_ACCOUNT, &system, &system, true, now)?;

    // satisfiable by nobody
    let nobody = Authority {
      threshold: 1,
      keys: vec![],
      accounts: vec![],
      waits: vec![],
    };
    create_native_account(tables, NULL_ACCOUNT, &nobody, &nobody, false, now)?;

    for account in &genesis.accounts {
      let auth = Authority::from_key(account.key);
      create_native_account(tables, account.name, &auth, &auth, account.privileged, now)?;
    }

    let head = BlockHeader::genesis(BlockTimestamp::from(now));
    info!("chain {chain_id} initialized at {now}");
    Ok(Self {
      db,
      runtime,
      chain_id,
      irreversible: head.clone(),
      head,
      reversible: VecDeque::new(),
      pending: None,
    })
  }

  /// Resumes a chain from a snapshot of its irreversible state.
  pub fn from_snapshot(snapshot: &Snapshot, runtime: WasmRuntime) -> Result<Self, ChainError> {
    let mut db = ChainDatabase::new(ChainTables::default());
    db.restore(&snapshot.tables)?;

    let chain_id = db.tables().global()?.chain_id;
    if chain_id != snapshot.chain_id {
      return Err(ChainError::assertion(format!(
        "snapshot of chain {} contains state of chain {chain_id}",
        snapshot.chain_id
      )));
    }

    let codes = db
      .tables()
      .codes
      .iter()
      .map(|c| ((c.code_hash, c.vm_version), c.code.clone()))
      .collect();
    runtime.warm_up(codes);

    info!("chain {chain_id} restored at block {}", snapshot.head.height);
    Ok(Self {
      db,
      runtime,
      chain_id,
      head: snapshot.head.clone(),
      irreversible: snapshot.head.clone(),
      reversible: VecDeque::new(),
      pending: None,
    })
  }

  pub fn chain_id(&self) -> &Digest {
    &self.chain_id
  }

  pub fn head(&self) -> &BlockHeader {
    &self.head
  }

  pub fn irreversible(&self) -> &BlockHeader {
    &self.irreversible
  }

  pub fn tables(&self) -> &ChainTables {
    self.db.tables()
  }

  pub fn config(&self) -> Result<&ChainConfig, ChainError> {
    self.db.tables().config()
  }

  pub fn runtime(&self) -> &WasmRuntime {
    &self.runtime
  }

  pub fn account(&self, name: Name) -> Option<&AccountObject> {
    self.db.tables().account(name)
  }

  pub fn is_building_block(&self) -> bool {
    self.pending.is_some()
  }

  /// Time of the block being built.
  pub fn pending_block_time(&self) -> Option<TimePoint> {
    self
      .pending
      .as_ref()
      .map(|p| p.header.timestamp.to_time_point())
  }

  /// Header of the block that would follow the current head.
  pub fn next_header(
    &self,
    timestamp: BlockTimestamp,
    producer: Name,
  ) -> Result<BlockHeader, ChainError> {
    Ok(BlockHeader {
      height: self.head.height + 1,
      timestamp,
      producer,
      parent: self.head.id()?,
    })
  }

  /// Opens the session of a new block on top of the head.
  pub fn start_block(&mut self, header: BlockHeader) -> Result<(), ChainError> {
    if self.pending.is_some() {
      return Err(ChainError::assertion("a block is already being built"));
    }
    if header.height != self.head.height + 1 || header.parent != self.head.id()? {
      return Err(ChainError::assertion(format!(
        "block {} does not extend head {}",
        header.height, self.head.height
      )));
    }
    if header.timestamp <= self.head.timestamp {
      return Err(ChainError::assertion(format!(
        "block timestamp {} is not after head timestamp {}",
        header.timestamp, self.head.timestamp
      )));
    }

    let session = self.db.start_session();
    let now = header.timestamp.to_time_point();
    schedule::clear_expired_transactions(self.db.tables_mut(), now)?;

    debug!("started block {} at {now}", header.height);
    self.pending = Some(PendingBlock {
      header,
      session,
      receipts: vec![],
      action_digests: vec![],
    });
    Ok(())
  }

  /// Applies an input transaction to the pending block.
  ///
  /// Outcomes that are the transaction's own fault come back as a
  /// trace, with a receipt when the transaction became part of the
  /// block. Errors are reserved for block level and fatal conditions.
  pub fn push_transaction(
    &mut self,
    trx: &SignedTransaction,
  ) -> Result<TransactionTrace, ChainError> {
    let Self {
      db,
      runtime,
      chain_id,
      pending,
      ..
    } = self;
    let pending = pending
      .as_mut()
      .ok_or_else(|| ChainError::assertion("no block is being built"))?;
    let block = pending.context();
    let id = trx.id()?;

    let keys = match signatures::recover_keys(trx, chain_id) {
      Ok(keys) => keys,
      Err(e) => {
        debug!("transaction {id} rejected: {e}");
        let mut trace = TransactionTrace::new(id, block.block_num, false);
        trace.error = Some(e.to_string());
        return Ok(trace);
      }
    };
    let packed_size = pack(trx)?.len() as u64;

    let session = db.start_session();
    let mut ctx = TransactionContext::new(
      db.tables_mut(),
      runtime,
      block,
      trx.transaction.clone(),
      id,
      false,
    )?;

    let result = ctx
      .init_for_input(packed_size, &keys)
      .and_then(|_| ctx.exec())
      .and_then(|_| ctx.finalize());

    match result {
      Ok(()) => {
        let mut trace = ctx.into_trace();
        session.squash(db)?;
        pending.include(&mut trace)?;
        debug!(
          "transaction {id} {:?}, cpu {}us, net {} bytes",
          trace.status, trace.cpu_usage_us, trace.net_usage
        );
        Ok(trace)
      }
      Err(e) => {
        let mut failed = ctx.into_failure(&e);
        session.undo(db)?;
        if !e.is_transaction_scoped() {
          warn!("transaction {id} left out of block: {e}");
          return Err(e);
        }
        debug!("transaction {id} failed: {e}");
        if !failed.billable {
          return Ok(failed.trace);
        }

        let billing = db.start_session();
        if let Err(e) = failed.bill(db.tables_mut(), block.slot) {
          billing.undo(db)?;
          return Err(e);
        }
        billing.squash(db)?;
        pending.include(&mut failed.trace)?;
        Ok(failed.trace)
      }
    }
  }

  /// Deferred transactions due in the pending block, in execution order.
  pub fn scheduled_transactions(&self) -> Vec<Digest> {
    match self.pending_block_time() {
      Some(now) => schedule::due_transactions(self.db.tables(), now),
      None => vec![],
    }
  }

  /// Retires a deferred transaction: executes it, or records its
  /// expiration when it missed its window.
  pub fn push_scheduled_transaction(
    &mut self,
    trx_id: &Digest,
  ) -> Result<TransactionTrace, ChainError> {
    let Self {
      db,
      runtime,
      pending,
      ..
    } = self;
    let pending = pending
      .as_mut()
      .ok_or_else(|| ChainError::assertion("no block is being built"))?;
    let block = pending.context();

    let generated = schedule::find_generated(db.tables(), trx_id)
      .cloned()
      .ok_or_else(|| {
        ChainError::transaction(format!("unknown deferred transaction {trx_id}"))
      })?;
    if generated.delay_until > block.time {
      return Err(ChainError::transaction(format!(
        "deferred transaction {trx_id} is not due before {}",
        generated.delay_until
      )));
    }
    let trx: Transaction = unpack(&generated.packed_trx)?;

    let retire = db.start_session();
    let tables = db.tables_mut();
    resource_limits::add_pending_ram_usage(
      tables,
      generated.payer,
      -(generated.billable_size() as i64),
    )?;
    tables.generated_transactions.remove(generated.id)?;

    if generated.expiration < block.time {
      let mut trace = TransactionTrace::new(generated.trx_id, block.block_num, true);
      trace.status = TransactionStatus::Expired;
      retire.squash(db)?;
      pending.include(&mut trace)?;
      debug!("deferred transaction {trx_id} expired");
      return Ok(trace);
    }

    let session = db.start_session();
    let mut ctx = TransactionContext::new(
      db.tables_mut(),
      runtime,
      block,
      trx,
      generated.trx_id,
      true,
    )?;
    let result = ctx
      .init_for_deferred(generated.published)
      .and_then(|_| ctx.exec())
      .and_then(|_| ctx.finalize());

    match result {
      Ok(()) => {
        let mut trace = ctx.into_trace();
        session.squash(db)?;
        retire.squash(db)?;
        pending.include(&mut trace)?;
        debug!("deferred transaction {trx_id} executed");
        Ok(trace)
      }
      Err(e) => {
        let mut failed = ctx.into_failure(&e);
        session.undo(db)?;
        if !e.is_transaction_scoped() {
          retire.undo(db)?;
          warn!("deferred transaction {trx_id} left out of block: {e}");
          return Err(e);
        }
        if let Err(e) = failed.bill(db.tables_mut(), block.slot) {
          retire.undo(db)?;
          return Err(e);
        }
        retire.squash(db)?;
        pending.include(&mut failed.trace)?;
        debug!("deferred transaction {trx_id} failed: {e}");
        Ok(failed.trace)
      }
    }
  }

  /// Closes the pending block. Its undo frame stays on the stack until
  /// the block becomes irreversible.
  pub fn finalize_block(&mut self) -> Result<FinalizedBlock, ChainError> {
    let pending = self
      .pending
      .take()
      .ok_or_else(|| ChainError::assertion("no block is being built"))?;
    let slot = pending.header.timestamp.slot();

    let tables = self.db.tables_mut();
    resource_limits::process_account_limit_updates(tables)?;
    resource_limits::process_block_usage(tables, slot)?;

    let delta = BlockDelta {
      height: pending.header.height,
      tables: self.db.delta()?,
    };
    let revision = pending.session.push();

    let previous = std::mem::replace(&mut self.head, pending.header.clone());
    self.reversible.push_back(ReversibleBlock {
      header: pending.header.clone(),
      previous,
      revision,
    });

    info!(
      "finalized block {} with {} transactions",
      pending.header.height,
      pending.receipts.len()
    );
    Ok(FinalizedBlock {
      header: pending.header,
      receipts: pending.receipts,
      action_mroot: merkle_root(&pending.action_digests),
      delta,
    })
  }

  /// Discards the pending block and everything applied to it.
  pub fn abort_block(&mut self) -> Result<(), ChainError> {
    if let Some(pending) = self.pending.take() {
      pending.session.undo(&mut self.db)?;
      debug!("aborted block {}", pending.header.height);
    }
    Ok(())
  }

  /// Reverts the head block.
  pub fn pop_block(&mut self) -> Result<BlockHeader, ChainError> {
    if self.pending.is_some() {
      return Err(ChainError::assertion("cannot pop a block while building one"));
    }
    let block = self
      .reversible
      .pop_back()
      .ok_or_else(|| ChainError::assertion("no reversible block to pop"))?;
    if block.revision != self.db.revision() {
      return Err(ChainError::assertion("undo stack out of sync with blocks"));
    }
    self.db.undo()?;
    self.head = block.previous;
    info!("popped block {}", block.header.height);
    Ok(block.header)
  }

  /// Makes every block up to `height` permanent.
  pub fn mark_irreversible(&mut self, height: u64) -> Result<(), ChainError> {
    if height > self.head.height {
      return Err(ChainError::assertion(format!(
        "block {height} is above head {}",
        self.head.height
      )));
    }
    let mut last = None;
    while self.reversible.front().map(|b| b.header.height <= height) == Some(true) {
      last = self.reversible.pop_front();
    }
    if let Some(block) = last {
      self.db.commit(block.revision)?;
      debug!("block {} is irreversible", block.header.height);
      self.irreversible = block.header;
    }
    Ok(())
  }

  /// Committed state as of the last irreversible block.
  pub fn snapshot(&self) -> Result<Snapshot, ChainError> {
    Ok(Snapshot {
      chain_id: self.chain_id,
      head: self.irreversible.clone(),
      tables: self.db.dump()?,
    })
  }
}

fn create_native_account(
  tables: &mut ChainTables,
  name: Name,
  owner: &Authority,
  active: &Authority,
  privileged: bool,
  now: TimePoint,
) -> Result<(), ChainError> {
  tables.accounts.create(|id| AccountObject {
    id,
    name,
    creation_date: now,
    privileged,
    code_hash: Digest::zero(),
    vm_type: 0,
    vm_version: 0,
    code_sequence: 0,
    abi: vec![],
    abi_sequence: 0,
    recv_sequence: 0,
    auth_sequence: 0,
  })?;

  let owner_id = tables
    .permissions
    .create(|id| PermissionObject {
      id,
      owner: name,
      name: OWNER_PERMISSION,
      parent: None,
      last_updated: now,
      auth: owner.clone(),
    })?
    .id;
  tables.permissions.create(|id| PermissionObject {
    id,
    owner: name,
    name: ACTIVE_PERMISSION,
    parent: Some(owner_id),
    last_updated: now,
    auth: active.clone(),
  })?;

  resource_limits::initialize_account(tables, name)?;
  let ram = OVERHEAD_PER_ACCOUNT_RAM_BYTES
    + permission_billable_size(owner)?
    + permission_billable_size(active)?;
  resource_limits::add_pending_ram_usage(tables, name, ram as i64)
}

/// Binary merkle root, an odd node is paired with itself.
pub fn merkle_root(digests: &[Digest]) -> Digest {
  if digests.is_empty() {
    return Digest::zero();
  }
  let mut level = digests.to_vec();
  while level.len() > 1 {
    level = level
      .chunks(2)
      .map(|pair| {
        let right = pair.get(1).unwrap_or(&pair[0]);
        Digest::hash_parts(&[pair[0].as_ref(), right.as_ref()])
      })
      .collect();
  }
  level[0]
}

#[cfg(test)]
mod tests {
  use {
    super::merkle_root,
    cinder_primitives::Digest,
  };

  #[test]
  fn merkle_root_pairs_odd_nodes_with_themselves() {
    let (a, b, c) = (Digest::hash(b"a"), Digest::hash(b"b"), Digest::hash(b"c"));
    let ab = Digest::hash_parts(&[a.as_ref(), b.as_ref()]);
    let cc = Digest::hash_parts(&[c.as_ref(), c.as_ref()]);

    assert_eq!(merkle_root(&[]), Digest::zero());
    assert_eq!(merkle_root(&[a]), a);
    assert_eq!(merkle_root(&[a, b]), ab);
    assert_eq!(
      merkle_root(&[a, b, c]),
      Digest::hash_parts(&[ab.as_ref(), cc.as_ref()])
    );
  }
}
