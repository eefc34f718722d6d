use {
  cinder_primitives::{BlockTimestamp, Name, SignedTransaction, TimePoint},
  cinder_vm::{Controller, FinalizedBlock},
  std::{
    collections::VecDeque,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
  },
  tokio::io::{AsyncBufReadExt, BufReader},
  tracing::{debug, warn},
};

/// Reads signed transactions from a file with one JSON object per
/// line. Lines that do not parse are skipped.
pub async fn read_feed(path: &Path) -> anyhow::Result<Vec<SignedTransaction>> {
  let file = tokio::fs::File::open(path).await?;
  let mut lines = BufReader::new(file).lines();
  let mut txs = vec![];
  let mut number = 0;
  while let Some(line) = lines.next_line().await? {
    number += 1;
    if line.trim().is_empty() {
      continue;
    }
    match serde_json::from_str(&line) {
      Ok(tx) => txs.push(tx),
      Err(e) => warn!("skipping line {number} of {}: {e}", path.display()),
    }
  }
  Ok(txs)
}

/// Block time for a block produced now, never earlier than the slot
/// after `head`.
pub fn next_timestamp(head: BlockTimestamp) -> BlockTimestamp {
  let micros = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_micros() as u64)
    .unwrap_or_default();
  let now = BlockTimestamp::from(TimePoint::from_micros(micros));
  now.max(head.next())
}

#[derive(Default)]
pub struct Mempool {
  txs: VecDeque<SignedTransaction>,
}

impl Mempool {
  pub fn consume(&mut self, tx: SignedTransaction) {
    self.txs.push_back(tx);
  }

  pub fn len(&self) -> usize {
    self.txs.len()
  }

  /// Builds the next block out of due deferred transactions and as
  /// many pending transactions as fit in it. Transactions that do not
  /// fit stay for the next block.
  pub fn produce(
    &mut self,
    controller: &mut Controller,
    timestamp: BlockTimestamp,
    producer: Name,
  ) -> anyhow::Result<FinalizedBlock> {
    let header = controller.next_header(timestamp, producer)?;
    controller.start_block(header)?;

    if let Err(e) = self.apply(controller) {
      controller.abort_block()?;
      return Err(e);
    }
    Ok(controller.finalize_block()?)
  }

  fn apply(&mut self, controller: &mut Controller) -> anyhow::Result<()> {
    for id in controller.scheduled_transactions() {
      match controller.push_scheduled_transaction(&id) {
        Ok(trace) => match &trace.error {
          Some(error) => debug!("deferred transaction {id} failed: {error}"),
          None => debug!("deferred transaction {id} {:?}", trace.status),
        },
        Err(e) if e.is_fatal() => return Err(e.into()),
        Err(e) if e.is_block_level() => {
          debug!("deferred transaction {id} postponed: {e}");
          break;
        }
        Err(e) => warn!("deferred transaction {id} skipped: {e}"),
      }
    }

    while let Some(tx) = self.txs.pop_front() {
      match controller.push_transaction(&tx) {
        Ok(trace) => match (&trace.error, &trace.receipt) {
          (Some(error), Some(_)) => debug!("transaction {} failed: {error}", trace.id),
          (Some(error), None) => warn!("transaction {} rejected: {error}", trace.id),
          (None, _) => debug!("transaction {} {:?}", trace.id, trace.status),
        },
        Err(e) if e.is_block_level() => {
          debug!("block is full: {e}");
          self.txs.push_front(tx);
          break;
        }
        Err(e) => return Err(e.into()),
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use {
    super::Mempool,
    cinder_primitives::{
      system::{NewAccount, ACTIVE_PERMISSION, NEWACCOUNT, SYSTEM_ACCOUNT},
      Action,
      Authority,
      Name,
      PermissionLevel,
      SignedTransaction,
      TimePoint,
      Transaction,
      TransactionStatus,
    },
    cinder_vm::{Controller, GenesisState, WasmRuntime},
    ed25519_dalek::Keypair,
  };

  #[test]
  fn produces_blocks_from_queued_transactions() -> anyhow::Result<()> {
    let key = Keypair::generate(&mut rand::thread_rng());
    let genesis = GenesisState::new(TimePoint::from_secs(1_600_000_000), key.public.into());
    let mut controller = Controller::new(&genesis, WasmRuntime::default())?;

    let alice = Name::from_static("alice");
    let create = Action::new(
      SYSTEM_ACCOUNT,
      NEWACCOUNT,
      vec![PermissionLevel::new(SYSTEM_ACCOUNT, ACTIVE_PERMISSION)],
      &NewAccount {
        creator: SYSTEM_ACCOUNT,
        name: alice,
        owner: Authority::from_key(key.public.into()),
        active: Authority::from_key(key.public.into()),
      },
    )?;
    let head = controller.head().timestamp;
    let expiration = head.to_time_point().saturating_add_secs(60);
    let signed = SignedTransaction::unsigned(Transaction::new(expiration, vec![create]))
      .sign(&key, controller.chain_id())?;

    let mut mempool = Mempool::default();
    mempool.consume(signed.clone());
    mempool.consume(signed);

    let block = mempool.produce(&mut controller, head.next(), SYSTEM_ACCOUNT)?;
    assert_eq!(mempool.len(), 0);
    assert_eq!(block.header.height, 1);
    assert_eq!(block.receipts.len(), 1);
    assert_eq!(block.receipts[0].status, TransactionStatus::Executed);
    assert!(controller.account(alice).is_some());
    Ok(())
  }
}
