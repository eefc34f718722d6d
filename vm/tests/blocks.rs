use {
  cinder_primitives::{BlockTimestamp, Digest, Name},
  cinder_vm::{snapshot::row_key, Controller, Snapshot, WasmRuntime},
  common::{contracts, TestChain},
};

mod common;

const ALICE: Name = Name::from_static("alice");
const BOB: Name = Name::from_static("bob");

#[test]
fn popped_blocks_leave_no_trace() -> anyhow::Result<()> {
  let mut chain = TestChain::new()?;
  let genesis = chain.controller.head().clone();

  chain.start_block(1)?;
  chain.create_account(ALICE)?;
  let block = chain.finish_block()?;
  assert_eq!(block.header.height, 1);
  assert_eq!(chain.controller.head(), &block.header);
  assert!(chain.controller.account(ALICE).is_some());

  assert_eq!(chain.controller.pop_block()?, block.header);
  assert_eq!(chain.controller.head(), &genesis);
  assert!(chain.controller.account(ALICE).is_none());
  assert!(chain.controller.pop_block().is_err());

  // the same height can be produced again
  chain.start_block(1)?;
  chain.create_account(BOB)?;
  chain.finish_block()?;
  assert!(chain.controller.account(BOB).is_some());
  assert!(chain.controller.account(ALICE).is_none());
  Ok(())
}

#[test]
fn aborted_blocks_are_discarded() -> anyhow::Result<()> {
  let mut chain = TestChain::new()?;
  chain.start_block(1)?;
  chain.create_account(ALICE)?;
  chain.controller.abort_block()?;

  assert!(!chain.controller.is_building_block());
  assert!(chain.controller.account(ALICE).is_none());
  assert_eq!(chain.controller.head().height, 0);
  Ok(())
}

#[test]
fn blocks_must_extend_the_head() -> anyhow::Result<()> {
  let mut chain = TestChain::new()?;
  let head = chain.controller.head().clone();
  let next = BlockTimestamp::from_slot(head.timestamp.slot() + 1);

  let mut orphan = chain.controller.next_header(next, ALICE)?;
  orphan.parent = Digest::hash(b"elsewhere");
  assert!(chain.controller.start_block(orphan).is_err());

  let stale = chain.controller.next_header(head.timestamp, ALICE)?;
  assert!(chain.controller.start_block(stale).is_err());

  chain.start_block(1)?;
  let empty = chain.transaction(vec![]);
  let empty = chain.sign(empty, &[])?;
  let trace = chain.controller.push_transaction(&empty)?;
  assert!(trace.receipt.is_none());
  assert!(trace.error.unwrap_or_default().contains("no actions"));
  Ok(())
}

#[test]
fn finalized_blocks_report_their_changes() -> anyhow::Result<()> {
  let mut chain = TestChain::new()?;
  chain.start_block(1)?;
  let empty = chain.finish_block()?;
  assert!(empty.receipts.is_empty());
  assert_eq!(empty.action_mroot, Digest::zero());

  chain.start_block(1)?;
  let alice = chain.create_account(ALICE)?;
  chain.deploy(ALICE, &alice, &contracts::printer("hi"))?;
  let block = chain.finish_block()?;

  assert_eq!(block.receipts.len(), 2);
  assert_ne!(block.action_mroot, Digest::zero());
  assert_eq!(block.delta.height, 2);

  let id = chain.controller.account(ALICE).expect("alice").id;
  let key = row_key("account", id);
  assert!(block.delta.upserts().any(|(k, _)| k == key));
  assert_eq!(block.delta.deletes().count(), 0);
  Ok(())
}

#[test]
fn snapshots_restore_the_irreversible_state() -> anyhow::Result<()> {
  let mut chain = TestChain::new()?;
  chain.start_block(1)?;
  chain.create_account(ALICE)?;
  let first = chain.finish_block()?;

  chain.start_block(1)?;
  chain.create_account(BOB)?;
  chain.finish_block()?;

  assert!(chain.controller.mark_irreversible(3).is_err());
  chain.controller.mark_irreversible(1)?;
  assert_eq!(chain.controller.irreversible(), &first.header);

  let mut bytes = vec![];
  chain.controller.snapshot()?.write_to(&mut bytes)?;
  let snapshot = Snapshot::read_from(bytes.as_slice())?;
  assert_eq!(snapshot.head, first.header);

  let restored = Controller::from_snapshot(&snapshot, WasmRuntime::default())?;
  assert_eq!(restored.chain_id(), chain.controller.chain_id());
  assert_eq!(restored.head(), &first.header);
  assert!(restored.account(ALICE).is_some());
  assert!(restored.account(BOB).is_none());

  // the reversible block is still on top of the live chain
  assert_eq!(chain.controller.pop_block()?.height, 2);
  assert!(chain.controller.pop_block().is_err());
  Ok(())
}
