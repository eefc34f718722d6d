use {
  cinder_primitives::{Action, Name, TransactionStatus},
  cinder_vm::objects::{KeyValueObject, TableIdObject},
  common::{active, contracts, TestChain},
};

mod common;

const TOKEN: Name = Name::from_static("token");
const ALICE: Name = Name::from_static("alice");
const BOB: Name = Name::from_static("bob");
const BALANCES: Name = Name::from_static("balances");
const ISSUE: Name = Name::from_static("issue");
const TRANSFER: Name = Name::from_static("transfer");

fn balance(chain: &TestChain, owner: Name) -> Option<u64> {
  let tables = chain.controller.tables();
  let table = tables.table_ids.find(
    TableIdObject::BY_CODE_SCOPE_TABLE,
    &TableIdObject::key(TOKEN, owner, BALANCES),
  )?;
  let row = tables.key_values.find(
    KeyValueObject::BY_SCOPE_PRIMARY,
    &KeyValueObject::key(table.id, 0),
  )?;
  let mut bytes = [0u8; 8];
  bytes.copy_from_slice(&row.value);
  Some(u64::from_le_bytes(bytes))
}

fn token_action(name: Name, actor: Name, from: Name, to: Name, amount: u64) -> Action {
  Action {
    account: TOKEN,
    name,
    authorization: active(actor),
    data: contracts::token_payload(from, to, amount),
  }
}

#[test]
fn transfer_moves_balances_and_notifies_both_parties() -> anyhow::Result<()> {
  let mut chain = TestChain::new()?;
  chain.start_block(1)?;
  let token = chain.create_account(TOKEN)?;
  let alice = chain.create_account(ALICE)?;
  chain.create_account(BOB)?;
  chain.deploy(TOKEN, &token, &contracts::token(BALANCES, ISSUE))?;

  chain.push_ok(
    vec![token_action(ISSUE, TOKEN, TOKEN, ALICE, 100)],
    &[&token],
  )?;
  assert_eq!(balance(&chain, ALICE), Some(100));
  assert_eq!(balance(&chain, BOB), None);
  chain.finish_block()?;

  chain.start_block(1)?;
  let trace = chain.push_ok(
    vec![token_action(TRANSFER, ALICE, ALICE, BOB, 40)],
    &[&alice],
  )?;
  assert_eq!(balance(&chain, ALICE), Some(60));
  assert_eq!(balance(&chain, BOB), Some(40));

  let receivers: Vec<Name> = trace.action_receipts().map(|r| r.receiver).collect();
  assert_eq!(receivers, vec![TOKEN, ALICE, BOB]);
  let sequences: Vec<u64> =
    trace.action_receipts().map(|r| r.global_sequence).collect();
  assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1));

  let overdraw = chain.push(
    vec![token_action(TRANSFER, ALICE, ALICE, BOB, 61)],
    &[&alice],
  )?;
  assert_eq!(overdraw.status, TransactionStatus::HardFail);
  assert!(overdraw.error.unwrap_or_default().contains("overdrawn"));
  assert_eq!(balance(&chain, ALICE), Some(60));
  assert_eq!(balance(&chain, BOB), Some(40));

  // only the owner can move funds
  let theft = chain.push(
    vec![token_action(TRANSFER, BOB, ALICE, BOB, 10)],
    &[&token],
  )?;
  assert!(!theft.succeeded());
  assert_eq!(balance(&chain, ALICE), Some(60));

  chain.finish_block()?;
  Ok(())
}
