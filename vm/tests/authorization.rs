use {
  cinder_primitives::{
    system::{
      CancelDelay,
      LinkAuth,
      UpdateAuth,
      ACTIVE_PERMISSION,
      CANCELDELAY,
      LINKAUTH,
      SYSTEM_ACCOUNT,
      UPDATEAUTH,
    },
    Action,
    Authority,
    Name,
    PermissionLevel,
    TransactionStatus,
  },
  common::{active, call, contracts, keypair, TestChain},
};

mod common;

const ALICE: Name = Name::from_static("alice");
const BOB: Name = Name::from_static("bob");
const COUNTER: Name = Name::from_static("counter");
const POSTER: Name = Name::from_static("poster");
const BUMP: Name = Name::from_static("bump");
const RESET: Name = Name::from_static("reset");
const ROWS: Name = Name::from_static("rows");

#[test]
fn unsigned_and_oversigned_transactions_are_rejected() -> anyhow::Result<()> {
  let mut chain = TestChain::new()?;
  chain.start_block(1)?;
  let alice = chain.create_account(ALICE)?;
  let bob = chain.create_account(BOB)?;
  let counter = chain.create_account(COUNTER)?;
  chain.deploy(COUNTER, &counter, &contracts::counter(ROWS))?;

  let bump = || call(COUNTER, BUMP, active(ALICE));

  let missing = chain.push(vec![bump()], &[&bob])?;
  assert!(missing.receipt.is_none());
  assert!(missing.error.unwrap_or_default().contains("authorization"));

  let irrelevant = chain.push(vec![bump()], &[&alice, &bob])?;
  assert!(irrelevant.receipt.is_none());
  assert!(irrelevant.error.unwrap_or_default().contains("irrelevant"));

  let trx = chain.transaction(vec![bump()]);
  let mut forged = chain.sign(trx, &[&alice])?;
  forged.signatures[0].signature[0] ^= 0xff;
  let forged = chain.controller.push_transaction(&forged)?;
  assert!(forged.receipt.is_none());
  assert!(forged.error.unwrap_or_default().contains("signature"));

  assert!(chain.rows(COUNTER).is_empty());
  let block = chain.finish_block()?;
  assert!(block
    .receipts
    .iter()
    .all(|r| r.status == TransactionStatus::Executed));
  Ok(())
}

#[test]
fn linked_permissions_authorize_their_actions_only() -> anyhow::Result<()> {
  let mut chain = TestChain::new()?;
  chain.start_block(1)?;
  let alice = chain.create_account(ALICE)?;
  let counter = chain.create_account(COUNTER)?;
  chain.deploy(COUNTER, &counter, &contracts::counter(ROWS))?;

  let poster = keypair();
  let create = Action::new(SYSTEM_ACCOUNT, UPDATEAUTH, active(ALICE), &UpdateAuth {
    account: ALICE,
    permission: POSTER,
    parent: ACTIVE_PERMISSION,
    auth: Authority::from_key(poster.public.into()),
  })?;
  let link = Action::new(SYSTEM_ACCOUNT, LINKAUTH, active(ALICE), &LinkAuth {
    account: ALICE,
    code: COUNTER,
    message_type: BUMP,
    requirement: POSTER,
  })?;
  chain.push_ok(vec![create, link], &[&alice])?;

  let as_poster = vec![PermissionLevel::new(ALICE, POSTER)];
  chain.push_ok(vec![call(COUNTER, BUMP, as_poster.clone())], &[&poster])?;
  assert_eq!(chain.rows(COUNTER).len(), 1);

  let unlinked = chain.push(vec![call(COUNTER, RESET, as_poster)], &[&poster])?;
  assert!(unlinked.receipt.is_none());
  assert!(unlinked.error.unwrap_or_default().contains("irrelevant"));

  // a parent permission still satisfies the linked one
  chain.push_ok(vec![call(COUNTER, BUMP, active(ALICE))], &[&alice])?;
  chain.finish_block()?;
  Ok(())
}

#[test]
fn delayed_transactions_run_later_or_get_canceled() -> anyhow::Result<()> {
  let mut chain = TestChain::new()?;
  chain.start_block(1)?;
  let alice = chain.create_account(ALICE)?;
  let counter = chain.create_account(COUNTER)?;
  chain.deploy(COUNTER, &counter, &contracts::counter(ROWS))?;

  let mut delayed = chain.transaction(vec![call(COUNTER, BUMP, active(ALICE))]);
  delayed.delay_sec = 1;
  let delayed = chain.sign(delayed, &[&alice])?;
  let trace = chain.controller.push_transaction(&delayed)?;
  assert_eq!(trace.status, TransactionStatus::Delayed);
  assert!(trace.action_traces.is_empty());
  assert_eq!(
    trace.receipt.map(|r| r.status),
    Some(TransactionStatus::Delayed)
  );
  assert!(chain.rows(COUNTER).is_empty());
  chain.finish_block()?;

  chain.start_block(2)?;
  assert_eq!(chain.controller.scheduled_transactions(), vec![delayed.id()?]);
  let trace = chain
    .controller
    .push_scheduled_transaction(&delayed.id()?)?;
  assert_eq!(trace.status, TransactionStatus::Executed);
  assert_eq!(chain.rows(COUNTER).len(), 1);

  let mut canceled = chain.transaction(vec![call(COUNTER, BUMP, active(ALICE))]);
  canceled.delay_sec = 1;
  let canceled = chain.sign(canceled, &[&alice])?;
  chain.controller.push_transaction(&canceled)?;
  assert_eq!(chain.controller.tables().generated_transactions.len(), 1);

  let cancel = Action::new(SYSTEM_ACCOUNT, CANCELDELAY, active(ALICE), &CancelDelay {
    canceling_auth: PermissionLevel::new(ALICE, ACTIVE_PERMISSION),
    trx_id: canceled.id()?,
  })?;
  chain.push_ok(vec![cancel], &[&alice])?;
  assert!(chain.controller.tables().generated_transactions.is_empty());
  chain.finish_block()?;
  Ok(())
}
