//! Contracts used by the scenarios, as WebAssembly text.

use cinder_primitives::Name;

/// Escapes bytes for a data segment.
fn data(bytes: &[u8]) -> String {
  bytes.iter().map(|b| format!("\\{b:02x}")).collect()
}

fn name(value: Name) -> i64 {
  value.as_u64() as i64
}

/// Prints `text` on every action it receives.
pub fn printer(text: &str) -> String {
  format!(
    r#"(module
  (import "env" "prints" (func $prints (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "{text}")
  (func (export "apply") (param i64 i64 i64)
    (call $prints (i32.const 0) (i32.const {len}))))"#,
    len = text.len()
  )
}

/// Prints `text`, sends the packed action `inline` and only then
/// notifies `recipient`.
pub fn notifier(text: &str, recipient: Name, inline: &[u8]) -> String {
  format!(
    r#"(module
  (import "env" "prints" (func $prints (param i32 i32)))
  (import "env" "require_recipient" (func $notify (param i64)))
  (import "env" "send_inline" (func $inline (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "{text}")
  (data (i32.const 1024) "{action}")
  (func (export "apply") (param $receiver i64) (param $code i64) (param $action i64)
    (call $prints (i32.const 0) (i32.const {len}))
    (call $inline (i32.const 1024) (i32.const {action_len}))
    (call $notify (i64.const {recipient}))))"#,
    len = text.len(),
    action = data(inline),
    action_len = inline.len(),
    recipient = name(recipient),
  )
}

/// Sends the packed action `inline` every time it runs.
pub fn forwarder(inline: &[u8]) -> String {
  format!(
    r#"(module
  (import "env" "send_inline" (func $inline (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "{action}")
  (func (export "apply") (param i64 i64 i64)
    (call $inline (i32.const 0) (i32.const {len}))))"#,
    action = data(inline),
    len = inline.len(),
  )
}

/// Keeps a little endian u64 counter at primary key zero of `table`
/// in its own scope, paid by itself.
pub fn counter(table: Name) -> String {
  format!(
    r#"(module
  (import "env" "db_find_i64" (func $find (param i64 i64 i64) (result i32)))
  (import "env" "db_get_i64" (func $get (param i32 i32 i32) (result i32)))
  (import "env" "db_store_i64" (func $store (param i64 i64 i64 i64 i32 i32) (result i32)))
  (import "env" "db_update_i64" (func $update (param i32 i64 i32 i32)))
  (memory (export "memory") 1)
  (func (export "apply") (param $receiver i64) (param $code i64) (param $action i64)
    (local $it i32)
    (local.set $it (call $find (local.get $receiver) (i64.const {table}) (i64.const 0)))
    (if (i32.lt_s (local.get $it) (i32.const 0))
      (then
        (i64.store (i32.const 0) (i64.const 1))
        (drop (call $store
          (local.get $receiver) (i64.const {table}) (local.get $receiver)
          (i64.const 0) (i32.const 0) (i32.const 8))))
      (else
        (drop (call $get (local.get $it) (i32.const 0) (i32.const 8)))
        (i64.store (i32.const 0) (i64.add (i64.load (i32.const 0)) (i64.const 1)))
        (call $update (local.get $it) (local.get $receiver) (i32.const 0) (i32.const 8))))))"#,
    table = name(table),
  )
}

/// Bumps a counter like [`counter`], then sends `inline`.
pub fn counting_forwarder(table: Name, inline: &[u8]) -> String {
  format!(
    r#"(module
  (import "env" "db_find_i64" (func $find (param i64 i64 i64) (result i32)))
  (import "env" "db_get_i64" (func $get (param i32 i32 i32) (result i32)))
  (import "env" "db_store_i64" (func $store (param i64 i64 i64 i64 i32 i32) (result i32)))
  (import "env" "db_update_i64" (func $update (param i32 i64 i32 i32)))
  (import "env" "send_inline" (func $inline (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 1024) "{action}")
  (func (export "apply") (param $receiver i64) (param $code i64) (param $action i64)
    (local $it i32)
    (local.set $it (call $find (local.get $receiver) (i64.const {table}) (i64.const 0)))
    (if (i32.lt_s (local.get $it) (i32.const 0))
      (then
        (i64.store (i32.const 0) (i64.const 1))
        (drop (call $store
          (local.get $receiver) (i64.const {table}) (local.get $receiver)
          (i64.const 0) (i32.const 0) (i32.const 8))))
      (else
        (drop (call $get (local.get $it) (i32.const 0) (i32.const 8)))
        (i64.store (i32.const 0) (i64.add (i64.load (i32.const 0)) (i64.const 1)))
        (call $update (local.get $it) (local.get $receiver) (i32.const 0) (i32.const 8))))
    (call $inline (i32.const 1024) (i32.const {len}))))"#,
    table = name(table),
    action = data(inline),
    len = inline.len(),
  )
}

/// Schedules the packed transaction under sender id one on `send`,
/// replacing any earlier one, and cancels it on `cancel`.
pub fn scheduler(send: Name, cancel: Name, trx: &[u8]) -> String {
  format!(
    r#"(module
  (import "env" "send_deferred" (func $send (param i32 i64 i32 i32 i32)))
  (import "env" "cancel_deferred" (func $cancel (param i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "\01")
  (data (i32.const 1024) "{trx}")
  (func (export "apply") (param $receiver i64) (param $code i64) (param $action i64)
    (if (i64.eq (local.get $action) (i64.const {send}))
      (then
        (call $send (i32.const 0) (local.get $receiver)
          (i32.const 1024) (i32.const {len}) (i32.const 1))))
    (if (i64.eq (local.get $action) (i64.const {cancel}))
      (then
        (drop (call $cancel (i32.const 0)))))))"#,
    trx = data(trx),
    len = trx.len(),
    send = name(send),
    cancel = name(cancel),
  )
}

/// Runs until it is stopped.
pub fn spinner() -> String {
  r#"(module
  (memory (export "memory") 1)
  (func (export "apply") (param i64 i64 i64)
    (loop $forever (br $forever))))"#
    .to_string()
}

/// Grows its memory by `pages` and traps if the growth succeeded.
pub fn grower(pages: u32) -> String {
  format!(
    r#"(module
  (memory (export "memory") 1)
  (func (export "apply") (param i64 i64 i64)
    (if (i32.ne (memory.grow (i32.const {pages})) (i32.const -1))
      (then unreachable))))"#
  )
}

/// Fails its action through `check` with a message.
pub fn rejecter() -> String {
  r#"(module
  (import "env" "check" (func $check (param i32 i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "rejected")
  (func (export "apply") (param i64 i64 i64)
    (call $check (i32.const 0) (i32.const 0) (i32.const 8))))"#
    .to_string()
}

/// Imports a function the host does not provide.
pub fn foreign_import() -> String {
  r#"(module
  (import "env" "fopen" (func $fopen (param i32) (result i32)))
  (memory (export "memory") 1)
  (func (export "apply") (param i64 i64 i64)))"#
    .to_string()
}

/// Declares more initial memory than `pages`.
pub fn oversized(pages: u32) -> String {
  format!(
    r#"(module
  (memory (export "memory") {})
  (func (export "apply") (param i64 i64 i64)))"#,
    pages + 1
  )
}

/// Fungible token with balances in `table`, one row per owner scope.
///
/// Action data is three little endian u64: from, to and amount.
/// `issue` credits `to` and needs the token account's authority,
/// any other action moves `amount` from `from` to `to` and notifies
/// both of them.
pub fn token(table: Name, issue: Name) -> String {
  format!(
    r#"(module
  (import "env" "read_action_data" (func $read (param i32 i32) (result i32)))
  (import "env" "require_auth" (func $require_auth (param i64)))
  (import "env" "require_recipient" (func $notify (param i64)))
  (import "env" "check" (func $check (param i32 i32 i32)))
  (import "env" "db_find_i64" (func $find (param i64 i64 i64) (result i32)))
  (import "env" "db_get_i64" (func $get (param i32 i32 i32) (result i32)))
  (import "env" "db_store_i64" (func $store (param i64 i64 i64 i64 i32 i32) (result i32)))
  (import "env" "db_update_i64" (func $update (param i32 i64 i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 256) "overdrawn balance")
  (global $self (mut i64) (i64.const 0))

  (func $balance (param $owner i64) (result i64)
    (local $it i32)
    (local.set $it (call $find (local.get $owner) (i64.const {table}) (i64.const 0)))
    (if (result i64) (i32.lt_s (local.get $it) (i32.const 0))
      (then (i64.const 0))
      (else
        (drop (call $get (local.get $it) (i32.const 128) (i32.const 8)))
        (i64.load (i32.const 128)))))

  (func $set_balance (param $owner i64) (param $value i64)
    (local $it i32)
    (i64.store (i32.const 128) (local.get $value))
    (local.set $it (call $find (local.get $owner) (i64.const {table}) (i64.const 0)))
    (if (i32.lt_s (local.get $it) (i32.const 0))
      (then
        (drop (call $store
          (local.get $owner) (i64.const {table}) (global.get $self)
          (i64.const 0) (i32.const 128) (i32.const 8))))
      (else
        (call $update (local.get $it) (global.get $self) (i32.const 128) (i32.const 8)))))

  (func (export "apply") (param $receiver i64) (param $code i64) (param $action i64)
    (local $from i64)
    (local $to i64)
    (local $amount i64)
    (local $left i64)
    (if (i64.ne (local.get $receiver) (local.get $code)) (then (return)))
    (global.set $self (local.get $receiver))
    (drop (call $read (i32.const 0) (i32.const 24)))
    (local.set $from (i64.load (i32.const 0)))
    (local.set $to (i64.load (i32.const 8)))
    (local.set $amount (i64.load (i32.const 16)))

    (if (i64.eq (local.get $action) (i64.const {issue}))
      (then
        (call $require_auth (local.get $receiver))
        (call $set_balance (local.get $to)
          (i64.add (call $balance (local.get $to)) (local.get $amount)))
        (return)))

    (call $require_auth (local.get $from))
    (local.set $left (i64.sub (call $balance (local.get $from)) (local.get $amount)))
    (call $check (i64.ge_s (local.get $left) (i64.const 0)) (i32.const 256) (i32.const 17))
    (call $set_balance (local.get $from) (local.get $left))
    (call $set_balance (local.get $to)
      (i64.add (call $balance (local.get $to)) (local.get $amount)))
    (call $notify (local.get $from))
    (call $notify (local.get $to))))"#,
    table = name(table),
    issue = name(issue),
  )
}

/// Payload of the token contract.
pub fn token_payload(from: Name, to: Name, amount: u64) -> Vec<u8> {
  [from.as_u64(), to.as_u64(), amount]
    .iter()
    .flat_map(|v| v.to_le_bytes())
    .collect()
}
