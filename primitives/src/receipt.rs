use {
  crate::{Digest, Name},
  serde::{Deserialize, Serialize},
  std::collections::BTreeMap,
};

/// Proof of execution of one action by one receiver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionReceipt {
  pub receiver: Name,
  pub act_digest: Digest,

  /// Chain-wide position of this side effect. Strictly increasing,
  /// never reused.
  pub global_sequence: u64,

  /// Number of actions the receiver has processed so far, this one included.
  pub recv_sequence: u64,

  /// Per declared actor, number of actions authorized by it so far.
  pub auth_sequence: BTreeMap<Name, u64>,

  pub code_sequence: u32,
  pub abi_sequence: u32,
}

#[derive(
  Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum TransactionStatus {
  /// All actions executed and their effects are part of the block.
  Executed,

  /// Execution failed; effects were discarded but the cpu was billed.
  HardFail,

  /// The transaction was stored to execute in a future block.
  Delayed,

  /// A deferred transaction expired before it could execute.
  Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionReceipt {
  pub id: Digest,
  pub status: TransactionStatus,
  pub cpu_usage_us: u32,
  pub net_usage_words: u32,
}
