use {
  cinder_primitives::{
    Action,
    ActionReceipt,
    Digest,
    Name,
    TransactionReceipt,
    TransactionStatus,
  },
  serde::{Deserialize, Serialize},
};

/// Execution of one action by one receiver.
///
/// Ordinals start at one and follow scheduling order, a creator
/// ordinal of zero marks an action declared by the transaction itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTrace {
  pub action_ordinal: u32,
  pub creator_action_ordinal: u32,
  pub receiver: Name,
  pub act: Action,

  /// Present once the receiver handled the action successfully.
  pub receipt: Option<ActionReceipt>,
  pub console: String,
  pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTrace {
  pub id: Digest,
  pub block_num: u64,
  pub status: TransactionStatus,
  pub cpu_usage_us: u32,
  pub net_usage: u64,
  pub scheduled: bool,
  pub action_traces: Vec<ActionTrace>,

  /// Receipt included in the block, absent for transactions that were
  /// rejected without being billed.
  pub receipt: Option<TransactionReceipt>,
  pub error: Option<String>,
}

impl TransactionTrace {
  pub(crate) fn new(id: Digest, block_num: u64, scheduled: bool) -> Self {
    Self {
      id,
      block_num,
      status: TransactionStatus::HardFail,
      cpu_usage_us: 0,
      net_usage: 0,
      scheduled,
      action_traces: vec![],
      receipt: None,
      error: None,
    }
  }

  pub fn succeeded(&self) -> bool {
    self.error.is_none()
  }

  /// Receipts of every successfully handled action in execution order.
  pub fn action_receipts(&self) -> impl Iterator<Item = &ActionReceipt> {
    let mut receipts: Vec<_> = self
      .action_traces
      .iter()
      .filter_map(|t| t.receipt.as_ref())
      .collect();
    receipts.sort_by_key(|r| r.global_sequence);
    receipts.into_iter()
  }

  /// Console output of every action, in execution order.
  pub fn console(&self) -> String {
    let mut traces: Vec<_> = self
      .action_traces
      .iter()
      .filter(|t| !t.console.is_empty())
      .collect();
    traces.sort_by_key(|t| {
      t.receipt.as_ref().map(|r| r.global_sequence).unwrap_or(u64::MAX)
    });
    traces.iter().map(|t| t.console.as_str()).collect()
  }
}
