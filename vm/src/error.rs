use {
  crate::{authorization::AuthorizationError, store::StoreError},
  cinder_primitives::CodecError,
  serde::{Deserialize, Serialize},
  std::fmt::Display,
  thiserror::Error,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
  Cpu,
  Net,
  Ram,
}

impl Display for ResourceKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      ResourceKind::Cpu => "cpu",
      ResourceKind::Net => "net",
      ResourceKind::Ram => "ram",
    })
  }
}

/// Reason a contract stopped abnormally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrapKind {
  OutOfBounds,
  DivisionByZero,
  Unreachable,
  StackOverflow,
  Other(String),
}

impl Display for TrapKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      TrapKind::OutOfBounds => f.write_str("out of bounds memory access"),
      TrapKind::DivisionByZero => f.write_str("integer division by zero"),
      TrapKind::Unreachable => f.write_str("unreachable executed"),
      TrapKind::StackOverflow => f.write_str("call stack exhausted"),
      TrapKind::Other(msg) => f.write_str(msg),
    }
  }
}

/// Every way applying a transaction or a block can fail.
#[derive(Debug, Error)]
pub enum ChainError {
  #[error("authorization: {0}")]
  Authorization(#[from] AuthorizationError),

  #[error("transaction exhausted its {0} allowance")]
  TransactionResourceExhausted(ResourceKind),

  #[error("block exhausted its {0} capacity")]
  BlockResourceExhausted(ResourceKind),

  #[error("contract trapped: {0}")]
  ContractTrap(TrapKind),

  #[error("transaction deadline exceeded")]
  DeadlineExceeded,

  #[error("serialization: {0}")]
  Serialization(String),

  #[error("module load: {0}")]
  ModuleLoad(String),

  #[error("assertion failure: {0}")]
  Assertion(String),

  #[error("inline action depth exceeded the maximum of {max}")]
  ActionDepthExceeded { max: u16 },

  #[error("invalid transaction: {0}")]
  Transaction(String),

  #[error("store invariant violated: {0}")]
  StoreInvariant(#[from] StoreError),
}

impl ChainError {
  /// Errors after which the state of the node can no longer be trusted.
  pub fn is_fatal(&self) -> bool {
    matches!(self, ChainError::StoreInvariant(_))
  }

  /// Errors that reject the transaction from the current block only,
  /// without producing a failure receipt for it.
  pub fn is_block_level(&self) -> bool {
    matches!(self, ChainError::BlockResourceExhausted(_))
  }

  /// Errors that are the transaction's own fault and end up in a
  /// failure trace.
  pub fn is_transaction_scoped(&self) -> bool {
    !self.is_fatal() && !self.is_block_level()
  }

  pub(crate) fn assertion(msg: impl Into<String>) -> Self {
    ChainError::Assertion(msg.into())
  }

  pub(crate) fn transaction(msg: impl Into<String>) -> Self {
    ChainError::Transaction(msg.into())
  }
}

impl From<CodecError> for ChainError {
  fn from(e: CodecError) -> Self {
    ChainError::Serialization(e.to_string())
  }
}

impl From<cinder_primitives::AuthorityError> for ChainError {
  fn from(e: cinder_primitives::AuthorityError) -> Self {
    ChainError::Authorization(AuthorizationError::InvalidAuthority(e))
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{ChainError, ResourceKind},
    crate::store::StoreError,
  };

  #[test]
  fn classification() {
    assert!(ChainError::StoreInvariant(StoreError::NothingToUndo).is_fatal());
    assert!(ChainError::BlockResourceExhausted(ResourceKind::Cpu).is_block_level());

    let tx = ChainError::TransactionResourceExhausted(ResourceKind::Net);
    assert!(!tx.is_block_level());
    assert!(tx.is_transaction_scoped());
    assert!(ChainError::DeadlineExceeded.is_transaction_scoped());
  }
}
