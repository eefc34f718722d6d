use {
  crate::{crypto::CodecError, BlockTimestamp, Digest, Name},
  serde::{Deserialize, Serialize},
};

/// The part of a block the state transition depends on.
///
/// `timestamp` is the only source of time visible to contracts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHeader {
  pub height: u64,
  pub timestamp: BlockTimestamp,
  pub producer: Name,
  pub parent: Digest,
}

impl BlockHeader {
  pub fn genesis(timestamp: BlockTimestamp) -> Self {
    Self {
      height: 0,
      timestamp,
      producer: Name::default(),
      parent: Digest::zero(),
    }
  }

  pub fn id(&self) -> Result<Digest, CodecError> {
    Digest::of(self)
  }
}
