use {
  crate::{Name, PublicKey},
  serde::{Deserialize, Serialize},
  std::fmt::Display,
  thiserror::Error,
};

/// A `(actor, permission)` pair such as `alice@active`.
#[derive(
  Debug,
  Copy,
  Clone,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
)]
pub struct PermissionLevel {
  pub actor: Name,
  pub permission: Name,
}

impl PermissionLevel {
  pub const fn new(actor: Name, permission: Name) -> Self {
    Self { actor, permission }
  }
}

impl Display for PermissionLevel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}@{}", self.actor, self.permission)
  }
}

#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct KeyWeight {
  pub key: PublicKey,
  pub weight: u16,
}

#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PermissionLevelWeight {
  pub permission: PermissionLevel,
  pub weight: u16,
}

#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct WaitWeight {
  pub wait_sec: u32,
  pub weight: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
  #[error("authority threshold must be greater than zero")]
  ZeroThreshold,

  #[error("sum of weights ({0}) is lower than the threshold ({1})")]
  Unreachable(u64, u32),

  #[error("key entries are not sorted or contain duplicates")]
  UnsortedKeys,

  #[error("account entries are not sorted or contain duplicates")]
  UnsortedAccounts,

  #[error("wait entries are not sorted, contain duplicates or zero waits")]
  UnsortedWaits,

  #[error("entry weights must be greater than zero")]
  ZeroWeight,
}

/// Weighted threshold rule guarding a permission.
///
/// An authority is satisfied once the sum of weights of present keys,
/// satisfied permission levels and elapsed waits reaches `threshold`.
#[derive(
  Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct Authority {
  pub threshold: u32,
  pub keys: Vec<KeyWeight>,
  pub accounts: Vec<PermissionLevelWeight>,
  pub waits: Vec<WaitWeight>,
}

impl Authority {
  /// Single key authority with threshold one.
  pub fn from_key(key: PublicKey) -> Self {
    Self {
      threshold: 1,
      keys: vec![KeyWeight { key, weight: 1 }],
      accounts: vec![],
      waits: vec![],
    }
  }

  /// Single permission level authority with threshold one.
  pub fn from_permission(permission: PermissionLevel) -> Self {
    Self {
      threshold: 1,
      keys: vec![],
      accounts: vec![PermissionLevelWeight {
        permission,
        weight: 1,
      }],
      waits: vec![],
    }
  }

  /// Sum of all entry weights, widened so it can not overflow.
  pub fn total_weight(&self) -> u64 {
    self.keys.iter().map(|k| k.weight as u64).sum::<u64>()
      + self.accounts.iter().map(|a| a.weight as u64).sum::<u64>()
      + self.waits.iter().map(|w| w.weight as u64).sum::<u64>()
  }

  /// Structural validation applied whenever an authority is created or
  /// replaced. Entry lists must be strictly ascending, which makes them
  /// both sorted and duplicate free.
  pub fn validate(&self) -> Result<(), AuthorityError> {
    if self.threshold == 0 {
      return Err(AuthorityError::ZeroThreshold);
    }

    if !self.keys.windows(2).all(|w| w[0].key < w[1].key) {
      return Err(AuthorityError::UnsortedKeys);
    }

    if !self
      .accounts
      .windows(2)
      .all(|w| w[0].permission < w[1].permission)
    {
      return Err(AuthorityError::UnsortedAccounts);
    }

    if self.waits.iter().any(|w| w.wait_sec == 0)
      || !self.waits.windows(2).all(|w| w[0].wait_sec < w[1].wait_sec)
    {
      return Err(AuthorityError::UnsortedWaits);
    }

    let zero_weight = self.keys.iter().any(|k| k.weight == 0)
      || self.accounts.iter().any(|a| a.weight == 0)
      || self.waits.iter().any(|w| w.weight == 0);
    if zero_weight {
      return Err(AuthorityError::ZeroWeight);
    }

    let total = self.total_weight();
    if total < self.threshold as u64 {
      return Err(AuthorityError::Unreachable(total, self.threshold));
    }

    Ok(())
  }
}
