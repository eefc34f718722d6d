use {
  cinder_primitives::{Digest, Name},
  std::fmt::Debug,
};

/// Order-preserving byte encoding of a secondary index key.
///
/// Integers are written big-endian so that byte-wise comparison of two
/// keys matches the comparison of the tuples they were built from.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey(Vec<u8>);

impl IndexKey {
  pub fn new() -> Self {
    Self(Vec::with_capacity(32))
  }

  pub fn u8(mut self, value: u8) -> Self {
    self.0.push(value);
    self
  }

  pub fn bool(self, value: bool) -> Self {
    self.u8(value as u8)
  }

  pub fn u32(mut self, value: u32) -> Self {
    self.0.extend_from_slice(&value.to_be_bytes());
    self
  }

  pub fn u64(mut self, value: u64) -> Self {
    self.0.extend_from_slice(&value.to_be_bytes());
    self
  }

  pub fn u128(mut self, value: u128) -> Self {
    self.0.extend_from_slice(&value.to_be_bytes());
    self
  }

  pub fn name(self, value: Name) -> Self {
    self.u64(value.as_u64())
  }

  pub fn digest(mut self, value: &Digest) -> Self {
    self.0.extend_from_slice(value.as_ref());
    self
  }

  /// Optional primary-key reference, `None` sorts before every id.
  pub fn id(self, value: Option<u64>) -> Self {
    match value {
      None => self.u8(0).u64(0),
      Some(id) => self.u8(1).u64(id),
    }
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }
}

impl Debug for IndexKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "key({})", hex::encode(&self.0))
  }
}

#[cfg(test)]
mod tests {
  use super::IndexKey;

  #[test]
  fn tuple_order_is_preserved() {
    let a = IndexKey::new().u64(1).u64(u64::MAX);
    let b = IndexKey::new().u64(2).u64(0);
    assert!(a < b);

    let c = IndexKey::new().u64(2).u64(1);
    assert!(b < c);

    assert!(IndexKey::new().id(None) < IndexKey::new().id(Some(0)));
  }

  #[test]
  fn debug_shows_hex_bytes() {
    let key = IndexKey::new().u8(0xab).u32(1);
    assert_eq!(format!("{key:?}"), "key(ab00000001)");
  }
}
