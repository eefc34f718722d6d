use {
  crate::b58::ToBase58String,
  ed25519_dalek::Verifier,
  multihash::{Hasher, Sha3_256},
  serde::{Deserialize, Deserializer, Serialize, Serializer},
  std::{
    fmt::{Debug, Display},
    str::FromStr,
  },
  thiserror::Error,
};

#[derive(Debug, Error)]
pub enum CodecError {
  #[error("encoding failed: {0}")]
  Encode(#[from] rmp_serde::encode::Error),

  #[error("decoding failed: {0}")]
  Decode(#[from] rmp_serde::decode::Error),
}

/// Canonical binary encoding used for payloads, packed transactions
/// and everything that gets hashed.
pub fn pack<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
  Ok(rmp_serde::to_vec(value)?)
}

pub fn unpack<T: serde::de::DeserializeOwned>(
  bytes: &[u8],
) -> Result<T, CodecError> {
  Ok(rmp_serde::from_slice(bytes)?)
}

/// SHA3-256 content digest.
///
/// Used as code identity, transaction ids, action digests and
/// the chain id.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 32]);

impl Digest {
  pub const fn zero() -> Self {
    Self([0u8; 32])
  }

  pub fn is_zero(&self) -> bool {
    self.0 == [0u8; 32]
  }

  pub fn hash(data: &[u8]) -> Self {
    Self::hash_parts(&[data])
  }

  pub fn hash_parts(parts: &[&[u8]]) -> Self {
    let mut hasher = Sha3_256::default();
    for part in parts {
      hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(hasher.finalize());
    Self(out)
  }

  /// Digest of the canonical encoding of a value.
  pub fn of<T: Serialize>(value: &T) -> Result<Self, CodecError> {
    Ok(Self::hash(&pack(value)?))
  }

  pub const fn from_bytes(bytes: [u8; 32]) -> Self {
    Self(bytes)
  }

  pub fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }
}

impl AsRef<[u8]> for Digest {
  fn as_ref(&self) -> &[u8] {
    &self.0
  }
}

impl Display for Digest {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0.to_b58())
  }
}

impl Debug for Digest {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "digest({})", self.0.to_b58())
  }
}

/// An ed25519 public key.
///
/// The core only ever compares keys against authority entries, the
/// scheme-specific part is limited to [`PublicKey::verify`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
  pub const fn from_bytes(bytes: [u8; 32]) -> Self {
    Self(bytes)
  }

  pub fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }

  /// Checks an ed25519 signature of `message` made by this key.
  pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = ed25519_dalek::PublicKey::from_bytes(&self.0) else {
      return false;
    };
    let Ok(signature) = ed25519_dalek::Signature::try_from(signature) else {
      return false;
    };
    key.verify(message, &signature).is_ok()
  }
}

impl From<ed25519_dalek::PublicKey> for PublicKey {
  fn from(p: ed25519_dalek::PublicKey) -> Self {
    Self(*p.as_bytes())
  }
}

impl Display for PublicKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0.to_b58())
  }
}

impl Debug for PublicKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "pubkey({})", self.0.to_b58())
  }
}

fn decode_b58_32(s: &str) -> Result<[u8; 32], bs58::decode::Error> {
  let mut bytes = [0u8; 32];
  let len = bs58::decode(s).into(&mut bytes)?;
  if len != 32 {
    return Err(bs58::decode::Error::BufferTooSmall);
  }
  Ok(bytes)
}

impl FromStr for PublicKey {
  type Err = bs58::decode::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Self(decode_b58_32(s)?))
  }
}

impl FromStr for Digest {
  type Err = bs58::decode::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Self(decode_b58_32(s)?))
  }
}

macro_rules! b58_serde {
  ($ty:ident) => {
    impl Serialize for $ty {
      fn serialize<S: Serializer>(
        &self,
        serializer: S,
      ) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
          serializer.serialize_str(&self.to_string())
        } else {
          self.0.serialize(serializer)
        }
      }
    }

    impl<'de> Deserialize<'de> for $ty {
      fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
      ) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
          let text = String::deserialize(deserializer)?;
          text.parse().map_err(serde::de::Error::custom)
        } else {
          Ok(Self(<[u8; 32]>::deserialize(deserializer)?))
        }
      }
    }
  };
}

b58_serde!(PublicKey);
b58_serde!(Digest);
