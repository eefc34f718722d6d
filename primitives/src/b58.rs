pub trait ToBase58String {
  fn to_b58(&self) -> String;
}

impl ToBase58String for &[u8] {
  fn to_b58(&self) -> String {
    bs58::encode(self).into_string()
  }
}

impl<const N: usize> ToBase58String for [u8; N] {
  fn to_b58(&self) -> String {
    bs58::encode(self).into_string()
  }
}

impl ToBase58String for Vec<u8> {
  fn to_b58(&self) -> String {
    bs58::encode(self).into_string()
  }
}

/// Serde adapter for opaque byte blobs: hex strings in human-readable
/// formats, raw bytes everywhere else.
pub mod hexbytes {
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(
    bytes: &[u8],
    serializer: S,
  ) -> Result<S::Ok, S::Error> {
    if serializer.is_human_readable() {
      serializer.serialize_str(&hex::encode(bytes))
    } else {
      serializer.serialize_bytes(bytes)
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<Vec<u8>, D::Error> {
    if deserializer.is_human_readable() {
      let text = String::deserialize(deserializer)?;
      hex::decode(text).map_err(serde::de::Error::custom)
    } else {
      serde_bytes_vec(deserializer)
    }
  }

  fn serde_bytes_vec<'de, D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<Vec<u8>, D::Error> {
    struct BytesVisitor;

    impl<'de> serde::de::Visitor<'de> for BytesVisitor {
      type Value = Vec<u8>;

      fn expecting(
        &self,
        formatter: &mut std::fmt::Formatter,
      ) -> std::fmt::Result {
        formatter.write_str("a byte buffer")
      }

      fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(v.to_vec())
      }

      fn visit_byte_buf<E: serde::de::Error>(
        self,
        v: Vec<u8>,
      ) -> Result<Self::Value, E> {
        Ok(v)
      }

      fn visit_seq<A: serde::de::SeqAccess<'de>>(
        self,
        mut seq: A,
      ) -> Result<Self::Value, A::Error> {
        let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
          out.push(byte);
        }
        Ok(out)
      }
    }

    deserializer.deserialize_byte_buf(BytesVisitor)
  }
}
