use {
  serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer},
  std::{
    fmt::{Debug, Display},
    str::FromStr,
  },
  thiserror::Error,
};

const CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
  #[error("name '{0}' is longer than 13 characters")]
  TooLong(String),

  #[error("name '{0}' contains a character outside of [.1-5a-z]")]
  InvalidCharacter(String),

  #[error("the 13th character of name '{0}' must be in [.1-5a-j]")]
  InvalidThirteenthCharacter(String),

  #[error("name '{0}' is not normalized (trailing dots)")]
  NotNormalized(String),
}

/// A 64-bit identifier of accounts, actions, permissions and tables.
///
/// The textual form uses a base-32 alphabet of `.12345abcdefghijklmnopqrstuvwxyz`
/// and packs up to 12 characters of 5 bits each, plus an optional 13th
/// character of 4 bits. The ordering of names is the ordering of their
/// underlying integers, which is what every index in the store relies on.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(u64);

impl Name {
  pub const fn from_u64(value: u64) -> Self {
    Self(value)
  }

  pub const fn as_u64(&self) -> u64 {
    self.0
  }

  pub const fn is_empty(&self) -> bool {
    self.0 == 0
  }

  /// Parses a name at compile time for well-known constants.
  ///
  /// Invalid characters are mapped to `.` instead of failing, so this
  /// must only be used with literals that are known to be valid.
  pub const fn from_static(s: &str) -> Self {
    let bytes = s.as_bytes();
    let mut value: u64 = 0;
    let mut i = 0;
    while i < bytes.len() && i < 13 {
      let symbol = char_to_symbol(bytes[i]) as u64;
      if i < 12 {
        value |= (symbol & 0x1f) << (64 - 5 * (i + 1));
      } else {
        value |= symbol & 0x0f;
      }
      i += 1;
    }
    Self(value)
  }
}

const fn char_to_symbol(c: u8) -> u8 {
  match c {
    b'a'..=b'z' => (c - b'a') + 6,
    b'1'..=b'5' => (c - b'1') + 1,
    _ => 0,
  }
}

impl FromStr for Name {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.len() > 13 {
      return Err(Error::TooLong(s.to_owned()));
    }

    for (i, c) in s.bytes().enumerate() {
      let valid = matches!(c, b'.' | b'1'..=b'5' | b'a'..=b'z');
      if !valid {
        return Err(Error::InvalidCharacter(s.to_owned()));
      }
      if i == 12 && !matches!(c, b'.' | b'1'..=b'5' | b'a'..=b'j') {
        return Err(Error::InvalidThirteenthCharacter(s.to_owned()));
      }
    }

    let name = Name::from_static(s);
    if name.to_string() != s {
      return Err(Error::NotNormalized(s.to_owned()));
    }
    Ok(name)
  }
}

impl TryFrom<&str> for Name {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    FromStr::from_str(value)
  }
}

impl From<u64> for Name {
  fn from(value: u64) -> Self {
    Self(value)
  }
}

impl From<Name> for u64 {
  fn from(name: Name) -> Self {
    name.0
  }
}

impl Display for Name {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut out = [b'.'; 13];
    let mut tmp = self.0;
    for i in 0..=12 {
      let mask = if i == 0 { 0x0f } else { 0x1f };
      out[12 - i] = CHARMAP[(tmp & mask) as usize];
      tmp >>= if i == 0 { 4 } else { 5 };
    }
    let len = out.iter().rposition(|c| *c != b'.').map_or(0, |p| p + 1);
    // the charmap is pure ascii
    f.write_str(std::str::from_utf8(&out[..len]).map_err(|_| std::fmt::Error)?)
  }
}

impl Debug for Name {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "name({self})")
  }
}

impl Serialize for Name {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    if serializer.is_human_readable() {
      serializer.serialize_str(&self.to_string())
    } else {
      serializer.serialize_u64(self.0)
    }
  }
}

impl<'de> Deserialize<'de> for Name {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct NameVisitor;

    impl<'de> Visitor<'de> for NameVisitor {
      type Value = Name;

      fn expecting(
        &self,
        formatter: &mut std::fmt::Formatter,
      ) -> std::fmt::Result {
        formatter.write_str("a name string or its u64 value")
      }

      fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Name, E> {
        Ok(Name(v))
      }

      fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Name, E> {
        v.parse().map_err(E::custom)
      }
    }

    if deserializer.is_human_readable() {
      deserializer.deserialize_str(NameVisitor)
    } else {
      deserializer.deserialize_u64(NameVisitor)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::{Error, Name};

  #[test]
  fn name_text_roundtrip() -> anyhow::Result<()> {
    for text in ["cinder", "alice", "cinder.code", "a", "zzzzzzzzzzzzj", "1.2"] {
      let name: Name = text.parse()?;
      assert_eq!(name.to_string(), text);
    }
    assert_eq!(Name::default().to_string(), "");
    Ok(())
  }

  #[test]
  fn name_ordering_follows_integer() -> anyhow::Result<()> {
    let a: Name = "alice".parse()?;
    let b: Name = "bob".parse()?;
    assert!(a < b);
    assert!(a.as_u64() < b.as_u64());
    Ok(())
  }

  #[test]
  fn name_rejects_invalid() {
    assert!(matches!("Alice".parse::<Name>(), Err(Error::InvalidCharacter(_))));
    assert!(matches!(
      "abcdefghijklmn".parse::<Name>(),
      Err(Error::TooLong(_))
    ));
    assert!(matches!(
      "aaaaaaaaaaaaz".parse::<Name>(),
      Err(Error::InvalidThirteenthCharacter(_))
    ));
    assert!(matches!("alice.".parse::<Name>(), Err(Error::NotNormalized(_))));
  }

  #[test]
  fn static_matches_parsed() -> anyhow::Result<()> {
    assert_eq!(Name::from_static("updateauth"), "updateauth".parse()?);
    Ok(())
  }
}
