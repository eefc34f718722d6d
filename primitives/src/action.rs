use {
  crate::{
    b58::hexbytes,
    crypto::{pack, unpack, CodecError},
    Digest,
    Name,
    PermissionLevel,
  },
  serde::{de::DeserializeOwned, Deserialize, Serialize},
};

/// A single instruction inside a transaction.
///
/// The payload is opaque to everything except the receiving contract
/// (or the native handler of a system action), which decodes it with
/// [`Action::data_as`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
  /// Account whose code is the primary receiver of this action.
  pub account: Name,

  /// Action identifier, interpreted by the receiver's code.
  pub name: Name,

  /// Declared authorizations. Every entry has to be satisfied by the
  /// provided keys or permissions of the enclosing transaction.
  pub authorization: Vec<PermissionLevel>,

  #[serde(with = "hexbytes")]
  pub data: Vec<u8>,
}

impl Action {
  pub fn new<T: Serialize>(
    account: Name,
    name: Name,
    authorization: Vec<PermissionLevel>,
    payload: &T,
  ) -> Result<Self, CodecError> {
    Ok(Self {
      account,
      name,
      authorization,
      data: pack(payload)?,
    })
  }

  pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
    unpack(&self.data)
  }

  /// Digest recorded on action receipts.
  pub fn digest(&self) -> Result<Digest, CodecError> {
    Digest::of(self)
  }
}
