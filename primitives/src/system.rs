//! Well-known names and payloads of the built-in system actions.
//!
//! These actions are handled natively by the engine when sent to the
//! system account, before any wasm installed on it runs.

use {
  crate::{b58::hexbytes, Authority, Digest, Name, PermissionLevel},
  serde::{Deserialize, Serialize},
};

pub const SYSTEM_ACCOUNT: Name = Name::from_static("cinder");
pub const NULL_ACCOUNT: Name = Name::from_static("cinder.null");

pub const OWNER_PERMISSION: Name = Name::from_static("owner");
pub const ACTIVE_PERMISSION: Name = Name::from_static("active");

/// Permission granted to contract code when it sends inline actions
/// or deferred transactions on its own behalf.
pub const CODE_PERMISSION: Name = Name::from_static("cinder.code");

/// Link target meaning "any permission of the actor will do".
pub const ANY_PERMISSION: Name = Name::from_static("cinder.any");

pub const NEWACCOUNT: Name = Name::from_static("newaccount");
pub const SETCODE: Name = Name::from_static("setcode");
pub const SETABI: Name = Name::from_static("setabi");
pub const UPDATEAUTH: Name = Name::from_static("updateauth");
pub const DELETEAUTH: Name = Name::from_static("deleteauth");
pub const LINKAUTH: Name = Name::from_static("linkauth");
pub const UNLINKAUTH: Name = Name::from_static("unlinkauth");
pub const CANCELDELAY: Name = Name::from_static("canceldelay");
pub const SETPRIV: Name = Name::from_static("setpriv");
pub const SETLIMITS: Name = Name::from_static("setlimits");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
  pub creator: Name,
  pub name: Name,
  pub owner: Authority,
  pub active: Authority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCode {
  pub account: Name,
  pub vm_type: u8,
  pub vm_version: u8,

  /// Empty code uninstalls the contract.
  #[serde(with = "hexbytes")]
  pub code: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAbi {
  pub account: Name,

  #[serde(with = "hexbytes")]
  pub abi: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAuth {
  pub account: Name,
  pub permission: Name,

  /// Must be empty for `owner` and point to an existing permission
  /// for everything else.
  pub parent: Name,
  pub auth: Authority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAuth {
  pub account: Name,
  pub permission: Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAuth {
  pub account: Name,
  pub code: Name,

  /// Empty name links every action of `code`.
  pub message_type: Name,
  pub requirement: Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkAuth {
  pub account: Name,
  pub code: Name,
  pub message_type: Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelDelay {
  pub canceling_auth: PermissionLevel,
  pub trx_id: Digest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPriv {
  pub account: Name,
  pub is_priv: bool,
}

/// Sets resource limits of an account, `-1` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLimits {
  pub account: Name,
  pub ram_bytes: i64,
  pub net_weight: i64,
  pub cpu_weight: i64,
}
