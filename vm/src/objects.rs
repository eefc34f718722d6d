//! Records stored in the chain database.
//!
//! Every record carries its own primary key and knows how to derive
//! the keys of its secondary indices, which is all the store needs to
//! keep indices consistent and to rebuild them from a dump.

use {
  crate::{
    config::ChainConfig,
    resource_limits::{ElasticLimitParameters, UsageAccumulator},
    store::{IndexKey, Record},
  },
  cinder_primitives::{
    hexbytes,
    Authority,
    Digest,
    Name,
    PermissionLevel,
    TimePoint,
  },
  serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountObject {
  pub id: u64,
  pub name: Name,
  pub creation_date: TimePoint,
  pub privileged: bool,

  /// Zero when no contract is installed.
  pub code_hash: Digest,
  pub vm_type: u8,
  pub vm_version: u8,
  pub code_sequence: u32,

  #[serde(with = "hexbytes")]
  pub abi: Vec<u8>,
  pub abi_sequence: u32,

  pub recv_sequence: u64,
  pub auth_sequence: u64,
}

impl AccountObject {
  pub const BY_NAME: usize = 0;

  pub fn key(name: Name) -> IndexKey {
    IndexKey::new().name(name)
  }

  pub fn has_code(&self) -> bool {
    !self.code_hash.is_zero()
  }
}

impl Record for AccountObject {
  const INDICES: usize = 1;
  const TABLE: &'static str = "account";

  fn id(&self) -> u64 {
    self.id
  }

  fn index_keys(&self) -> Vec<IndexKey> {
    vec![Self::key(self.name)]
  }
}

/// Contract bytecode shared by every account that installed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeObject {
  pub id: u64,
  pub code_hash: Digest,
  #[serde(with = "hexbytes")]
  pub code: Vec<u8>,
  pub vm_type: u8,
  pub vm_version: u8,
  pub ref_count: u64,
  pub first_block_used: u64,
}

impl CodeObject {
  pub const BY_HASH: usize = 0;

  pub fn key(code_hash: &Digest, vm_type: u8, vm_version: u8) -> IndexKey {
    IndexKey::new().digest(code_hash).u8(vm_type).u8(vm_version)
  }
}

impl Record for CodeObject {
  const INDICES: usize = 1;
  const TABLE: &'static str = "code";

  fn id(&self) -> u64 {
    self.id
  }

  fn index_keys(&self) -> Vec<IndexKey> {
    vec![Self::key(&self.code_hash, self.vm_type, self.vm_version)]
  }
}

/// A node in an account's permission tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionObject {
  pub id: u64,
  pub owner: Name,
  pub name: Name,

  /// `None` only for the `owner` permission at the root of the tree.
  pub parent: Option<u64>,
  pub last_updated: TimePoint,
  pub auth: Authority,
}

impl PermissionObject {
  pub const BY_OWNER: usize = 0;
  pub const BY_PARENT: usize = 1;

  pub fn key(owner: Name, name: Name) -> IndexKey {
    IndexKey::new().name(owner).name(name)
  }

  pub fn parent_key(parent: Option<u64>, id: u64) -> IndexKey {
    IndexKey::new().id(parent).u64(id)
  }

  pub fn level(&self) -> PermissionLevel {
    PermissionLevel::new(self.owner, self.name)
  }
}

impl Record for PermissionObject {
  const INDICES: usize = 2;
  const TABLE: &'static str = "permission";

  fn id(&self) -> u64 {
    self.id
  }

  fn index_keys(&self) -> Vec<IndexKey> {
    vec![
      Self::key(self.owner, self.name),
      Self::parent_key(self.parent, self.id),
    ]
  }
}

/// Redirects the permission `account` must declare for `code::message_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionLinkObject {
  pub id: u64,
  pub account: Name,
  pub code: Name,
  pub message_type: Name,
  pub required_permission: Name,
}

impl PermissionLinkObject {
  pub const BY_ACTION: usize = 0;
  pub const BY_PERMISSION: usize = 1;

  pub fn key(account: Name, code: Name, message_type: Name) -> IndexKey {
    IndexKey::new().name(account).name(code).name(message_type)
  }

  pub fn permission_key(account: Name, permission: Name, id: u64) -> IndexKey {
    IndexKey::new().name(account).name(permission).u64(id)
  }
}

impl Record for PermissionLinkObject {
  const INDICES: usize = 2;
  const TABLE: &'static str = "permission_link";

  fn id(&self) -> u64 {
    self.id
  }

  fn index_keys(&self) -> Vec<IndexKey> {
    vec![
      Self::key(self.account, self.code, self.message_type),
      Self::permission_key(self.account, self.required_permission, self.id),
    ]
  }
}

/// Header of one contract table, `(code, scope, table)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableIdObject {
  pub id: u64,
  pub code: Name,
  pub scope: Name,
  pub table: Name,
  pub payer: Name,
  pub count: u32,
}

impl TableIdObject {
  pub const BY_CODE_SCOPE_TABLE: usize = 0;

  pub fn key(code: Name, scope: Name, table: Name) -> IndexKey {
    IndexKey::new().name(code).name(scope).name(table)
  }
}

impl Record for TableIdObject {
  const INDICES: usize = 1;
  const TABLE: &'static str = "table_id";

  fn id(&self) -> u64 {
    self.id
  }

  fn index_keys(&self) -> Vec<IndexKey> {
    vec![Self::key(self.code, self.scope, self.table)]
  }
}

/// One row of a contract table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueObject {
  pub id: u64,
  pub t_id: u64,
  pub primary_key: u64,
  pub payer: Name,
  #[serde(with = "hexbytes")]
  pub value: Vec<u8>,
}

impl KeyValueObject {
  pub const BY_SCOPE_PRIMARY: usize = 0;

  pub fn key(t_id: u64, primary_key: u64) -> IndexKey {
    IndexKey::new().u64(t_id).u64(primary_key)
  }
}

impl Record for KeyValueObject {
  const INDICES: usize = 1;
  const TABLE: &'static str = "key_value";

  fn id(&self) -> u64 {
    self.id
  }

  fn index_keys(&self) -> Vec<IndexKey> {
    vec![Self::key(self.t_id, self.primary_key)]
  }
}

/// A transaction waiting in the deferred queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedTransactionObject {
  pub id: u64,
  pub trx_id: Digest,
  pub sender: Name,
  pub sender_id: u128,
  pub payer: Name,

  /// Earliest time the transaction may execute.
  pub delay_until: TimePoint,
  pub expiration: TimePoint,
  pub published: TimePoint,

  #[serde(with = "hexbytes")]
  pub packed_trx: Vec<u8>,
}

impl GeneratedTransactionObject {
  pub const BY_DELAY: usize = 2;
  pub const BY_EXPIRATION: usize = 3;
  pub const BY_SENDER_ID: usize = 1;
  pub const BY_TRX_ID: usize = 0;

  pub fn trx_key(trx_id: &Digest) -> IndexKey {
    IndexKey::new().digest(trx_id)
  }

  pub fn sender_key(sender: Name, sender_id: u128) -> IndexKey {
    IndexKey::new().name(sender).u128(sender_id)
  }

  pub fn delay_key(delay_until: TimePoint, id: u64) -> IndexKey {
    IndexKey::new().u64(delay_until.as_micros()).u64(id)
  }

  pub fn expiration_key(expiration: TimePoint, id: u64) -> IndexKey {
    IndexKey::new().u64(expiration.as_micros()).u64(id)
  }

  /// Billable size of a stored deferred transaction.
  pub fn billable_size(&self) -> u64 {
    crate::resource_limits::GENERATED_TRANSACTION_OVERHEAD_RAM_BYTES
      + self.packed_trx.len() as u64
  }
}

impl Record for GeneratedTransactionObject {
  const INDICES: usize = 4;
  const TABLE: &'static str = "generated_transaction";

  fn id(&self) -> u64 {
    self.id
  }

  fn index_keys(&self) -> Vec<IndexKey> {
    vec![
      Self::trx_key(&self.trx_id),
      Self::sender_key(self.sender, self.sender_id),
      Self::delay_key(self.delay_until, self.id),
      Self::expiration_key(self.expiration, self.id),
    ]
  }
}

/// Replay protection record of an applied input transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionObject {
  pub id: u64,
  pub trx_id: Digest,
  pub expiration: TimePoint,
}

impl TransactionObject {
  pub const BY_EXPIRATION: usize = 1;
  pub const BY_TRX_ID: usize = 0;

  pub fn key(trx_id: &Digest) -> IndexKey {
    IndexKey::new().digest(trx_id)
  }

  pub fn expiration_key(expiration: TimePoint, id: u64) -> IndexKey {
    IndexKey::new().u64(expiration.as_micros()).u64(id)
  }
}

impl Record for TransactionObject {
  const INDICES: usize = 2;
  const TABLE: &'static str = "transaction";

  fn id(&self) -> u64 {
    self.id
  }

  fn index_keys(&self) -> Vec<IndexKey> {
    vec![
      Self::key(&self.trx_id),
      Self::expiration_key(self.expiration, self.id),
    ]
  }
}

/// Resource quotas of an account, `-1` is unlimited.
///
/// Every account has one active record and at most one pending record
/// that replaces it when the block is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimitsObject {
  pub id: u64,
  pub owner: Name,
  pub pending: bool,
  pub net_weight: i64,
  pub cpu_weight: i64,
  pub ram_bytes: i64,
}

impl ResourceLimitsObject {
  pub const BY_OWNER: usize = 0;

  pub fn key(pending: bool, owner: Name) -> IndexKey {
    IndexKey::new().bool(pending).name(owner)
  }
}

impl Record for ResourceLimitsObject {
  const INDICES: usize = 1;
  const TABLE: &'static str = "resource_limits";

  fn id(&self) -> u64 {
    self.id
  }

  fn index_keys(&self) -> Vec<IndexKey> {
    vec![Self::key(self.pending, self.owner)]
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsageObject {
  pub id: u64,
  pub owner: Name,
  pub net_usage: UsageAccumulator,
  pub cpu_usage: UsageAccumulator,
  pub ram_usage: u64,
}

impl ResourceUsageObject {
  pub const BY_OWNER: usize = 0;

  pub fn key(owner: Name) -> IndexKey {
    IndexKey::new().name(owner)
  }
}

impl Record for ResourceUsageObject {
  const INDICES: usize = 1;
  const TABLE: &'static str = "resource_usage";

  fn id(&self) -> u64 {
    self.id
  }

  fn index_keys(&self) -> Vec<IndexKey> {
    vec![Self::key(self.owner)]
  }
}

/// Block-wide resource accounting, a singleton.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimitsStateObject {
  pub id: u64,
  pub average_block_net_usage: UsageAccumulator,
  pub average_block_cpu_usage: UsageAccumulator,
  pub pending_net_usage: u64,
  pub pending_cpu_usage: u64,
  pub total_net_weight: u64,
  pub total_cpu_weight: u64,
  pub total_ram_bytes: u64,
  pub virtual_net_limit: u64,
  pub virtual_cpu_limit: u64,
}

impl Record for ResourceLimitsStateObject {
  const INDICES: usize = 0;
  const TABLE: &'static str = "resource_limits_state";

  fn id(&self) -> u64 {
    self.id
  }

  fn index_keys(&self) -> Vec<IndexKey> {
    vec![]
  }
}

/// Parameters of the elastic limits, a singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimitsConfigObject {
  pub id: u64,
  pub cpu_limit_parameters: ElasticLimitParameters,
  pub net_limit_parameters: ElasticLimitParameters,
  pub account_cpu_usage_average_window: u32,
  pub account_net_usage_average_window: u32,
}

impl Record for ResourceLimitsConfigObject {
  const INDICES: usize = 0;
  const TABLE: &'static str = "resource_limits_config";

  fn id(&self) -> u64 {
    self.id
  }

  fn index_keys(&self) -> Vec<IndexKey> {
    vec![]
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalPropertyObject {
  pub id: u64,
  pub chain_id: Digest,
  pub configuration: ChainConfig,
}

impl Record for GlobalPropertyObject {
  const INDICES: usize = 0;
  const TABLE: &'static str = "global_property";

  fn id(&self) -> u64 {
    self.id
  }

  fn index_keys(&self) -> Vec<IndexKey> {
    vec![]
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicGlobalPropertyObject {
  pub id: u64,
  pub global_action_sequence: u64,
}

impl Record for DynamicGlobalPropertyObject {
  const INDICES: usize = 0;
  const TABLE: &'static str = "dynamic_global_property";

  fn id(&self) -> u64 {
    self.id
  }

  fn index_keys(&self) -> Vec<IndexKey> {
    vec![]
  }
}
