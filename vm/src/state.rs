use {
  crate::{
    config::ChainConfig,
    objects::*,
    store::{Database, Record, StoreError, Table, TableSet, UndoTable},
    ChainError,
  },
  cinder_primitives::{Name, PermissionLevel},
};

pub type ChainDatabase = Database<ChainTables>;

/// Every table of the chain state.
///
/// Singletons live at primary key zero of their table.
#[derive(Debug, Default)]
pub struct ChainTables {
  pub accounts: Table<AccountObject>,
  pub codes: Table<CodeObject>,
  pub permissions: Table<PermissionObject>,
  pub permission_links: Table<PermissionLinkObject>,
  pub table_ids: Table<TableIdObject>,
  pub key_values: Table<KeyValueObject>,
  pub generated_transactions: Table<GeneratedTransactionObject>,
  pub transactions: Table<TransactionObject>,
  pub resource_limits: Table<ResourceLimitsObject>,
  pub resource_usage: Table<ResourceUsageObject>,
  pub resource_limits_state: Table<ResourceLimitsStateObject>,
  pub resource_limits_config: Table<ResourceLimitsConfigObject>,
  pub global_property: Table<GlobalPropertyObject>,
  pub dynamic_global_property: Table<DynamicGlobalPropertyObject>,
}

impl TableSet for ChainTables {
  fn for_each(&self, f: &mut dyn FnMut(&dyn UndoTable)) {
    f(&self.accounts);
    f(&self.codes);
    f(&self.permissions);
    f(&self.permission_links);
    f(&self.table_ids);
    f(&self.key_values);
    f(&self.generated_transactions);
    f(&self.transactions);
    f(&self.resource_limits);
    f(&self.resource_usage);
    f(&self.resource_limits_state);
    f(&self.resource_limits_config);
    f(&self.global_property);
    f(&self.dynamic_global_property);
  }

  fn for_each_mut(&mut self, f: &mut dyn FnMut(&mut dyn UndoTable)) {
    f(&mut self.accounts);
    f(&mut self.codes);
    f(&mut self.permissions);
    f(&mut self.permission_links);
    f(&mut self.table_ids);
    f(&mut self.key_values);
    f(&mut self.generated_transactions);
    f(&mut self.transactions);
    f(&mut self.resource_limits);
    f(&mut self.resource_usage);
    f(&mut self.resource_limits_state);
    f(&mut self.resource_limits_config);
    f(&mut self.global_property);
    f(&mut self.dynamic_global_property);
  }
}

fn singleton<R: Record>(table: &Table<R>) -> Result<&R, ChainError> {
  table.get(0).ok_or(ChainError::StoreInvariant(StoreError::NotFound {
    table: R::TABLE,
    id: 0,
  }))
}

impl ChainTables {
  pub fn account(&self, name: Name) -> Option<&AccountObject> {
    self
      .accounts
      .find(AccountObject::BY_NAME, &AccountObject::key(name))
  }

  pub fn is_account(&self, name: Name) -> bool {
    self.account(name).is_some()
  }

  pub fn require_account(&self, name: Name) -> Result<&AccountObject, ChainError> {
    self
      .account(name)
      .ok_or_else(|| ChainError::assertion(format!("account '{name}' does not exist")))
  }

  pub fn permission(&self, level: &PermissionLevel) -> Option<&PermissionObject> {
    self.permissions.find(
      PermissionObject::BY_OWNER,
      &PermissionObject::key(level.actor, level.permission),
    )
  }

  pub fn global(&self) -> Result<&GlobalPropertyObject, ChainError> {
    singleton(&self.global_property)
  }

  pub fn config(&self) -> Result<&ChainConfig, ChainError> {
    Ok(&self.global()?.configuration)
  }

  pub fn dynamic_global(&self) -> Result<&DynamicGlobalPropertyObject, ChainError> {
    singleton(&self.dynamic_global_property)
  }

  pub fn resource_state(&self) -> Result<&ResourceLimitsStateObject, ChainError> {
    singleton(&self.resource_limits_state)
  }

  pub fn resource_config(&self) -> Result<&ResourceLimitsConfigObject, ChainError> {
    singleton(&self.resource_limits_config)
  }

  /// Takes the next chain-wide action sequence number.
  pub fn next_global_sequence(&mut self) -> Result<u64, ChainError> {
    Ok(
      self
        .dynamic_global_property
        .modify(0, |p| p.global_action_sequence += 1)?
        .global_action_sequence,
    )
  }
}
